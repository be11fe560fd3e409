//! Integration tests for check-and-reserve: committing plans, refusing
//! shortages, and staying consistent under concurrent requests.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use std::sync::Arc;

use rust_decimal::Decimal;

use pantry_core::{IngredientId, RecipeId, StockLotId, Unit};
use pantry_integration_tests::{
    FlakyStore, TestKitchen, ingredient, lot, now, recipe, requirement, ron,
};
use pantry_stock::{MemoryStockStore, PantrySnapshot, ServiceError};

fn dec(value: &str) -> Decimal {
    value.parse().unwrap()
}

fn pantry(lots_kg: &[i64]) -> PantrySnapshot {
    PantrySnapshot {
        ingredients: vec![ingredient(1, "Butter"), ingredient(2, "Sugar")],
        recipes: vec![recipe(
            1,
            "Shortbread",
            vec![
                requirement(1, Decimal::ONE, Unit::Kilogram),
                requirement(2, dec("200"), Unit::Gram),
            ],
        )],
        lots: lots_kg
            .iter()
            .zip(1..)
            .map(|(kg, id)| {
                let age_days = 20 - i64::from(id);
                lot(id, 1, Decimal::from(*kg), Unit::Kilogram, ron(dec("3")), age_days)
            })
            .chain([lot(100, 2, dec("50"), Unit::Kilogram, ron(dec("2")), 30)])
            .collect(),
        history: vec![],
    }
}

/// Butter still on hand, in Kg, across unconsumed lots.
async fn butter_left(kitchen: &TestKitchen) -> Decimal {
    kitchen
        .store
        .snapshot()
        .await
        .lots
        .iter()
        .filter(|lot| lot.ingredient_id == IngredientId::new(1) && lot.consumed_at.is_none())
        .map(|lot| lot.quantity)
        .sum()
}

// =============================================================================
// Single Requests
// =============================================================================

#[tokio::test]
async fn test_reserve_consumes_fifo_and_records_preparation() {
    let kitchen = TestKitchen::new(pantry(&[2, 5]));

    let reservation = kitchen
        .service
        .check_and_reserve(RecipeId::new(1), 3)
        .await
        .unwrap();
    assert!(reservation.success);
    assert!(reservation.shortages.is_empty());

    let record = reservation.record.unwrap();
    assert_eq!(record.recipe_id, RecipeId::new(1));
    assert_eq!(record.amount, 3);
    assert_eq!(record.prepared_at, now());

    let first = kitchen.store.lot(StockLotId::new(1)).await.unwrap();
    assert_eq!(first.consumed_at, Some(now()));

    let second = kitchen.store.lot(StockLotId::new(2)).await.unwrap();
    assert_eq!(second.quantity, dec("4"));
    assert!(second.consumed_at.is_none());

    assert_eq!(butter_left(&kitchen).await, dec("4"));
    assert_eq!(
        kitchen
            .service
            .preparation_history(RecipeId::new(1))
            .await
            .unwrap(),
        vec![record]
    );
}

#[tokio::test]
async fn test_partial_take_keeps_provenance_of_consumed_portion() {
    let kitchen = TestKitchen::new(pantry(&[5]));

    kitchen
        .service
        .check_and_reserve(RecipeId::new(1), 2)
        .await
        .unwrap();

    let snapshot = kitchen.store.snapshot().await;
    let portions: Vec<_> = snapshot
        .lots
        .iter()
        .filter(|lot| lot.split_from == Some(StockLotId::new(1)))
        .collect();
    assert_eq!(portions.len(), 1);

    let portion = portions[0];
    let original = kitchen.store.lot(StockLotId::new(1)).await.unwrap();
    assert_eq!(portion.quantity, dec("2"));
    assert_eq!(portion.consumed_at, Some(now()));
    assert_eq!(portion.unit_price, original.unit_price);
    assert_eq!(portion.purchased_at, original.purchased_at);
    assert_eq!(portion.expires_at, original.expires_at);
    assert_eq!(original.quantity, dec("3"));

    // Sugar is stocked in Kg and taken in grams.
    let sugar = kitchen.store.lot(StockLotId::new(100)).await.unwrap();
    assert_eq!(sugar.quantity, dec("49.6"));
}

#[tokio::test]
async fn test_shortage_leaves_stock_untouched() {
    let kitchen = TestKitchen::new(pantry(&[2]));
    let before = kitchen.store.snapshot().await;

    let reservation = kitchen
        .service
        .check_and_reserve(RecipeId::new(1), 3)
        .await
        .unwrap();

    assert!(!reservation.success);
    assert!(reservation.record.is_none());
    assert_eq!(reservation.shortages.len(), 1);
    assert_eq!(reservation.shortages[0].ingredient_name, "Butter");
    assert_eq!(reservation.shortages[0].missing_quantity, dec("1"));
    assert_eq!(kitchen.store.snapshot().await, before);
}

#[tokio::test]
async fn test_malformed_requests_are_rejected() {
    let kitchen = TestKitchen::new(pantry(&[2]));

    for desired in [0, -1] {
        let err = kitchen
            .service
            .check_and_reserve(RecipeId::new(1), desired)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::MalformedRequest(_)));
        assert!(!err.is_retryable());
    }

    let err = kitchen
        .service
        .check_and_reserve(RecipeId::new(42), 1)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::RecipeNotFound(id) if id == RecipeId::new(42)));
}

#[tokio::test]
async fn test_invalid_requirement_is_refused_before_reading_lots() {
    let mut snapshot = pantry(&[5]);
    snapshot.recipes.push(recipe(
        2,
        "Broken shortbread",
        vec![
            requirement(1, Decimal::ONE, Unit::Kilogram),
            requirement(2, Decimal::ZERO, Unit::Kilogram),
        ],
    ));
    let store = MemoryStockStore::from_snapshot(snapshot).unwrap();
    let counting = Arc::new(FlakyStore::new(store.clone(), 0));
    let kitchen = TestKitchen::over(store, counting.clone());
    let before = kitchen.store.snapshot().await;

    let err = kitchen
        .service
        .check_and_reserve(RecipeId::new(2), 1)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::MalformedRequest(_)));

    let err = kitchen
        .service
        .max_preparations(RecipeId::new(2))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::MalformedRequest(_)));

    let err = kitchen.service.quote(RecipeId::new(2), 1).await.unwrap_err();
    assert!(matches!(err, ServiceError::MalformedRequest(_)));

    assert_eq!(counting.lot_reads(), 0);
    assert_eq!(kitchen.store.snapshot().await, before);
}

// =============================================================================
// Concurrent Requests
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reserves_never_double_deduct() {
    // Exactly enough butter for one of the two requests.
    let kitchen = TestKitchen::new(pantry(&[2, 1]));

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let service = kitchen.service.clone();
            tokio::spawn(async move { service.check_and_reserve(RecipeId::new(1), 3).await })
        })
        .collect();

    let mut successes = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(reservation) if reservation.success => successes += 1,
            Ok(reservation) => assert!(!reservation.shortages.is_empty()),
            Err(ServiceError::ConcurrentModification { shortages, .. }) => {
                assert!(!shortages.is_empty());
            }
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(successes, 1);
    assert_eq!(butter_left(&kitchen).await, Decimal::ZERO);

    let snapshot = kitchen.store.snapshot().await;
    assert_eq!(snapshot.history.len(), 1);
    assert_eq!(snapshot.history[0].amount, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_concurrent_reserves_consume_exactly_the_stock() {
    let kitchen = TestKitchen::new(pantry(&[3, 4]));

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let service = kitchen.service.clone();
            tokio::spawn(async move { service.check_and_reserve(RecipeId::new(1), 1).await })
        })
        .collect();

    let mut successes = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(reservation) if reservation.success => successes += 1,
            Ok(_) | Err(ServiceError::ConcurrentModification { .. }) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(successes, 7);
    assert_eq!(butter_left(&kitchen).await, Decimal::ZERO);

    let history = kitchen
        .service
        .preparation_history(RecipeId::new(1))
        .await
        .unwrap();
    assert_eq!(history.iter().map(|record| record.amount).sum::<u32>(), 7);
}
