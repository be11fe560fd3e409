//! Integration tests for the I/O boundaries: store retries, exchange rate
//! caching and the base-currency short circuit.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;

use pantry_core::{CurrencyCode, Price, RecipeId, Unit};
use pantry_integration_tests::{
    FlakyStore, TestKitchen, fast_retry, ingredient, lot, recipe, requirement, ron,
};
use pantry_stock::currency::StaticRateSource;
use pantry_stock::{
    CurrencyError, CurrencyNormalizer, MemoryStockStore, PantrySnapshot, RateCache, ServiceError,
    StoreError,
};

fn dec(value: &str) -> Decimal {
    value.parse().unwrap()
}

fn pantry() -> PantrySnapshot {
    PantrySnapshot {
        ingredients: vec![ingredient(1, "Cream")],
        recipes: vec![recipe(
            1,
            "Panna cotta",
            vec![requirement(1, dec("250"), Unit::Milliliter)],
        )],
        lots: vec![
            lot(1, 1, dec("1"), Unit::Liter, ron(dec("12")), 4),
            lot(
                2,
                1,
                dec("1000"),
                Unit::Milliliter,
                Price::new(dec("0.002"), CurrencyCode::EUR),
                2,
            ),
        ],
        history: vec![],
    }
}

fn flaky_kitchen(failures: usize) -> (TestKitchen, Arc<FlakyStore>) {
    let store = MemoryStockStore::from_snapshot(pantry()).unwrap();
    let flaky = Arc::new(FlakyStore::new(store.clone(), failures));
    let kitchen = TestKitchen::over(store, flaky.clone());
    kitchen.rates.set_rate(CurrencyCode::EUR, dec("5"));
    (kitchen, flaky)
}

// =============================================================================
// Store Retries
// =============================================================================

#[tokio::test]
async fn test_transient_store_failures_are_retried() {
    let (kitchen, flaky) = flaky_kitchen(2);

    let max = kitchen.service.max_preparations(RecipeId::new(1)).await.unwrap();
    assert_eq!(max.max_preparations, 8);
    // 1 L at 12 RON + 1000 ml at 0.002 EUR * 5
    assert_eq!(max.total_cost, dec("22"));
    assert_eq!(max.unit_cost, dec("2.75"));
    assert!(flaky.calls() > 2);
}

#[tokio::test]
async fn test_commit_survives_a_failed_begin() {
    let store = MemoryStockStore::from_snapshot(pantry()).unwrap();
    let flaky = Arc::new(FlakyStore::new(store.clone(), 0).with_begin_failures(2));
    let kitchen = TestKitchen::over(store, flaky);

    let reservation = kitchen
        .service
        .check_and_reserve(RecipeId::new(1), 2)
        .await
        .unwrap();
    assert!(reservation.success);
    assert_eq!(kitchen.store.snapshot().await.history.len(), 1);
}

#[tokio::test]
async fn test_persistent_store_failure_surfaces_after_bounded_attempts() {
    let (kitchen, flaky) = flaky_kitchen(usize::MAX);

    let err = kitchen
        .service
        .max_preparations(RecipeId::new(1))
        .await
        .unwrap_err();

    assert!(matches!(err, ServiceError::Store(StoreError::Unavailable(_))));
    assert!(err.is_retryable());
    assert_eq!(flaky.calls(), fast_retry().max_attempts as usize);
}

// =============================================================================
// Exchange Rates
// =============================================================================

#[tokio::test]
async fn test_base_currency_never_consults_the_rate_source() {
    let mut snapshot = pantry();
    snapshot.lots.truncate(1);
    let kitchen = TestKitchen::new(snapshot);

    let max = kitchen.service.max_preparations(RecipeId::new(1)).await.unwrap();
    assert_eq!(max.total_cost, dec("12"));
    assert_eq!(kitchen.rates.calls(), 0);

    let source = Arc::new(StaticRateSource::empty());
    let normalizer = CurrencyNormalizer::new(RateCache::new(source.clone()));
    for amount in [dec("0"), dec("-3.5"), dec("1234.5678")] {
        assert_eq!(
            normalizer
                .to_base_currency(amount, CurrencyCode::RON)
                .await
                .unwrap(),
            amount
        );
    }
    assert_eq!(source.calls(), 0);
}

#[tokio::test]
async fn test_unresolvable_rate_fails_the_whole_request() {
    let kitchen = TestKitchen::new(pantry());

    let err = kitchen
        .service
        .max_preparations(RecipeId::new(1))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::RateUnavailable(CurrencyError::UnknownCurrency(CurrencyCode::EUR))
    ));
}

#[tokio::test]
async fn test_rates_are_cached_across_requests() {
    let kitchen = TestKitchen::new(pantry());
    kitchen.rates.set_rate(CurrencyCode::EUR, dec("5"));

    for _ in 0..3 {
        kitchen.service.max_preparations(RecipeId::new(1)).await.unwrap();
    }
    assert_eq!(kitchen.rates.calls(), 1);
}

#[tokio::test]
async fn test_stale_rate_is_served_when_source_goes_down() {
    let source = Arc::new(StaticRateSource::new([(CurrencyCode::EUR, dec("4.97"))]));
    let cache = RateCache::with_options(source.clone(), Duration::from_millis(20), fast_retry());
    let normalizer = CurrencyNormalizer::new(cache.clone());

    assert_eq!(
        normalizer
            .to_base_currency(dec("2"), CurrencyCode::EUR)
            .await
            .unwrap(),
        dec("9.94")
    );

    source.set_unavailable(true);
    tokio::time::sleep(Duration::from_millis(60)).await;

    assert_eq!(
        normalizer
            .to_base_currency(dec("2"), CurrencyCode::EUR)
            .await
            .unwrap(),
        dec("9.94")
    );
    assert_eq!(cache.last_known(CurrencyCode::EUR), Some(dec("4.97")));
}
