//! Pantry CLI - stock capacity, costing and preparation over a pantry file.
//!
//! # Usage
//!
//! ```bash
//! # How many times can recipe 1 be prepared, and at what cost?
//! pantry max --recipe 1
//!
//! # Cost 4 preparations without consuming anything
//! pantry quote --recipe 1 --amount 4
//!
//! # Consume stock for 4 preparations and record them
//! pantry prepare --recipe 1 --amount 4
//!
//! # List butter lots, soonest expiry first
//! pantry lots --ingredient 1 --sort expiry
//!
//! # Take a purchase into stock
//! pantry intake --ingredient 1 --quantity 2 --unit Kg --price 38.5 --expires 2026-01-01T00:00:00Z
//! ```
//!
//! # Commands
//!
//! - `max` - Maximum preparations and their FIFO cost
//! - `quote` - Allocation and cost for a given count, read-only
//! - `prepare` - Check and reserve; exits non-zero on shortage
//! - `lots` - Lots of an ingredient with their status
//! - `history` - Preparations recorded for a recipe
//! - `intake` - Add a purchased lot
//!
//! Results are printed as JSON on stdout. Logs go to stderr; set `RUST_LOG`
//! to change the level and `PANTRY_LOG_JSON=1` for JSON logs.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tracing_subscriber::EnvFilter;

use pantry_core::{CurrencyCode, IngredientId, RecipeId, Unit};
use pantry_stock::{KitchenService, LotSortKey, StockConfig};

mod commands;

use commands::kitchen::{self, Intake};
use commands::snapshot::Pantry;

#[derive(Parser)]
#[command(name = "pantry")]
#[command(author, version, about = "Pantry stock allocation and costing")]
struct Cli {
    /// Pantry file to read and update
    #[arg(short, long, global = true, default_value = "pantry.yaml")]
    data: PathBuf,

    /// Use the `PostgreSQL` store from `PANTRY_DATABASE_URL` instead of a file
    /// (needs the `postgres` feature)
    #[arg(long, global = true)]
    database: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show how many times a recipe can be prepared and the cost
    Max {
        #[arg(short, long)]
        recipe: i32,
    },
    /// Cost a number of preparations without consuming stock
    Quote {
        #[arg(short, long)]
        recipe: i32,
        #[arg(short, long)]
        amount: u32,
    },
    /// Consume stock for a number of preparations and record them
    Prepare {
        #[arg(short, long)]
        recipe: i32,
        #[arg(short, long, allow_negative_numbers = true)]
        amount: i32,
    },
    /// List the lots of an ingredient
    Lots {
        #[arg(short, long)]
        ingredient: i32,
        /// Sort order (`intake`, `purchase`, `expiry`, `quantity`)
        #[arg(short, long, default_value = "intake")]
        sort: LotSortKey,
    },
    /// Show the preparation history of a recipe
    History {
        #[arg(short, long)]
        recipe: i32,
    },
    /// Take a purchased lot into stock
    Intake {
        #[arg(short, long)]
        ingredient: i32,
        #[arg(short, long)]
        quantity: Decimal,
        /// Unit symbol (`g`, `Kg`, `ml`, `L`, or anything else for counts)
        #[arg(short, long)]
        unit: String,
        /// Price per one unit
        #[arg(short, long)]
        price: Decimal,
        #[arg(short, long, default_value = "RON", value_parser = CurrencyCode::parse)]
        currency: CurrencyCode,
        /// Purchase time (RFC 3339), defaults to now
        #[arg(long)]
        purchased: Option<DateTime<Utc>>,
        /// Expiry time (RFC 3339)
        #[arg(short, long)]
        expires: DateTime<Utc>,
    },
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("PANTRY_LOG_JSON")
        .is_ok_and(|value| value == "1" || value.eq_ignore_ascii_case("true"));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = StockConfig::from_env()?;
    tracing::debug!(?config, "Loaded configuration");

    if cli.database {
        return run_database(&config, cli.command).await;
    }

    let pantry = Pantry::open(&cli.data, &config).await?;
    match cli.command {
        Commands::Intake {
            ingredient,
            quantity,
            unit,
            price,
            currency,
            purchased,
            expires,
        } => {
            let intake = Intake {
                ingredient: IngredientId::new(ingredient),
                quantity,
                unit: Unit::parse(&unit),
                unit_price: price,
                currency,
                purchased_at: purchased.unwrap_or_else(Utc::now),
                expires_at: expires,
            };
            kitchen::intake(&pantry, intake).await
        }
        command => {
            if execute(&pantry.service, command).await? {
                pantry.persist().await?;
            }
            Ok(())
        }
    }
}

/// Run a store-agnostic command. Returns whether stock changed.
async fn execute(
    service: &KitchenService,
    command: Commands,
) -> Result<bool, Box<dyn std::error::Error>> {
    match command {
        Commands::Max { recipe } => kitchen::max(service, RecipeId::new(recipe)).await?,
        Commands::Quote { recipe, amount } => {
            kitchen::quote(service, RecipeId::new(recipe), amount).await?;
        }
        Commands::Prepare { recipe, amount } => {
            if !kitchen::prepare(service, RecipeId::new(recipe), amount).await? {
                return Err(format!(
                    "not enough stock for {amount} preparation(s) of recipe {recipe}"
                )
                .into());
            }
            return Ok(true);
        }
        Commands::Lots { ingredient, sort } => {
            kitchen::lots(service, IngredientId::new(ingredient), sort).await?;
        }
        Commands::History { recipe } => {
            kitchen::history(service, RecipeId::new(recipe)).await?;
        }
        Commands::Intake { .. } => return Err("intake needs a pantry file".into()),
    }
    Ok(false)
}

#[cfg(feature = "postgres")]
async fn run_database(
    config: &StockConfig,
    command: Commands,
) -> Result<(), Box<dyn std::error::Error>> {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use pantry_stock::db::{PgStockStore, create_pool};

    let pool = create_pool(config.require_database_url()?).await?;
    tracing::info!("Connected to database");
    let (service, refresher) = commands::snapshot::build_service(
        Arc::new(PgStockStore::new(pool)),
        &BTreeMap::new(),
        config,
    );
    let result = execute(&service, command).await.map(|_| ());
    if let Some(refresher) = refresher {
        refresher.abort();
    }
    result
}

#[cfg(not(feature = "postgres"))]
async fn run_database(
    _config: &StockConfig,
    _command: Commands,
) -> Result<(), Box<dyn std::error::Error>> {
    Err("built without PostgreSQL support, rebuild with --features postgres".into())
}
