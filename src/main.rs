//! Stock Reconcile - spreadsheet to document store inventory sync
//!
//! Loads both inventories, prints the reconciliation and, with `--apply`,
//! writes the sheet into the store. With `--web-port` it serves the JSON API
//! instead and waits for explicit refresh/sync requests.

use clap::Parser;
use stock_reconcile::{
    HttpSheetClient, ReconciliationResult, SqliteStore, SyncConfig, SyncOrchestrator, SyncOutcome,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Inventory reconciliation between a spreadsheet and the local store
#[derive(Parser, Debug)]
#[command(name = "stock_reconcile")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the SQLite database file
    #[arg(short, long, default_value_t = default_db_path())]
    database: String,

    /// Tenant whose inventory is reconciled
    #[arg(short, long)]
    tenant: String,

    /// Spreadsheet ID to read the inventory tab from
    #[arg(short, long)]
    sheet_id: String,

    /// Sheet tab name
    #[arg(long, default_value = stock_reconcile::config::DEFAULT_TAB_NAME)]
    tab: String,

    /// Quantity at or below which an item counts as low stock
    #[arg(long, default_value_t = stock_reconcile::config::DEFAULT_LOW_STOCK_THRESHOLD)]
    low_stock: u32,

    /// Write the sheet into the store after reconciling (default: report only)
    #[arg(long, default_value_t = false)]
    apply: bool,

    /// Push applied prices back to the sheet (requires --push-url)
    #[arg(long, default_value_t = false)]
    push_prices: bool,

    /// Endpoint accepting price rows for the sheet
    #[arg(long)]
    push_url: Option<String>,

    /// Store a manual exchange rate for the tenant before running
    #[arg(long)]
    set_rate: Option<f64>,

    /// Store a market exchange rate for the tenant before running
    #[arg(long)]
    market_rate: Option<f64>,

    /// Serve the JSON API on this port instead of running once
    #[arg(long)]
    web_port: Option<u16>,
}

/// Returns the default database path: ~/.local/share/stock_reconcile/inventory.db
fn default_db_path() -> String {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("stock_reconcile")
        .join("inventory.db")
        .to_string_lossy()
        .to_string()
}

#[tokio::main]
async fn main() {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let db_path = PathBuf::from(&args.database);

    log::info!("Starting stock_reconcile...");
    log::info!("Database path: {}", db_path.display());

    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                log::error!("Failed to create database directory: {}", e);
                std::process::exit(1);
            }
            log::info!("Created directory: {}", parent.display());
        }
    }

    let store = match SqliteStore::open(&db_path) {
        Ok(store) => store,
        Err(e) => {
            log::error!("Failed to open database: {}", e);
            std::process::exit(1);
        }
    };

    if let Some(rate) = args.market_rate {
        if let Err(e) = store.set_market_rate(&args.tenant, rate) {
            log::error!("Failed to store market rate: {}", e);
            std::process::exit(1);
        }
    }
    if let Some(rate) = args.set_rate {
        if let Err(e) = store.set_manual_rate(&args.tenant, rate) {
            log::error!("Failed to store manual rate: {}", e);
            std::process::exit(1);
        }
    }

    let mut sheet = HttpSheetClient::new();
    if let Some(url) = &args.push_url {
        sheet = sheet.with_push_url(url.clone());
    }

    let config = SyncConfig::new(&args.tenant, &args.sheet_id)
        .with_tab(&args.tab)
        .with_low_stock_threshold(args.low_stock)
        .with_push_prices(args.push_prices);

    let mut orchestrator = SyncOrchestrator::new(Arc::new(store), Arc::new(sheet), config);

    if let Some(port) = args.web_port {
        let orchestrator = Arc::new(Mutex::new(orchestrator));
        if let Err(e) = stock_reconcile::web::serve(orchestrator, port).await {
            log::error!("Web server error: {}", e);
            std::process::exit(1);
        }
        return;
    }

    match orchestrator.refresh().await {
        Ok(result) => log_reconciliation(&result),
        Err(e) => {
            log::error!("Refresh failed: {}", e);
            if let Some(partial) = &orchestrator.snapshot().reconciliation {
                log_reconciliation(partial);
            }
            std::process::exit(1);
        }
    }

    if !args.apply {
        log::info!("Report only, pass --apply to write the sheet into the store");
        return;
    }

    match orchestrator.sync().await {
        Ok(outcome) => log_outcome(&outcome),
        Err(e) => {
            log::error!("Sync failed: {}", e);
            std::process::exit(1);
        }
    }
}

fn log_reconciliation(result: &ReconciliationResult) {
    log::info!(
        "Sheet {:?}: store {} / sheet {} records",
        result.connection,
        result.total_store,
        result.total_sheet
    );
    log::info!(
        "{} matched, {} store-only, {} sheet-only, {} price mismatches",
        result.matched,
        result.store_only,
        result.sheet_only,
        result.price_mismatches
    );
    log::info!(
        "{} low stock, {} without price",
        result.low_stock,
        result.no_price
    );
    for mismatch in &result.mismatches {
        log::info!(
            "  {}: store {:.2} USD, sheet {:.2} USD",
            mismatch.code,
            mismatch.store_price_usd,
            mismatch.sheet_price_usd
        );
    }
}

fn log_outcome(outcome: &SyncOutcome) {
    let report = &outcome.report;
    log::info!(
        "Sync completed at rate {} ({}): {} succeeded, {} failed, {} skipped",
        outcome.exchange_rate.rate,
        if outcome.exchange_rate.manual { "manual" } else { "market" },
        report.succeeded,
        report.failed,
        report.skipped
    );
    for failure in &report.errors {
        log::warn!("  {}: {}", failure.code, failure.message);
    }
    if let Some(e) = &outcome.push_error {
        log::warn!("Price push failed: {}", e);
    }
}
