//! Stock Reconcile - spreadsheet to document store inventory sync
//!
//! Loads a tenant's inventory from the document store and from a spreadsheet
//! CSV export, reconciles the two by product code, and on explicit request
//! writes the sheet back into the store.

pub mod apply;
pub mod columns;
pub mod config;
pub mod currency;
pub mod error;
pub mod orchestrator;
pub mod reconcile;
pub mod record;
pub mod sheet;
pub mod store;
pub mod tabular;
pub mod web;

pub use apply::{apply_sheet_to_store, ApplyFailure, ApplyReport};
pub use columns::{resolve_column, ColumnMap};
pub use config::{ExchangeRateConfig, SyncConfig};
pub use currency::normalize_price;
pub use error::{Result, SyncError};
pub use orchestrator::{Snapshot, SyncOrchestrator, SyncOutcome, SyncState};
pub use reconcile::{reconcile, ConnectionState, PriceMismatch, ReconciliationResult};
pub use record::{is_placeholder_code, parse_quantity, InventoryRecord, Origin, SuppliedFields};
pub use sheet::{load_sheet_records, parse_sheet, HttpSheetClient, PriceRow, SheetLoad, SheetSource};
pub use store::{
    load_store_records, DocumentStore, RawDocument, RawRecord, SqliteStore, INVENTORY_COLLECTION,
};
pub use tabular::parse_delimited_line;
