//! Three-way diff between store and sheet inventories
//!
//! Pure computation: neither input is modified and nothing is written.

use crate::record::{is_placeholder_code, InventoryRecord};
use serde::Serialize;
use std::collections::BTreeMap;

/// Whether the sheet side of the last load was usable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Sheet returned at least one record
    Connected,
    /// Sheet loaded but was empty or header-only
    Disconnected,
    /// One of the loads failed
    Error,
}

/// A code present on both sides whose USD prices differ
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceMismatch {
    pub code: String,
    pub store_price_usd: f64,
    pub sheet_price_usd: f64,
}

/// Result of comparing the two record sets
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciliationResult {
    pub connection: ConnectionState,
    pub total_store: usize,
    pub total_sheet: usize,
    pub matched: usize,
    pub store_only: usize,
    pub sheet_only: usize,
    pub price_mismatches: usize,
    /// Store records at or below the low-stock threshold
    pub low_stock: usize,
    /// Store records with neither a USD nor a local price
    pub no_price: usize,
    /// Placeholder codes dropped from either input
    pub placeholders_skipped: usize,
    /// Repeated codes within one input (last one wins)
    pub duplicate_codes: usize,
    pub matched_codes: Vec<String>,
    pub store_only_codes: Vec<String>,
    pub sheet_only_codes: Vec<String>,
    pub mismatches: Vec<PriceMismatch>,
}

/// Case-insensitive index of one side, with placeholder and duplicate counts
struct Index<'a> {
    by_key: BTreeMap<String, &'a InventoryRecord>,
    placeholders: usize,
    duplicates: usize,
}

fn index_records(records: &[InventoryRecord]) -> Index<'_> {
    let mut index = Index {
        by_key: BTreeMap::new(),
        placeholders: 0,
        duplicates: 0,
    };

    for record in records {
        if is_placeholder_code(&record.code) {
            index.placeholders += 1;
            continue;
        }
        if index.by_key.insert(record.key(), record).is_some() {
            index.duplicates += 1;
        }
    }
    index
}

/// Compare store and sheet records by code.
///
/// Prices are compared exactly; two values that differ only by float
/// rounding are still reported as a mismatch.
pub fn reconcile(
    store_records: &[InventoryRecord],
    sheet_records: &[InventoryRecord],
    low_stock_threshold: u32,
) -> ReconciliationResult {
    let store = index_records(store_records);
    let sheet = index_records(sheet_records);

    let mut matched_codes = Vec::new();
    let mut store_only_codes = Vec::new();
    let mut mismatches = Vec::new();

    for (key, store_record) in &store.by_key {
        match sheet.by_key.get(key) {
            Some(sheet_record) => {
                matched_codes.push(store_record.code.clone());
                if store_record.price_usd != sheet_record.price_usd {
                    mismatches.push(PriceMismatch {
                        code: store_record.code.clone(),
                        store_price_usd: store_record.price_usd,
                        sheet_price_usd: sheet_record.price_usd,
                    });
                }
            }
            None => store_only_codes.push(store_record.code.clone()),
        }
    }

    let sheet_only_codes: Vec<String> = sheet
        .by_key
        .iter()
        .filter(|(key, _)| !store.by_key.contains_key(*key))
        .map(|(_, record)| record.code.clone())
        .collect();

    let low_stock = store
        .by_key
        .values()
        .filter(|r| r.quantity <= low_stock_threshold)
        .count();
    let no_price = store.by_key.values().filter(|r| r.has_no_price()).count();

    let connection = if sheet.by_key.is_empty() {
        ConnectionState::Disconnected
    } else {
        ConnectionState::Connected
    };

    let result = ReconciliationResult {
        connection,
        total_store: store.by_key.len(),
        total_sheet: sheet.by_key.len(),
        matched: matched_codes.len(),
        store_only: store_only_codes.len(),
        sheet_only: sheet_only_codes.len(),
        price_mismatches: mismatches.len(),
        low_stock,
        no_price,
        placeholders_skipped: store.placeholders + sheet.placeholders,
        duplicate_codes: store.duplicates + sheet.duplicates,
        matched_codes,
        store_only_codes,
        sheet_only_codes,
        mismatches,
    };

    log::info!(
        "Reconciled: {} matched, {} store-only, {} sheet-only, {} price mismatches",
        result.matched,
        result.store_only,
        result.sheet_only,
        result.price_mismatches
    );
    result
}

impl ReconciliationResult {
    /// Mark the result as coming from a failed load
    pub fn with_error(mut self) -> Self {
        self.connection = ConnectionState::Error;
        self
    }
}
