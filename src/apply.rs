//! Writes sheet records back into the document store
//!
//! Every record is upserted independently. A failing record is recorded and
//! the rest of the batch carries on; the report is only built once every
//! write has settled.

use crate::error::{Result, SyncError};
use crate::record::{clamp_non_negative, is_placeholder_code, InventoryRecord, Origin};
use crate::store::{record_to_fields, DocumentStore, INVENTORY_COLLECTION};
use futures::future::join_all;
use serde::Serialize;
use std::collections::HashMap;

/// One record that could not be written
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApplyFailure {
    pub code: String,
    pub message: String,
}

/// Outcome of applying a sheet snapshot to the store
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ApplyReport {
    pub succeeded: usize,
    pub failed: usize,
    /// Records not attempted (blank or placeholder code)
    pub skipped: usize,
    /// First failures only, capped at the configured limit
    pub errors: Vec<ApplyFailure>,
    /// Records as written, with derived local prices
    #[serde(skip)]
    pub applied: Vec<InventoryRecord>,
}

/// Normalize a sheet record for writing: local price derived from the rate
pub fn prepare_record(record: &InventoryRecord, exchange_rate: f64) -> InventoryRecord {
    let price_local = if record.supplied.price_usd {
        clamp_non_negative(record.price_usd * exchange_rate)
    } else {
        record.price_local
    };
    InventoryRecord {
        price_usd: clamp_non_negative(record.price_usd),
        price_local,
        origin: Origin::Sheet,
        ..record.clone()
    }
}

/// Point a prepared record at the stored document it matches
///
/// The write goes to the existing document key under the stored spelling of
/// the code. Fields the sheet left out are taken from the stored record so
/// the applied record reads like the merged document.
fn target_existing(record: &mut InventoryRecord, existing: &InventoryRecord) -> String {
    let supplied = record.supplied;
    record.code = existing.code.clone();
    if !supplied.category {
        record.category = existing.category.clone();
    }
    if !supplied.name {
        record.name = existing.name.clone();
    }
    if !supplied.quantity {
        record.quantity = existing.quantity;
    }
    if !supplied.price_usd {
        record.price_usd = existing.price_usd;
        record.price_local = existing.price_local;
    }
    existing
        .doc_key
        .clone()
        .unwrap_or_else(|| existing.code.clone())
}

/// Upsert every usable sheet record into the tenant's inventory.
///
/// `store_records` is the store side of the last load. A sheet record that
/// matches one of them (case-insensitive code) is merged into that document;
/// anything else creates a document keyed by the sheet code.
///
/// Fails as a whole only when the exchange rate is unusable; individual
/// write failures end up in the report.
pub async fn apply_sheet_to_store(
    store: &dyn DocumentStore,
    tenant_id: &str,
    sheet_records: &[InventoryRecord],
    store_records: &[InventoryRecord],
    exchange_rate: f64,
    max_reported_errors: usize,
) -> Result<ApplyReport> {
    if !(exchange_rate.is_finite() && exchange_rate > 0.0) {
        return Err(SyncError::ConfigMissing(format!(
            "cannot apply prices with exchange rate {exchange_rate}"
        )));
    }

    let mut report = ApplyReport::default();

    let existing: HashMap<String, &InventoryRecord> = store_records
        .iter()
        .filter(|record| !is_placeholder_code(&record.code))
        .map(|record| (record.key(), record))
        .collect();

    // last occurrence of a code wins, first-seen order is kept
    let mut order: Vec<String> = Vec::new();
    let mut latest: HashMap<String, &InventoryRecord> = HashMap::new();
    for record in sheet_records {
        if record.code.trim().is_empty() || is_placeholder_code(&record.code) {
            report.skipped += 1;
            continue;
        }
        let key = record.key();
        if latest.insert(key.clone(), record).is_none() {
            order.push(key);
        }
    }

    let pending: Vec<(String, InventoryRecord)> = order
        .iter()
        .filter_map(|key| latest.get(key).map(|record| (key, record)))
        .map(|(key, record)| {
            let mut prepared = prepare_record(record, exchange_rate);
            let doc_key = match existing.get(key) {
                Some(stored) => target_existing(&mut prepared, stored),
                None => prepared.code.clone(),
            };
            (doc_key, prepared)
        })
        .collect();

    log::info!(
        "Applying {} sheet records to store for tenant {} (rate {}, {} skipped)",
        pending.len(),
        tenant_id,
        exchange_rate,
        report.skipped
    );

    let writes = pending.iter().map(|(doc_key, record)| async move {
        store
            .upsert(
                tenant_id,
                INVENTORY_COLLECTION,
                doc_key,
                record_to_fields(record),
                true,
            )
            .await
    });
    let outcomes = join_all(writes).await;

    for ((_, record), outcome) in pending.into_iter().zip(outcomes) {
        match outcome {
            Ok(()) => {
                report.succeeded += 1;
                report.applied.push(record);
            }
            Err(e) => {
                log::warn!("Failed to apply record {}: {}", record.code, e);
                report.failed += 1;
                if report.errors.len() < max_reported_errors {
                    report.errors.push(ApplyFailure {
                        code: record.code,
                        message: e.to_string(),
                    });
                }
            }
        }
    }

    log::info!(
        "Apply finished: {} succeeded, {} failed",
        report.succeeded,
        report.failed
    );
    Ok(report)
}
