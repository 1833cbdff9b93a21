//! Document store side of the reconciliation
//!
//! The store holds loosely-typed documents per tenant and collection. This
//! module is the single place where those documents become `InventoryRecord`s.

mod sqlite;

pub use sqlite::SqliteStore;

use crate::config::ExchangeRateConfig;
use crate::currency::normalize_price;
use crate::error::{Result, SyncError};
use crate::record::{clamp_non_negative, coerce_quantity, parse_quantity, InventoryRecord, Origin};
use async_trait::async_trait;
use serde_json::Value;

/// Collection holding one document per inventory code
pub const INVENTORY_COLLECTION: &str = "inventory";

/// Untyped document fields as stored
pub type RawRecord = serde_json::Map<String, Value>;

/// A stored document and the key it lives under
#[derive(Debug, Clone, PartialEq)]
pub struct RawDocument {
    pub key: String,
    pub fields: RawRecord,
}

/// Keyed document storage scoped by tenant
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Every document in a tenant's collection
    async fn list_records(&self, tenant_id: &str, collection: &str) -> Result<Vec<RawDocument>>;

    /// Create the document, or merge `fields` into it when `merge` is set
    ///
    /// Without `merge` the stored fields are replaced wholesale.
    async fn upsert(
        &self,
        tenant_id: &str,
        collection: &str,
        key: &str,
        fields: RawRecord,
        merge: bool,
    ) -> Result<()>;

    async fn delete(&self, tenant_id: &str, collection: &str, key: &str) -> Result<()>;

    /// The tenant's effective exchange rate
    async fn get_exchange_rate(&self, tenant_id: &str) -> Result<ExchangeRateConfig>;
}

/// Read the full inventory of a tenant as store-origin records.
///
/// Documents that do not carry a usable code are dropped.
pub async fn load_store_records(
    store: &dyn DocumentStore,
    tenant_id: &str,
) -> Result<Vec<InventoryRecord>> {
    let documents = store
        .list_records(tenant_id, INVENTORY_COLLECTION)
        .await
        .map_err(|e| SyncError::load_failure("store", e))?;

    let total = documents.len();
    let records: Vec<InventoryRecord> = documents.iter().filter_map(record_from_raw).collect();

    log::info!(
        "Loaded {} records from store for tenant {} ({} documents unusable)",
        records.len(),
        tenant_id,
        total - records.len()
    );
    Ok(records)
}

/// Normalize one stored document into a record
pub fn record_from_raw(document: &RawDocument) -> Option<InventoryRecord> {
    let fields = &document.fields;
    let code = field_str(fields, &["code", "codigo"])
        .filter(|code| !code.trim().is_empty())
        .unwrap_or(document.key.as_str());

    let mut record = InventoryRecord::new(
        code,
        field_str(fields, &["category", "categoria"]),
        field_str(fields, &["name", "nombre"]),
        field_quantity(fields, &["quantity", "stock"]).unwrap_or(0),
        field_number(fields, &["priceUSD", "price_usd"]).unwrap_or(0.0),
        field_number(fields, &["priceLocal", "price_local"]).unwrap_or(0.0),
        Origin::Store,
    )?;
    record.doc_key = Some(document.key.clone());
    Some(record)
}

/// Fields written for a record on a merge upsert
///
/// Only the fields the source supplied are included, so a merge never
/// replaces stored values with placeholders or zeros.
pub fn record_to_fields(record: &InventoryRecord) -> RawRecord {
    let supplied = record.supplied;
    let mut fields = RawRecord::new();
    fields.insert("code".into(), Value::from(record.code.clone()));
    if supplied.category {
        fields.insert("category".into(), Value::from(record.category.clone()));
    }
    if supplied.name {
        fields.insert("name".into(), Value::from(record.name.clone()));
    }
    if supplied.quantity {
        fields.insert("quantity".into(), Value::from(record.quantity));
    }
    if supplied.price_usd {
        fields.insert("priceUSD".into(), Value::from(record.price_usd));
        fields.insert("priceLocal".into(), Value::from(record.price_local));
    }
    fields
}

fn field_str<'a>(fields: &'a RawRecord, names: &[&str]) -> Option<&'a str> {
    names
        .iter()
        .find_map(|name| fields.get(*name).and_then(Value::as_str))
}

/// Numbers may be stored as JSON numbers or as price-like strings
fn field_number(fields: &RawRecord, names: &[&str]) -> Option<f64> {
    names.iter().find_map(|name| match fields.get(*name)? {
        Value::Number(n) => n.as_f64().map(clamp_non_negative),
        Value::String(s) => Some(normalize_price(s)),
        _ => None,
    })
}

fn field_quantity(fields: &RawRecord, names: &[&str]) -> Option<u32> {
    names.iter().find_map(|name| match fields.get(*name)? {
        Value::Number(n) => n.as_f64().map(coerce_quantity),
        Value::String(s) => Some(parse_quantity(s)),
        _ => None,
    })
}
