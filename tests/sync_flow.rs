//! End-to-end tests for the load / reconcile / sync cycle

use async_trait::async_trait;
use serde_json::json;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use stock_reconcile::{
    apply_sheet_to_store, load_sheet_records, ConnectionState, DocumentStore, ExchangeRateConfig,
    PriceRow, RawDocument, RawRecord, Result, SheetSource, SqliteStore, SyncConfig, SyncError,
    SyncOrchestrator, SyncState, INVENTORY_COLLECTION,
};

const TENANT: &str = "taller-centro";

/// Sheet source returning fixed text and recording pushed rows
struct StaticSheet {
    text: Option<String>,
    fail_push: bool,
    pushed: Mutex<Vec<PriceRow>>,
}

impl StaticSheet {
    fn new(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
            fail_push: false,
            pushed: Mutex::new(Vec::new()),
        }
    }

    fn unreachable() -> Self {
        Self {
            text: None,
            fail_push: false,
            pushed: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl SheetSource for StaticSheet {
    async fn fetch_sheet_text(&self, _sheet_id: &str, _tab_name: &str) -> Result<String> {
        self.text
            .clone()
            .ok_or_else(|| SyncError::InvalidState("sheet offline".to_string()))
    }

    async fn push_price_rows(&self, _sheet_id: &str, _tab: &str, rows: &[PriceRow]) -> Result<()> {
        if self.fail_push {
            return Err(SyncError::InvalidState("push rejected".to_string()));
        }
        self.pushed.lock().unwrap().extend_from_slice(rows);
        Ok(())
    }
}

/// Store that rejects writes for chosen keys, or every read
struct FailingStore {
    inner: SqliteStore,
    reject_keys: HashSet<String>,
    fail_reads: bool,
}

impl FailingStore {
    fn rejecting(keys: &[&str]) -> Self {
        Self {
            inner: SqliteStore::open_in_memory().unwrap(),
            reject_keys: keys.iter().map(|k| k.to_string()).collect(),
            fail_reads: false,
        }
    }
}

#[async_trait]
impl DocumentStore for FailingStore {
    async fn list_records(&self, tenant_id: &str, collection: &str) -> Result<Vec<RawDocument>> {
        if self.fail_reads {
            return Err(SyncError::InvalidState("store offline".to_string()));
        }
        self.inner.list_records(tenant_id, collection).await
    }

    async fn upsert(
        &self,
        tenant_id: &str,
        collection: &str,
        key: &str,
        fields: RawRecord,
        merge: bool,
    ) -> Result<()> {
        if self.reject_keys.contains(key) {
            return Err(SyncError::RecordApply {
                code: key.to_string(),
                message: "write rejected".to_string(),
            });
        }
        self.inner
            .upsert(tenant_id, collection, key, fields, merge)
            .await
    }

    async fn delete(&self, tenant_id: &str, collection: &str, key: &str) -> Result<()> {
        self.inner.delete(tenant_id, collection, key).await
    }

    async fn get_exchange_rate(&self, tenant_id: &str) -> Result<ExchangeRateConfig> {
        self.inner.get_exchange_rate(tenant_id).await
    }
}

fn sheet_text(rows: &[(&str, &str, &str)]) -> String {
    let mut text = String::from("Código,Nombre,Cant.,Precio USD\n");
    for (code, qty, price) in rows {
        text.push_str(&format!("{code},Item {code},{qty},{price}\n"));
    }
    text
}

fn config() -> SyncConfig {
    SyncConfig::new(TENANT, "sheet-1")
}

#[tokio::test]
async fn applying_twice_is_idempotent() {
    let store = SqliteStore::open_in_memory().unwrap();
    let records = load_sheet_records(&sheet_text(&[
        ("A-1", "3", "10.00"),
        ("B-2", "0", "\"$1.234,56\""),
        ("C-3", "7", "2"),
    ]))
    .unwrap();

    apply_sheet_to_store(&store, TENANT, &records, &[], 36.5, 20)
        .await
        .unwrap();
    let first = store.list_records(TENANT, INVENTORY_COLLECTION).await.unwrap();

    apply_sheet_to_store(&store, TENANT, &records, &[], 36.5, 20)
        .await
        .unwrap();
    let second = store.list_records(TENANT, INVENTORY_COLLECTION).await.unwrap();

    assert_eq!(first.len(), 3);
    assert_eq!(first, second);
}

#[tokio::test]
async fn zero_quantity_survives_load_and_apply() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    store.set_market_rate(TENANT, 40.0).unwrap();
    let sheet = Arc::new(StaticSheet::new(&sheet_text(&[("Z-0", "0", "5")])));

    let mut orchestrator = SyncOrchestrator::new(store.clone(), sheet, config());
    orchestrator.refresh().await.unwrap();
    let outcome = orchestrator.sync().await.unwrap();
    assert_eq!(outcome.report.succeeded, 1);

    let doc = store.get(TENANT, INVENTORY_COLLECTION, "Z-0").unwrap().unwrap();
    assert_eq!(doc["quantity"], json!(0));
    assert_eq!(doc["priceLocal"], json!(200.0));
}

#[tokio::test]
async fn one_failing_record_does_not_abort_batch() {
    let rows: Vec<(String, String, String)> = (1..=10)
        .map(|i| (format!("R-{i}"), "1".to_string(), "2.5".to_string()))
        .collect();
    let borrowed: Vec<(&str, &str, &str)> = rows
        .iter()
        .map(|(c, q, p)| (c.as_str(), q.as_str(), p.as_str()))
        .collect();
    let records = load_sheet_records(&sheet_text(&borrowed)).unwrap();
    assert_eq!(records.len(), 10);

    let store = FailingStore::rejecting(&["R-5"]);
    let report = apply_sheet_to_store(&store, TENANT, &records, &[], 1.0, 20)
        .await
        .unwrap();

    assert_eq!(report.succeeded, 9);
    assert_eq!(report.failed, 1);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].code, "R-5");

    let stored = store.list_records(TENANT, INVENTORY_COLLECTION).await.unwrap();
    let keys: HashSet<String> = stored.into_iter().map(|d| d.key).collect();
    assert_eq!(keys.len(), 9);
    assert!(!keys.contains("R-5"));
    assert!(keys.contains("R-10"));
}

#[tokio::test]
async fn reported_errors_are_capped() {
    let codes: Vec<String> = (0..30).map(|i| format!("X-{i}")).collect();
    let rows: Vec<(&str, &str, &str)> = codes.iter().map(|c| (c.as_str(), "1", "1")).collect();
    let records = load_sheet_records(&sheet_text(&rows)).unwrap();

    let rejected: Vec<&str> = codes.iter().map(String::as_str).collect();
    let store = FailingStore::rejecting(&rejected);
    let report = apply_sheet_to_store(&store, TENANT, &records, &[], 1.0, 5)
        .await
        .unwrap();

    assert_eq!(report.failed, 30);
    assert_eq!(report.errors.len(), 5);
}

#[tokio::test]
async fn header_only_sheet_is_disconnected_not_error() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let sheet = Arc::new(StaticSheet::new("Código,Nombre,Cantidad\n"));

    let mut orchestrator = SyncOrchestrator::new(store, sheet, config());
    let result = orchestrator.refresh().await.unwrap();

    assert_eq!(result.connection, ConnectionState::Disconnected);
    assert_eq!(result.total_sheet, 0);
    assert_eq!(orchestrator.state(), &SyncState::Reconciling);
}

#[tokio::test]
async fn refresh_reconciles_without_writing() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    store
        .upsert(
            TENANT,
            INVENTORY_COLLECTION,
            "A-1",
            json!({"code": "A-1", "quantity": 2, "priceUSD": 9.0})
                .as_object()
                .cloned()
                .unwrap(),
            true,
        )
        .await
        .unwrap();
    store
        .upsert(
            TENANT,
            INVENTORY_COLLECTION,
            "OLD",
            json!({"code": "OLD", "quantity": 1}).as_object().cloned().unwrap(),
            true,
        )
        .await
        .unwrap();
    let sheet = Arc::new(StaticSheet::new(&sheet_text(&[
        ("a-1", "2", "10"),
        ("NEW", "4", "1"),
    ])));

    let mut orchestrator = SyncOrchestrator::new(store.clone(), sheet, config());
    let result = orchestrator.refresh().await.unwrap();

    assert_eq!(result.connection, ConnectionState::Connected);
    assert_eq!(result.matched, 1);
    assert_eq!(result.store_only_codes, vec!["OLD"]);
    assert_eq!(result.sheet_only_codes, vec!["NEW"]);
    assert_eq!(result.price_mismatches, 1);
    assert_eq!(store.count(TENANT, INVENTORY_COLLECTION).unwrap(), 2);
}

#[tokio::test]
async fn sheet_failure_keeps_store_half() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    store
        .upsert(
            TENANT,
            INVENTORY_COLLECTION,
            "A-1",
            json!({"quantity": 1}).as_object().cloned().unwrap(),
            true,
        )
        .await
        .unwrap();
    let sheet = Arc::new(StaticSheet::unreachable());

    let mut orchestrator = SyncOrchestrator::new(store, sheet, config());
    let err = orchestrator.refresh().await.unwrap_err();

    assert!(matches!(err, SyncError::LoadFailure { source_name: "sheet", .. }));
    assert!(matches!(orchestrator.state(), SyncState::Error { .. }));
    let snapshot = orchestrator.snapshot();
    assert_eq!(snapshot.store_records.as_ref().unwrap().len(), 1);
    assert!(snapshot.sheet_records.is_none());
    let partial = snapshot.reconciliation.as_ref().unwrap();
    assert_eq!(partial.connection, ConnectionState::Error);
    assert_eq!(partial.total_store, 1);

    // a failed load never allows a write
    assert!(matches!(
        orchestrator.sync().await,
        Err(SyncError::InvalidState(_))
    ));
}

#[tokio::test]
async fn store_failure_keeps_sheet_half() {
    let mut failing = FailingStore::rejecting(&[]);
    failing.fail_reads = true;
    let sheet = Arc::new(StaticSheet::new(&sheet_text(&[("A", "1", "1")])));

    let mut orchestrator = SyncOrchestrator::new(Arc::new(failing), sheet, config());
    let err = orchestrator.refresh().await.unwrap_err();

    assert!(matches!(err, SyncError::LoadFailure { source_name: "store", .. }));
    assert_eq!(
        orchestrator.snapshot().sheet_records.as_ref().unwrap().len(),
        1
    );
}

#[tokio::test]
async fn missing_code_column_fails_refresh() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let sheet = Arc::new(StaticSheet::new("Nombre,Cantidad\nPantalla,2\n"));

    let mut orchestrator = SyncOrchestrator::new(store, sheet, config());
    let err = orchestrator.refresh().await.unwrap_err();
    assert!(matches!(err, SyncError::ConfigMissing(_)));
    assert!(matches!(orchestrator.state(), SyncState::Error { .. }));
}

#[tokio::test]
async fn sync_requires_refresh() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let sheet = Arc::new(StaticSheet::new(&sheet_text(&[("A", "1", "1")])));

    let mut orchestrator = SyncOrchestrator::new(store.clone(), sheet, config());
    assert!(matches!(
        orchestrator.sync().await,
        Err(SyncError::InvalidState(_))
    ));
    assert_eq!(orchestrator.state(), &SyncState::Idle);
    assert_eq!(store.count(TENANT, INVENTORY_COLLECTION).unwrap(), 0);
}

#[tokio::test]
async fn missing_exchange_rate_is_sync_error() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let sheet = Arc::new(StaticSheet::new(&sheet_text(&[("A", "1", "1")])));

    let mut orchestrator = SyncOrchestrator::new(store.clone(), sheet, config());
    orchestrator.refresh().await.unwrap();
    let err = orchestrator.sync().await.unwrap_err();

    assert!(matches!(err, SyncError::ConfigMissing(_)));
    assert!(matches!(orchestrator.state(), SyncState::SyncError { .. }));
    assert_eq!(store.count(TENANT, INVENTORY_COLLECTION).unwrap(), 0);
}

#[tokio::test]
async fn partial_failure_is_reported_inside_synced() {
    let failing = FailingStore::rejecting(&["B"]);
    failing.inner.set_manual_rate(TENANT, 2.0).unwrap();
    let sheet = Arc::new(StaticSheet::new(&sheet_text(&[("A", "1", "1"), ("B", "1", "1")])));

    let mut orchestrator = SyncOrchestrator::new(Arc::new(failing), sheet, config());
    orchestrator.refresh().await.unwrap();
    let outcome = orchestrator.sync().await.unwrap();

    assert_eq!(orchestrator.state(), &SyncState::Synced);
    assert_eq!(outcome.report.succeeded, 1);
    assert_eq!(outcome.report.failed, 1);
    assert!(outcome.exchange_rate.manual);
}

#[tokio::test]
async fn pushes_prices_after_sync() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    store.set_market_rate(TENANT, 10.0).unwrap();
    let sheet = Arc::new(StaticSheet::new(&sheet_text(&[("A", "2", "3")])));

    let mut orchestrator =
        SyncOrchestrator::new(store, sheet.clone(), config().with_push_prices(true));
    orchestrator.refresh().await.unwrap();
    let outcome = orchestrator.sync().await.unwrap();

    assert!(outcome.push_error.is_none());
    let pushed = sheet.pushed.lock().unwrap();
    assert_eq!(pushed.len(), 1);
    assert_eq!(pushed[0].code, "A");
    assert_eq!(pushed[0].price_local, 30.0);
}

#[tokio::test]
async fn push_failure_keeps_store_sync() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    store.set_market_rate(TENANT, 10.0).unwrap();
    let mut static_sheet = StaticSheet::new(&sheet_text(&[("A", "2", "3")]));
    static_sheet.fail_push = true;

    let mut orchestrator = SyncOrchestrator::new(
        store.clone(),
        Arc::new(static_sheet),
        config().with_push_prices(true),
    );
    orchestrator.refresh().await.unwrap();
    let outcome = orchestrator.sync().await.unwrap();

    assert!(outcome.push_error.is_some());
    assert_eq!(orchestrator.state(), &SyncState::Synced);
    assert_eq!(store.count(TENANT, INVENTORY_COLLECTION).unwrap(), 1);
}

#[tokio::test]
async fn refresh_after_sync_sees_matched_prices() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    store.set_market_rate(TENANT, 10.0).unwrap();
    let sheet = Arc::new(StaticSheet::new(&sheet_text(&[("A", "2", "3"), ("B", "0", "1.5")])));

    let mut orchestrator = SyncOrchestrator::new(store, sheet, config());
    orchestrator.refresh().await.unwrap();
    orchestrator.sync().await.unwrap();
    let result = orchestrator.refresh().await.unwrap();

    assert_eq!(result.matched, 2);
    assert_eq!(result.store_only, 0);
    assert_eq!(result.sheet_only, 0);
    assert_eq!(result.price_mismatches, 0);
    assert_eq!(result.low_stock, 2);
}

#[tokio::test]
async fn sync_merges_case_mismatched_code_into_stored_document() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    store.set_market_rate(TENANT, 10.0).unwrap();
    store
        .upsert(
            TENANT,
            INVENTORY_COLLECTION,
            "A-1",
            json!({"code": "A-1", "quantity": 2, "priceUSD": 9.0, "location": "Vitrina"})
                .as_object()
                .cloned()
                .unwrap(),
            true,
        )
        .await
        .unwrap();
    let sheet = Arc::new(StaticSheet::new(&sheet_text(&[("a-1", "2", "10")])));

    let mut orchestrator = SyncOrchestrator::new(store.clone(), sheet, config());
    orchestrator.refresh().await.unwrap();
    orchestrator.sync().await.unwrap();

    let stored = store.list_records(TENANT, INVENTORY_COLLECTION).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].key, "A-1");
    assert_eq!(stored[0].fields["priceUSD"], json!(10.0));
    assert_eq!(stored[0].fields["location"], json!("Vitrina"));

    let result = orchestrator.refresh().await.unwrap();
    assert_eq!(result.duplicate_codes, 0);
    assert_eq!(result.price_mismatches, 0);
}

#[tokio::test]
async fn sheet_without_name_columns_keeps_stored_names() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    store.set_market_rate(TENANT, 2.0).unwrap();
    store
        .upsert(
            TENANT,
            INVENTORY_COLLECTION,
            "A-1",
            json!({"code": "A-1", "name": "Pantalla OLED iPhone 12", "category": "Pantallas"})
                .as_object()
                .cloned()
                .unwrap(),
            true,
        )
        .await
        .unwrap();
    let sheet = Arc::new(StaticSheet::new("code,qty,precio usd\nA-1,5,12\n"));

    let mut orchestrator = SyncOrchestrator::new(store.clone(), sheet, config());
    orchestrator.refresh().await.unwrap();
    orchestrator.sync().await.unwrap();

    let doc = store.get(TENANT, INVENTORY_COLLECTION, "A-1").unwrap().unwrap();
    assert_eq!(doc["name"], json!("Pantalla OLED iPhone 12"));
    assert_eq!(doc["category"], json!("Pantallas"));
    assert_eq!(doc["quantity"], json!(5));
}

#[tokio::test]
async fn blank_tenant_moves_refresh_to_error() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let sheet = Arc::new(StaticSheet::new(&sheet_text(&[("A", "1", "1")])));

    let mut orchestrator =
        SyncOrchestrator::new(store, sheet, SyncConfig::new("  ", "sheet-1"));
    let err = orchestrator.refresh().await.unwrap_err();

    assert!(matches!(err, SyncError::ConfigMissing(_)));
    assert!(matches!(orchestrator.state(), SyncState::Error { .. }));
}

#[tokio::test]
async fn reconciliation_is_current_after_sync() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    store.set_market_rate(TENANT, 10.0).unwrap();
    let sheet = Arc::new(StaticSheet::new(&sheet_text(&[("A", "2", "3"), ("B", "9", "4")])));

    let mut orchestrator = SyncOrchestrator::new(store, sheet, config());
    let before = orchestrator.refresh().await.unwrap();
    assert_eq!(before.sheet_only, 2);

    orchestrator.sync().await.unwrap();
    assert_eq!(orchestrator.state(), &SyncState::Synced);
    let after = orchestrator.snapshot().reconciliation.as_ref().unwrap();
    assert_eq!(after.matched, 2);
    assert_eq!(after.sheet_only, 0);
    assert_eq!(after.price_mismatches, 0);
    assert_eq!(orchestrator.snapshot().store_records.as_ref().unwrap().len(), 2);
}
