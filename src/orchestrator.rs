//! Load, reconcile and sync sequencing for one tenant
//!
//! ```text
//! idle -> loading -> (loaded | error)
//! loaded -> reconciling                       (automatic)
//! reconciling -> syncing -> (synced | sync_error)   (explicit sync() only)
//! any -> loading                              (refresh())
//! ```
//!
//! Loading never writes. Writing to the store only happens through `sync()`.

use crate::apply::{apply_sheet_to_store, ApplyReport};
use crate::config::{ExchangeRateConfig, SyncConfig};
use crate::error::{Result, SyncError};
use crate::reconcile::{reconcile, ReconciliationResult};
use crate::record::InventoryRecord;
use crate::sheet::{parse_sheet, PriceRow, SheetLoad, SheetSource};
use crate::store::{load_store_records, DocumentStore};
use serde::Serialize;
use std::sync::Arc;

/// Where the orchestrator is in its cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SyncState {
    Idle,
    Loading,
    Loaded,
    /// Diff computed, waiting for an explicit sync
    Reconciling,
    Error { message: String },
    Syncing,
    Synced,
    SyncError { message: String },
}

/// Result of one explicit sync
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncOutcome {
    pub report: ApplyReport,
    pub exchange_rate: ExchangeRateConfig,
    /// Set when pushing prices back to the sheet failed
    pub push_error: Option<String>,
    /// RFC 3339 timestamp of when the writes settled
    pub synced_at: String,
}

/// Everything gathered by the last load and sync
#[derive(Debug, Clone, Default, Serialize)]
pub struct Snapshot {
    pub store_records: Option<Vec<InventoryRecord>>,
    pub sheet_records: Option<Vec<InventoryRecord>>,
    pub sheet_rows_skipped: usize,
    pub reconciliation: Option<ReconciliationResult>,
    pub last_sync: Option<SyncOutcome>,
}

/// Drives the load/reconcile/sync cycle against a store and a sheet
pub struct SyncOrchestrator {
    store: Arc<dyn DocumentStore>,
    sheet: Arc<dyn SheetSource>,
    config: SyncConfig,
    state: SyncState,
    snapshot: Snapshot,
}

impl SyncOrchestrator {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        sheet: Arc<dyn SheetSource>,
        config: SyncConfig,
    ) -> Self {
        Self {
            store,
            sheet,
            config,
            state: SyncState::Idle,
            snapshot: Snapshot::default(),
        }
    }

    pub fn state(&self) -> &SyncState {
        &self.state
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    async fn load_sheet(&self) -> Result<SheetLoad> {
        let text = self
            .sheet
            .fetch_sheet_text(&self.config.sheet_id, &self.config.tab_name)
            .await
            .map_err(|e| SyncError::load_failure("sheet", e))?;
        parse_sheet(&text)
    }

    /// Reload both sides and recompute the diff.
    ///
    /// Store and sheet are read concurrently. If either fails the state
    /// becomes `Error`, the error is returned, and whichever side did load
    /// stays available in the snapshot.
    pub async fn refresh(&mut self) -> Result<ReconciliationResult> {
        if let Err(e) = self.config.validate() {
            log::error!("Refresh rejected: {}", e);
            self.transition(SyncState::Error {
                message: e.to_string(),
            });
            return Err(e);
        }
        self.transition(SyncState::Loading);
        log::info!("Refreshing inventory for tenant {}", self.config.tenant_id);

        let (store_result, sheet_result) = tokio::join!(
            load_store_records(self.store.as_ref(), &self.config.tenant_id),
            self.load_sheet()
        );

        let mut failure = None;
        self.snapshot.store_records = match store_result {
            Ok(records) => Some(records),
            Err(e) => {
                log::error!("Store load failed: {}", e);
                failure = Some(e);
                None
            }
        };
        match sheet_result {
            Ok(load) => {
                self.snapshot.sheet_records = Some(load.records);
                self.snapshot.sheet_rows_skipped = load.skipped;
            }
            Err(e) => {
                log::error!("Sheet load failed: {}", e);
                self.snapshot.sheet_records = None;
                self.snapshot.sheet_rows_skipped = 0;
                if failure.is_none() {
                    failure = Some(e);
                }
            }
        }

        if let Some(e) = failure {
            // keep the half that loaded visible for degraded display
            self.snapshot.reconciliation = Some(self.reconcile_snapshot().with_error());
            self.transition(SyncState::Error {
                message: e.to_string(),
            });
            return Err(e);
        }

        self.transition(SyncState::Loaded);
        let result = self.reconcile_snapshot();
        self.snapshot.reconciliation = Some(result.clone());
        self.transition(SyncState::Reconciling);
        Ok(result)
    }

    fn reconcile_snapshot(&self) -> ReconciliationResult {
        reconcile(
            self.snapshot.store_records.as_deref().unwrap_or_default(),
            self.snapshot.sheet_records.as_deref().unwrap_or_default(),
            self.config.low_stock_threshold,
        )
    }

    fn transition(&mut self, next: SyncState) {
        log::debug!("Sync state: {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Apply the loaded sheet records to the store.
    ///
    /// Only valid once a refresh has completed successfully. Individual
    /// record failures are reported inside the outcome; only an unreachable
    /// store or a missing exchange rate moves the state to `SyncError`.
    /// After the writes the store side is read again so the snapshot's
    /// reconciliation reflects the synced store.
    pub async fn sync(&mut self) -> Result<SyncOutcome> {
        if !matches!(
            self.state,
            SyncState::Reconciling | SyncState::Synced | SyncState::SyncError { .. }
        ) {
            return Err(SyncError::InvalidState(format!(
                "cannot sync from state {:?}, refresh first",
                self.state
            )));
        }
        let Some(sheet_records) = self.snapshot.sheet_records.clone() else {
            return Err(SyncError::InvalidState("no sheet records loaded".to_string()));
        };

        let store_records = self.snapshot.store_records.clone().unwrap_or_default();

        self.transition(SyncState::Syncing);
        match self.run_sync(&sheet_records, &store_records).await {
            Ok(outcome) => {
                self.snapshot.last_sync = Some(outcome.clone());
                self.reload_store_half().await;
                self.transition(SyncState::Synced);
                Ok(outcome)
            }
            Err(e) => {
                log::error!("Sync failed: {}", e);
                self.transition(SyncState::SyncError {
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Re-read the store after a sync and recompute the diff against the
    /// sheet records already loaded. A failed read keeps the old snapshot.
    async fn reload_store_half(&mut self) {
        let reloaded = load_store_records(self.store.as_ref(), &self.config.tenant_id).await;
        match reloaded {
            Ok(records) => {
                self.snapshot.store_records = Some(records);
                self.snapshot.reconciliation = Some(self.reconcile_snapshot());
            }
            Err(e) => log::warn!("Could not re-read store after sync: {}", e),
        }
    }

    async fn run_sync(
        &self,
        sheet_records: &[InventoryRecord],
        store_records: &[InventoryRecord],
    ) -> Result<SyncOutcome> {
        let tenant_id = &self.config.tenant_id;
        let exchange_rate = self.store.get_exchange_rate(tenant_id).await?;
        let rate = exchange_rate.resolve_rate()?;

        let report = apply_sheet_to_store(
            self.store.as_ref(),
            tenant_id,
            sheet_records,
            store_records,
            rate,
            self.config.max_reported_errors,
        )
        .await?;

        let push_error = if self.config.push_prices && !report.applied.is_empty() {
            self.push_prices(&report.applied).await.err().map(|e| {
                log::warn!("Price push to sheet failed, store sync kept: {}", e);
                e.to_string()
            })
        } else {
            None
        };

        Ok(SyncOutcome {
            report,
            exchange_rate,
            push_error,
            synced_at: chrono::Utc::now().to_rfc3339(),
        })
    }

    async fn push_prices(&self, applied: &[InventoryRecord]) -> Result<()> {
        let rows: Vec<PriceRow> = applied.iter().map(PriceRow::from).collect();
        self.sheet
            .push_price_rows(&self.config.sheet_id, &self.config.tab_name, &rows)
            .await
    }
}
