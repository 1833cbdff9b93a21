//! Spreadsheet transport: CSV export download and price push-back

use crate::error::{Result, SyncError};
use crate::record::InventoryRecord;
use async_trait::async_trait;
use serde::Serialize;

/// Google Sheets host used for CSV exports
pub const DEFAULT_SHEETS_BASE_URL: &str = "https://docs.google.com";

/// One row written back to the sheet after a store sync
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceRow {
    pub code: String,
    pub category: String,
    pub name: String,
    pub quantity: u32,
    #[serde(rename = "priceLocal")]
    pub price_local: f64,
    #[serde(rename = "priceUSD")]
    pub price_usd: f64,
}

impl From<&InventoryRecord> for PriceRow {
    fn from(record: &InventoryRecord) -> Self {
        Self {
            code: record.code.clone(),
            category: record.category.clone(),
            name: record.name.clone(),
            quantity: record.quantity,
            price_local: record.price_local,
            price_usd: record.price_usd,
        }
    }
}

/// Source of the tabular inventory text
#[async_trait]
pub trait SheetSource: Send + Sync {
    /// Fetch the full tab contents as comma-separated text
    async fn fetch_sheet_text(&self, sheet_id: &str, tab_name: &str) -> Result<String>;

    /// Write price rows back to the tab (best-effort)
    async fn push_price_rows(&self, sheet_id: &str, tab_name: &str, rows: &[PriceRow])
        -> Result<()>;
}

/// Body posted to the push endpoint
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PushRequest<'a> {
    sheet_id: &'a str,
    tab: &'a str,
    rows: &'a [PriceRow],
}

/// reqwest-backed spreadsheet client
pub struct HttpSheetClient {
    client: reqwest::Client,
    base_url: String,
    push_url: Option<String>,
}

impl HttpSheetClient {
    /// Client against the public Google Sheets export endpoint, no push-back
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_SHEETS_BASE_URL)
    }

    /// Client against a custom host (used by tests)
    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            push_url: None,
        }
    }

    /// Enable price push-back through a web app endpoint
    pub fn with_push_url(mut self, push_url: impl Into<String>) -> Self {
        self.push_url = Some(push_url.into());
        self
    }

    /// CSV export URL for one tab
    pub fn export_url(&self, sheet_id: &str, tab_name: &str) -> String {
        format!(
            "{}/spreadsheets/d/{}/gviz/tq?tqx=out:csv&sheet={}",
            self.base_url,
            urlencoding::encode(sheet_id),
            urlencoding::encode(tab_name)
        )
    }
}

impl Default for HttpSheetClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SheetSource for HttpSheetClient {
    async fn fetch_sheet_text(&self, sheet_id: &str, tab_name: &str) -> Result<String> {
        let url = self.export_url(sheet_id, tab_name);
        log::info!("Fetching sheet '{}' tab '{}'", sheet_id, tab_name);

        let response = self
            .client
            .get(&url)
            .header("User-Agent", "stock_reconcile/1.0")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SyncError::HttpStatus(response.status()));
        }

        let text = response.text().await?;
        log::debug!("Fetched {} bytes of sheet text", text.len());
        Ok(text)
    }

    async fn push_price_rows(
        &self,
        sheet_id: &str,
        tab_name: &str,
        rows: &[PriceRow],
    ) -> Result<()> {
        let Some(push_url) = &self.push_url else {
            log::warn!("No push endpoint configured, skipping price push");
            return Ok(());
        };

        log::info!("Pushing {} price rows to sheet '{}'", rows.len(), sheet_id);
        let response = self
            .client
            .post(push_url)
            .json(&PushRequest {
                sheet_id,
                tab: tab_name,
                rows,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SyncError::HttpStatus(response.status()));
        }
        Ok(())
    }
}
