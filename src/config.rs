//! Explicit per-call configuration
//!
//! Tenant scoping and the exchange rate are passed in as values rather than
//! read from shared state, so every load and apply is a function of its
//! arguments.

use crate::error::{Result, SyncError};
use serde::{Deserialize, Serialize};

/// Stock at or below this count is reported as low
pub const DEFAULT_LOW_STOCK_THRESHOLD: u32 = 5;

/// Upper bound on individual failures kept in an apply report
pub const DEFAULT_MAX_REPORTED_ERRORS: usize = 20;

/// Sheet tab read when none is configured
pub const DEFAULT_TAB_NAME: &str = "Inventario";

/// Settings for one tenant's reconciliation cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    pub tenant_id: String,
    pub sheet_id: String,
    pub tab_name: String,
    pub low_stock_threshold: u32,
    pub max_reported_errors: usize,
    /// Write applied prices back to the sheet after a store sync
    pub push_prices: bool,
}

impl SyncConfig {
    pub fn new(tenant_id: impl Into<String>, sheet_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            sheet_id: sheet_id.into(),
            tab_name: DEFAULT_TAB_NAME.to_string(),
            low_stock_threshold: DEFAULT_LOW_STOCK_THRESHOLD,
            max_reported_errors: DEFAULT_MAX_REPORTED_ERRORS,
            push_prices: false,
        }
    }

    pub fn with_tab(mut self, tab_name: impl Into<String>) -> Self {
        self.tab_name = tab_name.into();
        self
    }

    pub fn with_low_stock_threshold(mut self, threshold: u32) -> Self {
        self.low_stock_threshold = threshold;
        self
    }

    pub fn with_push_prices(mut self, push_prices: bool) -> Self {
        self.push_prices = push_prices;
        self
    }

    /// Reject configurations that cannot address a tenant or a sheet
    pub fn validate(&self) -> Result<()> {
        if self.tenant_id.trim().is_empty() {
            return Err(SyncError::ConfigMissing("tenant id is empty".to_string()));
        }
        if self.sheet_id.trim().is_empty() {
            return Err(SyncError::ConfigMissing("sheet id is empty".to_string()));
        }
        Ok(())
    }
}

/// Tenant exchange rate as stored: manual override or market value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRateConfig {
    pub manual: bool,
    pub rate: f64,
}

impl ExchangeRateConfig {
    /// The usable rate, or `ConfigMissing` if it is zero, negative or not finite
    pub fn resolve_rate(&self) -> Result<f64> {
        if self.rate.is_finite() && self.rate > 0.0 {
            Ok(self.rate)
        } else {
            Err(SyncError::ConfigMissing(format!(
                "invalid {} exchange rate: {}",
                if self.manual { "manual" } else { "market" },
                self.rate
            )))
        }
    }
}
