//! Canonical inventory record shared by both sides of a reconciliation

use serde::{Deserialize, Serialize};

/// Prefix of system-generated codes left behind by an interrupted import
pub const PLACEHOLDER_PREFIX: &str = "TEMP_";

/// Category used when the source has none
pub const DEFAULT_CATEGORY: &str = "Sin categoría";

/// Name used when the source has none
pub const DEFAULT_NAME: &str = "Sin nombre";

/// Where a record was loaded from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Store,
    Sheet,
}

/// Which fields a source actually carried for one record
///
/// Sheet tabs may leave out whole columns or individual cells. Only supplied
/// fields are written on a merge, so absent ones keep their stored values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuppliedFields {
    pub category: bool,
    pub name: bool,
    pub quantity: bool,
    pub price_usd: bool,
}

impl SuppliedFields {
    pub const ALL: Self = Self {
        category: true,
        name: true,
        quantity: true,
        price_usd: true,
    };
}

impl Default for SuppliedFields {
    fn default() -> Self {
        Self::ALL
    }
}

/// A single inventory line, normalized from either the store or the sheet
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InventoryRecord {
    pub code: String,
    pub category: String,
    pub name: String,
    pub quantity: u32,
    #[serde(rename = "priceUSD")]
    pub price_usd: f64,
    #[serde(rename = "priceLocal")]
    pub price_local: f64,
    /// Provenance tag, only meaningful during reconciliation
    #[serde(skip_serializing)]
    pub origin: Origin,
    /// Key of the stored document, set on store-origin records
    #[serde(skip)]
    pub doc_key: Option<String>,
    #[serde(skip)]
    pub supplied: SuppliedFields,
}

impl InventoryRecord {
    /// Build a record, trimming the code and filling in placeholder text
    ///
    /// Returns `None` when the code is empty after trimming.
    pub fn new(
        code: &str,
        category: Option<&str>,
        name: Option<&str>,
        quantity: u32,
        price_usd: f64,
        price_local: f64,
        origin: Origin,
    ) -> Option<Self> {
        let code = code.trim();
        if code.is_empty() {
            return None;
        }

        Some(Self {
            code: code.to_string(),
            category: non_empty_or(category, DEFAULT_CATEGORY),
            name: non_empty_or(name, DEFAULT_NAME),
            quantity,
            price_usd: clamp_non_negative(price_usd),
            price_local: clamp_non_negative(price_local),
            origin,
            doc_key: None,
            supplied: SuppliedFields::ALL,
        })
    }

    /// Case-insensitive join key
    pub fn key(&self) -> String {
        self.code.to_lowercase()
    }

    /// True when neither price has been set
    pub fn has_no_price(&self) -> bool {
        self.price_usd <= 0.0 && self.price_local <= 0.0
    }
}

fn non_empty_or(value: Option<&str>, default: &str) -> String {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => default.to_string(),
    }
}

/// Check whether a code was generated as a temporary import placeholder
pub fn is_placeholder_code(code: &str) -> bool {
    code.trim()
        .get(..PLACEHOLDER_PREFIX.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(PLACEHOLDER_PREFIX))
}

/// Map negative, NaN and infinite values to 0
pub fn clamp_non_negative(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

/// Floor a parsed quantity into the valid stock range
///
/// Explicit zero stays zero; anything unusable also becomes zero.
pub fn coerce_quantity(value: f64) -> u32 {
    if !value.is_finite() || value <= 0.0 {
        return 0;
    }
    let floored = value.floor();
    if floored >= u32::MAX as f64 {
        u32::MAX
    } else {
        floored as u32
    }
}

/// Parse a stock count cell into a whole quantity
///
/// A separator followed by exactly three digits is thousands grouping
/// ("1.000", "1,000"); any other trailing part after the last separator is
/// a fraction and gets floored ("1,5", "2.9"). Unparseable text is 0.
pub fn parse_quantity(raw: &str) -> u32 {
    let cleaned: String = raw.chars().filter(|c| !c.is_whitespace()).collect();

    let whole = match cleaned.rfind(|c: char| c == '.' || c == ',') {
        Some(pos) => {
            let tail = &cleaned[pos + 1..];
            if !tail.chars().all(|c| c.is_ascii_digit()) {
                return 0;
            }
            if tail.len() == 3 {
                cleaned.as_str()
            } else {
                &cleaned[..pos]
            }
        }
        None => cleaned.as_str(),
    };

    let digits: String = whole.chars().filter(|c| *c != '.' && *c != ',').collect();
    digits.parse::<f64>().map(coerce_quantity).unwrap_or(0)
}

#[cfg(test)]
pub use tests::make_test_record;
