//! Price string normalization
//!
//! Spreadsheet cells come in with currency prefixes and either locale's
//! separators ("$1.234,56", "US$ 1,234.56", "12.5"). Everything is folded
//! into a plain non-negative `f64`.

use crate::record::clamp_non_negative;
use log::debug;

/// Parses a free-form price string into a non-negative number.
///
/// # Arguments
/// * `raw` - A price cell such as `"$1.234,56"`, `"US$ 12.50"` or `"1,234.56"`
///
/// # Returns
/// The parsed price, or 0 for empty input, unparseable input or a negative result.
pub fn normalize_price(raw: &str) -> f64 {
    let stripped = strip_currency_marker(raw.trim());
    let compact: String = stripped.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return 0.0;
    }

    let cleaned = match (compact.rfind('.'), compact.rfind(',')) {
        // "1.234,56": comma is the decimal mark, dots group thousands
        (Some(dot), Some(comma)) if comma > dot => compact.replace('.', "").replace(',', "."),
        _ => compact.replace(',', ""),
    };

    match cleaned.parse::<f64>() {
        Ok(value) => clamp_non_negative(value),
        Err(e) => {
            debug!("Failed to parse price '{raw}': {e}");
            0.0
        }
    }
}

fn strip_currency_marker(value: &str) -> &str {
    let without = match value.get(..3) {
        Some(prefix) if prefix.eq_ignore_ascii_case("US$") => &value[3..],
        _ => value.strip_prefix('$').unwrap_or(value),
    };
    without.trim_start()
}
