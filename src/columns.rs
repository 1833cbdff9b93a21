//! Header row resolution
//!
//! Spreadsheet tabs are maintained by hand, so column order and naming drift
//! ("Código", "Codigo", "code", "SKU"). Each semantic field carries a list of
//! acceptable synonyms, matched by substring against the folded header.

use crate::error::{Result, SyncError};

pub const CODE_CANDIDATES: &[&str] = &["codigo", "code", "sku", "cod"];
pub const CATEGORY_CANDIDATES: &[&str] = &["categoria", "category", "tipo"];
pub const NAME_CANDIDATES: &[&str] = &["nombre", "name", "descripcion", "producto"];
pub const QUANTITY_CANDIDATES: &[&str] = &["cantidad", "cant", "qty", "quantity"];
pub const PRICE_USD_CANDIDATES: &[&str] = &["precio usd", "usd", "price usd", "$"];
pub const PRICE_LOCAL_CANDIDATES: &[&str] = &["precio local", "local", "precio bs", "bs."];

/// Resolves the first header containing one of `candidates`.
///
/// Candidates are tried in priority order; for each, the first matching
/// header wins. Headers are lowercased and accent-folded before matching.
pub fn resolve_column<S: AsRef<str>>(headers: &[S], candidates: &[&str]) -> Option<usize> {
    let folded: Vec<String> = headers.iter().map(|h| fold_header(h.as_ref())).collect();

    candidates.iter().find_map(|candidate| {
        let candidate = fold_header(candidate);
        folded.iter().position(|header| header.contains(&candidate))
    })
}

/// Lowercase and strip the Spanish diacritics that show up in header labels
pub fn fold_header(header: &str) -> String {
    header
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'á' | 'à' | 'ä' => 'a',
            'é' | 'è' | 'ë' => 'e',
            'í' | 'ì' | 'ï' => 'i',
            'ó' | 'ò' | 'ö' => 'o',
            'ú' | 'ù' | 'ü' => 'u',
            'ñ' => 'n',
            other => other,
        })
        .collect()
}

/// Column indices for every inventory field found in a header row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnMap {
    pub code: usize,
    pub category: Option<usize>,
    pub name: Option<usize>,
    pub quantity: Option<usize>,
    pub price_usd: Option<usize>,
    pub price_local: Option<usize>,
}

impl ColumnMap {
    /// Resolve all fields from a header row.
    ///
    /// Fails with `ConfigMissing` when no code column is present: without a
    /// join key nothing in the sheet can be reconciled.
    pub fn resolve<S: AsRef<str>>(headers: &[S]) -> Result<Self> {
        let code = resolve_column(headers, CODE_CANDIDATES).ok_or_else(|| {
            SyncError::ConfigMissing(format!(
                "no code column in sheet header (expected one of {:?})",
                CODE_CANDIDATES
            ))
        })?;

        Ok(Self {
            code,
            category: resolve_column(headers, CATEGORY_CANDIDATES),
            name: resolve_column(headers, NAME_CANDIDATES),
            quantity: resolve_column(headers, QUANTITY_CANDIDATES),
            price_usd: resolve_column(headers, PRICE_USD_CANDIDATES),
            price_local: resolve_column(headers, PRICE_LOCAL_CANDIDATES),
        })
    }
}
