//! Spreadsheet side of the reconciliation: CSV text to inventory records

mod client;

pub use client::{HttpSheetClient, PriceRow, SheetSource, DEFAULT_SHEETS_BASE_URL};

use crate::columns::ColumnMap;
use crate::currency::normalize_price;
use crate::error::Result;
use crate::record::{parse_quantity, InventoryRecord, Origin, SuppliedFields};
use crate::tabular::{non_empty_lines, parse_delimited_line};

/// Records parsed from one sheet export plus the rows that were dropped
#[derive(Debug, Default)]
pub struct SheetLoad {
    pub records: Vec<InventoryRecord>,
    /// Data rows skipped because their code cell was missing or empty
    pub skipped: usize,
}

/// Parse a full CSV export into sheet-origin records.
///
/// An empty or header-only export is a valid state and yields no records.
/// A header without a resolvable code column fails the whole load.
pub fn parse_sheet(raw_text: &str) -> Result<SheetLoad> {
    let lines = non_empty_lines(raw_text);
    if lines.len() < 2 {
        log::info!("Sheet has no data rows ({} non-empty lines)", lines.len());
        return Ok(SheetLoad::default());
    }

    let headers = parse_delimited_line(lines[0]);
    let columns = ColumnMap::resolve(&headers)?;
    log::debug!("Resolved sheet columns: {:?}", columns);

    let mut load = SheetLoad::default();
    for (line_num, line) in lines.iter().enumerate().skip(1) {
        let cells = parse_delimited_line(line);
        match record_from_cells(&cells, &columns) {
            Some(record) => load.records.push(record),
            None => {
                log::debug!("Skipping sheet line {}: no code", line_num + 1);
                load.skipped += 1;
            }
        }
    }

    log::info!(
        "Loaded {} records from sheet ({} rows skipped)",
        load.records.len(),
        load.skipped
    );
    Ok(load)
}

/// Parse a full CSV export, discarding the skip count
pub fn load_sheet_records(raw_text: &str) -> Result<Vec<InventoryRecord>> {
    parse_sheet(raw_text).map(|load| load.records)
}

fn record_from_cells(cells: &[String], columns: &ColumnMap) -> Option<InventoryRecord> {
    // blank cells count as absent, same as a missing column
    let cell = |index: Option<usize>| {
        index
            .and_then(|i| cells.get(i))
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
    };

    let code = cell(Some(columns.code))?;
    let category = cell(columns.category);
    let name = cell(columns.name);
    let quantity = cell(columns.quantity);
    let price_usd = cell(columns.price_usd);

    let mut record = InventoryRecord::new(
        code,
        category,
        name,
        quantity.map(parse_quantity).unwrap_or(0),
        price_usd.map(normalize_price).unwrap_or(0.0),
        cell(columns.price_local).map(normalize_price).unwrap_or(0.0),
        Origin::Sheet,
    )?;
    record.supplied = SuppliedFields {
        category: category.is_some(),
        name: name.is_some(),
        quantity: quantity.is_some(),
        price_usd: price_usd.is_some(),
    };
    Some(record)
}
