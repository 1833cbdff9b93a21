//! Delimited line splitting for spreadsheet CSV exports

/// Field delimiter used by the CSV export
pub const DELIMITER: char = ',';

const QUOTE: char = '"';

/// Splits one CSV line into trimmed cells.
///
/// A double quote toggles "inside quoted field"; delimiters inside quotes are
/// kept as cell text. A doubled quote inside a quoted field (`""`) yields a
/// literal quote character.
///
/// # Example
/// `A,"B, C",D` becomes `["A", "B, C", "D"]`.
pub fn parse_delimited_line(line: &str) -> Vec<String> {
    let mut cells = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            QUOTE if in_quotes && chars.peek() == Some(&QUOTE) => {
                current.push(QUOTE);
                chars.next();
            }
            QUOTE => in_quotes = !in_quotes,
            DELIMITER if !in_quotes => {
                cells.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(c),
        }
    }
    cells.push(current.trim().to_string());

    cells
}

/// Splits a block of text into its non-empty lines, dropping `\r` endings
pub fn non_empty_lines(text: &str) -> Vec<&str> {
    text.lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.trim().is_empty())
        .collect()
}
