//! # CSV Table
//!
//! Parses upload bytes into a header-addressed table of string cells.
//!
//! ## Parsing Rules
//! - A leading UTF-8 byte-order mark is ignored
//! - Header names and cells are trimmed
//! - Every row must have as many cells as the header
//! - When a header name repeats, the first occurrence wins
//! - Blank lines are skipped
//!
//! The table is deliberately untyped: coercion belongs to
//! [`validation`](crate::validation), which reports failures per column.

use csv::{ReaderBuilder, StringRecord, Trim};

use crate::error::ValidationError;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// A parsed CSV file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvTable {
    headers: Vec<String>,
    rows: Vec<StringRecord>,
}

impl CsvTable {
    /// Parses CSV bytes.
    ///
    /// With `row_limit = Some(n)` reading stops after `n` data rows, so a
    /// caller enforcing a ceiling of `max` passes `max + 1` and checks
    /// whether the table came back longer than `max`.
    pub fn parse(bytes: &[u8], row_limit: Option<usize>) -> Result<Self, ValidationError> {
        let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);

        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .trim(Trim::All)
            .flexible(false)
            .from_reader(bytes);

        let headers = reader
            .headers()
            .map_err(|e| ValidationError::MalformedCsv(e.to_string()))?
            .iter()
            .map(|h| h.trim().to_string())
            .collect::<Vec<_>>();

        let mut rows = Vec::new();
        for record in reader.records() {
            if row_limit.is_some_and(|limit| rows.len() >= limit) {
                break;
            }
            let record = record.map_err(|e| ValidationError::MalformedCsv(e.to_string()))?;
            rows.push(record);
        }

        Ok(CsvTable { headers, rows })
    }

    /// Header names as they appear in the file.
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Number of data rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column by name (first occurrence).
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Required names absent from the header, in the order given.
    pub fn missing_columns(&self, required: &[&str]) -> Vec<String> {
        required
            .iter()
            .filter(|name| self.column_index(name).is_none())
            .map(|name| name.to_string())
            .collect()
    }

    /// Cells of one column, top to bottom.
    pub fn column<'a>(&'a self, name: &str) -> Option<impl Iterator<Item = &'a str> + 'a> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(move |row| row.get(idx).unwrap_or("")))
    }

    /// Cell at a 0-based row index, or `""` when the column is absent.
    pub fn cell(&self, row: usize, name: &str) -> &str {
        match (self.rows.get(row), self.column_index(name)) {
            (Some(record), Some(idx)) => record.get(idx).unwrap_or(""),
            _ => "",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_strips_bom_and_trims() {
        let table = CsvTable::parse(b"\xEF\xBB\xBF id , name\n 1 , a \n", None).unwrap();
        assert_eq!(table.headers(), &["id".to_string(), "name".to_string()]);
        assert_eq!(table.cell(0, "name"), "a");
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_row_limit_stops_reading() {
        let csv = b"a\n1\n2\n3\n4\n";
        let table = CsvTable::parse(csv, Some(3)).unwrap();
        assert_eq!(table.len(), 3);
        let table = CsvTable::parse(csv, None).unwrap();
        assert_eq!(table.len(), 4);
    }

    #[test]
    fn test_ragged_rows_are_malformed() {
        let err = CsvTable::parse(b"a,b\n1,2,3\n", None).unwrap_err();
        assert!(matches!(err, ValidationError::MalformedCsv(_)));
    }

    #[test]
    fn test_missing_columns_in_order() {
        let table = CsvTable::parse(b"qty,item_id\n", None).unwrap();
        assert!(table.is_empty());
        assert_eq!(
            table.missing_columns(&["invoice_id", "item_id", "unit_price"]),
            vec!["invoice_id".to_string(), "unit_price".to_string()]
        );
    }

    #[test]
    fn test_duplicate_header_first_wins() {
        let table = CsvTable::parse(b"qty,qty\n1,2\n", None).unwrap();
        let cells: Vec<&str> = table.column("qty").unwrap().collect();
        assert_eq!(cells, vec!["1"]);
        assert!(table.column("price").is_none());
    }
}
