//! # Validation Module
//!
//! Upload acceptance checks and the all-or-nothing table validator.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Acceptance (no record exists yet → Err to caller)            │
//! │  ├── validate_filename      .csv only                                  │
//! │  ├── parse_record_type      sales | inventory                          │
//! │  ├── validate_upload_size   byte ceiling                               │
//! │  └── validate_batch_id      optional, ≤ 64 chars                       │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Table validation (recorded on the upload as `invalid`)       │
//! │  ├── required columns present                                          │
//! │  ├── row count ≤ ceiling                                               │
//! │  ├── date column     strict YYYY-MM-DD                                 │
//! │  ├── numeric columns integers / non-negative amounts, both bounded     │
//! │  └── enum column     IN | OUT | ADJ (inventory only)                   │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite CHECK constraints on type and status)       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Columns are checked one at a time in the order above, so the first
//! failing *column* is reported, and within it the first failing row.
//! Columns outside the required set never block ingestion.
//!
//! ## Usage
//! ```rust
//! use stockpulse_core::validation::{validate_filename, validate_table};
//! use stockpulse_core::table::CsvTable;
//! use stockpulse_core::{RecordType, ValidationError};
//!
//! validate_filename("march.csv").unwrap();
//!
//! let table = CsvTable::parse(b"move_id,move_date,item_id,type,qty,unit_cost\n\
//!                               M1,2024-03-01,A,XFER,1,2\n", None).unwrap();
//! let err = validate_table(RecordType::Inventory, &table, 100).unwrap_err();
//! assert!(matches!(err, ValidationError::InvalidEnumValue { row: 1, .. }));
//! ```

use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::error::ValidationError;
use crate::money::Money;
use crate::schema::{schema_for, NumericKind};
use crate::table::CsvTable;
use crate::types::{InventoryRow, MovementType, RecordSet, RecordType, SalesRow};
use crate::{MAX_AMOUNT, MAX_BATCH_ID_LEN, MAX_QUANTITY};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Acceptance Validators
// =============================================================================

/// Validates an upload filename.
///
/// ## Rules
/// - Must not be empty
/// - Must end in `.csv` (case-insensitive)
///
/// ## Example
/// ```rust
/// use stockpulse_core::validation::validate_filename;
///
/// assert!(validate_filename("Sales.CSV").is_ok());
/// assert!(validate_filename("sales.xlsx").is_err());
/// ```
pub fn validate_filename(filename: &str) -> ValidationResult<()> {
    let trimmed = filename.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::Required {
            field: "filename".to_string(),
        });
    }

    if !trimmed.to_ascii_lowercase().ends_with(".csv") {
        return Err(ValidationError::UnsupportedFormat {
            filename: filename.to_string(),
        });
    }

    Ok(())
}

/// Parses the record-type discriminator supplied with an upload.
pub fn parse_record_type(value: &str) -> ValidationResult<RecordType> {
    value.parse()
}

/// Rejects payloads larger than `max_bytes`.
pub fn validate_upload_size(size: u64, max_bytes: u64) -> ValidationResult<()> {
    if size > max_bytes {
        return Err(ValidationError::FileTooLarge { size, max_bytes });
    }
    Ok(())
}

/// Normalizes an optional batch identifier.
///
/// Blank input means "no batch" and yields `None`.
pub fn validate_batch_id(batch_id: Option<&str>) -> ValidationResult<Option<String>> {
    let Some(batch_id) = batch_id.map(str::trim).filter(|b| !b.is_empty()) else {
        return Ok(None);
    };

    if batch_id.chars().count() > MAX_BATCH_ID_LEN {
        return Err(ValidationError::TooLong {
            field: "batch_id".to_string(),
            max: MAX_BATCH_ID_LEN,
        });
    }

    Ok(Some(batch_id.to_string()))
}

// =============================================================================
// Table Validation
// =============================================================================

/// Validates a parsed table against its record type and decodes it.
///
/// `table` should have been parsed with a row limit of `max_rows + 1` so an
/// over-long file is detected without reading all of it.
///
/// ## Errors
/// - `MissingColumns` listing every absent required column
/// - `RowLimitExceeded` when the table has more than `max_rows` rows
/// - `TypeOrDateParseError` for the first bad date or numeric cell
/// - `InvalidEnumValue` for the first bad movement type
pub fn validate_table(
    record_type: RecordType,
    table: &CsvTable,
    max_rows: usize,
) -> ValidationResult<RecordSet> {
    let schema = schema_for(record_type);

    let missing = table.missing_columns(schema.columns);
    if !missing.is_empty() {
        return Err(ValidationError::MissingColumns { missing });
    }

    if table.len() > max_rows {
        return Err(ValidationError::RowLimitExceeded { max: max_rows });
    }

    decode_rows(record_type, table)
}

/// Decodes every row of a table into typed rows.
///
/// Assumes the required columns are present; a missing one is reported as
/// `MissingColumns`. Metrics loading calls this directly on files that were
/// already validated.
pub fn decode_rows(record_type: RecordType, table: &CsvTable) -> ValidationResult<RecordSet> {
    let schema = schema_for(record_type);

    let missing = table.missing_columns(schema.columns);
    if !missing.is_empty() {
        return Err(ValidationError::MissingColumns { missing });
    }

    let dates = parse_date_column(table, schema.date_column)?;

    let mut quantities = Vec::new();
    let mut amounts = Vec::new();
    for (column, kind) in schema.numeric_columns {
        match kind {
            NumericKind::Integer { allow_negative } => {
                quantities = parse_integer_column(table, column, *allow_negative)?;
            }
            NumericKind::Amount => {
                amounts = parse_amount_column(table, column)?;
            }
        }
    }

    let rows = dates.into_iter().zip(quantities).zip(amounts).enumerate();

    match record_type {
        RecordType::Sales => Ok(RecordSet::Sales(
            rows.map(|(i, ((invoice_date, qty), unit_price))| SalesRow {
                invoice_id: table.cell(i, "invoice_id").to_string(),
                invoice_date,
                customer_id: table.cell(i, "customer_id").to_string(),
                item_id: table.cell(i, "item_id").to_string(),
                qty,
                unit_price,
            })
            .collect(),
        )),
        RecordType::Inventory => {
            let column = schema.enum_column.unwrap_or("type");
            let movements = parse_movement_column(table, column)?;
            Ok(RecordSet::Inventory(
                rows.zip(movements)
                    .map(|((i, ((move_date, qty), unit_cost)), movement)| InventoryRow {
                        move_id: table.cell(i, "move_id").to_string(),
                        move_date,
                        item_id: table.cell(i, "item_id").to_string(),
                        movement,
                        qty,
                        unit_cost,
                    })
                    .collect(),
            ))
        }
    }
}

// =============================================================================
// Column Parsers
// =============================================================================

/// Parses `YYYY-MM-DD` and nothing else: no time part, no single-digit
/// month or day, no other separators.
pub fn parse_iso_date(value: &str) -> Option<NaiveDate> {
    let bytes = value.as_bytes();
    if bytes.len() != 10 || bytes[4] != b'-' || bytes[7] != b'-' {
        return None;
    }
    let digits_ok = bytes
        .iter()
        .enumerate()
        .all(|(i, b)| i == 4 || i == 7 || b.is_ascii_digit());
    if !digits_ok {
        return None;
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}

fn cells<'a>(table: &'a CsvTable, column: &str) -> ValidationResult<Vec<&'a str>> {
    table
        .column(column)
        .map(Iterator::collect)
        .ok_or_else(|| ValidationError::MissingColumns {
            missing: vec![column.to_string()],
        })
}

fn parse_error(column: &str, row: usize, value: &str, reason: &str) -> ValidationError {
    ValidationError::TypeOrDateParseError {
        column: column.to_string(),
        row: row + 1,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_date_column(table: &CsvTable, column: &str) -> ValidationResult<Vec<NaiveDate>> {
    cells(table, column)?
        .into_iter()
        .enumerate()
        .map(|(row, value)| {
            parse_iso_date(value)
                .ok_or_else(|| parse_error(column, row, value, "is not a YYYY-MM-DD date"))
        })
        .collect()
}

fn parse_integer_column(
    table: &CsvTable,
    column: &str,
    allow_negative: bool,
) -> ValidationResult<Vec<i64>> {
    cells(table, column)?
        .into_iter()
        .enumerate()
        .map(|(row, value)| {
            let number = value
                .parse::<Money>()
                .map_err(|_| parse_error(column, row, value, "is not a number"))?
                .amount();
            if !number.fract().is_zero() {
                return Err(parse_error(column, row, value, "is not a whole number"));
            }
            let qty = number
                .trunc()
                .to_i64()
                .ok_or_else(|| parse_error(column, row, value, "is out of range"))?;
            if qty < 0 && !allow_negative {
                return Err(parse_error(column, row, value, "must not be negative"));
            }
            if qty.unsigned_abs() > MAX_QUANTITY.unsigned_abs() {
                return Err(parse_error(column, row, value, "exceeds the supported range"));
            }
            Ok(qty)
        })
        .collect()
}

fn parse_amount_column(table: &CsvTable, column: &str) -> ValidationResult<Vec<Money>> {
    cells(table, column)?
        .into_iter()
        .enumerate()
        .map(|(row, value)| {
            let amount = value
                .parse::<Money>()
                .map_err(|_| parse_error(column, row, value, "is not a number"))?;
            if amount.is_negative() {
                return Err(parse_error(column, row, value, "must not be negative"));
            }
            if amount.amount() > Decimal::from(MAX_AMOUNT) {
                return Err(parse_error(column, row, value, "exceeds the supported range"));
            }
            Ok(amount)
        })
        .collect()
}

fn parse_movement_column(table: &CsvTable, column: &str) -> ValidationResult<Vec<MovementType>> {
    cells(table, column)?
        .into_iter()
        .enumerate()
        .map(|(row, value)| {
            MovementType::parse(value).ok_or_else(|| ValidationError::InvalidEnumValue {
                column: column.to_string(),
                row: row + 1,
                value: value.to_string(),
            })
        })
        .collect()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const SALES_HEADER: &str = "invoice_id,invoice_date,customer_id,item_id,qty,unit_price\n";
    const INVENTORY_HEADER: &str = "move_id,move_date,item_id,type,qty,unit_cost\n";

    fn table(csv: &str) -> CsvTable {
        CsvTable::parse(csv.as_bytes(), Some(101)).unwrap()
    }

    fn sales_rows(n: usize) -> String {
        let mut csv = SALES_HEADER.to_string();
        for i in 0..n {
            csv.push_str(&format!("INV-{i},2024-01-01,C1,SKU-1,1,1.00\n"));
        }
        csv
    }

    #[test]
    fn test_validate_filename() {
        assert!(validate_filename("a.csv").is_ok());
        assert!(validate_filename("A.CsV").is_ok());
        assert!(matches!(
            validate_filename("a.txt"),
            Err(ValidationError::UnsupportedFormat { .. })
        ));
        assert!(matches!(
            validate_filename("  "),
            Err(ValidationError::Required { .. })
        ));
    }

    #[test]
    fn test_validate_batch_id() {
        assert_eq!(validate_batch_id(None).unwrap(), None);
        assert_eq!(validate_batch_id(Some("  ")).unwrap(), None);
        assert_eq!(validate_batch_id(Some(" q1 ")).unwrap(), Some("q1".to_string()));
        assert!(validate_batch_id(Some(&"x".repeat(65))).is_err());
    }

    #[test]
    fn test_validate_upload_size() {
        assert!(validate_upload_size(10, 10).is_ok());
        assert_eq!(
            validate_upload_size(11, 10),
            Err(ValidationError::FileTooLarge { size: 11, max_bytes: 10 })
        );
    }

    #[test]
    fn test_row_ceiling_is_inclusive() {
        let ok = validate_table(RecordType::Sales, &table(&sales_rows(100)), 100).unwrap();
        assert_eq!(ok.len(), 100);

        let err = validate_table(RecordType::Sales, &table(&sales_rows(101)), 100).unwrap_err();
        assert_eq!(err, ValidationError::RowLimitExceeded { max: 100 });
    }

    #[test]
    fn test_each_missing_sales_column_is_reported() {
        let columns = crate::schema::required_columns(RecordType::Sales);
        for dropped in columns {
            let header: Vec<&str> = columns.iter().copied().filter(|c| c != dropped).collect();
            let csv = format!("{}\n", header.join(","));
            let err = validate_table(RecordType::Sales, &table(&csv), 100).unwrap_err();
            assert_eq!(err.missing_columns(), Some(&[dropped.to_string()][..]));
        }
    }

    #[test]
    fn test_missing_columns_win_over_row_limit() {
        let csv = format!("invoice_id\n{}", "x\n".repeat(150));
        let err = validate_table(RecordType::Sales, &table(&csv), 100).unwrap_err();
        assert!(matches!(err, ValidationError::MissingColumns { .. }));
    }

    #[test]
    fn test_extra_columns_are_ignored() {
        let csv = "note,invoice_id,invoice_date,customer_id,item_id,qty,unit_price\n\
                   hello,INV-1,2024-01-02,C1,SKU-1,3,2.50\n";
        match validate_table(RecordType::Sales, &table(csv), 100).unwrap() {
            RecordSet::Sales(rows) => {
                assert_eq!(rows[0].qty, 3);
                assert_eq!(rows[0].unit_price.to_string(), "2.50");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_strict_dates() {
        assert!(parse_iso_date("2024-02-29").is_some());
        assert!(parse_iso_date("2023-02-29").is_none());
        assert!(parse_iso_date("2024-1-05").is_none());
        assert!(parse_iso_date("2024/01/05").is_none());
        assert!(parse_iso_date("2024-01-05T00:00").is_none());
        assert!(parse_iso_date("").is_none());

        let csv = format!("{SALES_HEADER}A,2024-01-01,C,I,1,1\nB,01/02/2024,C,I,1,1\n");
        let err = validate_table(RecordType::Sales, &table(&csv), 100).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::TypeOrDateParseError { ref column, row: 2, .. } if column == "invoice_date"
        ));
    }

    #[test]
    fn test_numeric_rules() {
        let csv = format!("{SALES_HEADER}A,2024-01-01,C,I,2.0,1\n");
        assert!(validate_table(RecordType::Sales, &table(&csv), 100).is_ok());

        for bad in ["abc", "1.5", "-1", ""] {
            let csv = format!("{SALES_HEADER}A,2024-01-01,C,I,{bad},1\n");
            let err = validate_table(RecordType::Sales, &table(&csv), 100).unwrap_err();
            assert!(
                matches!(err, ValidationError::TypeOrDateParseError { ref column, .. } if column == "qty"),
                "qty={bad} gave {err:?}"
            );
        }

        let csv = format!("{SALES_HEADER}A,2024-01-01,C,I,1,-0.5\n");
        assert!(validate_table(RecordType::Sales, &table(&csv), 100).is_err());
    }

    #[test]
    fn test_numbers_beyond_supported_range_are_rejected() {
        let cases = [
            (SALES_HEADER, "A,2024-01-01,C,I,9000000000000000000,100000000000", "qty"),
            (SALES_HEADER, "A,2024-01-01,C,I,1,1000000000000.01", "unit_price"),
            (INVENTORY_HEADER, "M1,2024-01-01,A,OUT,-9223372036854775808,1", "qty"),
            (INVENTORY_HEADER, "M1,2024-01-01,A,ADJ,-1000000001,1", "qty"),
        ];
        for (header, line, expected) in cases {
            let csv = format!("{header}{line}\n");
            let record_type = if header == SALES_HEADER {
                RecordType::Sales
            } else {
                RecordType::Inventory
            };
            let err = validate_table(record_type, &table(&csv), 100).unwrap_err();
            assert!(
                matches!(
                    err,
                    ValidationError::TypeOrDateParseError { ref column, ref reason, .. }
                        if column == expected && reason == "exceeds the supported range"
                ),
                "{line} gave {err:?}"
            );
        }

        let csv = format!("{SALES_HEADER}A,2024-01-01,C,I,{MAX_QUANTITY},{MAX_AMOUNT}\n");
        assert!(validate_table(RecordType::Sales, &table(&csv), 100).is_ok());
    }

    #[test]
    fn test_date_column_checked_before_numerics() {
        let csv = format!("{SALES_HEADER}A,2024-01-01,C,I,abc,1\nB,nope,C,I,1,1\n");
        let err = validate_table(RecordType::Sales, &table(&csv), 100).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::TypeOrDateParseError { ref column, .. } if column == "invoice_date"
        ));
    }

    #[test]
    fn test_inventory_movements() {
        let csv = format!(
            "{INVENTORY_HEADER}M1,2024-01-01,A,in,10,2\nM2,2024-01-02,A, Out ,3,2\nM3,2024-01-03,A,adj,-1,0\n"
        );
        let RecordSet::Inventory(rows) =
            validate_table(RecordType::Inventory, &table(&csv), 100).unwrap()
        else {
            panic!("expected inventory rows");
        };
        assert_eq!(rows[1].movement, MovementType::Out);
        assert_eq!(rows[2].qty, -1);

        let csv = format!("{INVENTORY_HEADER}M1,2024-01-01,A,IN,1,2\nM2,2024-01-01,A,MOVE,1,2\n");
        let err = validate_table(RecordType::Inventory, &table(&csv), 100).unwrap_err();
        assert_eq!(
            err,
            ValidationError::InvalidEnumValue {
                column: "type".to_string(),
                row: 2,
                value: "MOVE".to_string(),
            }
        );
    }

    #[test]
    fn test_header_only_file_validates_with_zero_rows() {
        let set = validate_table(RecordType::Inventory, &table(INVENTORY_HEADER), 100).unwrap();
        assert!(set.is_empty());
    }
}
