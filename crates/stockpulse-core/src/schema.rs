//! # Table Schemas
//!
//! Required columns and coercion rules for each record type.
//!
//! ```text
//! sales:      invoice_id, invoice_date, customer_id, item_id, qty, unit_price
//!                         └── date ──┘                        └─ numeric ─┘
//! inventory:  move_id, move_date, item_id, type, qty, unit_cost
//!                      └─ date ─┘          └enum┘ └─ numeric ─┘
//! ```
//!
//! Columns beyond the required set are allowed and ignored.

use crate::types::RecordType;

/// How a numeric column is coerced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericKind {
    /// Whole number; `allow_negative` is false for sales quantities.
    Integer { allow_negative: bool },
    /// Non-negative decimal amount.
    Amount,
}

/// Column layout and coercion rules for one record type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSchema {
    pub record_type: RecordType,
    /// Required columns, in template order.
    pub columns: &'static [&'static str],
    /// The column coerced to a calendar date.
    pub date_column: &'static str,
    /// Numeric columns, in coercion order.
    pub numeric_columns: &'static [(&'static str, NumericKind)],
    /// The enumerated movement column, inventory only.
    pub enum_column: Option<&'static str>,
}

pub const SALES_SCHEMA: TableSchema = TableSchema {
    record_type: RecordType::Sales,
    columns: &[
        "invoice_id",
        "invoice_date",
        "customer_id",
        "item_id",
        "qty",
        "unit_price",
    ],
    date_column: "invoice_date",
    numeric_columns: &[
        ("qty", NumericKind::Integer { allow_negative: false }),
        ("unit_price", NumericKind::Amount),
    ],
    enum_column: None,
};

pub const INVENTORY_SCHEMA: TableSchema = TableSchema {
    record_type: RecordType::Inventory,
    columns: &["move_id", "move_date", "item_id", "type", "qty", "unit_cost"],
    date_column: "move_date",
    numeric_columns: &[
        // ADJ rows may carry a negative quantity
        ("qty", NumericKind::Integer { allow_negative: true }),
        ("unit_cost", NumericKind::Amount),
    ],
    enum_column: Some("type"),
};

/// Schema for a record type.
pub const fn schema_for(record_type: RecordType) -> &'static TableSchema {
    match record_type {
        RecordType::Sales => &SALES_SCHEMA,
        RecordType::Inventory => &INVENTORY_SCHEMA,
    }
}

/// Required column names for a record type.
pub fn required_columns(record_type: RecordType) -> &'static [&'static str] {
    schema_for(record_type).columns
}

/// A header-only CSV for a record type, ready to be filled in.
pub fn template_csv(record_type: RecordType) -> Vec<u8> {
    let mut line = required_columns(record_type).join(",");
    line.push('\n');
    line.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_columns() {
        assert_eq!(required_columns(RecordType::Sales).len(), 6);
        assert_eq!(required_columns(RecordType::Inventory)[3], "type");
    }

    #[test]
    fn test_template_is_header_only() {
        let template = String::from_utf8(template_csv(RecordType::Inventory)).unwrap();
        assert_eq!(template, "move_id,move_date,item_id,type,qty,unit_cost\n");
        assert_eq!(template.lines().count(), 1);
    }

    #[test]
    fn test_schema_rules() {
        assert_eq!(schema_for(RecordType::Sales).enum_column, None);
        assert_eq!(schema_for(RecordType::Inventory).date_column, "move_date");
    }
}
