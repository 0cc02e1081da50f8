//! # Error Types
//!
//! Domain-specific error types for stockpulse-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  stockpulse-core errors (this file)                                    │
//! │  ├── CoreError        - Lifecycle, readiness, batch, contract errors   │
//! │  └── ValidationError  - Upload/CSV validation failures                 │
//! │                                                                         │
//! │  stockpulse-db errors (separate crate)                                 │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  stockpulse-engine errors                                              │
//! │  └── EngineError      - Storage, config, insight collaborator          │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → EngineError → CLI                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Expected vs Unexpected
//! A `ValidationError` raised while validating a stored upload is *expected*:
//! it is written onto the upload (`status = invalid`, `error_msg`) and handed
//! back as data. Only acceptance-time rejections, where no upload exists yet,
//! travel as `Err`.

use thiserror::Error;

use crate::types::UploadStatus;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The upload lifecycle does not allow this transition.
    ///
    /// ## When This Occurs
    /// - Marking an `invalid` upload as `processed`
    /// - Validating an upload twice
    /// - Failing an upload that was never validated
    #[error("Cannot move upload from {from} to {to}")]
    InvalidTransition { from: UploadStatus, to: UploadStatus },

    /// Metrics or insight were requested for an upload that is not ready.
    ///
    /// ## User Workflow
    /// ```text
    /// upload (status: uploaded)
    ///      │
    ///      ▼
    /// dashboard(id)
    ///      │
    ///      ▼
    /// UploadNotReady { id, status: uploaded }
    /// ```
    #[error("Upload {id} is not ready: {status}")]
    UploadNotReady { id: i64, status: UploadStatus },

    /// A referenced upload does not exist.
    #[error("Upload not found: {0}")]
    UploadNotFound(i64),

    /// A pair selection needs an upload of this type but none was given.
    #[error("No ready {record_type} upload was selected")]
    MissingPairMember { record_type: String },

    /// A pair member has the wrong record type.
    #[error("Upload {id} is {actual}, expected {expected}")]
    RecordTypeMismatch {
        id: i64,
        expected: String,
        actual: String,
    },

    /// The batch has no validated or processed upload of either type.
    #[error("No validated uploads in batch '{batch_id}'")]
    NoDataInBatch { batch_id: String },

    /// Data that passed validation no longer decodes.
    ///
    /// ## When This Occurs
    /// - The backing file was modified after validation
    /// - A validator/engine rule mismatch (a bug)
    #[error("Upload {upload_id} violates its validated contract: {reason}")]
    ContractViolation { upload_id: i64, reason: String },

    /// An aggregate left the range of its numeric type.
    ///
    /// Validated rows stay inside `MAX_QUANTITY`/`MAX_AMOUNT`, so this only
    /// surfaces for rows built outside validation. Callers that know the
    /// upload report it as a `ContractViolation`.
    #[error("Arithmetic overflow while computing {metric}")]
    MetricOverflow { metric: &'static str },

    /// A persisted lifecycle row is internally inconsistent.
    #[error("Inconsistent upload state: {0}")]
    InconsistentState(String),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Upload and CSV validation errors.
///
/// The first seven variants mirror the intake taxonomy; the `Display`
/// strings are what ends up in the upload's `error_msg`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The filename does not carry a `.csv` extension.
    #[error("Unsupported format: only .csv files are accepted (got '{filename}')")]
    UnsupportedFormat { filename: String },

    /// The record type is neither `sales` nor `inventory`.
    #[error("Unknown record type '{0}': expected sales or inventory")]
    UnknownType(String),

    /// One or more required columns are absent from the header.
    #[error("Missing columns: {missing:?}")]
    MissingColumns { missing: Vec<String> },

    /// The file has more data rows than the ceiling allows.
    #[error("Row limit exceeded: at most {max} rows are allowed")]
    RowLimitExceeded { max: usize },

    /// A date or numeric cell could not be coerced.
    #[error("Type/date error in column '{column}' at row {row}: '{value}' {reason}")]
    TypeOrDateParseError {
        column: String,
        row: usize,
        value: String,
        reason: String,
    },

    /// A movement type outside `IN`, `OUT`, `ADJ`.
    #[error("Invalid value in column '{column}' at row {row}: '{value}' (type must be IN|OUT|ADJ)")]
    InvalidEnumValue {
        column: String,
        row: usize,
        value: String,
    },

    /// The CSV structure itself is unreadable (ragged rows, bad UTF-8).
    #[error("Malformed CSV: {0}")]
    MalformedCsv(String),

    /// The upload body is larger than the configured byte limit.
    #[error("File too large: {size} bytes exceeds the {max_bytes} byte limit")]
    FileTooLarge { size: u64, max_bytes: u64 },

    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },
}

impl ValidationError {
    /// Missing column names, when this is a `MissingColumns` error.
    pub fn missing_columns(&self) -> Option<&[String]> {
        match self {
            ValidationError::MissingColumns { missing } => Some(missing),
            _ => None,
        }
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = ValidationError::MissingColumns {
            missing: vec!["qty".to_string(), "unit_price".to_string()],
        };
        assert_eq!(err.to_string(), r#"Missing columns: ["qty", "unit_price"]"#);

        let err = ValidationError::RowLimitExceeded { max: 100 };
        assert_eq!(err.to_string(), "Row limit exceeded: at most 100 rows are allowed");
    }

    #[test]
    fn test_not_ready_message() {
        let err = CoreError::UploadNotReady {
            id: 7,
            status: UploadStatus::Invalid,
        };
        assert_eq!(err.to_string(), "Upload 7 is not ready: invalid");
    }

    #[test]
    fn test_missing_columns_accessor() {
        let err = ValidationError::MissingColumns {
            missing: vec!["move_date".to_string()],
        };
        assert_eq!(err.missing_columns(), Some(&["move_date".to_string()][..]));
        assert!(ValidationError::RowLimitExceeded { max: 1 }
            .missing_columns()
            .is_none());
    }

    #[test]
    fn test_overflow_message() {
        let err = CoreError::MetricOverflow { metric: "revenue" };
        assert_eq!(err.to_string(), "Arithmetic overflow while computing revenue");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::UnknownType("orders".to_string());
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
