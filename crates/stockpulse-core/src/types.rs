//! # Domain Types
//!
//! Core domain types used throughout Stockpulse.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │  UploadRecord   │   │    SalesRow     │   │  InventoryRow   │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (i64)       │   │  invoice_id     │   │  move_id        │       │
//! │  │  record_type    │   │  invoice_date   │   │  move_date      │       │
//! │  │  file_path      │   │  item_id, qty   │   │  movement, qty  │       │
//! │  │  state ─────┐   │   │  unit_price     │   │  unit_cost      │       │
//! │  └─────────────┼───┘   └─────────────────┘   └─────────────────┘       │
//! │                ▼                                                        │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │  UploadState    │   │   RecordType    │   │  MovementType   │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  Uploaded       │   │  Sales          │   │  In   (+qty)    │       │
//! │  │  Validated{..}  │   │  Inventory      │   │  Out  (−qty)    │       │
//! │  │  Invalid{..}    │   └─────────────────┘   │  Adj  (+qty)    │       │
//! │  │  Processed{..}  │                         └─────────────────┘       │
//! │  │  Failed{..}     │                                                    │
//! │  └─────────────────┘                                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Upload Lifecycle
//! ```text
//!                 ┌─────────────┐
//!                 │  uploaded   │
//!                 └──────┬──────┘
//!            ┌───────────┴───────────┐
//!            ▼                       ▼
//!     ┌─────────────┐         ┌─────────────┐
//!     │  validated  │         │   invalid   │ (terminal)
//!     └──────┬──────┘         └─────────────┘
//!     ┌──────┴──────────┐
//!     ▼                 ▼
//! ┌───────────┐   ┌───────────┐
//! │ processed │   │  failed   │ (both terminal)
//! └───────────┘   └───────────┘
//! ```
//!
//! Each state carries exactly the fields that are meaningful in it, so an
//! `invalid` upload without an error message cannot be constructed.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;

// =============================================================================
// Record Type
// =============================================================================

/// The two kinds of tabular data an upload can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum RecordType {
    Sales,
    Inventory,
}

impl RecordType {
    /// Lowercase wire name (`"sales"` / `"inventory"`).
    pub const fn as_str(&self) -> &'static str {
        match self {
            RecordType::Sales => "sales",
            RecordType::Inventory => "inventory",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Case-insensitive; surrounding whitespace is ignored.
impl FromStr for RecordType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sales" => Ok(RecordType::Sales),
            "inventory" => Ok(RecordType::Inventory),
            _ => Err(ValidationError::UnknownType(s.to_string())),
        }
    }
}

// =============================================================================
// Movement Type
// =============================================================================

/// Inventory movement direction.
///
/// | Type | Effect on on-hand |
/// |------|-------------------|
/// | IN   | + qty             |
/// | OUT  | − qty             |
/// | ADJ  | + qty (qty may be negative) |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MovementType {
    In,
    Out,
    Adj,
}

impl MovementType {
    /// Parses a cell after trimming and upper-casing it.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "IN" => Some(MovementType::In),
            "OUT" => Some(MovementType::Out),
            "ADJ" => Some(MovementType::Adj),
            _ => None,
        }
    }

    /// Quantity with the movement's sign applied; `None` when `OUT` of
    /// `i64::MIN` cannot be negated.
    #[inline]
    pub fn signed_qty(&self, qty: i64) -> Option<i64> {
        match self {
            MovementType::Out => qty.checked_neg(),
            MovementType::In | MovementType::Adj => Some(qty),
        }
    }
}

impl fmt::Display for MovementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MovementType::In => "IN",
            MovementType::Out => "OUT",
            MovementType::Adj => "ADJ",
        })
    }
}

// =============================================================================
// Upload Status
// =============================================================================

/// Flat lifecycle status, as stored in the `uploads.status` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Uploaded,
    Validated,
    Invalid,
    Processed,
    Failed,
}

impl UploadStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            UploadStatus::Uploaded => "uploaded",
            UploadStatus::Validated => "validated",
            UploadStatus::Invalid => "invalid",
            UploadStatus::Processed => "processed",
            UploadStatus::Failed => "failed",
        }
    }

    /// Whether metrics may be computed from an upload in this status.
    #[inline]
    pub const fn is_ready(&self) -> bool {
        matches!(self, UploadStatus::Validated | UploadStatus::Processed)
    }
}

impl Default for UploadStatus {
    fn default() -> Self {
        UploadStatus::Uploaded
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UploadStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uploaded" => Ok(UploadStatus::Uploaded),
            "validated" => Ok(UploadStatus::Validated),
            "invalid" => Ok(UploadStatus::Invalid),
            "processed" => Ok(UploadStatus::Processed),
            "failed" => Ok(UploadStatus::Failed),
            other => Err(CoreError::InconsistentState(format!(
                "unknown status '{other}'"
            ))),
        }
    }
}

// =============================================================================
// Upload State
// =============================================================================

/// Lifecycle state with its per-state data.
///
/// Transitions consume the state and only succeed along the edges of the
/// lifecycle diagram above.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UploadState {
    Uploaded,
    Validated {
        row_count: usize,
        validated_at: DateTime<Utc>,
    },
    Invalid {
        error: String,
        validated_at: DateTime<Utc>,
    },
    Processed {
        row_count: usize,
        validated_at: DateTime<Utc>,
        processed_at: DateTime<Utc>,
    },
    Failed {
        error: String,
        validated_at: DateTime<Utc>,
        processed_at: DateTime<Utc>,
    },
}

impl UploadState {
    /// Flat status for storage and display.
    pub fn status(&self) -> UploadStatus {
        match self {
            UploadState::Uploaded => UploadStatus::Uploaded,
            UploadState::Validated { .. } => UploadStatus::Validated,
            UploadState::Invalid { .. } => UploadStatus::Invalid,
            UploadState::Processed { .. } => UploadStatus::Processed,
            UploadState::Failed { .. } => UploadStatus::Failed,
        }
    }

    pub fn row_count(&self) -> Option<usize> {
        match self {
            UploadState::Validated { row_count, .. } | UploadState::Processed { row_count, .. } => {
                Some(*row_count)
            }
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            UploadState::Invalid { error, .. } | UploadState::Failed { error, .. } => Some(error),
            _ => None,
        }
    }

    pub fn validated_at(&self) -> Option<DateTime<Utc>> {
        match self {
            UploadState::Uploaded => None,
            UploadState::Validated { validated_at, .. }
            | UploadState::Invalid { validated_at, .. }
            | UploadState::Processed { validated_at, .. }
            | UploadState::Failed { validated_at, .. } => Some(*validated_at),
        }
    }

    pub fn processed_at(&self) -> Option<DateTime<Utc>> {
        match self {
            UploadState::Processed { processed_at, .. } | UploadState::Failed { processed_at, .. } => {
                Some(*processed_at)
            }
            _ => None,
        }
    }

    /// uploaded → validated
    pub fn validated(self, row_count: usize, at: DateTime<Utc>) -> CoreResult<Self> {
        match self {
            UploadState::Uploaded => Ok(UploadState::Validated {
                row_count,
                validated_at: at,
            }),
            other => Err(other.transition_error(UploadStatus::Validated)),
        }
    }

    /// uploaded → invalid
    pub fn invalid(self, error: impl Into<String>, at: DateTime<Utc>) -> CoreResult<Self> {
        match self {
            UploadState::Uploaded => Ok(UploadState::Invalid {
                error: error.into(),
                validated_at: at,
            }),
            other => Err(other.transition_error(UploadStatus::Invalid)),
        }
    }

    /// validated → processed
    pub fn processed(self, at: DateTime<Utc>) -> CoreResult<Self> {
        match self {
            UploadState::Validated {
                row_count,
                validated_at,
            } => Ok(UploadState::Processed {
                row_count,
                validated_at,
                processed_at: at,
            }),
            other => Err(other.transition_error(UploadStatus::Processed)),
        }
    }

    /// validated → failed
    pub fn failed(self, error: impl Into<String>, at: DateTime<Utc>) -> CoreResult<Self> {
        match self {
            UploadState::Validated { validated_at, .. } => Ok(UploadState::Failed {
                error: error.into(),
                validated_at,
                processed_at: at,
            }),
            other => Err(other.transition_error(UploadStatus::Failed)),
        }
    }

    fn transition_error(&self, to: UploadStatus) -> CoreError {
        CoreError::InvalidTransition {
            from: self.status(),
            to,
        }
    }

    /// Rebuilds a state from its flat columns, rejecting combinations the
    /// lifecycle cannot produce.
    pub fn from_parts(
        status: UploadStatus,
        row_count: Option<usize>,
        error_msg: Option<String>,
        validated_at: Option<DateTime<Utc>>,
        processed_at: Option<DateTime<Utc>>,
    ) -> CoreResult<Self> {
        let missing = |field: &str| {
            CoreError::InconsistentState(format!("{status} upload without {field}"))
        };

        let state = match status {
            UploadStatus::Uploaded => UploadState::Uploaded,
            UploadStatus::Validated => UploadState::Validated {
                row_count: row_count.ok_or_else(|| missing("row_count"))?,
                validated_at: validated_at.ok_or_else(|| missing("validated_at"))?,
            },
            UploadStatus::Invalid => UploadState::Invalid {
                error: error_msg.ok_or_else(|| missing("error_msg"))?,
                validated_at: validated_at.ok_or_else(|| missing("validated_at"))?,
            },
            UploadStatus::Processed => UploadState::Processed {
                row_count: row_count.ok_or_else(|| missing("row_count"))?,
                validated_at: validated_at.ok_or_else(|| missing("validated_at"))?,
                processed_at: processed_at.ok_or_else(|| missing("processed_at"))?,
            },
            UploadStatus::Failed => UploadState::Failed {
                error: error_msg.ok_or_else(|| missing("error_msg"))?,
                validated_at: validated_at.ok_or_else(|| missing("validated_at"))?,
                processed_at: processed_at.ok_or_else(|| missing("processed_at"))?,
            },
        };
        Ok(state)
    }
}

impl Default for UploadState {
    fn default() -> Self {
        UploadState::Uploaded
    }
}

// =============================================================================
// Upload Record
// =============================================================================

/// One accepted file and everything known about it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadRecord {
    /// Monotonically assigned identifier.
    pub id: i64,

    /// Owner label; selects the storage subdirectory.
    pub owner: String,

    pub record_type: RecordType,

    /// Location of the stored bytes.
    pub file_path: String,

    /// Name as supplied by the uploader.
    pub original_filename: String,

    pub size_bytes: i64,

    /// SHA-256 of the stored bytes (hex). Absent until the file is committed.
    pub content_sha256: Option<String>,

    /// Header names observed during validation.
    pub detected_columns: Option<Vec<String>>,

    /// Grouping label for batch aggregation.
    pub batch_id: Option<String>,

    pub created_at: DateTime<Utc>,

    pub state: UploadState,
}

impl UploadRecord {
    #[inline]
    pub fn status(&self) -> UploadStatus {
        self.state.status()
    }

    #[inline]
    pub fn is_ready(&self) -> bool {
        self.status().is_ready()
    }

    /// Fails with `UploadNotReady` unless the upload is validated or processed.
    pub fn ensure_ready(&self) -> CoreResult<()> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(CoreError::UploadNotReady {
                id: self.id,
                status: self.status(),
            })
        }
    }

    /// Fails with `RecordTypeMismatch` when this upload is not of `expected` type.
    pub fn ensure_type(&self, expected: RecordType) -> CoreResult<()> {
        if self.record_type == expected {
            Ok(())
        } else {
            Err(CoreError::RecordTypeMismatch {
                id: self.id,
                expected: expected.to_string(),
                actual: self.record_type.to_string(),
            })
        }
    }

    pub fn summary(&self) -> UploadSummary {
        UploadSummary {
            id: self.id,
            record_type: self.record_type,
            original_filename: self.original_filename.clone(),
            status: self.status(),
            row_count: self.state.row_count(),
            error_msg: self.state.error().map(str::to_string),
            batch_id: self.batch_id.clone(),
            created_at: self.created_at,
            validated_at: self.state.validated_at(),
        }
    }
}

/// Listing entry for an upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadSummary {
    pub id: i64,
    pub record_type: RecordType,
    pub original_filename: String,
    pub status: UploadStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_msg: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validated_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Typed Rows
// =============================================================================

/// A decoded sales line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesRow {
    pub invoice_id: String,
    pub invoice_date: NaiveDate,
    pub customer_id: String,
    pub item_id: String,
    pub qty: i64,
    pub unit_price: Money,
}

impl SalesRow {
    /// Line revenue: `qty × unit_price`, `None` on overflow.
    #[inline]
    pub fn revenue(&self) -> Option<Money> {
        self.unit_price.checked_multiply_quantity(self.qty)
    }
}

/// A decoded inventory movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryRow {
    pub move_id: String,
    pub move_date: NaiveDate,
    pub item_id: String,
    pub movement: MovementType,
    pub qty: i64,
    pub unit_cost: Money,
}

impl InventoryRow {
    #[inline]
    pub fn signed_qty(&self) -> Option<i64> {
        self.movement.signed_qty(self.qty)
    }

    /// Whether this movement enters the weighted-average-cost basis.
    ///
    /// IN rows always do; ADJ rows only when they add stock.
    #[inline]
    pub fn is_cost_basis(&self) -> bool {
        match self.movement {
            MovementType::In => true,
            MovementType::Adj => self.qty > 0,
            MovementType::Out => false,
        }
    }
}

/// Decoded rows of one record type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordSet {
    Sales(Vec<SalesRow>),
    Inventory(Vec<InventoryRow>),
}

impl RecordSet {
    pub fn record_type(&self) -> RecordType {
        match self {
            RecordSet::Sales(_) => RecordType::Sales,
            RecordSet::Inventory(_) => RecordType::Inventory,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            RecordSet::Sales(rows) => rows.len(),
            RecordSet::Inventory(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends rows of the same type; returns `false` (and leaves `self`
    /// untouched) on a type mismatch.
    pub fn extend(&mut self, other: RecordSet) -> bool {
        match (self, other) {
            (RecordSet::Sales(rows), RecordSet::Sales(more)) => {
                rows.extend(more);
                true
            }
            (RecordSet::Inventory(rows), RecordSet::Inventory(more)) => {
                rows.extend(more);
                true
            }
            _ => false,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_type_parse() {
        assert_eq!("sales".parse::<RecordType>().unwrap(), RecordType::Sales);
        assert_eq!(" Inventory ".parse::<RecordType>().unwrap(), RecordType::Inventory);
        assert_eq!(
            "orders".parse::<RecordType>(),
            Err(ValidationError::UnknownType("orders".to_string()))
        );
    }

    #[test]
    fn test_movement_sign() {
        assert_eq!(MovementType::parse(" out "), Some(MovementType::Out));
        assert_eq!(MovementType::parse("xfer"), None);
        assert_eq!(MovementType::Out.signed_qty(5), Some(-5));
        assert_eq!(MovementType::Adj.signed_qty(-3), Some(-3));
        assert_eq!(MovementType::In.signed_qty(4), Some(4));
        assert_eq!(MovementType::Out.signed_qty(i64::MIN), None);
    }

    #[test]
    fn test_happy_path_lifecycle() {
        let now = Utc::now();
        let state = UploadState::Uploaded.validated(12, now).unwrap();
        assert_eq!(state.status(), UploadStatus::Validated);
        assert_eq!(state.row_count(), Some(12));

        let state = state.processed(now).unwrap();
        assert_eq!(state.status(), UploadStatus::Processed);
        assert_eq!(state.row_count(), Some(12));
        assert_eq!(state.validated_at(), Some(now));
        assert_eq!(state.processed_at(), Some(now));
    }

    #[test]
    fn test_illegal_transitions() {
        let now = Utc::now();
        let invalid = UploadState::Uploaded.invalid("Missing columns", now).unwrap();

        let err = invalid.clone().processed(now).unwrap_err();
        assert!(matches!(
            err,
            CoreError::InvalidTransition {
                from: UploadStatus::Invalid,
                to: UploadStatus::Processed
            }
        ));
        assert!(invalid.validated(1, now).is_err());
        assert!(UploadState::Uploaded.failed("boom", now).is_err());

        let validated = UploadState::Uploaded.validated(1, now).unwrap();
        assert!(validated.invalid("late", now).is_err());
    }

    #[test]
    fn test_from_parts_rejects_inconsistent_rows() {
        let now = Utc::now();
        assert!(UploadState::from_parts(UploadStatus::Invalid, None, None, Some(now), None).is_err());
        assert!(UploadState::from_parts(UploadStatus::Validated, Some(3), None, None, None).is_err());

        let state = UploadState::from_parts(
            UploadStatus::Failed,
            Some(3),
            Some("downstream".to_string()),
            Some(now),
            Some(now),
        )
        .unwrap();
        assert_eq!(state.error(), Some("downstream"));
        assert_eq!(state.row_count(), None);
    }

    #[test]
    fn test_state_serializes_tagged() {
        let json = serde_json::to_value(UploadState::Uploaded).unwrap();
        assert_eq!(json["status"], "uploaded");
    }

    #[test]
    fn test_cost_basis() {
        let row = |movement, qty| InventoryRow {
            move_id: "M".into(),
            move_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            item_id: "A".into(),
            movement,
            qty,
            unit_cost: Money::zero(),
        };
        assert!(row(MovementType::In, 1).is_cost_basis());
        assert!(row(MovementType::Adj, 2).is_cost_basis());
        assert!(!row(MovementType::Adj, -2).is_cost_basis());
        assert!(!row(MovementType::Out, 2).is_cost_basis());
    }

    #[test]
    fn test_record_set_extend() {
        let mut set = RecordSet::Sales(Vec::new());
        assert!(set.is_empty());
        assert!(!set.extend(RecordSet::Inventory(Vec::new())));
        assert!(set.extend(RecordSet::Sales(Vec::new())));
        assert_eq!(set.record_type(), RecordType::Sales);
    }
}
