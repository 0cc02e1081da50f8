//! # stockpulse-core: Pure Business Logic for Stockpulse
//!
//! This crate holds the data-shape rules and the numeric semantics of the
//! ingestion engine. Everything here is a pure function over bytes or typed
//! rows; reading files, talking to SQLite and calling the insight service
//! all happen in the crates above it.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Stockpulse Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                       apps/cli                                  │   │
//! │  │     template ──► upload ──► dashboard ──► pair / batch insight  │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │     stockpulse-engine (Intake, Aggregator, FileStore, Insight)  │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │            ★ stockpulse-core (THIS CRATE) ★                     │   │
//! │  │                                                                 │   │
//! │  │  ┌─────────┐ ┌─────────┐ ┌────────────┐ ┌─────────┐ ┌────────┐ │   │
//! │  │  │ schema  │ │  table  │ │ validation │ │ metrics │ │ types  │ │   │
//! │  │  │ columns │ │  CSV    │ │ all-or-    │ │ KPIs &  │ │ state  │ │   │
//! │  │  │ per type│ │  bytes  │ │ nothing    │ │ trends  │ │ machine│ │   │
//! │  │  └─────────┘ └─────────┘ └────────────┘ └─────────┘ └────────┘ │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 stockpulse-db (Database Layer)                  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`schema`] - Required columns and coercion rules per record type
//! - [`table`] - CSV parsing from in-memory bytes with a row ceiling
//! - [`validation`] - All-or-nothing upload validation and row decoding
//! - [`metrics`] - Sales and inventory KPI/trend computation
//! - [`types`] - Record types, typed rows, upload lifecycle
//! - [`money`] - Exact decimal money
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use stockpulse_core::{validation, metrics, RecordType, RecordSet};
//! use stockpulse_core::table::CsvTable;
//!
//! let csv = b"invoice_id,invoice_date,customer_id,item_id,qty,unit_price\n\
//!             INV-1,2024-03-01,C-1,SKU-1,2,9.50\n";
//! let table = CsvTable::parse(csv, Some(101)).unwrap();
//! let rows = validation::validate_table(RecordType::Sales, &table, 100).unwrap();
//!
//! if let RecordSet::Sales(rows) = rows {
//!     let report = metrics::compute_sales_metrics(&rows).unwrap();
//!     assert_eq!(report.kpis.revenue.to_string(), "19.00");
//! }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod metrics;
pub mod money;
pub mod schema;
pub mod table;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Default row ceiling for an upload (inclusive).
///
/// ## Business Reason
/// Uploads are meant for small, hand-curated extracts. Exactly this many
/// data rows validate; one more is rejected.
pub const DEFAULT_MAX_ROWS: usize = 100;

/// Number of entries kept in the sales `top_items` ranking.
pub const TOP_ITEMS_LIMIT: usize = 10;

/// Owner directory used when an upload has no owner.
pub const DEFAULT_OWNER: &str = "anonymous";

/// Maximum length of a batch identifier.
pub const MAX_BATCH_ID_LEN: usize = 64;

/// Largest quantity magnitude a `qty` cell may carry.
///
/// Together with [`MAX_AMOUNT`] a line stays below 10²¹, which leaves the
/// metric sums tens of millions of rows of headroom below `Decimal::MAX`.
pub const MAX_QUANTITY: i64 = 1_000_000_000;

/// Largest `unit_price` / `unit_cost` a cell may carry.
pub const MAX_AMOUNT: i64 = 1_000_000_000_000;
