//! # Repository Module
//!
//! Database repository implementations for Stockpulse.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern                                   │
//! │                                                                         │
//! │  Intake / Aggregator                                                   │
//! │       │                                                                 │
//! │       │  db.uploads().latest_ready_of_type("q1", Sales)                │
//! │       ▼                                                                 │
//! │  UploadRepository                                                      │
//! │  ├── create / get_by_id                                                │
//! │  ├── attach_file / save_state                                          │
//! │  └── list / latest_ready_of_type / list_ready_in_batch                 │
//! │       │                                                                 │
//! │       │  SQL Query  +  row ⇄ UploadState mapping                        │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`UploadRepository`](upload::UploadRepository) - Upload records and lifecycle

pub mod upload;
