//! # stockpulse-engine: Intake, Aggregation & Insight
//!
//! Ties the pure core to the database, the file store and the insight
//! service.
//!
//! ## Request Paths
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  upload ──► Intake ──► FileStore (stage → rename)                      │
//! │               │   └──► UploadRepository (uploaded → validated/invalid) │
//! │               ▼                                                         │
//! │           stockpulse-core::validation                                   │
//! │                                                                         │
//! │  dashboard / pair / batch ──► Aggregator ──► FileStore (re-read)       │
//! │                                   │     └──► stockpulse-core::metrics  │
//! │                                   ▼                                     │
//! │                           InsightGenerator (OllamaClient)               │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`config`] - Explicit configuration (file, environment, defaults)
//! - [`intake`] - Upload acceptance and validation
//! - [`aggregator`] - Listings, dashboards, pair and batch metrics
//! - [`insight`] - Insight collaborator trait and Ollama client
//! - [`storage`] - Owner-scoped file store
//! - [`error`] - Engine error types

pub mod aggregator;
pub mod config;
pub mod error;
pub mod insight;
pub mod intake;
pub mod storage;

pub use aggregator::{Aggregator, InsightReport, PairSelector, LIST_LIMIT};
pub use config::EngineConfig;
pub use error::{EngineError, EngineResult};
pub use insight::{InsightGenerator, InsightKind, OllamaClient};
pub use intake::{Intake, UploadReceipt, UploadRequest, ValidationOutcome};
pub use storage::FileStore;

use stockpulse_db::{Database, DbConfig};

/// Opens (and migrates) the database named by the configuration.
pub async fn open_database(config: &EngineConfig) -> EngineResult<Database> {
    let mut db_config = DbConfig::new(&config.database.path);
    if db_config.is_in_memory() {
        db_config = DbConfig::in_memory();
    } else {
        db_config = db_config.max_connections(config.database.max_connections);
    }
    Ok(Database::new(db_config).await?)
}
