//! # Engine Error Types
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Engine Error Categories                            │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │     Domain      │  │   Persistence   │  │     Collaborator        │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  Core           │  │  Db             │  │  DownstreamCollaborator │ │
//! │  │  (validation,   │  │  Storage (io)   │  │  (non-2xx, timeout,     │ │
//! │  │   not ready,    │  │                 │  │   bad body)             │ │
//! │  │   no data ...)  │  │                 │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐                              │
//! │  │     Config      │  │  Serialization  │                              │
//! │  └─────────────────┘  └─────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use stockpulse_core::{CoreError, ValidationError};
use stockpulse_db::DbError;

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Domain rule violated (validation, lifecycle, readiness, batch).
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Database error: {0}")]
    Db(#[from] DbError),

    /// Reading or writing upload files failed.
    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The insight service failed or answered with something unusable.
    #[error("Insight service error{}: {message}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    DownstreamCollaborator {
        status: Option<u16>,
        message: String,
    },

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EngineError {
    pub fn downstream(status: Option<u16>, message: impl Into<String>) -> Self {
        EngineError::DownstreamCollaborator {
            status,
            message: message.into(),
        }
    }

    /// The validation error inside, if this is one.
    pub fn as_validation(&self) -> Option<&ValidationError> {
        match self {
            EngineError::Core(CoreError::Validation(e)) => Some(e),
            _ => None,
        }
    }

    /// Whether the caller asked for something the data does not allow, as
    /// opposed to an infrastructure failure.
    pub fn is_client_error(&self) -> bool {
        matches!(self, EngineError::Core(_))
    }
}

impl From<ValidationError> for EngineError {
    fn from(err: ValidationError) -> Self {
        EngineError::Core(CoreError::Validation(err))
    }
}

impl From<toml::de::Error> for EngineError {
    fn from(err: toml::de::Error) -> Self {
        EngineError::Config(err.to_string())
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        let message = if err.is_timeout() {
            format!("request timed out: {err}")
        } else if err.is_decode() {
            format!("unreadable response body: {err}")
        } else {
            err.to_string()
        };
        EngineError::downstream(err.status().map(|s| s.as_u16()), message)
    }
}
