//! # Engine Configuration
//!
//! One explicit configuration object, handed to every component at
//! construction. Nothing in the engine reads the environment on its own.
//!
//! ## Load Order (later overrides earlier)
//! ```text
//! ┌──────────────┐    ┌──────────────────────┐    ┌──────────────────────┐
//! │   Defaults   │ ─► │  stockpulse.toml     │ ─► │  Environment         │
//! │              │    │  (--config or the    │    │  STOCKPULSE_*        │
//! │              │    │   platform config dir)│    │  OLLAMA_HOST/_MODEL  │
//! └──────────────┘    └──────────────────────┘    └──────────────────────┘
//! ```
//!
//! ## Example Config File
//! ```toml
//! [storage]
//! root = "./public/storage"
//! max_rows = 100
//! max_upload_bytes = 5242880
//! default_owner = "anonymous"
//!
//! [database]
//! path = "./stockpulse.db"
//! max_connections = 5
//!
//! [insight]
//! host = "http://127.0.0.1:11434"
//! model = "qwen2.5:7b"
//! timeout_secs = 120
//! payload_char_budget = 8000
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{EngineError, EngineResult};
use stockpulse_core::{DEFAULT_MAX_ROWS, DEFAULT_OWNER};

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Highest `storage.max_rows` a configuration may set.
pub const MAX_ROWS_CEILING: usize = 1_000_000;

// =============================================================================
// Storage Settings
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Root directory for uploaded files; one subdirectory per owner.
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,

    /// Row ceiling per upload (inclusive).
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,

    /// Largest accepted upload body.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,

    /// Owner used when an upload names none.
    #[serde(default = "default_owner")]
    pub default_owner: String,
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("./public/storage")
}

fn default_max_rows() -> usize {
    DEFAULT_MAX_ROWS
}

fn default_max_upload_bytes() -> u64 {
    5 * BYTES_PER_MB
}

fn default_owner() -> String {
    DEFAULT_OWNER.to_string()
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
            max_rows: default_max_rows(),
            max_upload_bytes: default_max_upload_bytes(),
            default_owner: default_owner(),
        }
    }
}

// =============================================================================
// Database Settings
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./stockpulse.db")
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            max_connections: default_max_connections(),
        }
    }
}

// =============================================================================
// Insight Settings
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsightSettings {
    /// Base URL of the Ollama-compatible service.
    #[serde(default = "default_insight_host")]
    pub host: String,

    #[serde(default = "default_insight_model")]
    pub model: String,

    /// Upper bound for one insight request.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Metrics JSON is cut to this many characters before it is sent.
    #[serde(default = "default_payload_char_budget")]
    pub payload_char_budget: usize,
}

fn default_insight_host() -> String {
    "http://127.0.0.1:11434".to_string()
}

fn default_insight_model() -> String {
    "qwen2.5:7b".to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_payload_char_budget() -> usize {
    8000
}

impl Default for InsightSettings {
    fn default() -> Self {
        Self {
            host: default_insight_host(),
            model: default_insight_model(),
            timeout_secs: default_timeout_secs(),
            payload_char_budget: default_payload_char_budget(),
        }
    }
}

impl InsightSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// =============================================================================
// Engine Config
// =============================================================================

/// Complete engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub storage: StorageSettings,

    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub insight: InsightSettings,
}

impl EngineConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// An explicit `config_path` must exist; the platform default path is
    /// optional.
    pub fn load(config_path: Option<PathBuf>) -> EngineResult<Self> {
        let mut config = Self::default();

        match config_path {
            Some(path) => {
                info!(?path, "Loading config from file");
                let contents = std::fs::read_to_string(&path).map_err(|e| {
                    EngineError::Config(format!("cannot read {}: {e}", path.display()))
                })?;
                config = Self::from_toml(&contents)?;
            }
            None => {
                if let Some(path) = Self::default_config_path().filter(|p| p.exists()) {
                    info!(?path, "Loading config from file");
                    let contents = std::fs::read_to_string(&path).map_err(|e| {
                        EngineError::Config(format!("cannot read {}: {e}", path.display()))
                    })?;
                    config = Self::from_toml(&contents)?;
                } else {
                    debug!("No config file found, using defaults");
                }
            }
        }

        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;

        Ok(config)
    }

    /// Parses a TOML document; absent keys keep their defaults.
    pub fn from_toml(contents: &str) -> EngineResult<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> EngineResult<()> {
        if self.storage.max_rows == 0 {
            return Err(EngineError::Config(
                "storage.max_rows must be greater than 0".into(),
            ));
        }

        if self.storage.max_rows > MAX_ROWS_CEILING {
            return Err(EngineError::Config(format!(
                "storage.max_rows must be at most {MAX_ROWS_CEILING}, got: {}",
                self.storage.max_rows
            )));
        }

        if self.insight.payload_char_budget == 0 {
            return Err(EngineError::Config(
                "insight.payload_char_budget must be greater than 0".into(),
            ));
        }

        let host = &self.insight.host;
        if !host.starts_with("http://") && !host.starts_with("https://") {
            return Err(EngineError::Config(format!(
                "insight.host must start with http:// or https://, got: {host}"
            )));
        }

        Ok(())
    }

    /// Applies environment variable overrides through `lookup`.
    ///
    /// | Variable                   | Setting                      |
    /// |----------------------------|------------------------------|
    /// | `STOCKPULSE_UPLOAD_FOLDER` | `storage.root`               |
    /// | `STOCKPULSE_MAX_ROWS`      | `storage.max_rows`           |
    /// | `STOCKPULSE_MAX_UPLOAD_MB` | `storage.max_upload_bytes`   |
    /// | `STOCKPULSE_DB_PATH`       | `database.path`              |
    /// | `OLLAMA_HOST`              | `insight.host`               |
    /// | `OLLAMA_MODEL`             | `insight.model`              |
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(root) = lookup("STOCKPULSE_UPLOAD_FOLDER") {
            debug!(root = %root, "Overriding upload folder from environment");
            self.storage.root = PathBuf::from(root);
        }

        if let Some(value) = lookup("STOCKPULSE_MAX_ROWS") {
            match value.trim().parse::<usize>() {
                Ok(rows) => self.storage.max_rows = rows,
                Err(_) => warn!(value = %value, "Ignoring non-numeric STOCKPULSE_MAX_ROWS"),
            }
        }

        if let Some(value) = lookup("STOCKPULSE_MAX_UPLOAD_MB") {
            match value.trim().parse::<u64>() {
                Ok(mb) => self.storage.max_upload_bytes = mb.saturating_mul(BYTES_PER_MB),
                Err(_) => warn!(value = %value, "Ignoring non-numeric STOCKPULSE_MAX_UPLOAD_MB"),
            }
        }

        if let Some(path) = lookup("STOCKPULSE_DB_PATH") {
            self.database.path = PathBuf::from(path);
        }

        if let Some(host) = lookup("OLLAMA_HOST") {
            debug!(host = %host, "Overriding insight host from environment");
            self.insight.host = host;
        }

        if let Some(model) = lookup("OLLAMA_MODEL") {
            self.insight.model = model;
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "stockpulse", "stockpulse")
            .map(|dirs| dirs.config_dir().join("stockpulse.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.storage.max_rows, 100);
        assert_eq!(config.storage.max_upload_bytes, 5 * 1024 * 1024);
        assert_eq!(config.insight.payload_char_budget, 8000);
        assert_eq!(config.insight.timeout(), Duration::from_secs(120));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml(
            r#"
            [storage]
            max_rows = 10

            [insight]
            model = "llama3"
            "#,
        )
        .unwrap();

        assert_eq!(config.storage.max_rows, 10);
        assert_eq!(config.storage.default_owner, "anonymous");
        assert_eq!(config.insight.model, "llama3");
        assert_eq!(config.insight.host, "http://127.0.0.1:11434");
        assert_eq!(config.database.path, PathBuf::from("./stockpulse.db"));
    }

    #[test]
    fn test_bad_toml_is_config_error() {
        let err = EngineConfig::from_toml("[storage]\nmax_rows = \"many\"").unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("STOCKPULSE_UPLOAD_FOLDER", "/srv/uploads"),
            ("STOCKPULSE_MAX_ROWS", "250"),
            ("STOCKPULSE_MAX_UPLOAD_MB", "2"),
            ("OLLAMA_HOST", "https://llm.internal:11434"),
        ]);

        let mut config = EngineConfig::default();
        config.apply_env_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.storage.root, PathBuf::from("/srv/uploads"));
        assert_eq!(config.storage.max_rows, 250);
        assert_eq!(config.storage.max_upload_bytes, 2 * 1024 * 1024);
        assert_eq!(config.insight.host, "https://llm.internal:11434");
        assert_eq!(config.insight.model, "qwen2.5:7b");
    }

    #[test]
    fn test_unparsable_env_is_ignored() {
        let mut config = EngineConfig::default();
        config.apply_env_overrides(|key| (key == "STOCKPULSE_MAX_ROWS").then(|| "lots".to_string()));
        assert_eq!(config.storage.max_rows, 100);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = EngineConfig::default();
        config.storage.max_rows = 0;
        assert!(config.validate().is_err());

        config.storage.max_rows = usize::MAX;
        assert!(matches!(config.validate(), Err(EngineError::Config(_))));
        config.storage.max_rows = MAX_ROWS_CEILING;
        assert!(config.validate().is_ok());

        let mut config = EngineConfig::default();
        config.insight.host = "ftp://example".into();
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.insight.payload_char_budget = 0;
        assert!(config.validate().is_err());
    }
}
