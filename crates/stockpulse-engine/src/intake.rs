//! # Intake & Validator
//!
//! Accepts uploads, validates them and records every lifecycle step.
//!
//! ## Accept
//! ```text
//! filename ─► .csv? ─► record type? ─► size ≤ max? ─► batch id ok?
//!                                                        │
//!        ┌───────────────────────────────────────────────┘
//!        ▼
//!  stage bytes (tmp_…) ─► create record (id) ─► rename to <id>-<type>.csv ─► attach path + sha256
//! ```
//!
//! ## Validate
//! ```text
//! re-read file (≤ max_rows + 1 rows)
//!      │
//!      ├── malformed CSV ............... invalid
//!      ├── missing required columns .... invalid (missing listed)
//!      ├── too many rows ............... invalid
//!      ├── bad date / number / type .... invalid
//!      └── otherwise ................... validated (row_count)
//! ```
//!
//! Validation failures are data, not errors: they land on the record and
//! come back in a [`ValidationOutcome`].

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::{EngineConfig, StorageSettings};
use crate::error::EngineResult;
use crate::storage::FileStore;
use stockpulse_core::schema::required_columns;
use stockpulse_core::table::CsvTable;
use stockpulse_core::validation::{self, validate_table};
use stockpulse_core::{
    CoreError, UploadRecord, UploadState, UploadStatus, UploadSummary, ValidationError,
};
use stockpulse_db::{Database, NewUpload};

// =============================================================================
// Requests & Outcomes
// =============================================================================

/// An upload as it arrives from a client.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub filename: String,
    pub bytes: Vec<u8>,
    /// Record-type discriminator as sent (`"sales"` / `"inventory"`).
    pub record_type: String,
    pub batch_id: Option<String>,
    pub owner: Option<String>,
}

/// Result of validating one upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub upload_id: i64,
    pub ok: bool,
    pub status: UploadStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detected_columns: Option<Vec<String>>,
}

impl ValidationOutcome {
    /// Outcome as already recorded on an upload.
    fn recorded(record: &UploadRecord) -> Self {
        let status = record.status();
        let missing = match (&record.state, &record.detected_columns) {
            (UploadState::Invalid { .. }, Some(detected)) => {
                let missing: Vec<String> = required_columns(record.record_type)
                    .iter()
                    .filter(|c| !detected.iter().any(|d| d == *c))
                    .map(|c| c.to_string())
                    .collect();
                (!missing.is_empty()).then_some(missing)
            }
            _ => None,
        };

        ValidationOutcome {
            upload_id: record.id,
            // validation passed for anything past `validated`, even `failed`
            ok: !matches!(status, UploadStatus::Uploaded | UploadStatus::Invalid),
            status,
            row_count: record.state.row_count(),
            missing,
            error: record.state.error().map(str::to_string),
            detected_columns: record.detected_columns.clone(),
        }
    }
}

/// Response to an upload that was accepted and validated in one call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadReceipt {
    pub ok: bool,
    pub upload_id: i64,
    pub status: UploadStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<ValidationOutcome> for UploadReceipt {
    fn from(outcome: ValidationOutcome) -> Self {
        UploadReceipt {
            ok: outcome.ok,
            upload_id: outcome.upload_id,
            status: outcome.status,
            row_count: outcome.row_count,
            missing: outcome.missing,
            error: outcome.error,
        }
    }
}

// =============================================================================
// Intake
// =============================================================================

/// Upload intake and validation service.
#[derive(Debug, Clone)]
pub struct Intake {
    db: Database,
    store: FileStore,
    settings: StorageSettings,
}

impl Intake {
    pub fn new(db: Database, config: &EngineConfig) -> Self {
        Intake {
            db,
            store: FileStore::new(&config.storage.root),
            settings: config.storage.clone(),
        }
    }

    /// Accepts an upload: checks it, stores the bytes and records it as
    /// `uploaded`.
    ///
    /// ## Errors
    /// - `UnsupportedFormat` for a non-`.csv` filename
    /// - `UnknownType` for a record type other than sales/inventory
    /// - `FileTooLarge` above the byte limit
    /// - `TooLong` for an over-long batch id
    pub async fn accept_upload(&self, request: UploadRequest) -> EngineResult<UploadRecord> {
        let rejected = |e: ValidationError| {
            warn!(filename = %request.filename, error = %e, "Upload rejected");
            e
        };

        validation::validate_filename(&request.filename).map_err(rejected)?;
        let record_type = validation::parse_record_type(&request.record_type).map_err(rejected)?;
        validation::validate_upload_size(request.bytes.len() as u64, self.settings.max_upload_bytes)
            .map_err(rejected)?;
        let batch_id = validation::validate_batch_id(request.batch_id.as_deref()).map_err(rejected)?;

        let owner = request
            .owner
            .as_deref()
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .unwrap_or(&self.settings.default_owner)
            .to_string();

        let staged = self
            .store
            .stage(&owner, &request.filename, &request.bytes)
            .await?;

        let created = self
            .db
            .uploads()
            .create(NewUpload {
                owner: owner.clone(),
                record_type,
                file_path: staged.path.to_string_lossy().into_owned(),
                original_filename: request.filename.clone(),
                size_bytes: staged.size_bytes as i64,
                batch_id,
            })
            .await;

        let record = match created {
            Ok(record) => record,
            Err(e) => {
                if let Err(cleanup) = self.store.discard(&staged).await {
                    warn!(path = %staged.path.display(), error = %cleanup, "Could not discard staged upload");
                }
                return Err(e.into());
            }
        };

        let committed = self
            .store
            .commit(&staged, &owner, record.id, record_type)
            .await?;
        let final_path = committed.to_string_lossy().into_owned();

        // The record still names the staged path until attach_file succeeds.
        if let Err(e) = self
            .db
            .uploads()
            .attach_file(record.id, &final_path, &staged.sha256)
            .await
        {
            if let Err(revert) = self.store.uncommit(&staged, &committed).await {
                error!(
                    upload_id = record.id,
                    path = %committed.display(),
                    error = %revert,
                    "Could not move upload back to its staged path"
                );
            } else {
                warn!(upload_id = record.id, error = %e, "Recording final path failed; upload left staged");
            }
            return Err(e.into());
        }

        info!(
            upload_id = record.id,
            record_type = %record_type,
            size_bytes = staged.size_bytes,
            batch_id = ?record.batch_id,
            "Upload accepted"
        );

        Ok(UploadRecord {
            file_path: final_path,
            content_sha256: Some(staged.sha256),
            ..record
        })
    }

    /// Validates a stored upload and records the result.
    ///
    /// An upload that already left `uploaded` is not re-read; its recorded
    /// outcome is returned as-is.
    pub async fn validate(&self, id: i64) -> EngineResult<ValidationOutcome> {
        let record = self.get(id).await?;

        if record.status() != UploadStatus::Uploaded {
            debug!(upload_id = id, status = %record.status(), "Upload already validated");
            return Ok(ValidationOutcome::recorded(&record));
        }

        let bytes = self.store.read(&record.file_path).await?;
        let max_rows = self.settings.max_rows;
        let now = Utc::now();

        let (state, detected_columns, missing) =
            match CsvTable::parse(&bytes, Some(max_rows.saturating_add(1))) {
                Err(e) => (UploadState::Uploaded.invalid(e.to_string(), now)?, None, None),
                Ok(table) => {
                    let detected = table.headers().to_vec();
                    match validate_table(record.record_type, &table, max_rows) {
                        Ok(rows) => (
                            UploadState::Uploaded.validated(rows.len(), now)?,
                            Some(detected),
                            None,
                        ),
                        Err(e) => {
                            let missing = e.missing_columns().map(<[String]>::to_vec);
                            (
                                UploadState::Uploaded.invalid(e.to_string(), now)?,
                                Some(detected),
                                missing,
                            )
                        }
                    }
                }
            };

        self.db
            .uploads()
            .save_state(id, &state, detected_columns.as_deref())
            .await?;

        match &state {
            UploadState::Validated { row_count, .. } => {
                info!(upload_id = id, record_type = %record.record_type, row_count, "Upload validated");
            }
            _ => {
                warn!(
                    upload_id = id,
                    record_type = %record.record_type,
                    error = state.error().unwrap_or_default(),
                    "Upload invalid"
                );
            }
        }

        Ok(ValidationOutcome {
            upload_id: id,
            ok: state.status() == UploadStatus::Validated,
            status: state.status(),
            row_count: state.row_count(),
            missing,
            error: state.error().map(str::to_string),
            detected_columns,
        })
    }

    /// Accepts and synchronously validates an upload.
    pub async fn accept_and_validate(&self, request: UploadRequest) -> EngineResult<UploadReceipt> {
        let record = self.accept_upload(request).await?;
        let outcome = self.validate(record.id).await?;
        Ok(outcome.into())
    }

    /// Records a successful downstream post-processing (validated → processed).
    pub async fn mark_processed(&self, id: i64) -> EngineResult<UploadRecord> {
        let record = self.get(id).await?;
        let state = record.state.clone().processed(Utc::now())?;
        self.db.uploads().save_state(id, &state, None).await?;

        info!(upload_id = id, "Upload processed");
        Ok(UploadRecord { state, ..record })
    }

    /// Records a failed downstream post-processing (validated → failed).
    pub async fn mark_failed(&self, id: i64, error: &str) -> EngineResult<UploadRecord> {
        let record = self.get(id).await?;
        let state = record.state.clone().failed(error, Utc::now())?;
        self.db.uploads().save_state(id, &state, None).await?;

        warn!(upload_id = id, error, "Upload post-processing failed");
        Ok(UploadRecord { state, ..record })
    }

    /// Status view of one upload.
    pub async fn status(&self, id: i64) -> EngineResult<UploadSummary> {
        Ok(self.get(id).await?.summary())
    }

    /// Full record of one upload.
    pub async fn get(&self, id: i64) -> EngineResult<UploadRecord> {
        self.db
            .uploads()
            .get_by_id(id)
            .await?
            .ok_or_else(|| CoreError::UploadNotFound(id).into())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
