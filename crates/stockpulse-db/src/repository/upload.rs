//! # Upload Repository
//!
//! Database operations for upload records.
//!
//! ## Upload Lifecycle in the Store
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Upload Lifecycle                                  │
//! │                                                                         │
//! │  1. CREATE                                                             │
//! │     └── create() → UploadRecord { state: Uploaded, file_path: tmp }    │
//! │                                                                         │
//! │  2. COMMIT FILE                                                        │
//! │     └── attach_file() → final path + sha256                            │
//! │                                                                         │
//! │  3. VALIDATE                                                           │
//! │     └── save_state(Validated | Invalid, detected_columns)              │
//! │                                                                         │
//! │  4. (DOWNSTREAM) POST-PROCESS                                          │
//! │     └── save_state(Processed | Failed)                                 │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The store keeps the lifecycle as flat columns; rows are rebuilt into
//! [`UploadState`] on the way out and rejected as `CorruptRecord` when the
//! columns disagree with the status.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use stockpulse_core::{RecordType, UploadRecord, UploadState, UploadStatus};

const ENTITY: &str = "Upload";

const SELECT_UPLOAD: &str = r#"
    SELECT
        id,
        owner,
        record_type,
        file_path,
        original_filename,
        size_bytes,
        content_sha256,
        detected_columns,
        status,
        row_count,
        error_msg,
        batch_id,
        created_at,
        validated_at,
        processed_at
    FROM uploads
"#;

// =============================================================================
// Row Types
// =============================================================================

/// Fields supplied when an upload is first recorded.
#[derive(Debug, Clone)]
pub struct NewUpload {
    pub owner: String,
    pub record_type: RecordType,
    /// Staging location; replaced by [`UploadRepository::attach_file`].
    pub file_path: String,
    pub original_filename: String,
    pub size_bytes: i64,
    pub batch_id: Option<String>,
}

/// Flat `uploads` row.
#[derive(Debug, FromRow)]
struct UploadRow {
    id: i64,
    owner: String,
    record_type: RecordType,
    file_path: String,
    original_filename: String,
    size_bytes: i64,
    content_sha256: Option<String>,
    detected_columns: Option<String>,
    status: UploadStatus,
    row_count: Option<i64>,
    error_msg: Option<String>,
    batch_id: Option<String>,
    created_at: DateTime<Utc>,
    validated_at: Option<DateTime<Utc>>,
    processed_at: Option<DateTime<Utc>>,
}

impl TryFrom<UploadRow> for UploadRecord {
    type Error = DbError;

    fn try_from(row: UploadRow) -> DbResult<Self> {
        let id = row.id;

        let row_count = row
            .row_count
            .map(usize::try_from)
            .transpose()
            .map_err(|_| DbError::corrupt(ENTITY, id, "negative row_count"))?;

        let state = UploadState::from_parts(
            row.status,
            row_count,
            row.error_msg.clone(),
            row.validated_at,
            row.processed_at,
        )
        .map_err(|e| DbError::corrupt(ENTITY, id, e.to_string()))?;

        if state.row_count() != row_count {
            return Err(DbError::corrupt(
                ENTITY,
                id,
                format!("row_count set on a {} upload", row.status),
            ));
        }
        if state.error() != row.error_msg.as_deref() {
            return Err(DbError::corrupt(
                ENTITY,
                id,
                format!("error_msg set on a {} upload", row.status),
            ));
        }

        let detected_columns = row
            .detected_columns
            .as_deref()
            .map(serde_json::from_str::<Vec<String>>)
            .transpose()
            .map_err(|e| DbError::corrupt(ENTITY, id, format!("detected_columns: {e}")))?;

        Ok(UploadRecord {
            id,
            owner: row.owner,
            record_type: row.record_type,
            file_path: row.file_path,
            original_filename: row.original_filename,
            size_bytes: row.size_bytes,
            content_sha256: row.content_sha256,
            detected_columns,
            batch_id: row.batch_id,
            created_at: row.created_at,
            state,
        })
    }
}

fn into_records(rows: Vec<UploadRow>) -> DbResult<Vec<UploadRecord>> {
    rows.into_iter().map(UploadRecord::try_from).collect()
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for upload database operations.
#[derive(Debug, Clone)]
pub struct UploadRepository {
    pool: SqlitePool,
}

impl UploadRepository {
    /// Creates a new UploadRepository.
    pub fn new(pool: SqlitePool) -> Self {
        UploadRepository { pool }
    }

    /// Records a new upload in the `uploaded` state and assigns its id.
    pub async fn create(&self, upload: NewUpload) -> DbResult<UploadRecord> {
        let now = Utc::now();

        debug!(
            record_type = %upload.record_type,
            filename = %upload.original_filename,
            "Creating upload record"
        );

        let result = sqlx::query(
            r#"
            INSERT INTO uploads (
                owner, record_type, file_path, original_filename,
                size_bytes, status, batch_id, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&upload.owner)
        .bind(upload.record_type)
        .bind(&upload.file_path)
        .bind(&upload.original_filename)
        .bind(upload.size_bytes)
        .bind(UploadStatus::Uploaded)
        .bind(&upload.batch_id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(UploadRecord {
            id: result.last_insert_rowid(),
            owner: upload.owner,
            record_type: upload.record_type,
            file_path: upload.file_path,
            original_filename: upload.original_filename,
            size_bytes: upload.size_bytes,
            content_sha256: None,
            detected_columns: None,
            batch_id: upload.batch_id,
            created_at: now,
            state: UploadState::Uploaded,
        })
    }

    /// Gets an upload by ID.
    pub async fn get_by_id(&self, id: i64) -> DbResult<Option<UploadRecord>> {
        let row: Option<UploadRow> = sqlx::query_as(&format!("{SELECT_UPLOAD} WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(UploadRecord::try_from).transpose()
    }

    /// Points the record at its committed file and stores the fingerprint.
    pub async fn attach_file(&self, id: i64, file_path: &str, content_sha256: &str) -> DbResult<()> {
        debug!(upload_id = id, file_path, "Attaching committed file");

        let result = sqlx::query(
            r#"
            UPDATE uploads SET
                file_path = ?2,
                content_sha256 = ?3
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(file_path)
        .bind(content_sha256)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found(ENTITY, id));
        }

        Ok(())
    }

    /// Persists a lifecycle state.
    ///
    /// `detected_columns` is written when given and left untouched otherwise.
    pub async fn save_state(
        &self,
        id: i64,
        state: &UploadState,
        detected_columns: Option<&[String]>,
    ) -> DbResult<()> {
        let columns_json = detected_columns
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| DbError::Internal(e.to_string()))?;
        let row_count = state.row_count().map(|n| n as i64);

        debug!(upload_id = id, status = %state.status(), "Saving upload state");

        let result = sqlx::query(
            r#"
            UPDATE uploads SET
                status = ?2,
                row_count = ?3,
                error_msg = ?4,
                validated_at = ?5,
                processed_at = ?6,
                detected_columns = COALESCE(?7, detected_columns)
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(state.status())
        .bind(row_count)
        .bind(state.error())
        .bind(state.validated_at())
        .bind(state.processed_at())
        .bind(columns_json)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found(ENTITY, id));
        }

        Ok(())
    }

    /// Lists uploads, most recent first.
    ///
    /// ## Arguments
    /// * `batch_id` - Only uploads of this batch when given
    /// * `limit` - Maximum rows; `None` returns every match
    pub async fn list(&self, batch_id: Option<&str>, limit: Option<u32>) -> DbResult<Vec<UploadRecord>> {
        // SQLite treats a negative LIMIT as "no limit"
        let limit = limit.map(i64::from).unwrap_or(-1);

        let rows: Vec<UploadRow> = match batch_id {
            Some(batch_id) => {
                sqlx::query_as(&format!(
                    "{SELECT_UPLOAD} WHERE batch_id = ?1 ORDER BY id DESC LIMIT ?2"
                ))
                .bind(batch_id)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(&format!("{SELECT_UPLOAD} ORDER BY id DESC LIMIT ?1"))
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        into_records(rows)
    }

    /// The ready (validated or processed) upload of a type with the highest
    /// id in a batch.
    pub async fn latest_ready_of_type(
        &self,
        batch_id: &str,
        record_type: RecordType,
    ) -> DbResult<Option<UploadRecord>> {
        let row: Option<UploadRow> = sqlx::query_as(&format!(
            r#"{SELECT_UPLOAD}
            WHERE batch_id = ?1
              AND record_type = ?2
              AND status IN ('validated', 'processed')
            ORDER BY id DESC
            LIMIT 1"#
        ))
        .bind(batch_id)
        .bind(record_type)
        .fetch_optional(&self.pool)
        .await?;

        row.map(UploadRecord::try_from).transpose()
    }

    /// Every ready upload of a batch, oldest first.
    pub async fn list_ready_in_batch(&self, batch_id: &str) -> DbResult<Vec<UploadRecord>> {
        let rows: Vec<UploadRow> = sqlx::query_as(&format!(
            r#"{SELECT_UPLOAD}
            WHERE batch_id = ?1
              AND status IN ('validated', 'processed')
            ORDER BY id ASC"#
        ))
        .bind(batch_id)
        .fetch_all(&self.pool)
        .await?;

        into_records(rows)
    }

    /// Counts uploads in a status (for diagnostics).
    pub async fn count_by_status(&self, status: UploadStatus) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM uploads WHERE status = ?1")
            .bind(status)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
