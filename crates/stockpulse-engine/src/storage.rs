//! # File Store
//!
//! Owner-scoped byte storage for uploaded files.
//!
//! ## Two-Step Commit
//! ```text
//! stage()                        repository.create()        commit()
//!    │                                  │                      │
//!    ▼                                  ▼                      ▼
//! root/<owner>/tmp_<uuid>_<name>  ──►  id = 17  ──►  rename ─► root/<owner>/17-sales.csv
//! ```
//!
//! A crash between the two steps leaves at most an orphaned `tmp_` file;
//! no record ever points at a final name that does not exist. When the
//! final name cannot be recorded, `uncommit()` renames the file back so the
//! record's `tmp_` path stays readable.

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

use crate::error::EngineResult;
use stockpulse_core::RecordType;

const FALLBACK_NAME: &str = "upload.csv";

/// A file written under its temporary name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    pub path: PathBuf,
    /// Hex SHA-256 of the bytes.
    pub sha256: String,
    pub size_bytes: u64,
}

/// Hierarchical byte store rooted at a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FileStore { root: root.into() }
    }

    /// Directory holding one owner's files.
    pub fn owner_dir(&self, owner: &str) -> PathBuf {
        self.root.join(sanitize_segment(owner, "anonymous"))
    }

    /// Final, id-qualified location of an upload.
    pub fn final_path(&self, owner: &str, id: i64, record_type: RecordType) -> PathBuf {
        self.owner_dir(owner).join(format!("{id}-{record_type}.csv"))
    }

    /// Writes bytes under a unique temporary name and fingerprints them.
    pub async fn stage(&self, owner: &str, original_filename: &str, bytes: &[u8]) -> EngineResult<StagedFile> {
        let dir = self.owner_dir(owner);
        tokio::fs::create_dir_all(&dir).await?;

        let path = dir.join(format!(
            "tmp_{}_{}",
            Uuid::new_v4().simple(),
            sanitize_filename(original_filename)
        ));
        tokio::fs::write(&path, bytes).await?;

        debug!(path = %path.display(), size = bytes.len(), "Staged upload");

        Ok(StagedFile {
            path,
            sha256: fingerprint(bytes),
            size_bytes: bytes.len() as u64,
        })
    }

    /// Renames a staged file to its final name.
    pub async fn commit(
        &self,
        staged: &StagedFile,
        owner: &str,
        id: i64,
        record_type: RecordType,
    ) -> EngineResult<PathBuf> {
        let final_path = self.final_path(owner, id, record_type);
        tokio::fs::rename(&staged.path, &final_path).await?;

        debug!(from = %staged.path.display(), to = %final_path.display(), "Committed upload");
        Ok(final_path)
    }

    /// Reverses `commit()`: moves the file at `final_path` back to its
    /// staged name.
    pub async fn uncommit(&self, staged: &StagedFile, final_path: &Path) -> EngineResult<()> {
        tokio::fs::rename(final_path, &staged.path).await?;

        debug!(from = %final_path.display(), to = %staged.path.display(), "Reverted commit");
        Ok(())
    }

    /// Reads a stored file.
    pub async fn read(&self, path: impl AsRef<Path>) -> EngineResult<Vec<u8>> {
        Ok(tokio::fs::read(path).await?)
    }

    /// Deletes a staged file that will never be committed.
    pub async fn discard(&self, staged: &StagedFile) -> EngineResult<()> {
        tokio::fs::remove_file(&staged.path).await?;
        Ok(())
    }
}

/// Hex SHA-256 of a byte slice.
pub fn fingerprint(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Reduces a client-supplied filename to a safe basename.
///
/// Directory components are dropped; anything other than ASCII
/// alphanumerics, `.`, `-` and `_` becomes `_`; leading dots are removed.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    sanitize_segment(base, FALLBACK_NAME)
}

fn sanitize_segment(value: &str, fallback: &str) -> String {
    let cleaned: String = value
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');

    if cleaned.is_empty() {
        fallback.to_string()
    } else {
        cleaned.to_string()
    }
}
