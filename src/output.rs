//! Paper lifecycle, the four output documents, and where they are persisted.
//!
//! A paper moves `uploaded → processing → completed` or
//! `uploaded → processing → failed(error)`. Both end states are terminal:
//! stores refuse any other move, and re-running a paper takes an explicit
//! [`ArtifactStore::resubmit`] by the caller.

use crate::error::PaperError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// Caller-assigned paper identifier.
pub type PaperId = i64;

/// Processing status of one paper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PaperStatus {
    Uploaded,
    Processing,
    Completed,
    Failed { error: String },
}

impl PaperStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PaperStatus::Completed | PaperStatus::Failed { .. })
    }

    /// Whether the lifecycle allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: &PaperStatus) -> bool {
        matches!(
            (self, next),
            (PaperStatus::Uploaded, PaperStatus::Processing)
                | (PaperStatus::Processing, PaperStatus::Completed)
                | (PaperStatus::Processing, PaperStatus::Failed { .. })
        )
    }

    /// `Ok` when the lifecycle allows `self → next`, otherwise the refusal
    /// a store reports.
    pub fn check_transition(&self, paper_id: PaperId, next: &PaperStatus) -> Result<(), PaperError> {
        if self.can_transition_to(next) {
            return Ok(());
        }
        Err(PaperError::Persistence {
            paper_id,
            detail: format!("cannot move from {} to {}", self.label(), next.label()),
        })
    }

    pub fn label(&self) -> &'static str {
        match self {
            PaperStatus::Uploaded => "uploaded",
            PaperStatus::Processing => "processing",
            PaperStatus::Completed => "completed",
            PaperStatus::Failed { .. } => "failed",
        }
    }
}

/// The four markdown documents produced for a paper.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaperDocuments {
    /// Original content, including media references and equation captions.
    pub original: String,
    pub english_summary: String,
    /// Full translation into the target language.
    pub translation: String,
    pub korean_summary: String,
}

/// One write to a paper record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperUpdate {
    pub status: PaperStatus,
    /// Present only with [`PaperStatus::Completed`].
    pub documents: Option<PaperDocuments>,
}

impl PaperUpdate {
    pub fn processing() -> Self {
        Self {
            status: PaperStatus::Processing,
            documents: None,
        }
    }

    pub fn completed(documents: PaperDocuments) -> Self {
        Self {
            status: PaperStatus::Completed,
            documents: Some(documents),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: PaperStatus::Failed {
                error: error.into(),
            },
            documents: None,
        }
    }
}

/// Where status updates and documents go.
///
/// Writes that follow the lifecycle are last-write-wins; a write that leaves
/// a terminal status is refused with [`PaperError::Persistence`].
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn update(&self, paper_id: PaperId, update: PaperUpdate) -> Result<(), PaperError>;

    /// Return a paper to `uploaded` so it can be processed again.
    async fn resubmit(&self, paper_id: PaperId) -> Result<(), PaperError>;
}

/// Record kept by [`MemoryArtifactStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaperRecord {
    pub status: PaperStatus,
    pub documents: Option<PaperDocuments>,
    /// Every status the paper has been given, oldest first.
    pub history: Vec<PaperStatus>,
}

/// In-process store, for tests and hosts that persist records themselves.
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    records: Mutex<HashMap<PaperId, PaperRecord>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(
        &self,
        paper_id: PaperId,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<PaperId, PaperRecord>>, PaperError> {
        self.records.lock().map_err(|_| PaperError::Persistence {
            paper_id,
            detail: "store lock poisoned".into(),
        })
    }

    pub fn get(&self, paper_id: PaperId) -> Option<PaperRecord> {
        self.records
            .lock()
            .ok()
            .and_then(|records| records.get(&paper_id).cloned())
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn update(&self, paper_id: PaperId, update: PaperUpdate) -> Result<(), PaperError> {
        let mut records = self.lock(paper_id)?;
        records
            .get(&paper_id)
            .map_or(&PaperStatus::Uploaded, |r| &r.status)
            .check_transition(paper_id, &update.status)?;

        let record = records.entry(paper_id).or_insert_with(|| PaperRecord {
            status: PaperStatus::Uploaded,
            documents: None,
            history: Vec::new(),
        });
        record.history.push(update.status.clone());
        record.status = update.status;
        if update.documents.is_some() {
            record.documents = update.documents;
        }
        Ok(())
    }

    async fn resubmit(&self, paper_id: PaperId) -> Result<(), PaperError> {
        let mut records = self.lock(paper_id)?;
        if let Some(record) = records.get_mut(&paper_id) {
            record.status = PaperStatus::Uploaded;
            record.documents = None;
            record.history.push(PaperStatus::Uploaded);
        }
        Ok(())
    }
}

/// File names used by [`FsArtifactStore`] inside each paper directory.
pub const STATUS_FILE: &str = "status.json";
pub const ORIGINAL_FILE: &str = "original.md";
pub const ENGLISH_SUMMARY_FILE: &str = "english_summary.md";
pub const TRANSLATION_FILE: &str = "translation.md";
pub const KOREAN_SUMMARY_FILE: &str = "korean_summary.md";

/// Stores each paper under `{root}/{paper_id}/`.
///
/// Every file is written atomically (temp file + rename) so a reader never
/// sees a half-written document.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn paper_dir(&self, paper_id: PaperId) -> PathBuf {
        self.root.join(paper_id.to_string())
    }

    /// Read back the last persisted status.
    pub async fn status(&self, paper_id: PaperId) -> Result<Option<PaperStatus>, PaperError> {
        let path = self.paper_dir(paper_id).join(STATUS_FILE);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(PaperError::io(path, e)),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| PaperError::Persistence {
                paper_id,
                detail: format!("unreadable {}: {}", STATUS_FILE, e),
            })
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn update(&self, paper_id: PaperId, update: PaperUpdate) -> Result<(), PaperError> {
        self.status(paper_id)
            .await?
            .unwrap_or(PaperStatus::Uploaded)
            .check_transition(paper_id, &update.status)?;

        let dir = self.paper_dir(paper_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| PaperError::io(&dir, e))?;

        if let Some(docs) = &update.documents {
            write_atomic(&dir.join(ORIGINAL_FILE), docs.original.as_bytes()).await?;
            write_atomic(&dir.join(ENGLISH_SUMMARY_FILE), docs.english_summary.as_bytes()).await?;
            write_atomic(&dir.join(TRANSLATION_FILE), docs.translation.as_bytes()).await?;
            write_atomic(&dir.join(KOREAN_SUMMARY_FILE), docs.korean_summary.as_bytes()).await?;
        }

        // Status goes last so "completed" is never visible before its documents.
        let status = serde_json::to_vec_pretty(&update.status).map_err(|e| {
            PaperError::Persistence {
                paper_id,
                detail: e.to_string(),
            }
        })?;
        write_atomic(&dir.join(STATUS_FILE), &status).await?;
        debug!("Paper {} → {}", paper_id, update.status.label());
        Ok(())
    }

    /// A paper without `status.json` is `uploaded`. Earlier documents stay
    /// until the next completed run replaces them.
    async fn resubmit(&self, paper_id: PaperId) -> Result<(), PaperError> {
        let path = self.paper_dir(paper_id).join(STATUS_FILE);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PaperError::io(path, e)),
        }
    }
}

/// Write `bytes` to `path` via a sibling temp file and a rename.
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), PaperError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| PaperError::io(parent, e))?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    tokio::fs::write(&tmp, bytes)
        .await
        .map_err(|e| PaperError::io(&tmp, e))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| PaperError::io(path, e))
}
