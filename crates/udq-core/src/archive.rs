//! Archival adapter: hands a completed job to an external record keeper.
//!
//! Invoked once per completion, off the scheduler path. The returned
//! identifier is stored on the job as `archive_id`. No retries.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::io::AsyncWriteExt;

use crate::job::{DownloadJob, JobId};

/// What gets archived for a completed job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArchiveRecord {
    pub job_id: JobId,
    pub filename: String,
    pub source_url: String,
    pub resolved_url: String,
    pub total_bytes: u64,
    pub host_label: String,
    pub owner_id: String,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
}

impl From<&DownloadJob> for ArchiveRecord {
    fn from(job: &DownloadJob) -> Self {
        Self {
            job_id: job.id.clone(),
            filename: job.filename.clone(),
            source_url: job.source_url.clone(),
            resolved_url: job.resolved_url.clone(),
            total_bytes: job.total_bytes,
            host_label: job.host_label.clone(),
            owner_id: job.owner_id.clone(),
            started_at: job.started_at,
            completed_at: job.completed_at,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("archive unavailable: {0}")]
    Unavailable(String),
    #[error("archive write failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("archive encode failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// External sink for completed-job records.
#[async_trait]
pub trait ArchiveSink: Send + Sync {
    /// Stores the record and returns its external identifier.
    async fn archive(&self, record: ArchiveRecord) -> Result<String, ArchiveError>;
}

#[derive(Serialize)]
struct ArchiveLine<'a> {
    archive_id: &'a str,
    #[serde(flatten)]
    record: &'a ArchiveRecord,
}

/// Appends one JSON object per line to a local file.
#[derive(Debug)]
pub struct JsonLinesArchive {
    path: PathBuf,
    // Serializes appends from concurrent completions.
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonLinesArchive {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create archive dir {}", parent.display()))?;
        }
        Ok(Self {
            path,
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// `archive.jsonl` in the udq state dir.
    pub fn open_default() -> Result<Self> {
        let dir = crate::config::state_dir()?;
        Self::open(dir.join("archive.jsonl"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ArchiveSink for JsonLinesArchive {
    async fn archive(&self, record: ArchiveRecord) -> Result<String, ArchiveError> {
        let archive_id = uuid::Uuid::new_v4().to_string();
        let mut line = serde_json::to_vec(&ArchiveLine {
            archive_id: &archive_id,
            record: &record,
        })?;
        line.push(b'\n');

        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(archive_id)
    }
}

/// In-memory sink; ids are `mem-<n>`. Can be switched to fail every call.
#[derive(Debug, Clone, Default)]
pub struct MemoryArchive {
    records: Arc<Mutex<Vec<ArchiveRecord>>>,
    failing: bool,
}

impl MemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn records(&self) -> Vec<ArchiveRecord> {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl ArchiveSink for MemoryArchive {
    async fn archive(&self, record: ArchiveRecord) -> Result<String, ArchiveError> {
        if self.failing {
            return Err(ArchiveError::Unavailable("memory archive set to fail".into()));
        }
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records.push(record);
        Ok(format!("mem-{}", records.len()))
    }
}
