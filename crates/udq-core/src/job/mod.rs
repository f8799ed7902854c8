//! Download job model: identifiers, status machine and the persisted job record.

mod host;

pub use host::{filename_from_url, host_label};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Highest progress a job can report while still downloading; 100 is reserved for `Completed`.
pub const MAX_ACTIVE_PERCENT: f64 = 99.9;

/// Opaque, never-reused job identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Source of fresh job ids.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> JobId;
}

/// Random v4 UUIDs.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidIds;

impl IdGenerator for UuidIds {
    fn next_id(&self) -> JobId {
        JobId(uuid::Uuid::new_v4().to_string())
    }
}

/// Job status. `pending -> downloading -> {completed | error}`,
/// `downloading -> paused -> pending`, `error -> pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Downloading,
    Paused,
    Completed,
    Error,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Downloading => "downloading",
            JobStatus::Paused => "paused",
            JobStatus::Completed => "completed",
            JobStatus::Error => "error",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input to `enqueue`.
#[derive(Debug, Clone, Default)]
pub struct NewJob {
    pub filename: String,
    /// Original (pre-unlock) reference.
    pub source_url: String,
    /// Direct transfer target.
    pub resolved_url: String,
    pub total_bytes: u64,
    /// Overrides the label derived from `source_url`.
    pub host_label: Option<String>,
}

/// One download tracked by the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadJob {
    pub id: JobId,
    pub filename: String,
    pub source_url: String,
    pub resolved_url: String,
    pub total_bytes: u64,
    /// 0..=100; exactly 100 iff `status == Completed`.
    pub progress_percent: f64,
    pub status: JobStatus,
    /// Only meaningful while downloading.
    #[serde(default)]
    pub speed_bps: f64,
    /// Seconds remaining; `None` when unknown (speed 0) or not downloading.
    #[serde(default)]
    pub eta_secs: Option<f64>,
    /// Unix millis of the latest admission.
    #[serde(default)]
    pub started_at: Option<i64>,
    /// Unix millis; set only on success.
    #[serde(default)]
    pub completed_at: Option<i64>,
    #[serde(default)]
    pub last_error: Option<String>,
    pub host_label: String,
    pub owner_id: String,
    #[serde(default)]
    pub archive_id: Option<String>,
}

impl DownloadJob {
    pub fn new(id: JobId, new: NewJob, owner_id: impl Into<String>) -> Self {
        let host_label = new
            .host_label
            .filter(|l| !l.trim().is_empty())
            .unwrap_or_else(|| host_label(&new.source_url));
        Self {
            id,
            filename: new.filename,
            source_url: new.source_url,
            resolved_url: new.resolved_url,
            total_bytes: new.total_bytes,
            progress_percent: 0.0,
            status: JobStatus::Pending,
            speed_bps: 0.0,
            eta_secs: None,
            started_at: None,
            completed_at: None,
            last_error: None,
            host_label,
            owner_id: owner_id.into(),
            archive_id: None,
        }
    }

    /// Estimate of bytes transferred so far.
    pub fn downloaded_bytes(&self) -> u64 {
        (self.total_bytes as f64 * self.progress_percent.clamp(0.0, 100.0) / 100.0) as u64
    }

    /// Bytes still to transfer.
    pub fn remaining_bytes(&self) -> u64 {
        self.total_bytes.saturating_sub(self.downloaded_bytes())
    }

    fn clear_rates(&mut self) {
        self.speed_bps = 0.0;
        self.eta_secs = None;
    }

    /// `pending -> downloading`. Restarts from 0%: there is no byte-offset resumption.
    pub fn admit(&mut self, now: i64) -> bool {
        if self.status != JobStatus::Pending {
            return false;
        }
        self.status = JobStatus::Downloading;
        self.progress_percent = 0.0;
        self.clear_rates();
        self.started_at = Some(now);
        true
    }

    /// `downloading -> paused`.
    pub fn pause(&mut self) -> bool {
        if self.status != JobStatus::Downloading {
            return false;
        }
        self.status = JobStatus::Paused;
        self.clear_rates();
        true
    }

    /// `downloading -> pending` for a job whose executor is gone without an
    /// outcome (process restart or scheduler shutdown).
    pub fn requeue(&mut self) -> bool {
        if self.status != JobStatus::Downloading {
            return false;
        }
        self.status = JobStatus::Pending;
        self.clear_rates();
        true
    }

    /// `paused -> pending` (re-queued, not resumed in place).
    pub fn resume(&mut self) -> bool {
        if self.status != JobStatus::Paused {
            return false;
        }
        self.status = JobStatus::Pending;
        self.clear_rates();
        true
    }

    /// `error -> pending`, progress back to 0 and error cleared.
    pub fn retry(&mut self) -> bool {
        if self.status != JobStatus::Error {
            return false;
        }
        self.status = JobStatus::Pending;
        self.progress_percent = 0.0;
        self.last_error = None;
        self.clear_rates();
        true
    }

    /// `downloading -> completed`.
    pub fn complete(&mut self, now: i64) -> bool {
        if self.status != JobStatus::Downloading {
            return false;
        }
        self.status = JobStatus::Completed;
        self.progress_percent = 100.0;
        self.completed_at = Some(now);
        self.clear_rates();
        true
    }

    /// `downloading -> error`.
    pub fn fail(&mut self, reason: impl Into<String>) -> bool {
        if self.status != JobStatus::Downloading {
            return false;
        }
        let reason = reason.into();
        self.status = JobStatus::Error;
        self.last_error = Some(if reason.trim().is_empty() {
            "transfer failed".to_string()
        } else {
            reason
        });
        self.clear_rates();
        true
    }

    /// Applies a progress sample while downloading. Percent never goes backwards
    /// and stays below 100. Returns false if the job is not downloading.
    pub fn apply_progress(&mut self, percent: f64, speed_bps: f64) -> bool {
        if self.status != JobStatus::Downloading {
            return false;
        }
        let percent = if percent.is_finite() { percent } else { 0.0 };
        self.progress_percent = percent
            .min(MAX_ACTIVE_PERCENT)
            .max(self.progress_percent);
        self.speed_bps = if speed_bps.is_finite() { speed_bps.max(0.0) } else { 0.0 };
        self.eta_secs = if self.speed_bps > 0.0 {
            Some(self.remaining_bytes() as f64 / self.speed_bps)
        } else {
            None
        };
        true
    }
}

/// Current time as Unix milliseconds (for job timestamps).
pub fn unix_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> DownloadJob {
        DownloadJob::new(
            JobId::new("j1"),
            NewJob {
                filename: "movie.mkv".into(),
                source_url: "https://www.filehost.io/abc".into(),
                resolved_url: "https://dl.filehost.io/abc".into(),
                total_bytes: 1_000,
                host_label: None,
            },
            "session-1",
        )
    }

    #[test]
    fn new_job_is_pending_with_derived_host() {
        let j = job();
        assert_eq!(j.status, JobStatus::Pending);
        assert_eq!(j.progress_percent, 0.0);
        assert_eq!(j.host_label, "filehost.io");
        assert_eq!(j.owner_id, "session-1");
        assert!(j.archive_id.is_none());
    }

    #[test]
    fn explicit_host_label_wins() {
        let j = DownloadJob::new(
            JobId::new("j2"),
            NewJob {
                source_url: "https://a.example/x".into(),
                host_label: Some("mirror-a".into()),
                ..NewJob::default()
            },
            "s",
        );
        assert_eq!(j.host_label, "mirror-a");
    }

    #[test]
    fn guarded_transitions_are_noops_outside_source_state() {
        let mut j = job();
        let before = j.clone();
        assert!(!j.pause());
        assert!(!j.resume());
        assert!(!j.retry());
        assert!(!j.complete(1));
        assert!(!j.fail("boom"));
        assert_eq!(j, before);
    }

    #[test]
    fn full_lifecycle() {
        let mut j = job();
        assert!(j.admit(10));
        assert_eq!(j.started_at, Some(10));
        assert!(j.apply_progress(40.0, 100.0));
        assert_eq!(j.downloaded_bytes(), 400);
        assert_eq!(j.eta_secs, Some(6.0));
        assert!(j.pause());
        assert_eq!(j.speed_bps, 0.0);
        assert!(j.eta_secs.is_none());
        assert!(j.resume());
        assert_eq!(j.status, JobStatus::Pending);
        assert!(j.admit(20));
        assert_eq!(j.progress_percent, 0.0);
        assert!(j.fail("connection reset"));
        assert_eq!(j.last_error.as_deref(), Some("connection reset"));
        assert!(j.retry());
        assert!(j.last_error.is_none());
        assert!(j.admit(30));
        assert!(j.complete(40));
        assert_eq!(j.progress_percent, 100.0);
        assert_eq!(j.completed_at, Some(40));
    }

    #[test]
    fn progress_is_monotonic_and_below_hundred() {
        let mut j = job();
        j.admit(0);
        j.apply_progress(50.0, 10.0);
        j.apply_progress(30.0, 10.0);
        assert_eq!(j.progress_percent, 50.0);
        j.apply_progress(250.0, 10.0);
        assert_eq!(j.progress_percent, MAX_ACTIVE_PERCENT);
        j.apply_progress(60.0, 0.0);
        assert!(j.eta_secs.is_none());
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&JobStatus::Downloading).unwrap(), "\"downloading\"");
        let s: JobStatus = serde_json::from_str("\"error\"").unwrap();
        assert_eq!(s, JobStatus::Error);
    }
}
