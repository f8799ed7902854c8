//! Queue-wide summary counters derived from a snapshot.
//!
//! Pure and O(n) over the job count; recomputed on demand and after every
//! notification rather than stored.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::job::{DownloadJob, JobStatus};

/// Per-host breakdown (keyed by `host_label`).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HostStats {
    pub jobs: usize,
    pub completed: usize,
    pub total_bytes: u64,
}

/// Snapshot of queue statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatsSnapshot {
    /// Number of jobs in the queue.
    pub total_downloads: usize,
    /// Jobs in `completed`.
    pub completed_downloads: usize,
    /// Sum of `total_bytes` across all jobs, saturating at `u64::MAX`.
    pub total_bytes: u64,
    /// Sum of `total_bytes * progress / 100` across all jobs.
    pub downloaded_bytes: u64,
    /// Mean speed of `downloading` jobs in bytes/s (0 if none are active).
    pub average_speed_bps: f64,
    pub pending: usize,
    pub downloading: usize,
    pub paused: usize,
    pub failed: usize,
    pub by_host: BTreeMap<String, HostStats>,
}

impl StatsSnapshot {
    pub fn from_jobs<'a>(jobs: impl IntoIterator<Item = &'a DownloadJob>) -> Self {
        let mut stats = StatsSnapshot::default();
        let mut speed_sum = 0.0;
        for job in jobs {
            stats.total_downloads += 1;
            stats.total_bytes = stats.total_bytes.saturating_add(job.total_bytes);
            stats.downloaded_bytes = stats.downloaded_bytes.saturating_add(job.downloaded_bytes());
            match job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Downloading => {
                    stats.downloading += 1;
                    speed_sum += job.speed_bps;
                }
                JobStatus::Paused => stats.paused += 1,
                JobStatus::Completed => stats.completed_downloads += 1,
                JobStatus::Error => stats.failed += 1,
            }
            let host = stats.by_host.entry(job.host_label.clone()).or_default();
            host.jobs += 1;
            host.total_bytes = host.total_bytes.saturating_add(job.total_bytes);
            if job.status == JobStatus::Completed {
                host.completed += 1;
            }
        }
        if stats.downloading > 0 {
            stats.average_speed_bps = speed_sum / stats.downloading as f64;
        }
        stats
    }

    /// Fraction of all bytes transferred, in [0.0, 1.0] (1.0 for an empty queue).
    pub fn fraction(&self) -> f64 {
        if self.total_bytes == 0 {
            return 1.0;
        }
        (self.downloaded_bytes as f64 / self.total_bytes as f64).min(1.0)
    }

    /// Estimated seconds until all active transfers finish at the current
    /// aggregate rate (None if nothing is moving).
    pub fn eta_secs(&self) -> Option<f64> {
        let rate = self.average_speed_bps * self.downloading as f64;
        if rate <= 0.0 {
            return None;
        }
        Some(self.total_bytes.saturating_sub(self.downloaded_bytes) as f64 / rate)
    }
}
