//! Transfer executors: drive one job from `downloading` to an outcome.
//!
//! An executor samples at a fixed cadence, reports progress through its
//! [`TransferHandle`], suspends while the job is paused and returns promptly
//! once the handle reports cancellation. Returning `Ok(())` means the bytes
//! are all there; the scheduler then marks the job completed.

mod http;
mod simulated;

pub use http::HttpTransfer;
pub use simulated::SimulatedTransfer;

use async_trait::async_trait;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::control::AbortToken;
use crate::job::{DownloadJob, JobId, JobStatus};
use crate::manager::Shared;

/// What an executor needs to know about its job.
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub job_id: JobId,
    pub filename: String,
    pub source_url: String,
    pub resolved_url: String,
    pub total_bytes: u64,
}

impl From<&DownloadJob> for TransferRequest {
    fn from(job: &DownloadJob) -> Self {
        Self {
            job_id: job.id.clone(),
            filename: job.filename.clone(),
            source_url: job.source_url.clone(),
            resolved_url: job.resolved_url.clone(),
            total_bytes: job.total_bytes,
        }
    }
}

/// A progress sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    /// Overall completion, 0..100.
    pub percent: f64,
    /// Instantaneous rate in bytes/s.
    pub speed_bps: f64,
}

/// What the executor should do at a sampling point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observed {
    /// Keep transferring.
    Active,
    /// Hold: no further progress until the job changes state.
    Paused,
    /// Stop now without touching the job (removed, aborted, or re-queued).
    Cancelled,
}

/// Executor failure. Everything except `Cancelled` becomes the job's `last_error`.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("transfer cancelled")]
    Cancelled,
    #[error("{0}")]
    Fault(String),
    #[error("server returned HTTP {0}")]
    Http(u32),
    #[error("network error: {0}")]
    Curl(#[from] curl::Error),
    #[error("storage error: {0}")]
    Io(#[from] std::io::Error),
}

/// Performs (or simulates) the byte transfer for one job.
#[async_trait]
pub trait TransferExecutor: Send + Sync {
    async fn transfer(
        &self,
        request: TransferRequest,
        handle: TransferHandle,
    ) -> Result<(), TransferError>;
}

/// The executor's only channel back to the queue. Cheap to clone and usable
/// from blocking threads; every call goes through the item store lock.
#[derive(Clone)]
pub struct TransferHandle {
    job_id: JobId,
    token: AbortToken,
    shared: Arc<Shared>,
}

impl TransferHandle {
    pub(crate) fn new(job_id: JobId, token: AbortToken, shared: Arc<Shared>) -> Self {
        Self {
            job_id,
            token,
            shared,
        }
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Lock-free check of the abort token set by remove, clear-all and shutdown.
    pub fn is_aborted(&self) -> bool {
        self.token.load(Ordering::SeqCst)
    }

    /// Checks the job's state at a sampling point.
    pub fn observe(&self) -> Observed {
        if self.is_aborted() {
            return Observed::Cancelled;
        }
        match self.shared.store().get(&self.job_id).map(|j| j.status) {
            Some(JobStatus::Downloading) => Observed::Active,
            Some(JobStatus::Paused) => Observed::Paused,
            _ => Observed::Cancelled,
        }
    }

    /// Records a progress sample and notifies listeners. Ignored (returns false)
    /// unless the job is still downloading and not aborted.
    pub fn record_progress(&self, progress: Progress) -> bool {
        if self.is_aborted() {
            return false;
        }
        let applied = self
            .shared
            .store()
            .mutate(&self.job_id, |job| job.apply_progress(progress.percent, progress.speed_bps));
        if applied {
            self.shared.notify();
        }
        applied
    }
}
