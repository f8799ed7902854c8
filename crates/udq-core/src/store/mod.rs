//! Item store: the single owner of the ordered job collection.
//!
//! Every mutation is followed by a synchronous write of the whole collection
//! to a [`KvStore`] under [`QUEUE_NAMESPACE`]. On load, jobs found in
//! `downloading` are put back to `pending`: no transfer survives a restart.

mod kv;

pub use kv::{FileKv, KvStore, MemoryKv};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::job::{DownloadJob, JobId, JobStatus};

/// Key of the persisted queue record.
pub const QUEUE_NAMESPACE: &str = "udq.queue.v1";

const RECORD_VERSION: u32 = 1;

#[derive(Serialize)]
struct QueueRecordRef<'a> {
    version: u32,
    jobs: &'a [DownloadJob],
}

#[derive(Deserialize)]
struct QueueRecord {
    #[allow(dead_code)]
    version: u32,
    jobs: Vec<DownloadJob>,
}

/// Immutable, ordered copy of every job. Cheap to clone; never mutated once handed out.
#[derive(Debug, Clone, Default)]
pub struct QueueSnapshot {
    jobs: Arc<[DownloadJob]>,
}

impl QueueSnapshot {
    pub fn jobs(&self) -> &[DownloadJob] {
        &self.jobs
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DownloadJob> {
        self.jobs.iter()
    }

    pub fn get(&self, id: &JobId) -> Option<&DownloadJob> {
        self.jobs.iter().find(|j| &j.id == id)
    }

    pub fn count(&self, status: JobStatus) -> usize {
        self.jobs.iter().filter(|j| j.status == status).count()
    }
}

impl<'a> IntoIterator for &'a QueueSnapshot {
    type Item = &'a DownloadJob;
    type IntoIter = std::slice::Iter<'a, DownloadJob>;

    fn into_iter(self) -> Self::IntoIter {
        self.jobs.iter()
    }
}

/// Ordered job collection mirrored to durable storage.
pub struct ItemStore {
    jobs: Vec<DownloadJob>,
    kv: Arc<dyn KvStore>,
}

impl ItemStore {
    /// Loads the persisted queue (empty if none) and applies crash recovery.
    /// Returns the store and the number of jobs moved from `downloading` to `pending`.
    pub fn load(kv: Arc<dyn KvStore>) -> Result<(Self, usize)> {
        let jobs = match kv.get(QUEUE_NAMESPACE).context("read queue record")? {
            Some(bytes) => {
                let record: QueueRecord =
                    serde_json::from_slice(&bytes).context("parse queue record")?;
                record.jobs
            }
            None => Vec::new(),
        };
        let mut store = Self { jobs, kv };
        let mut recovered = 0;
        for job in store.jobs.iter_mut() {
            if job.requeue() {
                recovered += 1;
            }
        }
        if recovered > 0 {
            tracing::info!(recovered, "re-queued interrupted downloads");
            store.persist();
        }
        Ok((store, recovered))
    }

    /// Adds a job at the tail and persists. Returns its id.
    pub fn append(&mut self, job: DownloadJob) -> JobId {
        let id = job.id.clone();
        self.jobs.push(job);
        self.persist();
        id
    }

    /// Applies `f` to the job with `id`, if present. `f` reports whether it changed
    /// anything; the collection is persisted when it did. Unknown ids are a no-op.
    pub fn mutate(&mut self, id: &JobId, f: impl FnOnce(&mut DownloadJob) -> bool) -> bool {
        let Some(job) = self.jobs.iter_mut().find(|j| &j.id == id) else {
            return false;
        };
        let changed = f(job);
        if changed {
            self.persist();
        }
        changed
    }

    /// Deletes the job with `id` and persists. Executor teardown is the caller's job.
    pub fn remove(&mut self, id: &JobId) -> Option<DownloadJob> {
        let pos = self.jobs.iter().position(|j| &j.id == id)?;
        let job = self.jobs.remove(pos);
        self.persist();
        Some(job)
    }

    /// Keeps only jobs matching `keep`; returns the removed jobs in order.
    pub fn retain(&mut self, mut keep: impl FnMut(&DownloadJob) -> bool) -> Vec<DownloadJob> {
        let (kept, removed): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.jobs).into_iter().partition(|j| keep(j));
        self.jobs = kept;
        if !removed.is_empty() {
            self.persist();
        }
        removed
    }

    /// Removes every job; returns how many there were.
    pub fn clear(&mut self) -> usize {
        let n = self.jobs.len();
        self.jobs.clear();
        self.persist();
        n
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            jobs: self.jobs.clone().into(),
        }
    }

    pub fn get(&self, id: &JobId) -> Option<&DownloadJob> {
        self.jobs.iter().find(|j| &j.id == id)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DownloadJob> {
        self.jobs.iter()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn count(&self, status: JobStatus) -> usize {
        self.jobs.iter().filter(|j| j.status == status).count()
    }

    /// Writes the whole collection. Failures are logged, never surfaced to callers.
    fn persist(&self) {
        let record = QueueRecordRef {
            version: RECORD_VERSION,
            jobs: &self.jobs,
        };
        let bytes = match serde_json::to_vec(&record) {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!("serialize queue record: {}", e);
                return;
            }
        };
        if let Err(e) = self.kv.put(QUEUE_NAMESPACE, &bytes) {
            tracing::warn!("persist queue record: {:#}", e);
        }
    }
}

#[cfg(test)]
mod tests;
