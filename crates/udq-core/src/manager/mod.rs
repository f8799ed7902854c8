//! The queue manager service: the one object callers hold.
//!
//! Owns the item store, the executor bindings, the notification bus and the
//! concurrency limit. Construct one per session with [`QueueManager::builder`]
//! and pass clones to whoever needs it; every clone drives the same queue.

mod scheduler;

pub use scheduler::SchedulerHandle;

use anyhow::Result;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::archive::ArchiveSink;
use crate::config::{clamp_concurrency, UdqConfig};
use crate::control::JobControl;
use crate::events::{EventBus, Subscription};
use crate::job::{DownloadJob, IdGenerator, JobId, JobStatus, NewJob, UuidIds};
use crate::stats::StatsSnapshot;
use crate::store::{ItemStore, KvStore, QueueSnapshot};
use crate::transfer::{SimulatedTransfer, TransferExecutor};

/// State shared by the manager, the scheduler loop and every transfer handle.
///
/// Lock order: `store` may be held while taking the `control` lock, never the
/// reverse. Notifications are only published with no store guard held.
pub(crate) struct Shared {
    store: Mutex<ItemStore>,
    bus: EventBus,
    control: JobControl,
    limit: AtomicUsize,
    executor: Arc<dyn TransferExecutor>,
    archive: Option<Arc<dyn ArchiveSink>>,
    ids: Arc<dyn IdGenerator>,
    owner_id: String,
    recovered: usize,
}

impl Shared {
    pub(crate) fn store(&self) -> MutexGuard<'_, ItemStore> {
        self.store.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Publishes "queue changed" (then "stats changed") with a fresh snapshot.
    pub(crate) fn notify(&self) {
        self.bus.publish(|| self.store().snapshot());
    }
}

/// Builder for [`QueueManager`].
pub struct QueueManagerBuilder {
    kv: Arc<dyn KvStore>,
    executor: Option<Arc<dyn TransferExecutor>>,
    archive: Option<Arc<dyn ArchiveSink>>,
    ids: Arc<dyn IdGenerator>,
    owner_id: String,
    max_concurrent: usize,
}

impl QueueManagerBuilder {
    /// Executor used for every admitted job. Defaults to [`SimulatedTransfer`]
    /// at a 500 ms cadence.
    pub fn executor(mut self, executor: Arc<dyn TransferExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn archive(mut self, sink: Arc<dyn ArchiveSink>) -> Self {
        self.archive = Some(sink);
        self
    }

    pub fn ids(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn owner_id(mut self, owner_id: impl Into<String>) -> Self {
        self.owner_id = owner_id.into();
        self
    }

    /// Clamped to `[1, 10]`.
    pub fn max_concurrent(mut self, n: usize) -> Self {
        self.max_concurrent = clamp_concurrency(n);
        self
    }

    /// Applies `max_concurrent` and `owner_id` from config.
    pub fn config(self, cfg: &UdqConfig) -> Self {
        self.max_concurrent(cfg.concurrency()).owner_id(cfg.owner())
    }

    /// Loads the persisted queue (applying crash recovery) and returns the manager.
    /// Fails only if the stored record cannot be read or parsed.
    pub fn build(self) -> Result<QueueManager> {
        let (store, recovered) = ItemStore::load(self.kv)?;
        let executor: Arc<dyn TransferExecutor> = match self.executor {
            Some(executor) => executor,
            None => Arc::new(SimulatedTransfer::new(Duration::from_millis(500))),
        };
        tracing::debug!(
            jobs = store.len(),
            recovered,
            max_concurrent = self.max_concurrent,
            owner = %self.owner_id,
            "queue manager ready"
        );
        Ok(QueueManager {
            shared: Arc::new(Shared {
                store: Mutex::new(store),
                bus: EventBus::new(),
                control: JobControl::new(),
                limit: AtomicUsize::new(self.max_concurrent),
                executor,
                archive: self.archive,
                ids: self.ids,
                owner_id: self.owner_id,
                recovered,
            }),
        })
    }
}

/// Download queue: bounded-concurrency scheduling over a persisted job list.
#[derive(Clone)]
pub struct QueueManager {
    shared: Arc<Shared>,
}

impl QueueManager {
    pub fn builder(kv: Arc<dyn KvStore>) -> QueueManagerBuilder {
        QueueManagerBuilder {
            kv,
            executor: None,
            archive: None,
            ids: Arc::new(UuidIds),
            owner_id: "local".to_string(),
            max_concurrent: UdqConfig::default().concurrency(),
        }
    }

    /// Appends a `pending` job at the tail of the queue.
    pub fn enqueue(&self, new: NewJob) -> JobId {
        let shared = &self.shared;
        let job = DownloadJob::new(shared.ids.next_id(), new, shared.owner_id.clone());
        tracing::info!(job_id = %job.id, filename = %job.filename, host = %job.host_label, "enqueued");
        let id = shared.store().append(job);
        shared.notify();
        id
    }

    /// Deletes the job; a bound executor is told to stop at its next sample.
    /// Returns whether the job existed.
    pub fn remove(&self, id: &JobId) -> bool {
        let removed = self.shared.store().remove(id).is_some();
        self.shared.control.request_abort(id);
        if removed {
            tracing::info!(job_id = %id, "removed");
            self.shared.notify();
        }
        removed
    }

    /// `downloading -> paused`; otherwise a no-op.
    pub fn pause(&self, id: &JobId) -> bool {
        self.transition(id, "paused", DownloadJob::pause)
    }

    /// `paused -> pending`; the job is re-admitted from the start on a later tick.
    pub fn resume(&self, id: &JobId) -> bool {
        self.transition(id, "resumed", DownloadJob::resume)
    }

    /// `error -> pending` with progress and error cleared; otherwise a no-op.
    pub fn retry(&self, id: &JobId) -> bool {
        self.transition(id, "retrying", DownloadJob::retry)
    }

    fn transition(&self, id: &JobId, what: &str, f: fn(&mut DownloadJob) -> bool) -> bool {
        let applied = self.shared.store().mutate(id, f);
        if applied {
            tracing::info!(job_id = %id, "{}", what);
            self.shared.notify();
        }
        applied
    }

    /// Removes every `completed` job; returns how many.
    pub fn clear_completed(&self) -> usize {
        let removed = self
            .shared
            .store()
            .retain(|j| j.status != JobStatus::Completed)
            .len();
        if removed > 0 {
            tracing::info!(removed, "cleared completed jobs");
            self.shared.notify();
        }
        removed
    }

    /// Removes every job and cancels all running executors; returns how many jobs.
    pub fn clear_all(&self) -> usize {
        let removed = self.shared.store().clear();
        self.shared.control.abort_all();
        tracing::info!(removed, "cleared queue");
        self.shared.notify();
        removed
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        self.shared.store().snapshot()
    }

    pub fn stats(&self) -> StatsSnapshot {
        StatsSnapshot::from_jobs(&self.snapshot())
    }

    pub fn get(&self, id: &JobId) -> Option<DownloadJob> {
        self.shared.store().get(id).cloned()
    }

    pub fn subscribe_queue(
        &self,
        listener: impl Fn(&QueueSnapshot) + Send + Sync + 'static,
    ) -> Subscription {
        self.shared.bus.subscribe_queue(listener)
    }

    pub fn subscribe_stats(
        &self,
        listener: impl Fn(&StatsSnapshot) + Send + Sync + 'static,
    ) -> Subscription {
        self.shared.bus.subscribe_stats(listener)
    }

    /// Clamps to `[1, 10]` and takes effect on the next tick. Lowering the
    /// limit never interrupts running transfers. Returns the applied value.
    pub fn set_concurrency_limit(&self, requested: usize) -> usize {
        let applied = clamp_concurrency(requested);
        let previous = self.shared.limit.swap(applied, Ordering::SeqCst);
        if previous != applied {
            tracing::info!(requested, applied, "concurrency limit changed");
        }
        applied
    }

    pub fn concurrency_limit(&self) -> usize {
        self.shared.limit.load(Ordering::SeqCst)
    }

    /// Jobs moved from `downloading` back to `pending` when the queue was loaded.
    pub fn recovered_on_load(&self) -> usize {
        self.shared.recovered
    }

    /// True while any job is `pending` or `downloading`.
    pub fn has_active_work(&self) -> bool {
        let store = self.shared.store();
        store.count(JobStatus::Pending) + store.count(JobStatus::Downloading) > 0
    }

    /// Number of executor tasks currently bound to jobs.
    pub fn running_transfers(&self) -> usize {
        self.shared.control.bound_count()
    }
}
