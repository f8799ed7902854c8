//! Scheduler loop: admission on each tick and reconciliation of outcomes.
//!
//! A tick frees slots whose executor has exited, re-queues downloading jobs
//! left without an executor, then admits pending jobs in queue order until
//! `limit` jobs are downloading. Each admitted job gets its
//! own tokio task; the task applies the outcome to the store when the
//! executor returns.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::{QueueManager, Shared};
use crate::archive::ArchiveRecord;
use crate::control::JobControl;
use crate::job::{unix_millis, JobId, JobStatus};
use crate::transfer::{TransferError, TransferHandle, TransferRequest};

impl QueueManager {
    /// Runs one scheduling pass and returns how many jobs were admitted.
    /// Must be called from within a tokio runtime.
    pub fn tick(&self) -> usize {
        let shared = &self.shared;
        shared.control.prune_finished();

        let (requeued, admitted) = {
            let mut store = shared.store();

            // Downloading with no bound executor: the executor was stopped by
            // a shutdown and never reported an outcome.
            let stranded: Vec<JobId> = store
                .iter()
                .filter(|j| j.status == JobStatus::Downloading && !shared.control.is_bound(&j.id))
                .map(|j| j.id.clone())
                .collect();
            let mut requeued = 0;
            for id in &stranded {
                if store.mutate(id, |j| j.requeue()) {
                    tracing::info!(job_id = %id, "re-queued interrupted download");
                    requeued += 1;
                }
            }

            let limit = shared.limit.load(std::sync::atomic::Ordering::SeqCst);
            let slots = limit.saturating_sub(store.count(JobStatus::Downloading));
            // A job whose previous executor has not exited yet waits for a later tick.
            let candidates: Vec<JobId> = store
                .iter()
                .filter(|j| j.status == JobStatus::Pending && !shared.control.is_bound(&j.id))
                .take(slots)
                .map(|j| j.id.clone())
                .collect();
            let now = unix_millis();
            let mut admitted = 0;
            for id in candidates {
                if !store.mutate(&id, |j| j.admit(now)) {
                    continue;
                }
                let Some(request) = store.get(&id).map(TransferRequest::from) else {
                    continue;
                };
                // Bound before the store guard drops, so no other pass sees
                // this job downloading without an executor.
                let token = JobControl::new_token();
                let handle = TransferHandle::new(id.clone(), Arc::clone(&token), Arc::clone(shared));
                tracing::info!(job_id = %id, filename = %request.filename, "download started");
                let task = tokio::spawn(drive(Arc::clone(shared), request, handle));
                shared.control.bind(id, token, task);
                admitted += 1;
            }
            (requeued, admitted)
        };

        if requeued > 0 || admitted > 0 {
            shared.notify();
        }
        admitted
    }

    /// Spawns the periodic tick loop. The first tick runs immediately.
    pub fn start(&self, tick_interval: Duration) -> SchedulerHandle {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let mgr = self.clone();
        let period = tick_interval.max(Duration::from_millis(1));
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        mgr.tick();
                    }
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        });
        tracing::info!(tick_ms = period.as_millis() as u64, "scheduler started");
        SchedulerHandle {
            stop: stop_tx,
            task,
            shared: Arc::clone(&self.shared),
        }
    }
}

/// Running scheduler loop. Dropping it leaves the loop running; call
/// [`SchedulerHandle::shutdown`] to stop it.
pub struct SchedulerHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
    shared: Arc<Shared>,
}

impl SchedulerHandle {
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stops ticking, asks every executor to stop and waits for them.
    /// Interrupted jobs are left `downloading`; the next load re-queues them,
    /// as does the first tick of a scheduler restarted on this manager.
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        if let Err(e) = self.task.await {
            tracing::warn!("scheduler loop ended abnormally: {}", e);
        }
        self.shared.control.abort_all();
        let tasks = self.shared.control.drain();
        let interrupted = tasks.len();
        for task in tasks {
            if let Err(e) = task.await {
                tracing::warn!("transfer task join: {}", e);
            }
        }
        tracing::info!(interrupted, "scheduler stopped");
    }
}

/// Runs the executor for one job and applies its outcome. The executor runs in
/// its own task so a panic is caught here as a join error.
async fn drive(shared: Arc<Shared>, request: TransferRequest, handle: TransferHandle) {
    let job_id = request.job_id.clone();
    let executor = Arc::clone(&shared.executor);
    let joined = tokio::spawn(async move { executor.transfer(request, handle).await }).await;
    let outcome = match joined {
        Ok(result) => result,
        Err(e) if e.is_panic() => Err(TransferError::Fault("transfer task panicked".to_string())),
        Err(_) => Err(TransferError::Cancelled),
    };
    finish(&shared, &job_id, outcome);
}

/// Applies an executor outcome. Only a job still `downloading` is touched.
fn finish(shared: &Arc<Shared>, job_id: &JobId, outcome: Result<(), TransferError>) {
    match outcome {
        Ok(()) => {
            let completed = shared.store().mutate(job_id, |j| j.complete(unix_millis()));
            if !completed {
                tracing::debug!(job_id = %job_id, "transfer finished for a job no longer downloading");
                return;
            }
            tracing::info!(job_id = %job_id, "download completed");
            shared.notify();
            spawn_archival(shared, job_id);
        }
        Err(TransferError::Cancelled) => {
            tracing::debug!(job_id = %job_id, "transfer cancelled");
        }
        Err(e) => {
            let reason = e.to_string();
            let failed = shared.store().mutate(job_id, |j| j.fail(reason.clone()));
            if failed {
                tracing::warn!(job_id = %job_id, "download failed: {}", reason);
                shared.notify();
            }
        }
    }
}

/// Fire-and-forget hand-off of a completed job to the archive sink.
fn spawn_archival(shared: &Arc<Shared>, job_id: &JobId) {
    let Some(sink) = shared.archive.clone() else {
        return;
    };
    let Some(record) = shared.store().get(job_id).map(ArchiveRecord::from) else {
        return;
    };
    let shared = Arc::clone(shared);
    tokio::spawn(async move {
        let job_id = record.job_id.clone();
        match sink.archive(record).await {
            Ok(archive_id) => {
                tracing::debug!(job_id = %job_id, archive_id = %archive_id, "archived");
                let recorded = shared.store().mutate(&job_id, |j| {
                    j.archive_id = Some(archive_id);
                    true
                });
                if recorded {
                    shared.notify();
                }
            }
            Err(e) => {
                tracing::warn!(job_id = %job_id, "archival failed: {}", e);
            }
        }
    });
}
