//! Executor bindings: which job has a live transfer task, and its abort token.
//!
//! The scheduler registers a binding when it admits a job and prunes it once
//! the task has exited. A job is only admitted while it has no binding, so at
//! most one executor is ever attached to a job. Removal and shutdown set the
//! abort token; executors observe it at their next sampling point.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

use crate::job::JobId;

/// Shared abort flag handed to a transfer.
pub type AbortToken = Arc<AtomicBool>;

struct Binding {
    token: AbortToken,
    handle: JoinHandle<()>,
}

/// Registry of job id -> running executor task.
#[derive(Default)]
pub struct JobControl {
    jobs: Mutex<HashMap<JobId, Binding>>,
}

impl JobControl {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<JobId, Binding>> {
        self.jobs.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Creates the abort token for a job about to be started.
    pub fn new_token() -> AbortToken {
        Arc::new(AtomicBool::new(false))
    }

    /// Records the task running `job_id`. A stale binding for the same job is aborted.
    pub fn bind(&self, job_id: JobId, token: AbortToken, handle: JoinHandle<()>) {
        if let Some(old) = self.lock().insert(job_id.clone(), Binding { token, handle }) {
            tracing::warn!(job_id = %job_id, "replacing live executor binding");
            old.token.store(true, Ordering::SeqCst);
        }
    }

    pub fn is_bound(&self, job_id: &JobId) -> bool {
        self.lock().contains_key(job_id)
    }

    pub fn bound_count(&self) -> usize {
        self.lock().len()
    }

    /// Asks the executor bound to `job_id` (if any) to stop.
    pub fn request_abort(&self, job_id: &JobId) {
        if let Some(binding) = self.lock().get(job_id) {
            binding.token.store(true, Ordering::SeqCst);
        }
    }

    /// Asks every bound executor to stop.
    pub fn abort_all(&self) {
        for binding in self.lock().values() {
            binding.token.store(true, Ordering::SeqCst);
        }
    }

    /// Drops bindings whose task has exited; returns their job ids.
    pub fn prune_finished(&self) -> Vec<JobId> {
        let mut jobs = self.lock();
        let finished: Vec<JobId> = jobs
            .iter()
            .filter(|(_, b)| b.handle.is_finished())
            .map(|(id, _)| id.clone())
            .collect();
        for id in &finished {
            jobs.remove(id);
        }
        finished
    }

    /// Takes every task handle out of the registry (for shutdown).
    pub fn drain(&self) -> Vec<JoinHandle<()>> {
        self.lock().drain().map(|(_, b)| b.handle).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn bind_abort_and_prune() {
        let control = JobControl::new();
        let id = JobId::new("a");
        let token = JobControl::new_token();
        let seen = Arc::clone(&token);
        let handle = tokio::spawn(async move {
            while !seen.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        });
        control.bind(id.clone(), Arc::clone(&token), handle);
        assert!(control.is_bound(&id));
        assert!(control.prune_finished().is_empty());

        control.request_abort(&id);
        assert!(token.load(Ordering::SeqCst));
        for h in control.drain() {
            h.await.unwrap();
        }
        assert_eq!(control.bound_count(), 0);
    }

    #[tokio::test]
    async fn prune_removes_exited_tasks() {
        let control = JobControl::new();
        let id = JobId::new("done");
        let handle = tokio::spawn(async {});
        tokio::time::sleep(Duration::from_millis(10)).await;
        control.bind(id.clone(), JobControl::new_token(), handle);
        assert_eq!(control.prune_finished(), vec![id.clone()]);
        assert!(!control.is_bound(&id));
    }

    #[test]
    fn abort_unknown_job_is_noop() {
        let control = JobControl::new();
        control.request_abort(&JobId::new("missing"));
        control.abort_all();
        assert_eq!(control.bound_count(), 0);
    }
}
