//! `udq retry <id>` – re-queue a failed job.

use udq_core::{JobId, QueueManager};

pub fn run_retry(mgr: &QueueManager, id: &JobId) -> String {
    if mgr.retry(id) {
        format!("Re-queued job {id}")
    } else {
        match mgr.get(id) {
            Some(job) => format!("Job {id} is {}, not in error", job.status),
            None => format!("No job {id}"),
        }
    }
}
