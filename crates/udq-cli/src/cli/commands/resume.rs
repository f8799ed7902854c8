//! `udq resume <id>` – re-queue a paused job; it restarts from the beginning.

use udq_core::{JobId, QueueManager};

pub fn run_resume(mgr: &QueueManager, id: &JobId) -> String {
    if mgr.resume(id) {
        format!("Resumed job {id} (queued, restarts from 0%)")
    } else {
        match mgr.get(id) {
            Some(job) => format!("Job {id} is {}, not paused", job.status),
            None => format!("No job {id}"),
        }
    }
}
