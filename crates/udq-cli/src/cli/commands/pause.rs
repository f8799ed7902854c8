//! `udq pause <id>` – pause a downloading job. Its executor holds until the job is resumed or removed.

use udq_core::{JobId, QueueManager};

pub fn run_pause(mgr: &QueueManager, id: &JobId) -> String {
    if mgr.pause(id) {
        format!("Paused job {id}")
    } else {
        match mgr.get(id) {
            Some(job) => format!("Job {id} is {}, not downloading", job.status),
            None => format!("No job {id}"),
        }
    }
}
