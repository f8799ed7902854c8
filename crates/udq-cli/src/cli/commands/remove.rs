//! `udq remove <id>` – remove a job; a running download is stopped at its next sample.

use udq_core::{JobId, QueueManager};

pub fn run_remove(mgr: &QueueManager, id: &JobId) -> String {
    if mgr.remove(id) {
        format!("Removed job {id}")
    } else {
        format!("No job {id}")
    }
}
