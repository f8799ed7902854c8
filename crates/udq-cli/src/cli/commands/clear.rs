//! `udq clear [--all]` – drop completed jobs, or everything.

use udq_core::QueueManager;

pub fn run_clear(mgr: &QueueManager, all: bool) -> String {
    if all {
        let n = mgr.clear_all();
        format!("Removed {n} job(s)")
    } else {
        let n = mgr.clear_completed();
        format!("Removed {n} completed job(s)")
    }
}
