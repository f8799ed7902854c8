//! `udq limit <n>` – change the concurrency limit of the running scheduler.

use udq_core::QueueManager;

pub fn run_limit(mgr: &QueueManager, requested: usize) -> String {
    let applied = mgr.set_concurrency_limit(requested);
    if applied == requested {
        format!("Concurrency limit set to {applied}")
    } else {
        format!("Concurrency limit set to {applied} (requested {requested}, allowed 1-10)")
    }
}
