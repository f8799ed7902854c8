//! `udq add <url>` – queue a download.

use udq_core::{NewJob, QueueManager};

pub fn run_add(mgr: &QueueManager, job: NewJob) -> String {
    let url = job.source_url.clone();
    let id = mgr.enqueue(job);
    format!("Added job {id} for URL: {url}")
}
