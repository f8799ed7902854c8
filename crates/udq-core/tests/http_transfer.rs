//! Integration test: the curl executor against a local HTTP server, driven by the scheduler.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::http_server::{self, ServerOptions};
use tempfile::tempdir;
use udq_core::{HttpTransfer, JobId, JobStatus, MemoryKv, NewJob, QueueManager};

fn http_manager(download_dir: &std::path::Path) -> QueueManager {
    let executor = HttpTransfer::new(download_dir, Duration::from_millis(50))
        .with_connect_timeout(Duration::from_secs(5));
    QueueManager::builder(Arc::new(MemoryKv::new()))
        .executor(Arc::new(executor))
        .build()
        .unwrap()
}

fn job(url: String, filename: &str, total_bytes: u64) -> NewJob {
    NewJob {
        filename: filename.into(),
        source_url: url.clone(),
        resolved_url: url,
        total_bytes,
        host_label: None,
    }
}

/// Ticks until `done` holds or the deadline passes.
async fn tick_until(mgr: &QueueManager, done: impl Fn(&QueueManager) -> bool) -> bool {
    for _ in 0..200 {
        mgr.tick();
        if done(mgr) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    false
}

fn status(mgr: &QueueManager, id: &JobId) -> Option<JobStatus> {
    mgr.get(id).map(|j| j.status)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn download_completes_and_file_matches() {
    let body: Vec<u8> = (0u8..100).cycle().take(64 * 1024).collect();
    let url = http_server::start(body.clone());
    let dir = tempdir().unwrap();
    let mgr = http_manager(dir.path());

    let id = mgr.enqueue(job(format!("{url}file.bin"), "file.bin", body.len() as u64));
    assert!(tick_until(&mgr, |m| status(m, &id) == Some(JobStatus::Completed)).await);

    let got = std::fs::read(dir.path().join("file.bin")).unwrap();
    assert_eq!(got, body);
    assert!(!dir.path().join("file.bin.part").exists());
    assert_eq!(mgr.get(&id).unwrap().progress_percent, 100.0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn http_error_status_fails_the_job() {
    let url = http_server::start(b"unused".to_vec());
    let dir = tempdir().unwrap();
    let mgr = http_manager(dir.path());

    let id = mgr.enqueue(job(format!("{url}missing"), "gone.bin", 6));
    assert!(tick_until(&mgr, |m| status(m, &id) == Some(JobStatus::Error)).await);

    let job = mgr.get(&id).unwrap();
    assert_eq!(job.last_error.as_deref(), Some("server returned HTTP 404"));
    assert!(job.progress_percent < 100.0);
    assert!(!dir.path().join("gone.bin.part").exists());
    assert!(!dir.path().join("gone.bin").exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn removing_a_running_download_stops_it() {
    let body = vec![7u8; 256 * 1024];
    let url = http_server::start_with_options(
        body.clone(),
        ServerOptions {
            chunk_size: 1024,
            chunk_delay: Some(Duration::from_millis(20)),
        },
    );
    let dir = tempdir().unwrap();
    let mgr = http_manager(dir.path());

    let id = mgr.enqueue(job(format!("{url}slow.bin"), "slow.bin", body.len() as u64));
    assert!(tick_until(&mgr, |m| m.get(&id).map_or(false, |j| j.progress_percent > 0.0)).await);

    assert!(mgr.remove(&id));
    assert!(tick_until(&mgr, |m| m.running_transfers() == 0).await);
    assert!(!dir.path().join("slow.bin").exists());
    assert!(!dir.path().join("slow.bin.part").exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn paused_download_restarts_from_zero_after_resume() {
    let body: Vec<u8> = (0u8..=255).cycle().take(64 * 1024).collect();
    let url = http_server::start_with_options(
        body.clone(),
        ServerOptions {
            chunk_size: 1024,
            chunk_delay: Some(Duration::from_millis(10)),
        },
    );
    let dir = tempdir().unwrap();
    let mgr = http_manager(dir.path());

    let id = mgr.enqueue(job(format!("{url}pausable.bin"), "pausable.bin", body.len() as u64));
    assert!(tick_until(&mgr, |m| m.get(&id).map_or(false, |j| j.progress_percent > 0.0)).await);
    let first_start = mgr.get(&id).unwrap().started_at;

    assert!(mgr.pause(&id));
    tokio::time::sleep(Duration::from_millis(100)).await;
    let held = mgr.get(&id).unwrap().progress_percent;
    tokio::time::sleep(Duration::from_millis(300)).await;
    let job_now = mgr.get(&id).unwrap();
    assert_eq!(job_now.status, JobStatus::Paused);
    assert_eq!(job_now.progress_percent, held);
    assert_eq!(mgr.tick(), 0);
    assert_eq!(mgr.running_transfers(), 1);

    assert!(mgr.resume(&id));
    let mut completed = false;
    for _ in 0..400 {
        mgr.tick();
        assert!(mgr.running_transfers() <= 1);
        if status(&mgr, &id) == Some(JobStatus::Completed) {
            completed = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    assert!(completed);

    let done = mgr.get(&id).unwrap();
    assert!(done.started_at > first_start);
    assert_eq!(std::fs::read(dir.path().join("pausable.bin")).unwrap(), body);
    assert!(!dir.path().join("pausable.bin.part").exists());
}
