//! `udq run` – run the scheduler until Ctrl-C (or until idle with `--until-idle`).

use anyhow::Result;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use udq_core::config::{self, UdqConfig};
use udq_core::{JobStatus, QueueManager, StatsSnapshot};

use super::{format_eta, mib};
use crate::cli::control_socket;

const PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

pub async fn run_scheduler(mgr: QueueManager, cfg: &UdqConfig, until_idle: bool) -> Result<()> {
    let recovered = mgr.recovered_on_load();
    if recovered > 0 {
        println!("Re-queued {recovered} interrupted download(s) from the previous run.");
    }

    let socket_path = config::default_control_socket_path()?;
    let listener = match control_socket::spawn_control_listener(mgr.clone(), &socket_path) {
        Ok(handle) => {
            tracing::debug!(path = %socket_path.display(), "control socket listening");
            Some(handle)
        }
        Err(e) => {
            tracing::warn!(path = %socket_path.display(), "control socket unavailable: {:#}", e);
            None
        }
    };

    let last_print: Mutex<Option<Instant>> = Mutex::new(None);
    let progress = mgr.subscribe_stats(move |stats: &StatsSnapshot| {
        let mut last = last_print.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        if last.is_some_and(|t| now.duration_since(t) < PROGRESS_INTERVAL) {
            return;
        }
        *last = Some(now);
        println!(
            "  {:.1} / {:.1} MiB ({:.1}%)  {:.2} MiB/s  ETA {}  [{} active, {} queued, {} done]",
            mib(stats.downloaded_bytes),
            mib(stats.total_bytes),
            stats.fraction() * 100.0,
            stats.average_speed_bps * stats.downloading as f64 / 1_048_576.0,
            format_eta(stats.eta_secs()),
            stats.downloading,
            stats.pending,
            stats.completed_downloads
        );
    });

    println!(
        "Running with up to {} concurrent download(s). Ctrl-C to stop.",
        mgr.concurrency_limit()
    );
    let scheduler = mgr.start(cfg.tick_interval());

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    if until_idle {
        let mut poll = tokio::time::interval(cfg.tick_interval());
        loop {
            tokio::select! {
                res = &mut ctrl_c => {
                    res?;
                    break;
                }
                _ = poll.tick() => {
                    if !mgr.has_active_work() {
                        break;
                    }
                }
            }
        }
    } else {
        ctrl_c.await?;
    }

    scheduler.shutdown().await;
    progress.unsubscribe();
    if let Some(handle) = listener {
        handle.abort();
        let _ = std::fs::remove_file(&socket_path);
    }

    let snap = mgr.snapshot();
    println!(
        "Stopped: {} completed, {} failed, {} paused, {} left in queue.",
        snap.count(JobStatus::Completed),
        snap.count(JobStatus::Error),
        snap.count(JobStatus::Paused),
        snap.count(JobStatus::Pending) + snap.count(JobStatus::Downloading)
    );
    Ok(())
}
