//! `udq stats` – queue totals, throughput and the per-host breakdown.

use udq_core::StatsSnapshot;

use super::{format_eta, mib};

pub fn run_stats(stats: &StatsSnapshot) -> Vec<String> {
    let mut lines = vec![
        format!(
            "Jobs: {} ({} completed, {} downloading, {} pending, {} paused, {} failed)",
            stats.total_downloads,
            stats.completed_downloads,
            stats.downloading,
            stats.pending,
            stats.paused,
            stats.failed
        ),
        format!(
            "Bytes: {:.1} / {:.1} MiB ({:.1}%)",
            mib(stats.downloaded_bytes),
            mib(stats.total_bytes),
            stats.fraction() * 100.0
        ),
        format!(
            "Average speed: {:.2} MiB/s  ETA {}",
            stats.average_speed_bps / 1_048_576.0,
            format_eta(stats.eta_secs())
        ),
    ];
    for (host, h) in &stats.by_host {
        lines.push(format!(
            "  {:<30} {:>3} job(s), {:>3} completed, {:.1} MiB",
            host,
            h.jobs,
            h.completed,
            mib(h.total_bytes)
        ));
    }
    lines
}
