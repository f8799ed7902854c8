//! CLI command handlers. Each command is in its own file; handlers return
//! their output lines so the same code serves the terminal and the control socket.

mod add;
mod clear;
mod limit;
mod pause;
mod remove;
mod resume;
mod retry;
mod run;
mod stats;
mod status;

pub use run::run_scheduler;

use udq_core::QueueManager;

use super::control_socket::Request;

/// Applies one control request to `mgr` and returns what to print.
pub fn execute(mgr: &QueueManager, request: Request) -> Vec<String> {
    match request {
        Request::Add {
            filename,
            source_url,
            resolved_url,
            total_bytes,
            host_label,
        } => vec![add::run_add(
            mgr,
            udq_core::NewJob {
                filename,
                source_url,
                resolved_url,
                total_bytes,
                host_label,
            },
        )],
        Request::Pause(id) => vec![pause::run_pause(mgr, &id)],
        Request::Resume(id) => vec![resume::run_resume(mgr, &id)],
        Request::Retry(id) => vec![retry::run_retry(mgr, &id)],
        Request::Remove(id) => vec![remove::run_remove(mgr, &id)],
        Request::Clear { all } => vec![clear::run_clear(mgr, all)],
        Request::Limit(n) => vec![limit::run_limit(mgr, n)],
        Request::Status => status::run_status(&mgr.snapshot()),
        Request::Stats => stats::run_stats(&mgr.stats()),
    }
}

pub(crate) fn mib(bytes: u64) -> f64 {
    bytes as f64 / 1_048_576.0
}

pub(crate) fn format_eta(secs: Option<f64>) -> String {
    match secs {
        Some(s) if s.is_finite() => format!("{:.0}s", s),
        _ => "?".to_string(),
    }
}
