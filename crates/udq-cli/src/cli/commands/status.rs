//! `udq status` – show every job in queue order.

use udq_core::{JobStatus, QueueSnapshot};

use super::{format_eta, mib};

pub fn run_status(queue: &QueueSnapshot) -> Vec<String> {
    if queue.is_empty() {
        return vec!["No jobs in queue.".to_string()];
    }
    let mut lines = vec![format!(
        "{:<36} {:<11} {:>6} {:>10} {:>10} {:>6}  {}",
        "ID", "STATUS", "PROG", "SIZE MiB", "MiB/s", "ETA", "NAME"
    )];
    for j in queue.iter() {
        let (speed, eta) = if j.status == JobStatus::Downloading {
            (format!("{:.2}", j.speed_bps / 1_048_576.0), format_eta(j.eta_secs))
        } else {
            ("-".to_string(), "-".to_string())
        };
        lines.push(format!(
            "{:<36} {:<11} {:>5.1}% {:>10.1} {:>10} {:>6}  {}",
            j.id,
            j.status.as_str(),
            j.progress_percent,
            mib(j.total_bytes),
            speed,
            eta,
            j.filename
        ));
        if j.status == JobStatus::Error {
            if let Some(err) = &j.last_error {
                lines.push(format!("    error: {err}"));
            }
        }
    }
    lines
}
