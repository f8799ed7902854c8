//! CLI for the udq download queue.
//!
//! `udq run` owns the queue while it runs and listens on a control socket;
//! every other command is forwarded to it, or applied to the persisted queue
//! directly when no scheduler is running.

mod commands;
mod control_socket;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use udq_core::config::{self, TransferBackend, UdqConfig};
use udq_core::{
    FileKv, HttpTransfer, JsonLinesArchive, QueueManager, SimulatedTransfer, TransferExecutor,
};

use commands::{execute, run_scheduler};
use control_socket::Request;

/// Top-level CLI for the udq download queue.
#[derive(Debug, Parser)]
#[command(name = "udq")]
#[command(about = "udq: bounded-concurrency download queue", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Queue a download.
    Add {
        /// Original URL of the file.
        url: String,
        /// Direct download URL, if different from the original.
        #[arg(long, value_name = "URL")]
        resolved: Option<String>,
        /// File name to save as (default: last path segment of the URL).
        #[arg(long)]
        name: Option<String>,
        /// Expected size in bytes (0 if unknown).
        #[arg(long, default_value = "0", value_name = "BYTES")]
        size: u64,
        /// Label used to group the job in stats (default: the URL host).
        #[arg(long)]
        host: Option<String>,
    },

    /// Run the scheduler until Ctrl-C.
    Run {
        /// Exit once nothing is pending or downloading.
        #[arg(long)]
        until_idle: bool,
        /// Run up to N jobs concurrently (overrides max_concurrent from config).
        #[arg(long, value_name = "N")]
        jobs: Option<usize>,
    },

    /// Show every job in queue order.
    Status,

    /// Show queue statistics.
    Stats,

    /// Pause a downloading job.
    Pause {
        /// Job identifier.
        id: String,
    },

    /// Re-queue a paused job (it restarts from the beginning).
    Resume {
        /// Job identifier.
        id: String,
    },

    /// Re-queue a failed job.
    Retry {
        /// Job identifier.
        id: String,
    },

    /// Remove a job, stopping its download if one is running.
    Remove {
        /// Job identifier.
        id: String,
    },

    /// Remove completed jobs.
    Clear {
        /// Remove every job instead, cancelling running downloads.
        #[arg(long)]
        all: bool,
    },

    /// Change the concurrency limit of the running scheduler (clamped to 1-10).
    Limit {
        /// Maximum concurrent downloads.
        n: usize,
    },
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        let request = match cli.command {
            CliCommand::Run { until_idle, jobs } => {
                let mgr = open_manager(&cfg)?;
                if let Some(n) = jobs {
                    mgr.set_concurrency_limit(n);
                }
                return run_scheduler(mgr, &cfg, until_idle).await;
            }
            other => other
                .into_request()
                .context("command cannot be sent to the scheduler")?,
        };

        let socket_path = config::default_control_socket_path()?;
        if let Some(lines) = control_socket::send(&socket_path, &request).await? {
            for line in lines {
                println!("{line}");
            }
            return Ok(());
        }

        tracing::debug!("no running scheduler; applying {:?} to the stored queue", request);
        if let Request::Limit(_) = request {
            println!(
                "No scheduler running; set max_concurrent in {} or pass --jobs to `udq run`.",
                config::config_path()?.display()
            );
            return Ok(());
        }
        let mgr = open_manager(&cfg)?;
        for line in execute(&mgr, request) {
            println!("{line}");
        }
        Ok(())
    }

    /// The control request for every command except `run`.
    fn into_request(self) -> Option<Request> {
        let request = match self {
            CliCommand::Add {
                url,
                resolved,
                name,
                size,
                host,
            } => Request::Add {
                filename: name.unwrap_or_else(|| {
                    udq_core::job::filename_from_url(resolved.as_deref().unwrap_or(&url))
                }),
                resolved_url: resolved.unwrap_or_else(|| url.clone()),
                source_url: url,
                total_bytes: size,
                host_label: host,
            },
            CliCommand::Status => Request::Status,
            CliCommand::Stats => Request::Stats,
            CliCommand::Pause { id } => Request::Pause(id.into()),
            CliCommand::Resume { id } => Request::Resume(id.into()),
            CliCommand::Retry { id } => Request::Retry(id.into()),
            CliCommand::Remove { id } => Request::Remove(id.into()),
            CliCommand::Clear { all } => Request::Clear { all },
            CliCommand::Limit { n } => Request::Limit(n),
            CliCommand::Run { .. } => return None,
        };
        Some(request)
    }
}

/// Builds the session's queue manager over the on-disk queue.
fn open_manager(cfg: &UdqConfig) -> Result<QueueManager> {
    let kv = FileKv::open_default()?;
    let executor: Arc<dyn TransferExecutor> = match cfg.backend {
        TransferBackend::Simulated => Arc::new(SimulatedTransfer::from_config(cfg)),
        TransferBackend::Http => Arc::new(HttpTransfer::from_config(cfg)),
    };
    let mut builder = QueueManager::builder(Arc::new(kv))
        .config(cfg)
        .executor(executor);
    if cfg.archive {
        match JsonLinesArchive::open_default() {
            Ok(archive) => builder = builder.archive(Arc::new(archive)),
            Err(e) => tracing::warn!("archive disabled: {:#}", e),
        }
    }
    builder.build()
}

#[cfg(test)]
mod tests;
