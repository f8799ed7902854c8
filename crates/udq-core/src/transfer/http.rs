//! Real transfer: single-stream HTTP GET of the resolved URL via libcurl.
//!
//! Runs curl on a blocking thread, writing `<download_dir>/<filename>.part`
//! and renaming it into place on success. Progress is reported at the
//! sampling cadence from curl's progress callback. Pausing or cancelling
//! aborts the transfer; a paused job then stays suspended until it is
//! re-queued or removed (there is no byte-offset resumption).

use async_trait::async_trait;
use std::cell::Cell;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use super::{Observed, Progress, TransferError, TransferExecutor, TransferHandle, TransferRequest};
use crate::config::UdqConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interrupt {
    Paused,
    Cancelled,
}

enum FetchError {
    Interrupted(Interrupt),
    Failed(TransferError),
}

impl From<curl::Error> for FetchError {
    fn from(e: curl::Error) -> Self {
        FetchError::Failed(TransferError::Curl(e))
    }
}

impl From<std::io::Error> for FetchError {
    fn from(e: std::io::Error) -> Self {
        FetchError::Failed(TransferError::Io(e))
    }
}

#[derive(Debug, Clone)]
pub struct HttpTransfer {
    download_dir: PathBuf,
    sample_interval: Duration,
    connect_timeout: Duration,
}

impl HttpTransfer {
    pub fn new(download_dir: impl Into<PathBuf>, sample_interval: Duration) -> Self {
        Self {
            download_dir: download_dir.into(),
            sample_interval,
            connect_timeout: Duration::from_secs(30),
        }
    }

    /// Uses `download_dir` from config, else the current directory.
    pub fn from_config(cfg: &UdqConfig) -> Self {
        let dir = cfg
            .download_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("."));
        Self::new(dir, cfg.sample_interval())
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Final path for a job's file inside the download dir.
    pub fn destination(&self, filename: &str) -> PathBuf {
        self.download_dir.join(safe_filename(filename))
    }

    async fn wait_while_paused(&self, handle: &TransferHandle) {
        while handle.observe() == Observed::Paused {
            tokio::time::sleep(self.sample_interval).await;
        }
    }
}

/// Keeps only the last path component; falls back to "download.bin".
fn safe_filename(name: &str) -> String {
    let base = name
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or("")
        .trim();
    if base.is_empty() || base == "." || base == ".." {
        "download.bin".to_string()
    } else {
        base.to_string()
    }
}

/// Paces the locked status reads and progress reports inside curl's
/// progress callback, which fires far more often than the sampling cadence.
struct SampleClock {
    interval: Duration,
    last: Instant,
}

impl SampleClock {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Instant::now(),
        }
    }

    /// Time since the previous sample once `interval` has passed, restarting
    /// the clock; None before that.
    fn due(&mut self) -> Option<Duration> {
        let elapsed = self.last.elapsed();
        if elapsed < self.interval {
            return None;
        }
        self.last = Instant::now();
        Some(elapsed)
    }
}

fn part_path(dest: &Path) -> PathBuf {
    let mut s = dest.as_os_str().to_owned();
    s.push(".part");
    PathBuf::from(s)
}

fn fetch(
    request: &TransferRequest,
    part: &Path,
    handle: &TransferHandle,
    sample_interval: Duration,
    connect_timeout: Duration,
) -> Result<(), FetchError> {
    let mut file = File::create(part)?;
    let interrupt: Cell<Option<Interrupt>> = Cell::new(None);
    let write_error: Cell<Option<std::io::Error>> = Cell::new(None);
    let mut clock = SampleClock::new(sample_interval);
    let mut last_bytes = 0.0_f64;

    let mut easy = curl::easy::Easy::new();
    easy.url(&request.resolved_url)?;
    easy.follow_location(true)?;
    easy.max_redirections(10)?;
    easy.connect_timeout(connect_timeout)?;
    easy.low_speed_limit(1024)?;
    easy.low_speed_time(Duration::from_secs(60))?;
    easy.progress(true)?;

    let performed = {
        let mut transfer = easy.transfer();
        transfer.write_function(|data| match file.write_all(data) {
            Ok(()) => Ok(data.len()),
            Err(e) => {
                write_error.set(Some(e));
                Ok(0) // abort transfer
            }
        })?;
        transfer.progress_function(|dltotal, dlnow, _, _| {
            if handle.is_aborted() {
                interrupt.set(Some(Interrupt::Cancelled));
                return false;
            }
            let Some(elapsed) = clock.due() else {
                return true;
            };
            match handle.observe() {
                Observed::Active => {}
                Observed::Paused => {
                    interrupt.set(Some(Interrupt::Paused));
                    return false;
                }
                Observed::Cancelled => {
                    interrupt.set(Some(Interrupt::Cancelled));
                    return false;
                }
            }
            let total = if request.total_bytes > 0 {
                request.total_bytes as f64
            } else {
                dltotal
            };
            if total > 0.0 {
                let speed_bps = (dlnow - last_bytes).max(0.0) / elapsed.as_secs_f64();
                handle.record_progress(Progress {
                    percent: dlnow / total * 100.0,
                    speed_bps,
                });
            }
            last_bytes = dlnow;
            true
        })?;
        transfer.perform()
    };

    if let Some(reason) = interrupt.get() {
        return Err(FetchError::Interrupted(reason));
    }
    if let Some(e) = write_error.take() {
        return Err(FetchError::Failed(TransferError::Io(e)));
    }
    performed?;

    let code = easy.response_code()?;
    if code != 0 && !(200..300).contains(&code) {
        return Err(FetchError::Failed(TransferError::Http(code)));
    }
    file.flush()?;
    Ok(())
}

#[async_trait]
impl TransferExecutor for HttpTransfer {
    async fn transfer(
        &self,
        request: TransferRequest,
        handle: TransferHandle,
    ) -> Result<(), TransferError> {
        tokio::fs::create_dir_all(&self.download_dir).await?;
        let dest = self.destination(&request.filename);
        let part = part_path(&dest);

        let outcome = {
            let request = request.clone();
            let handle = handle.clone();
            let part = part.clone();
            let sample_interval = self.sample_interval;
            let connect_timeout = self.connect_timeout;
            tokio::task::spawn_blocking(move || {
                fetch(&request, &part, &handle, sample_interval, connect_timeout)
            })
            .await
            .map_err(|e| TransferError::Fault(format!("transfer thread failed: {e}")))?
        };

        match outcome {
            Ok(()) => {
                tokio::fs::rename(&part, &dest).await?;
                tracing::info!(job_id = %request.job_id, path = %dest.display(), "transfer finished");
                Ok(())
            }
            Err(FetchError::Interrupted(Interrupt::Paused)) => {
                tracing::debug!(job_id = %request.job_id, "transfer suspended by pause");
                self.wait_while_paused(&handle).await;
                let _ = tokio::fs::remove_file(&part).await;
                Err(TransferError::Cancelled)
            }
            Err(FetchError::Interrupted(Interrupt::Cancelled)) => {
                let _ = tokio::fs::remove_file(&part).await;
                Err(TransferError::Cancelled)
            }
            Err(FetchError::Failed(e)) => {
                let _ = tokio::fs::remove_file(&part).await;
                tracing::warn!(job_id = %request.job_id, url = %request.resolved_url, "transfer failed: {}", e);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_filename_strips_directories() {
        assert_eq!(safe_filename("../../etc/passwd"), "passwd");
        assert_eq!(safe_filename("dir\\movie.mkv"), "movie.mkv");
        assert_eq!(safe_filename(""), "download.bin");
        assert_eq!(safe_filename(".."), "download.bin");
    }

    #[test]
    fn part_path_appends_suffix() {
        let t = HttpTransfer::new("/tmp/dl", Duration::from_millis(500));
        let dest = t.destination("a.iso");
        assert_eq!(dest, PathBuf::from("/tmp/dl/a.iso"));
        assert_eq!(part_path(&dest), PathBuf::from("/tmp/dl/a.iso.part"));
    }

    #[test]
    fn sample_clock_fires_once_per_interval() {
        let mut clock = SampleClock::new(Duration::from_millis(40));
        assert!(clock.due().is_none());
        assert!(clock.due().is_none());
        std::thread::sleep(Duration::from_millis(50));
        let elapsed = clock.due().unwrap();
        assert!(elapsed >= Duration::from_millis(40));
        assert!(clock.due().is_none());
    }
}
