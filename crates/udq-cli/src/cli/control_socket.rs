//! Control socket: server (during `udq run`) and client (every other command).
//!
//! Protocol: the client sends one request as a single JSON line and closes its
//! write half; the server answers with zero or more text lines and closes the
//! connection. A request is `{"cmd": "<name>", "arg": <value>}`, e.g.
//! `{"cmd":"pause","arg":"<id>"}`, `{"cmd":"clear","arg":{"all":true}}` or
//! `{"cmd":"status"}`.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use udq_core::{JobId, QueueManager};

use super::commands::execute;

/// A control command, as sent over the socket or applied offline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", content = "arg", rename_all = "kebab-case")]
pub enum Request {
    Add {
        filename: String,
        source_url: String,
        resolved_url: String,
        total_bytes: u64,
        host_label: Option<String>,
    },
    Pause(JobId),
    Resume(JobId),
    Retry(JobId),
    Remove(JobId),
    Clear { all: bool },
    Limit(usize),
    Status,
    Stats,
}

impl Request {
    /// One line of JSON; string fields are escaped, so the line never
    /// contains a raw newline.
    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Parses one request line. Returns None for malformed lines.
    pub fn decode(line: &str) -> Option<Self> {
        serde_json::from_str(line.trim()).ok()
    }
}

/// Spawns a task that listens on `path` and applies each request to `mgr`,
/// writing the command's output back to the client.
pub fn spawn_control_listener(
    mgr: QueueManager,
    path: impl AsRef<Path>,
) -> Result<tokio::task::JoinHandle<()>> {
    let path = path.as_ref().to_path_buf();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let _ = std::fs::remove_file(&path);
    let listener = UnixListener::bind(&path)?;
    let handle = tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let mgr = mgr.clone();
                    tokio::spawn(async move {
                        if let Err(e) = serve(stream, &mgr).await {
                            tracing::debug!("control connection: {}", e);
                        }
                    });
                }
                Err(e) => tracing::debug!("control socket accept: {}", e),
            }
        }
    });
    Ok(handle)
}

async fn serve(stream: UnixStream, mgr: &QueueManager) -> std::io::Result<()> {
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();
    while let Some(line) = lines.next_line().await? {
        let output = match Request::decode(&line) {
            Some(request) => {
                tracing::debug!(?request, "control request");
                execute(mgr, request)
            }
            None => vec![format!("unrecognised command: {}", line.trim())],
        };
        for out in output {
            write.write_all(out.as_bytes()).await?;
            write.write_all(b"\n").await?;
        }
    }
    write.shutdown().await
}

/// Sends `request` to a running scheduler and returns its output lines.
/// Returns `None` if no scheduler is listening (missing or stale socket).
pub async fn send(socket_path: &Path, request: &Request) -> Result<Option<Vec<String>>> {
    if !socket_path.exists() {
        return Ok(None);
    }
    let mut stream = match UnixStream::connect(socket_path).await {
        Ok(s) => s,
        Err(e) if matches!(e.kind(), ErrorKind::ConnectionRefused | ErrorKind::NotFound) => {
            tracing::debug!(path = %socket_path.display(), "stale control socket");
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    };
    let msg = format!("{}\n", request.encode()?);
    stream.write_all(msg.as_bytes()).await?;
    stream.shutdown().await?;

    let mut reply = Vec::new();
    let mut lines = BufReader::new(stream).lines();
    while let Some(line) = lines.next_line().await? {
        reply.push(line);
    }
    Ok(Some(reply))
}
