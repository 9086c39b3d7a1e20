//! Message channels between client and server.
//!
//! [`LineTransport`] frames messages over any async reader/writer pair.
//! [`ProcessTransport`] launches the server as a child process and wraps its
//! stdout/stdin in a `LineTransport`; stderr is drained into the log.
//!
//! Any I/O failure on the channel is reported as `TransportClosed`: on a pipe
//! there is no way to tell a broken write from a dead peer.

use crate::config::{ClientConfig, ProtocolConfig};
use crate::protocol;
use crate::{BookshelfError, Result};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// A bidirectional, newline-framed message channel.
#[async_trait]
pub trait Transport: Send {
    /// Write one frame and flush.
    async fn write_line(&mut self, payload: &[u8]) -> Result<()>;

    /// Block until one complete frame is available.
    async fn read_line(&mut self) -> Result<Vec<u8>>;

    /// Close the channel. Safe to call more than once.
    async fn stop(&mut self) -> Result<()>;
}

/// Framing over an arbitrary reader/writer pair.
pub struct LineTransport<R, W> {
    reader: BufReader<R>,
    writer: W,
    closed: bool,
}

impl<R, W> LineTransport<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer,
            closed: false,
        }
    }
}

#[async_trait]
impl<R, W> Transport for LineTransport<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn write_line(&mut self, payload: &[u8]) -> Result<()> {
        if self.closed {
            return Err(BookshelfError::transport_closed("transport stopped"));
        }
        protocol::write_line(&mut self.writer, payload)
            .await
            .map_err(|e| match e {
                BookshelfError::Io { message, .. } => {
                    BookshelfError::transport_closed(format!("write failed: {}", message))
                }
                other => other,
            })
    }

    async fn read_line(&mut self) -> Result<Vec<u8>> {
        if self.closed {
            return Err(BookshelfError::transport_closed("transport stopped"));
        }
        match protocol::read_line(&mut self.reader).await {
            Ok(Some(line)) => Ok(line),
            Ok(None) => Err(BookshelfError::transport_closed(
                "peer closed its output before a complete message",
            )),
            Err(BookshelfError::Io { message, .. }) => Err(BookshelfError::transport_closed(
                format!("read failed: {}", message),
            )),
            Err(BookshelfError::Validation { message, .. }) => {
                Err(BookshelfError::protocol_violation(message))
            }
            Err(other) => Err(other),
        }
    }

    async fn stop(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            if let Err(e) = self.writer.shutdown().await {
                debug!("Ignoring error while closing writer: {}", e);
            }
        }
        Ok(())
    }
}

/// A server running as a child process, spoken to over its stdin/stdout.
pub struct ProcessTransport {
    command: String,
    child: Option<Child>,
    lines: Option<LineTransport<ChildStdout, ChildStdin>>,
    stderr_drain: Option<JoinHandle<()>>,
    stop_timeout: Duration,
}

impl ProcessTransport {
    /// Spawn the configured executable with all three standard streams piped.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(config: &ClientConfig) -> Result<Self> {
        let command = config.display_command();
        let spawn_error = |message: String, source: Option<std::io::Error>| {
            BookshelfError::ProcessSpawn {
                command: command.clone(),
                message,
                source,
            }
        };

        let mut child = Command::new(&config.command)
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| spawn_error(e.to_string(), Some(e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| spawn_error("failed to capture stdin".to_string(), None))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| spawn_error("failed to capture stdout".to_string(), None))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| spawn_error("failed to capture stderr".to_string(), None))?;

        let pid = child.id().unwrap_or_default();
        info!("Started server process {} (PID {})", command, pid);

        Ok(Self {
            command,
            child: Some(child),
            lines: Some(LineTransport::new(stdout, stdin)),
            stderr_drain: Some(tokio::spawn(drain_stderr(stderr, pid))),
            stop_timeout: config.stop_timeout,
        })
    }

    /// OS process id, while the child is running.
    pub fn id(&self) -> Option<u32> {
        self.child.as_ref().and_then(|c| c.id())
    }

    fn lines(&mut self) -> Result<&mut LineTransport<ChildStdout, ChildStdin>> {
        self.lines
            .as_mut()
            .ok_or_else(|| BookshelfError::transport_closed("server process stopped"))
    }
}

#[async_trait]
impl Transport for ProcessTransport {
    async fn write_line(&mut self, payload: &[u8]) -> Result<()> {
        self.lines()?.write_line(payload).await
    }

    async fn read_line(&mut self) -> Result<Vec<u8>> {
        self.lines()?.read_line().await
    }

    /// Close stdin, send SIGTERM, and wait; force-kill after `stop_timeout`.
    async fn stop(&mut self) -> Result<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        if let Some(mut lines) = self.lines.take() {
            lines.stop().await?;
        }
        send_terminate(&mut child);

        let status = match tokio::time::timeout(self.stop_timeout, child.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                warn!(
                    "Server {} did not exit within {:?}, killing",
                    self.command, self.stop_timeout
                );
                child.kill().await?;
                tokio::time::timeout(ProtocolConfig::KILL_TIMEOUT, child.wait())
                    .await
                    .map_err(|_| BookshelfError::Timeout(ProtocolConfig::KILL_TIMEOUT))??
            }
        };

        if let Some(drain) = self.stderr_drain.take() {
            drain.abort();
        }

        info!("Server process {} exited with {}", self.command, status);
        Ok(())
    }
}

impl Drop for ProcessTransport {
    fn drop(&mut self) {
        if let Some(drain) = self.stderr_drain.take() {
            drain.abort();
        }
    }
}

/// Forward the server's diagnostics into our log.
///
/// Lines that are not valid UTF-8 are logged lossily; the pipe is read until
/// the child closes it so the server never blocks on a full stderr.
async fn drain_stderr<R: AsyncRead + Unpin>(stderr: R, pid: u32) {
    let mut reader = BufReader::new(stderr);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                debug!("[server {}] {}", pid, line.trim_end_matches(|c| c == '\n' || c == '\r'));
            }
            Err(e) => {
                warn!("Failed to read stderr of server {}: {}", pid, e);
                break;
            }
        }
    }
}

#[cfg(unix)]
fn send_terminate(child: &mut Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        return;
    };
    debug!("Sending SIGTERM to process {}", pid);
    if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        if e != nix::errno::Errno::ESRCH {
            warn!("Failed to send SIGTERM to {}: {}", pid, e);
        }
    }
}

#[cfg(not(unix))]
fn send_terminate(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        warn!("Failed to terminate server process: {}", e);
    }
}
