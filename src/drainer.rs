//! [`OutputDrainer`]: perpetually pumps a child's OS output stream into a
//! [`Pipe`] so the OS pipe buffer can never fill and deadlock the child.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::pipe::Pipe;

/// Chunk size used for each read from the OS stream.
const DRAIN_CHUNK: usize = 4096;

/// Background task draining one child OS stream into a [`Pipe`], plus a
/// text-reader facade and discard/stop-buffering controls.
pub struct OutputDrainer {
    pipe: Arc<Pipe>,
    discard: Arc<AtomicBool>,
    discard_notify: Arc<Notify>,
    task: JoinHandle<()>,
}

impl OutputDrainer {
    /// Spawn the drain loop over `source`. The loop exits when the OS stream
    /// is exhausted, `discard()` is called, or the pipe's write side is
    /// closed by a downstream `stop_buffering` filling up and never being
    /// drained in turn.
    pub fn spawn<R>(mut source: R, label: &'static str) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let pipe = Arc::new(Pipe::new());
        let discard = Arc::new(AtomicBool::new(false));
        let discard_notify = Arc::new(Notify::new());

        let loop_pipe = pipe.clone();
        let loop_discard = discard.clone();
        let loop_discard_notify = discard_notify.clone();
        let task = tokio::spawn(async move {
            let mut buf = [0u8; DRAIN_CHUNK];
            loop {
                if loop_discard.load(Ordering::Acquire) {
                    debug!(stream = label, "drainer discarding, stopping drain loop");
                    break;
                }
                if loop_pipe.is_writer_closed() {
                    break;
                }
                // Race the blocking OS read against the discard signal: a
                // quiet child whose stdout never produces another byte must
                // not keep this loop (and therefore `ProcessCommand::wait`,
                // which joins it) blocked past the caller's own `discard()`.
                let n = tokio::select! {
                    result = source.read(&mut buf) => match result {
                        Ok(0) => {
                            trace!(stream = label, "drainer observed EOF");
                            break;
                        }
                        Ok(n) => n,
                        Err(e) => {
                            debug!(stream = label, error = %e, "drainer read error, stopping");
                            break;
                        }
                    },
                    () = loop_discard_notify.notified() => {
                        debug!(stream = label, "drainer discarding, stopping drain loop");
                        break;
                    }
                };
                if loop_discard.load(Ordering::Acquire) {
                    break;
                }
                let cancel = tokio_util::sync::CancellationToken::new();
                if loop_pipe.write(&buf[..n], None, &cancel).await.is_err() {
                    break;
                }
            }
            loop_pipe.close_write();
            // Drop the OS stream handle here, the moment the loop actually
            // stops, rather than leaving it to run() or wait()'s caller.
            drop(source);
        });

        OutputDrainer {
            pipe,
            discard,
            discard_notify,
            task,
        }
    }

    /// The pipe this drainer writes into; read from this to consume output.
    pub fn pipe(&self) -> &Arc<Pipe> {
        &self.pipe
    }

    /// Discard any buffered content and all future bytes: the OS stream is
    /// closed from the drain loop's perspective and the pipe is closed on
    /// both sides. Any outstanding reads on a text layer built over this
    /// pipe observe "stream closed" — this is deliberate, not a bug.
    pub fn discard(&self) {
        self.discard.store(true, Ordering::Release);
        self.discard_notify.notify_one();
        self.pipe.close_read();
        self.pipe.close_write();
    }

    /// Switch the underlying pipe to fixed-length (backpressured) mode. The
    /// downstream reader must keep up from this point on or the child will
    /// block writing to its OS pipe. Per the documented open question, this
    /// does not shrink any buffer the pipe has already grown to.
    pub fn stop_buffering(&self) {
        self.pipe.set_fixed_length();
    }

    /// Wait for the drain loop to finish. Part of a Command's aggregate task.
    pub async fn join(self) {
        let _ = self.task.await;
    }

    /// A text-line reader over this drainer's pipe, for line-oriented
    /// consumption (used by [`crate::merged_lines::MergedLineStream`] and by
    /// redirect-to-line-collection sinks).
    pub fn lines(&self) -> PipeLineReader {
        PipeLineReader::new(self.pipe.clone())
    }
}

/// A hand-rolled line reader directly over a [`Pipe`]'s read side.
///
/// We deliberately don't implement [`tokio::io::AsyncRead`] for this and
/// layer `tokio::io::BufReader`/`AsyncBufReadExt::lines` on top: bridging
/// `Pipe::read`'s async, cancel-aware API into a synchronous `poll_read`
/// would mean re-creating a fresh read future on every poll, silently
/// abandoning any in-flight wait and leaking the pipe's "one read pending"
/// invariant. A small dedicated reader with its own byte accumulator avoids
/// that hazard entirely.
pub struct PipeLineReader {
    pipe: Arc<Pipe>,
    carry: Vec<u8>,
    eof: bool,
}

impl PipeLineReader {
    pub fn new(pipe: Arc<Pipe>) -> Self {
        PipeLineReader {
            pipe,
            carry: Vec::new(),
            eof: false,
        }
    }

    /// Read the next line (trailing `\n`/`\r\n` stripped). `Ok(None)` at EOF.
    pub async fn read_line(&mut self) -> std::io::Result<Option<String>> {
        loop {
            if let Some(pos) = self.carry.iter().position(|&b| b == b'\n') {
                let mut line: Vec<u8> = self.carry.drain(..=pos).collect();
                line.pop(); // '\n'
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                return Ok(Some(String::from_utf8_lossy(&line).into_owned()));
            }
            if self.eof {
                if self.carry.is_empty() {
                    return Ok(None);
                }
                let rest = std::mem::take(&mut self.carry);
                return Ok(Some(String::from_utf8_lossy(&rest).into_owned()));
            }
            let mut buf = [0u8; 4096];
            let cancel = tokio_util::sync::CancellationToken::new();
            let n = self
                .pipe
                .read(&mut buf, None, &cancel)
                .await
                .map_err(|e| std::io::Error::other(e.to_string()))?;
            if n == 0 {
                self.eof = true;
            } else {
                self.carry.extend_from_slice(&buf[..n]);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn discard_unblocks_a_drain_loop_stuck_on_a_quiet_stream() {
        // `sleep` never writes to stdout, so the drain loop's read would
        // otherwise stay blocked until the child exits 30s from now; discard
        // must race that read and return promptly instead.
        let mut child = tokio::process::Command::new("sleep")
            .arg("30")
            .stdout(std::process::Stdio::piped())
            .spawn()
            .expect("spawn sleep");
        let stdout = child.stdout.take().expect("piped stdout");
        let drainer = OutputDrainer::spawn(stdout, "stdout");

        drainer.discard();
        tokio::time::timeout(Duration::from_secs(2), drainer.join())
            .await
            .expect("discard unblocks the drain loop promptly");

        let _ = child.kill().await;
    }
}
