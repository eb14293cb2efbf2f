//! Compatibility wrapper normalizing post-exit stdin write behavior.
//!
//! On some platforms, writing to a child's stdin after the child has already
//! exited surfaces as an I/O error (broken pipe) rather than being silently
//! swallowed. [`CompatStdin`] catches exactly that condition at `write`/
//! `flush` and turns it into a successful no-op, Any other I/O
//! error still propagates.

use std::io;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::process::ChildStdin;
use tracing::debug;

/// Wraps a child's stdin handle, suppressing broken-pipe errors from writes
/// and flushes that happen after the child has already exited.
pub struct CompatStdin {
    inner: ChildStdin,
}

impl CompatStdin {
    pub fn new(inner: ChildStdin) -> Self {
        CompatStdin { inner }
    }

    /// Write `data`, suppressing a broken-pipe error (the child exited and
    /// will never read it) but propagating any other I/O error.
    pub async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        match self.inner.write_all(data).await {
            Ok(()) => Ok(()),
            Err(e) if is_broken_pipe(&e) => {
                debug!("stdin write after child exit, suppressing broken pipe");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Flush, suppressing a broken-pipe error the same way as `write_all`.
    pub async fn flush(&mut self) -> io::Result<()> {
        match self.inner.flush().await {
            Ok(()) => Ok(()),
            Err(e) if is_broken_pipe(&e) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Drop the underlying handle, closing the child's stdin (EOF).
    pub async fn shutdown(&mut self) -> io::Result<()> {
        match AsyncWriteExt::shutdown(&mut self.inner).await {
            Ok(()) => Ok(()),
            Err(e) if is_broken_pipe(&e) => Ok(()),
            Err(e) => Err(e),
        }
    }

    pub fn into_inner(self) -> ChildStdin {
        self.inner
    }
}

fn is_broken_pipe(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::BrokenPipe) || e.raw_os_error() == Some(libc::EPIPE)
}

impl AsyncWrite for CompatStdin {
    fn poll_write(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &[u8],
    ) -> std::task::Poll<io::Result<usize>> {
        match std::pin::Pin::new(&mut self.inner).poll_write(cx, buf) {
            std::task::Poll::Ready(Err(e)) if is_broken_pipe(&e) => {
                std::task::Poll::Ready(Ok(buf.len()))
            }
            other => other,
        }
    }

    fn poll_flush(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<io::Result<()>> {
        match std::pin::Pin::new(&mut self.inner).poll_flush(cx) {
            std::task::Poll::Ready(Err(e)) if is_broken_pipe(&e) => std::task::Poll::Ready(Ok(())),
            other => other,
        }
    }

    fn poll_shutdown(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<io::Result<()>> {
        match std::pin::Pin::new(&mut self.inner).poll_shutdown(cx) {
            std::task::Poll::Ready(Err(e)) if is_broken_pipe(&e) => std::task::Poll::Ready(Ok(())),
            other => other,
        }
    }
}
