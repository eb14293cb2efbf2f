//! Crate-wide error types.
//!
//! Hand-rolled error enums (manual `Display`,
//! `std::error::Error`) rather than pulling in an error-derive crate: every
//! error kind here names a state the aggregate task can actually land in, so
//! a match on the enum is a complete decision table for callers.

use std::fmt;

/// Everything that can go wrong on a single [`crate::pipe::Pipe`] operation.
#[derive(Debug)]
pub enum PipeError {
    /// The operation's deadline elapsed before it could complete.
    Timeout,
    /// The operation's cancellation token fired before it could complete.
    Cancelled,
    /// A second read (or write) was attempted while one was already pending
    /// on the same side.
    ConcurrentAccess,
}

impl fmt::Display for PipeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipeError::Timeout => write!(f, "pipe operation timed out"),
            PipeError::Cancelled => write!(f, "pipe operation was cancelled"),
            PipeError::ConcurrentAccess => {
                write!(f, "a read or write is already pending on this side of the pipe")
            }
        }
    }
}

impl std::error::Error for PipeError {}

/// Failure modes of a composed [`crate::command::Command`].
#[derive(Debug)]
pub enum CommandError {
    /// `throw_on_error` was set and the process exited with a nonzero code.
    ErrorExitCode {
        exit_code: i32,
        argv: Vec<String>,
        pid: Option<u32>,
    },
    /// The configured timeout elapsed; the process was killed.
    Timeout,
    /// The caller's cancellation token fired; the process was killed.
    Cancelled,
    /// The OS process handle was accessed after `dispose_on_exit` released it.
    Disposed,
    /// A stream accessor was used after its stream had already been redirected
    /// elsewhere (e.g. reading stdout after `redirect_to` claimed it).
    StreamRedirected(&'static str),
    /// The process could not be spawned.
    Spawn(std::io::Error),
    /// An I/O error occurred in a redirect or copy task that was not a
    /// recoverable broken-pipe condition.
    Io(std::io::Error),
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::ErrorExitCode {
                exit_code, argv, pid,
            } => write!(
                f,
                "command {argv:?} (pid {pid:?}) exited with code {exit_code}"
            ),
            CommandError::Timeout => write!(f, "command timed out and was killed"),
            CommandError::Cancelled => write!(f, "command was cancelled and killed"),
            CommandError::Disposed => {
                write!(f, "process handle was already disposed after exit")
            }
            CommandError::StreamRedirected(which) => {
                write!(f, "{which} has already been redirected elsewhere")
            }
            CommandError::Spawn(e) => write!(f, "failed to spawn process: {e}"),
            CommandError::Io(e) => write!(f, "process I/O error: {e}"),
        }
    }
}

impl std::error::Error for CommandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CommandError::Spawn(e) | CommandError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CommandError {
    fn from(e: std::io::Error) -> Self {
        CommandError::Io(e)
    }
}

/// Result of a copy loop that feeds a downstream consumer.
///
/// A downstream reader
/// closing early while we're still copying into it is *not* an error, it's
/// an outcome. Modeling it as a value instead of an error-matched exception
/// keeps the aggregate task's error path reserved for genuine failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyOutcome {
    /// The source was exhausted and all bytes were delivered.
    Completed,
    /// The destination closed early; copying stopped but this is expected.
    DownstreamClosed,
}
