//! Composable commands: the `Command` abstraction and its four variants.
//!
//! A `Command` is anything that can report a pid, expose its
//! stdout/stderr as pipes, accept stdin, be signaled/killed, and be awaited
//! for a [`CommandResult`]. [`ProcessCommand`] wraps a freshly spawned OS
//! process; [`AttachedCommand`] wraps an externally-owned pid; [`IoCommand`]
//! layers a redirect onto any inner `Command`; [`PipedCommand`] composes two
//! `Command`s into a shell-style pipeline.
//!
//! These are generic over the inner `Command` type rather than trait
//! objects: `wait` returns `impl Future + Send` (RPITIT), which is not
//! dyn-compatible. Generics keep the whole tree usable without reaching for
//! `async-trait`.

mod aggregate;
mod attached;
mod io_command;
mod piped;
mod process;
mod result;

pub use aggregate::KillReason;
pub use attached::AttachedCommand;
pub use io_command::IoCommand;
pub use piped::PipedCommand;
pub use process::ProcessCommand;
pub use result::{CommandResult, ExitStatus};

use std::future::Future;
use std::sync::Arc;

use crate::compat_stream::CompatStdin;
use crate::error::CommandError;
use crate::pipe::Pipe;

/// A running or composed command.
pub trait Command: Send + Sized {
    /// The OS pid backing this command, if one is currently owned and not
    /// yet disposed.
    fn pid(&self) -> Option<u32>;

    /// Every OS pid this command is (possibly transitively) backed by, in
    /// left-to-right order. A [`PipedCommand`] returns both sides' pids.
    fn pids(&self) -> Vec<u32> {
        self.pid().into_iter().collect()
    }

    /// Take ownership of the stdout pipe, if it hasn't already been claimed
    /// by a redirect or a previous call.
    fn take_stdout(&mut self) -> Option<Arc<Pipe>>;

    /// Take ownership of the stderr pipe, if it hasn't already been claimed.
    fn take_stderr(&mut self) -> Option<Arc<Pipe>>;

    /// Take ownership of stdin, if it hasn't already been claimed by a
    /// redirect, a piped composition, or a previous call. Ownership (rather
    /// than a borrow) is what lets a redirect/piped aux task own the write
    /// side independently of whatever else is driving `wait`.
    fn take_stdin(&mut self) -> Option<CompatStdin>;

    /// Best-effort signal delivery; `false` if there's no live pid or the
    /// platform/OS rejected it.
    fn try_signal(&self, signal_code: i32) -> bool;

    /// Forcibly terminate every process this command owns. Idempotent.
    fn kill(&self);

    /// Wait for the command to finish, consuming it. Honors the configured
    /// timeout/cancellation token and `throw_on_error`.
    fn wait(self) -> impl Future<Output = Result<CommandResult, CommandError>> + Send;
}
