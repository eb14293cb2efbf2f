//! [`AttachedCommand`]: a `Command` bound to a pid this library did not
//! spawn and does not own any stdio for.
//!
//! Unlike a real child there is no OS `wait()` primitive for an arbitrary
//! pid — `wait` here polls liveness via [`Signaler::process_exists`]
//! instead. This is an explicit Open Question decision: see `DESIGN.md`.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::compat_stream::CompatStdin;
use crate::error::CommandError;
use crate::pipe::Pipe;
use crate::signaler::Signaler;

use super::result::{CommandResult, ExitStatus};
use super::Command;

/// How often [`AttachedCommand::wait`] polls for the target pid's exit.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Sentinel meaning "this handle never delivered a signal".
const NO_SIGNAL_SENT: i32 = 0;

/// A command representing a process this library did not spawn.
pub struct AttachedCommand {
    pid: u32,
    // The most recent signal *this handle* delivered, if any. We have no
    // portable way to learn a non-child pid's real exit status, but if this
    // handle is what killed it, we at least know which signal was sent.
    last_signal_sent: AtomicI32,
}

impl AttachedCommand {
    pub fn attach(pid: u32) -> Self {
        AttachedCommand {
            pid,
            last_signal_sent: AtomicI32::new(NO_SIGNAL_SENT),
        }
    }
}

impl Command for AttachedCommand {
    fn pid(&self) -> Option<u32> {
        Some(self.pid)
    }

    fn take_stdout(&mut self) -> Option<Arc<Pipe>> {
        None
    }

    fn take_stderr(&mut self) -> Option<Arc<Pipe>> {
        None
    }

    fn take_stdin(&mut self) -> Option<CompatStdin> {
        None
    }

    fn try_signal(&self, signal_code: i32) -> bool {
        let delivered = Signaler::try_signal(self.pid, signal_code);
        if delivered {
            self.last_signal_sent.store(signal_code, Ordering::Relaxed);
        }
        delivered
    }

    fn kill(&self) {
        if Signaler::try_signal(self.pid, crate::signaler::SIGKILL) {
            self.last_signal_sent
                .store(crate::signaler::SIGKILL, Ordering::Relaxed);
        }
    }

    async fn wait(self) -> Result<CommandResult, CommandError> {
        while Signaler::process_exists(self.pid) {
            tokio::time::sleep(POLL_INTERVAL).await;
        }
        // We have no portable way to learn the attached process's real exit
        // status. Best effort: if this handle is the one that signaled it,
        // report the POSIX shell convention for signal-terminated processes
        // (128 + signal number). Otherwise all we know is that it's gone —
        // see the Open Question in DESIGN.md for the full tradeoff.
        let signal = self.last_signal_sent.load(Ordering::Relaxed);
        let raw = if signal == NO_SIGNAL_SENT { 0 } else { 128 + signal };
        Ok(CommandResult::from_exit_status(ExitStatus::from_raw(raw)))
    }
}
