//! [`ProcessCommand`]: a freshly spawned OS process.

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::compat_stream::CompatStdin;
use crate::drainer::OutputDrainer;
use crate::error::CommandError;
use crate::options::CommandOptions;
use crate::pipe::Pipe;
use crate::signaler::{Signaler, SIGKILL, SIGTERM};

use super::aggregate::{race_kill_trigger, KillReason};
use super::result::{CommandResult, ExitStatus};
use super::Command;

/// A command backed by a process this library spawned and owns.
pub struct ProcessCommand {
    argv: Vec<String>,
    pid: Option<u32>,
    child: tokio::process::Child,
    stdin: Option<CompatStdin>,
    stdout: Option<OutputDrainer>,
    stderr: Option<OutputDrainer>,
    stdout_taken: Arc<AtomicBool>,
    stderr_taken: Arc<AtomicBool>,
    options: CommandOptions,
    // `kill()` needs to work from a `&self` (e.g. called from another task
    // racing the wait future), so the kill signal is a token we can fire
    // independent of consuming `self` in `wait`. This token is privately
    // owned by this struct alone — never a clone of a caller-supplied
    // `CommandOptions::cancellation_token` — so `kill()` can never reach out
    // and cancel a token the caller shares across other commands. The
    // caller's own token (if any) is raced alongside this one inside `wait`,
    // but this struct never calls `.cancel()` on it.
    kill_requested: CancellationToken,
    disposed: Arc<Mutex<bool>>,
}

impl ProcessCommand {
    /// Spawn `argv[0]` with `argv[1..]` as arguments, piping stdin/stdout/
    /// stderr and starting output drainers before returning, following a
    /// race-free construction sequence: the child's OS pipes must never sit
    /// undrained between spawn and the caller attaching its own consumer, or
    /// a chatty child can deadlock filling the OS pipe buffer before anyone
    /// is listening.
    pub fn spawn(argv: Vec<String>, options: CommandOptions) -> Result<Self, CommandError> {
        let Some(program) = argv.first() else {
            return Err(CommandError::Spawn(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "empty argv",
            )));
        };
        let mut cmd = tokio::process::Command::new(program);
        cmd.args(&argv[1..]);
        if let Some(dir) = &options.working_directory {
            cmd.current_dir(dir);
        }
        for (k, v) in &options.environment_variables {
            cmd.env(k, v);
        }
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(CommandError::Spawn)?;
        let pid = child.id();
        debug!(pid, argv = ?argv, "spawned process");

        // Grab every stdio handle and start draining stdout/stderr
        // immediately, before returning control to the caller.
        let stdin = child.stdin.take().map(CompatStdin::new);
        let stdout = child
            .stdout
            .take()
            .map(|s| OutputDrainer::spawn(s, "stdout"));
        let stderr = child
            .stderr
            .take()
            .map(|s| OutputDrainer::spawn(s, "stderr"));

        Ok(ProcessCommand {
            argv,
            pid,
            child,
            stdin,
            stdout,
            stderr,
            stdout_taken: Arc::new(AtomicBool::new(false)),
            stderr_taken: Arc::new(AtomicBool::new(false)),
            options,
            kill_requested: CancellationToken::new(),
            disposed: Arc::new(Mutex::new(false)),
        })
    }

    fn kill_hard(&self) {
        if let Some(pid) = self.pid {
            if !Signaler::try_signal(pid, SIGTERM) {
                return;
            }
            Signaler::try_signal(pid, SIGKILL);
        }
    }
}

impl Command for ProcessCommand {
    fn pid(&self) -> Option<u32> {
        if *self.disposed.lock().unwrap() {
            None
        } else {
            self.pid
        }
    }

    fn take_stdout(&mut self) -> Option<Arc<Pipe>> {
        if self.stdout_taken.swap(true, Ordering::AcqRel) {
            return None;
        }
        self.stdout.as_ref().map(|d| d.pipe().clone())
    }

    fn take_stderr(&mut self) -> Option<Arc<Pipe>> {
        if self.stderr_taken.swap(true, Ordering::AcqRel) {
            return None;
        }
        self.stderr.as_ref().map(|d| d.pipe().clone())
    }

    fn take_stdin(&mut self) -> Option<CompatStdin> {
        self.stdin.take()
    }

    fn try_signal(&self, signal_code: i32) -> bool {
        match self.pid() {
            Some(pid) => Signaler::try_signal(pid, signal_code),
            None => false,
        }
    }

    fn kill(&self) {
        self.kill_requested.cancel();
    }

    async fn wait(mut self) -> Result<CommandResult, CommandError> {
        let timeout = self.options.timeout;
        let kill_requested = self.kill_requested.clone();
        let external_cancel = self.options.cancellation_token.clone();

        let exit_status = tokio::select! {
            status = self.child.wait() => status.map_err(CommandError::Io)?,
            reason = race_kill_trigger(timeout, kill_requested, external_cancel) => {
                warn!(pid = self.pid, ?reason, "killing process");
                self.kill_hard();
                let _ = self.child.wait().await.map_err(CommandError::Io)?;
                if let Some(stdout) = self.stdout.take() {
                    stdout.join().await;
                }
                if let Some(stderr) = self.stderr.take() {
                    stderr.join().await;
                }
                *self.disposed.lock().unwrap() = true;
                return Err(match reason {
                    KillReason::Cancelled => CommandError::Cancelled,
                    KillReason::TimedOut => CommandError::Timeout,
                });
            }
        };

        if let Some(stdout) = self.stdout.take() {
            stdout.join().await;
        }
        if let Some(stderr) = self.stderr.take() {
            stderr.join().await;
        }

        // `code()` is `None` when the process was killed by a signal (unix)
        // or otherwise terminated abnormally; -1 signals "unavailable" per
        // the documented Open Question decision in `ExitStatus`.
        let raw = exit_status.code().unwrap_or(-1);

        if self.options.dispose_on_exit {
            *self.disposed.lock().unwrap() = true;
        }

        let result = CommandResult::from_exit_status(ExitStatus::from_raw(raw));
        if self.options.throw_on_error && !result.success {
            return Err(CommandError::ErrorExitCode {
                exit_code: raw,
                argv: self.argv,
                pid: self.pid,
            });
        }
        Ok(result)
    }
}
