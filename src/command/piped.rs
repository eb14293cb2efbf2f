//! [`PipedCommand`]: shell-style `first | second` composition of two
//! commands.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::compat_stream::CompatStdin;
use crate::error::{CommandError, CopyOutcome};
use crate::pipe::Pipe;
use crate::redirect::copy_pipe_to_stdin;

use super::result::CommandResult;
use super::Command;

/// `first`'s stdout feeds `second`'s stdin via a background copy task.
/// `second`'s stdout/stderr/stdin remain `PipedCommand`'s own (`first`'s
/// stdin and `second`'s stdout/stderr are still reachable through this type
/// for callers composing further).
pub struct PipedCommand<A: Command, B: Command> {
    first: A,
    second: B,
    copy_task: JoinHandle<Result<CopyOutcome, CommandError>>,
}

impl<A, B> PipedCommand<A, B>
where
    A: Command + 'static,
    B: Command + 'static,
{
    /// Pipe `first`'s stdout into `second`'s stdin. Fails if either side's
    /// relevant stream has already been claimed.
    pub fn new(mut first: A, mut second: B) -> Result<Self, CommandError> {
        let stdout = first
            .take_stdout()
            .ok_or(CommandError::StreamRedirected("stdout"))?;
        let stdin = second
            .take_stdin()
            .ok_or(CommandError::StreamRedirected("stdin"))?;
        let copy_task = tokio::spawn(run_copy(stdout, stdin));
        Ok(PipedCommand {
            first,
            second,
            copy_task,
        })
    }
}

async fn run_copy(pipe: Arc<Pipe>, mut stdin: CompatStdin) -> Result<CopyOutcome, CommandError> {
    copy_pipe_to_stdin(pipe, &mut stdin).await
}

impl<A: Command, B: Command> Command for PipedCommand<A, B> {
    fn pid(&self) -> Option<u32> {
        self.second.pid()
    }

    fn pids(&self) -> Vec<u32> {
        let mut pids = self.first.pids();
        pids.extend(self.second.pids());
        pids
    }

    fn take_stdout(&mut self) -> Option<Arc<Pipe>> {
        self.second.take_stdout()
    }

    fn take_stderr(&mut self) -> Option<Arc<Pipe>> {
        self.second.take_stderr()
    }

    fn take_stdin(&mut self) -> Option<CompatStdin> {
        self.first.take_stdin()
    }

    fn try_signal(&self, signal_code: i32) -> bool {
        // Both ends of the pipeline get the signal, matching a shell's
        // process-group semantics for e.g. Ctrl-C.
        let a = self.first.try_signal(signal_code);
        let b = self.second.try_signal(signal_code);
        a || b
    }

    fn kill(&self) {
        self.first.kill();
        self.second.kill();
    }

    async fn wait(self) -> Result<CommandResult, CommandError> {
        // The copy task finishes once `first`'s stdout reaches EOF (or
        // `second` stops reading); `first`'s own exit is independent of
        // that and is awaited alongside it so a slow-to-exit upstream
        // doesn't block on `second`.
        let first_wait = self.first.wait();
        let second_wait = self.second.wait();
        let (first_result, second_result, copy_result) =
            tokio::join!(first_wait, second_wait, self.copy_task);

        first_result?;
        copy_result.map_err(|e| CommandError::Io(std::io::Error::other(e.to_string())))??;
        second_result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::ProcessCommand;
    use crate::options::CommandOptions;

    #[tokio::test]
    async fn echo_piped_into_cat_round_trips_stdout() {
        let echo = ProcessCommand::spawn(
            vec!["echo".into(), "piped-hello".into()],
            CommandOptions::default(),
        )
        .unwrap();
        let cat = ProcessCommand::spawn(vec!["cat".into()], CommandOptions::default()).unwrap();
        let mut piped = PipedCommand::new(echo, cat).unwrap();
        let stdout = piped.take_stdout().unwrap();
        let cancel = tokio_util::sync::CancellationToken::new();
        let mut buf = [0u8; 64];
        let n = stdout.read(&mut buf, None, &cancel).await.unwrap();
        assert_eq!(&buf[..n], b"piped-hello\n");
        piped.wait().await.unwrap();
    }
}
