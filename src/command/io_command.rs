//! [`IoCommand`]: wraps any [`Command`] and layers one redirect (stdout/
//! stderr to a sink, or a source into stdin) onto it via a background copy
//! task.

use std::fmt;
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::compat_stream::CompatStdin;
use crate::error::{CommandError, CopyOutcome};
use crate::pipe::Pipe;
use crate::redirect::{self, RedirectSink, RedirectSource};

use super::result::CommandResult;
use super::Command;

enum Aux {
    Sink {
        task: JoinHandle<Result<CopyOutcome, CommandError>>,
    },
    Source {
        task: JoinHandle<Result<CopyOutcome, CommandError>>,
    },
}

/// A [`Command`] with exactly one stream redirected to/from an external
/// sink or source, driven by a background copy task that is joined as part
/// of `wait`.
pub struct IoCommand<C: Command> {
    inner: C,
    label: String,
    aux: Aux,
}

impl<C: Command + 'static> IoCommand<C> {
    /// Redirect `inner`'s stdout into `sink`.
    pub fn redirect_stdout_to(mut inner: C, sink: RedirectSink) -> Result<Self, CommandError> {
        let pipe = inner
            .take_stdout()
            .ok_or(CommandError::StreamRedirected("stdout"))?;
        let label = "<stdout redirect>".to_string();
        let task = tokio::spawn(redirect::copy_to_sink(pipe, sink));
        Ok(IoCommand {
            inner,
            label,
            aux: Aux::Sink { task },
        })
    }

    /// Redirect `inner`'s stderr into `sink`.
    pub fn redirect_stderr_to(mut inner: C, sink: RedirectSink) -> Result<Self, CommandError> {
        let pipe = inner
            .take_stderr()
            .ok_or(CommandError::StreamRedirected("stderr"))?;
        let label = "<stderr redirect>".to_string();
        let task = tokio::spawn(redirect::copy_to_sink(pipe, sink));
        Ok(IoCommand {
            inner,
            label,
            aux: Aux::Sink { task },
        })
    }

    /// Feed `source` into `inner`'s stdin.
    pub fn redirect_stdin_from(mut inner: C, source: RedirectSource) -> Result<Self, CommandError> {
        let mut stdin = inner
            .take_stdin()
            .ok_or(CommandError::StreamRedirected("stdin"))?;
        let label = "<stdin redirect>".to_string();
        let task = tokio::spawn(async move { redirect::feed_source(source, &mut stdin).await });
        Ok(IoCommand {
            inner,
            label,
            aux: Aux::Source { task },
        })
    }
}

impl<C: Command> fmt::Display for IoCommand<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label)
    }
}

impl<C: Command + 'static> Command for IoCommand<C> {
    fn pid(&self) -> Option<u32> {
        self.inner.pid()
    }

    fn pids(&self) -> Vec<u32> {
        self.inner.pids()
    }

    fn take_stdout(&mut self) -> Option<Arc<Pipe>> {
        self.inner.take_stdout()
    }

    fn take_stderr(&mut self) -> Option<Arc<Pipe>> {
        self.inner.take_stderr()
    }

    fn take_stdin(&mut self) -> Option<CompatStdin> {
        self.inner.take_stdin()
    }

    fn try_signal(&self, signal_code: i32) -> bool {
        self.inner.try_signal(signal_code)
    }

    fn kill(&self) {
        self.inner.kill()
    }

    async fn wait(self) -> Result<CommandResult, CommandError> {
        let result = self.inner.wait().await?;
        match self.aux {
            Aux::Sink { task } => {
                task.await
                    .map_err(|e| CommandError::Io(std::io::Error::other(e.to_string())))??;
            }
            Aux::Source { task } => {
                task.await
                    .map_err(|e| CommandError::Io(std::io::Error::other(e.to_string())))??;
            }
        }
        Ok(result)
    }
}
