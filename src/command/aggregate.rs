//! The three-way race (natural completion / cancellation / timeout) used by
//! every Command variant's aggregate task.
//!
//! Races multiple completion sources through a single select: we
//! model this as a plain enum a `tokio::select!` resolves to, rather than an
//! exception raised against a shared completion source. Whichever branch
//! resolves first is the winner; the loser's future is simply dropped by
//! `select!`, which is exactly the CAS semantics the design calls for since
//! at most one branch of a `select!` ever produces a value.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Why the kill/timeout race fired before the process exited naturally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillReason {
    Cancelled,
    TimedOut,
}

/// A future that resolves with [`KillReason::TimedOut`] after `timeout`
/// elapses, or [`KillReason::Cancelled`] when either `kill_requested` (the
/// command's own, privately-owned trigger, set by `Command::kill()`) or
/// `external` (a caller-supplied token this command never cancels itself)
/// fires — whichever happens first. If `timeout` is `None` that branch
/// simply never fires. Resolves to nothing (pends forever) only if every
/// source is absent/never-fires.
pub async fn race_kill_trigger(
    timeout: Option<Duration>,
    kill_requested: CancellationToken,
    external: Option<CancellationToken>,
) -> KillReason {
    let cancelled = async {
        match external {
            Some(external) => {
                tokio::select! {
                    () = kill_requested.cancelled() => {}
                    () = external.cancelled() => {}
                }
            }
            None => kill_requested.cancelled().await,
        }
    };
    match timeout {
        Some(d) => {
            tokio::select! {
                () = tokio::time::sleep(d) => KillReason::TimedOut,
                () = cancelled => KillReason::Cancelled,
            }
        }
        None => {
            cancelled.await;
            KillReason::Cancelled
        }
    }
}
