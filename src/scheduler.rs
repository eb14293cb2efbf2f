//! [`LongRunningTaskScheduler`]: dedicated-thread scheduler for blocking sync
//! I/O against child pipes, so that it never starves the shared tokio
//! worker pool.
//!
//! On most platforms `tokio::process`'s pipe I/O is genuinely async (backed
//! by the OS's async file APIs), so this scheduler goes unused in the
//! default code paths here. It exists because some platforms' async pipe
//! support is implemented as blocking syscalls dispatched to a pool thread —
//! Such chains of sync hops should reuse one
//! dedicated worker instead of allocating a fresh `spawn_blocking` thread per
//! hop, which is what would starve the shared pool under load.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::trace;

/// How long an idle dedicated worker is kept alive before its thread exits.
pub const IDLE_WORKER_KEEPALIVE: Duration = Duration::from_secs(5);

/// What a job leaves behind once it has run: a thunk that delivers the
/// result to the caller. Kept separate from the job itself so a worker can
/// check itself back into the idle pool *between* running the job and
/// delivering its result — see `spawn_worker`.
type Finish = Box<dyn FnOnce() + Send + 'static>;
type BoxedJob = Box<dyn FnOnce() -> Finish + Send + 'static>;

/// A pool of dedicated OS threads for blocking sync I/O, separate from
/// tokio's shared worker pool.
pub struct LongRunningTaskScheduler {
    idle: Arc<Mutex<Vec<mpsc::UnboundedSender<BoxedJob>>>>,
}

impl Default for LongRunningTaskScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl LongRunningTaskScheduler {
    pub fn new() -> Self {
        LongRunningTaskScheduler {
            idle: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Run `f` (a blocking closure) on a dedicated thread, returning its
    /// result. Reuses an idle worker if one is available; otherwise spawns a
    /// new dedicated thread. The worker checks itself back into the idle
    /// pool only once `f` has actually finished running on it (see
    /// `spawn_worker`'s loop), strictly *before* the result is handed back
    /// to the caller — never at dispatch time, and never after the caller
    /// has already been woken up — so a second, concurrent `run()` call can
    /// never observe this worker as idle while it is still busy with `f`,
    /// nor race ahead of its own checkin.
    pub async fn run<F, T>(&self, f: F) -> T
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (result_tx, result_rx) = oneshot::channel();
        let job: BoxedJob = Box::new(move || -> Finish {
            let result = f();
            Box::new(move || {
                let _ = result_tx.send(result);
            })
        });
        let worker = self.checkout_worker();
        // A worker popped from the idle pool may have exited its keepalive
        // window in the gap between pop and send; a freshly spawned worker
        // is guaranteed alive, so fall back to one rather than retrying.
        if let Err(mpsc::error::SendError(job)) = worker.send(job) {
            let fresh = spawn_worker(self.idle.clone());
            fresh.send(job).expect("freshly spawned worker accepts its first job");
        }
        result_rx.await.expect("worker dropped result sender")
    }

    fn checkout_worker(&self) -> mpsc::UnboundedSender<BoxedJob> {
        if let Some(tx) = self.idle.lock().unwrap().pop() {
            return tx;
        }
        spawn_worker(self.idle.clone())
    }
}

/// Spawn one dedicated OS thread running a blocking receive loop. After a
/// received job finishes running, the thread pushes its own sender back
/// onto `idle` *before* calling the job's `Finish` thunk — so by the time
/// the caller's result is delivered, this worker is already visible to the
/// next `checkout_worker` call. A worker dispatched a job is absent from
/// the idle pool for the entire duration of that job, not just until the
/// job is handed off. The thread exits after `IDLE_WORKER_KEEPALIVE` with no
/// job, simply dropping its sender rather than checking back in.
fn spawn_worker(idle: Arc<Mutex<Vec<mpsc::UnboundedSender<BoxedJob>>>>) -> mpsc::UnboundedSender<BoxedJob> {
    let (tx, mut rx) = mpsc::unbounded_channel::<BoxedJob>();
    let self_tx = tx.clone();
    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("build current-thread runtime for dedicated worker");
        rt.block_on(async {
            loop {
                match tokio::time::timeout(IDLE_WORKER_KEEPALIVE, rx.recv()).await {
                    Ok(Some(job)) => {
                        let finish = job();
                        idle.lock().unwrap().push(self_tx.clone());
                        finish();
                    }
                    Ok(None) => break, // sender dropped entirely
                    Err(_) => {
                        trace!("dedicated worker idle timeout, exiting");
                        break;
                    }
                }
            }
        });
    });
    tx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn runs_blocking_work_and_returns_result() {
        let sched = LongRunningTaskScheduler::new();
        let result = sched.run(|| 2 + 2).await;
        assert_eq!(result, 4);
    }

    #[tokio::test]
    async fn reuses_worker_across_sequential_calls() {
        let sched = LongRunningTaskScheduler::new();
        let tid1 = sched.run(|| std::thread::current().id()).await;
        let tid2 = sched.run(|| std::thread::current().id()).await;
        assert_eq!(tid1, tid2);
    }

    #[tokio::test]
    async fn a_busy_worker_is_not_handed_a_second_concurrent_job() {
        let sched = Arc::new(LongRunningTaskScheduler::new());
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let release_rx = Arc::new(Mutex::new(release_rx));

        let sched1 = sched.clone();
        let first = tokio::spawn(async move {
            sched1
                .run(move || {
                    release_rx.lock().unwrap().recv().unwrap();
                    std::thread::current().id()
                })
                .await
        });
        // Give the first job time to actually start running before dispatching
        // the second, so the first worker is genuinely busy, not merely queued.
        tokio::time::sleep(Duration::from_millis(20)).await;

        let sched2 = sched.clone();
        let second = tokio::spawn(async move { sched2.run(|| std::thread::current().id()).await });
        let tid2 = second.await.unwrap();

        release_tx.send(()).unwrap();
        let tid1 = first.await.unwrap();

        assert_ne!(
            tid1, tid2,
            "a second concurrent job must get its own worker, not queue behind the first"
        );
    }
}
