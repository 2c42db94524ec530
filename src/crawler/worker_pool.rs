//! Fixed-size worker pool
//!
//! Tasks are queued on a `flume` channel and drained by `size` workers running
//! on the tokio runtime. The pool alone observes the interrupt signal: on
//! interrupt it stops dispatching, raises the shared `Cancellation`, gives the
//! workers a grace period to return partial results and then aborts them.

use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Cooperative stop flag shared by the pool and every running task.
#[derive(Debug, Clone, Default)]
pub struct Cancellation(Arc<AtomicBool>);

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What came back from a pool run.
#[derive(Debug)]
pub struct PoolReport<O> {
    /// Outputs of tasks that completed, in completion order.
    pub outputs: Vec<O>,
    pub failures: usize,
    pub panics: usize,
    pub interrupted: bool,
}

#[derive(Default)]
struct Counters {
    failures: AtomicUsize,
    panics: AtomicUsize,
}

pub struct WorkerPool {
    size: usize,
    grace: Duration,
}

impl WorkerPool {
    pub fn new(size: usize, grace: Duration) -> Self {
        Self { size: size.max(1), grace }
    }

    /// Runs every task through `work` and waits for the pool to drain or for
    /// `interrupt` to resolve, whichever happens first.
    ///
    /// A task that returns an error or panics is logged and counted; its
    /// worker moves on to the next task.
    pub async fn run<T, O, E, F, Fut, I>(
        &self,
        tasks: Vec<T>,
        cancel: Cancellation,
        work: F,
        interrupt: I,
    ) -> PoolReport<O>
    where
        T: Send + 'static,
        O: Send + 'static,
        E: Display + Send + 'static,
        F: Fn(T, Cancellation) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, E>> + Send + 'static,
        I: Future<Output = ()>,
    {
        let total = tasks.len();
        let (tx, rx) = flume::unbounded();
        for task in tasks {
            // receiver is alive until the workers below are spawned
            let _ = tx.send(task);
        }
        drop(tx);

        let work = Arc::new(work);
        let outputs = Arc::new(Mutex::new(Vec::with_capacity(total)));
        let counters = Arc::new(Counters::default());
        let mut join_set = JoinSet::new();

        info!("Starting {} workers for {} tasks", self.size, total);
        for worker in 0..self.size {
            let rx = rx.clone();
            let work = work.clone();
            let cancel = cancel.clone();
            let outputs = outputs.clone();
            let counters = counters.clone();

            join_set.spawn(async move {
                while let Ok(task) = rx.recv_async().await {
                    if cancel.is_cancelled() {
                        debug!("Worker {} stopping: cancelled", worker);
                        break;
                    }
                    match AssertUnwindSafe((*work)(task, cancel.clone())).catch_unwind().await {
                        Ok(Ok(output)) => outputs.lock().push(output),
                        Ok(Err(e)) => {
                            warn!("Task failed: {}", e);
                            counters.failures.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(_) => {
                            error!("Task panicked; worker {} continues", worker);
                            counters.panics.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
            });
        }
        drop(rx);

        let interrupted = tokio::select! {
            _ = drain(&mut join_set) => false,
            _ = interrupt => true,
        };

        if interrupted {
            warn!("Interrupt received; cancelling remaining tasks");
            cancel.cancel();
            if tokio::time::timeout(self.grace, drain(&mut join_set)).await.is_err() {
                warn!("Workers still busy after {:?}; aborting", self.grace);
                join_set.abort_all();
                drain(&mut join_set).await;
            }
        }

        let outputs = std::mem::take(&mut *outputs.lock());
        PoolReport {
            outputs,
            failures: counters.failures.load(Ordering::Relaxed),
            panics: counters.panics.load(Ordering::Relaxed),
            interrupted,
        }
    }
}

async fn drain(join_set: &mut JoinSet<()>) {
    while let Some(result) = join_set.join_next().await {
        if let Err(e) = result {
            if !e.is_cancelled() {
                error!("Worker terminated abnormally: {}", e);
            }
        }
    }
}

/// Resolves on Ctrl-C. Never resolves if the handler cannot be installed.
pub async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}
