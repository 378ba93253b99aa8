//! Executors run units of work outside of the request that submitted them.

use futures::future::BoxFuture;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::error::SchedulingError;

pub type UnitOfWork = BoxFuture<'static, ()>;

/// Something able to run a unit of work asynchronously.
///
/// Implementations must not run the work on the caller's task: `schedule`
/// returns as soon as the work has been accepted.
pub trait Executor: Send + Sync {
    fn schedule(&self, work: UnitOfWork) -> Result<ExecutionHandle, SchedulingError>;
}

/// Handle on a scheduled unit of work.
#[derive(Debug)]
pub struct ExecutionHandle {
    done: oneshot::Receiver<()>,
}

impl ExecutionHandle {
    pub fn new(done: oneshot::Receiver<()>) -> Self {
        Self { done }
    }

    /// Resolves once the work has finished, or has been dropped without running.
    pub async fn finished(self) {
        let _ = self.done.await;
    }
}

struct QueuedWork {
    work: UnitOfWork,
    done: oneshot::Sender<()>,
}

/// Bounded worker pool on the tokio runtime.
///
/// Up to `queue_capacity` works wait in a queue, at most `max_concurrent`
/// run at the same time. Works still queued when the executor shuts down are
/// dropped without running.
pub struct TokioExecutor {
    queue_tx: mpsc::Sender<QueuedWork>,
    shutdown_token: CancellationToken,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl TokioExecutor {
    /// Start the dispatcher task. Must be called from within a tokio runtime.
    pub fn start(
        max_concurrent: usize,
        queue_capacity: usize,
        shutdown_token: CancellationToken,
    ) -> Self {
        info!(
            "Starting executor: {} concurrent jobs, queue capacity {}",
            max_concurrent, queue_capacity
        );
        let (queue_tx, queue_rx) = mpsc::channel(queue_capacity.max(1));
        let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));
        let dispatcher = tokio::spawn(dispatch(queue_rx, semaphore, shutdown_token.clone()));
        Self {
            queue_tx,
            shutdown_token,
            dispatcher: Mutex::new(Some(dispatcher)),
        }
    }

    /// Stop accepting work and wait for the dispatcher to exit.
    ///
    /// Works already running are left to finish on their own.
    pub async fn shutdown(&self) {
        self.shutdown_token.cancel();
        let dispatcher = self
            .dispatcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(dispatcher) = dispatcher {
            let _ = dispatcher.await;
        }
    }
}

impl Executor for TokioExecutor {
    fn schedule(&self, work: UnitOfWork) -> Result<ExecutionHandle, SchedulingError> {
        if self.shutdown_token.is_cancelled() {
            return Err(SchedulingError::ExecutorUnavailable);
        }
        let (done_tx, done_rx) = oneshot::channel();
        self.queue_tx
            .try_send(QueuedWork {
                work,
                done: done_tx,
            })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => SchedulingError::QueueFull,
                mpsc::error::TrySendError::Closed(_) => SchedulingError::ExecutorUnavailable,
            })?;
        Ok(ExecutionHandle::new(done_rx))
    }
}

async fn dispatch(
    mut queue_rx: mpsc::Receiver<QueuedWork>,
    semaphore: Arc<Semaphore>,
    shutdown_token: CancellationToken,
) {
    loop {
        let permit = tokio::select! {
            _ = shutdown_token.cancelled() => break,
            permit = semaphore.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };
        let queued = tokio::select! {
            _ = shutdown_token.cancelled() => break,
            queued = queue_rx.recv() => match queued {
                Some(queued) => queued,
                None => break,
            },
        };
        debug!(
            "Dispatching unit of work, {} slots left",
            semaphore.available_permits()
        );
        tokio::spawn(async move {
            queued.work.await;
            drop(permit);
            let _ = queued.done.send(());
        });
    }

    queue_rx.close();
    let mut dropped = 0;
    while queue_rx.try_recv().is_ok() {
        dropped += 1;
    }
    info!("Executor stopped, {} queued works dropped", dropped);
}
