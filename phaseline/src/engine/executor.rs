//! Executors for asynchronous phases.

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::warn;

/// Accepts fire-and-forget phase tasks. `submit` must never block the
/// driving chain.
pub trait PhaseExecutor: Send + Sync {
    /// Queues a task for execution.
    fn submit(&self, task: BoxFuture<'static, ()>);
}

/// The manager default: a single worker draining a FIFO queue, so
/// asynchronous phases of one manager execute in submission order.
///
/// The worker task is spawned lazily on the first submission, which always
/// happens inside the runtime driving the chain.
pub struct SingleWorkerExecutor {
    tx: mpsc::UnboundedSender<BoxFuture<'static, ()>>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<BoxFuture<'static, ()>>>>,
}

impl SingleWorkerExecutor {
    /// Creates the executor; no task is spawned yet.
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(Some(rx)),
        }
    }
}

impl Default for SingleWorkerExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl PhaseExecutor for SingleWorkerExecutor {
    fn submit(&self, task: BoxFuture<'static, ()>) {
        if self.tx.send(task).is_err() {
            warn!("single-worker executor is shut down; task dropped");
            return;
        }
        if let Some(mut rx) = self.rx.lock().take() {
            tokio::spawn(async move {
                while let Some(task) = rx.recv().await {
                    task.await;
                }
            });
        }
    }
}

/// Spawns each task on the runtime immediately; tasks of one manager may
/// overlap. For phases whose work is independent and latency-sensitive.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpawnExecutor;

impl PhaseExecutor for SpawnExecutor {
    fn submit(&self, task: BoxFuture<'static, ()>) {
        tokio::spawn(task);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as PlMutex;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn single_worker_preserves_submission_order() {
        let executor = SingleWorkerExecutor::new();
        let seen: Arc<PlMutex<Vec<u32>>> = Arc::new(PlMutex::new(Vec::new()));

        for i in 0..4u32 {
            let seen = Arc::clone(&seen);
            executor.submit(Box::pin(async move {
                // later tasks finish faster; order must still hold
                tokio::time::sleep(Duration::from_millis(u64::from(8 - 2 * i))).await;
                seen.lock().push(i);
            }));
        }

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(*seen.lock(), vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn spawn_executor_runs_tasks() {
        let executor = SpawnExecutor;
        let seen = Arc::new(PlMutex::new(false));
        let flag = Arc::clone(&seen);

        executor.submit(Box::pin(async move {
            *flag.lock() = true;
        }));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(*seen.lock());
    }
}
