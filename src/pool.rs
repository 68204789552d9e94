//! Bounded pool for independent async jobs.

use std::any::Any;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Why a pooled task produced no value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    #[error("task failed: {0}")]
    Failed(String),
    #[error("task panicked: {0}")]
    Panicked(String),
    #[error("task was cancelled")]
    Cancelled,
}

/// Runs submitted tasks with at most `workers` of them in flight.
///
/// Every task runs on its own tokio task, so a failure or panic stays in that
/// task's slot. Tasks should build their own clients and accounts.
pub struct TaskPool<T> {
    workers: usize,
    semaphore: Arc<Semaphore>,
    handles: Vec<JoinHandle<anyhow::Result<T>>>,
}

impl<T: Send + 'static> TaskPool<T> {
    pub fn new(workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            workers,
            semaphore: Arc::new(Semaphore::new(workers)),
            handles: Vec::new(),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Queues `task`. It starts as soon as a worker slot frees up.
    pub fn submit<F, Fut>(&mut self, task: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let index = self.handles.len();
        let semaphore = self.semaphore.clone();
        self.handles.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await?;
            debug!("Task {} started", index);
            task().await
        }));
    }

    /// Waits for every task; one outcome per submission, in submission order.
    pub async fn await_all(self) -> Vec<Result<T, TaskError>> {
        let total = self.handles.len();
        let mut outcomes = Vec::with_capacity(total);

        for (index, handle) in self.handles.into_iter().enumerate() {
            let outcome = match handle.await {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(e)) => {
                    warn!("Task {} failed: {:#}", index, e);
                    Err(TaskError::Failed(format!("{:#}", e)))
                }
                Err(e) if e.is_panic() => {
                    let message = panic_message(e.into_panic());
                    warn!("Task {} panicked: {}", index, message);
                    Err(TaskError::Panicked(message))
                }
                Err(_) => Err(TaskError::Cancelled),
            };
            outcomes.push(outcome);
        }

        let failed = outcomes.iter().filter(|o| o.is_err()).count();
        info!("{} tasks finished, {} failed", total, failed);
        outcomes
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
