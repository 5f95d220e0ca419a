use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// One unit of out-of-band work. Fire-and-forget; it reports through notifications.
pub type Task = BoxFuture<'static, ()>;

#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum SubmitError {
    #[error("task queue is full")]
    QueueFull,
    #[error("task executor has shut down")]
    Closed,
}

/// Hands a task to something that will run it after the caller has returned.
pub trait TaskSubmitter: Send + Sync {
    fn submit(&self, task: Task) -> Result<(), SubmitError>;
}

/// Runs every task on its own tokio task.
#[derive(Clone, Copy, Debug, Default)]
pub struct SpawnSubmitter;

impl TaskSubmitter for SpawnSubmitter {
    fn submit(&self, task: Task) -> Result<(), SubmitError> {
        tokio::spawn(task);
        Ok(())
    }
}

/// Fixed set of workers draining a bounded queue.
///
/// Must be created inside a tokio runtime.
pub struct WorkerPool {
    sender: mpsc::Sender<Task>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(worker_count: usize, queue_capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel::<Task>(queue_capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));
        let workers = (0..worker_count.max(1))
            .map(|worker| tokio::spawn(run_worker(worker, receiver.clone())))
            .collect();
        Self { sender, workers }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }
}

impl TaskSubmitter for WorkerPool {
    fn submit(&self, task: Task) -> Result<(), SubmitError> {
        self.sender.try_send(task).map_err(|error| match error {
            mpsc::error::TrySendError::Full(_) => SubmitError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => SubmitError::Closed,
        })
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        for worker in &self.workers {
            worker.abort();
        }
    }
}

async fn run_worker(worker: usize, receiver: Arc<Mutex<mpsc::Receiver<Task>>>) {
    loop {
        let next = receiver.lock().await.recv().await;
        let Some(task) = next else {
            debug!(event_name = "relay.worker.stopped", worker, "task queue closed");
            return;
        };

        if AssertUnwindSafe(task).catch_unwind().await.is_err() {
            error!(event_name = "relay.worker.task_panicked", worker, "task panicked; worker continues");
        }
    }
}
