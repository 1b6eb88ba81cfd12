use crate::error::FeedError;
use futures::future::BoxFuture;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, sleep};
use tracing::{debug, warn};

/// A queued unit of work. The queue owns the future until it runs.
pub type QueuedTask<T> = BoxFuture<'static, anyhow::Result<T>>;

struct Job<T> {
    task: QueuedTask<T>,
    reply: oneshot::Sender<anyhow::Result<T>>,
}

/// Per-upstream FIFO queue enforcing a minimum gap between task starts.
///
/// One worker task drains the queue: it waits out the remainder of
/// `min_interval` since the previous start, stamps the start time, runs the
/// task to completion and settles the caller's handle with the outcome.
/// A failing task settles only its own handle; draining continues. Tasks
/// cannot be cancelled once enqueued, and queues for different upstreams
/// are fully independent.
pub struct RateLimiter<T: Send + 'static> {
    api: String,
    capacity: usize,
    tx: mpsc::Sender<Job<T>>,
}

impl<T: Send + 'static> RateLimiter<T> {
    /// Spawns the worker for one upstream. `capacity` bounds the number of
    /// queued (not yet started) tasks.
    pub fn new(api: impl Into<String>, min_interval: Duration, capacity: usize) -> Self {
        let api = api.into();
        let (tx, mut rx) = mpsc::channel::<Job<T>>(capacity.max(1));

        let worker_api = api.clone();
        tokio::spawn(async move {
            let mut last_request: Option<Instant> = None;
            while let Some(job) = rx.recv().await {
                if let Some(last) = last_request {
                    let due = last + min_interval;
                    let now = Instant::now();
                    if due > now {
                        sleep(due - now).await;
                    }
                }
                last_request = Some(Instant::now());
                let outcome = job.task.await;
                if job.reply.send(outcome).is_err() {
                    debug!(api = %worker_api, "Task settled after caller went away");
                }
            }
            debug!(api = %worker_api, "Request queue closed");
        });

        Self { api, capacity, tx }
    }

    /// Appends a task and returns a handle that settles with its outcome.
    /// Fails fast with `QueueFull` when the queue is at capacity; the task
    /// is not queued in that case.
    pub fn enqueue(&self, task: QueuedTask<T>) -> Result<PendingResult<T>, FeedError> {
        let (reply, rx) = oneshot::channel();
        match self.tx.try_send(Job { task, reply }) {
            Ok(()) => Ok(PendingResult {
                api: self.api.clone(),
                rx,
            }),
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(api = %self.api, capacity = self.capacity, "Request queue full, rejecting task");
                Err(FeedError::QueueFull {
                    api: self.api.clone(),
                    capacity: self.capacity,
                })
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(FeedError::QueueClosed {
                api: self.api.clone(),
            }),
        }
    }

    /// Enqueues `task` and waits for its outcome.
    pub async fn run(&self, task: QueuedTask<T>) -> Result<T, FeedError> {
        self.enqueue(task)?.wait().await
    }
}

/// Handle for a queued task's eventual outcome.
pub struct PendingResult<T> {
    api: String,
    rx: oneshot::Receiver<anyhow::Result<T>>,
}

impl<T> PendingResult<T> {
    pub async fn wait(self) -> Result<T, FeedError> {
        match self.rx.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(FeedError::Upstream(e)),
            Err(_) => Err(FeedError::QueueClosed { api: self.api }),
        }
    }
}
