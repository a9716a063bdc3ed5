//! In-process task queue with a fixed worker pool.
//!
//! Jobs are pushed onto an unbounded channel and pulled by `workers` tokio
//! tasks sharing one receiver. Each attempt runs under a timeout;
//! retryable failures ([`ReportError::is_retryable`]) are retried up to
//! `max_attempts` with exponential backoff (1s, 2s, 4s, ... capped at 32s).
//! The completion callback runs exactly once per job, after the last
//! attempt.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use patent_inspector_core::error::ReportError;
use tokio::sync::{mpsc, Mutex, Notify};
use tokio::task::JoinHandle;

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// A job body. Called once per attempt.
pub type Job = Box<dyn Fn() -> BoxFuture<Result<(), ReportError>> + Send + Sync>;

/// Invoked once with the final outcome of a job.
pub type OnComplete = Box<dyn FnOnce(TaskOutcome) -> BoxFuture<()> + Send>;

/// Box an async closure as a [`Job`].
pub fn job<F, Fut>(f: F) -> Job
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ReportError>> + Send + 'static,
{
    Box::new(move || -> BoxFuture<Result<(), ReportError>> { Box::pin(f()) })
}

/// Box an async closure as an [`OnComplete`] callback.
pub fn callback<F, Fut>(f: F) -> OnComplete
where
    F: FnOnce(TaskOutcome) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Box::new(move |outcome| -> BoxFuture<()> { Box::pin(f(outcome)) })
}

#[derive(Debug)]
pub struct TaskOutcome {
    pub success: bool,
    pub attempts: u32,
    pub error: Option<ReportError>,
}

struct Task {
    name: String,
    job: Job,
    on_complete: OnComplete,
}

pub struct TaskQueue {
    sender: std::sync::Mutex<Option<mpsc::UnboundedSender<Task>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    pending: Arc<AtomicUsize>,
    idle: Arc<Notify>,
}

impl TaskQueue {
    /// Spawn the worker pool. Must be called from within a tokio runtime.
    pub fn start(workers: usize, max_attempts: u32, timeout: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel::<Task>();
        let rx = Arc::new(Mutex::new(rx));
        let pending = Arc::new(AtomicUsize::new(0));
        let idle = Arc::new(Notify::new());
        let max_attempts = max_attempts.max(1);

        let handles = (0..workers)
            .map(|worker| {
                let rx = rx.clone();
                let pending = pending.clone();
                let idle = idle.clone();
                tokio::spawn(async move {
                    loop {
                        let task = { rx.lock().await.recv().await };
                        let Some(Task {
                            name,
                            job,
                            on_complete,
                        }) = task
                        else {
                            break;
                        };
                        tracing::debug!(worker, task = %name, "task picked up");
                        let outcome = run_attempts(&name, &job, max_attempts, timeout).await;
                        if let Err(e) = tokio::spawn(on_complete(outcome)).await {
                            tracing::error!(task = %name, error = %e, "completion callback failed");
                        }
                        if pending.fetch_sub(1, Ordering::SeqCst) == 1 {
                            idle.notify_waiters();
                        }
                    }
                })
            })
            .collect();

        Self {
            sender: std::sync::Mutex::new(Some(tx)),
            workers: Mutex::new(handles),
            pending,
            idle,
        }
    }

    /// Queue a job. Fire-and-forget: the outcome only reaches `on_complete`.
    pub fn enqueue(&self, name: impl Into<String>, job: Job, on_complete: OnComplete) -> Result<()> {
        let guard = self
            .sender
            .lock()
            .map_err(|_| anyhow::anyhow!("task queue lock poisoned"))?;
        let Some(sender) = guard.as_ref() else {
            bail!("task queue is shut down");
        };
        self.pending.fetch_add(1, Ordering::SeqCst);
        let task = Task {
            name: name.into(),
            job,
            on_complete,
        };
        if sender.send(task).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            bail!("task queue has no workers");
        }
        Ok(())
    }

    /// Jobs queued or running.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Wait until every queued job, including jobs queued by completion
    /// callbacks, has finished.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Stop accepting jobs, drain the queue and join the workers.
    pub async fn shutdown(&self) {
        if let Ok(mut sender) = self.sender.lock() {
            sender.take();
        }
        let handles: Vec<JoinHandle<()>> = self.workers.lock().await.drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "task worker panicked");
            }
        }
    }
}

/// Run one attempt on its own task so a panicking job surfaces as a
/// compute error instead of taking the worker down.
async fn run_once(job: &Job, timeout: Duration) -> Result<(), ReportError> {
    let handle = tokio::spawn(job());
    let abort = handle.abort_handle();
    match tokio::time::timeout(timeout, handle).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) if e.is_panic() => Err(ReportError::Compute("task panicked".to_string())),
        Ok(Err(e)) => Err(ReportError::Compute(format!("task aborted: {}", e))),
        Err(_) => {
            abort.abort();
            Err(ReportError::Compute(format!(
                "task timed out after {}s",
                timeout.as_secs()
            )))
        }
    }
}

async fn run_attempts(name: &str, job: &Job, max_attempts: u32, timeout: Duration) -> TaskOutcome {
    let mut attempt = 0;
    loop {
        attempt += 1;
        if attempt > 1 {
            let delay = Duration::from_secs(1 << (attempt - 2).min(5));
            tokio::time::sleep(delay).await;
        }

        let result = run_once(job, timeout).await;

        match result {
            Ok(()) => {
                return TaskOutcome {
                    success: true,
                    attempts: attempt,
                    error: None,
                }
            }
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                tracing::warn!(task = %name, attempt, error = %e, "task failed, retrying");
            }
            Err(e) => {
                return TaskOutcome {
                    success: false,
                    attempts: attempt,
                    error: Some(e),
                }
            }
        }
    }
}
