//! Supervised execution of detached runs.
//!
//! Every run is spawned under a concurrency permit, raced against a
//! deadline and the shutdown signal, and isolated in its own task so a
//! panic is observed instead of lost. Whatever ends a run other than
//! success, the submitter's failure handler is invoked exactly once with
//! the cause, which lets it persist an `error` status for the owning video.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Semaphore};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, warn};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};

/// How a supervised run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Completed,
    Failed(String),
    TimedOut,
    Panicked(String),
    Cancelled,
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Completed)
    }
}

/// Handle to a submitted run.
pub struct TaskHandle {
    name: String,
    join: JoinHandle<TaskOutcome>,
}

impl TaskHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wait for the run (and its failure handler) to finish.
    pub async fn outcome(self) -> TaskOutcome {
        match self.join.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_panic() => TaskOutcome::Panicked(panic_message(e)),
            Err(_) => TaskOutcome::Cancelled,
        }
    }
}

/// Bounded, deadline-enforcing runner for detached pipeline work.
pub struct TaskSupervisor {
    semaphore: Arc<Semaphore>,
    max_tasks: usize,
    deadline: Duration,
    shutdown: watch::Sender<bool>,
    in_flight: Arc<AtomicUsize>,
}

impl TaskSupervisor {
    pub fn new(max_tasks: usize, deadline: Duration) -> Self {
        let max_tasks = max_tasks.max(1);
        let (shutdown, _) = watch::channel(false);
        Self {
            semaphore: Arc::new(Semaphore::new(max_tasks)),
            max_tasks,
            deadline,
            shutdown,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.max_concurrent_tasks, config.task_deadline)
    }

    pub fn max_tasks(&self) -> usize {
        self.max_tasks
    }

    /// Runs submitted and not yet finished, including those queued for a
    /// permit.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Submit a run. Never blocks; the run waits for a permit in the
    /// background.
    ///
    /// `on_failure` receives the error, a `Timeout`, a `Panicked` or a
    /// `Cancelled` cause, and is not called on success.
    pub fn submit<F, H, HF>(&self, name: impl Into<String>, task: F, on_failure: H) -> TaskHandle
    where
        F: Future<Output = PipelineResult<()>> + Send + 'static,
        H: FnOnce(PipelineError) -> HF + Send + 'static,
        HF: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        let semaphore = Arc::clone(&self.semaphore);
        let deadline = self.deadline;
        let mut shutdown_rx = self.shutdown.subscribe();
        let in_flight = InFlight::enter(&self.in_flight);

        let task_name = name.clone();
        let join = tokio::spawn(async move {
            let _in_flight = in_flight;
            let result = tokio::select! {
                biased;
                _ = shutdown_signalled(&mut shutdown_rx) => {
                    Err(PipelineError::Cancelled(format!("{} was not started before shutdown", task_name)))
                }
                permit = semaphore.acquire_owned() => match permit {
                    Ok(permit) => {
                        let _permit = permit;
                        run_guarded(&task_name, task, deadline, &mut shutdown_rx).await
                    }
                    Err(_) => Err(PipelineError::Cancelled("supervisor closed".to_string())),
                },
            };

            match result {
                Ok(()) => {
                    debug!(task = %task_name, "Supervised task completed");
                    TaskOutcome::Completed
                }
                Err(e) => {
                    let outcome = match &e {
                        PipelineError::Timeout(_) => TaskOutcome::TimedOut,
                        PipelineError::Panicked(msg) => TaskOutcome::Panicked(msg.clone()),
                        PipelineError::Cancelled(_) => TaskOutcome::Cancelled,
                        other => TaskOutcome::Failed(other.to_string()),
                    };
                    warn!(task = %task_name, error = %e, "Supervised task did not complete");
                    on_failure(e).await;
                    outcome
                }
            }
        });

        TaskHandle { name, join }
    }

    /// Signal shutdown: queued runs are not started and running ones are
    /// aborted, each reporting `Cancelled` to its failure handler.
    pub fn shutdown(&self) {
        info!(in_flight = self.in_flight(), "Task supervisor shutting down");
        let _ = self.shutdown.send(true);
    }

    /// Wait until no run is in flight.
    pub async fn wait_idle(&self) {
        while self.in_flight() > 0 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    /// [`wait_idle`](Self::wait_idle) bounded by `timeout`; returns whether
    /// the supervisor drained in time.
    pub async fn wait_idle_timeout(&self, timeout: Duration) -> bool {
        match tokio::time::timeout(timeout, self.wait_idle()).await {
            Ok(()) => true,
            Err(_) => {
                error!(in_flight = self.in_flight(), "Supervised tasks still running after {:?}", timeout);
                false
            }
        }
    }
}

async fn run_guarded<F>(
    name: &str,
    task: F,
    deadline: Duration,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> PipelineResult<()>
where
    F: Future<Output = PipelineResult<()>> + Send + 'static,
{
    let mut inner = tokio::spawn(task);

    tokio::select! {
        joined = &mut inner => match joined {
            Ok(result) => result,
            Err(e) if e.is_panic() => Err(PipelineError::Panicked(panic_message(e))),
            Err(_) => Err(PipelineError::Cancelled(format!("{} was aborted", name))),
        },
        _ = tokio::time::sleep(deadline) => {
            stop(inner).await;
            Err(PipelineError::Timeout(format!("{} exceeded its {}s deadline", name, deadline.as_secs_f64())))
        }
        _ = shutdown_signalled(shutdown_rx) => {
            stop(inner).await;
            Err(PipelineError::Cancelled(format!("{} cancelled by shutdown", name)))
        }
    }
}

/// Abort a run and wait for it to unwind, so its drop guards have run
/// before the failure handler sees the cause.
async fn stop(inner: JoinHandle<PipelineResult<()>>) {
    inner.abort();
    if let Err(e) = inner.await {
        if e.is_panic() {
            warn!("Run panicked while being aborted: {}", panic_message(e));
        }
    }
}

/// Counts a submitted run until dropped, even if the failure handler
/// panics.
struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Resolves once shutdown has been signalled; never resolves if the
/// sender is dropped first.
async fn shutdown_signalled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

fn panic_message(e: JoinError) -> String {
    let payload = e.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
