//! Worker pool pulling submission tasks from the queue.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::WorkerPoolConfig;
use crate::error::SubmissionError;
use crate::orchestrator::{SubmissionOrchestrator, SubmissionOutcome};
use crate::queue::SubmissionQueue;
use crate::task::{SubmissionTask, TaskStatus};

/// Pool runtime statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct PoolStats {
    pub tasks_processed: u64,
    pub tasks_succeeded: u64,
    /// Attempts that failed and were scheduled again.
    pub tasks_retried: u64,
    /// Tasks that ended permanently failed.
    pub tasks_failed: u64,
    pub current_running: usize,
    pub uptime_secs: u64,
}

fn lock(stats: &Mutex<PoolStats>) -> MutexGuard<'_, PoolStats> {
    stats.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Handle to control a running pool.
#[derive(Debug)]
pub struct WorkerPoolHandle {
    shutdown: watch::Sender<bool>,
    workers: Vec<JoinHandle<()>>,
    stats: Arc<Mutex<PoolStats>>,
}

impl WorkerPoolHandle {
    /// Stops polling and waits for in-flight tasks to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for worker in self.workers {
            if let Err(e) = worker.await {
                error!(error = %e, "submission worker panicked");
            }
        }
    }

    pub fn stats(&self) -> PoolStats {
        lock(&self.stats).clone()
    }
}

/// Executes claimed tasks through the orchestrator and records their outcome
/// on the task.
pub struct WorkerPool {
    queue: Arc<dyn SubmissionQueue>,
    orchestrator: Arc<SubmissionOrchestrator>,
}

impl WorkerPool {
    pub fn new(queue: Arc<dyn SubmissionQueue>, orchestrator: Arc<SubmissionOrchestrator>) -> Self {
        Self {
            queue,
            orchestrator,
        }
    }

    /// Spawns `config.workers` tasks on the current tokio runtime.
    pub fn spawn(self, config: WorkerPoolConfig) -> WorkerPoolHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let stats = Arc::new(Mutex::new(PoolStats::default()));
        let pool = Arc::new(self);

        let workers = (0..config.workers.max(1))
            .map(|n| {
                let name = format!("{}-{}", config.name, n);
                tokio::spawn(worker_loop(
                    pool.clone(),
                    name,
                    config.clone(),
                    shutdown_rx.clone(),
                    stats.clone(),
                ))
            })
            .collect();

        WorkerPoolHandle {
            shutdown: shutdown_tx,
            workers,
            stats,
        }
    }

    /// Runs one claimed task and persists its new state (for tests or
    /// synchronous use).
    pub async fn execute_one(
        &self,
        task: &mut SubmissionTask,
    ) -> Result<SubmissionOutcome, SubmissionError> {
        let started = Utc::now();
        let result = self.orchestrator.run(task.invoice_id, task.attempt).await;

        match &result {
            Ok(_) => task.mark_completed(started),
            Err(err) => {
                task.mark_failed(err.to_string(), started, err.is_retryable());
                match &task.status {
                    TaskStatus::RetryScheduled { attempt, .. } => {
                        warn!(
                            task_id = %task.id,
                            invoice_id = %task.invoice_id,
                            attempt,
                            next_attempt_at = ?task.scheduled_at,
                            "submission retry scheduled"
                        );
                    }
                    TaskStatus::Failed { attempts, .. } => {
                        error!(
                            task_id = %task.id,
                            invoice_id = %task.invoice_id,
                            attempts,
                            error = %err,
                            "submission permanently failed"
                        );
                    }
                    _ => {}
                }
            }
        }

        self.queue.update(task)?;
        result
    }
}

async fn worker_loop(
    pool: Arc<WorkerPool>,
    name: String,
    config: WorkerPoolConfig,
    mut shutdown: watch::Receiver<bool>,
    stats: Arc<Mutex<PoolStats>>,
) {
    info!(worker = %name, "submission worker started");
    let start_time = Instant::now();

    loop {
        if *shutdown.borrow() {
            break;
        }

        lock(&stats).uptime_secs = start_time.elapsed().as_secs();

        match pool.queue.claim_next() {
            Ok(Some(mut task)) => {
                debug!(
                    worker = %name,
                    task_id = %task.id,
                    invoice_id = %task.invoice_id,
                    attempt = task.attempt,
                    "claimed submission task"
                );

                lock(&stats).current_running += 1;
                let result = pool.execute_one(&mut task).await;

                let mut s = lock(&stats);
                s.current_running = s.current_running.saturating_sub(1);
                s.tasks_processed += 1;
                match (&result, &task.status) {
                    (Ok(_), _) => s.tasks_succeeded += 1,
                    (Err(_), TaskStatus::RetryScheduled { .. }) => s.tasks_retried += 1,
                    (Err(_), _) => s.tasks_failed += 1,
                }
            }
            Ok(None) => {
                tokio::select! {
                    _ = tokio::time::sleep(config.poll_interval) => {}
                    _ = shutdown.changed() => {}
                }
            }
            Err(e) => {
                error!(worker = %name, error = %e, "failed to claim submission task");
                tokio::time::sleep(config.poll_interval).await;
            }
        }
    }

    info!(worker = %name, "submission worker stopped");
}
