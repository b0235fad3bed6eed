//! Submission task queue.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::Utc;
use serde::Serialize;

use fatoora_invoicing::InvoiceId;

use crate::error::StoreError;
use crate::task::{SubmissionTask, TaskId, TaskStatus};

/// Result of an enqueue; at most one live task exists per invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Enqueued(TaskId),
    AlreadyQueued(TaskId),
}

impl EnqueueOutcome {
    pub fn task_id(&self) -> TaskId {
        match self {
            EnqueueOutcome::Enqueued(id) | EnqueueOutcome::AlreadyQueued(id) => *id,
        }
    }
}

/// Queue statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub pending: usize,
    pub running: usize,
    pub retry_scheduled: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Task queue abstraction.
pub trait SubmissionQueue: Send + Sync {
    /// Adds `task` unless the invoice already has a task that is not terminal.
    fn enqueue(&self, task: SubmissionTask) -> Result<EnqueueOutcome, StoreError>;

    fn get(&self, task_id: TaskId) -> Result<Option<SubmissionTask>, StoreError>;

    fn update(&self, task: &SubmissionTask) -> Result<(), StoreError>;

    /// Claims the oldest ready task and marks it running.
    fn claim_next(&self) -> Result<Option<SubmissionTask>, StoreError>;

    /// Most recent task for an invoice, whatever its status.
    fn latest_for(&self, invoice_id: InvoiceId) -> Result<Option<SubmissionTask>, StoreError>;

    /// Permanently failed tasks, oldest failure first.
    fn list_failed(&self, limit: usize) -> Result<Vec<SubmissionTask>, StoreError>;

    /// Resets a failed task to pending with a fresh attempt budget.
    fn requeue_failed(&self, task_id: TaskId) -> Result<SubmissionTask, StoreError>;

    fn stats(&self) -> Result<QueueStats, StoreError>;
}

/// In-memory queue for tests/dev.
#[derive(Debug, Default)]
pub struct InMemorySubmissionQueue {
    tasks: RwLock<HashMap<TaskId, SubmissionTask>>,
}

impl InMemorySubmissionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

fn live_task_for(
    tasks: &HashMap<TaskId, SubmissionTask>,
    invoice_id: InvoiceId,
) -> Option<TaskId> {
    tasks
        .values()
        .find(|t| t.invoice_id == invoice_id && !t.status.is_terminal())
        .map(|t| t.id)
}

impl SubmissionQueue for InMemorySubmissionQueue {
    fn enqueue(&self, task: SubmissionTask) -> Result<EnqueueOutcome, StoreError> {
        let mut tasks = self.tasks.write()?;
        if let Some(existing) = live_task_for(&tasks, task.invoice_id) {
            return Ok(EnqueueOutcome::AlreadyQueued(existing));
        }
        let id = task.id;
        tasks.insert(id, task);
        Ok(EnqueueOutcome::Enqueued(id))
    }

    fn get(&self, task_id: TaskId) -> Result<Option<SubmissionTask>, StoreError> {
        Ok(self.tasks.read()?.get(&task_id).cloned())
    }

    fn update(&self, task: &SubmissionTask) -> Result<(), StoreError> {
        let mut tasks = self.tasks.write()?;
        match tasks.get_mut(&task.id) {
            Some(slot) => {
                *slot = task.clone();
                Ok(())
            }
            None => Err(StoreError::TaskNotFound(task.id)),
        }
    }

    fn claim_next(&self) -> Result<Option<SubmissionTask>, StoreError> {
        let mut tasks = self.tasks.write()?;
        let now = Utc::now();

        let next = tasks
            .values()
            .filter(|t| t.is_ready(now))
            .min_by_key(|t| (t.scheduled_at.unwrap_or(t.created_at), t.created_at))
            .map(|t| t.id);

        Ok(next.and_then(|id| {
            tasks.get_mut(&id).map(|task| {
                task.mark_running();
                task.clone()
            })
        }))
    }

    fn latest_for(&self, invoice_id: InvoiceId) -> Result<Option<SubmissionTask>, StoreError> {
        let tasks = self.tasks.read()?;
        Ok(tasks
            .values()
            .filter(|t| t.invoice_id == invoice_id)
            .max_by_key(|t| t.created_at)
            .cloned())
    }

    fn list_failed(&self, limit: usize) -> Result<Vec<SubmissionTask>, StoreError> {
        let tasks = self.tasks.read()?;
        let mut failed: Vec<_> = tasks
            .values()
            .filter(|t| t.status.is_failed())
            .cloned()
            .collect();
        failed.sort_by_key(|t| t.updated_at);
        failed.truncate(limit);
        Ok(failed)
    }

    fn requeue_failed(&self, task_id: TaskId) -> Result<SubmissionTask, StoreError> {
        let mut tasks = self.tasks.write()?;
        let task = tasks
            .get(&task_id)
            .ok_or(StoreError::TaskNotFound(task_id))?;
        if !task.status.is_failed() {
            return Err(StoreError::TaskNotFailed(task_id));
        }
        if let Some(live) = live_task_for(&tasks, task.invoice_id) {
            return Err(StoreError::Conflict(format!(
                "invoice already has live task {live}"
            )));
        }

        let task = tasks
            .get_mut(&task_id)
            .ok_or(StoreError::TaskNotFound(task_id))?;
        task.reset();
        Ok(task.clone())
    }

    fn stats(&self) -> Result<QueueStats, StoreError> {
        let tasks = self.tasks.read()?;
        let mut stats = QueueStats::default();
        for task in tasks.values() {
            match &task.status {
                TaskStatus::Pending => stats.pending += 1,
                TaskStatus::Running => stats.running += 1,
                TaskStatus::RetryScheduled { .. } => stats.retry_scheduled += 1,
                TaskStatus::Completed => stats.completed += 1,
                TaskStatus::Failed { .. } => stats.failed += 1,
            }
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::RetryPolicy;

    fn task(invoice_id: InvoiceId) -> SubmissionTask {
        SubmissionTask::new(invoice_id, RetryPolicy::default())
    }

    #[test]
    fn enqueue_is_deduplicated_per_invoice() {
        let queue = InMemorySubmissionQueue::new();
        let invoice = InvoiceId::generate();

        let first = queue.enqueue(task(invoice)).unwrap();
        let second = queue.enqueue(task(invoice)).unwrap();

        assert!(matches!(first, EnqueueOutcome::Enqueued(_)));
        assert_eq!(second, EnqueueOutcome::AlreadyQueued(first.task_id()));
        assert_eq!(queue.stats().unwrap().pending, 1);
    }

    #[test]
    fn terminal_tasks_do_not_block_a_new_enqueue() {
        let queue = InMemorySubmissionQueue::new();
        let invoice = InvoiceId::generate();
        queue.enqueue(task(invoice)).unwrap();

        let mut claimed = queue.claim_next().unwrap().unwrap();
        claimed.mark_completed(Utc::now());
        queue.update(&claimed).unwrap();

        let again = queue.enqueue(task(invoice)).unwrap();
        assert!(matches!(again, EnqueueOutcome::Enqueued(_)));
    }

    #[test]
    fn claim_marks_running_and_skips_backoff() {
        let queue = InMemorySubmissionQueue::new();
        queue.enqueue(task(InvoiceId::generate())).unwrap();

        let mut claimed = queue.claim_next().unwrap().unwrap();
        assert_eq!(claimed.status, TaskStatus::Running);
        assert_eq!(claimed.attempt, 1);
        assert!(queue.claim_next().unwrap().is_none());

        claimed.mark_failed("timeout".to_string(), Utc::now(), true);
        queue.update(&claimed).unwrap();
        assert!(queue.claim_next().unwrap().is_none());

        // Skip backoff for test
        claimed.scheduled_at = None;
        queue.update(&claimed).unwrap();
        let again = queue.claim_next().unwrap().unwrap();
        assert_eq!(again.attempt, 2);
    }

    #[test]
    fn failed_tasks_can_be_listed_and_requeued() {
        let queue = InMemorySubmissionQueue::new();
        let invoice = InvoiceId::generate();
        queue.enqueue(task(invoice)).unwrap();

        let mut claimed = queue.claim_next().unwrap().unwrap();
        claimed.mark_failed("fault".to_string(), Utc::now(), false);
        queue.update(&claimed).unwrap();

        let failed = queue.list_failed(10).unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].invoice_id, invoice);

        let requeued = queue.requeue_failed(claimed.id).unwrap();
        assert_eq!(requeued.status, TaskStatus::Pending);
        assert_eq!(requeued.attempt, 0);
        assert!(queue.list_failed(10).unwrap().is_empty());
        assert_eq!(
            queue.requeue_failed(claimed.id).unwrap_err(),
            StoreError::TaskNotFailed(claimed.id)
        );
    }

    #[test]
    fn update_of_unknown_task_fails() {
        let queue = InMemorySubmissionQueue::new();
        let t = task(InvoiceId::generate());
        assert_eq!(queue.update(&t).unwrap_err(), StoreError::TaskNotFound(t.id));
    }
}
