//! Submission task records and the retry policy they carry.
//!
//! The attempt counter lives on the task, which lives in the queue, so a
//! worker restart resumes at the right attempt instead of starting over.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use fatoora_invoicing::InvoiceId;

/// Unique task identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Queued, waiting for a worker
    Pending,
    /// Claimed by a worker
    Running,
    /// Invoice reached the gateway (or already had)
    Completed,
    /// Transient failure; eligible again at `scheduled_at`
    RetryScheduled { error: String, attempt: u32 },
    /// Retries exhausted or fatal error; only a manual requeue revives it
    Failed { error: String, attempts: u32 },
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, TaskStatus::Failed { .. })
    }
}

/// Attempt cap plus an explicit delay schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, first one included.
    pub max_attempts: u32,
    pub backoff_schedule: Vec<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            3,
            vec![
                Duration::from_secs(30),
                Duration::from_secs(120),
                Duration::from_secs(300),
            ],
        )
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_schedule: Vec<Duration>) -> Self {
        Self {
            max_attempts,
            backoff_schedule,
        }
    }

    pub fn no_retry() -> Self {
        Self::new(1, Vec::new())
    }

    /// Delay after attempt `attempt` (1-indexed), clamped to the last entry.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let idx = (attempt as usize - 1).min(self.backoff_schedule.len().saturating_sub(1));
        self.backoff_schedule
            .get(idx)
            .copied()
            .unwrap_or(Duration::ZERO)
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

/// One entry per attempt, kept on the task for quick inspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskAttemptRecord {
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub success: bool,
    pub error: Option<String>,
}

/// Durable record driving one invoice through submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionTask {
    pub id: TaskId,
    pub invoice_id: InvoiceId,
    pub status: TaskStatus,
    pub retry_policy: RetryPolicy,
    /// Attempts started so far.
    pub attempt: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Not eligible before this instant.
    pub scheduled_at: Option<DateTime<Utc>>,
    pub history: Vec<TaskAttemptRecord>,
}

impl SubmissionTask {
    pub fn new(invoice_id: InvoiceId, retry_policy: RetryPolicy) -> Self {
        let now = Utc::now();
        Self {
            id: TaskId::new(),
            invoice_id,
            status: TaskStatus::Pending,
            retry_policy,
            attempt: 0,
            created_at: now,
            updated_at: now,
            scheduled_at: None,
            history: Vec::new(),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.retry_policy.max_attempts
    }

    /// Pending or waiting for a retry, and due.
    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        let waiting = matches!(
            self.status,
            TaskStatus::Pending | TaskStatus::RetryScheduled { .. }
        );
        waiting && self.scheduled_at.is_none_or(|at| now >= at)
    }

    pub fn mark_running(&mut self) {
        self.status = TaskStatus::Running;
        self.attempt += 1;
        self.updated_at = Utc::now();
    }

    pub fn mark_completed(&mut self, started_at: DateTime<Utc>) {
        let now = Utc::now();
        self.status = TaskStatus::Completed;
        self.scheduled_at = None;
        self.updated_at = now;
        self.history.push(TaskAttemptRecord {
            attempt: self.attempt,
            started_at,
            finished_at: now,
            success: true,
            error: None,
        });
    }

    /// Records a failed attempt. Retryable errors schedule the next attempt
    /// while attempts remain; everything else fails the task for good.
    pub fn mark_failed(&mut self, mut error: String, started_at: DateTime<Utc>, retryable: bool) {
        let now = Utc::now();
        self.updated_at = now;
        self.history.push(TaskAttemptRecord {
            attempt: self.attempt,
            started_at,
            finished_at: now,
            success: false,
            error: Some(error.clone()),
        });

        if retryable && self.retry_policy.should_retry(self.attempt) {
            let delay = self.retry_policy.delay_after(self.attempt);
            match retry_at(now, delay) {
                Some(at) => {
                    self.scheduled_at = Some(at);
                    self.status = TaskStatus::RetryScheduled {
                        error,
                        attempt: self.attempt,
                    };
                    return;
                }
                None => error = format!("{error} (backoff of {delay:?} is out of range)"),
            }
        }

        self.scheduled_at = None;
        self.status = TaskStatus::Failed {
            error,
            attempts: self.attempt,
        };
    }

    /// Back to a fresh pending task; used by manual requeue.
    pub fn reset(&mut self) {
        self.status = TaskStatus::Pending;
        self.attempt = 0;
        self.scheduled_at = None;
        self.updated_at = Utc::now();
        self.history.clear();
    }
}

/// `None` when `now + delay` does not fit a timestamp.
fn retry_at(now: DateTime<Utc>, delay: Duration) -> Option<DateTime<Utc>> {
    let delay = chrono::Duration::from_std(delay).ok()?;
    now.checked_add_signed(delay)
}
