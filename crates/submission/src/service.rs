//! Entry points used by the rest of the application.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, info};

use fatoora_core::AggregateRoot;
use fatoora_invoicing::{Invoice, InvoiceError, InvoiceId, InvoiceStatus};

use crate::config::SubmissionConfig;
use crate::error::SubmissionError;
use crate::log::{SubmissionLog, SubmissionLogEntry};
use crate::queue::{EnqueueOutcome, QueueStats, SubmissionQueue};
use crate::repository::InvoiceRepository;
use crate::task::{SubmissionTask, TaskId};

pub struct SubmissionService {
    invoices: Arc<dyn InvoiceRepository>,
    queue: Arc<dyn SubmissionQueue>,
    log: Arc<dyn SubmissionLog>,
    config: SubmissionConfig,
}

impl SubmissionService {
    pub fn new(
        invoices: Arc<dyn InvoiceRepository>,
        queue: Arc<dyn SubmissionQueue>,
        log: Arc<dyn SubmissionLog>,
        config: SubmissionConfig,
    ) -> Self {
        Self {
            invoices,
            queue,
            log,
            config,
        }
    }

    /// Loads, applies `step`, and saves in one version-checked write.
    fn apply<F>(&self, invoice_id: InvoiceId, step: F) -> Result<Invoice, SubmissionError>
    where
        F: FnOnce(&Invoice, DateTime<Utc>) -> Result<Invoice, InvoiceError>,
    {
        let current = self.invoices.load(invoice_id)?;
        let next = step(&current, Utc::now())?;
        let stored = self.invoices.replace(&current, &next)?;
        info!(
            %invoice_id,
            from = %current.status(),
            to = %stored.status(),
            version = stored.version(),
            "invoice updated"
        );
        Ok(stored)
    }

    /// Draft → Validated, then enqueues submission if configured to.
    ///
    /// The validation stands even if enqueueing fails; the failure is logged
    /// and `enqueue_submission` can be called again later.
    pub fn request_validation(&self, invoice_id: InvoiceId) -> Result<Invoice, SubmissionError> {
        let validated = self.apply(invoice_id, |invoice, now| invoice.validated(now))?;
        if self.config.enqueue_on_validation {
            if let Err(err) = self.enqueue_submission(invoice_id) {
                error!(%invoice_id, error = %err, "invoice validated but submission not enqueued");
            }
        }
        Ok(validated)
    }

    /// Enqueues the submission task for an invoice.
    ///
    /// Returns `None` when the invoice is already submitted or accepted. At
    /// most one live task exists per invoice, so repeated calls return the
    /// same task.
    pub fn enqueue_submission(
        &self,
        invoice_id: InvoiceId,
    ) -> Result<Option<TaskId>, SubmissionError> {
        let invoice = self.invoices.load(invoice_id)?;
        match invoice.status() {
            InvoiceStatus::Submitted | InvoiceStatus::Accepted => {
                info!(%invoice_id, status = %invoice.status(), "already submitted, not enqueued");
                return Ok(None);
            }
            InvoiceStatus::Validated | InvoiceStatus::Signed => {}
            other => return Err(SubmissionError::NotSubmittable(other)),
        }

        let task = SubmissionTask::new(invoice_id, self.config.retry_policy());
        let outcome = self.queue.enqueue(task)?;
        match outcome {
            EnqueueOutcome::Enqueued(task_id) => {
                info!(%invoice_id, %task_id, "submission enqueued");
            }
            EnqueueOutcome::AlreadyQueued(task_id) => {
                info!(%invoice_id, %task_id, "submission already queued");
            }
        }
        Ok(Some(outcome.task_id()))
    }

    pub fn submission_history(
        &self,
        invoice_id: InvoiceId,
    ) -> Result<Vec<SubmissionLogEntry>, SubmissionError> {
        Ok(self.log.history(invoice_id)?)
    }

    /// Submitted → Accepted.
    pub fn accept(&self, invoice_id: InvoiceId) -> Result<Invoice, SubmissionError> {
        self.apply(invoice_id, |invoice, now| invoice.accepted(now))
    }

    /// Submitted → Rejected.
    pub fn reject(
        &self,
        invoice_id: InvoiceId,
        reason: impl Into<String>,
    ) -> Result<Invoice, SubmissionError> {
        let reason = reason.into();
        self.apply(invoice_id, move |invoice, now| invoice.rejected(reason, now))
    }

    /// Rejected → Draft, as a new revision.
    pub fn reopen(&self, invoice_id: InvoiceId) -> Result<Invoice, SubmissionError> {
        self.apply(invoice_id, |invoice, now| invoice.reopened(now))
    }

    /// Accepted → Archived (legacy family).
    pub fn archive(&self, invoice_id: InvoiceId) -> Result<Invoice, SubmissionError> {
        self.apply(invoice_id, |invoice, now| invoice.archived(now))
    }

    pub fn soft_delete(&self, invoice_id: InvoiceId) -> Result<Invoice, SubmissionError> {
        self.apply(invoice_id, |invoice, now| invoice.soft_deleted(now))
    }

    pub fn failed_tasks(&self, limit: usize) -> Result<Vec<SubmissionTask>, SubmissionError> {
        Ok(self.queue.list_failed(limit)?)
    }

    /// Gives a permanently failed task a fresh attempt budget.
    pub fn requeue_failed(&self, task_id: TaskId) -> Result<SubmissionTask, SubmissionError> {
        let task = self.queue.requeue_failed(task_id)?;
        info!(%task_id, invoice_id = %task.invoice_id, "failed submission requeued");
        Ok(task)
    }

    pub fn queue_stats(&self) -> Result<QueueStats, SubmissionError> {
        Ok(self.queue.stats()?)
    }
}
