//! Drives one invoice through build → sign → submit.
//!
//! Re-entrant: an invoice that already carries a signed document is never
//! signed again, and one that already reached the gateway is left alone.
//! Each step loads the whole aggregate, computes the next value and writes it
//! back in one version-checked save, so a failure at any point leaves the last
//! successfully persisted state in place.
//!
//! A gateway receipt is never thrown away: it goes into the log entry even
//! when saving it fails, and the next attempt on the same revision applies
//! that receipt instead of submitting the document again.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use fatoora_core::{AggregateRoot, DomainError, EntryId};
use fatoora_invoicing::{Invoice, InvoiceError, InvoiceId, InvoiceStatus};

use crate::collaborators::{DocumentBuilder, DocumentSigner, GatewayClient, GatewayReceipt};
use crate::config::SubmissionConfig;
use crate::error::{StoreError, SubmissionError};
use crate::log::{SubmissionLog, SubmissionLogEntry};
use crate::repository::InvoiceRepository;

/// How a successful run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionOutcome {
    /// Gateway took the document; awaiting manual disposition.
    Submitted,
    /// Gateway took the document and reported an acceptance status.
    Accepted,
    /// Nothing to do: the invoice was already in this status.
    AlreadySubmitted(InvoiceStatus),
}

/// What an attempt got far enough to observe, for its log entry.
#[derive(Debug, Default)]
struct AttemptTrace {
    revision: u32,
    status: Option<InvoiceStatus>,
    request: Option<Vec<u8>>,
    receipt: Option<GatewayReceipt>,
}

pub struct SubmissionOrchestrator {
    invoices: Arc<dyn InvoiceRepository>,
    log: Arc<dyn SubmissionLog>,
    builder: Arc<dyn DocumentBuilder>,
    signer: Arc<dyn DocumentSigner>,
    gateway: Arc<dyn GatewayClient>,
    config: SubmissionConfig,
}

impl SubmissionOrchestrator {
    pub fn new(
        invoices: Arc<dyn InvoiceRepository>,
        log: Arc<dyn SubmissionLog>,
        builder: Arc<dyn DocumentBuilder>,
        signer: Arc<dyn DocumentSigner>,
        gateway: Arc<dyn GatewayClient>,
        config: SubmissionConfig,
    ) -> Self {
        Self {
            invoices,
            log,
            builder,
            signer,
            gateway,
            config,
        }
    }

    pub fn config(&self) -> &SubmissionConfig {
        &self.config
    }

    /// Runs attempt number `attempt` for `invoice_id`.
    ///
    /// Appends exactly one log entry unless the invoice had already been
    /// submitted, in which case nothing is attempted.
    pub async fn run(
        &self,
        invoice_id: InvoiceId,
        attempt: u32,
    ) -> Result<SubmissionOutcome, SubmissionError> {
        let started_at = Utc::now();
        let mut trace = AttemptTrace::default();
        let result = self.attempt(invoice_id, &mut trace).await;

        if let Ok(SubmissionOutcome::AlreadySubmitted(status)) = result {
            info!(%invoice_id, attempt, %status, "invoice already submitted, skipping");
            return result;
        }

        let entry = log_entry(invoice_id, attempt, started_at, trace, &result);
        self.log.append(entry)?;

        match &result {
            Ok(outcome) => {
                info!(%invoice_id, attempt, ?outcome, "invoice submitted");
            }
            Err(err) if err.is_retryable() => {
                warn!(%invoice_id, attempt, error = %err, "submission attempt failed");
            }
            Err(err) => {
                error!(
                    %invoice_id,
                    attempt,
                    error = %err,
                    code = %err.code(),
                    "submission failed with a non-retryable error"
                );
            }
        }
        result
    }

    async fn attempt(
        &self,
        invoice_id: InvoiceId,
        trace: &mut AttemptTrace,
    ) -> Result<SubmissionOutcome, SubmissionError> {
        let mut invoice = self.invoices.load(invoice_id)?;
        trace.revision = invoice.revision();
        trace.status = Some(invoice.status());

        match invoice.status() {
            InvoiceStatus::Submitted | InvoiceStatus::Accepted => {
                return Ok(SubmissionOutcome::AlreadySubmitted(invoice.status()));
            }
            InvoiceStatus::Validated | InvoiceStatus::Signed => {}
            other => return Err(SubmissionError::NotSubmittable(other)),
        }

        if invoice.signed_document().is_none() {
            invoice = self.sign(&invoice).await?;
            trace.status = Some(invoice.status());
        }

        let signed = invoice
            .signed_document()
            .ok_or_else(|| {
                InvoiceError::from(DomainError::invariant("signed invoice without document"))
            })?
            .to_vec();
        trace.request = Some(signed.clone());

        let receipt = match self.recorded_receipt(&invoice)? {
            Some(receipt) => {
                info!(
                    %invoice_id,
                    revision = invoice.revision(),
                    gateway_ref = %receipt.gateway_ref,
                    "reusing gateway receipt from an earlier attempt"
                );
                receipt
            }
            None => self.gateway.submit(&invoice, &signed).await?,
        };
        trace.receipt = Some(receipt.clone());

        let stored = self.record_receipt(invoice, &receipt)?;
        trace.status = Some(stored.status());

        Ok(if stored.status() == InvoiceStatus::Accepted {
            SubmissionOutcome::Accepted
        } else {
            SubmissionOutcome::Submitted
        })
    }

    /// Receipt logged for this revision by an attempt that failed to persist it.
    fn recorded_receipt(&self, invoice: &Invoice) -> Result<Option<GatewayReceipt>, SubmissionError> {
        Ok(self
            .log
            .history(*invoice.id())?
            .iter()
            .rev()
            .filter(|entry| entry.revision == invoice.revision())
            .find_map(SubmissionLogEntry::receipt))
    }

    /// Applies the receipt. After a version conflict the invoice is reloaded
    /// and the receipt applied once more, as long as it is still the same
    /// signed revision.
    fn record_receipt(
        &self,
        invoice: Invoice,
        receipt: &GatewayReceipt,
    ) -> Result<Invoice, SubmissionError> {
        let reason = match self.apply_receipt(&invoice, receipt) {
            Err(SubmissionError::Store(StoreError::Conflict(reason))) => reason,
            other => return other,
        };

        warn!(invoice_id = %invoice.id(), %reason, "invoice changed while submitting, re-applying receipt");
        let current = self.invoices.load(*invoice.id())?;
        match current.status() {
            InvoiceStatus::Submitted | InvoiceStatus::Accepted => Ok(current),
            InvoiceStatus::Signed if current.revision() == invoice.revision() => {
                self.apply_receipt(&current, receipt)
            }
            _ => Err(StoreError::Conflict(reason).into()),
        }
    }

    fn apply_receipt(
        &self,
        invoice: &Invoice,
        receipt: &GatewayReceipt,
    ) -> Result<Invoice, SubmissionError> {
        let now = Utc::now();
        let mut next = invoice.submitted(&receipt.gateway_ref, &receipt.cev_content, now)?;
        if self.config.is_accepted(&receipt.status) {
            next = next.accepted(now)?;
        }
        Ok(self.invoices.replace(invoice, &next)?)
    }

    async fn sign(&self, invoice: &Invoice) -> Result<Invoice, SubmissionError> {
        let unsigned = self.builder.build(invoice).await?;
        let signed = self.signer.sign(&unsigned).await?;
        let next = invoice.signed(signed, Utc::now())?;
        let stored = self.invoices.replace(invoice, &next)?;
        info!(invoice_id = %stored.id(), revision = stored.revision(), "invoice signed");
        Ok(stored)
    }
}

fn log_entry(
    invoice_id: InvoiceId,
    attempt: u32,
    started_at: DateTime<Utc>,
    trace: AttemptTrace,
    result: &Result<SubmissionOutcome, SubmissionError>,
) -> SubmissionLogEntry {
    let (error_code, error_message) = match result {
        Ok(_) => (None, None),
        Err(err) => (Some(err.code()), Some(err.to_string())),
    };
    let (gateway_ref, cev_content, gateway_status, response_payload) = match trace.receipt {
        Some(receipt) => (
            Some(receipt.gateway_ref),
            Some(receipt.cev_content),
            Some(receipt.status),
            receipt.raw_response,
        ),
        None => (None, None, None, None),
    };

    SubmissionLogEntry {
        id: EntryId::new(),
        invoice_id,
        revision: trace.revision,
        attempt,
        request_payload: trace.request,
        response_payload,
        gateway_ref,
        cev_content,
        gateway_status,
        resulting_status: trace.status,
        error_code,
        error_message,
        started_at,
        finished_at: Utc::now(),
    }
}
