//! Append-only submission log.
//!
//! One entry per submission attempt. The trait has no update or delete: an
//! entry, once appended, is the permanent record of what was sent and what
//! came back.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;

use fatoora_core::EntryId;
use fatoora_invoicing::{InvoiceId, InvoiceStatus};

use crate::collaborators::GatewayReceipt;
use crate::error::StoreError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionLogEntry {
    pub id: EntryId,
    pub invoice_id: InvoiceId,
    /// Invoice revision the attempt was made for.
    pub revision: u32,
    pub attempt: u32,
    /// Signed document sent to the gateway, if the attempt got that far.
    pub request_payload: Option<Vec<u8>>,
    pub response_payload: Option<String>,
    /// Gateway reference, CEV and status, present once the gateway returned a receipt.
    pub gateway_ref: Option<String>,
    pub cev_content: Option<String>,
    pub gateway_status: Option<String>,
    /// Invoice status once the attempt finished; `None` if it could not be loaded.
    pub resulting_status: Option<InvoiceStatus>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl SubmissionLogEntry {
    pub fn succeeded(&self) -> bool {
        self.error_code.is_none()
    }

    /// The receipt the gateway returned for this attempt, whatever happened after.
    pub fn receipt(&self) -> Option<GatewayReceipt> {
        let (Some(gateway_ref), Some(cev), Some(status)) =
            (&self.gateway_ref, &self.cev_content, &self.gateway_status)
        else {
            return None;
        };
        let receipt = GatewayReceipt::new(gateway_ref.as_str(), cev.as_str(), status.as_str());
        Some(match &self.response_payload {
            Some(body) => receipt.with_raw_response(body.as_str()),
            None => receipt,
        })
    }
}

pub trait SubmissionLog: Send + Sync {
    fn append(&self, entry: SubmissionLogEntry) -> Result<(), StoreError>;

    /// Entries for an invoice in append order.
    fn history(&self, invoice_id: InvoiceId) -> Result<Vec<SubmissionLogEntry>, StoreError>;

    fn count(&self, invoice_id: InvoiceId) -> Result<usize, StoreError> {
        Ok(self.history(invoice_id)?.len())
    }
}

#[derive(Debug, Default)]
pub struct InMemorySubmissionLog {
    entries: RwLock<HashMap<InvoiceId, Vec<SubmissionLogEntry>>>,
}

impl InMemorySubmissionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl SubmissionLog for InMemorySubmissionLog {
    fn append(&self, entry: SubmissionLogEntry) -> Result<(), StoreError> {
        let mut entries = self.entries.write()?;
        let stream = entries.entry(entry.invoice_id).or_default();
        if stream.iter().any(|e| e.id == entry.id) {
            return Err(StoreError::Conflict(format!(
                "log entry {} already appended",
                entry.id
            )));
        }
        stream.push(entry);
        Ok(())
    }

    fn history(&self, invoice_id: InvoiceId) -> Result<Vec<SubmissionLogEntry>, StoreError> {
        Ok(self
            .entries
            .read()?
            .get(&invoice_id)
            .cloned()
            .unwrap_or_default())
    }
}
