//! Invoice persistence with optimistic concurrency.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use fatoora_core::{AggregateRoot, ExpectedVersion};
use fatoora_invoicing::{Invoice, InvoiceId};

use crate::error::StoreError;

/// Whole-aggregate load and save.
///
/// `save` writes the full invoice in one step when the stored version matches
/// `expected`, and returns the stored value carrying its new version.
pub trait InvoiceRepository: Send + Sync {
    fn load(&self, id: InvoiceId) -> Result<Invoice, StoreError>;

    fn save(&self, invoice: &Invoice, expected: ExpectedVersion) -> Result<Invoice, StoreError>;

    /// Saves `next` over `current`, expecting `current` to still be the stored version.
    fn replace(&self, current: &Invoice, next: &Invoice) -> Result<Invoice, StoreError> {
        self.save(next, ExpectedVersion::Exact(current.version()))
    }
}

#[derive(Debug, Default)]
pub struct InMemoryInvoiceRepository {
    invoices: RwLock<HashMap<InvoiceId, Invoice>>,
}

impl InMemoryInvoiceRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl InvoiceRepository for InMemoryInvoiceRepository {
    fn load(&self, id: InvoiceId) -> Result<Invoice, StoreError> {
        self.invoices
            .read()?
            .get(&id)
            .cloned()
            .ok_or(StoreError::InvoiceNotFound(id))
    }

    fn save(&self, invoice: &Invoice, expected: ExpectedVersion) -> Result<Invoice, StoreError> {
        let mut invoices = self.invoices.write()?;
        let id = *invoice.id();
        let actual = invoices.get(&id).map(|i| i.version()).unwrap_or(0);
        expected.check(actual)?;

        let stored = invoice.clone().at_version(actual + 1);
        invoices.insert(id, stored.clone());
        Ok(stored)
    }
}
