//! Invoicing domain module.
//!
//! This crate contains business rules for electronic invoices, implemented
//! purely as deterministic domain logic (no IO, no HTTP, no storage):
//!
//! - [`lifecycle`]: invoice statuses and the per-family transition tables
//! - [`fiscal`]: the exact decimal computation of line and document totals
//! - [`party`]: sender/receiver parties and their typed identifiers
//! - [`invoice`]: the `Invoice` aggregate tying the three together

pub mod fiscal;
pub mod invoice;
pub mod lifecycle;
pub mod party;

pub use fiscal::{
    DocumentTotals, FiscalConfig, FiscalEngine, FiscalError, LineAmounts, LineInput, TaxGroup,
    TaxType,
};
pub use invoice::{
    BillingPeriod, DocumentType, Invoice, InvoiceError, InvoiceId, InvoiceLine, InvoiceLineInput,
    InvoiceTax, InvoiceTotals, NewInvoice,
};
pub use lifecycle::{
    DocumentFamily, InvalidTransition, InvoiceStatus, TransitionTable, can_transition, transition,
};
pub use party::{IdentifierKind, Party, PartyIdentifier};
