//! The invoice aggregate.
//!
//! Lines can only be edited in `Draft`, and every edit recomputes the totals
//! through the fiscal engine. Lifecycle steps take `&self` and return the next
//! invoice, so a rejected step leaves the caller's value untouched. Reopening a
//! rejected invoice starts a new revision with the signature and gateway
//! references cleared.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use fatoora_core::{AggregateId, AggregateRoot, DomainError, Money, Quantity, Rate};

use crate::fiscal::{FiscalEngine, FiscalError, LineAmounts, LineInput, TaxType};
use crate::lifecycle::{self, DocumentFamily, InvalidTransition, InvoiceStatus};
use crate::party::{IdentifierKind, Party};

/// Invoice identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvoiceId(pub AggregateId);

impl InvoiceId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }

    pub fn generate() -> Self {
        Self(AggregateId::new())
    }
}

impl core::fmt::Display for InvoiceId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Regulatory document type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    #[default]
    Invoice,
    CreditNote,
    FeeNote,
    PublicContractStatement,
    ExportInvoice,
    PurchaseOrder,
}

impl DocumentType {
    pub fn code(&self) -> &'static str {
        match self {
            DocumentType::Invoice => "I-11",
            DocumentType::CreditNote => "I-12",
            DocumentType::FeeNote => "I-13",
            DocumentType::PublicContractStatement => "I-14",
            DocumentType::ExportInvoice => "I-15",
            DocumentType::PurchaseOrder => "I-16",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "I-11" => Some(DocumentType::Invoice),
            "I-12" => Some(DocumentType::CreditNote),
            "I-13" => Some(DocumentType::FeeNote),
            "I-14" => Some(DocumentType::PublicContractStatement),
            "I-15" => Some(DocumentType::ExportInvoice),
            "I-16" => Some(DocumentType::PurchaseOrder),
            _ => None,
        }
    }
}

/// Line as entered by the user, before amounts are derived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceLineInput {
    /// `line_no` of the parent line, for sub-lines.
    pub parent_line: Option<u32>,
    pub item_code: String,
    pub description: String,
    pub quantity: Quantity,
    pub unit_price: Money,
    pub discount_rate: Rate,
    pub tax_type: TaxType,
    pub tax_rate: Rate,
    /// Snapshot of the item's "subject to stamp duty" flag.
    pub subject_to_stamp_duty: bool,
}

impl InvoiceLineInput {
    pub fn new(
        item_code: impl Into<String>,
        description: impl Into<String>,
        quantity: Quantity,
        unit_price: Money,
        tax_rate: Rate,
    ) -> Self {
        Self {
            parent_line: None,
            item_code: item_code.into(),
            description: description.into(),
            quantity,
            unit_price,
            discount_rate: Rate::ZERO,
            tax_type: TaxType::Vat,
            tax_rate,
            subject_to_stamp_duty: false,
        }
    }

    pub fn with_discount(mut self, rate: Rate) -> Self {
        self.discount_rate = rate;
        self
    }

    pub fn with_tax_type(mut self, tax_type: TaxType) -> Self {
        self.tax_type = tax_type;
        self
    }

    pub fn with_stamp_duty(mut self) -> Self {
        self.subject_to_stamp_duty = true;
        self
    }

    pub fn under(mut self, parent_line: u32) -> Self {
        self.parent_line = Some(parent_line);
        self
    }

    fn fiscal_input(&self) -> LineInput {
        LineInput {
            quantity: self.quantity,
            unit_price: self.unit_price,
            discount_rate: self.discount_rate,
            tax_type: self.tax_type,
            tax_rate: self.tax_rate,
            stamp_duty: self.subject_to_stamp_duty,
        }
    }
}

/// Invoice line with its derived amounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvoiceLine {
    pub line_no: u32,
    #[serde(flatten)]
    pub input: InvoiceLineInput,
    #[serde(flatten)]
    pub amounts: LineAmounts,
}

/// Aggregated tax row, one per distinct (tax type, rate).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvoiceTax {
    pub tax_type: TaxType,
    pub rate: Rate,
    pub taxable_amount: Money,
    pub tax_amount: Money,
}

/// Document-level totals. Always derived from the lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InvoiceTotals {
    pub total_gross: Money,
    pub total_discount: Money,
    pub total_ht: Money,
    pub total_tva: Money,
    pub stamp_duty: Money,
    pub total_ttc: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvoiceError {
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),

    #[error(transparent)]
    Fiscal(#[from] FiscalError),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("invoice lines cannot be edited in status {0}")]
    NotEditable(InvoiceStatus),

    #[error("signed document already present for revision {revision}")]
    SignatureAlreadyPresent { revision: u32 },

    #[error("invoice cannot be deleted in status {0}")]
    DeletionForbidden(InvoiceStatus),

    #[error("invoice has been deleted")]
    Deleted,
}

/// Service period an invoice covers (subscriptions, fee notes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingPeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Header fields of a new draft.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewInvoice {
    pub id: InvoiceId,
    pub number: String,
    pub document_type: DocumentType,
    pub family: DocumentFamily,
    pub sender: Party,
    pub receiver: Party,
    pub issue_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub billing_period: Option<BillingPeriod>,
}

/// Aggregate root: Invoice.
///
/// Every method that moves the invoice forward returns the *next* value and
/// leaves `self` untouched, so a failed step never leaves a half-applied
/// invoice behind. Line edits are only possible in `Draft` and recompute all
/// derived amounts before anything is replaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Invoice {
    id: InvoiceId,
    number: String,
    document_type: DocumentType,
    family: DocumentFamily,
    sender: Party,
    receiver: Party,
    issue_date: NaiveDate,
    due_date: Option<NaiveDate>,
    billing_period: Option<BillingPeriod>,
    status: InvoiceStatus,
    lines: Vec<InvoiceLine>,
    taxes: Vec<InvoiceTax>,
    totals: InvoiceTotals,
    /// Bumped each time a rejected invoice is reopened.
    revision: u32,
    #[serde(skip)]
    signed_document: Option<Vec<u8>>,
    gateway_ref: Option<String>,
    cev_content: Option<String>,
    submitted_at: Option<DateTime<Utc>>,
    accepted_at: Option<DateTime<Utc>>,
    rejected_at: Option<DateTime<Utc>>,
    rejection_reason: Option<String>,
    deleted_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(skip)]
    version: u64,
}

impl Invoice {
    /// A new, empty draft.
    pub fn draft(header: NewInvoice, at: DateTime<Utc>) -> Self {
        Self {
            id: header.id,
            number: header.number,
            document_type: header.document_type,
            family: header.family,
            sender: header.sender,
            receiver: header.receiver,
            issue_date: header.issue_date,
            due_date: header.due_date,
            billing_period: header.billing_period,
            status: InvoiceStatus::Draft,
            lines: Vec::new(),
            taxes: Vec::new(),
            totals: InvoiceTotals::default(),
            revision: 1,
            signed_document: None,
            gateway_ref: None,
            cev_content: None,
            submitted_at: None,
            accepted_at: None,
            rejected_at: None,
            rejection_reason: None,
            deleted_at: None,
            created_at: at,
            updated_at: at,
            version: 0,
        }
    }

    pub fn number(&self) -> &str {
        &self.number
    }

    pub fn document_type(&self) -> DocumentType {
        self.document_type
    }

    pub fn family(&self) -> DocumentFamily {
        self.family
    }

    pub fn sender(&self) -> &Party {
        &self.sender
    }

    pub fn receiver(&self) -> &Party {
        &self.receiver
    }

    pub fn issue_date(&self) -> NaiveDate {
        self.issue_date
    }

    pub fn due_date(&self) -> Option<NaiveDate> {
        self.due_date
    }

    pub fn billing_period(&self) -> Option<BillingPeriod> {
        self.billing_period
    }

    pub fn status(&self) -> InvoiceStatus {
        self.status
    }

    pub fn lines(&self) -> &[InvoiceLine] {
        &self.lines
    }

    pub fn taxes(&self) -> &[InvoiceTax] {
        &self.taxes
    }

    pub fn totals(&self) -> &InvoiceTotals {
        &self.totals
    }

    pub fn revision(&self) -> u32 {
        self.revision
    }

    pub fn signed_document(&self) -> Option<&[u8]> {
        self.signed_document.as_deref()
    }

    pub fn gateway_ref(&self) -> Option<&str> {
        self.gateway_ref.as_deref()
    }

    pub fn cev_content(&self) -> Option<&str> {
        self.cev_content.as_deref()
    }

    pub fn submitted_at(&self) -> Option<DateTime<Utc>> {
        self.submitted_at
    }

    pub fn accepted_at(&self) -> Option<DateTime<Utc>> {
        self.accepted_at
    }

    pub fn rejected_at(&self) -> Option<DateTime<Utc>> {
        self.rejected_at
    }

    pub fn rejection_reason(&self) -> Option<&str> {
        self.rejection_reason.as_deref()
    }

    pub fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_editable(&self) -> bool {
        self.status == InvoiceStatus::Draft && !self.is_deleted()
    }

    /// Same invoice, persisted at `version`. Only repositories call this.
    pub fn at_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    pub(crate) fn with_status(mut self, status: InvoiceStatus, at: DateTime<Utc>) -> Self {
        self.status = status;
        self.updated_at = at;
        self
    }
}

impl AggregateRoot for Invoice {
    type Id = InvoiceId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

// Line editing (Draft only).
impl Invoice {
    fn ensure_live(&self) -> Result<(), InvoiceError> {
        if self.is_deleted() {
            return Err(InvoiceError::Deleted);
        }
        Ok(())
    }

    fn ensure_editable(&self) -> Result<(), InvoiceError> {
        self.ensure_live()?;
        if self.status != InvoiceStatus::Draft {
            return Err(InvoiceError::NotEditable(self.status));
        }
        Ok(())
    }

    pub fn add_line(
        &mut self,
        input: InvoiceLineInput,
        engine: &FiscalEngine,
        at: DateTime<Utc>,
    ) -> Result<u32, InvoiceError> {
        self.ensure_editable()?;
        let mut inputs: Vec<InvoiceLineInput> =
            self.lines.iter().map(|l| l.input.clone()).collect();
        inputs.push(input);
        self.set_lines(inputs, engine, at)?;
        Ok(self.lines.len() as u32)
    }

    /// Removes a line and its sub-lines; remaining lines are renumbered.
    pub fn remove_line(
        &mut self,
        line_no: u32,
        engine: &FiscalEngine,
        at: DateTime<Utc>,
    ) -> Result<(), InvoiceError> {
        self.ensure_editable()?;
        if !self.lines.iter().any(|l| l.line_no == line_no) {
            return Err(DomainError::not_found(format!("line {line_no}")).into());
        }

        let kept: Vec<&InvoiceLine> = self
            .lines
            .iter()
            .filter(|l| l.line_no != line_no && l.input.parent_line != Some(line_no))
            .collect();
        let renumbered: Vec<InvoiceLineInput> = kept
            .iter()
            .map(|l| {
                let mut input = l.input.clone();
                input.parent_line = input.parent_line.and_then(|parent| {
                    kept.iter()
                        .position(|k| k.line_no == parent)
                        .map(|idx| idx as u32 + 1)
                });
                input
            })
            .collect();
        self.set_lines(renumbered, engine, at)
    }

    /// Replaces every line. Line numbers are assigned from 1 in input order;
    /// `parent_line` must reference an earlier top-level line.
    pub fn set_lines(
        &mut self,
        inputs: Vec<InvoiceLineInput>,
        engine: &FiscalEngine,
        at: DateTime<Utc>,
    ) -> Result<(), InvoiceError> {
        self.ensure_editable()?;

        for (idx, input) in inputs.iter().enumerate() {
            let line_no = idx as u32 + 1;
            if input.quantity.is_zero() {
                return Err(DomainError::validation(format!(
                    "line {line_no}: quantity must be positive"
                ))
                .into());
            }
            if let Some(parent) = input.parent_line {
                if parent == 0 || parent >= line_no {
                    return Err(DomainError::validation(format!(
                        "line {line_no}: parent line {parent} must precede it"
                    ))
                    .into());
                }
                if inputs[(parent - 1) as usize].parent_line.is_some() {
                    return Err(DomainError::validation(format!(
                        "line {line_no}: sub-lines cannot have sub-lines"
                    ))
                    .into());
                }
            }
        }

        let fiscal_inputs: Vec<LineInput> = inputs.iter().map(|i| i.fiscal_input()).collect();
        let computed = engine.compute(&fiscal_inputs)?;

        self.lines = inputs
            .into_iter()
            .zip(computed.lines)
            .enumerate()
            .map(|(idx, (input, amounts))| InvoiceLine {
                line_no: idx as u32 + 1,
                input,
                amounts,
            })
            .collect();
        self.taxes = computed
            .taxes
            .into_iter()
            .map(|g| InvoiceTax {
                tax_type: g.tax_type,
                rate: g.rate,
                taxable_amount: g.taxable_amount,
                tax_amount: g.tax_amount,
            })
            .collect();
        self.totals = InvoiceTotals {
            total_gross: computed.total_gross,
            total_discount: computed.total_discount,
            total_ht: computed.total_ht,
            total_tva: computed.total_tva,
            stamp_duty: computed.stamp_duty,
            total_ttc: computed.total_ttc,
        };
        self.updated_at = at;
        Ok(())
    }
}

// Lifecycle steps.
impl Invoice {
    fn check_ready_for_validation(&self) -> Result<(), DomainError> {
        if self.number.trim().is_empty() {
            return Err(DomainError::validation("invoice number is required"));
        }
        if self.lines.is_empty() {
            return Err(DomainError::validation("cannot validate invoice without lines"));
        }
        if self.sender.identifier.kind() != IdentifierKind::TaxRegistration {
            return Err(DomainError::validation(
                "sender must be identified by its tax registration number",
            ));
        }
        self.sender.identifier.validate()?;
        self.receiver.identifier.validate()?;
        if let Some(due) = self.due_date {
            if due < self.issue_date {
                return Err(DomainError::validation("due date precedes issue date"));
            }
        }
        if let Some(period) = self.billing_period {
            if period.end < period.start {
                return Err(DomainError::validation("billing period ends before it starts"));
            }
        }
        Ok(())
    }

    /// Draft → Validated.
    pub fn validated(&self, at: DateTime<Utc>) -> Result<Invoice, InvoiceError> {
        self.ensure_live()?;
        self.family.table().check(self.status, InvoiceStatus::Validated)?;
        self.check_ready_for_validation()?;
        Ok(lifecycle::transition(self, InvoiceStatus::Validated, at)?)
    }

    /// Validated → Draft.
    pub fn unvalidated(&self, at: DateTime<Utc>) -> Result<Invoice, InvoiceError> {
        self.ensure_live()?;
        if self.status != InvoiceStatus::Validated {
            return Err(InvalidTransition {
                from: self.status,
                to: InvoiceStatus::Draft,
            }
            .into());
        }
        Ok(lifecycle::transition(self, InvoiceStatus::Draft, at)?)
    }

    /// Validated → Signed, storing the signed document.
    ///
    /// The signed document of a revision is written once and never replaced.
    pub fn signed(&self, document: Vec<u8>, at: DateTime<Utc>) -> Result<Invoice, InvoiceError> {
        self.ensure_live()?;
        if self.signed_document.is_some() {
            return Err(InvoiceError::SignatureAlreadyPresent {
                revision: self.revision,
            });
        }
        let mut next = lifecycle::transition(self, InvoiceStatus::Signed, at)?;
        next.signed_document = Some(document);
        Ok(next)
    }

    /// Signed → Submitted, recording the gateway's references.
    pub fn submitted(
        &self,
        gateway_ref: impl Into<String>,
        cev_content: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Result<Invoice, InvoiceError> {
        self.ensure_live()?;
        if self.signed_document.is_none() {
            return Err(DomainError::invariant("cannot submit an unsigned invoice").into());
        }
        let mut next = lifecycle::transition(self, InvoiceStatus::Submitted, at)?;
        next.gateway_ref = Some(gateway_ref.into());
        next.cev_content = Some(cev_content.into());
        next.submitted_at = Some(at);
        Ok(next)
    }

    /// Submitted → Accepted.
    pub fn accepted(&self, at: DateTime<Utc>) -> Result<Invoice, InvoiceError> {
        self.ensure_live()?;
        let mut next = lifecycle::transition(self, InvoiceStatus::Accepted, at)?;
        next.accepted_at = Some(at);
        Ok(next)
    }

    /// Submitted → Rejected.
    pub fn rejected(
        &self,
        reason: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Result<Invoice, InvoiceError> {
        self.ensure_live()?;
        let mut next = lifecycle::transition(self, InvoiceStatus::Rejected, at)?;
        next.rejected_at = Some(at);
        next.rejection_reason = Some(reason.into());
        Ok(next)
    }

    /// Rejected → Draft as a new revision.
    ///
    /// The previous revision's signature and gateway references are dropped
    /// from the aggregate; the submission log keeps what was sent.
    pub fn reopened(&self, at: DateTime<Utc>) -> Result<Invoice, InvoiceError> {
        self.ensure_live()?;
        if self.status != InvoiceStatus::Rejected {
            return Err(InvalidTransition {
                from: self.status,
                to: InvoiceStatus::Draft,
            }
            .into());
        }
        let mut next = lifecycle::transition(self, InvoiceStatus::Draft, at)?;
        next.revision += 1;
        next.signed_document = None;
        next.gateway_ref = None;
        next.cev_content = None;
        next.submitted_at = None;
        next.accepted_at = None;
        Ok(next)
    }

    /// Accepted → Archived (legacy family only).
    pub fn archived(&self, at: DateTime<Utc>) -> Result<Invoice, InvoiceError> {
        self.ensure_live()?;
        Ok(lifecycle::transition(self, InvoiceStatus::Archived, at)?)
    }

    /// Soft delete. Forbidden once the gateway has seen the invoice.
    pub fn soft_deleted(&self, at: DateTime<Utc>) -> Result<Invoice, InvoiceError> {
        self.ensure_live()?;
        if self.status.is_submitted_or_beyond() {
            return Err(InvoiceError::DeletionForbidden(self.status));
        }
        let mut next = self.clone();
        next.deleted_at = Some(at);
        next.updated_at = at;
        Ok(next)
    }
}
