//! Invoice lifecycle: statuses and the legal transition tables.
//!
//! The rules are data, not code paths: each [`DocumentFamily`] owns one
//! [`TransitionTable`] mapping a current status to the set of statuses it may
//! move to. Every status change on an [`Invoice`] goes through [`transition`],
//! which checks the invoice's table before producing the next value.
//!
//! ```text
//! current family                      legacy family adds
//!
//! Draft ──► Validated ──► Signed      Submitted ──► Submitted
//!   ▲          │            │         Accepted  ──► Archived (terminal)
//!   └──────────┘            ▼
//!   ▲                   Submitted ──► Accepted (terminal)
//!   │                       │
//!   └────── Rejected ◄──────┘
//! ```

use core::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::invoice::Invoice;

/// Invoice status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Draft,
    Validated,
    Signed,
    Submitted,
    Accepted,
    Rejected,
    /// Only reachable in the legacy family.
    Archived,
}

impl InvoiceStatus {
    pub const ALL: [InvoiceStatus; 7] = [
        InvoiceStatus::Draft,
        InvoiceStatus::Validated,
        InvoiceStatus::Signed,
        InvoiceStatus::Submitted,
        InvoiceStatus::Accepted,
        InvoiceStatus::Rejected,
        InvoiceStatus::Archived,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Validated => "validated",
            InvoiceStatus::Signed => "signed",
            InvoiceStatus::Submitted => "submitted",
            InvoiceStatus::Accepted => "accepted",
            InvoiceStatus::Rejected => "rejected",
            InvoiceStatus::Archived => "archived",
        }
    }

    /// The gateway has seen this invoice (or it has been retired since).
    pub fn is_submitted_or_beyond(&self) -> bool {
        matches!(
            self,
            InvoiceStatus::Submitted
                | InvoiceStatus::Accepted
                | InvoiceStatus::Rejected
                | InvoiceStatus::Archived
        )
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Illegal status change. Nothing was mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid transition from {from} to {to}")]
pub struct InvalidTransition {
    pub from: InvoiceStatus,
    pub to: InvoiceStatus,
}

/// Document family an invoice belongs to; selects its transition table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFamily {
    /// Invoices issued by this system.
    #[default]
    Current,
    /// Records imported from the previous system.
    Legacy,
}

impl DocumentFamily {
    pub fn table(&self) -> TransitionTable {
        match self {
            DocumentFamily::Current => TransitionTable::CURRENT,
            DocumentFamily::Legacy => TransitionTable::LEGACY,
        }
    }
}

type Row = (InvoiceStatus, &'static [InvoiceStatus]);

/// Map from current status to the statuses it may move to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionTable {
    family: DocumentFamily,
    rows: &'static [Row],
}

impl TransitionTable {
    pub const CURRENT: TransitionTable = TransitionTable {
        family: DocumentFamily::Current,
        rows: &[
            (InvoiceStatus::Draft, &[InvoiceStatus::Validated]),
            (
                InvoiceStatus::Validated,
                &[InvoiceStatus::Signed, InvoiceStatus::Draft],
            ),
            (InvoiceStatus::Signed, &[InvoiceStatus::Submitted]),
            (
                InvoiceStatus::Submitted,
                &[InvoiceStatus::Accepted, InvoiceStatus::Rejected],
            ),
            (InvoiceStatus::Accepted, &[]),
            (InvoiceStatus::Rejected, &[InvoiceStatus::Draft]),
        ],
    };

    pub const LEGACY: TransitionTable = TransitionTable {
        family: DocumentFamily::Legacy,
        rows: &[
            (InvoiceStatus::Draft, &[InvoiceStatus::Validated]),
            (
                InvoiceStatus::Validated,
                &[InvoiceStatus::Signed, InvoiceStatus::Draft],
            ),
            (InvoiceStatus::Signed, &[InvoiceStatus::Submitted]),
            (
                InvoiceStatus::Submitted,
                &[
                    InvoiceStatus::Submitted,
                    InvoiceStatus::Accepted,
                    InvoiceStatus::Rejected,
                ],
            ),
            (InvoiceStatus::Accepted, &[InvoiceStatus::Archived]),
            (InvoiceStatus::Rejected, &[InvoiceStatus::Draft]),
            (InvoiceStatus::Archived, &[]),
        ],
    };

    pub fn family(&self) -> DocumentFamily {
        self.family
    }

    /// Statuses reachable in one step from `from`. Empty for terminal and
    /// unknown statuses.
    pub fn allowed_from(&self, from: InvoiceStatus) -> &'static [InvoiceStatus] {
        self.rows
            .iter()
            .find(|(status, _)| *status == from)
            .map(|(_, targets)| *targets)
            .unwrap_or(&[])
    }

    pub fn permits(&self, from: InvoiceStatus, to: InvoiceStatus) -> bool {
        self.allowed_from(from).contains(&to)
    }

    pub fn is_terminal(&self, status: InvoiceStatus) -> bool {
        self.allowed_from(status).is_empty()
    }

    pub fn check(&self, from: InvoiceStatus, to: InvoiceStatus) -> Result<(), InvalidTransition> {
        if self.permits(from, to) {
            Ok(())
        } else {
            Err(InvalidTransition { from, to })
        }
    }
}

pub fn can_transition(family: DocumentFamily, current: InvoiceStatus, target: InvoiceStatus) -> bool {
    family.table().permits(current, target)
}

/// Next value of `invoice` with `target` as its status.
///
/// Only the status and `updated_at` change; callers layer the data belonging to
/// the step (signature, gateway references) on the returned value.
pub fn transition(
    invoice: &Invoice,
    target: InvoiceStatus,
    at: DateTime<Utc>,
) -> Result<Invoice, InvalidTransition> {
    invoice
        .family()
        .table()
        .check(invoice.status(), target)?;
    Ok(invoice.clone().with_status(target, at))
}
