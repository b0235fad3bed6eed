//! Sender and receiver parties with typed identifiers.

use core::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use fatoora_core::{DomainError, DomainResult};

static TAX_REGISTRATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{7}[A-HJ-NP-TV-Z][ABDNP][CMNPE][0-9]{3}$").unwrap());
static NATIONAL_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[0-9]{8}$").unwrap());
static RESIDENCE_CARD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[0-9]{9}$").unwrap());
static OTHER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[[:print:]]{1,35}$").unwrap());

/// Kind of identifier a party is registered under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierKind {
    /// Tax registration number (`1234567A/B/M/000`).
    TaxRegistration,
    /// National identity card, 8 digits.
    NationalId,
    /// Residence card, 9 digits.
    ResidenceCard,
    /// Anything else (foreign identifiers).
    Other,
}

impl IdentifierKind {
    pub fn code(&self) -> &'static str {
        match self {
            IdentifierKind::TaxRegistration => "I-01",
            IdentifierKind::NationalId => "I-02",
            IdentifierKind::ResidenceCard => "I-03",
            IdentifierKind::Other => "I-04",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "I-01" => Some(IdentifierKind::TaxRegistration),
            "I-02" => Some(IdentifierKind::NationalId),
            "I-03" => Some(IdentifierKind::ResidenceCard),
            "I-04" => Some(IdentifierKind::Other),
            _ => None,
        }
    }

    fn pattern(&self) -> &'static Regex {
        match self {
            IdentifierKind::TaxRegistration => &TAX_REGISTRATION,
            IdentifierKind::NationalId => &NATIONAL_ID,
            IdentifierKind::ResidenceCard => &RESIDENCE_CARD,
            IdentifierKind::Other => &OTHER,
        }
    }

    /// Canonical form: tax registration numbers are commonly written with
    /// separators (`1234567/A/B/M/000`) and in lower case.
    fn normalize(&self, raw: &str) -> String {
        match self {
            IdentifierKind::TaxRegistration => raw
                .chars()
                .filter(|c| !matches!(c, '/' | ' ' | '-' | '.'))
                .flat_map(char::to_uppercase)
                .collect(),
            _ => raw.trim().to_string(),
        }
    }
}

/// Typed party identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartyIdentifier {
    kind: IdentifierKind,
    value: String,
}

impl PartyIdentifier {
    pub fn new(kind: IdentifierKind, value: impl AsRef<str>) -> DomainResult<Self> {
        let identifier = Self {
            kind,
            value: kind.normalize(value.as_ref()),
        };
        identifier.validate()?;
        Ok(identifier)
    }

    pub fn kind(&self) -> IdentifierKind {
        self.kind
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.kind.pattern().is_match(&self.value) {
            Ok(())
        } else {
            Err(DomainError::validation(format!(
                "identifier {:?} does not match the {} pattern",
                self.value,
                self.kind.code()
            )))
        }
    }
}

impl fmt::Display for PartyIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.code(), self.value)
    }
}

/// Invoice sender or receiver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Party {
    pub identifier: PartyIdentifier,
    pub name: String,
    pub address: Option<String>,
}

impl Party {
    pub fn new(identifier: PartyIdentifier, name: impl Into<String>) -> Self {
        Self {
            identifier,
            name: name.into(),
            address: None,
        }
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }
}
