//! Contracts of the external pieces the orchestrator drives.
//!
//! The regulatory document format, the signature primitive and the gateway
//! wire protocol all live behind these traits.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use fatoora_invoicing::Invoice;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("document build failed: {0}")]
pub struct BuildError(pub String);

impl BuildError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("signing failed: {0}")]
pub struct SigningError(pub String);

impl SigningError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Gateway call outcome other than a receipt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// Transient: network, timeout, gateway unavailable. Retried.
    #[error("gateway unavailable: {message}")]
    Failure { message: String },

    /// Permanent: the gateway refused the document. Never retried.
    #[error("gateway rejected the document ({code}): {message}")]
    Fault { code: String, message: String },
}

impl GatewayError {
    pub fn failure(message: impl Into<String>) -> Self {
        Self::Failure {
            message: message.into(),
        }
    }

    pub fn fault(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Fault {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// What the gateway returns for an accepted submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayReceipt {
    pub gateway_ref: String,
    /// Verification content issued by the gateway (CEV).
    pub cev_content: String,
    /// Gateway-side status, compared against the configured acceptance statuses.
    pub status: String,
    /// Raw response body, kept for the submission log.
    pub raw_response: Option<String>,
}

impl GatewayReceipt {
    pub fn new(
        gateway_ref: impl Into<String>,
        cev_content: impl Into<String>,
        status: impl Into<String>,
    ) -> Self {
        Self {
            gateway_ref: gateway_ref.into(),
            cev_content: cev_content.into(),
            status: status.into(),
            raw_response: None,
        }
    }

    pub fn with_raw_response(mut self, body: impl Into<String>) -> Self {
        self.raw_response = Some(body.into());
        self
    }
}

/// Turns an invoice into its unsigned regulatory document.
#[async_trait]
pub trait DocumentBuilder: Send + Sync {
    async fn build(&self, invoice: &Invoice) -> Result<Vec<u8>, BuildError>;
}

/// Wraps a document in a signed envelope.
#[async_trait]
pub trait DocumentSigner: Send + Sync {
    async fn sign(&self, document: &[u8]) -> Result<Vec<u8>, SigningError>;
}

/// Tax-authority gateway.
#[async_trait]
pub trait GatewayClient: Send + Sync {
    async fn submit(&self, invoice: &Invoice, signed: &[u8]) -> Result<GatewayReceipt, GatewayError>;
}
