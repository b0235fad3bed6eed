//! Submission-layer errors and their retry classification.

use std::sync::PoisonError;

use thiserror::Error;

use fatoora_core::DomainError;
use fatoora_invoicing::{InvoiceError, InvoiceId, InvoiceStatus};

use crate::collaborators::{BuildError, GatewayError, SigningError};
use crate::task::TaskId;

/// Persistence failure (repository, log or queue).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("invoice not found: {0}")]
    InvoiceNotFound(InvoiceId),

    #[error("task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("task {0} is not in a failed state")]
    TaskNotFailed(TaskId),

    #[error("version conflict: {0}")]
    Conflict(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl From<DomainError> for StoreError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Conflict(msg) => StoreError::Conflict(msg),
            other => StoreError::Storage(other.to_string()),
        }
    }
}

impl<T> From<PoisonError<T>> for StoreError {
    fn from(_: PoisonError<T>) -> Self {
        StoreError::Storage("lock poisoned".to_string())
    }
}

/// Anything that can stop a submission attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmissionError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Invoice(#[from] InvoiceError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Signing(#[from] SigningError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("invoice in status {0} cannot be submitted")]
    NotSubmittable(InvoiceStatus),
}

impl SubmissionError {
    /// Only transient gateway failures are retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SubmissionError::Gateway(GatewayError::Failure { .. }))
    }

    /// Short machine-readable code recorded in the submission log.
    pub fn code(&self) -> String {
        match self {
            SubmissionError::Store(StoreError::Conflict(_)) => "version_conflict".to_string(),
            SubmissionError::Store(_) => "store_error".to_string(),
            SubmissionError::Invoice(InvoiceError::InvalidTransition(_)) => {
                "invalid_transition".to_string()
            }
            SubmissionError::Invoice(_) => "invoice_error".to_string(),
            SubmissionError::Build(_) => "build_error".to_string(),
            SubmissionError::Signing(_) => "signing_error".to_string(),
            SubmissionError::Gateway(GatewayError::Failure { .. }) => "gateway_failure".to_string(),
            SubmissionError::Gateway(GatewayError::Fault { code, .. }) => code.clone(),
            SubmissionError::NotSubmittable(_) => "not_submittable".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fatoora_invoicing::InvalidTransition;

    #[test]
    fn only_gateway_failures_are_retryable() {
        let failure = SubmissionError::from(GatewayError::failure("timeout"));
        assert!(failure.is_retryable());
        assert_eq!(failure.code(), "gateway_failure");

        let fault = SubmissionError::from(GatewayError::fault("E-42", "bad signature"));
        assert!(!fault.is_retryable());
        assert_eq!(fault.code(), "E-42");

        let invalid = SubmissionError::from(InvoiceError::from(InvalidTransition {
            from: InvoiceStatus::Draft,
            to: InvoiceStatus::Submitted,
        }));
        assert!(!invalid.is_retryable());
        assert_eq!(invalid.code(), "invalid_transition");

        assert!(!SubmissionError::from(SigningError::new("hsm offline")).is_retryable());
        assert!(!SubmissionError::from(BuildError::new("missing field")).is_retryable());
    }

    #[test]
    fn optimistic_conflicts_are_fatal() {
        let conflict = StoreError::from(DomainError::conflict("expected 3, found 4"));
        assert!(matches!(conflict, StoreError::Conflict(_)));
        let err = SubmissionError::from(conflict);
        assert!(!err.is_retryable());
        assert_eq!(err.code(), "version_conflict");
    }
}
