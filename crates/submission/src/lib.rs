//! Asynchronous, retrying submission of signed invoices to the tax gateway.
//!
//! ## Components
//!
//! - [`SubmissionOrchestrator`]: one attempt for one invoice (build, sign,
//!   submit), idempotent on re-entry
//! - [`SubmissionQueue`]: task records carrying the attempt counter and
//!   backoff schedule, deduplicated per invoice
//! - [`WorkerPool`]: tokio workers claiming tasks and applying the retry policy
//! - [`SubmissionLog`]: append-only record of every attempt
//! - [`SubmissionService`]: validation, enqueueing, manual dispositions and
//!   queue administration
//!
//! Storage sits behind traits; the in-memory implementations here back the
//! tests and local runs.

pub mod collaborators;
pub mod config;
pub mod error;
pub mod log;
pub mod orchestrator;
pub mod queue;
pub mod repository;
pub mod service;
pub mod task;
pub mod worker;

pub use collaborators::{
    BuildError, DocumentBuilder, DocumentSigner, GatewayClient, GatewayError, GatewayReceipt,
    SigningError,
};
pub use config::{MAX_BACKOFF, SubmissionConfig, WorkerPoolConfig};
pub use error::{StoreError, SubmissionError};
pub use log::{InMemorySubmissionLog, SubmissionLog, SubmissionLogEntry};
pub use orchestrator::{SubmissionOrchestrator, SubmissionOutcome};
pub use queue::{EnqueueOutcome, InMemorySubmissionQueue, QueueStats, SubmissionQueue};
pub use repository::{InMemoryInvoiceRepository, InvoiceRepository};
pub use service::SubmissionService;
pub use task::{RetryPolicy, SubmissionTask, TaskAttemptRecord, TaskId, TaskStatus};
pub use worker::{PoolStats, WorkerPool, WorkerPoolHandle};
