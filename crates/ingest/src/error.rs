//! Error types for the ingestion pipeline

use thiserror::Error;

/// Errors produced by the ingestion pipeline
#[derive(Debug, Error)]
pub enum IngestError {
    /// The webhook payload could not be normalized into a canonical event
    #[error("Invalid event structure: {0}")]
    InvalidPayload(String),

    /// The external ledger store rejected a call or was unreachable
    #[error("Ledger store error: {0}")]
    Store(String),

    /// Reconciliation did not fully apply after all retry attempts
    #[error("Reconciliation failed for event {event_id}: {failed_actions} action(s) failed")]
    ReconciliationFailed {
        event_id: String,
        failed_actions: usize,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type IngestResult<T> = Result<T, IngestError>;
