// Ingest crate clippy configuration
// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Paygate Ingestion Module
//!
//! The webhook ingestion and reconciliation pipeline: receives asynchronous
//! payment notifications, authenticates them, deduplicates them, maps them
//! to financial-ledger mutations, and applies those mutations with retry and
//! idempotency guarantees.
//!
//! ## Pipeline
//!
//! - **Signature verification**: HMAC-SHA256 over the raw body, constant-time
//!   compare, replay-window freshness check
//! - **Normalization**: two provider envelope schemas resolved into one
//!   canonical event type
//! - **Idempotency ledger**: TTL cache (optionally Redis-backed) fronting the
//!   durable event log
//! - **Action planning**: deterministic status → side-effect mapping
//! - **Reconciliation**: best-effort action execution against the external
//!   ledger store, retried with exponential backoff by the caller

pub mod error;
pub mod event;
pub mod executor;
pub mod idempotency;
pub mod ledger;
pub mod planner;
pub mod signature;

#[cfg(test)]
mod edge_case_tests;

// Error
pub use error::{IngestError, IngestResult};

// Event
pub use event::{normalize, CanonicalEvent, EventMetadata, EventStatus, TransactionType};

// Executor
pub use executor::{
    retry_with_backoff, ActionResult, ExecutionReport, ReconciliationExecutor, RETRY_ATTEMPTS,
};

// Idempotency
pub use idempotency::{IdempotencyLedger, Outcome, CACHE_TTL};

// Ledger
pub use ledger::{
    AuditRecord, LedgerClient, LedgerEntry, LedgerPatch, LedgerStatus, NewLedgerEntry,
};

// Planner
pub use planner::{plan, Action};

// Signature
pub use signature::{is_fresh, verify, REPLAY_WINDOW};

/// Main ingestion service that combines the pipeline stages
#[derive(Clone)]
pub struct IngestService {
    pub idempotency: IdempotencyLedger,
    pub executor: ReconciliationExecutor,
}

impl IngestService {
    /// Create the service from its collaborators. The Redis connection is
    /// optional; without it the idempotency cache is process-local only.
    pub fn new(
        ledger: LedgerClient,
        redis: Option<redis::aio::ConnectionManager>,
        fallback_agency_id: impl Into<String>,
    ) -> Self {
        Self {
            idempotency: IdempotencyLedger::new(ledger.clone(), redis),
            executor: ReconciliationExecutor::new(ledger, fallback_agency_id),
        }
    }
}
