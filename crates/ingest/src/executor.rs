//! Reconciliation executor
//!
//! Applies a planned action list against the external ledger store. Actions
//! are best-effort, not transactional: each one is attempted exactly once
//! per invocation, failures are logged and do not abort the remaining
//! actions, and nothing is rolled back. Safety under redelivery comes from
//! every action being individually idempotent (the ledger update is an
//! upsert keyed by the idempotency key, the audit log tolerates duplicates).
//!
//! Retry across whole invocations is the caller's concern; see
//! [`ReconciliationExecutor::execute_with_retry`].

use rust_decimal::Decimal;
use serde_json::Value;
use tokio_retry::strategy::ExponentialBackoff;
use tokio_retry::Retry;

use crate::error::{IngestError, IngestResult};
use crate::event::CanonicalEvent;
use crate::ledger::{AuditRecord, LedgerClient, LedgerPatch, NewLedgerEntry};
use crate::planner::Action;

/// Total reconciliation attempts per delivery (1 initial + 2 retries).
pub const RETRY_ATTEMPTS: usize = 3;

/// Outcome of a single action within one execution.
#[derive(Debug, Clone)]
pub struct ActionResult {
    pub action: &'static str,
    pub success: bool,
    pub detail: Option<String>,
}

/// Per-action results of one `execute` invocation.
#[derive(Debug, Clone, Default)]
pub struct ExecutionReport {
    pub results: Vec<ActionResult>,
}

impl ExecutionReport {
    /// Overall success: every planned action succeeded.
    pub fn success(&self) -> bool {
        self.results.iter().all(|r| r.success)
    }

    pub fn failed_count(&self) -> usize {
        self.results.iter().filter(|r| !r.success).count()
    }
}

/// Applies planned side effects against the external ledger store.
#[derive(Clone)]
pub struct ReconciliationExecutor {
    ledger: LedgerClient,
    /// Agency reference used when event metadata carries none. Historical
    /// shortcut: orphaned events are attributed here and logged for review.
    fallback_agency_id: String,
}

impl ReconciliationExecutor {
    pub fn new(ledger: LedgerClient, fallback_agency_id: impl Into<String>) -> Self {
        Self {
            ledger,
            fallback_agency_id: fallback_agency_id.into(),
        }
    }

    /// Apply every action in order, collecting per-action results. Returns
    /// a report whose `success()` is true only if all actions succeeded.
    pub async fn execute(&self, event: &CanonicalEvent, actions: &[Action]) -> ExecutionReport {
        let mut report = ExecutionReport::default();

        for action in actions {
            let outcome = match action {
                Action::UpdateLedgerStatus => self.update_ledger_status(event).await,
                Action::WriteAuditLog => self.write_audit_log(event).await,
                Action::CreditBalance { gems } => self.credit_balance(event, *gems),
                Action::HandleFailureCleanup => self.handle_failure_cleanup(event),
                Action::HandleCancellationCleanup => self.handle_cancellation_cleanup(event),
            };

            match outcome {
                Ok(()) => report.results.push(ActionResult {
                    action: action.name(),
                    success: true,
                    detail: None,
                }),
                Err(e) => {
                    tracing::error!(
                        event_id = %event.event_id,
                        action = action.name(),
                        error = %e,
                        "Reconciliation action failed"
                    );
                    report.results.push(ActionResult {
                        action: action.name(),
                        success: false,
                        detail: Some(e.to_string()),
                    });
                }
            }
        }

        report
    }

    /// Execute wrapped in the retry policy: up to [`RETRY_ATTEMPTS`] total
    /// attempts with exponential backoff (1s, then 2s between attempts).
    pub async fn execute_with_retry(
        &self,
        event: &CanonicalEvent,
        actions: &[Action],
    ) -> IngestResult<ExecutionReport> {
        retry_with_backoff(|| async {
            let report = self.execute(event, actions).await;
            if report.success() {
                Ok(report)
            } else {
                Err(IngestError::ReconciliationFailed {
                    event_id: event.event_id.clone(),
                    failed_actions: report.failed_count(),
                })
            }
        })
        .await
    }

    /// Upsert the ledger entry for this event. Existing entries (matched by
    /// idempotency key) are patched; otherwise a new entry is created. Both
    /// paths are safe to re-apply on redelivery.
    async fn update_ledger_status(&self, event: &CanonicalEvent) -> IngestResult<()> {
        let status = event.status.into();

        if let Some(existing) = self
            .ledger
            .find_by_idempotency_key(&event.event_id)
            .await?
        {
            let patch = LedgerPatch {
                status,
                provider_transaction_id: Some(event.transaction_id.clone()),
            };
            let updated = self.ledger.update_ledger_entry(existing.id, &patch).await?;
            tracing::info!(
                event_id = %event.event_id,
                ledger_id = updated.id,
                status = ?updated.status,
                "Ledger entry status updated"
            );
            return Ok(());
        }

        let fee = event
            .metadata
            .extra
            .get("fee")
            .and_then(|v| crate::event::parse_amount(v).ok())
            .unwrap_or(Decimal::ZERO);

        let mut entry = NewLedgerEntry::new(event.amount, fee, status, event.event_id.clone());
        entry.transaction_type = event
            .metadata
            .transaction_type
            .map(|t| t.as_str().to_string());
        entry.creator_id = event.metadata.creator_id.clone();
        entry.provider_transaction_id = Some(event.transaction_id.clone());
        entry.metadata = Value::Object(event.metadata.extra.clone());
        entry.agency_id = match &event.metadata.agency_id {
            Some(id) => Some(id.clone()),
            None => {
                tracing::warn!(
                    event_id = %event.event_id,
                    fallback_agency_id = %self.fallback_agency_id,
                    "Event carries no agency attribution, using fallback agency"
                );
                Some(self.fallback_agency_id.clone())
            }
        };

        let created = self.ledger.create_ledger_entry(&entry).await?;
        tracing::info!(
            event_id = %event.event_id,
            ledger_id = created.id,
            amount = %created.amount,
            net_amount = %created.net_amount,
            "Ledger entry created"
        );
        Ok(())
    }

    async fn write_audit_log(&self, event: &CanonicalEvent) -> IngestResult<()> {
        let record = AuditRecord::from_event(event);
        self.ledger.append_audit_log(&record).await?;
        tracing::info!(event_id = %event.event_id, "Audit log written");
        Ok(())
    }

    /// Validate and log the balance credit. The user-balance store is an
    /// external collaborator; the actual mutation is delegated to it.
    fn credit_balance(&self, event: &CanonicalEvent, gems: Decimal) -> IngestResult<()> {
        if gems <= Decimal::ZERO {
            return Err(IngestError::InvalidPayload(format!(
                "gems_purchased must be positive, got {gems}"
            )));
        }
        tracing::info!(
            event_id = %event.event_id,
            wallet = %event.customer_wallet_address,
            gems = %gems,
            "Balance credit recorded for user-balance store"
        );
        Ok(())
    }

    // Cleanup hooks are log-only for now; they report success so incomplete
    // downstream integrations never block the action sequence.

    fn handle_failure_cleanup(&self, event: &CanonicalEvent) -> IngestResult<()> {
        tracing::info!(
            event_id = %event.event_id,
            transaction_id = %event.transaction_id,
            "Failure cleanup hook invoked"
        );
        Ok(())
    }

    fn handle_cancellation_cleanup(&self, event: &CanonicalEvent) -> IngestResult<()> {
        tracing::info!(
            event_id = %event.event_id,
            transaction_id = %event.transaction_id,
            "Cancellation cleanup hook invoked"
        );
        Ok(())
    }
}

/// Retry an async operation with exponential backoff: delays of 1000ms then
/// 2000ms between the three attempts. No jitter; deliveries that still fail
/// are redelivered by the provider anyway.
pub async fn retry_with_backoff<F, Fut, T>(operation: F) -> IngestResult<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = IngestResult<T>>,
{
    let strategy = ExponentialBackoff::from_millis(2)
        .factor(500)
        .take(RETRY_ATTEMPTS - 1);
    Retry::spawn(strategy, operation).await
}
