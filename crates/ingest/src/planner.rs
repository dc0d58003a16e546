//! Action planning
//!
//! Derives the ordered list of side effects a canonical event requires.
//! Planning is pure and deterministic; applying the actions is the
//! executor's job.

use rust_decimal::Decimal;

use crate::event::{CanonicalEvent, EventStatus, TransactionType};

/// A single side effect to apply against the external stores.
///
/// Order within a plan matters: the ledger status is updated before the
/// audit log so the audit record reflects final state, and credit/cleanup
/// actions run last because they may depend on a persisted ledger entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Upsert the ledger entry keyed by the event's idempotency key
    UpdateLedgerStatus,
    /// Append an immutable processed-event record to the event log
    WriteAuditLog,
    /// Credit purchased gems to the user balance store
    CreditBalance { gems: Decimal },
    /// Release resources / notify after a failed payment
    HandleFailureCleanup,
    /// Release resources / notify after a cancelled payment
    HandleCancellationCleanup,
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::UpdateLedgerStatus => "update_ledger_status",
            Action::WriteAuditLog => "write_audit_log",
            Action::CreditBalance { .. } => "credit_balance",
            Action::HandleFailureCleanup => "handle_failure_cleanup",
            Action::HandleCancellationCleanup => "handle_cancellation_cleanup",
        }
    }
}

/// Map a canonical event to its ordered action list.
///
/// [`EventStatus`] is a closed enum, so every normalized event gets a
/// non-empty plan containing at least the ledger update and the audit log;
/// unmapped provider statuses were already rejected at normalization.
pub fn plan(event: &CanonicalEvent) -> Vec<Action> {
    let mut actions = vec![Action::UpdateLedgerStatus, Action::WriteAuditLog];

    match event.status {
        EventStatus::Completed => {
            if event.metadata.transaction_type == Some(TransactionType::Gems) {
                if let Some(gems) = event.metadata.gems_purchased {
                    actions.push(Action::CreditBalance { gems });
                }
            }
        }
        EventStatus::Failed => actions.push(Action::HandleFailureCleanup),
        EventStatus::Pending => {}
        EventStatus::Cancelled => actions.push(Action::HandleCancellationCleanup),
    }

    actions
}
