//! HTTP client for the external ledger store
//!
//! The durable store (ledger entries and the append-only event log) is an
//! external no-code database consumed as an opaque REST service. This module
//! is the only place that talks to it; the rest of the pipeline goes through
//! the five operations defined here.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

use crate::error::{IngestError, IngestResult};
use crate::event::{CanonicalEvent, EventStatus};

/// Status vocabulary of the external ledger. The ledger has no distinct
/// cancelled state, so canonical `cancelled` is conflated to `failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerStatus {
    Pending,
    Completed,
    Failed,
}

impl From<EventStatus> for LedgerStatus {
    fn from(status: EventStatus) -> Self {
        match status {
            EventStatus::Completed => LedgerStatus::Completed,
            EventStatus::Pending => LedgerStatus::Pending,
            EventStatus::Failed | EventStatus::Cancelled => LedgerStatus::Failed,
        }
    }
}

/// A financial ledger entry as stored by the external service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: i64,
    pub amount: Decimal,
    pub fee: Decimal,
    pub net_amount: Decimal,
    pub status: LedgerStatus,
    #[serde(default)]
    pub transaction_type: Option<String>,
    pub idempotency_key: String,
    #[serde(default)]
    pub agency_id: Option<String>,
    #[serde(default)]
    pub creator_id: Option<String>,
    #[serde(default)]
    pub provider_transaction_id: Option<String>,
    #[serde(default)]
    pub metadata: Value,
}

/// Payload for creating a ledger entry. `net_amount` is always derived from
/// `amount - fee`; use [`NewLedgerEntry::new`] so the invariant holds.
#[derive(Debug, Clone, Serialize)]
pub struct NewLedgerEntry {
    pub amount: Decimal,
    pub fee: Decimal,
    pub net_amount: Decimal,
    pub status: LedgerStatus,
    pub transaction_type: Option<String>,
    pub idempotency_key: String,
    pub agency_id: Option<String>,
    pub creator_id: Option<String>,
    pub provider_transaction_id: Option<String>,
    pub metadata: Value,
}

impl NewLedgerEntry {
    pub fn new(
        amount: Decimal,
        fee: Decimal,
        status: LedgerStatus,
        idempotency_key: String,
    ) -> Self {
        Self {
            amount,
            fee,
            net_amount: amount - fee,
            status,
            transaction_type: None,
            idempotency_key,
            agency_id: None,
            creator_id: None,
            provider_transaction_id: None,
            metadata: Value::Null,
        }
    }
}

/// Partial update applied to an existing ledger entry.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerPatch {
    pub status: LedgerStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_transaction_id: Option<String>,
}

/// Immutable record of a processed canonical event in the event-log store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub event_id: String,
    pub status: String,
    pub amount: Decimal,
    pub currency: String,
    pub customer_wallet_address: String,
    pub metadata: Value,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub processed: bool,
}

impl AuditRecord {
    pub fn from_event(event: &CanonicalEvent) -> Self {
        Self {
            event_id: event.event_id.clone(),
            status: event.status.to_string(),
            amount: event.amount,
            currency: event.currency.clone(),
            customer_wallet_address: event.customer_wallet_address.clone(),
            metadata: Value::Object(event.metadata.extra.clone()),
            timestamp: event.timestamp,
            processed: true,
        }
    }
}

/// Client for the external ledger store.
#[derive(Clone)]
pub struct LedgerClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl LedgerClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Look up a ledger entry by its idempotency key. Returns `None` when no
    /// entry exists.
    pub async fn find_by_idempotency_key(&self, key: &str) -> IngestResult<Option<LedgerEntry>> {
        let response = self
            .client
            .get(self.url("/ledger"))
            .bearer_auth(&self.api_key)
            .query(&[("idempotency_key", key)])
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = Self::check_status(response, "find_by_idempotency_key").await?;
        let entries: Vec<LedgerEntry> = response.json().await?;
        Ok(entries.into_iter().next())
    }

    /// Create a new ledger entry. The store enforces a unique constraint on
    /// `idempotency_key`, which is the final guard against concurrent
    /// duplicate deliveries.
    pub async fn create_ledger_entry(&self, entry: &NewLedgerEntry) -> IngestResult<LedgerEntry> {
        let response = self
            .client
            .post(self.url("/ledger"))
            .bearer_auth(&self.api_key)
            .json(entry)
            .send()
            .await?;
        let response = Self::check_status(response, "create_ledger_entry").await?;
        Ok(response.json().await?)
    }

    /// Patch an existing ledger entry.
    pub async fn update_ledger_entry(
        &self,
        id: i64,
        patch: &LedgerPatch,
    ) -> IngestResult<LedgerEntry> {
        let response = self
            .client
            .patch(self.url(&format!("/ledger/{id}")))
            .bearer_auth(&self.api_key)
            .json(patch)
            .send()
            .await?;
        let response = Self::check_status(response, "update_ledger_entry").await?;
        Ok(response.json().await?)
    }

    /// Append an immutable record to the event log.
    pub async fn append_audit_log(&self, record: &AuditRecord) -> IngestResult<AuditRecord> {
        let response = self
            .client
            .post(self.url("/event_log"))
            .bearer_auth(&self.api_key)
            .json(record)
            .send()
            .await?;
        let response = Self::check_status(response, "append_audit_log").await?;
        Ok(response.json().await?)
    }

    /// List event-log records. Used as the durable idempotency fallback when
    /// an event id is not in the local cache.
    pub async fn list_audit_logs(&self) -> IngestResult<Vec<AuditRecord>> {
        let response = self
            .client
            .get(self.url("/event_log"))
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        let response = Self::check_status(response, "list_audit_logs").await?;
        Ok(response.json().await?)
    }

    async fn check_status(
        response: reqwest::Response,
        operation: &str,
    ) -> IngestResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        tracing::error!(
            operation,
            status = %status,
            body = %body.chars().take(256).collect::<String>(),
            "Ledger store call failed"
        );
        Err(IngestError::Store(format!("{operation} returned {status}")))
    }
}
