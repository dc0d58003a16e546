//! Canonical webhook events and payload normalization
//!
//! The payment provider delivers notifications in two envelope shapes: a
//! legacy single-event envelope (`{type, data: {...}}`) and a newer
//! topic/batch envelope (`{topic, timestamp, data: [...]}`). Both are
//! resolved once at this boundary into a [`CanonicalEvent`]; all downstream
//! code operates only on the canonical form.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::error::{IngestError, IngestResult};

/// Canonical lifecycle state of a payment event.
///
/// This enum is closed on purpose: provider strings that do not map to one of
/// these four states fail normalization instead of being coerced, so unknown
/// states never reach the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Completed,
    Failed,
    Pending,
    Cancelled,
}

impl EventStatus {
    /// Map a provider status or topic string to a canonical status.
    ///
    /// Accepts both the legacy dotted form (`payment.completed`) and the
    /// batch topic form (`payment_completed`), plus bare status words.
    pub fn from_provider(raw: &str) -> Option<Self> {
        let stripped = raw
            .strip_prefix("payment.")
            .or_else(|| raw.strip_prefix("payment_"))
            .unwrap_or(raw);
        match stripped {
            "completed" | "succeeded" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "pending" => Some(Self::Pending),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Pending => "pending",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for EventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Product classification carried in event metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Gems,
    Poke,
    Media,
    Subscription,
}

impl TransactionType {
    pub fn from_provider(raw: &str) -> Option<Self> {
        match raw {
            "gems" => Some(Self::Gems),
            "poke" => Some(Self::Poke),
            "media" => Some(Self::Media),
            "subscription" => Some(Self::Subscription),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gems => "gems",
            Self::Poke => "poke",
            Self::Media => "media",
            Self::Subscription => "subscription",
        }
    }
}

/// Provider metadata with known keys lifted for downstream convenience.
///
/// Everything the provider sent is preserved verbatim in `extra`; the lifted
/// fields are a read-optimized view, not a filter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventMetadata {
    pub agency_id: Option<String>,
    pub creator_id: Option<String>,
    pub transaction_type: Option<TransactionType>,
    pub gems_purchased: Option<Decimal>,
    pub extra: serde_json::Map<String, Value>,
}

/// The normalized, schema-independent representation of a webhook
/// notification. `event_id` is the sole deduplication key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalEvent {
    pub event_id: String,
    pub event_type: String,
    pub transaction_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub status: EventStatus,
    pub customer_wallet_address: String,
    pub metadata: EventMetadata,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// The two supported inbound envelope shapes, resolved once at the
/// normalization boundary.
#[derive(Debug)]
enum Envelope<'a> {
    /// `{type, data: {...}}`
    Legacy { event_type: &'a str, data: &'a Value },
    /// `{topic, timestamp, data: [...]}`
    Batch {
        topic: &'a str,
        timestamp: &'a Value,
        first: &'a Value,
    },
}

/// Detect the envelope shape. Presence of both `topic` and `timestamp`
/// top-level fields selects the batch schema; otherwise legacy.
fn detect(raw: &Value) -> IngestResult<Envelope<'_>> {
    let obj = raw
        .as_object()
        .ok_or_else(|| IngestError::InvalidPayload("payload is not a JSON object".into()))?;

    if obj.contains_key("topic") && obj.contains_key("timestamp") {
        let topic = obj
            .get("topic")
            .and_then(Value::as_str)
            .ok_or_else(|| IngestError::InvalidPayload("topic must be a string".into()))?;
        let data = obj
            .get("data")
            .and_then(Value::as_array)
            .ok_or_else(|| IngestError::InvalidPayload("batch data must be an array".into()))?;
        let first = data
            .first()
            .ok_or_else(|| IngestError::InvalidPayload("batch data array is empty".into()))?;
        // obj.get("timestamp") is Some by the contains_key check above
        let timestamp = &obj["timestamp"];
        Ok(Envelope::Batch {
            topic,
            timestamp,
            first,
        })
    } else {
        let event_type = obj
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| IngestError::InvalidPayload("missing event type".into()))?;
        let data = obj
            .get("data")
            .filter(|d| d.is_object())
            .ok_or_else(|| IngestError::InvalidPayload("missing data object".into()))?;
        Ok(Envelope::Legacy { event_type, data })
    }
}

/// Normalize a raw provider payload into a [`CanonicalEvent`].
///
/// Pure function, no I/O. Fails closed: unmapped statuses, non-numeric or
/// negative amounts, and missing required fields are all errors rather than
/// defaults.
pub fn normalize(raw: &Value) -> IngestResult<CanonicalEvent> {
    match detect(raw)? {
        Envelope::Legacy { event_type, data } => {
            let event_id = require_string(data, "id")?;
            // Prefer an explicit status field; fall back to the event type
            let status_source = data
                .get("status")
                .and_then(Value::as_str)
                .unwrap_or(event_type);
            let status = EventStatus::from_provider(status_source).ok_or_else(|| {
                IngestError::InvalidPayload(format!("unmapped status '{status_source}'"))
            })?;
            let timestamp = data
                .get("created_at")
                .ok_or_else(|| IngestError::InvalidPayload("missing created_at".into()))
                .and_then(parse_timestamp)?;

            build_event(event_id, event_type.to_string(), status, timestamp, data)
        }
        Envelope::Batch {
            topic,
            timestamp,
            first,
        } => {
            let event_id = require_string(first, "id")?;
            let status = EventStatus::from_provider(topic).ok_or_else(|| {
                IngestError::InvalidPayload(format!("unmapped topic '{topic}'"))
            })?;
            let timestamp = parse_timestamp(timestamp)?;

            build_event(event_id, topic.to_string(), status, timestamp, first)
        }
    }
}

fn build_event(
    event_id: String,
    event_type: String,
    status: EventStatus,
    timestamp: OffsetDateTime,
    data: &Value,
) -> IngestResult<CanonicalEvent> {
    let amount = data
        .get("amount")
        .ok_or_else(|| IngestError::InvalidPayload("missing amount".into()))
        .and_then(parse_amount)?;

    let currency = data
        .get("currency")
        .and_then(Value::as_str)
        .unwrap_or("USDC")
        .to_string();

    let transaction_id = data
        .get("transaction_id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| event_id.clone());

    let customer_wallet_address = data
        .get("customer")
        .and_then(|c| c.get("wallet_address"))
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();

    let metadata = lift_metadata(data.get("metadata"));

    Ok(CanonicalEvent {
        event_id,
        event_type,
        transaction_id,
        amount,
        currency,
        status,
        customer_wallet_address,
        metadata,
        timestamp,
    })
}

fn require_string(data: &Value, key: &str) -> IngestResult<String> {
    data.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| IngestError::InvalidPayload(format!("missing {key}")))
}

/// Parse an amount that may arrive as a JSON string or number. Must be a
/// finite, non-negative decimal.
pub(crate) fn parse_amount(value: &Value) -> IngestResult<Decimal> {
    let parsed = match value {
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        _ => None,
    };
    match parsed {
        Some(amount) if amount >= Decimal::ZERO => Ok(amount),
        Some(_) => Err(IngestError::InvalidPayload("negative amount".into())),
        None => Err(IngestError::InvalidPayload(format!(
            "non-numeric amount '{value}'"
        ))),
    }
}

/// Parse a provider timestamp: RFC 3339 string or unix seconds.
fn parse_timestamp(value: &Value) -> IngestResult<OffsetDateTime> {
    match value {
        Value::String(s) => OffsetDateTime::parse(s, &Rfc3339)
            .map_err(|_| IngestError::InvalidPayload(format!("unparsable timestamp '{s}'"))),
        Value::Number(n) => n
            .as_i64()
            .and_then(|secs| OffsetDateTime::from_unix_timestamp(secs).ok())
            .ok_or_else(|| IngestError::InvalidPayload("unparsable unix timestamp".into())),
        _ => Err(IngestError::InvalidPayload("missing timestamp".into())),
    }
}

/// Lift known metadata keys; preserve everything else under `extra`.
/// Accepts both camelCase and snake_case spellings for the lifted keys.
fn lift_metadata(metadata: Option<&Value>) -> EventMetadata {
    let Some(map) = metadata.and_then(Value::as_object) else {
        return EventMetadata::default();
    };

    let get_str = |keys: &[&str]| {
        keys.iter()
            .find_map(|k| map.get(*k))
            .and_then(Value::as_str)
            .map(str::to_string)
    };

    let transaction_type = get_str(&["transactionType", "transaction_type"])
        .as_deref()
        .and_then(TransactionType::from_provider);

    let gems_purchased = map
        .get("gems_purchased")
        .and_then(|v| parse_amount(v).ok());

    EventMetadata {
        agency_id: get_str(&["agencyId", "agency_id"]),
        creator_id: get_str(&["creatorId", "creator_id"]),
        transaction_type,
        gems_purchased,
        extra: map.clone(),
    }
}
