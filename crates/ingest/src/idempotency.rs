//! Idempotency ledger
//!
//! Tracks which canonical events have already been durably applied so that
//! duplicate deliveries (providers commonly over-deliver) short-circuit
//! instead of re-executing side effects.
//!
//! The layering is: in-process cache (fast path, TTL-bounded) → optional
//! shared Redis cache (survives process restarts and multi-instance
//! deployments) → durable event-log lookup in the external store. The local
//! layers are a performance optimization only; the durable store remains
//! authoritative, so cache eviction never affects correctness.

use std::collections::HashMap;
use std::sync::Arc;

use redis::AsyncCommands;
use time::{Duration, OffsetDateTime};
use tokio::sync::RwLock;

use crate::ledger::LedgerClient;

/// How long a processed event id stays in the local cache.
pub const CACHE_TTL: Duration = Duration::minutes(5);

/// Terminal outcome of a reconciliation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
}

impl Outcome {
    fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Failure => "failure",
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct CachedRecord {
    outcome: Outcome,
    recorded_at: OffsetDateTime,
}

/// Cache of processed event ids fronting the durable store.
#[derive(Clone)]
pub struct IdempotencyLedger {
    cache: Arc<RwLock<HashMap<String, CachedRecord>>>,
    redis: Option<redis::aio::ConnectionManager>,
    store: LedgerClient,
    ttl: Duration,
}

impl IdempotencyLedger {
    pub fn new(store: LedgerClient, redis: Option<redis::aio::ConnectionManager>) -> Self {
        Self {
            cache: Arc::new(RwLock::new(HashMap::new())),
            redis,
            store,
            ttl: CACHE_TTL,
        }
    }

    #[cfg(test)]
    fn with_ttl(store: LedgerClient, ttl: Duration) -> Self {
        Self {
            cache: Arc::new(RwLock::new(HashMap::new())),
            redis: None,
            store,
            ttl,
        }
    }

    /// Check whether an event has already been durably applied.
    ///
    /// Only `Success` outcomes count as processed: an event whose last
    /// attempt failed must stay retryable on redelivery. Errors from the
    /// durable store are treated as "not processed" (fail open) — processing
    /// a payment twice is recoverable via the ledger's own idempotency key,
    /// silently dropping one is not.
    pub async fn is_processed(&self, event_id: &str) -> bool {
        // 1. Local cache
        {
            let cache = self.cache.read().await;
            if let Some(record) = cache.get(event_id) {
                if OffsetDateTime::now_utc() - record.recorded_at <= self.ttl {
                    return record.outcome == Outcome::Success;
                }
            }
        }

        // 2. Shared cache, when configured
        if let Some(manager) = &self.redis {
            let mut conn = manager.clone();
            match conn.get::<_, Option<String>>(Self::redis_key(event_id)).await {
                Ok(Some(outcome)) if outcome == "success" => {
                    self.cache_locally(event_id, Outcome::Success).await;
                    return true;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(event_id, error = %e, "Redis idempotency lookup failed");
                }
            }
        }

        // 3. Durable event log (authoritative)
        match self.store.list_audit_logs().await {
            Ok(records) => {
                let processed = records
                    .iter()
                    .any(|r| r.event_id == event_id && r.processed);
                if processed {
                    self.cache_locally(event_id, Outcome::Success).await;
                }
                processed
            }
            Err(e) => {
                tracing::warn!(
                    event_id,
                    error = %e,
                    "Durable idempotency lookup failed, treating as not processed"
                );
                false
            }
        }
    }

    /// Record the outcome of a reconciliation attempt in the cache layers.
    ///
    /// Durable persistence happens through the executor's own audit-log
    /// action, not here.
    pub async fn mark_processed(&self, event_id: &str, outcome: Outcome) {
        self.cache_locally(event_id, outcome).await;

        if let Some(manager) = &self.redis {
            let mut conn = manager.clone();
            let ttl_secs = self.ttl.whole_seconds().max(1) as u64;
            if let Err(e) = conn
                .set_ex::<_, _, ()>(Self::redis_key(event_id), outcome.as_str(), ttl_secs)
                .await
            {
                tracing::warn!(event_id, error = %e, "Redis idempotency write failed");
            }
        }
    }

    /// Purge local cache entries older than the TTL. Called from a periodic
    /// sweep task; eviction is safe because the durable store is
    /// authoritative.
    pub async fn evict_expired(&self) {
        let cutoff = OffsetDateTime::now_utc() - self.ttl;
        let mut cache = self.cache.write().await;
        let before = cache.len();
        cache.retain(|_, record| record.recorded_at > cutoff);
        let evicted = before - cache.len();
        if evicted > 0 {
            tracing::debug!(evicted, remaining = cache.len(), "Idempotency cache sweep");
        }
    }

    async fn cache_locally(&self, event_id: &str, outcome: Outcome) {
        let mut cache = self.cache.write().await;
        cache.insert(
            event_id.to_string(),
            CachedRecord {
                outcome,
                recorded_at: OffsetDateTime::now_utc(),
            },
        );
    }

    fn redis_key(event_id: &str) -> String {
        format!("idem:{event_id}")
    }
}
