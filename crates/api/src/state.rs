//! Application state

use std::sync::Arc;

use paygate_ingest::{IngestService, LedgerClient};

use crate::config::Config;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub ingest: Arc<IngestService>,
}

impl AppState {
    pub async fn new(config: Config) -> Self {
        let ledger = LedgerClient::new(&config.ledger_base_url, &config.ledger_api_key);

        // Redis is optional: without it the idempotency cache is
        // process-local and the durable store carries the fallback.
        let redis = match &config.redis_url {
            Some(url) => match connect_redis(url).await {
                Some(manager) => {
                    tracing::info!("Shared idempotency cache enabled (Redis)");
                    Some(manager)
                }
                None => {
                    tracing::warn!("Redis unavailable, idempotency cache is process-local only");
                    None
                }
            },
            None => {
                tracing::info!("REDIS_URL not set, idempotency cache is process-local only");
                None
            }
        };

        let ingest = Arc::new(IngestService::new(
            ledger,
            redis,
            config.fallback_agency_id.clone(),
        ));

        Self { config, ingest }
    }
}

async fn connect_redis(url: &str) -> Option<redis::aio::ConnectionManager> {
    let client = match redis::Client::open(url) {
        Ok(client) => client,
        Err(e) => {
            tracing::warn!(error = %e, "Invalid Redis URL");
            return None;
        }
    };
    match client.get_connection_manager().await {
        Ok(manager) => Some(manager),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to connect to Redis");
            None
        }
    }
}
