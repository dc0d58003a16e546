//! Server configuration loaded from the environment

/// Runtime configuration for the API server.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP server binds to
    pub bind_address: String,
    /// Shared secret for webhook signature verification. May be empty: the
    /// server still starts, but the webhook endpoint answers 500 until the
    /// secret is configured.
    pub webhook_secret: String,
    /// Base URL of the external ledger store
    pub ledger_base_url: String,
    /// API key for the external ledger store
    pub ledger_api_key: String,
    /// Optional Redis URL for the shared idempotency cache
    pub redis_url: Option<String>,
    /// Agency reference used when event metadata carries no attribution
    pub fallback_agency_id: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        let ledger_base_url = std::env::var("LEDGER_BASE_URL")
            .map_err(|_| anyhow::anyhow!("LEDGER_BASE_URL must be set"))?;

        let webhook_secret = std::env::var("WEBHOOK_SECRET").unwrap_or_default();
        if webhook_secret.is_empty() {
            tracing::warn!(
                "WEBHOOK_SECRET not set - webhook deliveries will be rejected with 500"
            );
        }

        Ok(Self {
            bind_address: std::env::var("BIND_ADDRESS")
                .unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            webhook_secret,
            ledger_base_url,
            ledger_api_key: std::env::var("LEDGER_API_KEY").unwrap_or_default(),
            redis_url: std::env::var("REDIS_URL").ok().filter(|s| !s.is_empty()),
            fallback_agency_id: std::env::var("FALLBACK_AGENCY_ID")
                .unwrap_or_else(|_| "agency_default".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn from_env_requires_ledger_base_url() {
        std::env::remove_var("LEDGER_BASE_URL");
        assert!(Config::from_env().is_err());
    }

    #[test]
    #[serial]
    fn from_env_applies_defaults() {
        std::env::set_var("LEDGER_BASE_URL", "http://ledger.test");
        std::env::remove_var("WEBHOOK_SECRET");
        std::env::remove_var("BIND_ADDRESS");
        std::env::remove_var("REDIS_URL");
        std::env::remove_var("FALLBACK_AGENCY_ID");

        let config = Config::from_env().unwrap();
        assert_eq!(config.bind_address, "0.0.0.0:8080");
        assert!(config.webhook_secret.is_empty());
        assert!(config.redis_url.is_none());
        assert_eq!(config.fallback_agency_id, "agency_default");

        std::env::remove_var("LEDGER_BASE_URL");
    }
}
