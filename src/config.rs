//! Engine configuration.

use std::time::Duration;

use crate::finance::{DEFAULT_BASE_URL, DEFAULT_TIMEOUT};

/// Version string stamped on responses when none is configured.
pub const DEFAULT_ENGINE_VERSION: &str = concat!("biz-engine/", env!("CARGO_PKG_VERSION"));

/// Settings needed to wire up a dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Echoed as `engine_version` in every response
    pub engine_version: String,
    /// Deployment label reported by the health endpoint, e.g. `dev` or `prod`
    pub env: String,
    /// Base URL of the exchange-rate provider
    pub rate_api_url: String,
    /// Per-request budget for the exchange-rate provider
    pub rate_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            engine_version: DEFAULT_ENGINE_VERSION.to_string(),
            env: "dev".to_string(),
            rate_api_url: DEFAULT_BASE_URL.to_string(),
            rate_timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl EngineConfig {
    /// Sets the engine version.
    pub fn with_engine_version(mut self, version: impl Into<String>) -> Self {
        self.engine_version = version.into();
        self
    }

    /// Sets the deployment label.
    pub fn with_env(mut self, env: impl Into<String>) -> Self {
        self.env = env.into();
        self
    }

    /// Sets the exchange-rate provider URL.
    pub fn with_rate_api_url(mut self, url: impl Into<String>) -> Self {
        self.rate_api_url = url.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.engine_version, "biz-engine/0.1.0");
        assert_eq!(config.env, "dev");
        assert_eq!(config.rate_api_url, "https://api.frankfurter.dev");
        assert_eq!(config.rate_timeout, Duration::from_secs(10));
    }
}
