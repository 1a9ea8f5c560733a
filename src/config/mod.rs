//! Edge configuration: cache TTL and size, rate-limit budget, proxy trust and
//! sweep cadence.
//!
//! Values come from defaults, a TOML file, or `TRIDIVYA_*` environment
//! variables. Unknown TOML keys are rejected so typos surface at startup.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::ResponseCache;
use crate::security::{RateLimitMiddleware, RateLimiter};

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid value {value:?} for {var}")]
    InvalidEnv { var: &'static str, value: String },
}

/// Settings for the edge middleware stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EdgeConfig {
    /// How long a cached GET response stays fresh.
    pub cache_ttl_secs: u64,
    /// Most keys the response cache holds.
    pub cache_capacity: usize,
    /// Requests each client may make per rolling minute.
    pub rate_limit_per_minute: u32,
    /// Most clients the rate limiter tracks at once.
    pub rate_limit_max_clients: usize,
    /// Identify clients by `X-Forwarded-For` / `X-Real-IP`.
    pub trust_proxy: bool,
    /// How often expired entries are swept.
    pub sweep_interval_secs: u64,
}

impl Default for EdgeConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 60,
            cache_capacity: ResponseCache::DEFAULT_CAPACITY,
            rate_limit_per_minute: RateLimiter::DEFAULT_REQUESTS_PER_MINUTE,
            rate_limit_max_clients: RateLimiter::DEFAULT_MAX_CLIENTS,
            trust_proxy: false,
            sweep_interval_secs: 30,
        }
    }
}

impl EdgeConfig {
    /// Parses a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// Reads and parses a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Defaults overridden by any `TRIDIVYA_*` variables that are set.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Like [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        override_with(&lookup, "TRIDIVYA_CACHE_TTL_SECS", &mut config.cache_ttl_secs)?;
        override_with(&lookup, "TRIDIVYA_CACHE_CAPACITY", &mut config.cache_capacity)?;
        override_with(
            &lookup,
            "TRIDIVYA_RATE_LIMIT_PER_MINUTE",
            &mut config.rate_limit_per_minute,
        )?;
        override_with(
            &lookup,
            "TRIDIVYA_RATE_LIMIT_MAX_CLIENTS",
            &mut config.rate_limit_max_clients,
        )?;
        override_with(&lookup, "TRIDIVYA_TRUST_PROXY", &mut config.trust_proxy)?;
        override_with(
            &lookup,
            "TRIDIVYA_SWEEP_INTERVAL_SECS",
            &mut config.sweep_interval_secs,
        )?;
        Ok(config)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Builds the response cache described by this config.
    pub fn response_cache(&self) -> ResponseCache {
        ResponseCache::with_capacity(self.cache_ttl(), self.cache_capacity)
    }

    /// Builds the rate limiter described by this config.
    pub fn rate_limiter(&self) -> RateLimiter {
        RateLimiter::new(self.rate_limit_per_minute).max_clients(self.rate_limit_max_clients)
    }

    /// Rate-limit middleware over `limiter`, honouring `trust_proxy`.
    pub fn rate_limit_middleware(&self, limiter: Arc<RateLimiter>) -> RateLimitMiddleware {
        RateLimitMiddleware::new(limiter).trust_proxy(self.trust_proxy)
    }
}

fn override_with<F, T>(lookup: &F, var: &'static str, slot: &mut T) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    if let Some(value) = lookup(var) {
        *slot = value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidEnv { var, value })?;
    }
    Ok(())
}
