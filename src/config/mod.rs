use std::env;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::rate_limit::{
    FixedLoad, LoadAverage, LoadProbe, RateLimitAlgorithm, RateLimitPolicy, RateLimitRule,
    RuleError,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value {value:?} for {key}")]
    Invalid { key: &'static str, value: String },
    #[error(transparent)]
    Rule(#[from] RuleError),
}

/// Source of the adaptive limiter's load figure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SystemLoad {
    Fixed(f64),
    /// Read `/proc/loadavg` on every adaptive check.
    Auto,
}

impl SystemLoad {
    pub fn probe(&self) -> Arc<dyn LoadProbe> {
        match *self {
            SystemLoad::Fixed(load) => Arc::new(FixedLoad(load)),
            SystemLoad::Auto => Arc::new(LoadAverage),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub redis_url: String,
    pub jwt_secret: String,
    pub jwt_expiration_secs: u64,
    pub jwt_cache_ttl_secs: u64,
    pub server_host: String,
    pub server_port: u16,
    pub api_base_uri: String,
    pub rate_limit: RateLimitPolicy,
    pub system_load: SystemLoad,
    pub circuit_failure_threshold: u32,
    pub circuit_recovery_timeout_secs: u64,
    pub retry_max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub integration_timeout_secs: u64,
    pub dataforseo_login: Option<String>,
    pub dataforseo_password: Option<String>,
    pub dataforseo_base_url: String,
}

pub const DEFAULT_DATAFORSEO_BASE_URL: &str = "https://api.dataforseo.com";

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Builds the configuration from any variable source.
    pub fn from_vars<F>(var: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(&var);

        let jwt_expiration_hours: u64 = vars
            .get("JWT_EXPIRATION")
            .map(|v| {
                v.trim_end_matches('h').parse().map_err(|_| ConfigError::Invalid {
                    key: "JWT_EXPIRATION",
                    value: v.clone(),
                })
            })
            .transpose()?
            .unwrap_or(24);

        let algorithm: RateLimitAlgorithm =
            vars.parse_or("RATE_LIMIT_ALGORITHM", RateLimitAlgorithm::SlidingWindow)?;
        let default_rule = RateLimitRule::new(
            algorithm,
            vars.parse_or("RATE_LIMIT_REQUESTS", 100)?,
            Duration::from_secs(vars.parse_or("RATE_LIMIT_WINDOW", 60)?),
        )?;
        let rate_limit = RateLimitPolicy::new(default_rule)
            .with_endpoint_rules(&vars.get("RATE_LIMIT_RULES").unwrap_or_default())?;

        let system_load = match vars.get("SYSTEM_LOAD") {
            None => SystemLoad::Fixed(0.0),
            Some(v) if v.eq_ignore_ascii_case("auto") => SystemLoad::Auto,
            Some(v) => SystemLoad::Fixed(v.parse().map_err(|_| ConfigError::Invalid {
                key: "SYSTEM_LOAD",
                value: v.clone(),
            })?),
        };

        Ok(Config {
            redis_url: vars.require("REDIS_URL")?,
            jwt_secret: vars.require("JWT_SECRET")?,
            jwt_expiration_secs: jwt_expiration_hours * 3600,
            jwt_cache_ttl_secs: vars.parse_or("JWT_CACHE_TTL_SECS", 300)?,
            server_host: vars.get("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            server_port: vars.parse_or("SERVER_PORT", 3000)?,
            api_base_uri: vars.get("API_BASE_URI").unwrap_or_else(|| "/api".into()),
            rate_limit,
            system_load,
            circuit_failure_threshold: vars.parse_or("CIRCUIT_FAILURE_THRESHOLD", 5)?,
            circuit_recovery_timeout_secs: vars.parse_or("CIRCUIT_RECOVERY_TIMEOUT_SECS", 60)?,
            retry_max_retries: vars.parse_or("RETRY_MAX_RETRIES", 3)?,
            retry_base_delay_ms: vars.parse_or("RETRY_BASE_DELAY_MS", 1000)?,
            integration_timeout_secs: vars.parse_or("INTEGRATION_TIMEOUT_SECS", 30)?,
            dataforseo_login: vars.get("DATAFORSEO_LOGIN"),
            dataforseo_password: vars.get("DATAFORSEO_PASSWORD"),
            dataforseo_base_url: vars
                .get("DATAFORSEO_BASE_URL")
                .unwrap_or_else(|| DEFAULT_DATAFORSEO_BASE_URL.into()),
        })
    }

    pub fn jwt_expiration(&self) -> Duration {
        Duration::from_secs(self.jwt_expiration_secs)
    }

    pub fn jwt_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.jwt_cache_ttl_secs)
    }

    pub fn circuit_recovery_timeout(&self) -> Duration {
        Duration::from_secs(self.circuit_recovery_timeout_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn integration_timeout(&self) -> Duration {
        Duration::from_secs(self.integration_timeout_secs)
    }
}

/// Empty values count as unset.
struct Vars<'a, F>(&'a F);

impl<F> Vars<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn require(&self, key: &'static str) -> Result<String, ConfigError> {
        self.get(key).ok_or(ConfigError::Missing(key))
    }

    fn parse_or<T: FromStr>(&self, key: &'static str, default: T) -> Result<T, ConfigError> {
        match self.get(key) {
            Some(v) => v.trim().parse().map_err(|_| ConfigError::Invalid { key, value: v }),
            None => Ok(default),
        }
    }
}
