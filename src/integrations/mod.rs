//! Outbound content-research integrations.
//!
//! Calls return a [`FetchOutcome`] instead of collapsing failures into empty
//! lists, so callers can tell "the upstream had nothing" from "the upstream
//! could not be reached" and degrade accordingly.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

pub mod client;
pub mod dataforseo;

pub use client::ResilientClient;
pub use dataforseo::{DataForSeoClient, KeywordIdea};

use crate::config::Config;
use crate::resilience::{CircuitBreaker, CircuitBreakerConfig, RetryHandler};

#[derive(Debug, Error)]
pub enum IntegrationError {
    #[error("{0} credentials are not configured")]
    NotConfigured(&'static str),
    #[error("circuit breaker is open")]
    CircuitOpen,
    #[error("request failed: {0}")]
    Http(String),
    #[error("upstream returned status {0}")]
    Status(u16),
    #[error("unexpected response body: {0}")]
    Decode(String),
    #[error("upstream error {code}: {message}")]
    Api { code: i64, message: String },
}

impl From<reqwest::Error> for IntegrationError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            IntegrationError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            IntegrationError::Status(status.as_u16())
        } else {
            IntegrationError::Http(err.to_string())
        }
    }
}

#[derive(Debug)]
pub enum FetchOutcome<T> {
    Data(T),
    Empty,
    Failed(IntegrationError),
}

impl<T> FetchOutcome<Vec<T>> {
    pub fn from_items(items: Vec<T>) -> Self {
        if items.is_empty() {
            FetchOutcome::Empty
        } else {
            FetchOutcome::Data(items)
        }
    }
}

impl<T> FetchOutcome<T> {
    pub fn status(&self) -> OutcomeStatus {
        match self {
            FetchOutcome::Data(_) => OutcomeStatus::Ok,
            FetchOutcome::Empty => OutcomeStatus::Empty,
            FetchOutcome::Failed(_) => OutcomeStatus::Failed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Ok,
    Empty,
    Failed,
}

/// Integration clients built once at startup. They share one breaker, the
/// process-wide gate for downstream calls.
pub struct Integrations {
    pub breaker: CircuitBreaker,
    pub dataforseo: DataForSeoClient,
}

impl Integrations {
    pub fn from_config(config: &Config) -> Result<Self, IntegrationError> {
        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: config.circuit_failure_threshold,
            recovery_timeout: config.circuit_recovery_timeout(),
        });
        let retry = RetryHandler::new(config.retry_max_retries, config.retry_base_delay());
        let client = Arc::new(ResilientClient::new(
            config.integration_timeout(),
            breaker.clone(),
            retry,
        )?);

        let credentials = match (&config.dataforseo_login, &config.dataforseo_password) {
            (Some(login), Some(password)) => Some((login.clone(), password.clone())),
            _ => {
                tracing::warn!("DataForSEO credentials missing; keyword lookups will fail");
                None
            }
        };

        Ok(Self {
            breaker,
            dataforseo: DataForSeoClient::new(client, &config.dataforseo_base_url, credentials),
        })
    }
}
