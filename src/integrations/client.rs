use std::time::Duration;

use serde::de::DeserializeOwned;

use super::IntegrationError;
use crate::resilience::{CircuitBreaker, RetryHandler};

/// reqwest client behind the shared circuit breaker and a retry policy.
///
/// The breaker sees one outcome per logical call, after retries.
pub struct ResilientClient {
    http: reqwest::Client,
    breaker: CircuitBreaker,
    retry: RetryHandler,
}

impl ResilientClient {
    pub fn new(
        timeout: Duration,
        breaker: CircuitBreaker,
        retry: RetryHandler,
    ) -> Result<Self, IntegrationError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("trendtap/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            breaker,
            retry,
        })
    }

    /// Sends the request produced by `build` and decodes a JSON body.
    /// Non-2xx statuses count as failures.
    pub async fn send_json<T, B>(&self, service: &'static str, build: B) -> Result<T, IntegrationError>
    where
        T: DeserializeOwned,
        B: Fn(&reqwest::Client) -> reqwest::RequestBuilder,
    {
        if !self.breaker.is_available() {
            tracing::warn!(service, "circuit open, skipping upstream call");
            return Err(IntegrationError::CircuitOpen);
        }

        let result = self
            .retry
            .retry(|| {
                let request = build(&self.http);
                async move {
                    let response = request.send().await?;
                    let status = response.status();
                    if !status.is_success() {
                        return Err(IntegrationError::Status(status.as_u16()));
                    }
                    Ok(response.json::<T>().await?)
                }
            })
            .await;

        match &result {
            Ok(_) => self.breaker.record_success(),
            Err(e) => {
                tracing::error!(service, error = %e, "upstream call failed");
                self.breaker.record_failure();
            }
        }
        result
    }
}
