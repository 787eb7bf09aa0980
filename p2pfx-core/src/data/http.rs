//! Blocking HTTP transport shared by the live adapters.
//!
//! One request per call; retries are the caller's `RetryPolicy`. Status
//! handling feeds the circuit breaker: 403 trips it, 429 and 5xx count as
//! failures, 2xx resets the counter.

use super::circuit_breaker::CircuitBreaker;
use super::provider::FetchError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    /// Per-request timeout.
    pub timeout_secs: u64,
    pub user_agent: String,
    pub breaker_threshold: u32,
    pub breaker_cooldown_secs: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            user_agent: "Mozilla/5.0".into(),
            breaker_threshold: 5,
            breaker_cooldown_secs: 30 * 60,
        }
    }
}

impl HttpSettings {
    pub fn breaker(&self) -> CircuitBreaker {
        CircuitBreaker::new(
            Duration::from_secs(self.breaker_cooldown_secs),
            self.breaker_threshold,
        )
    }
}

pub struct HttpTransport {
    client: reqwest::blocking::Client,
    breaker: Arc<CircuitBreaker>,
}

impl HttpTransport {
    pub fn new(settings: &HttpSettings, breaker: Arc<CircuitBreaker>) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .user_agent(settings.user_agent.clone())
            .build()
            .map_err(|e| FetchError::ClientSetup(e.to_string()))?;
        Ok(Self { client, breaker })
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// POST a JSON body and return the response text.
    pub fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<String, FetchError> {
        self.ensure_allowed()?;
        let resp = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .json(body)
            .send()
            .map_err(|e| FetchError::NetworkUnreachable(format!("{url}: {e}")))?;
        self.read_body(url, resp)
    }

    /// GET with extra headers and return the response text.
    pub fn get_text(&self, url: &str, headers: &[(&str, &str)]) -> Result<String, FetchError> {
        self.ensure_allowed()?;
        let mut req = self.client.get(url);
        for (name, value) in headers {
            req = req.header(*name, *value);
        }
        let resp = req
            .send()
            .map_err(|e| FetchError::NetworkUnreachable(format!("{url}: {e}")))?;
        self.read_body(url, resp)
    }

    fn ensure_allowed(&self) -> Result<(), FetchError> {
        if self.breaker.is_allowed() {
            Ok(())
        } else {
            Err(FetchError::CircuitBreakerTripped)
        }
    }

    fn read_body(&self, url: &str, resp: reqwest::blocking::Response) -> Result<String, FetchError> {
        let status = resp.status();

        if status == reqwest::StatusCode::FORBIDDEN {
            self.breaker.trip();
            return Err(FetchError::CircuitBreakerTripped);
        }

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            self.breaker.record_failure();
            let retry_after_secs = resp
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .unwrap_or(60);
            return Err(FetchError::RateLimited { retry_after_secs });
        }

        if !status.is_success() {
            if status.is_server_error() {
                self.breaker.record_failure();
            }
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let text = resp
            .text()
            .map_err(|e| FetchError::NetworkUnreachable(format!("{url}: reading body: {e}")))?;
        self.breaker.record_success();
        Ok(text)
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("breaker", &self.breaker)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_defaults_fill_missing_fields() {
        let settings: HttpSettings = serde_json::from_str(r#"{"timeout_secs": 3}"#).unwrap();
        assert_eq!(settings.timeout_secs, 3);
        assert_eq!(settings.breaker_threshold, 5);
        assert_eq!(settings.breaker_cooldown_secs, 1800);
    }

    #[test]
    fn open_breaker_refuses_before_sending() {
        let breaker = Arc::new(CircuitBreaker::default_provider());
        breaker.trip();
        let transport = HttpTransport::new(&HttpSettings::default(), breaker).unwrap();
        let err = transport
            .get_text("http://127.0.0.1:9/never", &[])
            .unwrap_err();
        assert!(matches!(err, FetchError::CircuitBreakerTripped));
    }
}
