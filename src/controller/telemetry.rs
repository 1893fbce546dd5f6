//! Telemetry client for instant-value queries against a Prometheus-compatible
//! metrics endpoint.
//!
//! This is the only I/O the reconciler performs to observe SLOs. Production
//! code uses `HttpTelemetryClient`; tests use `MockTelemetryClient`.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("telemetry endpoint not configured")]
    ConfigMissing,

    #[error("telemetry query failed: {0}")]
    Transient(String),

    #[error("telemetry returned no data")]
    Empty,

    #[error("telemetry returned a malformed value: {0}")]
    Malformed(String),
}

/// Queries a single scalar from a telemetry backend.
///
/// `query` is opaque to this trait — it is whatever query language the
/// backend expects (PromQL for the HTTP implementation).
#[async_trait]
pub trait TelemetryQuerier: Send + Sync {
    async fn query(&self, endpoint: &str, query: &str) -> Result<f64, TelemetryError>;
}

/// Production client: issues `GET {endpoint}/api/v1/query?query=...` and
/// parses the Prometheus instant-vector response shape.
pub struct HttpTelemetryClient {
    http: reqwest::Client,
}

impl HttpTelemetryClient {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
        }
    }
}

impl Default for HttpTelemetryClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TelemetryQuerier for HttpTelemetryClient {
    async fn query(&self, endpoint: &str, query: &str) -> Result<f64, TelemetryError> {
        if query.is_empty() {
            return Ok(0.0);
        }
        if endpoint.is_empty() {
            return Err(TelemetryError::ConfigMissing);
        }

        let url = format!("{}/api/v1/query", endpoint.trim_end_matches('/'));
        let response = self
            .http
            .get(&url)
            .query(&[("query", query)])
            .send()
            .await
            .map_err(|e| TelemetryError::Transient(e.to_string()))?;

        let body = response
            .text()
            .await
            .map_err(|e| TelemetryError::Transient(e.to_string()))?;

        parse_instant_query(&body)
    }
}

/// Test double: returns a preconfigured value or error for every query, or a
/// per-query queue when sequencing matters across reconciles.
#[derive(Default)]
pub struct MockTelemetryClient {
    queue: std::sync::Mutex<Vec<Result<f64, TelemetryError>>>,
    fallback: std::sync::Mutex<Option<Result<f64, TelemetryError>>>,
}

impl MockTelemetryClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call returns this value until overridden.
    pub fn set_fixed(&self, value: Result<f64, TelemetryError>) {
        *self.fallback.lock().expect("mock lock poisoned") = Some(value);
    }

    /// Enqueue a value to be returned by the next `query` call, FIFO.
    pub fn enqueue(&self, value: Result<f64, TelemetryError>) {
        self.queue.lock().expect("mock lock poisoned").push(value);
    }
}

#[async_trait]
impl TelemetryQuerier for MockTelemetryClient {
    async fn query(&self, _endpoint: &str, query: &str) -> Result<f64, TelemetryError> {
        if query.is_empty() {
            return Ok(0.0);
        }
        let mut queue = self.queue.lock().expect("mock lock poisoned");
        if !queue.is_empty() {
            return queue.remove(0);
        }
        drop(queue);
        self.fallback
            .lock()
            .expect("mock lock poisoned")
            .clone()
            .unwrap_or(Ok(0.0))
    }
}

#[derive(Debug, Deserialize)]
struct InstantQueryResponse {
    status: String,
    data: InstantQueryData,
}

#[derive(Debug, Deserialize)]
struct InstantQueryData {
    result: Vec<InstantQueryResult>,
}

#[derive(Debug, Deserialize)]
struct InstantQueryResult {
    value: (f64, String),
}

fn parse_instant_query(body: &str) -> Result<f64, TelemetryError> {
    let response: InstantQueryResponse =
        serde_json::from_str(body).map_err(|e| TelemetryError::Malformed(e.to_string()))?;

    if response.status != "success" {
        return Err(TelemetryError::Empty);
    }

    let result = response.data.result.first().ok_or(TelemetryError::Empty)?;

    let value: f64 = result
        .value
        .1
        .parse()
        .map_err(|_| TelemetryError::Malformed(result.value.1.clone()))?;

    if value.is_nan() || value.is_infinite() {
        return Err(TelemetryError::Malformed(result.value.1.clone()));
    }

    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_query_skips_network_and_returns_zero() {
        let client = HttpTelemetryClient::new();
        let value = client.query("http://example.invalid", "").await.unwrap();
        assert_eq!(value, 0.0);
    }

    #[tokio::test]
    async fn empty_endpoint_fails_config_missing() {
        let client = HttpTelemetryClient::new();
        let err = client
            .query("", "up")
            .await
            .expect_err("should fail without endpoint");
        assert!(matches!(err, TelemetryError::ConfigMissing));
    }

    #[test]
    fn parses_successful_instant_query() {
        let body = r#"{"status":"success","data":{"result":[{"value":[1.0,"12.5"]}]}}"#;
        assert_eq!(parse_instant_query(body).unwrap(), 12.5);
    }

    #[test]
    fn empty_result_is_telemetry_empty() {
        let body = r#"{"status":"success","data":{"result":[]}}"#;
        assert!(matches!(
            parse_instant_query(body),
            Err(TelemetryError::Empty)
        ));
    }

    #[test]
    fn error_status_is_telemetry_empty() {
        let body = r#"{"status":"error","data":{"result":[]}}"#;
        assert!(matches!(
            parse_instant_query(body),
            Err(TelemetryError::Empty)
        ));
    }

    #[test]
    fn nan_value_is_malformed() {
        let body = r#"{"status":"success","data":{"result":[{"value":[1.0,"NaN"]}]}}"#;
        assert!(matches!(
            parse_instant_query(body),
            Err(TelemetryError::Malformed(_))
        ));
    }

    #[test]
    fn unparsable_value_is_malformed() {
        let body = r#"{"status":"success","data":{"result":[{"value":[1.0,"not-a-number"]}]}}"#;
        assert!(matches!(
            parse_instant_query(body),
            Err(TelemetryError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn mock_client_returns_queued_then_fallback() {
        let mock = MockTelemetryClient::new();
        mock.enqueue(Ok(1.0));
        mock.enqueue(Ok(2.0));
        mock.set_fixed(Ok(99.0));

        assert_eq!(mock.query("x", "q").await.unwrap(), 1.0);
        assert_eq!(mock.query("x", "q").await.unwrap(), 2.0);
        assert_eq!(mock.query("x", "q").await.unwrap(), 99.0);
        assert_eq!(mock.query("x", "q").await.unwrap(), 99.0);
    }

    #[tokio::test]
    async fn mock_client_empty_query_short_circuits() {
        let mock = MockTelemetryClient::new();
        mock.set_fixed(Err(TelemetryError::Transient("unreachable".into())));
        assert_eq!(mock.query("x", "").await.unwrap(), 0.0);
    }
}
