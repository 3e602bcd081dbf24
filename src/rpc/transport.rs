//! HTTP transport
//!
//! Moves serialized JSON-RPC bodies to the engine and back. The engine
//! reports RPC errors with HTTP 4xx/5xx statuses and a normal JSON-RPC
//! body, so the status code is only logged; the body is always returned.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;
use tracing::{debug, trace};
use url::Url;

use crate::error::{EngineError, Result};

/// Default per-request timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Request/response byte transport
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one request body and return the response body
    async fn post(&self, body: Vec<u8>) -> Result<Vec<u8>>;

    /// Human-readable endpoint, for logs and errors
    fn endpoint(&self) -> String;
}

/// JSON-RPC over HTTP POST to `<base>/jsonrpc`
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpTransport {
    /// Create a transport for a base URL such as `http://localhost:6800`
    pub fn new(base: &str, timeout: Duration) -> Result<Self> {
        let endpoint = Url::parse(&format!("{}/jsonrpc", base.trim_end_matches('/')))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EngineError::transport_error_with_source("Failed to build HTTP client", e.to_string()))?;

        Ok(Self { client, endpoint })
    }

    /// Transport for an engine listening on the loopback interface
    pub fn localhost(port: u16, timeout: Duration) -> Result<Self> {
        Self::new(&format!("http://localhost:{}", port), timeout)
    }

    pub fn url(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(&self, body: Vec<u8>) -> Result<Vec<u8>> {
        trace!("POST {} ({} bytes)", self.endpoint, body.len());

        // A Vec body is sized, so reqwest sets Content-Length
        let response = self
            .client
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        let bytes = response.bytes().await?;

        if !status.is_success() {
            debug!("Engine answered HTTP {} ({} bytes)", status, bytes.len());
            if bytes.is_empty() {
                return Err(EngineError::transport_error_full(
                    format!("HTTP {} with empty body", status),
                    self.endpoint.as_str(),
                    "no JSON-RPC payload",
                ));
            }
        }

        Ok(bytes.to_vec())
    }

    fn endpoint(&self) -> String {
        self.endpoint.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_appends_jsonrpc() {
        let transport = HttpTransport::new("http://localhost:6800", DEFAULT_REQUEST_TIMEOUT).unwrap();
        assert_eq!(transport.url().as_str(), "http://localhost:6800/jsonrpc");

        let transport = HttpTransport::new("http://127.0.0.1:6800/", DEFAULT_REQUEST_TIMEOUT).unwrap();
        assert_eq!(transport.endpoint(), "http://127.0.0.1:6800/jsonrpc");
    }

    #[test]
    fn test_localhost() {
        let transport = HttpTransport::localhost(6123, DEFAULT_REQUEST_TIMEOUT).unwrap();
        assert_eq!(transport.url().port(), Some(6123));
    }

    #[test]
    fn test_invalid_base() {
        let err = HttpTransport::new("not a url", DEFAULT_REQUEST_TIMEOUT).unwrap_err();
        assert!(matches!(err, EngineError::ConfigError { .. }));
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        // Port 9 (discard) is almost never listening on loopback
        let transport = HttpTransport::localhost(9, Duration::from_secs(2)).unwrap();
        let err = transport.post(b"{}".to_vec()).await.unwrap_err();
        assert!(err.is_transport());
    }
}
