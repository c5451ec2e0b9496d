//! HTTP transport used by probes, discovery, and telemetry polling
//!
//! Every request is bounded end to end (connect, headers, and body) by the
//! caller's timeout. The [`Transport`] trait is the seam tests replace with
//! an in-memory fake.

use reqwest::header::ACCEPT;
use reqwest::Url;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Errors from a single HTTP exchange
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Request timed out")]
    Timeout,

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Unexpected HTTP status {0}")]
    Status(u16),

    #[error("Malformed response body: {0}")]
    Decode(String),
}

/// Minimal GET-only transport the discovery and session logic run on
pub trait Transport: Send + Sync + 'static {
    /// GET `url` and parse the body as JSON
    fn get_json(
        &self,
        url: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<Value, TransportError>> + Send;

    /// GET `url` and return the raw body
    fn get_bytes(
        &self,
        url: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<Vec<u8>, TransportError>> + Send;
}

/// Join a server address and an endpoint path
///
/// `endpoint("http://host:5000/", "status")` → `http://host:5000/status`
pub fn endpoint(address: &str, path: &str) -> String {
    format!(
        "{}/{}",
        address.trim().trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Parse and validate a request URL (http or https with a host)
fn parse_url(url: &str) -> Result<Url, TransportError> {
    let parsed = Url::parse(url).map_err(|e| TransportError::InvalidAddress(format!("{url}: {e}")))?;
    match parsed.scheme() {
        "http" | "https" if parsed.host_str().is_some_and(|h| !h.is_empty()) => Ok(parsed),
        _ => Err(TransportError::InvalidAddress(url.to_string())),
    }
}

/// reqwest-backed transport
#[derive(Clone, Debug, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport with a fresh connection pool
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Wrap an existing client (shared pool, custom TLS, proxies)
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn send(&self, url: &str, accept: &'static str) -> Result<reqwest::Response, TransportError> {
        let url = parse_url(url)?;
        let response = self
            .client
            .get(url)
            .header(ACCEPT, accept)
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }
        Ok(response)
    }
}

impl Transport for HttpTransport {
    async fn get_json(&self, url: &str, timeout: Duration) -> Result<Value, TransportError> {
        let request = async {
            let response = self.send(url, "application/json").await?;
            response
                .json::<Value>()
                .await
                .map_err(|e| TransportError::Decode(e.to_string()))
        };
        tokio::time::timeout(timeout, request)
            .await
            .map_err(|_| TransportError::Timeout)?
    }

    async fn get_bytes(&self, url: &str, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        let request = async {
            let response = self.send(url, "*/*").await?;
            response
                .bytes()
                .await
                .map(|b| b.to_vec())
                .map_err(|e| TransportError::Request(e.to_string()))
        };
        tokio::time::timeout(timeout, request)
            .await
            .map_err(|_| TransportError::Timeout)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn test_endpoint_joins_paths() {
        assert_eq!(endpoint("http://a:5000", "status"), "http://a:5000/status");
        assert_eq!(endpoint("http://a:5000/", "/status"), "http://a:5000/status");
        assert_eq!(endpoint(" http://a:5000 ", "detections"), "http://a:5000/detections");
    }

    #[test]
    fn test_parse_url_rejects_garbage() {
        assert!(parse_url("/status").is_err());
        assert!(parse_url("not a url/status").is_err());
        assert!(parse_url("ftp://host/status").is_err());
        assert!(parse_url("http://192.168.1.5:5000/status").is_ok());
    }

    #[tokio::test]
    async fn test_empty_address_is_invalid() {
        let transport = HttpTransport::new();
        let err = transport
            .get_json(&endpoint("", "status"), Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::InvalidAddress(_)));
    }

    #[tokio::test]
    async fn test_hanging_server_times_out() {
        // Accept connections and read the request, but never answer
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                held.push(socket);
            }
        });

        let transport = HttpTransport::new();
        let start = Instant::now();
        let result = transport
            .get_json(&format!("http://{addr}/status"), Duration::from_millis(300))
            .await;
        let elapsed = start.elapsed();

        assert_eq!(result, Err(TransportError::Timeout));
        assert!(elapsed >= Duration::from_millis(300));
        assert!(elapsed < Duration::from_millis(1300), "took {elapsed:?}");
    }

    #[tokio::test]
    async fn test_slow_body_times_out() {
        // Headers arrive promptly but the body never completes
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let _ = socket
                    .write_all(
                        b"HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 100\r\n\r\n{\"status\":",
                    )
                    .await;
                held.push(socket);
            }
        });

        let transport = HttpTransport::new();
        let start = Instant::now();
        let result = transport
            .get_json(&format!("http://{addr}/status"), Duration::from_millis(300))
            .await;

        assert_eq!(result, Err(TransportError::Timeout));
        assert!(start.elapsed() < Duration::from_millis(1300));
    }

    #[tokio::test]
    async fn test_refused_connection_is_request_error() {
        // Bind then drop to get a port nobody listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport = HttpTransport::new();
        let result = transport
            .get_json(&format!("http://{addr}/status"), Duration::from_secs(2))
            .await;
        assert!(matches!(result, Err(TransportError::Request(_))));
    }
}
