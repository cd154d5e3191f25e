//! HTTP transport for the content delivery API
//!
//! The client never talks to `reqwest` directly; it hands an [`ApiRequest`] to
//! a [`Transport`] and gets back the status code and body bytes. Swapping the
//! transport is how tests run the client without a network.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::Client;
use thiserror::Error;
use url::Url;

/// Default timeout for a single request to the content API
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors raised before a status code could be read
#[derive(Debug, Error)]
pub enum TransportError {
    /// HTTP request failed (connection, TLS, body read, timeout)
    ///
    /// The request URL is stripped from the error since its query carries the auth token.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// A non-HTTP transport could not deliver the request
    #[error("connection failed: {0}")]
    Connection(String),
}

/// A GET request against the content API
#[derive(Debug, Clone)]
pub struct ApiRequest {
    /// Fully built URL, query parameters included
    pub url: Url,
}

/// Status code and raw body of a completed request
#[derive(Debug, Clone)]
pub struct ApiResponse {
    /// HTTP status code
    pub status: u16,
    /// Response body as received
    pub body: Vec<u8>,
}

/// Executes requests against the content API
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends `request` and returns whatever status the server answered with
    ///
    /// Non-2xx responses are *not* errors at this layer.
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, TransportError>;
}

/// [`Transport`] backed by a `reqwest` client
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Creates a transport with the default 30 second request timeout
    pub fn new() -> Result<Self, TransportError> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    /// Creates a transport with a custom request timeout
    pub fn with_timeout(timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("headless-cms/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    /// Creates a transport around an existing `reqwest` client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        let response = self
            .client
            .get(request.url)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(reqwest::Error::without_url)?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(reqwest::Error::without_url)?
            .to_vec();

        Ok(ApiResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_execute_returns_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/cdn/stories/home"))
            .and(query_param("version", "published"))
            .and(header("accept", "application/json"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"story":{}}"#))
            .expect(1)
            .mount(&server)
            .await;

        let transport = HttpTransport::new().unwrap();
        let url = Url::parse(&format!(
            "{}/v2/cdn/stories/home?version=published",
            server.uri()
        ))
        .unwrap();

        let response = transport.execute(ApiRequest { url }).await.unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.body, br#"{"story":{}}"#.to_vec());
    }

    #[tokio::test]
    async fn test_execute_passes_error_status_through() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string("not here"))
            .mount(&server)
            .await;

        let transport = HttpTransport::new().unwrap();
        let url = Url::parse(&format!("{}/missing", server.uri())).unwrap();

        let response = transport.execute(ApiRequest { url }).await.unwrap();

        assert_eq!(response.status, 404);
    }

    #[tokio::test]
    async fn test_execute_reports_connection_failure() {
        // Port 9 (discard) is essentially never listening on localhost
        let transport = HttpTransport::with_timeout(Duration::from_secs(2)).unwrap();
        let url = Url::parse("http://127.0.0.1:9/stories").unwrap();

        let result = transport.execute(ApiRequest { url }).await;

        assert!(matches!(result, Err(TransportError::Http(_))));
    }

    #[tokio::test]
    async fn test_connection_error_omits_query_token() {
        let transport = HttpTransport::with_timeout(Duration::from_secs(2)).unwrap();
        let url = Url::parse("http://127.0.0.1:9/stories/home?version=published&token=supersecret")
            .unwrap();

        let err = transport.execute(ApiRequest { url }).await.unwrap_err();

        let mut source: Option<&dyn std::error::Error> = Some(&err);
        while let Some(current) = source {
            let shown = current.to_string();
            assert!(!shown.contains("supersecret"), "token in error text: {}", shown);
            source = current.source();
        }
    }
}
