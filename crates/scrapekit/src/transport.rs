//! HTTP transport
//!
//! The transport performs exactly one request and reads the body up to the
//! configured cap. Status policy, retries and classification happen above it.

use crate::error::ScrapeError;
use crate::types::ScrapeRequest;
use crate::valves::Valves;
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, CONTENT_TYPE,
    DNT, UPGRADE_INSECURE_REQUESTS,
};
use tracing::warn;

/// Raw response handed back by a [`Transport`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportResponse {
    /// Final URL after redirects
    pub url: String,
    /// HTTP status code
    pub status_code: u16,
    /// Content-Type header value
    pub content_type: Option<String>,
    /// Body, cut at `max_body_bytes`
    pub body: Bytes,
    /// True if the body was cut
    pub truncated: bool,
}

impl TransportResponse {
    /// A 200 response with the given content type and body
    pub fn ok(url: impl Into<String>, content_type: &str, body: impl Into<Bytes>) -> Self {
        Self {
            url: url.into(),
            status_code: 200,
            content_type: Some(content_type.to_string()),
            body: body.into(),
            truncated: false,
        }
    }

    /// True for 2xx statuses
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

/// Executes a single HTTP request
///
/// Implement this trait to plug in a different HTTP stack, or a scripted one
/// in tests.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send the request and read the response body
    async fn send(&self, request: &ScrapeRequest) -> Result<TransportResponse, ScrapeError>;
}

/// reqwest-backed transport with a pooled client
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    max_body_bytes: usize,
}

impl HttpTransport {
    /// Build a transport from the user agent, timeout and body cap in `valves`
    pub fn new(valves: &Valves) -> Result<Self, ScrapeError> {
        let client = reqwest::Client::builder()
            .default_headers(browser_headers())
            .user_agent(valves.user_agent.as_str())
            .connect_timeout(valves.timeout())
            .timeout(valves.timeout())
            .build()
            .map_err(ScrapeError::ClientBuildError)?;

        Ok(Self {
            client,
            max_body_bytes: valves.max_body_bytes,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &ScrapeRequest) -> Result<TransportResponse, ScrapeError> {
        let mut http_request = self.client.get(&request.url);

        for (name, value) in &request.headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => http_request = http_request.header(name, value),
                _ => warn!(header = %name, url = %request.url, "Skipping invalid request header"),
            }
        }

        if let Some(ref token) = request.auth_token {
            http_request = http_request.bearer_auth(token);
        }

        let response = http_request
            .send()
            .await
            .map_err(ScrapeError::from_reqwest)?;

        let url = response.url().to_string();
        let status_code = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let (body, truncated) = read_body_capped(response, self.max_body_bytes).await?;

        Ok(TransportResponse {
            url,
            status_code,
            content_type,
            body,
            truncated,
        })
    }
}

/// Request headers of a regular desktop browser
fn browser_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
        ),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));
    headers.insert(UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));
    headers.insert(DNT, HeaderValue::from_static("1"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("max-age=0"));
    headers
}

/// Read the response body, stopping once `max_bytes` have been collected
async fn read_body_capped(
    response: reqwest::Response,
    max_bytes: usize,
) -> Result<(Bytes, bool), ScrapeError> {
    let mut body = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(ScrapeError::from_reqwest)?;
        let remaining = max_bytes.saturating_sub(body.len());
        if chunk.len() > remaining {
            body.extend_from_slice(&chunk[..remaining]);
            warn!(max_bytes, "Body exceeded size cap, truncating");
            return Ok((Bytes::from(body), true));
        }
        body.extend_from_slice(&chunk);
    }

    Ok((Bytes::from(body), false))
}
