//! Error types for ScrapeKit

use thiserror::Error;

/// Errors that can occur during scrape operations
///
/// Remote conditions (timeouts, refused connections, bad statuses, handler
/// lookups that come back empty) are captured into a failed
/// [`FetchResult`](crate::FetchResult) by the scrape pipeline. Configuration
/// mistakes are returned to the caller directly.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// URL is missing
    #[error("Missing required parameter: url")]
    MissingUrl,

    /// URL could not be parsed or has an unsupported scheme
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Host rejected by the allow/deny policy
    #[error("Blocked: host '{host}' is not permitted by the host policy")]
    Blocked { host: String },

    /// Failed to build HTTP client
    #[error("Failed to create HTTP client")]
    ClientBuildError(#[source] reqwest::Error),

    /// Request timed out
    #[error("Request timed out")]
    Timeout,

    /// Failed to connect to server
    #[error("Failed to connect to server")]
    ConnectError(#[source] reqwest::Error),

    /// Server answered with a non-success status
    #[error("HTTP error: status {status}")]
    HttpStatus { status: u16 },

    /// Other request error
    #[error("Request failed: {0}")]
    RequestError(String),

    /// Domain handler reported an expected failure
    #[error("Handler error: {0}")]
    HandlerError(String),

    /// A handler with the same name is already registered
    #[error("Handler already registered: {0}")]
    DuplicateHandler(String),

    /// A helper needs a handler that is not registered
    #[error("Handler not registered: {0}")]
    HandlerNotRegistered(String),

    /// Valves failed validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ScrapeError {
    /// Create an error from a reqwest error
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ScrapeError::Timeout
        } else if err.is_connect() {
            ScrapeError::ConnectError(err)
        } else {
            ScrapeError::RequestError(err.to_string())
        }
    }

    /// Whether the fetch executor should try again after this error
    ///
    /// Network-level failures and 5xx statuses are transient. Client errors,
    /// policy blocks and handler failures are final.
    pub fn is_transient(&self) -> bool {
        match self {
            ScrapeError::Timeout | ScrapeError::ConnectError(_) | ScrapeError::RequestError(_) => {
                true
            }
            ScrapeError::HttpStatus { status } => *status >= 500,
            _ => false,
        }
    }
}
