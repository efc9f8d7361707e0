//! Progress events emitted while scraping

use serde::Serialize;
use std::sync::Arc;

/// A progress notification for one URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScrapeEvent {
    /// Pipeline started for a URL
    Start { url: String },
    /// Result served from the cache
    CacheHit { url: String },
    /// Host rejected by policy
    Blocked { url: String, host: String },
    /// A handler took over the URL
    Routed { url: String, handler: String },
    /// One HTTP attempt is starting (1-based)
    FetchAttempt { url: String, attempt: u32 },
    /// An attempt failed and another one will follow
    FetchRetry {
        url: String,
        attempt: u32,
        wait_ms: u64,
        error: String,
    },
    /// Response received
    Fetched { url: String, status: u16 },
    /// All attempts failed
    FetchFailed {
        url: String,
        attempts: u32,
        error: String,
    },
    /// Pipeline finished for a URL
    Done { url: String, status: String },
}

/// Callback receiving progress events
pub type EventSink = Arc<dyn Fn(&ScrapeEvent) + Send + Sync>;

/// Send `event` to `sink` if one is installed
pub(crate) fn emit(sink: Option<&EventSink>, event: ScrapeEvent) {
    if let Some(sink) = sink {
        sink(&event);
    }
}
