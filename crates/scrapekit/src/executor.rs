//! Fetch executor: one logical fetch with sequential retries

use crate::error::ScrapeError;
use crate::events::{emit, EventSink, ScrapeEvent};
use crate::transport::{Transport, TransportResponse};
use crate::types::{FetchResult, FetchStatus, ScrapeRequest};
use crate::valves::Valves;
use std::sync::Arc;
use tracing::{debug, warn};

/// Runs requests through a [`Transport`], retrying transient failures
///
/// Non-2xx responses are treated as errors. Only transient errors (see
/// [`ScrapeError::is_transient`]) are retried, at most `valves.retries`
/// times, with exponential backoff between attempts.
#[derive(Clone)]
pub struct FetchExecutor {
    transport: Arc<dyn Transport>,
    valves: Arc<Valves>,
    events: Option<EventSink>,
}

impl std::fmt::Debug for FetchExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchExecutor")
            .field("retries", &self.valves.retries)
            .field("retry_backoff_ms", &self.valves.retry_backoff_ms)
            .finish_non_exhaustive()
    }
}

impl FetchExecutor {
    /// Create an executor over `transport` using the retry settings in `valves`
    pub fn new(
        transport: Arc<dyn Transport>,
        valves: Arc<Valves>,
        events: Option<EventSink>,
    ) -> Self {
        Self {
            transport,
            valves,
            events,
        }
    }

    /// Perform the request, returning the first successful response
    pub async fn execute(&self, request: &ScrapeRequest) -> Result<TransportResponse, ScrapeError> {
        let max_attempts = self.valves.retries.saturating_add(1);
        let mut attempt: u32 = 1;

        loop {
            debug!(url = %request.url, attempt, max_attempts, "Fetching");
            emit(
                self.events.as_ref(),
                ScrapeEvent::FetchAttempt {
                    url: request.url.clone(),
                    attempt,
                },
            );

            let outcome = match self.transport.send(request).await {
                Ok(response) if response.is_success() => Ok(response),
                Ok(response) => Err(ScrapeError::HttpStatus {
                    status: response.status_code,
                }),
                Err(err) => Err(err),
            };

            match outcome {
                Ok(response) => {
                    debug!(url = %request.url, status = response.status_code, bytes = response.body.len(), "Fetched");
                    emit(
                        self.events.as_ref(),
                        ScrapeEvent::Fetched {
                            url: request.url.clone(),
                            status: response.status_code,
                        },
                    );
                    return Ok(response);
                }
                Err(err) if err.is_transient() && attempt < max_attempts => {
                    let wait = self.valves.backoff(attempt);
                    warn!(url = %request.url, attempt, wait_ms = wait.as_millis() as u64, error = %err, "Fetch failed, retrying");
                    emit(
                        self.events.as_ref(),
                        ScrapeEvent::FetchRetry {
                            url: request.url.clone(),
                            attempt,
                            wait_ms: wait.as_millis() as u64,
                            error: err.to_string(),
                        },
                    );
                    if !wait.is_zero() {
                        tokio::time::sleep(wait).await;
                    }
                    attempt += 1;
                }
                Err(err) => {
                    warn!(url = %request.url, attempts = attempt, error = %err, "Fetch failed");
                    emit(
                        self.events.as_ref(),
                        ScrapeEvent::FetchFailed {
                            url: request.url.clone(),
                            attempts: attempt,
                            error: err.to_string(),
                        },
                    );
                    return Err(err);
                }
            }
        }
    }

    /// Perform the request and capture the outcome in a [`FetchResult`]
    ///
    /// Never fails: errors become `Failed` results. The body is left
    /// unclassified; the scrape pipeline classifies and summarizes it.
    pub async fn fetch(&self, request: &ScrapeRequest) -> FetchResult {
        match self.execute(request).await {
            Ok(response) => FetchResult {
                url: request.url.clone(),
                status: FetchStatus::Ok,
                content_type: None,
                status_code: Some(response.status_code),
                raw_bytes: response.body,
                truncated: response.truncated,
                parsed: None,
                summary: None,
                error: None,
            },
            Err(err) => FetchResult::failed(&request.url, err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Replays a fixed sequence of outcomes, repeating the last one
    struct Scripted {
        outcomes: Mutex<VecDeque<Result<u16, &'static str>>>,
        calls: AtomicU32,
    }

    impl Scripted {
        fn new(outcomes: Vec<Result<u16, &'static str>>) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(outcomes.into()),
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl Transport for Scripted {
        async fn send(&self, request: &ScrapeRequest) -> Result<TransportResponse, ScrapeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut outcomes = self.outcomes.lock().unwrap();
            let next = if outcomes.len() > 1 {
                outcomes.pop_front().unwrap()
            } else {
                *outcomes.front().unwrap()
            };
            match next {
                Ok(status) => {
                    let mut response = TransportResponse::ok(&request.url, "text/plain", "body");
                    response.status_code = status;
                    Ok(response)
                }
                Err(msg) => Err(ScrapeError::RequestError(msg.to_string())),
            }
        }
    }

    fn executor(transport: Arc<Scripted>, retries: u32) -> FetchExecutor {
        let valves = Valves {
            retries,
            retry_backoff_ms: 0,
            ..Default::default()
        };
        FetchExecutor::new(transport, Arc::new(valves), None)
    }

    #[tokio::test]
    async fn test_success_first_attempt() {
        let transport = Scripted::new(vec![Ok(200)]);
        let result = executor(transport.clone(), 3)
            .fetch(&ScrapeRequest::new("https://example.com"))
            .await;
        assert_eq!(result.status, FetchStatus::Ok);
        assert_eq!(result.status_code, Some(200));
        assert_eq!(&result.raw_bytes[..], b"body");
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_bound() {
        let transport = Scripted::new(vec![Err("connection reset")]);
        let result = executor(transport.clone(), 2)
            .fetch(&ScrapeRequest::new("https://example.com"))
            .await;
        assert_eq!(result.status, FetchStatus::Failed);
        assert!(result.raw_bytes.is_empty());
        assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failure() {
        let transport = Scripted::new(vec![Ok(503), Err("reset"), Ok(200)]);
        let result = executor(transport.clone(), 3)
            .fetch(&ScrapeRequest::new("https://example.com"))
            .await;
        assert_eq!(result.status, FetchStatus::Ok);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_client_error_not_retried() {
        let transport = Scripted::new(vec![Ok(404)]);
        let result = executor(transport.clone(), 3)
            .fetch(&ScrapeRequest::new("https://example.com/missing"))
            .await;
        assert_eq!(result.status, FetchStatus::Failed);
        assert_eq!(result.error.as_deref(), Some("HTTP error: status 404"));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_retries_single_attempt() {
        let transport = Scripted::new(vec![Ok(500)]);
        let err = executor(transport.clone(), 0)
            .execute(&ScrapeRequest::new("https://example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, ScrapeError::HttpStatus { status: 500 }));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_events_emitted_per_attempt() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let sink: EventSink = Arc::new(move |event: &ScrapeEvent| {
            seen_clone.lock().unwrap().push(event.clone());
        });
        let valves = Valves {
            retries: 1,
            retry_backoff_ms: 0,
            ..Default::default()
        };
        let transport = Scripted::new(vec![Err("reset"), Ok(200)]);
        let executor = FetchExecutor::new(transport, Arc::new(valves), Some(sink));
        executor
            .execute(&ScrapeRequest::new("https://example.com"))
            .await
            .unwrap();

        let seen = seen.lock().unwrap();
        assert!(matches!(seen[0], ScrapeEvent::FetchAttempt { attempt: 1, .. }));
        assert!(matches!(seen[1], ScrapeEvent::FetchRetry { attempt: 1, .. }));
        assert!(matches!(seen[2], ScrapeEvent::FetchAttempt { attempt: 2, .. }));
        assert!(matches!(seen[3], ScrapeEvent::Fetched { status: 200, .. }));
    }
}
