//! Scrape session
//!
//! [`Scraper`] owns everything a batch of scrapes shares: the valves, the
//! pooled transport, the handler registry, the summarizer and the result
//! cache. Each URL runs through the same pipeline:
//!
//! 1. URL validation
//! 2. Host policy (blocked hosts never reach the cache or the network)
//! 3. Cache lookup
//! 4. Handler routing, or the generic fetch executor
//! 5. Classification and summarization
//!
//! At most `concurrency` network fetches are in flight per session, across
//! every batch and single-URL call. Batches return results in input order.

use crate::cache::{CacheKey, ScrapeCache};
use crate::classify::classify;
use crate::error::ScrapeError;
use crate::events::{emit, EventSink, ScrapeEvent};
use crate::executor::FetchExecutor;
use crate::handlers::{Handler, HandlerContext, HandlerOutcome, HandlerRegistry, WikipediaHandler};
use crate::summarize::{truncate_chars, Summarizer};
use crate::transport::{HttpTransport, Transport, TransportResponse};
use crate::types::{
    ContentType, FetchResult, FetchStatus, ScrapeOptions, ScrapeOutput, ScrapeRequest,
    ScrapeTarget,
};
use crate::valves::Valves;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info};
use url::Url;

/// Builder for [`Scraper`]
#[derive(Default)]
pub struct ScraperBuilder {
    valves: Valves,
    transport: Option<Arc<dyn Transport>>,
    registry: Option<HandlerRegistry>,
    handlers: Vec<Box<dyn Handler>>,
    summarizer: Option<Summarizer>,
    events: Option<EventSink>,
}

impl ScraperBuilder {
    /// Create a builder with default valves and the built-in handlers
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the valves
    pub fn valves(mut self, valves: Valves) -> Self {
        self.valves = valves;
        self
    }

    /// Use a custom transport instead of the reqwest client
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Replace the whole handler registry (use an empty one to disable routing)
    pub fn handlers(mut self, registry: HandlerRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Register an additional handler after the existing ones
    pub fn handler(mut self, handler: impl Handler + 'static) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }

    /// Use a custom summarizer
    pub fn summarizer(mut self, summarizer: Summarizer) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    /// Receive progress events
    pub fn on_event<F>(mut self, sink: F) -> Self
    where
        F: Fn(&ScrapeEvent) + Send + Sync + 'static,
    {
        self.events = Some(Arc::new(sink));
        self
    }

    /// Build the scraper
    ///
    /// Fails on invalid valves, duplicate handler names, or when the HTTP
    /// client cannot be created.
    pub fn build(self) -> Result<Scraper, ScrapeError> {
        self.valves.validate()?;

        let custom_transport = self.transport.is_some();
        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new(&self.valves)?),
        };

        let mut registry = self.registry.unwrap_or_else(HandlerRegistry::with_defaults);
        for handler in self.handlers {
            registry.register(handler)?;
        }

        let valves = Arc::new(self.valves);
        let executor = FetchExecutor::new(transport.clone(), valves.clone(), self.events.clone());

        debug!(handlers = ?registry.names(), "Scraper ready");

        Ok(Scraper {
            cache: ScrapeCache::new(valves.cache_capacity),
            permits: Arc::new(Semaphore::new(valves.concurrency)),
            valves,
            transport,
            custom_transport,
            executor,
            registry,
            summarizer: self.summarizer.unwrap_or_default(),
            events: self.events,
        })
    }
}

/// A scrape session
pub struct Scraper {
    valves: Arc<Valves>,
    transport: Arc<dyn Transport>,
    custom_transport: bool,
    executor: FetchExecutor,
    registry: HandlerRegistry,
    summarizer: Summarizer,
    cache: ScrapeCache,
    /// Session-wide cap on in-flight fetches
    permits: Arc<Semaphore>,
    events: Option<EventSink>,
}

impl std::fmt::Debug for Scraper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scraper")
            .field("valves", &self.valves)
            .field("handlers", &self.registry)
            .field("summarizer", &self.summarizer)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl Scraper {
    /// Create a builder
    pub fn builder() -> ScraperBuilder {
        ScraperBuilder::new()
    }

    /// Create a scraper with default valves
    pub fn new() -> Result<Self, ScrapeError> {
        Self::builder().build()
    }

    /// Scrape one URL or a list of URLs, rendering each result
    pub async fn scrape(
        &self,
        target: impl Into<ScrapeTarget>,
        options: ScrapeOptions,
    ) -> ScrapeOutput {
        match target.into() {
            ScrapeTarget::One(url) => ScrapeOutput::One(self.scrape_one(&url, options).await),
            ScrapeTarget::Many(urls) => ScrapeOutput::Many(
                self.scrape_many(&urls, options)
                    .await
                    .iter()
                    .map(FetchResult::render)
                    .collect(),
            ),
        }
    }

    /// Scrape one URL and render the result
    pub async fn scrape_one(&self, url: &str, options: ScrapeOptions) -> String {
        self.fetch_result(url, options).await.render()
    }

    /// Scrape a list of URLs concurrently, returning results in input order
    pub async fn scrape_many<S: AsRef<str>>(
        &self,
        urls: &[S],
        options: ScrapeOptions,
    ) -> Vec<FetchResult> {
        self.scrape_many_with(urls, options, &self.valves).await
    }

    async fn scrape_many_with<S: AsRef<str>>(
        &self,
        urls: &[S],
        options: ScrapeOptions,
        valves: &Valves,
    ) -> Vec<FetchResult> {
        let mut indexed: Vec<(usize, FetchResult)> = stream::iter(urls.iter().enumerate())
            .map(|(index, url)| async move {
                (index, self.fetch_result_with(url.as_ref(), options, valves).await)
            })
            .buffer_unordered(valves.concurrency)
            .collect()
            .await;

        indexed.sort_by_key(|(index, _)| *index);
        indexed.into_iter().map(|(_, result)| result).collect()
    }

    /// Scrape one URL and return the structured result
    pub async fn fetch_result(&self, url: &str, options: ScrapeOptions) -> FetchResult {
        self.fetch_result_with(url, options, &self.valves).await
    }

    async fn fetch_result_with(
        &self,
        url: &str,
        options: ScrapeOptions,
        valves: &Valves,
    ) -> FetchResult {
        emit(
            self.events.as_ref(),
            ScrapeEvent::Start {
                url: url.to_string(),
            },
        );

        let result = self.run_pipeline(url, options, valves).await;

        info!(url = %url, status = result.status.as_str(), "Scrape finished");
        emit(
            self.events.as_ref(),
            ScrapeEvent::Done {
                url: url.to_string(),
                status: result.status.as_str().to_string(),
            },
        );
        result
    }

    /// Fetch Wikipedia articles by title in the `wiki_lang` edition
    pub async fn wikipedia<S: AsRef<str>>(
        &self,
        titles: &[S],
        wants_html: bool,
    ) -> Result<Vec<FetchResult>, ScrapeError> {
        self.wikipedia_in(&self.valves.wiki_lang, titles, wants_html)
            .await
    }

    /// Fetch Wikipedia articles by title in the given language edition
    ///
    /// Both the page URLs and the API queries use `lang` for this call only.
    /// Fails with [`ScrapeError::HandlerNotRegistered`] when the `wikipedia`
    /// handler has been removed.
    pub async fn wikipedia_in<S: AsRef<str>>(
        &self,
        lang: &str,
        titles: &[S],
        wants_html: bool,
    ) -> Result<Vec<FetchResult>, ScrapeError> {
        if self.registry.get("wikipedia").is_none() {
            return Err(ScrapeError::HandlerNotRegistered("wikipedia".to_string()));
        }

        let urls: Vec<String> = titles
            .iter()
            .map(|title| WikipediaHandler::page_url(lang, title.as_ref()))
            .collect();
        let options = ScrapeOptions {
            wants_html,
            redirect: true,
        };
        let valves = Valves {
            wiki_lang: lang.to_string(),
            ..(*self.valves).clone()
        };
        Ok(self.scrape_many_with(&urls, options, &valves).await)
    }

    /// Register a handler after the existing ones
    pub fn register_handler(&mut self, handler: impl Handler + 'static) -> Result<(), ScrapeError> {
        self.registry.register(Box::new(handler))?;
        self.cache.clear();
        Ok(())
    }

    /// Replace the handler with the same name, keeping its priority
    pub fn replace_handler(&mut self, handler: impl Handler + 'static) -> Option<Box<dyn Handler>> {
        let previous = self.registry.replace(Box::new(handler));
        self.cache.clear();
        previous
    }

    /// Remove a handler by name
    pub fn unregister_handler(&mut self, name: &str) -> Option<Box<dyn Handler>> {
        let removed = self.registry.unregister(name);
        if removed.is_some() {
            self.cache.clear();
        }
        removed
    }

    /// Name of the handler that would take over `url`
    pub fn handler_for(&self, url: &str) -> Option<&'static str> {
        let url = Url::parse(url).ok()?;
        self.registry.route(&url).map(|handler| handler.name())
    }

    /// Current valves
    pub fn valves(&self) -> &Valves {
        &self.valves
    }

    /// Replace the valves between batches
    ///
    /// Rebuilds the HTTP client when the user agent, timeout or body cap
    /// changed (unless a custom transport is installed).
    pub fn update_valves(&mut self, valves: Valves) -> Result<(), ScrapeError> {
        valves.validate()?;

        if !self.custom_transport && self.valves.transport_changed(&valves) {
            debug!("Transport settings changed, rebuilding HTTP client");
            self.transport = Arc::new(HttpTransport::new(&valves)?);
        }
        if self.valves.cache_capacity != valves.cache_capacity {
            self.cache.resize(valves.cache_capacity);
        }
        if self.valves.concurrency != valves.concurrency {
            self.permits = Arc::new(Semaphore::new(valves.concurrency));
        }

        self.valves = Arc::new(valves);
        self.executor = FetchExecutor::new(
            self.transport.clone(),
            self.valves.clone(),
            self.events.clone(),
        );
        Ok(())
    }

    /// Number of cached results
    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    /// Forget every cached result
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// End the session, dropping cached results and pooled connections
    pub fn close(self) {
        debug!(cached = self.cache.len(), "Closing scraper");
        self.cache.clear();
    }

    async fn run_pipeline(
        &self,
        url: &str,
        options: ScrapeOptions,
        valves: &Valves,
    ) -> FetchResult {
        let parsed = match parse_target(url) {
            Ok(parsed) => parsed,
            Err(err) => {
                debug!(url = %url, error = %err, "Rejected URL");
                return FetchResult::failed(url, err);
            }
        };

        let host = parsed.host_str().unwrap_or_default();
        if !valves.host_policy().is_allowed(host) {
            info!(url = %url, host = %host, "Host blocked by policy");
            emit(
                self.events.as_ref(),
                ScrapeEvent::Blocked {
                    url: url.to_string(),
                    host: host.to_string(),
                },
            );
            return FetchResult::blocked(
                url,
                ScrapeError::Blocked {
                    host: host.to_string(),
                },
            );
        }

        let key = CacheKey::new(&parsed, &options, valves);
        let (mut result, hit) = self
            .cache
            .get_or_fetch(key, || self.produce(url, &parsed, options, valves))
            .await;

        if hit {
            emit(
                self.events.as_ref(),
                ScrapeEvent::CacheHit {
                    url: url.to_string(),
                },
            );
        }
        result.url = url.to_string();
        result
    }

    async fn produce(
        &self,
        url: &str,
        parsed: &Url,
        options: ScrapeOptions,
        valves: &Valves,
    ) -> FetchResult {
        let request = ScrapeRequest::new(parsed.as_str()).wants_html(options.wants_html);
        // Never closed, so acquire cannot fail
        let _permit = self.permits.acquire().await;
        match self.dispatch(&request, parsed, options.redirect, valves).await {
            Ok(response) => self.process(url, response, options),
            Err(err) => FetchResult::failed(url, err),
        }
    }

    async fn dispatch(
        &self,
        request: &ScrapeRequest,
        parsed: &Url,
        redirect: bool,
        valves: &Valves,
    ) -> Result<TransportResponse, ScrapeError> {
        let handler = if redirect {
            self.registry.route(parsed)
        } else {
            None
        };

        let Some(handler) = handler else {
            return self.executor.execute(request).await;
        };

        debug!(handler = handler.name(), url = %request.url, "Using handler");
        emit(
            self.events.as_ref(),
            ScrapeEvent::Routed {
                url: request.url.clone(),
                handler: handler.name().to_string(),
            },
        );

        let ctx = HandlerContext {
            executor: &self.executor,
            valves,
        };
        match handler.handle(request, &ctx).await? {
            HandlerOutcome::Delegate(rewritten) => self.executor.execute(&rewritten).await,
            HandlerOutcome::Fetched(response) => Ok(response),
        }
    }

    /// Classify the body and summarize HTML/text as the options require
    fn process(&self, url: &str, response: TransportResponse, options: ScrapeOptions) -> FetchResult {
        let (content_type, parsed) = classify(&response.body, response.content_type.as_deref());

        let summary = match content_type {
            ContentType::Html if !options.wants_html => {
                let html = String::from_utf8_lossy(&response.body);
                let summary = self
                    .summarizer
                    .summarize(&html, self.valves.min_summary_size);
                Some(match self.valves.max_summary_size {
                    Some(max) => truncate_chars(&summary, max),
                    None => summary,
                })
            }
            ContentType::Text => self.valves.max_summary_size.map(|max| {
                truncate_chars(&String::from_utf8_lossy(&response.body), max)
            }),
            _ => None,
        };

        debug!(url = %url, content_type = %content_type, bytes = response.body.len(), truncated = response.truncated, "Processed response");

        FetchResult {
            url: url.to_string(),
            status: FetchStatus::Ok,
            content_type: Some(content_type),
            status_code: Some(response.status_code),
            raw_bytes: response.body,
            truncated: response.truncated,
            parsed,
            summary,
            error: None,
        }
    }
}

/// Parse and validate a URL to scrape
fn parse_target(url: &str) -> Result<Url, ScrapeError> {
    if url.trim().is_empty() {
        return Err(ScrapeError::MissingUrl);
    }
    let parsed = Url::parse(url.trim()).map_err(|_| ScrapeError::InvalidUrl(url.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(ScrapeError::InvalidUrl(url.to_string()));
    }
    Ok(parsed)
}
