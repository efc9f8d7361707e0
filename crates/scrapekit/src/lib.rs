//! ScrapeKit - concurrent URL scraping for LLM tools
//!
//! Fetches URLs, classifies the returned content and produces either the raw
//! structured data or a condensed text summary. Known domains are rerouted to
//! their native APIs for higher-fidelity results.
//!
//! ## Pipeline
//!
//! Every URL passes through the same stages inside a [`Scraper`]:
//! host policy ([`HostPolicy`]), cache ([`ScrapeCache`]), handler routing
//! ([`HandlerRegistry`]) or the generic [`FetchExecutor`], then
//! classification ([`classify`]) and summarization ([`Summarizer`]).
//! Expected failures never escape as errors: they come back as
//! [`FetchResult`]s with status `Blocked` or `Failed`.
//!
//! ## Handlers
//!
//! Built-in handlers:
//! - [`WikipediaHandler`] - article URLs answered with plain-text extracts
//! - [`GitHubHandler`] - repository URLs rewritten to REST API endpoints
//!
//! ```no_run
//! # async fn demo() -> Result<(), scrapekit::ScrapeError> {
//! use scrapekit::{ScrapeOptions, Scraper};
//!
//! let scraper = Scraper::new()?;
//! let text = scraper
//!     .scrape(vec!["https://example.com", "https://github.com/rust-lang/rust"], ScrapeOptions::default())
//!     .await;
//! println!("{}", text);
//! # Ok(())
//! # }
//! ```

mod cache;
mod classify;
mod convert;
mod error;
mod events;
mod executor;
pub mod handlers;
mod policy;
mod session;
mod summarize;
mod tool;
mod transport;
mod types;
mod valves;

pub use cache::{CacheKey, ScrapeCache};
pub use classify::{classify, XmlNode};
pub use convert::{html_to_markdown, html_to_plain_text};
pub use error::ScrapeError;
pub use events::{EventSink, ScrapeEvent};
pub use executor::FetchExecutor;
pub use handlers::{
    GitHubHandler, Handler, HandlerContext, HandlerOutcome, HandlerRegistry, WikipediaHandler,
};
pub use policy::{is_allowed, HostPolicy};
pub use session::{Scraper, ScraperBuilder};
pub use summarize::{
    summarize, truncate_chars, MarkdownExtractor, StructuralExtractor, Summarizer, TextExtractor,
};
pub use tool::{ScrapeToolInput, ScrapeToolOutput, Tool, ToolBuilder};
pub use transport::{HttpTransport, Transport, TransportResponse};
pub use types::{
    ContentType, FetchResult, FetchStatus, ParsedValue, ScrapeOptions, ScrapeOutput,
    ScrapeRequest, ScrapeTarget, CONTENTS_HEADER,
};
pub use valves::Valves;

/// Default User-Agent string
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0 ScrapeKit/0.1";

/// Tool description for LLM consumption
pub const TOOL_DESCRIPTION: &str = r#"Scrapes one or more URLs and returns their content.

- HTML pages are condensed to readable text unless raw HTML is requested
- JSON and XML are returned as structured data
- Wikipedia and GitHub URLs are answered through their APIs
- Results are returned in input order; failures are reported, never invented"#;

/// Extended documentation for LLM consumption (llmtxt)
pub const TOOL_LLMTXT: &str = r#"# ScrapeKit Tool

Scrapes one or more URLs and returns their content, one result per URL.

## Capabilities
- Concurrent fetching with retries and a result cache
- HTML to markdown summarization (pages under the size threshold are returned as-is)
- JSON and XML detection with structured output
- Wikipedia article URLs answered with plain-text extracts
- GitHub page URLs rewritten to the GitHub REST API (JSON)
- Host allow/deny lists

## Input Parameters
- `urls` (required): URLs to scrape (http:// or https://)
- `wants_html` (optional): Return raw HTML instead of a summary (default: false)
- `redirect` (optional): Route Wikipedia/GitHub URLs through their APIs (default: true)

## Output Fields
- `results`: One entry per input URL, in input order
  - `url`: The requested URL
  - `status`: "ok", "cached", "blocked" or "failed"
  - `content_type`: "json", "xml", "html" or "text"
  - `status_code`: HTTP status code
  - `truncated`: True if the body exceeded the size cap
  - `parsed`: Structured JSON/XML value
  - `summary`: Condensed text for HTML pages
  - `error`: Cause for blocked/failed results
- `text`: Every result rendered as text, each starting with `Contents of url: <url>`

## Examples

### Summarize a page
```json
{"urls": ["https://example.com"]}
```

### Several pages at once
```json
{"urls": ["https://en.wikipedia.org/wiki/Rust_(programming_language)", "https://github.com/rust-lang/rust"]}
```

### Raw HTML
```json
{"urls": ["https://example.com"], "wants_html": true}
```

## Error Handling
- Blocked hosts are reported as `Blocked: host '<host>' ...` without a request
- Network errors, timeouts and HTTP errors are reported as `Failed to fetch <url>: <cause>`
- Missing Wikipedia articles are reported as failures
"#;
