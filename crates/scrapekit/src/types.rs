//! Core types for ScrapeKit

use crate::classify::XmlNode;
use bytes::Bytes;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Header line that prefixes every successful result
pub const CONTENTS_HEADER: &str = "Contents of url:";

/// A single fetch to perform
///
/// Built once per fetch and not modified afterwards; handlers that rewrite a
/// request build a new one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScrapeRequest {
    /// Absolute http(s) URL
    pub url: String,
    /// Return raw HTML instead of a summary
    pub wants_html: bool,
    /// Extra request headers
    pub headers: BTreeMap<String, String>,
    /// Bearer token sent as `Authorization`
    pub auth_token: Option<String>,
}

impl ScrapeRequest {
    /// Create a new request for the given URL
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Request raw HTML instead of a summary
    pub fn wants_html(mut self, wants_html: bool) -> Self {
        self.wants_html = wants_html;
        self
    }

    /// Add a request header
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Attach a bearer token
    pub fn bearer(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Same request options, different URL
    pub fn with_url(&self, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..self.clone()
        }
    }
}

/// Outcome of one scrape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum FetchStatus {
    /// Fetched and processed
    Ok,
    /// Host rejected by policy, no request made
    Blocked,
    /// Network, status or handler failure
    Failed,
    /// Served from the cache
    Cached,
}

impl FetchStatus {
    /// Lower-case name, as serialized
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchStatus::Ok => "ok",
            FetchStatus::Blocked => "blocked",
            FetchStatus::Failed => "failed",
            FetchStatus::Cached => "cached",
        }
    }
}

/// Detected kind of a response body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Json,
    Xml,
    Html,
    Text,
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ContentType::Json => "json",
            ContentType::Xml => "xml",
            ContentType::Html => "html",
            ContentType::Text => "text",
        };
        f.write_str(name)
    }
}

/// Structured value produced by the classifier
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum ParsedValue {
    Json(serde_json::Value),
    Xml(XmlNode),
}

/// Result of scraping one URL
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct FetchResult {
    /// The requested URL
    pub url: String,

    /// Outcome
    pub status: FetchStatus,

    /// Detected content kind (absent for blocked/failed results)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<ContentType>,

    /// HTTP status code of the final response
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,

    /// Response body after truncation
    #[serde(skip)]
    pub raw_bytes: Bytes,

    /// True if the body exceeded `max_body_bytes` and was cut
    pub truncated: bool,

    /// Parsed JSON or XML value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parsed: Option<ParsedValue>,

    /// Condensed text for HTML/text content
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    /// Human-readable cause for blocked/failed results
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FetchResult {
    /// Result for a host rejected by policy
    pub fn blocked(url: impl Into<String>, cause: impl fmt::Display) -> Self {
        Self::unsuccessful(url, FetchStatus::Blocked, cause)
    }

    /// Result for a fetch that could not be completed
    pub fn failed(url: impl Into<String>, cause: impl fmt::Display) -> Self {
        Self::unsuccessful(url, FetchStatus::Failed, cause)
    }

    fn unsuccessful(url: impl Into<String>, status: FetchStatus, cause: impl fmt::Display) -> Self {
        Self {
            url: url.into(),
            status,
            content_type: None,
            status_code: None,
            raw_bytes: Bytes::new(),
            truncated: false,
            parsed: None,
            summary: None,
            error: Some(cause.to_string()),
        }
    }

    /// Copy of this result marked as served from the cache
    pub fn as_cached(&self) -> Self {
        let mut copy = self.clone();
        if copy.status == FetchStatus::Ok {
            copy.status = FetchStatus::Cached;
        }
        copy
    }

    /// True for `Ok` and `Cached`
    pub fn is_success(&self) -> bool {
        matches!(self.status, FetchStatus::Ok | FetchStatus::Cached)
    }

    /// The body as the caller sees it, without the header line
    ///
    /// JSON is pretty-printed, XML re-serialized, HTML/text returns the
    /// summary when one was produced and the raw body otherwise.
    pub fn body_text(&self) -> String {
        match &self.parsed {
            Some(ParsedValue::Json(value)) => {
                serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
            }
            Some(ParsedValue::Xml(node)) => node.to_xml_string(),
            None => match &self.summary {
                Some(summary) => summary.clone(),
                None => String::from_utf8_lossy(&self.raw_bytes).into_owned(),
            },
        }
    }

    /// Caller-facing text for this result
    pub fn render(&self) -> String {
        match self.status {
            FetchStatus::Ok | FetchStatus::Cached => {
                let mut output = format!("{} {}\n{}", CONTENTS_HEADER, self.url, self.body_text());
                if self.truncated {
                    output.push_str(&format!(
                        "\n\n[..content truncated after {} bytes..]",
                        self.raw_bytes.len()
                    ));
                }
                output
            }
            FetchStatus::Blocked => self
                .error
                .clone()
                .unwrap_or_else(|| format!("Blocked: {}", self.url)),
            FetchStatus::Failed => format!(
                "Failed to fetch {}: {}",
                self.url,
                self.error.as_deref().unwrap_or("unknown error")
            ),
        }
    }
}

/// Per-call scrape options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ScrapeOptions {
    /// Return raw HTML instead of a summary
    #[serde(default)]
    pub wants_html: bool,
    /// Route known domains through their handlers
    #[serde(default = "default_redirect")]
    pub redirect: bool,
}

fn default_redirect() -> bool {
    true
}

impl Default for ScrapeOptions {
    fn default() -> Self {
        Self {
            wants_html: false,
            redirect: true,
        }
    }
}

impl ScrapeOptions {
    /// Return raw HTML
    pub fn html() -> Self {
        Self {
            wants_html: true,
            ..Default::default()
        }
    }

    /// Set whether handlers are consulted
    pub fn redirect(mut self, redirect: bool) -> Self {
        self.redirect = redirect;
        self
    }
}

/// One URL or an ordered list of URLs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScrapeTarget {
    One(String),
    Many(Vec<String>),
}

impl From<&str> for ScrapeTarget {
    fn from(url: &str) -> Self {
        ScrapeTarget::One(url.to_string())
    }
}

impl From<String> for ScrapeTarget {
    fn from(url: String) -> Self {
        ScrapeTarget::One(url)
    }
}

impl From<Vec<String>> for ScrapeTarget {
    fn from(urls: Vec<String>) -> Self {
        ScrapeTarget::Many(urls)
    }
}

impl From<Vec<&str>> for ScrapeTarget {
    fn from(urls: Vec<&str>) -> Self {
        ScrapeTarget::Many(urls.into_iter().map(str::to_string).collect())
    }
}

impl From<&[&str]> for ScrapeTarget {
    fn from(urls: &[&str]) -> Self {
        ScrapeTarget::Many(urls.iter().map(|u| u.to_string()).collect())
    }
}

/// Rendered scrape output, shaped like the target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScrapeOutput {
    One(String),
    Many(Vec<String>),
}

impl ScrapeOutput {
    /// All rendered results joined into one string, in input order
    pub fn into_string(self) -> String {
        match self {
            ScrapeOutput::One(text) => text,
            ScrapeOutput::Many(texts) => texts.join("\n\n"),
        }
    }

    /// Rendered results as a list
    pub fn into_vec(self) -> Vec<String> {
        match self {
            ScrapeOutput::One(text) => vec![text],
            ScrapeOutput::Many(texts) => texts,
        }
    }
}

impl fmt::Display for ScrapeOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScrapeOutput::One(text) => f.write_str(text),
            ScrapeOutput::Many(texts) => f.write_str(&texts.join("\n\n")),
        }
    }
}
