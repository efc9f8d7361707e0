//! Wikipedia handler
//!
//! Article URLs are answered from the MediaWiki query API as plain-text
//! extracts, which are far smaller than the rendered page. The query goes to
//! the `wiki_lang` edition whatever edition the page URL names.

use crate::error::ScrapeError;
use crate::handlers::{Handler, HandlerContext, HandlerOutcome};
use crate::transport::TransportResponse;
use crate::types::ScrapeRequest;
use async_trait::async_trait;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use serde::Deserialize;
use std::collections::BTreeMap;
use url::Url;

/// Characters escaped when a title is put into an article path
const TITLE_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Handler for `*.wikipedia.org`
#[derive(Debug, Clone, Default)]
pub struct WikipediaHandler {
    api_url: Option<String>,
}

impl WikipediaHandler {
    /// Create a handler that queries the `wiki_lang` edition
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a handler that sends every API query to `api_url`
    pub fn with_api_url(api_url: impl Into<String>) -> Self {
        Self {
            api_url: Some(api_url.into()),
        }
    }

    /// Article URL for `title` in the `lang` edition
    pub fn page_url(lang: &str, title: &str) -> String {
        let path = title.trim().replace(' ', "_");
        format!(
            "https://{}.wikipedia.org/wiki/{}",
            lang,
            utf8_percent_encode(&path, TITLE_ENCODE_SET)
        )
    }

    /// Normalized article title from an article URL
    ///
    /// Supports `/wiki/{Title}` and `/w/index.php?title={Title}`.
    pub fn title_from_url(url: &Url) -> Option<String> {
        let raw = match url.path().strip_prefix("/wiki/") {
            Some(encoded) => percent_decode_str(encoded).decode_utf8_lossy().into_owned(),
            None if url.path() == "/w/index.php" => url
                .query_pairs()
                .find(|(key, _)| key == "title")
                .map(|(_, value)| value.into_owned())?,
            None => return None,
        };
        normalize_title(&raw)
    }

    fn api_url(&self, page: &Url, lang: &str, title: &str) -> Result<Url, ScrapeError> {
        let base = match self.api_url {
            Some(ref api_url) => api_url.clone(),
            None => format!("{}://{}.wikipedia.org/w/api.php", page.scheme(), lang),
        };
        Url::parse_with_params(
            &base,
            &[
                ("action", "query"),
                ("prop", "extracts"),
                ("explaintext", "1"),
                ("redirects", "1"),
                ("format", "json"),
                ("titles", title),
            ],
        )
        .map_err(|e| ScrapeError::InvalidUrl(e.to_string()))
    }
}

/// MediaWiki title rules: underscores are spaces, first letter upper-case
fn normalize_title(raw: &str) -> Option<String> {
    let title = raw.replace('_', " ");
    let title = title.trim();
    let mut chars = title.chars();
    let first = chars.next()?;
    Some(first.to_uppercase().chain(chars).collect())
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    query: Option<Query>,
}

#[derive(Debug, Deserialize)]
struct Query {
    #[serde(default)]
    pages: BTreeMap<String, Page>,
}

#[derive(Debug, Deserialize)]
struct Page {
    #[serde(default)]
    extract: Option<String>,
    #[serde(default)]
    missing: Option<serde_json::Value>,
}

#[async_trait]
impl Handler for WikipediaHandler {
    fn name(&self) -> &'static str {
        "wikipedia"
    }

    fn domain_suffixes(&self) -> &[&str] {
        &["wikipedia.org"]
    }

    async fn handle(
        &self,
        request: &ScrapeRequest,
        ctx: &HandlerContext<'_>,
    ) -> Result<HandlerOutcome, ScrapeError> {
        let url = Url::parse(&request.url).map_err(|e| ScrapeError::InvalidUrl(e.to_string()))?;

        if url.path() == "/w/api.php" || request.wants_html {
            return Ok(HandlerOutcome::Delegate(request.clone()));
        }

        let title = Self::title_from_url(&url).ok_or_else(|| {
            ScrapeError::HandlerError(format!(
                "Could not determine a Wikipedia article title from {}",
                request.url
            ))
        })?;

        let api_url = self.api_url(&url, &ctx.valves.wiki_lang, &title)?;
        tracing::debug!(url = %request.url, title = %title, api_url = %api_url, "Querying Wikipedia extracts");

        let response = ctx
            .executor
            .execute(&request.with_url(api_url.as_str()))
            .await?;

        let parsed: QueryResponse = serde_json::from_slice(&response.body).map_err(|e| {
            ScrapeError::HandlerError(format!("Unexpected Wikipedia API response: {}", e))
        })?;

        let extracts: Vec<String> = parsed
            .query
            .map(|query| query.pages.into_values())
            .into_iter()
            .flatten()
            .filter(|page| page.missing.is_none())
            .filter_map(|page| page.extract)
            .filter(|extract| !extract.trim().is_empty())
            .collect();

        if extracts.is_empty() {
            return Err(ScrapeError::HandlerError(format!(
                "No Wikipedia article found for '{}'",
                title
            )));
        }

        Ok(HandlerOutcome::Fetched(TransportResponse {
            url: response.url,
            status_code: response.status_code,
            content_type: Some("text/plain; charset=utf-8".to_string()),
            body: extracts.join("\n\n").into(),
            truncated: response.truncated,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn title(url: &str) -> Option<String> {
        WikipediaHandler::title_from_url(&Url::parse(url).unwrap())
    }

    #[test]
    fn test_title_from_wiki_path() {
        assert_eq!(
            title("https://en.wikipedia.org/wiki/Rust_(programming_language)"),
            Some("Rust (programming language)".to_string())
        );
        assert_eq!(
            title("https://en.wikipedia.org/wiki/caf%C3%A9"),
            Some("Café".to_string())
        );
        assert_eq!(
            title("https://en.wikipedia.org/wiki/AC/DC#History"),
            Some("AC/DC".to_string())
        );
    }

    #[test]
    fn test_title_from_index_php() {
        assert_eq!(
            title("https://en.wikipedia.org/w/index.php?title=Alan_Turing&oldid=1"),
            Some("Alan Turing".to_string())
        );
    }

    #[test]
    fn test_no_title() {
        assert_eq!(title("https://en.wikipedia.org/"), None);
        assert_eq!(title("https://en.wikipedia.org/wiki/"), None);
        assert_eq!(title("https://en.wikipedia.org/w/index.php"), None);
    }

    #[test]
    fn test_page_url_round_trip() {
        let url = WikipediaHandler::page_url("de", "Zürich (city)");
        assert_eq!(url, "https://de.wikipedia.org/wiki/Z%C3%BCrich_(city)");
        assert_eq!(
            WikipediaHandler::title_from_url(&Url::parse(&url).unwrap()),
            Some("Zürich (city)".to_string())
        );
    }

    #[test]
    fn test_api_url_uses_wiki_lang() {
        let handler = WikipediaHandler::new();
        let page = Url::parse("https://en.wikipedia.org/wiki/Berlin").unwrap();
        let api = handler.api_url(&page, "de", "Berlin").unwrap();
        assert_eq!(api.host_str(), Some("de.wikipedia.org"));
        assert!(api.query_pairs().any(|(k, v)| k == "titles" && v == "Berlin"));

        let page = Url::parse("https://fr.m.wikipedia.org/wiki/Paris").unwrap();
        let api = handler.api_url(&page, "en", "Paris").unwrap();
        assert_eq!(api.host_str(), Some("en.wikipedia.org"));
        assert_eq!(api.path(), "/w/api.php");
        assert!(api.query_pairs().any(|(k, v)| k == "titles" && v == "Paris"));
        assert!(api.query_pairs().any(|(k, v)| k == "prop" && v == "extracts"));

        let portal = Url::parse("https://www.wikipedia.org/wiki/Paris").unwrap();
        let api = handler.api_url(&portal, "simple", "Paris").unwrap();
        assert_eq!(api.host_str(), Some("simple.wikipedia.org"));
    }

    #[test]
    fn test_matches_subdomains_only() {
        let handler = WikipediaHandler::new();
        assert!(handler.matches("en.wikipedia.org"));
        assert!(handler.matches("wikipedia.org"));
        assert!(!handler.matches("wikipedia.org.evil.com"));
        assert!(!handler.matches("fakewikipedia.org"));
    }

    #[test]
    fn test_missing_page_parse() {
        let body = r#"{"batchcomplete":"","query":{"pages":{"-1":{"ns":0,"title":"Nope","missing":""}}}}"#;
        let parsed: QueryResponse = serde_json::from_str(body).unwrap();
        let page = parsed.query.unwrap().pages.remove("-1").unwrap();
        assert!(page.missing.is_some());
        assert!(page.extract.is_none());
    }
}
