//! HTML summarization
//!
//! Two extraction strategies are tried in order: markdown conversion first,
//! structural text extraction if that yields nothing. Pages below the
//! minimum size are returned unchanged.

use crate::convert::{html_to_markdown, html_to_plain_text};
use tracing::debug;

/// A strategy for turning HTML into readable text
///
/// Returns `None` when the strategy cannot produce anything useful for the
/// given input, which hands the page to the next strategy.
pub trait TextExtractor: Send + Sync {
    /// Strategy name for logging
    fn name(&self) -> &'static str;

    /// Extract text from HTML
    fn extract(&self, html: &str) -> Option<String>;
}

/// Markdown conversion (primary strategy)
#[derive(Debug, Default, Clone, Copy)]
pub struct MarkdownExtractor;

impl TextExtractor for MarkdownExtractor {
    fn name(&self) -> &'static str {
        "markdown"
    }

    fn extract(&self, html: &str) -> Option<String> {
        let text = html_to_markdown(html);
        (!text.trim().is_empty()).then_some(text)
    }
}

/// Text-node extraction through a full HTML parse (fallback strategy)
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuralExtractor;

impl TextExtractor for StructuralExtractor {
    fn name(&self) -> &'static str {
        "structural"
    }

    fn extract(&self, html: &str) -> Option<String> {
        let text = html_to_plain_text(html);
        (!text.is_empty()).then_some(text)
    }
}

/// Size-gated HTML summarizer with a primary and a fallback strategy
pub struct Summarizer {
    primary: Box<dyn TextExtractor>,
    fallback: Box<dyn TextExtractor>,
}

impl Default for Summarizer {
    fn default() -> Self {
        Self::new(Box::new(MarkdownExtractor), Box::new(StructuralExtractor))
    }
}

impl std::fmt::Debug for Summarizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Summarizer")
            .field("primary", &self.primary.name())
            .field("fallback", &self.fallback.name())
            .finish()
    }
}

impl Summarizer {
    /// Create a summarizer from two strategies
    pub fn new(primary: Box<dyn TextExtractor>, fallback: Box<dyn TextExtractor>) -> Self {
        Self { primary, fallback }
    }

    /// Convert HTML to text with whichever strategy succeeds first
    ///
    /// Falls back to the original HTML when neither strategy finds any text,
    /// so the caller never receives an empty answer for a non-empty page.
    pub fn convert(&self, html: &str) -> String {
        if let Some(text) = self.primary.extract(html) {
            return text;
        }
        debug!(
            primary = self.primary.name(),
            fallback = self.fallback.name(),
            "Primary extractor produced no text, using fallback"
        );
        self.fallback
            .extract(html)
            .unwrap_or_else(|| html.to_string())
    }

    /// Summarize HTML unless it is shorter than `min_summary_size` bytes
    pub fn summarize(&self, html: &str, min_summary_size: usize) -> String {
        if html.len() < min_summary_size {
            return html.to_string();
        }
        self.convert(html)
    }
}

/// Summarize HTML with the default strategies
pub fn summarize(html: &str, min_summary_size: usize) -> String {
    Summarizer::default().summarize(html, min_summary_size)
}

/// Cut `text` to at most `max_chars` characters
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Unavailable;

    impl TextExtractor for Unavailable {
        fn name(&self) -> &'static str {
            "unavailable"
        }

        fn extract(&self, _html: &str) -> Option<String> {
            None
        }
    }

    fn long_page() -> String {
        let paragraphs: String = (0..40)
            .map(|i| format!("<div class=\"para\" id=\"p{i}\"><p>Paragraph {i} text.</p></div>\n"))
            .collect();
        format!(
            "<!DOCTYPE html><html><head><title>Long</title><script>var tracking = {{}};</script></head><body>{}</body></html>",
            paragraphs
        )
    }

    #[test]
    fn test_small_page_returned_as_is() {
        let html = "<html><body><p>hi</p></body></html>";
        assert_eq!(summarize(html, 1000), html);
    }

    #[test]
    fn test_large_page_is_condensed() {
        let html = long_page();
        let summary = summarize(&html, 100);
        assert!(summary.len() * 2 < html.len());
        assert!(summary.contains("Paragraph 0 text."));
        assert!(summary.contains("Paragraph 39 text."));
        assert!(!summary.contains("tracking"));
    }

    #[test]
    fn test_zero_threshold_always_summarizes() {
        let summary = summarize("<p>Hello <b>there</b></p>", 0);
        assert_eq!(summary, "Hello **there**");
    }

    #[test]
    fn test_fallback_used_when_primary_unavailable() {
        let summarizer = Summarizer::new(Box::new(Unavailable), Box::new(StructuralExtractor));
        let summary = summarizer.summarize("<p>Hello <b>there</b></p>", 0);
        assert_eq!(summary, "Hello there");
    }

    #[test]
    fn test_empty_extraction_returns_original() {
        let html = "<html><head><script>var x=1;</script></head><body></body></html>";
        assert_eq!(summarize(html, 0), html);
    }

    #[test]
    fn test_deterministic() {
        let html = long_page();
        assert_eq!(summarize(&html, 0), summarize(&html, 0));
        let structural = Summarizer::new(Box::new(Unavailable), Box::new(StructuralExtractor));
        assert_eq!(structural.convert(&html), structural.convert(&html));
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("hello", 3), "hel");
        assert_eq!(truncate_chars("hello", 10), "hello");
        assert_eq!(truncate_chars("héllo", 2), "hé");
    }
}
