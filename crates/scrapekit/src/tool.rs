//! Tool builder and contract for LLM hosts

use crate::error::ScrapeError;
use crate::session::{Scraper, ScraperBuilder};
use crate::types::{FetchResult, ScrapeOptions};
use crate::valves::Valves;
use crate::{TOOL_DESCRIPTION, TOOL_LLMTXT};
use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};

/// Tool input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ScrapeToolInput {
    /// URLs to scrape, in the order results should be returned
    pub urls: Vec<String>,

    /// Return raw HTML instead of a summary
    #[serde(default)]
    pub wants_html: bool,

    /// Route Wikipedia and GitHub URLs through their APIs (default true)
    #[serde(default = "default_true")]
    pub redirect: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ScrapeToolInput {
    fn default() -> Self {
        Self {
            urls: Vec::new(),
            wants_html: false,
            redirect: true,
        }
    }
}

impl ScrapeToolInput {
    /// Input for a list of URLs with default options
    pub fn new<I, S>(urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            urls: urls.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }
}

/// Tool output
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct ScrapeToolOutput {
    /// One result per input URL, in input order
    pub results: Vec<FetchResult>,
    /// All results rendered as text, in input order
    pub text: String,
}

/// Builder for configuring the scrape tool
#[derive(Debug, Clone)]
pub struct ToolBuilder {
    valves: Valves,
    enable_html: bool,
}

impl Default for ToolBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolBuilder {
    /// Create a new tool builder with default valves and HTML output enabled
    pub fn new() -> Self {
        Self {
            valves: Valves::default(),
            enable_html: true,
        }
    }

    /// Allow callers to request raw HTML
    pub fn enable_html(mut self, enable: bool) -> Self {
        self.enable_html = enable;
        self
    }

    /// Replace all valves
    pub fn valves(mut self, valves: Valves) -> Self {
        self.valves = valves;
        self
    }

    /// Set custom User-Agent
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.valves.user_agent = ua.into();
        self
    }

    /// Add a host to the allow list
    pub fn allow_host(mut self, host: impl Into<String>) -> Self {
        self.valves.allow_hosts.insert(host.into());
        self
    }

    /// Add a host to the deny list
    pub fn deny_host(mut self, host: impl Into<String>) -> Self {
        self.valves.deny_hosts.insert(host.into());
        self
    }

    /// Build the tool
    pub fn build(self) -> Result<Tool, ScrapeError> {
        self.build_with(Scraper::builder())
    }

    /// Build the tool on top of a preconfigured scraper builder
    ///
    /// The builder's valves are replaced with the tool's.
    pub fn build_with(self, builder: ScraperBuilder) -> Result<Tool, ScrapeError> {
        Ok(Tool {
            scraper: builder.valves(self.valves).build()?,
            enable_html: self.enable_html,
        })
    }
}

/// Configured scrape tool
#[derive(Debug)]
pub struct Tool {
    scraper: Scraper,
    enable_html: bool,
}

impl Tool {
    /// Create a new tool builder
    pub fn builder() -> ToolBuilder {
        ToolBuilder::new()
    }

    /// Get tool description
    pub fn description(&self) -> &'static str {
        TOOL_DESCRIPTION
    }

    /// Get full documentation (llmtxt)
    pub fn llmtxt(&self) -> &'static str {
        TOOL_LLMTXT
    }

    /// Underlying scraper
    pub fn scraper(&self) -> &Scraper {
        &self.scraper
    }

    /// Get input schema as JSON
    pub fn input_schema(&self) -> serde_json::Value {
        let schema = schema_for!(ScrapeToolInput);
        let mut value = serde_json::to_value(schema).unwrap_or_default();

        if !self.enable_html {
            if let Some(props) = value.get_mut("properties").and_then(|p| p.as_object_mut()) {
                props.remove("wants_html");
            }
        }

        value
    }

    /// Get output schema as JSON
    pub fn output_schema(&self) -> serde_json::Value {
        let schema = schema_for!(ScrapeToolOutput);
        serde_json::to_value(schema).unwrap_or_default()
    }

    /// Execute the tool
    ///
    /// Per-URL failures are reported inside the output; only an empty URL
    /// list is an error.
    pub async fn execute(&self, input: ScrapeToolInput) -> Result<ScrapeToolOutput, ScrapeError> {
        if input.urls.is_empty() {
            return Err(ScrapeError::MissingUrl);
        }

        let options = ScrapeOptions {
            wants_html: input.wants_html && self.enable_html,
            redirect: input.redirect,
        };
        let results = self.scraper.scrape_many(&input.urls, options).await;
        let text = results
            .iter()
            .map(FetchResult::render)
            .collect::<Vec<_>>()
            .join("\n\n");

        Ok(ScrapeToolOutput { results, text })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_builder() {
        let tool = Tool::builder()
            .enable_html(false)
            .user_agent("TestAgent/1.0")
            .allow_host("allowed.com")
            .deny_host("blocked.com")
            .build()
            .unwrap();

        assert!(!tool.enable_html);
        let valves = tool.scraper().valves();
        assert_eq!(valves.user_agent, "TestAgent/1.0");
        assert!(valves.allow_hosts.contains("allowed.com"));
        assert!(valves.deny_hosts.contains("blocked.com"));
    }

    #[test]
    fn test_tool_description() {
        let tool = Tool::builder().build().unwrap();
        assert!(!tool.description().is_empty());
        assert!(tool.llmtxt().contains("## Input Parameters"));
    }

    #[test]
    fn test_tool_schemas() {
        let tool = Tool::builder().build().unwrap();
        let input_schema = tool.input_schema();
        let output_schema = tool.output_schema();

        assert!(input_schema["properties"]["urls"].is_object());
        assert!(input_schema["properties"]["wants_html"].is_object());
        assert!(output_schema["properties"]["results"].is_object());
        assert!(output_schema["properties"]["text"].is_object());
    }

    #[test]
    fn test_tool_schema_feature_gating() {
        let tool = Tool::builder().enable_html(false).build().unwrap();
        let schema = tool.input_schema();
        let props = schema["properties"].as_object().unwrap();
        assert!(!props.contains_key("wants_html"));
        assert!(props.contains_key("urls"));
    }

    #[test]
    fn test_input_defaults() {
        let input: ScrapeToolInput =
            serde_json::from_str(r#"{"urls": ["https://example.com"]}"#).unwrap();
        assert_eq!(input, ScrapeToolInput::new(["https://example.com"]));
        assert!(input.redirect);
        assert!(!input.wants_html);
    }

    #[tokio::test]
    async fn test_execute_requires_urls() {
        let tool = Tool::builder().build().unwrap();
        let err = tool.execute(ScrapeToolInput::default()).await.unwrap_err();
        assert!(matches!(err, ScrapeError::MissingUrl));
    }

    #[tokio::test]
    async fn test_execute_reports_blocked_hosts() {
        let tool = Tool::builder().deny_host("blocked.test").build().unwrap();
        let output = tool
            .execute(ScrapeToolInput::new(["https://blocked.test/page"]))
            .await
            .unwrap();
        assert_eq!(output.results.len(), 1);
        assert_eq!(output.results[0].status, crate::FetchStatus::Blocked);
        assert!(output.text.starts_with("Blocked: host 'blocked.test'"));
    }
}
