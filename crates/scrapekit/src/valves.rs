//! Runtime settings ("valves") consulted by every scrape
//!
//! Valves are read-only for the duration of a batch. They can be replaced
//! between batches through [`Scraper::update_valves`](crate::Scraper::update_valves).

use crate::error::ScrapeError;
use crate::policy::HostPolicy;
use crate::DEFAULT_USER_AGENT;
use reqwest::header::HeaderValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

/// Configurable scrape settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Valves {
    /// User-Agent header for HTTP requests
    pub user_agent: String,
    /// Additional attempts after the first failed one
    pub retries: u32,
    /// Per-fetch timeout in seconds
    pub timeout_secs: u64,
    /// Base delay between retries in milliseconds, doubled per attempt
    pub retry_backoff_ms: u64,
    /// Pages shorter than this are returned as-is instead of summarized
    pub min_summary_size: usize,
    /// Optional cap on the length of a summary (in characters)
    pub max_summary_size: Option<usize>,
    /// Maximum number of in-flight fetches per batch
    pub concurrency: usize,
    /// Wikipedia language edition
    pub wiki_lang: String,
    /// Bearer token sent to the GitHub API
    pub github_token: Option<String>,
    /// Response bodies larger than this are truncated
    pub max_body_bytes: usize,
    /// Exact hostnames that may be fetched
    pub allow_hosts: BTreeSet<String>,
    /// Exact hostnames that may not be fetched
    pub deny_hosts: BTreeSet<String>,
    /// Number of scrape results kept in the LRU cache
    pub cache_capacity: usize,
}

impl Default for Valves {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            retries: 3,
            timeout_secs: 10,
            retry_backoff_ms: 500,
            min_summary_size: 2048,
            max_summary_size: None,
            concurrency: 4,
            wiki_lang: "en".to_string(),
            github_token: None,
            max_body_bytes: 5 * 1024 * 1024,
            allow_hosts: BTreeSet::new(),
            deny_hosts: BTreeSet::new(),
            cache_capacity: 128,
        }
    }
}

impl Valves {
    /// Check that the valves describe a usable configuration
    pub fn validate(&self) -> Result<(), ScrapeError> {
        if self.concurrency == 0 {
            return Err(ScrapeError::InvalidConfig(
                "concurrency must be at least 1".to_string(),
            ));
        }
        if self.max_body_bytes == 0 {
            return Err(ScrapeError::InvalidConfig(
                "max_body_bytes must be at least 1".to_string(),
            ));
        }
        if self.cache_capacity == 0 {
            return Err(ScrapeError::InvalidConfig(
                "cache_capacity must be at least 1".to_string(),
            ));
        }
        if self.wiki_lang.trim().is_empty() {
            return Err(ScrapeError::InvalidConfig(
                "wiki_lang must not be empty".to_string(),
            ));
        }
        if HeaderValue::from_str(&self.user_agent).is_err() {
            return Err(ScrapeError::InvalidConfig(format!(
                "user_agent is not a valid header value: {:?}",
                self.user_agent
            )));
        }
        Ok(())
    }

    /// The host allow/deny policy described by these valves
    pub fn host_policy(&self) -> HostPolicy {
        HostPolicy {
            allow_hosts: self.allow_hosts.clone(),
            deny_hosts: self.deny_hosts.clone(),
        }
    }

    /// Per-fetch timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Delay before retry number `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(factor))
    }

    /// Whether a change from `self` to `other` needs a new HTTP client
    pub(crate) fn transport_changed(&self, other: &Valves) -> bool {
        self.user_agent != other.user_agent
            || self.timeout_secs != other.timeout_secs
            || self.max_body_bytes != other.max_body_bytes
    }
}
