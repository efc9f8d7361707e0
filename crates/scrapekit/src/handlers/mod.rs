//! Domain handlers
//!
//! A handler takes over URLs on the domains it claims and either rewrites the
//! request (for example to a REST API) or fetches the content itself. Its
//! output then goes through the same classification and summarization as any
//! other response.
//!
//! The registry dispatches to the first registered handler that matches the
//! URL host. Handler names are unique; [`HandlerRegistry::replace`] swaps a
//! handler in place, keeping its priority.

mod github;
mod wikipedia;

pub use github::{GitHubHandler, GITHUB_ROUTES};
pub use wikipedia::WikipediaHandler;

use crate::error::ScrapeError;
use crate::executor::FetchExecutor;
use crate::transport::TransportResponse;
use crate::types::ScrapeRequest;
use crate::valves::Valves;
use async_trait::async_trait;
use url::Url;

/// What a handler did with a request
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerOutcome {
    /// Fetch this request through the generic executor
    Delegate(ScrapeRequest),
    /// The handler fetched the content itself
    Fetched(TransportResponse),
}

/// Resources available to a handler while it runs
#[derive(Debug, Clone, Copy)]
pub struct HandlerContext<'a> {
    /// Executor with the session's transport and retry settings
    pub executor: &'a FetchExecutor,
    /// Valves in effect for the current batch
    pub valves: &'a Valves,
}

/// Trait for domain-specific handlers
#[async_trait]
pub trait Handler: Send + Sync {
    /// Unique identifier for this handler
    fn name(&self) -> &'static str;

    /// Domains this handler claims, without a leading dot
    fn domain_suffixes(&self) -> &[&str];

    /// Returns true if this handler should take over URLs on `host`
    ///
    /// The default matches a claimed domain exactly or any subdomain of it.
    fn matches(&self, host: &str) -> bool {
        self.domain_suffixes().iter().any(|suffix| {
            host == *suffix
                || host
                    .strip_suffix(suffix)
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
    }

    /// Handle a request for a matching URL
    ///
    /// Expected failures (unknown page, unmappable path) are reported as
    /// [`ScrapeError::HandlerError`] and end up in a failed result.
    async fn handle(
        &self,
        request: &ScrapeRequest,
        ctx: &HandlerContext<'_>,
    ) -> Result<HandlerOutcome, ScrapeError>;
}

/// Ordered set of handlers with unique names
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: Vec<Box<dyn Handler>>,
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl HandlerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the built-in Wikipedia and GitHub handlers
    pub fn with_defaults() -> Self {
        Self {
            handlers: vec![
                Box::new(WikipediaHandler::new()),
                Box::new(GitHubHandler::new()),
            ],
        }
    }

    /// Register a handler after the existing ones
    ///
    /// Fails with [`ScrapeError::DuplicateHandler`] if the name is taken.
    pub fn register(&mut self, handler: Box<dyn Handler>) -> Result<(), ScrapeError> {
        if self.position(handler.name()).is_some() {
            return Err(ScrapeError::DuplicateHandler(handler.name().to_string()));
        }
        self.handlers.push(handler);
        Ok(())
    }

    /// Replace the handler with the same name, keeping its position
    ///
    /// Appends when no handler has that name. Returns the replaced handler.
    pub fn replace(&mut self, handler: Box<dyn Handler>) -> Option<Box<dyn Handler>> {
        match self.position(handler.name()) {
            Some(index) => Some(std::mem::replace(&mut self.handlers[index], handler)),
            None => {
                self.handlers.push(handler);
                None
            }
        }
    }

    /// Remove a handler by name
    pub fn unregister(&mut self, name: &str) -> Option<Box<dyn Handler>> {
        self.position(name).map(|index| self.handlers.remove(index))
    }

    /// First handler whose domains match the URL host
    pub fn route(&self, url: &Url) -> Option<&dyn Handler> {
        let host = url.host_str()?;
        self.handlers
            .iter()
            .find(|handler| handler.matches(host))
            .map(|handler| handler.as_ref())
    }

    /// Look up a handler by name
    pub fn get(&self, name: &str) -> Option<&dyn Handler> {
        self.position(name).map(|index| self.handlers[index].as_ref())
    }

    /// Handler names in priority order
    pub fn names(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|handler| handler.name()).collect()
    }

    /// Number of registered handlers
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// True when no handlers are registered
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.handlers.iter().position(|handler| handler.name() == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named {
        name: &'static str,
        domains: &'static [&'static str],
    }

    #[async_trait]
    impl Handler for Named {
        fn name(&self) -> &'static str {
            self.name
        }

        fn domain_suffixes(&self) -> &[&str] {
            self.domains
        }

        async fn handle(
            &self,
            request: &ScrapeRequest,
            _ctx: &HandlerContext<'_>,
        ) -> Result<HandlerOutcome, ScrapeError> {
            Ok(HandlerOutcome::Delegate(request.clone()))
        }
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_registry_with_defaults() {
        let registry = HandlerRegistry::with_defaults();
        assert_eq!(registry.names(), vec!["wikipedia", "github"]);
    }

    #[test]
    fn test_route_by_domain() {
        let registry = HandlerRegistry::with_defaults();
        let name = |u: &str| registry.route(&url(u)).map(|h| h.name());

        assert_eq!(name("https://en.wikipedia.org/wiki/Rust"), Some("wikipedia"));
        assert_eq!(name("https://de.m.wikipedia.org/wiki/Rust"), Some("wikipedia"));
        assert_eq!(name("https://github.com/rust-lang/rust"), Some("github"));
        assert_eq!(name("https://api.github.com/repos/a/b"), Some("github"));
        assert_eq!(name("https://example.com/"), None);
        assert_eq!(name("https://notwikipedia.org/wiki/Rust"), None);
        assert_eq!(name("https://github.com.evil.net/a/b"), None);
    }

    #[test]
    fn test_first_registered_wins() {
        let mut registry = HandlerRegistry::new();
        registry
            .register(Box::new(Named {
                name: "first",
                domains: &["example.com"],
            }))
            .unwrap();
        registry
            .register(Box::new(Named {
                name: "second",
                domains: &["example.com"],
            }))
            .unwrap();

        let handler = registry.route(&url("https://www.example.com/")).unwrap();
        assert_eq!(handler.name(), "first");
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut registry = HandlerRegistry::with_defaults();
        let err = registry
            .register(Box::new(Named {
                name: "github",
                domains: &["github.com"],
            }))
            .unwrap_err();
        assert!(matches!(err, ScrapeError::DuplicateHandler(name) if name == "github"));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_replace_keeps_priority() {
        let mut registry = HandlerRegistry::with_defaults();
        let old = registry.replace(Box::new(Named {
            name: "wikipedia",
            domains: &["wikipedia.org", "wikimedia.org"],
        }));
        assert!(old.is_some());
        assert_eq!(registry.names(), vec!["wikipedia", "github"]);
        assert!(registry
            .route(&url("https://commons.wikimedia.org/wiki/Main_Page"))
            .is_some());

        assert!(registry
            .replace(Box::new(Named {
                name: "docs",
                domains: &["docs.rs"],
            }))
            .is_none());
        assert_eq!(registry.names(), vec!["wikipedia", "github", "docs"]);
    }

    #[test]
    fn test_unregister() {
        let mut registry = HandlerRegistry::with_defaults();
        assert!(registry.unregister("github").is_some());
        assert!(registry.unregister("github").is_none());
        assert!(registry
            .route(&url("https://github.com/rust-lang/rust"))
            .is_none());
        assert!(registry.get("wikipedia").is_some());
    }
}
