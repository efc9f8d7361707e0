//! Memoization of scrape results
//!
//! Each key maps to a shared once-cell. The first caller for a key runs the
//! producer; concurrent callers for the same key wait on the same cell, so a
//! key is never produced twice at the same time. The LRU lock is only held
//! while looking up or inserting a cell, never across an await.

use crate::types::{FetchResult, FetchStatus, ScrapeOptions};
use crate::valves::Valves;
use lru::LruCache;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::OnceCell;
use tracing::debug;
use url::Url;

/// Everything that influences the result of a scrape
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    url: String,
    wants_html: bool,
    redirect: bool,
    wiki_lang: String,
    max_body_bytes: usize,
    min_summary_size: usize,
    max_summary_size: Option<usize>,
    github_auth: bool,
}

impl CacheKey {
    /// Build the key for scraping `url` with `options` under `valves`
    ///
    /// The URL is normalized by the parser and its fragment dropped. Only the
    /// presence of a GitHub token is recorded, never the token itself.
    pub fn new(url: &Url, options: &ScrapeOptions, valves: &Valves) -> Self {
        let mut url = url.clone();
        url.set_fragment(None);
        Self {
            url: url.into(),
            wants_html: options.wants_html,
            redirect: options.redirect,
            wiki_lang: valves.wiki_lang.clone(),
            max_body_bytes: valves.max_body_bytes,
            min_summary_size: valves.min_summary_size,
            max_summary_size: valves.max_summary_size,
            github_auth: valves.github_token.is_some(),
        }
    }

    /// Normalized URL
    pub fn url(&self) -> &str {
        &self.url
    }
}

type Entry = Arc<OnceCell<FetchResult>>;

/// Bounded LRU cache of scrape results
pub struct ScrapeCache {
    entries: Mutex<LruCache<CacheKey, Entry>>,
}

impl std::fmt::Debug for ScrapeCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let entries = self.lock();
        f.debug_struct("ScrapeCache")
            .field("len", &entries.len())
            .field("capacity", &entries.cap())
            .finish()
    }
}

impl ScrapeCache {
    /// Create a cache holding at most `capacity` results (minimum 1)
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(Self::capacity(capacity))),
        }
    }

    fn capacity(capacity: usize) -> NonZeroUsize {
        NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<CacheKey, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the memoized result for `key`, running `producer` if there is none
    ///
    /// The boolean is true when the result came from the cache (including a
    /// result produced concurrently by another caller); such results carry
    /// [`FetchStatus::Cached`]. Failed results are handed back but not kept,
    /// and never count as hits, even for callers that shared the producer.
    pub async fn get_or_fetch<F, Fut>(&self, key: CacheKey, producer: F) -> (FetchResult, bool)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = FetchResult>,
    {
        let cell = {
            let mut entries = self.lock();
            match entries.get(&key) {
                Some(cell) => cell.clone(),
                None => {
                    let cell = Entry::default();
                    entries.put(key.clone(), cell.clone());
                    cell
                }
            }
        };

        let mut produced = false;
        let result = cell
            .get_or_init(|| {
                produced = true;
                producer()
            })
            .await
            .clone();

        if !produced && result.status == FetchStatus::Failed {
            return (result, false);
        }
        if !produced {
            debug!(url = %key.url, "Cache hit");
            return (result.as_cached(), true);
        }

        if result.status == FetchStatus::Failed {
            let mut entries = self.lock();
            if entries
                .peek(&key)
                .is_some_and(|current| Arc::ptr_eq(current, &cell))
            {
                entries.pop(&key);
                debug!(url = %key.url, "Dropped failed result from cache");
            }
        }

        (result, false)
    }

    /// Number of entries (including in-flight ones)
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// True when the cache holds nothing
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Change the capacity, evicting least-recently-used entries if needed
    pub fn resize(&self, capacity: usize) {
        self.lock().resize(Self::capacity(capacity));
    }
}
