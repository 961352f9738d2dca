//! Root page title cache
//!
//! Remembers the homepage title of each site so that many paths under the
//! same domain trigger a single homepage fetch. Shared across the concurrent
//! fetches of a batch and across batches. A race on first use may fetch the
//! same homepage twice; both writers store a complete title, so no update is
//! lost or torn.

use dashmap::DashMap;
use scraper::{Html, Selector};
use url::Url;

use super::fetcher::{normalize_url, FetchEngine};
use super::types::{FetchStatus, FetchTarget};
use crate::util::normalize_whitespace;

/// Concurrency-safe domain -> title map with fetch-on-miss
#[derive(Debug, Default)]
pub struct RootTitleCache {
    titles: DashMap<String, String>,
}

impl RootTitleCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache key for a URL: its host without a leading `www.`
    pub fn domain_key(url: &Url) -> Option<String> {
        let host = url.host_str()?.to_ascii_lowercase();
        Some(host.strip_prefix("www.").map(str::to_string).unwrap_or(host))
    }

    /// Cached title, if this domain has been resolved
    pub fn get(&self, domain: &str) -> Option<String> {
        self.titles.get(domain).map(|entry| entry.value().clone())
    }

    pub fn insert(&self, domain: impl Into<String>, title: impl Into<String>) {
        self.titles.insert(domain.into(), title.into());
    }

    pub fn len(&self) -> usize {
        self.titles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.titles.is_empty()
    }

    /// Best-effort, whitespace-normalized homepage title for the site hosting
    /// `raw_url`; empty string when it cannot be determined.
    pub async fn get_title(&self, raw_url: &str, engine: &FetchEngine) -> String {
        let Some(url) = normalize_url(raw_url).ok() else {
            return String::new();
        };
        let Some(domain) = Self::domain_key(&url) else {
            return String::new();
        };

        if let Some(title) = self.get(&domain) {
            return title;
        }

        let root = format!("https://{}/", url.host_str().unwrap_or(&domain));
        let outcome = engine.fetch_one(&FetchTarget::new(0, root)).await;
        let title = match (&outcome.status, outcome.body.as_deref()) {
            (FetchStatus::Ok, Some(html)) => page_title(html),
            _ => String::new(),
        };

        // Lock is not held across the fetch above
        self.titles.insert(domain, title.clone());
        title
    }
}

/// Text of the first `<title>` element, whitespace-normalized
pub fn page_title(html: &str) -> String {
    let Ok(selector) = Selector::parse("title") else {
        return String::new();
    };
    let document = Html::parse_document(html);
    let title = document
        .select(&selector)
        .next()
        .map(|el| normalize_whitespace(&el.text().collect::<String>()))
        .unwrap_or_default();
    drop(document);
    title
}
