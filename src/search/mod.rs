//! Index search
//!
//! Finds candidate URLs for the collector by querying a Common Crawl CDX index
//! server for a URL pattern and keeping the captures whose URL contains a
//! keyword. Pagination resumes from a durable [`CursorStore`] so repeated runs
//! walk forward through the index instead of re-reading the same pages.

mod cursor;

pub use cursor::{CursorEntry, CursorStore};

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::config::SearchConfig;

/// Errors during index search
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Invalid crawl id: {0} (expected CC-MAIN-YYYY-WW)")]
    InvalidCrawlId(String),
    #[error("Invalid index server URL: {0}")]
    InvalidServer(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Index server returned status {0}")]
    Status(u16),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn crawl_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^CC-MAIN-\d{4}-\d{2}").unwrap_or_else(|e| panic!("invalid crawl id regex: {e}"))
    })
}

/// Check a crawl id such as `CC-MAIN-2024-10`
pub fn validate_crawl_id(crawl_id: &str) -> Result<(), SearchError> {
    if crawl_id_re().is_match(crawl_id) {
        Ok(())
    } else {
        Err(SearchError::InvalidCrawlId(crawl_id.to_string()))
    }
}

/// One capture line from the index; fields other than `url` are ignored
#[derive(Debug, Clone, Deserialize)]
pub struct CdxRecord {
    pub url: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// A URL found by a search
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub index: String,
    pub url: String,
    pub search_term: String,
    pub page: u32,
    pub keyword: String,
}

#[derive(Debug, Deserialize)]
struct PageCount {
    pages: u64,
}

/// URLs of `records` containing `keyword`, in order
pub fn urls_with_keyword(records: &[CdxRecord], keyword: &str) -> Vec<String> {
    records
        .iter()
        .filter(|r| r.url.contains(keyword))
        .map(|r| r.url.clone())
        .collect()
}

/// Parse newline-delimited JSON captures. Lines that do not parse are skipped.
pub fn parse_records(body: &str) -> Vec<CdxRecord> {
    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| match serde_json::from_str(line) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::debug!("Skipping malformed index line: {}", e);
                None
            }
        })
        .collect()
}

/// HTTP client for a CDX index server
pub struct IndexClient {
    client: reqwest::Client,
    server: Url,
}

impl IndexClient {
    pub fn new(config: &SearchConfig) -> Result<Self, SearchError> {
        let mut server = config.index_server.clone();
        if !server.ends_with('/') {
            server.push('/');
        }
        let server = Url::parse(&server).map_err(|e| SearchError::InvalidServer(format!("{}: {}", server, e)))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self { client, server })
    }

    fn index_url(&self, crawl_id: &str) -> Result<Url, SearchError> {
        self.server
            .join(&format!("{}-index", crawl_id))
            .map_err(|e| SearchError::InvalidServer(e.to_string()))
    }

    /// Captures matching `term` on one page. `None` when the server answers
    /// with a non-success status.
    pub async fn search_page(
        &self,
        crawl_id: &str,
        term: &str,
        page: u32,
    ) -> Result<Option<Vec<CdxRecord>>, SearchError> {
        let response = self
            .client
            .get(self.index_url(crawl_id)?)
            .query(&[("url", term), ("output", "json")])
            .query(&[("page", page)])
            .send()
            .await?;

        if !response.status().is_success() {
            tracing::debug!("Index page {} for {} returned {}", page, term, response.status());
            return Ok(None);
        }

        let records = parse_records(&response.text().await?);
        tracing::info!("Found {} records for {} on page {}", records.len(), term, page);
        Ok(Some(records))
    }

    /// Number of result pages the index holds for `term`
    pub async fn num_pages(&self, crawl_id: &str, term: &str) -> Result<u64, SearchError> {
        let response = self
            .client
            .get(self.index_url(crawl_id)?)
            .query(&[("url", term), ("output", "json"), ("showNumPages", "true")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SearchError::Status(status.as_u16()));
        }
        let count: PageCount = serde_json::from_str(response.text().await?.trim())?;
        Ok(count.pages)
    }
}

/// Keyword search over an index, resuming from a cursor
pub struct IndexSearcher {
    client: IndexClient,
    cursors: CursorStore,
}

impl IndexSearcher {
    pub fn new(client: IndexClient, cursors: CursorStore) -> Self {
        Self { client, cursors }
    }

    pub fn from_config(config: &SearchConfig) -> Result<Self, SearchError> {
        Ok(Self::new(
            IndexClient::new(config)?,
            CursorStore::load(&config.cursor_path)?,
        ))
    }

    pub fn client(&self) -> &IndexClient {
        &self.client
    }

    pub fn cursors(&self) -> &CursorStore {
        &self.cursors
    }

    /// Forget all saved positions
    pub fn reset(&mut self) -> Result<(), SearchError> {
        self.cursors.reset();
        self.cursors.save()
    }

    /// Read `num_pages` pages after the saved position and return the URLs
    /// containing `keyword`.
    ///
    /// Pages that fail or come back empty are skipped without moving the
    /// cursor. The cursor is saved after every page that returned records.
    pub async fn crawl(
        &mut self,
        crawl_id: &str,
        term: &str,
        keyword: &str,
        num_pages: u32,
    ) -> Result<Vec<SearchResult>, SearchError> {
        validate_crawl_id(crawl_id)?;

        let start = self.cursors.next_page(crawl_id, term, keyword);
        let end = start.saturating_add(num_pages);
        tracing::info!(
            "Searching for {} on {} in {} (pages {}..{})",
            keyword,
            term,
            crawl_id,
            start,
            end
        );

        let mut results = Vec::new();
        for page in start..end {
            let records = match self.client.search_page(crawl_id, term, page).await {
                Ok(Some(records)) if !records.is_empty() => records,
                Ok(_) => continue,
                Err(e) => {
                    tracing::warn!("Index page {} failed: {}", page, e);
                    continue;
                }
            };

            results.extend(urls_with_keyword(&records, keyword).into_iter().map(|url| SearchResult {
                index: crawl_id.to_string(),
                url,
                search_term: term.to_string(),
                page,
                keyword: keyword.to_string(),
            }));

            self.cursors.advance(crawl_id, term, keyword, page);
            self.cursors.save()?;
        }

        Ok(results)
    }
}
