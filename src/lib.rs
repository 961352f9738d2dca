//! Tag Collector: web page feature extraction for URL classification
//!
//! Given a table of URLs, fetches every page and extracts the features a
//! classifier trains on:
//! - Bounded-concurrency fetching with per-failure-class retries
//! - Payload filtering by size, content type and status
//! - Optional JavaScript rendering under a hard deadline (`chromium` feature)
//! - Title, meta description, h1-h6 and body text extraction
//! - Isolated batches merged back in input order
//! - Resumable Common Crawl index search for finding candidate URLs

pub mod collector;
pub mod config;
pub mod search;
pub mod table;
pub mod util;

pub use collector::{Collection, CollectorError, ExtractedRecord, TagCollector};
pub use config::Config;
pub use table::Table;
