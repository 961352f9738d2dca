//! Web page tag collection
//!
//! Pipeline: fetch -> filter -> (render) -> extract -> batch -> merge
//!
//! - `fetcher`: bounded-concurrency GETs with a per-failure retry policy
//! - `filter`: drops oversized, non-HTML and non-2xx payloads
//! - `render`: optional script execution under a hard deadline
//! - `extractor`: title, meta description, headers and div text
//! - `batch`: isolated per-batch workers, input-ordered output
//! - `merge`: joins records back onto the input table

pub mod batch;
#[cfg(feature = "chromium")]
pub mod chromium;
pub mod encoding;
pub mod extractor;
pub mod fetcher;
pub mod filter;
pub mod merge;
pub mod progress;
pub mod render;
pub mod title_cache;
pub mod types;

pub use batch::{BatchResources, Collection, CollectorError, LiveResources, TagCollector};
pub use extractor::{ExtractedRecord, FeatureExtractor, FEATURE_COLUMNS};
pub use fetcher::{FetchEngine, ReqwestTransport, Transport, TransportError};
pub use filter::ResponseFilter;
pub use merge::merge_records;
pub use progress::{print_summary, CollectStats};
pub use render::{RenderError, Renderer};
pub use title_cache::RootTitleCache;
pub use types::{FetchOutcome, FetchStatus, FetchTarget, RawResponse};
