//! Batch orchestration
//!
//! The URL list is split into contiguous batches of `batch_size`. Each batch
//! runs on its own OS thread with its own single-threaded runtime, HTTP
//! session and (optionally) browser, so nothing a batch allocates outlives
//! it. Inside a batch the stages are:
//!
//! 1. Fetch every URL, bounded by `concurrency`
//! 2. Render `Ok` pages one at a time, when enabled
//! 3. Resolve root page titles and extract features, parsing on the
//!    blocking pool
//! 4. Sort by input index
//!
//! Batches run sequentially and their records are concatenated, so the
//! output is in input order with exactly one record per input URL.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use super::extractor::{base_record, ExtractedRecord, ExtractorConfig, FeatureExtractor};
use super::fetcher::{FetchEngine, ReqwestTransport, Transport, TransportError};
use super::progress::{CollectProgress, CollectStats};
use super::render::{RenderStage, Renderer};
use super::title_cache::RootTitleCache;
use super::types::{FetchOutcome, FetchTarget};
use crate::config::CollectorConfig;

/// Fatal collection errors. Per-URL problems never surface here.
#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("Failed to spawn worker for batch {batch}: {source}")]
    Spawn {
        batch: usize,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to build runtime for batch {batch}: {source}")]
    Runtime {
        batch: usize,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to set up batch {batch}: {reason}")]
    Setup { batch: usize, reason: String },
    #[error("Batch {0} panicked")]
    BatchPanicked(usize),
    #[error("Batch {batch} has no record for index {index}")]
    MissingIndex { batch: usize, index: usize },
}

/// Per-batch resources, built fresh inside each batch's runtime
#[async_trait]
pub trait BatchResources: Send + Sync {
    /// HTTP transport for one batch
    fn transport(&self, config: &CollectorConfig) -> Result<Arc<dyn Transport>, TransportError>;

    /// Rendering engine for one batch. `None` disables rendering for the
    /// batch.
    async fn renderer(&self, config: &CollectorConfig) -> Option<Box<dyn Renderer>>;
}

/// reqwest sessions and, with the `chromium` feature, a headless browser
#[derive(Debug, Default, Clone, Copy)]
pub struct LiveResources;

#[async_trait]
impl BatchResources for LiveResources {
    fn transport(&self, config: &CollectorConfig) -> Result<Arc<dyn Transport>, TransportError> {
        Ok(Arc::new(ReqwestTransport::new(config)?))
    }

    #[cfg(feature = "chromium")]
    async fn renderer(&self, config: &CollectorConfig) -> Option<Box<dyn Renderer>> {
        use rand::seq::SliceRandom;

        let user_agent = config
            .user_agents
            .choose(&mut rand::thread_rng())
            .map(String::as_str)
            .unwrap_or(crate::config::DEFAULT_USER_AGENTS[0]);
        match super::chromium::ChromiumRenderer::launch(user_agent).await {
            Ok(renderer) => Some(Box::new(renderer)),
            Err(e) => {
                tracing::warn!("{}; continuing without rendering", e);
                None
            }
        }
    }

    #[cfg(not(feature = "chromium"))]
    async fn renderer(&self, _config: &CollectorConfig) -> Option<Box<dyn Renderer>> {
        tracing::warn!("Built without the `chromium` feature; pages will not be rendered");
        None
    }
}

/// Records of a finished run, in input order
#[derive(Debug)]
pub struct Collection {
    pub records: Vec<ExtractedRecord>,
    pub stats: CollectStats,
}

/// Entry point for collecting tags from a list of URLs
pub struct TagCollector {
    config: CollectorConfig,
    resources: Arc<dyn BatchResources>,
    titles: Arc<RootTitleCache>,
    quiet: bool,
}

impl TagCollector {
    pub fn new(config: CollectorConfig) -> Self {
        Self::with_resources(config, Arc::new(LiveResources))
    }

    pub fn with_resources(config: CollectorConfig, resources: Arc<dyn BatchResources>) -> Self {
        Self {
            config,
            resources,
            titles: Arc::new(RootTitleCache::new()),
            quiet: false,
        }
    }

    /// Hide progress bars
    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// Root page titles resolved so far, shared across batches
    pub fn title_cache(&self) -> &RootTitleCache {
        &self.titles
    }

    /// Collect one record per URL, in input order.
    ///
    /// Blocks the calling thread until every batch is done. Fails only when a
    /// batch cannot be run or dies.
    pub fn collect(&self, urls: &[String]) -> Result<Collection, CollectorError> {
        let batch_size = self.config.batch_size.max(1);
        let batch_count = urls.len().div_ceil(batch_size);
        let progress = Arc::new(CollectProgress::new(urls.len(), self.quiet));

        tracing::info!(
            "Collecting tags for {} URLs in {} batch(es) (render_javascript={})",
            urls.len(),
            batch_count,
            self.config.render_javascript
        );

        let mut records = Vec::with_capacity(urls.len());
        for (batch, chunk) in urls.chunks(batch_size).enumerate() {
            let offset = batch * batch_size;
            match self.run_batch(batch, offset, chunk.to_vec(), &progress) {
                Ok(mut batch_records) => records.append(&mut batch_records),
                Err(e) => {
                    progress.abandon();
                    return Err(e);
                }
            }
        }

        progress.finish();
        let stats = progress.get_stats();
        tracing::info!(
            "Collected {} records ({} ok, {} discarded, {} failed) in {:.1}s",
            records.len(),
            stats.ok,
            stats.discarded,
            stats.failed,
            stats.elapsed_seconds
        );
        Ok(Collection { records, stats })
    }

    /// Run one batch in isolation and wait for it.
    fn run_batch(
        &self,
        batch: usize,
        offset: usize,
        urls: Vec<String>,
        progress: &Arc<CollectProgress>,
    ) -> Result<Vec<ExtractedRecord>, CollectorError> {
        let expected = urls.len();
        let config = self.config.clone();
        let resources = Arc::clone(&self.resources);
        let titles = Arc::clone(&self.titles);
        let progress = Arc::clone(progress);

        tracing::debug!("Starting batch {} ({} URLs from index {})", batch, expected, offset);

        let handle = std::thread::Builder::new()
            .name(format!("collector-batch-{}", batch))
            .spawn(move || {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .map_err(|source| CollectorError::Runtime { batch, source })?;
                let context = BatchContext {
                    batch,
                    offset,
                    config: &config,
                    resources: resources.as_ref(),
                    titles,
                    progress: &progress,
                };
                // Dropping the runtime here closes every connection and task
                // the batch opened
                runtime.block_on(context.run(&urls))
            })
            .map_err(|source| CollectorError::Spawn { batch, source })?;

        let records = handle
            .join()
            .map_err(|_| CollectorError::BatchPanicked(batch))??;

        verify_coverage(batch, offset, expected, &records)?;
        Ok(records)
    }
}

/// Every index in `[offset, offset + expected)` appears exactly once, in order
fn verify_coverage(
    batch: usize,
    offset: usize,
    expected: usize,
    records: &[ExtractedRecord],
) -> Result<(), CollectorError> {
    for i in 0..expected {
        let index = offset + i;
        if records.get(i).map(|r| r.index) != Some(index) {
            return Err(CollectorError::MissingIndex { batch, index });
        }
    }
    if records.len() != expected {
        return Err(CollectorError::MissingIndex {
            batch,
            index: offset + expected,
        });
    }
    Ok(())
}

struct BatchContext<'a> {
    batch: usize,
    offset: usize,
    config: &'a CollectorConfig,
    resources: &'a dyn BatchResources,
    titles: Arc<RootTitleCache>,
    progress: &'a CollectProgress,
}

impl BatchContext<'_> {
    async fn run(&self, urls: &[String]) -> Result<Vec<ExtractedRecord>, CollectorError> {
        let transport = self
            .resources
            .transport(self.config)
            .map_err(|e| CollectorError::Setup {
                batch: self.batch,
                reason: e.to_string(),
            })?;
        let engine = Arc::new(FetchEngine::new(Arc::clone(&transport), self.config));
        // Homepage lookups get their own engine so they stay out of the counters
        let title_engine = Arc::new(FetchEngine::new(transport, self.config));
        let targets = FetchTarget::from_urls(self.offset, urls);

        self.progress.stage(self.batch, "fetching");
        let mut outcomes = engine.fetch_all(&targets, &self.progress.bar()).await;
        outcomes.sort_by_key(|o| o.index);

        let mut render_stage = None;
        if self.config.render_javascript {
            if let Some(renderer) = self.resources.renderer(self.config).await {
                self.progress.stage(self.batch, "rendering");
                let stage = RenderStage::new(renderer, self.config.render_timeout());
                let bar = self.progress.stage_bar(self.batch, "rendering", outcomes.len());
                stage.render_all(&mut outcomes, &bar).await;
                bar.finish_and_clear();
                render_stage = Some(stage);
            }
        }

        self.progress.stage(self.batch, "extracting");
        let mut records = self.extract_all(&title_engine, &targets, outcomes).await;
        records.sort_by_key(|r| r.index);

        self.progress
            .batch_finished(engine.stats(), render_stage.as_ref().map(RenderStage::stats));
        if let Some(stage) = render_stage {
            stage.shutdown().await;
        }

        tracing::debug!("Batch {} produced {} records", self.batch, records.len());
        Ok(records)
    }

    /// Resolve root titles and extract features for every outcome.
    async fn extract_all(
        &self,
        engine: &Arc<FetchEngine>,
        targets: &[FetchTarget],
        outcomes: Vec<FetchOutcome>,
    ) -> Vec<ExtractedRecord> {
        let extractor = Arc::new(FeatureExtractor::new(ExtractorConfig::from(self.config)));
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut tasks = JoinSet::new();

        for outcome in outcomes {
            let engine = Arc::clone(engine);
            let titles = Arc::clone(&self.titles);
            let extractor = Arc::clone(&extractor);
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let root_title = titles.get_title(&outcome.url, &engine).await;
                let fallback = base_record(&outcome, &root_title);

                match tokio::task::spawn_blocking(move || extractor.extract(&outcome, &root_title)).await {
                    Ok(record) => record,
                    Err(e) => {
                        tracing::error!("Extraction task failed for {}: {}", fallback.url, e);
                        fallback
                    }
                }
            });
        }

        let bar = self.progress.stage_bar(self.batch, "extracting", targets.len());
        let mut records = Vec::with_capacity(targets.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(record) => records.push(record),
                Err(e) => tracing::error!("Extraction task failed: {}", e),
            }
            bar.inc(1);
        }
        bar.finish_and_clear();

        if records.len() < targets.len() {
            let seen: HashSet<usize> = records.iter().map(|r| r.index).collect();
            for target in targets.iter().filter(|t| !seen.contains(&t.index)) {
                tracing::warn!("No record for index {}, emitting an empty one", target.index);
                records.push(base_record(&FetchOutcome::failed(target, None), ""));
            }
        }

        records
    }
}
