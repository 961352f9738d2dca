//! Render stage
//!
//! Optionally replaces a fetched page's static HTML with the DOM after its
//! scripts have run. Rendering is bounded by a hard deadline: when it expires
//! the render future is dropped, the engine is asked to reclaim whatever that
//! render left open, and the outcome keeps its pre-render HTML. Render
//! failures degrade the same way.

use async_trait::async_trait;
use indicatif::ProgressBar;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use url::Url;

use super::types::{FetchOutcome, FetchStatus};

/// Errors raised by a rendering engine
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Page error: {0}")]
    Page(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Browser launch failed: {0}")]
    Launch(String),
}

/// A browser-equivalent environment that executes page scripts
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Load `url` (whose static HTML is `html`) and return the resulting DOM.
    async fn render(&self, url: &Url, html: &str) -> Result<String, RenderError>;

    /// Release what a cancelled `render` left open. Awaited after the render
    /// future is dropped and before the next render starts.
    async fn reclaim(&self) {}

    /// Tear down the engine. Called once, at the end of the batch.
    async fn shutdown(&mut self) {}
}

/// What happened to one outcome in the render stage
#[derive(Debug)]
pub enum RenderVerdict {
    Rendered,
    /// Not `Ok`, or nothing to render
    Skipped,
    TimedOut,
    Failed(RenderError),
}

/// Render counters
#[derive(Debug, Default)]
pub struct RenderStats {
    pub rendered: AtomicU64,
    pub timed_out: AtomicU64,
    pub failed: AtomicU64,
}

/// Applies a [`Renderer`] to fetch outcomes under a per-item deadline
pub struct RenderStage {
    renderer: Box<dyn Renderer>,
    timeout: Duration,
    stats: RenderStats,
}

impl RenderStage {
    pub fn new(renderer: Box<dyn Renderer>, timeout: Duration) -> Self {
        Self {
            renderer,
            timeout,
            stats: RenderStats::default(),
        }
    }

    pub fn stats(&self) -> &RenderStats {
        &self.stats
    }

    /// Render every `Ok` outcome, one at a time.
    ///
    /// Items run sequentially, and a cancelled render is reclaimed before the
    /// next one starts.
    pub async fn render_all(&self, outcomes: &mut [FetchOutcome], progress: &ProgressBar) {
        for outcome in outcomes.iter_mut() {
            self.render_one(outcome).await;
            progress.inc(1);
        }
    }

    /// Render a single outcome in place. Never fails; on any problem the
    /// outcome keeps its pre-render HTML.
    pub async fn render_one(&self, outcome: &mut FetchOutcome) -> RenderVerdict {
        if outcome.status != FetchStatus::Ok {
            return RenderVerdict::Skipped;
        }
        let (Some(url), Some(html)) = (outcome.resolved_url.as_ref(), outcome.body.as_deref()) else {
            return RenderVerdict::Skipped;
        };

        tracing::debug!("Rendering {}", url);
        match tokio::time::timeout(self.timeout, self.renderer.render(url, html)).await {
            Ok(Ok(rendered)) => {
                self.stats.rendered.fetch_add(1, Ordering::Relaxed);
                outcome.rendered_html = Some(rendered);
                RenderVerdict::Rendered
            }
            Ok(Err(e)) => {
                tracing::debug!("Rendering failed for {}: {}", url, e);
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                RenderVerdict::Failed(e)
            }
            Err(_) => {
                tracing::debug!("Rendering cancelled for {} after {:?}", url, self.timeout);
                self.stats.timed_out.fetch_add(1, Ordering::Relaxed);
                if tokio::time::timeout(self.timeout, self.renderer.reclaim()).await.is_err() {
                    tracing::warn!("Reclaiming the cancelled render of {} timed out", url);
                }
                RenderVerdict::TimedOut
            }
        }
    }

    /// Shut the engine down, consuming the stage
    pub async fn shutdown(mut self) {
        self.renderer.shutdown().await;
    }
}
