//! Progress tracking for collection runs

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;

use super::fetcher::FetchStats;
use super::render::RenderStats;

/// Totals of a collection run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectStats {
    pub urls: usize,
    pub batches: usize,
    pub ok: u64,
    pub discarded: u64,
    pub failed: u64,
    pub tls_retries: u64,
    pub scheme_retries: u64,
    pub rendered: u64,
    pub render_timeouts: u64,
    pub elapsed_seconds: f64,
}

impl CollectStats {
    pub fn urls_per_second(&self) -> f64 {
        if self.elapsed_seconds > 0.0 {
            self.urls as f64 / self.elapsed_seconds
        } else {
            0.0
        }
    }
}

/// Progress tracker shared by all batches of one run
pub struct CollectProgress {
    /// Holds the run bar and the per-stage bars (None if running in quiet mode)
    multi: Option<MultiProgress>,
    /// Per-URL fetch bar (None if running in quiet mode)
    progress_bar: Option<ProgressBar>,
    start_time: Instant,
    total: usize,
    batches: AtomicUsize,
    ok: AtomicU64,
    discarded: AtomicU64,
    failed: AtomicU64,
    tls_retries: AtomicU64,
    scheme_retries: AtomicU64,
    rendered: AtomicU64,
    render_timeouts: AtomicU64,
}

impl CollectProgress {
    pub fn new(total: usize, quiet: bool) -> Self {
        let (multi, progress_bar) = if !quiet {
            let multi = MultiProgress::new();
            let pb = multi.add(ProgressBar::new(total as u64));
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("#>-"),
            );
            (Some(multi), Some(pb))
        } else {
            (None, None)
        };

        Self {
            multi,
            progress_bar,
            start_time: Instant::now(),
            total,
            batches: AtomicUsize::new(0),
            ok: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            tls_retries: AtomicU64::new(0),
            scheme_retries: AtomicU64::new(0),
            rendered: AtomicU64::new(0),
            render_timeouts: AtomicU64::new(0),
        }
    }

    /// Bar that advances once per fetched URL; hidden in quiet mode
    pub fn bar(&self) -> ProgressBar {
        self.progress_bar.clone().unwrap_or_else(ProgressBar::hidden)
    }

    /// Bar for one post-fetch stage of a batch, shown under the run bar.
    /// Hidden in quiet mode. Call `finish_and_clear` when the stage is done.
    pub fn stage_bar(&self, batch: usize, stage: &str, len: usize) -> ProgressBar {
        let Some(ref multi) = self.multi else {
            return ProgressBar::hidden();
        };
        let pb = multi.add(ProgressBar::new(len as u64));
        pb.set_style(
            ProgressStyle::default_bar()
                .template("  {msg:>20} [{bar:30.yellow/blue}] {pos}/{len}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        pb.set_message(format!("batch {} {}", batch + 1, stage));
        pb
    }

    /// Show which stage a batch is in
    pub fn stage(&self, batch: usize, stage: &str) {
        if let Some(ref pb) = self.progress_bar {
            pb.set_message(format!("batch {} | {}", batch + 1, stage));
        }
    }

    /// Fold one finished batch into the totals
    pub fn batch_finished(&self, fetch: &FetchStats, render: Option<&RenderStats>) {
        self.batches.fetch_add(1, Ordering::Relaxed);
        let (ok, discarded, failed) = fetch.totals();
        self.ok.fetch_add(ok, Ordering::Relaxed);
        self.discarded.fetch_add(discarded, Ordering::Relaxed);
        self.failed.fetch_add(failed, Ordering::Relaxed);
        self.tls_retries
            .fetch_add(fetch.tls_retries.load(Ordering::Relaxed), Ordering::Relaxed);
        self.scheme_retries
            .fetch_add(fetch.scheme_retries.load(Ordering::Relaxed), Ordering::Relaxed);
        if let Some(render) = render {
            self.rendered
                .fetch_add(render.rendered.load(Ordering::Relaxed), Ordering::Relaxed);
            self.render_timeouts
                .fetch_add(render.timed_out.load(Ordering::Relaxed), Ordering::Relaxed);
        }
    }

    pub fn get_stats(&self) -> CollectStats {
        CollectStats {
            urls: self.total,
            batches: self.batches.load(Ordering::Relaxed),
            ok: self.ok.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            tls_retries: self.tls_retries.load(Ordering::Relaxed),
            scheme_retries: self.scheme_retries.load(Ordering::Relaxed),
            rendered: self.rendered.load(Ordering::Relaxed),
            render_timeouts: self.render_timeouts.load(Ordering::Relaxed),
            elapsed_seconds: self.start_time.elapsed().as_secs_f64(),
        }
    }

    pub fn finish(&self) {
        if let Some(ref pb) = self.progress_bar {
            let stats = self.get_stats();
            pb.finish_with_message(format!(
                "Done! {} ok, {} discarded, {} failed, {:.1} urls/s",
                stats.ok,
                stats.discarded,
                stats.failed,
                stats.urls_per_second()
            ));
        }
    }

    pub fn abandon(&self) {
        if let Some(ref pb) = self.progress_bar {
            pb.abandon_with_message("Aborted");
        }
    }
}

/// Print a run summary to the console
pub fn print_summary(stats: &CollectStats) {
    println!("\nCollection Summary");
    println!("==================");
    println!("URLs:              {}", stats.urls);
    println!("Batches:           {}", stats.batches);
    println!("Fetched:           {}", stats.ok);
    println!("Discarded:         {}", stats.discarded);
    println!("Failed:            {}", stats.failed);
    println!("TLS retries:       {}", stats.tls_retries);
    println!("Scheme retries:    {}", stats.scheme_retries);
    if stats.rendered + stats.render_timeouts > 0 {
        println!("Rendered:          {}", stats.rendered);
        println!("Render timeouts:   {}", stats.render_timeouts);
    }
    println!("Elapsed time:      {:.1}s", stats.elapsed_seconds);
    println!("Rate:              {:.1} urls/s", stats.urls_per_second());
}
