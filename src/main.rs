//! Tag Collector CLI
//!
//! Collects page features for a table of URLs, and finds candidate URLs in the
//! Common Crawl index.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tag_collector::{
    collector::{merge_records, print_summary, TagCollector},
    config::{Config, LogFormat},
    search::IndexSearcher,
    table::Table,
};
use tracing::info;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "tag-collector")]
#[command(about = "Collect HTML tags and page text for URL classification")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Log per-URL failures
    #[arg(long)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch every URL in a table and write the labeled feature table
    Collect {
        /// Input table (.csv or .json) with a `url` column
        input: PathBuf,

        /// Output CSV path
        #[arg(short, long, default_value = "labeled-source-text.csv")]
        output: PathBuf,

        /// Execute page scripts before extraction
        #[arg(long)]
        render_javascript: bool,

        /// URLs per isolated batch
        #[arg(long)]
        batch_size: Option<usize>,

        /// Maximum in-flight fetches per batch
        #[arg(long)]
        concurrency: Option<usize>,

        /// Quiet mode (no progress output)
        #[arg(short, long)]
        quiet: bool,
    },

    /// Search a Common Crawl index for URLs matching a pattern and keyword
    Search {
        /// Crawl id, e.g. CC-MAIN-2024-10
        crawl_id: String,

        /// URL pattern to search for, e.g. "*.gov"
        term: String,

        /// Keep only URLs containing this keyword
        keyword: String,

        /// Number of index pages to read
        #[arg(short, long, default_value = "1")]
        pages: u32,

        /// Output JSON path
        #[arg(short, long, default_value = "urls.json")]
        output: PathBuf,

        /// Only report how many pages the index holds
        #[arg(long)]
        count: bool,

        /// Forget saved positions before searching
        #[arg(long)]
        reset: bool,
    },

    /// Write a default configuration file
    Init {
        /// Output directory
        #[arg(default_value = ".")]
        path: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load_or_default(&cli.config)?;
    if cli.debug {
        config.collector.debug = true;
    }

    // Setup logging
    let log_level = config
        .logging
        .effective_level(config.collector.debug, cli.verbose);
    match config.logging.format {
        LogFormat::Json => {
            let subscriber = FmtSubscriber::builder()
                .with_max_level(log_level)
                .with_target(false)
                .json()
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
        LogFormat::Text => {
            let subscriber = FmtSubscriber::builder()
                .with_max_level(log_level)
                .with_target(false)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
    }

    match cli.command {
        Commands::Collect {
            input,
            output,
            render_javascript,
            batch_size,
            concurrency,
            quiet,
        } => {
            if render_javascript {
                config.collector.render_javascript = true;
            }
            if let Some(batch_size) = batch_size {
                config.collector.batch_size = batch_size;
            }
            if let Some(concurrency) = concurrency {
                config.collector.concurrency = concurrency;
            }
            config.validate()?;
            collect(config, &input, &output, quiet)
        }
        Commands::Search {
            crawl_id,
            term,
            keyword,
            pages,
            output,
            count,
            reset,
        } => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("Failed to start async runtime")?;
            runtime.block_on(search(config, crawl_id, term, keyword, pages, output, count, reset))
        }
        Commands::Init { path } => init_config(&path),
    }
}

fn collect(config: Config, input: &Path, output: &Path, quiet: bool) -> Result<()> {
    let table = Table::read_path(input)
        .with_context(|| format!("Failed to read input table '{}'", input.display()))?;
    let urls = table.urls()?;
    info!("Loaded {} rows from {}", table.len(), input.display());

    let collector = TagCollector::new(config.collector).quiet(quiet);
    let collection = collector.collect(&urls)?;

    let merged = merge_records(&table, &collection.records)?;
    merged
        .write_csv_path(output)
        .with_context(|| format!("Failed to write '{}'", output.display()))?;
    info!("Wrote {} rows to {}", merged.len(), output.display());

    if !quiet {
        print_summary(&collection.stats);
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn search(
    config: Config,
    crawl_id: String,
    term: String,
    keyword: String,
    pages: u32,
    output: PathBuf,
    count: bool,
    reset: bool,
) -> Result<()> {
    let mut searcher = IndexSearcher::from_config(&config.search)?;

    if count {
        let pages = searcher.client().num_pages(&crawl_id, &term).await?;
        println!("{} pages for {} in {}", pages, term, crawl_id);
        return Ok(());
    }

    if reset {
        searcher.reset()?;
        info!("Search cursor reset");
    }

    let results = searcher.crawl(&crawl_id, &term, &keyword, pages).await?;
    let json = serde_json::to_string_pretty(&results)?;
    std::fs::write(&output, json)
        .with_context(|| format!("Failed to write '{}'", output.display()))?;

    println!(
        "Found {} URLs containing '{}'; wrote {}",
        results.len(),
        keyword,
        output.display()
    );
    Ok(())
}

fn init_config(path: &Path) -> Result<()> {
    let config_path = path.join("config.toml");
    if config_path.exists() {
        anyhow::bail!("Config file already exists: {}", config_path.display());
    }

    std::fs::create_dir_all(path)?;
    let toml_content = format!("# Tag Collector Configuration\n\n{}", Config::default().to_toml()?);
    std::fs::write(&config_path, toml_content)?;

    println!("Created configuration file: {}", config_path.display());
    Ok(())
}
