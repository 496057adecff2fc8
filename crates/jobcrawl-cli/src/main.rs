use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use jobcrawl_client::{BoardProfile, HtmdCleaner, HtmlBoardBackend, ReqwestFetcher};
use jobcrawl_core::{
    CrawlConfig, CrawlOrchestrator, CrawlRequest, CrawlResult, JobCategory, TracingCrawlReporter,
};

#[derive(Parser)]
#[command(name = "jobcrawl", version, about = "Job listing crawler")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Csv,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl a job board for listings in a date range
    Crawl {
        /// First posting date (YYYY-MM-DD)
        #[arg(long)]
        from: String,

        /// Last posting date (YYYY-MM-DD)
        #[arg(long)]
        to: String,

        /// Job category, repeatable (see `jobcrawl categories`)
        #[arg(short, long = "category", required = true)]
        categories: Vec<String>,

        /// Location passed to the board as-is
        #[arg(short, long, default_value = "")]
        location: String,

        /// Path to the board profile (JSON)
        #[arg(short, long, env = "JOBCRAWL_PROFILE")]
        profile: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,

        /// Write results to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Stop after this many result pages
        #[arg(long)]
        max_pages: Option<u32>,

        /// Detail pages fetched concurrently per results page
        #[arg(long)]
        concurrency: Option<usize>,

        /// Per-request timeout in seconds
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Retries for a failing results page
        #[arg(long)]
        retries: Option<u32>,
    },

    /// List the supported job categories
    Categories,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("jobcrawl=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Crawl {
            from,
            to,
            categories,
            location,
            profile,
            format,
            output,
            max_pages,
            concurrency,
            timeout_secs,
            retries,
        } => {
            let request = CrawlRequest::new(from, to, &categories, location)?;

            let mut config = CrawlConfig::from_env()?;
            if let Some(n) = max_pages {
                config = config.with_max_pages(n);
            }
            if let Some(n) = concurrency {
                config = config.with_detail_concurrency(n);
            }
            if let Some(secs) = timeout_secs {
                config = config.with_fetch_timeout(Duration::from_secs(secs));
            }
            if let Some(n) = retries {
                config.retry.max_retries = n;
            }

            cmd_crawl(request, &profile, config, format, output.as_deref()).await?;
        }
        Commands::Categories => {
            for category in JobCategory::ALL {
                println!("{category}");
            }
        }
    }

    Ok(())
}

async fn cmd_crawl(
    request: CrawlRequest,
    profile_path: &Path,
    config: CrawlConfig,
    format: OutputFormat,
    output: Option<&Path>,
) -> Result<()> {
    let profile = BoardProfile::load(profile_path)
        .with_context(|| format!("Failed to load profile {}", profile_path.display()))?;
    let fetcher =
        ReqwestFetcher::with_timeout(config.fetch_timeout).context("Failed to create HTTP client")?;
    let backend = HtmlBoardBackend::new(profile, fetcher, HtmdCleaner::new())?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping crawl");
            on_signal.cancel();
        }
    });

    let mut orchestrator = CrawlOrchestrator::with_config(request, backend, config);
    match orchestrator.run(&cancel, &TracingCrawlReporter).await {
        Ok(result) => write_result(&result, format, output),
        Err(failure) => {
            // Whatever was collected before the failure is still worth keeping.
            write_result(&failure.partial, format, output)?;
            Err(anyhow::Error::new(failure).context("Crawl did not complete"))
        }
    }
}

fn write_result(result: &CrawlResult, format: OutputFormat, output: Option<&Path>) -> Result<()> {
    let writer: Box<dyn Write> = match output {
        Some(path) => Box::new(
            std::fs::File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?,
        ),
        None => Box::new(std::io::stdout().lock()),
    };

    match format {
        OutputFormat::Json => write_json(result, writer),
        OutputFormat::Csv => write_csv(result, writer),
    }
}

fn write_json(result: &CrawlResult, mut writer: impl Write) -> Result<()> {
    serde_json::to_writer_pretty(&mut writer, result)?;
    writeln!(writer)?;
    Ok(())
}

/// One row per record: `listing_url`, `fingerprint`, then every field name
/// seen in any record, sorted.
fn write_csv(result: &CrawlResult, writer: impl Write) -> Result<()> {
    let columns: BTreeSet<&str> = result
        .records
        .iter()
        .flat_map(|r| r.fields.keys().map(String::as_str))
        .collect();

    let mut csv = csv::Writer::from_writer(writer);
    let mut header = vec!["listing_url", "fingerprint"];
    header.extend(columns.iter().copied());
    csv.write_record(&header)?;

    for record in &result.records {
        let mut row = vec![record.listing_url.clone(), record.fingerprint.clone()];
        row.extend(columns.iter().map(|c| match record.fields.get(*c) {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        }));
        csv.write_record(&row)?;
    }

    csv.flush()?;
    Ok(())
}
