//! Command line entry point for arxiv-crawl

use arxiv_crawl::{Config, Crawler, Period, RunRequest};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "arxiv-crawl",
    version,
    about = "Crawl arXiv metadata, LaTeX sources and references for a range of papers"
)]
struct Cli {
    /// First period, `YYYY-MM` or `YYMM`
    #[arg(long)]
    start_month: Period,

    /// First sequence number in the start period
    #[arg(long)]
    start_id: u32,

    /// Last period, `YYYY-MM` or `YYMM` (defaults to the start period)
    #[arg(long)]
    end_month: Option<Period>,

    /// Last sequence number in the end period
    #[arg(long)]
    end_id: u32,

    /// Papers processed concurrently (overrides the config file)
    #[arg(long)]
    parallel: Option<usize>,

    /// Output directory (overrides the config file)
    #[arg(long)]
    output: Option<PathBuf>,

    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Cli {
    fn resolve_config(&self) -> arxiv_crawl::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };
        if let Some(parallel) = self.parallel {
            config.crawl.max_concurrent = parallel;
        }
        if let Some(output) = &self.output {
            config.crawl.output_dir = output.clone();
        }
        config.validate()?;
        Ok(config)
    }

    fn request(&self) -> RunRequest {
        RunRequest {
            start_period: self.start_month,
            start_seq: self.start_id,
            end_period: self.end_month.unwrap_or(self.start_month),
            end_seq: self.end_id,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let config = match cli.resolve_config() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            return ExitCode::from(2);
        }
    };
    let request = cli.request();
    if let Err(e) = request.validate() {
        tracing::error!(error = %e, "invalid range");
        return ExitCode::from(2);
    }

    let crawler = match Crawler::new(config) {
        Ok(crawler) => crawler,
        Err(e) => {
            tracing::error!(error = %e, "failed to initialize crawler");
            return ExitCode::FAILURE;
        }
    };

    tokio::select! {
        result = crawler.run(request) => match result {
            Ok(report) => {
                tracing::info!(
                    papers = report.identifiers.len(),
                    started_at = %report.started_at,
                    "done"
                );
                ExitCode::SUCCESS
            }
            Err(e) => {
                tracing::error!(error = %e, "crawl failed");
                ExitCode::FAILURE
            }
        },
        _ = tokio::signal::ctrl_c() => {
            let stats = crawler.statistics().snapshot();
            tracing::warn!(
                total_processed = stats.total_processed,
                both_success = stats.both_success,
                "interrupted, in-flight papers abandoned"
            );
            ExitCode::from(130)
        }
    }
}
