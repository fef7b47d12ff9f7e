//! The crawl orchestrator
//!
//! [`Crawler::run`] resets the statistics, resolves the identifier range
//! (probing when it crosses a period boundary), dispatches the per-item
//! pipeline under the concurrency limit and folds every completion into the
//! statistics as it arrives.

use crate::arxiv::{ArxivClient, ItemFetcher};
use crate::config::Config;
use crate::error::Result;
use crate::pipeline::{ItemPipeline, Pipeline};
use crate::range::{self, FetchProbe};
use crate::references::{ReferenceFetcher, SemanticScholarClient};
use crate::report::ProgressReporter;
use crate::scheduler::{self, Completion};
use crate::stats::{RunStatistics, StatisticsAggregator, StatsSummary};
use crate::storage::Storage;
use crate::types::{Event, Identifier, RunRequest};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::info;

/// Capacity of the event channel; slow subscribers lag rather than block
const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// Everything a finished run produced
#[derive(Clone, Debug)]
pub struct RunReport {
    /// Identifiers that were dispatched, in submission order
    pub identifiers: Vec<Identifier>,
    /// Final counters
    pub statistics: RunStatistics,
    /// Derived figures
    pub summary: StatsSummary,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// Wall-clock duration of the run, probe included
    pub elapsed: Duration,
}

/// Orchestrates crawl runs over an item fetcher and a reference fetcher
pub struct Crawler {
    config: Arc<Config>,
    storage: Storage,
    fetcher: Arc<dyn ItemFetcher>,
    references: Arc<dyn ReferenceFetcher>,
    statistics: Arc<StatisticsAggregator>,
    reporter: ProgressReporter,
    event_tx: broadcast::Sender<Event>,
}

impl Crawler {
    /// Crawler talking to arXiv and Semantic Scholar as configured
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let storage = Storage::new(config.crawl.output_dir.clone());
        let fetcher = Arc::new(ArxivClient::new(config.arxiv.clone(), storage.clone())?);
        let references = Arc::new(SemanticScholarClient::new(
            config.references.clone(),
            storage.clone(),
        )?);
        Self::with_fetchers(config, fetcher, references)
    }

    /// Crawler over caller-supplied collaborators
    pub fn with_fetchers(
        config: Config,
        fetcher: Arc<dyn ItemFetcher>,
        references: Arc<dyn ReferenceFetcher>,
    ) -> Result<Self> {
        config.validate()?;
        let storage = Storage::new(config.crawl.output_dir.clone());
        let (event_tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            reporter: ProgressReporter::new(config.crawl.progress_interval),
            config: Arc::new(config),
            storage,
            fetcher,
            references,
            statistics: Arc::new(StatisticsAggregator::new()),
            event_tx,
        })
    }

    /// Subscribe to crawl events
    ///
    /// Events sent while nobody is subscribed are dropped.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Live statistics of the current (or last) run
    pub fn statistics(&self) -> Arc<StatisticsAggregator> {
        self.statistics.clone()
    }

    fn emit(&self, event: Event) {
        self.event_tx.send(event).ok();
    }

    /// Crawl every identifier of `request`
    ///
    /// Per-item failures never abort the run; only an invalid request or an
    /// unusable output directory does.
    pub async fn run(&self, request: RunRequest) -> Result<RunReport> {
        request.validate()?;
        tokio::fs::create_dir_all(self.storage.root()).await?;

        self.statistics.reset();
        let started = Instant::now();
        let started_at = Utc::now();

        let probe = FetchProbe::new(self.fetcher.clone(), self.storage.clone());
        let identifiers = range::generate_with_events(
            &request,
            &probe,
            self.config.crawl.probe_failure_threshold,
            Some(&self.event_tx),
        )
        .await?;

        let total = identifiers.len();
        let concurrency = self.config.crawl.max_concurrent;
        info!(
            total,
            concurrency,
            start = %request.start_period,
            end = %request.end_period,
            output = %self.storage.root().display(),
            "starting crawl"
        );
        self.emit(Event::RunStarted { total, concurrency });

        let pipeline: Arc<dyn Pipeline> = Arc::new(ItemPipeline::new(
            self.fetcher.clone(),
            self.references.clone(),
            self.storage.clone(),
        ));
        let mut completions = std::pin::pin!(scheduler::run_all(
            identifiers.clone(),
            pipeline,
            concurrency
        ));

        let mut completed = 0usize;
        while let Some(completion) = completions.next().await {
            completed += 1;
            match completion {
                Completion::Finished(outcome) => {
                    self.statistics.record(&outcome);
                    self.reporter.item(completed, total, &outcome);
                    self.emit(Event::ItemCompleted {
                        completed,
                        total,
                        outcome,
                    });
                }
                Completion::Crashed { identifier, error } => {
                    self.statistics.record_unexpected();
                    self.reporter.crashed(completed, total, &identifier, &error);
                    self.emit(Event::ItemCrashed {
                        completed,
                        total,
                        identifier,
                        error,
                    });
                }
            }

            if self.reporter.is_due(completed) {
                self.reporter.progress(&self.statistics.snapshot());
            }
        }

        let elapsed = started.elapsed();
        let statistics = self.statistics.snapshot();
        let summary = StatsSummary::from(&statistics);
        self.reporter.final_report(&statistics, &summary, elapsed);
        self.emit(Event::RunFinished {
            summary: summary.clone(),
            elapsed,
        });

        Ok(RunReport {
            identifiers,
            statistics,
            summary,
            started_at,
            elapsed,
        })
    }
}
