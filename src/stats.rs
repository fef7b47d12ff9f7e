//! Run statistics
//!
//! One [`StatisticsAggregator`] per crawler, shared by every worker. Each
//! completed outcome is folded in under a single lock; derived figures are
//! computed from snapshots only.

use crate::types::{ItemOutcome, OutcomeClass};
use serde::Serialize;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// Raw counters and samples of one run
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RunStatistics {
    /// Outcomes recorded
    pub total_processed: usize,
    /// Fetch and references succeeded
    pub both_success: usize,
    /// Fetch succeeded, references did not
    pub only_fetch_success: usize,
    /// Fetch failed, references unexpectedly succeeded
    pub only_reference_success: usize,
    /// Fetch failed
    pub crawler_failed: usize,
    /// Reference step attempted and failed
    pub references_failed: usize,
    /// Fetch failed and references did not succeed
    pub both_failed: usize,
    /// Reference step never attempted
    pub references_skipped: usize,
    /// Pipeline runs that crashed instead of producing an outcome
    pub unexpected_failures: usize,
    /// Elapsed time per outcome
    pub processing_times: Vec<Duration>,
    /// Memory delta per outcome, in bytes
    pub memory_deltas: Vec<i64>,
    /// Reported archive sizes, in bytes
    pub sizes_before: Vec<u64>,
    /// Measured item directory sizes, in bytes
    pub sizes_after: Vec<u64>,
    /// Stored reference count per successful reference step
    pub reference_counts: Vec<usize>,
    /// Highest resident memory observed at the end of a run
    pub max_memory: u64,
    /// Largest item directory observed
    pub max_disk: u64,
}

impl RunStatistics {
    fn record(&mut self, outcome: &ItemOutcome) -> OutcomeClass {
        let class = outcome.class();

        self.total_processed += 1;
        match class {
            OutcomeClass::BothSuccess => self.both_success += 1,
            OutcomeClass::OnlyFetchSuccess => {
                self.only_fetch_success += 1;
                self.references_failed += 1;
            }
            OutcomeClass::CrawlerFailed => {
                self.crawler_failed += 1;
                if outcome.reference_success() {
                    self.only_reference_success += 1;
                } else {
                    self.both_failed += 1;
                }
            }
        }
        if outcome.reference == crate::types::ReferenceStatus::Skipped {
            self.references_skipped += 1;
        }

        self.processing_times.push(outcome.elapsed);
        self.memory_deltas.push(outcome.memory_delta);
        self.max_memory = self.max_memory.max(outcome.memory_after);
        if let Some(size) = outcome.size_before {
            self.sizes_before.push(size);
        }
        if let Some(size) = outcome.size_after {
            self.sizes_after.push(size);
            self.max_disk = self.max_disk.max(size);
        }
        if outcome.reference_success() {
            self.reference_counts.push(outcome.reference_count);
        }

        class
    }
}

/// Lock-guarded statistics shared by all workers of a run
#[derive(Debug, Default)]
pub struct StatisticsAggregator {
    inner: Mutex<RunStatistics>,
}

impl StatisticsAggregator {
    /// Empty aggregator
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RunStatistics> {
        // poisoning cannot leave counters half-updated
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Fold one outcome into the counters, returning its class
    pub fn record(&self, outcome: &ItemOutcome) -> OutcomeClass {
        self.lock().record(outcome)
    }

    /// Count a pipeline run that crashed
    pub fn record_unexpected(&self) {
        self.lock().unexpected_failures += 1;
    }

    /// Copy of the current counters
    pub fn snapshot(&self) -> RunStatistics {
        self.lock().clone()
    }

    /// Zero everything
    pub fn reset(&self) {
        *self.lock() = RunStatistics::default();
    }

    /// Derived figures for the current counters
    pub fn summary(&self) -> StatsSummary {
        StatsSummary::from(&self.snapshot())
    }
}

/// Rates, averages and maxima derived from a [`RunStatistics`] snapshot
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StatsSummary {
    /// Outcomes recorded
    pub total_processed: usize,
    /// Fetch and references succeeded
    pub both_success: usize,
    /// Fetch succeeded, references did not
    pub only_fetch_success: usize,
    /// Fetch failed
    pub crawler_failed: usize,
    /// Crashed pipeline runs
    pub unexpected_failures: usize,
    /// `both_success / total_processed`, in percent
    pub both_success_rate: f64,
    /// `references_failed / total_processed`, in percent
    pub reference_failure_rate: f64,
    /// `crawler_failed / total_processed`, in percent
    pub crawler_failure_rate: f64,
    /// Mean elapsed time per item
    pub average_time: Duration,
    /// Total elapsed time summed over items
    pub total_time: Duration,
    /// Mean memory delta, in bytes
    pub average_memory_delta: f64,
    /// Highest resident memory, in bytes
    pub max_memory: u64,
    /// Mean archive size, in bytes
    pub average_size_before: f64,
    /// Mean item directory size, in bytes
    pub average_size_after: f64,
    /// Largest item directory, in bytes
    pub max_disk: u64,
    /// Mean stored references per paper with references
    pub average_references: f64,
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 * 100.0 / whole as f64
    }
}

fn mean<I>(values: I, count: usize) -> f64
where
    I: IntoIterator<Item = f64>,
{
    if count == 0 {
        0.0
    } else {
        values.into_iter().sum::<f64>() / count as f64
    }
}

impl From<&RunStatistics> for StatsSummary {
    fn from(stats: &RunStatistics) -> Self {
        let total_time: Duration = stats.processing_times.iter().sum();
        let average_time = match u32::try_from(stats.processing_times.len()) {
            Ok(0) => Duration::ZERO,
            Ok(n) => total_time / n,
            Err(_) => Duration::from_secs_f64(
                total_time.as_secs_f64() / stats.processing_times.len() as f64,
            ),
        };

        Self {
            total_processed: stats.total_processed,
            both_success: stats.both_success,
            only_fetch_success: stats.only_fetch_success,
            crawler_failed: stats.crawler_failed,
            unexpected_failures: stats.unexpected_failures,
            both_success_rate: percent(stats.both_success, stats.total_processed),
            reference_failure_rate: percent(stats.references_failed, stats.total_processed),
            crawler_failure_rate: percent(stats.crawler_failed, stats.total_processed),
            average_time,
            total_time,
            average_memory_delta: mean(
                stats.memory_deltas.iter().map(|&d| d as f64),
                stats.memory_deltas.len(),
            ),
            max_memory: stats.max_memory,
            average_size_before: mean(
                stats.sizes_before.iter().map(|&s| s as f64),
                stats.sizes_before.len(),
            ),
            average_size_after: mean(
                stats.sizes_after.iter().map(|&s| s as f64),
                stats.sizes_after.len(),
            ),
            max_disk: stats.max_disk,
            average_references: mean(
                stats.reference_counts.iter().map(|&c| c as f64),
                stats.reference_counts.len(),
            ),
        }
    }
}
