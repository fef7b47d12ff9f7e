//! Human-readable progress output
//!
//! Everything goes through `tracing::info!` so the subscriber decides where
//! it ends up.

use crate::stats::{RunStatistics, StatsSummary};
use crate::types::{Identifier, ItemOutcome};
use std::time::Duration;
use tracing::{info, warn};

/// Emits per-item status lines and periodic and final reports
#[derive(Clone, Debug)]
pub struct ProgressReporter {
    interval: usize,
}

impl ProgressReporter {
    /// Report aggregate progress every `interval` completions (at least 1)
    pub fn new(interval: usize) -> Self {
        Self {
            interval: interval.max(1),
        }
    }

    /// Whether the `completed`-th completion should trigger a periodic report
    pub fn is_due(&self, completed: usize) -> bool {
        completed > 0 && completed % self.interval == 0
    }

    /// One line per finished identifier
    pub fn item(&self, completed: usize, total: usize, outcome: &ItemOutcome) {
        info!(
            identifier = %outcome.identifier,
            references = outcome.reference_count,
            elapsed_ms = outcome.elapsed.as_millis(),
            "[{}/{}] {} {}",
            completed,
            total,
            outcome.status_marker(),
            outcome.identifier
        );
    }

    /// One line per crashed identifier
    pub fn crashed(&self, completed: usize, total: usize, identifier: &Identifier, error: &str) {
        warn!(
            identifier = %identifier,
            error,
            "[{}/{}] !! {} crashed",
            completed,
            total,
            identifier
        );
    }

    /// Counters so far
    pub fn progress(&self, stats: &RunStatistics) {
        info!(
            total_processed = stats.total_processed,
            both_success = stats.both_success,
            only_fetch_success = stats.only_fetch_success,
            only_reference_success = stats.only_reference_success,
            crawler_failed = stats.crawler_failed,
            references_failed = stats.references_failed,
            both_failed = stats.both_failed,
            unexpected_failures = stats.unexpected_failures,
            "progress report"
        );
    }

    /// Counters plus derived rates at the end of a run
    pub fn final_report(&self, stats: &RunStatistics, summary: &StatsSummary, elapsed: Duration) {
        self.progress(stats);
        info!(
            both_success_rate = %format!("{:.2}%", summary.both_success_rate),
            reference_failure_rate = %format!("{:.2}%", summary.reference_failure_rate),
            crawler_failure_rate = %format!("{:.2}%", summary.crawler_failure_rate),
            "success rates"
        );
        info!(
            average_time_ms = summary.average_time.as_millis(),
            average_memory_delta = summary.average_memory_delta,
            max_memory = summary.max_memory,
            average_size_before = summary.average_size_before,
            average_size_after = summary.average_size_after,
            max_disk = summary.max_disk,
            average_references = summary.average_references,
            "resource usage"
        );
        info!(
            elapsed_secs = elapsed.as_secs_f64(),
            references_skipped = stats.references_skipped,
            "crawl finished"
        );
    }
}
