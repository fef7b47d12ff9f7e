//! Identifier range generation
//!
//! A range inside one period is plain arithmetic. A range crossing into the
//! next period needs the last valid sequence number of the start period,
//! which is found by probing forward until a run of consecutive misses.

use crate::arxiv::ItemFetcher;
use crate::error::Result;
use crate::storage::Storage;
use crate::types::{Event, Identifier, Period, RunRequest};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Answers whether an identifier exists
#[async_trait]
pub trait ExistenceOracle: Send + Sync {
    /// Whether `id` exists upstream
    async fn exists(&self, id: &Identifier) -> bool;
}

/// Oracle that performs a full item fetch
///
/// A positive probe leaves the fetched item in storage. A negative probe
/// (or an error) removes whatever the fetch created.
pub struct FetchProbe {
    fetcher: Arc<dyn ItemFetcher>,
    storage: Storage,
}

impl FetchProbe {
    /// Probe through `fetcher`, cleaning up under `storage`
    pub fn new(fetcher: Arc<dyn ItemFetcher>, storage: Storage) -> Self {
        Self { fetcher, storage }
    }
}

#[async_trait]
impl ExistenceOracle for FetchProbe {
    async fn exists(&self, id: &Identifier) -> bool {
        let exists = match self.fetcher.fetch(id).await {
            Ok(report) => report.success,
            Err(e) => {
                warn!(identifier = %id, error = %e, "probe fetch failed");
                false
            }
        };
        if !exists {
            if let Err(e) = self.storage.remove_item(id).await {
                warn!(identifier = %id, error = %e, "failed to clean up after negative probe");
            }
        }
        exists
    }
}

/// Last existing sequence number of `period`, probing from `start`
///
/// Stops after `threshold` consecutive misses. Returns `start - 1` when
/// nothing from `start` on exists.
pub async fn find_last_valid(
    period: Period,
    start: u32,
    oracle: &dyn ExistenceOracle,
    threshold: u32,
    events: Option<&broadcast::Sender<Event>>,
) -> Result<u32> {
    let threshold = threshold.max(1);
    let mut last_valid = start.saturating_sub(1);
    let mut consecutive_failures = 0u32;
    let mut sequence = start;

    while consecutive_failures < threshold {
        let id = Identifier::new(period, sequence)?;
        let exists = oracle.exists(&id).await;
        if exists {
            last_valid = sequence;
            consecutive_failures = 0;
        } else {
            consecutive_failures += 1;
        }
        debug!(identifier = %id, exists, consecutive_failures, "probe step");
        if let Some(tx) = events {
            tx.send(Event::ProbeStep {
                identifier: id,
                exists,
                consecutive_failures,
            })
            .ok();
        }

        if sequence >= crate::types::MAX_SEQUENCE {
            break;
        }
        sequence += 1;
    }

    info!(period = %period, last_valid, "discovery probe finished");
    Ok(last_valid)
}

/// Ordered identifiers for a request
///
/// Same period: `start_seq..=end_seq`. Different periods: the start period
/// from `start_seq` to its probed last valid id, then `1..=end_seq` of the
/// end period.
pub async fn generate(
    request: &RunRequest,
    oracle: &dyn ExistenceOracle,
    threshold: u32,
) -> Result<Vec<Identifier>> {
    generate_with_events(request, oracle, threshold, None).await
}

pub(crate) async fn generate_with_events(
    request: &RunRequest,
    oracle: &dyn ExistenceOracle,
    threshold: u32,
    events: Option<&broadcast::Sender<Event>>,
) -> Result<Vec<Identifier>> {
    request.validate()?;

    if request.is_single_period() {
        return span(request.start_period, request.start_seq, request.end_seq);
    }

    let last_valid = find_last_valid(
        request.start_period,
        request.start_seq,
        oracle,
        threshold,
        events,
    )
    .await?;

    let mut identifiers = span(request.start_period, request.start_seq, last_valid)?;
    identifiers.extend(span(request.end_period, 1, request.end_seq)?);
    Ok(identifiers)
}

/// `from..=to` in one period; empty when `from > to`
fn span(period: Period, from: u32, to: u32) -> Result<Vec<Identifier>> {
    (from..=to).map(|seq| Identifier::new(period, seq)).collect()
}
