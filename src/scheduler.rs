//! Bounded-concurrency dispatch of pipeline runs
//!
//! Every identifier becomes a spawned task, and at most `limit` of them are
//! in flight at once. Results come back in completion order. A run that
//! fails or panics is reported as [`Completion::Crashed`] and never affects
//! its siblings.

use crate::pipeline::Pipeline;
use crate::types::{Identifier, ItemOutcome};
use futures::stream::{self, Stream, StreamExt};
use std::sync::Arc;
use tracing::error;

/// What a dispatched pipeline run produced
#[derive(Clone, Debug)]
pub enum Completion {
    /// The pipeline returned a classified outcome
    Finished(ItemOutcome),
    /// The pipeline returned an error or panicked
    Crashed {
        /// Identifier of the failed run
        identifier: Identifier,
        /// Error description
        error: String,
    },
}

/// Run `pipeline` over `identifiers` with at most `limit` concurrent runs
///
/// Identifiers are started in order; the returned stream yields as runs
/// finish. A `limit` of zero is treated as one. Spawned runs are not
/// cancelled when the stream is dropped.
pub fn run_all(
    identifiers: Vec<Identifier>,
    pipeline: Arc<dyn Pipeline>,
    limit: usize,
) -> impl Stream<Item = Completion> + Send {
    stream::iter(identifiers)
        .map(move |identifier| {
            let pipeline = pipeline.clone();
            let handle = tokio::spawn(async move { pipeline.run(&identifier).await });
            async move {
                match handle.await {
                    Ok(Ok(outcome)) => Completion::Finished(outcome),
                    Ok(Err(e)) => {
                        error!(identifier = %identifier, error = %e, "pipeline failed unexpectedly");
                        Completion::Crashed {
                            identifier,
                            error: e.to_string(),
                        }
                    }
                    Err(e) => {
                        error!(identifier = %identifier, error = %e, "pipeline task panicked");
                        Completion::Crashed {
                            identifier,
                            error: format!("task failed: {}", e),
                        }
                    }
                }
            }
        })
        .buffer_unordered(limit.max(1))
}
