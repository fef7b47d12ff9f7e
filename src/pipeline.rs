//! Per-identifier work unit: fetch, then references

use crate::arxiv::ItemFetcher;
use crate::error::Result;
use crate::memory;
use crate::references::ReferenceFetcher;
use crate::storage::Storage;
use crate::types::{Identifier, ItemOutcome, ReferenceStatus};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// One unit of work run by the scheduler
///
/// Expected failures are part of the returned outcome. `Err` marks an
/// unexpected failure and is counted apart from the outcome classes.
#[async_trait]
pub trait Pipeline: Send + Sync {
    /// Process one identifier
    async fn run(&self, id: &Identifier) -> Result<ItemOutcome>;
}

/// The fetch-then-references pipeline
pub struct ItemPipeline {
    fetcher: Arc<dyn ItemFetcher>,
    references: Arc<dyn ReferenceFetcher>,
    storage: Storage,
}

impl ItemPipeline {
    /// Build a pipeline over the given collaborators
    pub fn new(
        fetcher: Arc<dyn ItemFetcher>,
        references: Arc<dyn ReferenceFetcher>,
        storage: Storage,
    ) -> Self {
        Self {
            fetcher,
            references,
            storage,
        }
    }
}

#[async_trait]
impl Pipeline for ItemPipeline {
    async fn run(&self, id: &Identifier) -> Result<ItemOutcome> {
        let started = Instant::now();
        let memory_before = memory::resident_bytes();

        let report = self.fetcher.fetch(id).await?;

        let (reference, reference_count) = if report.success {
            if self.references.fetch(id).await? {
                (ReferenceStatus::Found, self.storage.reference_count(id).await)
            } else {
                (ReferenceStatus::Missing, 0)
            }
        } else {
            (ReferenceStatus::Skipped, 0)
        };

        let elapsed = started.elapsed();
        let memory_after = memory::resident_bytes();

        let size_after = match self.storage.disk_usage(id).await {
            Ok(size) => Some(size),
            Err(e) => {
                warn!(identifier = %id, error = %e, "could not measure item directory");
                None
            }
        };

        debug!(
            identifier = %id,
            fetch_success = report.success,
            reference = ?reference,
            elapsed_ms = elapsed.as_millis(),
            "pipeline finished"
        );

        Ok(ItemOutcome {
            identifier: *id,
            fetch_success: report.success,
            reference,
            elapsed,
            memory_delta: memory::delta(memory_before, memory_after),
            memory_after,
            size_before: report.size_before,
            size_after,
            reference_count,
        })
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::types::FetchReport;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct StubFetcher {
        storage: Storage,
        success: bool,
    }

    #[async_trait]
    impl ItemFetcher for StubFetcher {
        async fn fetch(&self, id: &Identifier) -> Result<FetchReport> {
            if !self.success {
                return Ok(FetchReport::not_found());
            }
            self.storage.prepare_item(id).await?;
            tokio::fs::write(self.storage.metadata_path(id), vec![b'm'; 40]).await?;
            Ok(FetchReport {
                success: true,
                size_before: Some(1_234),
                versions_extracted: 1,
            })
        }
    }

    struct StubReferences {
        storage: Storage,
        found: bool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ReferenceFetcher for StubReferences {
        async fn fetch(&self, id: &Identifier) -> Result<bool> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let body = if self.found {
                json!({"2301-00001": {}, "2301-00002": {}, "2301-00003": {}})
            } else {
                json!({})
            };
            self.storage.write_references(id, &body).await?;
            Ok(self.found)
        }
    }

    struct FailingFetcher;

    #[async_trait]
    impl ItemFetcher for FailingFetcher {
        async fn fetch(&self, _id: &Identifier) -> Result<FetchReport> {
            Err(Error::Other("disk on fire".into()))
        }
    }

    fn id() -> Identifier {
        "2305.04793".parse().unwrap()
    }

    fn pipeline(dir: &TempDir, fetch_ok: bool, refs_found: bool) -> (ItemPipeline, Arc<StubReferences>) {
        let storage = Storage::new(dir.path());
        let references = Arc::new(StubReferences {
            storage: storage.clone(),
            found: refs_found,
            calls: AtomicUsize::new(0),
        });
        let fetcher = Arc::new(StubFetcher {
            storage: storage.clone(),
            success: fetch_ok,
        });
        (
            ItemPipeline::new(fetcher, references.clone(), storage),
            references,
        )
    }

    #[tokio::test]
    async fn failed_fetch_never_calls_references() {
        let dir = TempDir::new().unwrap();
        let (pipeline, references) = pipeline(&dir, false, true);

        let outcome = pipeline.run(&id()).await.unwrap();

        assert!(!outcome.fetch_success);
        assert_eq!(outcome.reference, ReferenceStatus::Skipped);
        assert!(!outcome.reference_success());
        assert_eq!(references.calls.load(Ordering::SeqCst), 0);
        assert_eq!(outcome.size_before, None);
        assert_eq!(outcome.size_after, Some(0));
    }

    #[tokio::test]
    async fn successful_run_counts_references_and_disk() {
        let dir = TempDir::new().unwrap();
        let (pipeline, references) = pipeline(&dir, true, true);

        let outcome = pipeline.run(&id()).await.unwrap();

        assert!(outcome.fetch_success);
        assert_eq!(outcome.reference, ReferenceStatus::Found);
        assert_eq!(outcome.reference_count, 3);
        assert_eq!(outcome.size_before, Some(1_234));
        let references_size = std::fs::metadata(Storage::new(dir.path()).references_path(&id()))
            .unwrap()
            .len();
        assert_eq!(outcome.size_after, Some(40 + references_size));
        assert_eq!(references.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_references_are_attempted_and_failed() {
        let dir = TempDir::new().unwrap();
        let (pipeline, _) = pipeline(&dir, true, false);

        let outcome = pipeline.run(&id()).await.unwrap();

        assert_eq!(outcome.reference, ReferenceStatus::Missing);
        assert_eq!(outcome.reference_count, 0);
        assert_eq!(outcome.status_marker(), "✓X");
    }

    #[tokio::test]
    async fn unexpected_fetch_error_propagates() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::new(dir.path());
        let references = Arc::new(StubReferences {
            storage: storage.clone(),
            found: true,
            calls: AtomicUsize::new(0),
        });
        let pipeline = ItemPipeline::new(Arc::new(FailingFetcher), references.clone(), storage);

        assert!(pipeline.run(&id()).await.is_err());
        assert_eq!(references.calls.load(Ordering::SeqCst), 0);
    }
}
