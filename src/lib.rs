//! # arxiv-crawl
//!
//! Batch crawler for arXiv papers: metadata, LaTeX sources and reference
//! lists, fetched for a range of identifiers with bounded concurrency.
//!
//! ## Design Philosophy
//!
//! arxiv-crawl is designed to be:
//! - **Failure-tolerant** - A missing paper or a broken archive is an outcome, not an error
//! - **Bounded** - At most `max_concurrent` papers are in flight at once
//! - **Library-first** - The binary is a thin argument parser over [`Crawler`]
//! - **Event-driven** - Consumers subscribe to events, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use arxiv_crawl::{Config, Crawler, RunRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let crawler = Crawler::new(Config::default())?;
//!
//!     let mut events = crawler.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let report = crawler
//!         .run(RunRequest {
//!             start_period: "2023-05".parse()?,
//!             start_seq: 1,
//!             end_period: "2023-05".parse()?,
//!             end_seq: 50,
//!         })
//!         .await?;
//!     println!("{:.2}% fully crawled", report.summary.both_success_rate);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// arXiv metadata and source fetcher
pub mod arxiv;
/// Configuration types
pub mod config;
/// Crawl orchestration
pub mod crawler;
/// Error types
pub mod error;
/// Source archive extraction
pub mod extraction;
/// Process memory sampling
pub mod memory;
/// Per-identifier pipeline
pub mod pipeline;
/// Identifier range generation and discovery probe
pub mod range;
/// Semantic Scholar reference fetcher
pub mod references;
/// Progress reporting
pub mod report;
/// Retry logic with exponential backoff
pub mod retry;
/// Bounded-concurrency dispatch
pub mod scheduler;
/// Run statistics
pub mod stats;
/// On-disk layout
pub mod storage;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use arxiv::{ArxivClient, ItemFetcher, PaperMetadata};
pub use config::{ArxivConfig, Config, CrawlConfig, ReferenceConfig, RetryConfig};
pub use crawler::{Crawler, RunReport};
pub use error::{Error, ExtractionError, Result};
pub use pipeline::{ItemPipeline, Pipeline};
pub use range::{ExistenceOracle, FetchProbe};
pub use references::{ReferenceFetcher, SemanticScholarClient};
pub use scheduler::Completion;
pub use stats::{RunStatistics, StatisticsAggregator, StatsSummary};
pub use storage::Storage;
pub use types::{
    Event, FetchReport, Identifier, ItemOutcome, OutcomeClass, Period, ReferenceStatus,
    RunRequest,
};
