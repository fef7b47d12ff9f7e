//! Item fetcher backed by the arXiv export API and e-print service
//!
//! For one identifier the client queries the Atom API for metadata, looks up
//! the revision dates of later versions, writes `metadata.json` and then
//! downloads and extracts the source archive of every version.

mod feed;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use feed::PaperMetadata;

use crate::config::ArxivConfig;
use crate::error::{Error, Result};
use crate::extraction::extract_and_clean_async;
use crate::retry::{Sleeper, TokioSleeper, with_retry};
use crate::storage::Storage;
use crate::types::{FetchReport, Identifier};
use async_trait::async_trait;
use atom_syndication::Entry;
use feed::FeedParser;
use reqwest::StatusCode;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Fetches one paper: existence, metadata and source archives
///
/// `Ok` with `success == false` means the paper does not exist (or its
/// metadata could not be obtained). `Err` is reserved for unexpected
/// failures such as local I/O errors.
#[async_trait]
pub trait ItemFetcher: Send + Sync {
    /// Fetch and store everything for `id`
    async fn fetch(&self, id: &Identifier) -> Result<FetchReport>;
}

/// [`ItemFetcher`] talking to arXiv
pub struct ArxivClient {
    http: reqwest::Client,
    config: ArxivConfig,
    storage: Storage,
    parser: FeedParser,
    sleeper: Arc<dyn Sleeper>,
}

impl ArxivClient {
    /// Create a client writing into `storage`
    pub fn new(config: ArxivConfig, storage: Storage) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| Error::Other(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            config,
            storage,
            parser: FeedParser::new()?,
            sleeper: Arc::new(TokioSleeper),
        })
    }

    /// Replace the clock used for retry and politeness delays
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Query the API for one `id_list` value, retrying transient failures
    ///
    /// A 404 from the API means the id is unknown and yields `Ok(None)`.
    async fn query(&self, id_list: &str) -> Result<Option<Entry>> {
        let outcome = with_retry(&self.config.retry, self.sleeper.as_ref(), || {
            let http = self.http.clone();
            let url = self.config.api_url.clone();
            let id_list = id_list.to_string();
            async move {
                let response = http
                    .get(&url)
                    .query(&[("id_list", id_list.as_str()), ("max_results", "1")])
                    .send()
                    .await?;
                let status = response.status();
                if !status.is_success() {
                    return Err(Error::HttpStatus {
                        status: status.as_u16(),
                        url,
                    });
                }
                Ok::<_, Error>(response.text().await?)
            }
        })
        .await;

        match outcome {
            Ok(body) => self.parser.first_entry(&body),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Metadata of the latest version, `None` if the paper does not exist
    pub async fn fetch_metadata(&self, id: &Identifier) -> Result<Option<PaperMetadata>> {
        let Some(entry) = self.query(&id.to_string()).await? else {
            return Ok(None);
        };

        let mut metadata = self.parser.metadata(id, &entry);
        metadata.revised_dates = self.revised_dates(id, metadata.latest_version).await;
        Ok(Some(metadata))
    }

    /// Update dates of versions 2..=latest; failures become `None`
    async fn revised_dates(&self, id: &Identifier, latest: u32) -> Vec<Option<String>> {
        let mut dates = Vec::new();
        for version in 2..=latest {
            let versioned = id.versioned(version);
            let date = match self.query(&versioned).await {
                Ok(entry) => entry.as_ref().map(feed::updated_date),
                Err(e) => {
                    debug!(identifier = %versioned, error = %e, "revision date unavailable");
                    None
                }
            };
            dates.push(date);
        }
        dates
    }

    /// Download one version's e-print to `dest`
    ///
    /// Returns the byte count, or `None` when the version has no source (404).
    async fn download_version(
        &self,
        id: &Identifier,
        version: u32,
        dest: &Path,
    ) -> Result<Option<u64>> {
        let url = format!(
            "{}/{}",
            self.config.eprint_url.trim_end_matches('/'),
            id.versioned(version)
        );

        let body = with_retry(&self.config.retry, self.sleeper.as_ref(), || {
            let http = self.http.clone();
            let url = url.clone();
            async move {
                let response = http.get(&url).send().await?;
                let status = response.status();
                if status == StatusCode::NOT_FOUND {
                    return Ok(None);
                }
                if !status.is_success() {
                    return Err(Error::HttpStatus {
                        status: status.as_u16(),
                        url,
                    });
                }
                Ok::<_, Error>(Some(response.bytes().await?))
            }
        })
        .await?;

        match body {
            Some(bytes) => {
                tokio::fs::write(dest, &bytes).await?;
                Ok(Some(bytes.len() as u64))
            }
            None => Ok(None),
        }
    }

    /// Download and extract every version, returning `(bytes_downloaded, versions_extracted)`
    ///
    /// Stops early after `missing_versions_before_stop` consecutive 404s.
    async fn fetch_sources(&self, id: &Identifier, latest: u32) -> Result<(u64, u32)> {
        let last = latest.clamp(1, self.config.max_versions.max(1));
        let mut downloaded = 0u64;
        let mut extracted = 0u32;
        let mut missing_streak = 0u32;

        for version in 1..=last {
            let archive = self
                .storage
                .item_dir(id)
                .join(format!("{}.download", id.versioned(version)));

            match self.download_version(id, version, &archive).await {
                Ok(Some(bytes)) => {
                    missing_streak = 0;
                    downloaded = downloaded.saturating_add(bytes);

                    let dest = self.storage.version_dir(id, version);
                    match extract_and_clean_async(archive.clone(), dest).await {
                        Ok(summary) => {
                            extracted += 1;
                            debug!(
                                identifier = %id,
                                version,
                                format = summary.format.label(),
                                removed = summary.removed,
                                "version extracted"
                            );
                        }
                        Err(e) => {
                            warn!(identifier = %id, version, error = %e, "failed to extract version");
                        }
                    }
                    remove_temporary(&archive).await;
                    self.sleeper.sleep(self.config.version_delay_ms).await;
                }
                Ok(None) => {
                    missing_streak += 1;
                    debug!(identifier = %id, version, "no source for version");
                    if missing_streak >= self.config.missing_versions_before_stop {
                        debug!(identifier = %id, version, "consecutive missing versions, stopping");
                        break;
                    }
                }
                Err(e) => {
                    missing_streak = 0;
                    warn!(identifier = %id, version, error = %e, "failed to download version");
                    remove_temporary(&archive).await;
                }
            }
        }

        Ok((downloaded, extracted))
    }
}

async fn remove_temporary(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "could not delete temporary archive"),
    }
}

#[async_trait]
impl ItemFetcher for ArxivClient {
    async fn fetch(&self, id: &Identifier) -> Result<FetchReport> {
        let metadata = match self.fetch_metadata(id).await {
            Ok(Some(metadata)) => metadata,
            Ok(None) => {
                debug!(identifier = %id, "paper not found");
                return Ok(FetchReport::not_found());
            }
            Err(e) => {
                warn!(identifier = %id, error = %e, "metadata query failed");
                return Ok(FetchReport::not_found());
            }
        };

        self.storage.prepare_item(id).await?;
        self.storage.write_metadata(id, &metadata).await?;

        let (downloaded, extracted) = self.fetch_sources(id, metadata.latest_version).await?;

        info!(
            identifier = %id,
            latest_version = metadata.latest_version,
            versions_extracted = extracted,
            bytes = downloaded,
            "paper fetched"
        );

        Ok(FetchReport {
            success: true,
            size_before: Some(downloaded),
            versions_extracted: extracted,
        })
    }
}
