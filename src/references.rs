//! Reference fetcher backed by the Semantic Scholar graph API
//!
//! Only references that carry an arXiv external id are kept; they are stored
//! in `references.json` keyed by storage-key form (`2301-00001`).

use crate::config::ReferenceConfig;
use crate::error::{Error, Result};
use crate::retry::{IsRetryable, Sleeper, TokioSleeper, with_retry};
use crate::storage::Storage;
use crate::types::Identifier;
use async_trait::async_trait;
use regex::Regex;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Fetches and stores the reference list of one paper
///
/// `Ok(false)` means the service knows no (usable) references for the paper.
#[async_trait]
pub trait ReferenceFetcher: Send + Sync {
    /// Fetch references for `id` and write `references.json`
    async fn fetch(&self, id: &Identifier) -> Result<bool>;
}

/// One stored reference
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceEntry {
    /// Title of the cited paper
    pub paper_title: String,
    /// Author names
    pub authors: Vec<String>,
    /// Publication date, `YYYY-01-01` when only the year is known, empty if neither
    pub submission_date: String,
    /// Semantic Scholar paper id
    pub semantic_scholar_id: Option<String>,
    /// Publication year
    pub year: Option<i32>,
}

#[derive(Debug, Default, Deserialize)]
struct PaperResponse {
    #[serde(default)]
    references: Option<Vec<Option<ApiReference>>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiReference {
    paper_id: Option<String>,
    title: Option<String>,
    #[serde(default)]
    authors: Option<Vec<ApiAuthor>>,
    year: Option<i32>,
    publication_date: Option<String>,
    external_ids: Option<BTreeMap<String, serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct ApiAuthor {
    name: Option<String>,
}

/// Failure of a single request attempt
#[derive(Debug)]
enum AttemptError {
    /// Any non-200, non-404 status; the service expects these to be retried
    Status(u16),
    NotFound,
    Transport(Error),
}

impl fmt::Display for AttemptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptError::Status(status) => write!(f, "reference service returned HTTP {}", status),
            AttemptError::NotFound => write!(f, "paper not found in reference service"),
            AttemptError::Transport(e) => write!(f, "{}", e),
        }
    }
}

impl IsRetryable for AttemptError {
    fn is_retryable(&self) -> bool {
        match self {
            AttemptError::Status(_) => true,
            AttemptError::NotFound => false,
            AttemptError::Transport(e) => e.is_retryable(),
        }
    }
}

impl From<reqwest::Error> for AttemptError {
    fn from(e: reqwest::Error) -> Self {
        AttemptError::Transport(Error::Network(e))
    }
}

/// [`ReferenceFetcher`] talking to Semantic Scholar
pub struct SemanticScholarClient {
    http: reqwest::Client,
    config: ReferenceConfig,
    storage: Storage,
    keys: ReferenceKeys,
    sleeper: Arc<dyn Sleeper>,
}

impl SemanticScholarClient {
    /// Create a client writing into `storage`
    pub fn new(config: ReferenceConfig, storage: Storage) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| Error::Other(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            config,
            storage,
            keys: ReferenceKeys::new()?,
            sleeper: Arc::new(TokioSleeper),
        })
    }

    /// Replace the clock used between retries
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Raw reference list, `None` when the paper is unknown to the service
    async fn request(&self, id: &Identifier) -> std::result::Result<Option<Vec<Option<ApiReference>>>, AttemptError> {
        let url = format!(
            "{}/paper/arXiv:{}",
            self.config.api_url.trim_end_matches('/'),
            id
        );

        let outcome = with_retry(&self.config.retry, self.sleeper.as_ref(), || {
            let http = self.http.clone();
            let url = url.clone();
            let fields = self.config.fields.clone();
            async move {
                let response = http.get(&url).query(&[("fields", fields.as_str())]).send().await?;
                match response.status() {
                    StatusCode::OK => Ok(response.json::<PaperResponse>().await?),
                    StatusCode::NOT_FOUND => Err(AttemptError::NotFound),
                    other => Err(AttemptError::Status(other.as_u16())),
                }
            }
        })
        .await;

        match outcome {
            Ok(body) => Ok(Some(body.references.unwrap_or_default())),
            Err(AttemptError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Convert the raw list into stored entries
    fn convert(&self, references: Vec<Option<ApiReference>>) -> BTreeMap<String, ReferenceEntry> {
        let mut converted = BTreeMap::new();
        for reference in references.into_iter().flatten() {
            let Some(arxiv_id) = reference
                .external_ids
                .as_ref()
                .and_then(|ids| ids.get("ArXiv"))
                .and_then(|v| v.as_str())
                .filter(|s| !s.is_empty())
            else {
                continue;
            };
            let key = self.keys.storage_key(arxiv_id);

            let submission_date = match (&reference.publication_date, reference.year) {
                (Some(date), _) if !date.is_empty() => date.clone(),
                (_, Some(year)) => format!("{}-01-01", year),
                _ => String::new(),
            };

            let authors = reference
                .authors
                .unwrap_or_default()
                .into_iter()
                .filter_map(|a| a.name)
                .filter(|n| !n.is_empty())
                .collect();

            converted.insert(
                key,
                ReferenceEntry {
                    paper_title: reference.title.unwrap_or_default(),
                    authors,
                    submission_date,
                    semantic_scholar_id: reference.paper_id,
                    year: reference.year,
                },
            );
        }
        converted
    }
}

#[async_trait]
impl ReferenceFetcher for SemanticScholarClient {
    async fn fetch(&self, id: &Identifier) -> Result<bool> {
        if !self.storage.item_dir(id).exists() {
            warn!(identifier = %id, "item directory missing, skipping references");
            return Ok(false);
        }

        let references = match self.request(id).await {
            Ok(Some(references)) => references,
            Ok(None) => {
                debug!(identifier = %id, "paper unknown to reference service");
                self.storage.write_references(id, &serde_json::json!({})).await?;
                return Ok(false);
            }
            Err(e) => {
                warn!(identifier = %id, error = %e, "reference request failed");
                self.storage.write_references(id, &serde_json::json!({})).await?;
                return Ok(false);
            }
        };

        if references.is_empty() {
            debug!(identifier = %id, "no references listed");
            self.storage.write_references(id, &serde_json::json!({})).await?;
            return Ok(false);
        }

        let total = references.len();
        let converted = self.convert(references);
        self.storage.write_references(id, &converted).await?;

        info!(
            identifier = %id,
            found = total,
            saved = converted.len(),
            "references stored"
        );
        Ok(true)
    }
}

/// Maps arXiv ids as returned by the service to storage keys
#[derive(Clone, Debug)]
struct ReferenceKeys {
    version_suffix: Regex,
}

impl ReferenceKeys {
    fn new() -> Result<Self> {
        let version_suffix = Regex::new(r"v\d+$")
            .map_err(|e| Error::Other(format!("invalid version pattern: {}", e)))?;
        Ok(Self { version_suffix })
    }

    /// `2305.04793v2` becomes `2305-04793`; old-style ids keep their slash
    fn storage_key(&self, arxiv_id: &str) -> String {
        self.version_suffix.replace(arxiv_id, "").replace('.', "-")
    }
}
