//! Configuration types for arxiv-crawl

use serde::{Deserialize, Serialize};
use std::{path::Path, path::PathBuf, time::Duration};

use crate::error::{Error, Result};

/// Crawl orchestration settings (output location, concurrency, reporting)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CrawlConfig {
    /// Root directory for per-paper folders (default: "./papers")
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Maximum concurrent pipeline runs (default: 3)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Emit an aggregate progress report every N completions (default: 10)
    #[serde(default = "default_progress_interval")]
    pub progress_interval: usize,

    /// Consecutive misses that end the discovery probe (default: 3)
    #[serde(default = "default_probe_failure_threshold")]
    pub probe_failure_threshold: u32,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            max_concurrent: default_max_concurrent(),
            progress_interval: default_progress_interval(),
            probe_failure_threshold: default_probe_failure_threshold(),
        }
    }
}

/// arXiv metadata API and e-print source settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ArxivConfig {
    /// Atom query endpoint (default: "http://export.arxiv.org/api/query")
    #[serde(default = "default_arxiv_api_url")]
    pub api_url: String,

    /// Base URL for source archives (default: "https://arxiv.org/e-print")
    #[serde(default = "default_eprint_url")]
    pub eprint_url: String,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Per-request timeout (default: 30 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// Upper bound on source versions downloaded per paper (default: 10)
    #[serde(default = "default_max_versions")]
    pub max_versions: u32,

    /// Consecutive missing versions that stop the version loop (default: 2)
    #[serde(default = "default_missing_versions_before_stop")]
    pub missing_versions_before_stop: u32,

    /// Pause between version downloads (default: 300 ms)
    #[serde(default = "default_version_delay", with = "duration_ms_serde")]
    pub version_delay_ms: Duration,

    /// Retry policy for metadata queries and downloads
    #[serde(default = "default_arxiv_retry")]
    pub retry: RetryConfig,
}

impl Default for ArxivConfig {
    fn default() -> Self {
        Self {
            api_url: default_arxiv_api_url(),
            eprint_url: default_eprint_url(),
            user_agent: default_user_agent(),
            request_timeout: default_request_timeout(),
            max_versions: default_max_versions(),
            missing_versions_before_stop: default_missing_versions_before_stop(),
            version_delay_ms: default_version_delay(),
            retry: default_arxiv_retry(),
        }
    }
}

/// Citation graph service settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReferenceConfig {
    /// Graph API base URL (default: "https://api.semanticscholar.org/graph/v1")
    #[serde(default = "default_reference_api_url")]
    pub api_url: String,

    /// `fields` query parameter
    #[serde(default = "default_reference_fields")]
    pub fields: String,

    /// Per-request timeout (default: 10 seconds)
    #[serde(default = "default_reference_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// Retry policy for rate limits and transient failures
    #[serde(default = "default_reference_retry")]
    pub retry: RetryConfig,
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        Self {
            api_url: default_reference_api_url(),
            fields: default_reference_fields(),
            request_timeout: default_reference_timeout(),
            retry: default_reference_retry(),
        }
    }
}

/// Main configuration
///
/// Every field has a default, so an empty JSON object is a valid config file.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Orchestration settings
    #[serde(default)]
    pub crawl: CrawlConfig,

    /// arXiv access settings
    #[serde(default)]
    pub arxiv: ArxivConfig,

    /// Citation service settings
    #[serde(default)]
    pub references: ReferenceConfig,
}

impl Config {
    /// Load a JSON configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("failed to read {}: {}", path.display(), e),
            key: None,
        })?;
        let config: Config = serde_json::from_str(&content).map_err(|e| Error::Config {
            message: format!("failed to parse {}: {}", path.display(), e),
            key: None,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check invariants that serde defaults cannot express
    pub fn validate(&self) -> Result<()> {
        if self.crawl.max_concurrent == 0 {
            return Err(Error::config(
                "max_concurrent",
                "at least one concurrent pipeline is required",
            ));
        }
        if self.crawl.progress_interval == 0 {
            return Err(Error::config(
                "progress_interval",
                "progress interval must be at least 1",
            ));
        }
        if self.crawl.probe_failure_threshold == 0 {
            return Err(Error::config(
                "probe_failure_threshold",
                "probe threshold must be at least 1",
            ));
        }
        if self.arxiv.missing_versions_before_stop == 0 {
            return Err(Error::config(
                "missing_versions_before_stop",
                "must be at least 1",
            ));
        }
        for (key, retry) in [
            ("arxiv.retry", &self.arxiv.retry),
            ("references.retry", &self.references.retry),
        ] {
            if retry.backoff_multiplier < 1.0 {
                return Err(Error::config(
                    key,
                    format!(
                        "backoff_multiplier must be >= 1.0, got {}",
                        retry.backoff_multiplier
                    ),
                ));
            }
        }
        Ok(())
    }
}

/// Retry configuration for transient failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt (None = retry forever)
    #[serde(default)]
    pub max_attempts: Option<u32>,

    /// Delay before the first retry (default: 5 seconds)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0, 1.0 = fixed delay)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: false)
    #[serde(default)]
    pub jitter: bool,
}

impl RetryConfig {
    /// A policy that waits the same delay before every retry, forever
    pub fn fixed(delay: Duration) -> Self {
        Self {
            max_attempts: None,
            initial_delay: delay,
            max_delay: delay,
            backoff_multiplier: 1.0,
            jitter: false,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: None,
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: false,
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./papers")
}

fn default_max_concurrent() -> usize {
    3
}

fn default_progress_interval() -> usize {
    10
}

fn default_probe_failure_threshold() -> u32 {
    3
}

fn default_arxiv_api_url() -> String {
    "http://export.arxiv.org/api/query".to_string()
}

fn default_eprint_url() -> String {
    "https://arxiv.org/e-print".to_string()
}

fn default_user_agent() -> String {
    concat!("arxiv-crawl/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_max_versions() -> u32 {
    10
}

fn default_missing_versions_before_stop() -> u32 {
    2
}

fn default_version_delay() -> Duration {
    Duration::from_millis(300)
}

fn default_arxiv_retry() -> RetryConfig {
    RetryConfig::default()
}

fn default_reference_api_url() -> String {
    "https://api.semanticscholar.org/graph/v1".to_string()
}

fn default_reference_fields() -> String {
    [
        "references",
        "references.title",
        "references.authors",
        "references.year",
        "references.venue",
        "references.externalIds",
        "references.publicationDate",
    ]
    .join(",")
}

fn default_reference_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_reference_retry() -> RetryConfig {
    RetryConfig::fixed(Duration::from_secs(2))
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(5)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Millisecond Duration serialization helper
mod duration_ms_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_yields_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.crawl.max_concurrent, 3);
        assert_eq!(config.crawl.probe_failure_threshold, 3);
        assert_eq!(config.crawl.output_dir, PathBuf::from("./papers"));
        assert_eq!(config.arxiv.missing_versions_before_stop, 2);
        assert_eq!(config.arxiv.retry.initial_delay, Duration::from_secs(5));
        assert_eq!(config.arxiv.retry.max_delay, Duration::from_secs(60));
        assert!(config.arxiv.retry.max_attempts.is_none());
        assert_eq!(config.references.retry.backoff_multiplier, 1.0);
        assert_eq!(config.references.retry.initial_delay, Duration::from_secs(2));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn durations_serialize_as_integers() {
        let config = ArxivConfig::default();
        let json = serde_json::to_value(&config).expect("serialize failed");
        assert_eq!(json["request_timeout"], 30);
        assert_eq!(json["version_delay_ms"], 300);
        assert_eq!(json["retry"]["initial_delay"], 5);
    }

    #[test]
    fn partial_override_keeps_other_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"crawl": {"max_concurrent": 5}, "references": {"retry": {"initial_delay": 1}}}"#)
                .unwrap();
        assert_eq!(config.crawl.max_concurrent, 5);
        assert_eq!(config.crawl.progress_interval, 10);
        assert_eq!(config.references.retry.initial_delay, Duration::from_secs(1));
        assert_eq!(config.references.retry.max_delay, Duration::from_secs(60));
    }

    #[test]
    fn zero_concurrency_rejected() {
        let mut config = Config::default();
        config.crawl.max_concurrent = 0;
        match config.validate() {
            Err(Error::Config { key, .. }) => assert_eq!(key.as_deref(), Some("max_concurrent")),
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn shrinking_backoff_rejected() {
        let mut config = Config::default();
        config.arxiv.retry.backoff_multiplier = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn from_file_reads_and_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crawl.json");
        std::fs::write(&path, r#"{"crawl": {"output_dir": "/data/papers"}}"#).unwrap();
        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.crawl.output_dir, PathBuf::from("/data/papers"));

        std::fs::write(&path, r#"{"crawl": {"max_concurrent": 0}}"#).unwrap();
        assert!(Config::from_file(&path).is_err());

        assert!(Config::from_file(&dir.path().join("missing.json")).is_err());
    }
}
