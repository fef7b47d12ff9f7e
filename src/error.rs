//! Error types for arxiv-crawl
//!
//! Expected crawl outcomes (a paper that does not exist, a paper without
//! references, a corrupt source archive for one version) are not errors:
//! the fetchers resolve them into plain `false`/empty results. The types
//! here cover everything else:
//! - Configuration and identifier parsing problems
//! - Network and HTTP status failures (some of them retryable)
//! - Local I/O, serialization and feed parsing failures
//! - Archive extraction failures for a single source version

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for arxiv-crawl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for arxiv-crawl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "max_concurrent")
        key: Option<String>,
    },

    /// An identifier or period string could not be parsed
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// A remote service answered with an unexpected HTTP status
    #[error("HTTP {status} from {url}")]
    HttpStatus {
        /// Numeric HTTP status code
        status: u16,
        /// Requested URL
        url: String,
    },

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The arXiv API returned a feed that could not be parsed
    #[error("feed error: {0}")]
    Feed(String),

    /// The requested item does not exist upstream
    #[error("not found: {0}")]
    NotFound(String),

    /// Archive extraction error
    #[error("extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Build a configuration error for a specific key
    pub fn config(key: &str, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }

    /// Whether this error is a definitive "does not exist" signal
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound(_) => true,
            Error::HttpStatus { status, .. } => *status == 404,
            _ => false,
        }
    }
}

/// Errors raised while unpacking one source archive
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// The archive is neither PDF, gzip nor tar
    #[error("unrecognized archive format for {archive}: {description}")]
    UnknownFormat {
        /// Path to the archive on disk
        archive: PathBuf,
        /// What the leading bytes looked like
        description: String,
    },

    /// The archive was recognized but could not be unpacked
    #[error("failed to extract {archive}: {reason}")]
    Corrupt {
        /// Path to the archive on disk
        archive: PathBuf,
        /// Underlying failure
        reason: String,
    },
}
