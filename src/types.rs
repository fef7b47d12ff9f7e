//! Core types for arxiv-crawl

use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::stats::StatsSummary;

/// Highest sequence number representable in the five-digit identifier form
pub const MAX_SEQUENCE: u32 = 99_999;

/// A calendar year-month bucket (`YYMM` in identifiers)
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Period {
    year: u16,
    month: u8,
}

impl Period {
    /// Create a period, validating the month
    pub fn new(year: u16, month: u8) -> Result<Self> {
        if !(1..=12).contains(&month) {
            return Err(Error::InvalidIdentifier(format!(
                "month {} out of range in period {}-{:02}",
                month, year, month
            )));
        }
        if !(2000..=2099).contains(&year) {
            return Err(Error::InvalidIdentifier(format!(
                "year {} cannot be expressed as a two-digit period prefix",
                year
            )));
        }
        Ok(Self { year, month })
    }

    /// Four-digit calendar year
    pub fn year(&self) -> u16 {
        self.year
    }

    /// Month (1-12)
    pub fn month(&self) -> u8 {
        self.month
    }

    /// The `YYMM` prefix used in identifiers
    pub fn prefix(&self) -> String {
        format!("{:02}{:02}", self.year % 100, self.month)
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:02}", self.year, self.month)
    }
}

/// Accepts either `YYYY-MM` or the four-digit `YYMM` prefix
impl FromStr for Period {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidIdentifier(format!("invalid period: {:?}", s));

        if let Some((year, month)) = s.split_once('-') {
            if year.len() != 4 || month.len() != 2 {
                return Err(invalid());
            }
            let year = year.parse::<u16>().map_err(|_| invalid())?;
            let month = month.parse::<u8>().map_err(|_| invalid())?;
            return Period::new(year, month);
        }

        if s.len() == 4 && s.bytes().all(|b| b.is_ascii_digit()) {
            let yy = s[..2].parse::<u16>().map_err(|_| invalid())?;
            let mm = s[2..].parse::<u8>().map_err(|_| invalid())?;
            return Period::new(2000 + yy, mm);
        }

        Err(invalid())
    }
}

impl Serialize for Period {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Key addressing one crawled paper: period plus five-digit sequence number
///
/// Canonical form is `PPPP.NNNNN`; the on-disk key is `PPPP-NNNNN`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Identifier {
    period: Period,
    sequence: u32,
}

impl Identifier {
    /// Create an identifier, validating the sequence width
    pub fn new(period: Period, sequence: u32) -> Result<Self> {
        if sequence == 0 || sequence > MAX_SEQUENCE {
            return Err(Error::InvalidIdentifier(format!(
                "sequence {} out of range for {}",
                sequence,
                period.prefix()
            )));
        }
        Ok(Self { period, sequence })
    }

    /// The period bucket
    pub fn period(&self) -> Period {
        self.period
    }

    /// The sequence number within the period
    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    /// Directory-safe key (`PPPP-NNNNN`)
    pub fn storage_key(&self) -> String {
        format!("{}-{:05}", self.period.prefix(), self.sequence)
    }

    /// Identifier of a specific sub-version (`PPPP.NNNNNvN`)
    pub fn versioned(&self, version: u32) -> String {
        format!("{}v{}", self, version)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:05}", self.period.prefix(), self.sequence)
    }
}

/// Parses `PPPP.NNNNN` or `PPPP-NNNNN`, ignoring a trailing `vN` version suffix
impl FromStr for Identifier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidIdentifier(format!("invalid identifier: {:?}", s));

        let (prefix, rest) = s.split_once(|c: char| c == '.' || c == '-').ok_or_else(invalid)?;
        let digits = match rest.find('v') {
            Some(pos) => {
                let version = &rest[pos + 1..];
                if version.is_empty() || !version.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(invalid());
                }
                &rest[..pos]
            }
            None => rest,
        };

        if digits.len() != 5 || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }

        let period = prefix.parse::<Period>()?;
        let sequence = digits.parse::<u32>().map_err(|_| invalid())?;
        Identifier::new(period, sequence)
    }
}

impl Serialize for Identifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// The identifier range of one crawl run
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunRequest {
    /// Period of the first identifier
    pub start_period: Period,
    /// First sequence number (inclusive)
    pub start_seq: u32,
    /// Period of the last identifier
    pub end_period: Period,
    /// Last sequence number (inclusive)
    pub end_seq: u32,
}

impl RunRequest {
    /// Reject ranges that cannot produce valid identifiers
    pub fn validate(&self) -> Result<()> {
        for (name, seq) in [("start_seq", self.start_seq), ("end_seq", self.end_seq)] {
            if seq == 0 || seq > MAX_SEQUENCE {
                return Err(Error::config(
                    name,
                    format!("{} must be between 1 and {}, got {}", name, MAX_SEQUENCE, seq),
                ));
            }
        }
        if self.end_period < self.start_period {
            return Err(Error::config(
                "end_period",
                format!(
                    "end period {} precedes start period {}",
                    self.end_period, self.start_period
                ),
            ));
        }
        Ok(())
    }

    /// Whether the range stays inside one period (no discovery probe needed)
    pub fn is_single_period(&self) -> bool {
        self.start_period == self.end_period
    }
}

/// What happened to the reference step of one pipeline run
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceStatus {
    /// References were fetched and stored
    Found,
    /// The reference service had nothing for this paper
    Missing,
    /// The item fetch failed so the reference step never ran
    Skipped,
}

/// Result of the item fetcher for one identifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct FetchReport {
    /// Whether the paper exists and its metadata was stored
    pub success: bool,
    /// Bytes downloaded before extraction, when the fetcher tracks it
    pub size_before: Option<u64>,
    /// Number of source versions successfully extracted
    pub versions_extracted: u32,
}

impl FetchReport {
    /// Report for an identifier that does not exist upstream
    pub fn not_found() -> Self {
        Self::default()
    }
}

/// Mutually exclusive classification of one outcome
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeClass {
    /// Fetch and references both succeeded
    BothSuccess,
    /// Fetch succeeded, references did not
    OnlyFetchSuccess,
    /// The fetch itself failed
    CrawlerFailed,
}

/// Composite result of one pipeline run; immutable once built
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ItemOutcome {
    /// The identifier this outcome belongs to
    pub identifier: Identifier,
    /// Whether the item fetch succeeded
    pub fetch_success: bool,
    /// Reference step result
    pub reference: ReferenceStatus,
    /// Wall-clock time spent in the pipeline
    pub elapsed: Duration,
    /// Change in process resident memory across the run, in bytes
    pub memory_delta: i64,
    /// Process resident memory at the end of the run, in bytes
    pub memory_after: u64,
    /// Downloaded archive bytes reported by the fetcher
    pub size_before: Option<u64>,
    /// On-disk footprint of the item directory after the run
    pub size_after: Option<u64>,
    /// Number of stored references
    pub reference_count: usize,
}

impl ItemOutcome {
    /// Boolean view of the reference step; a skipped step reads as `false`
    pub fn reference_success(&self) -> bool {
        self.reference == ReferenceStatus::Found
    }

    /// Outcome class used by the statistics aggregator
    pub fn class(&self) -> OutcomeClass {
        match (self.fetch_success, self.reference_success()) {
            (true, true) => OutcomeClass::BothSuccess,
            (true, false) => OutcomeClass::OnlyFetchSuccess,
            (false, _) => OutcomeClass::CrawlerFailed,
        }
    }

    /// Short marker for status lines
    pub fn status_marker(&self) -> &'static str {
        match self.class() {
            OutcomeClass::BothSuccess => "✓✓",
            OutcomeClass::OnlyFetchSuccess => "✓X",
            OutcomeClass::CrawlerFailed => "XX",
        }
    }
}

/// Events emitted by the crawler
///
/// Consumers subscribe via [`crate::Crawler::subscribe`].
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Identifier range resolved, dispatch starting
    RunStarted {
        /// Number of identifiers to process
        total: usize,
        /// Concurrency limit in effect
        concurrency: usize,
    },

    /// One step of the discovery probe
    ProbeStep {
        /// Probed identifier
        identifier: Identifier,
        /// Whether it exists
        exists: bool,
        /// Consecutive misses so far
        consecutive_failures: u32,
    },

    /// A pipeline run finished with a classified outcome
    ItemCompleted {
        /// Completion counter (1-based)
        completed: usize,
        /// Total identifiers in the run
        total: usize,
        /// The outcome
        outcome: ItemOutcome,
    },

    /// A pipeline run failed unexpectedly
    ItemCrashed {
        /// Completion counter (1-based)
        completed: usize,
        /// Total identifiers in the run
        total: usize,
        /// The identifier whose run failed
        identifier: Identifier,
        /// Error description
        error: String,
    },

    /// All work finished
    RunFinished {
        /// Derived statistics for the run
        summary: StatsSummary,
        /// Wall-clock duration of the run
        elapsed: Duration,
    },
}
