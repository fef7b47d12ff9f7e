//! arXiv Atom API entries
//!
//! The export API answers every query with an Atom feed. A missing paper
//! yields an empty feed, a malformed id yields one entry whose id points at
//! `api/errors`.

use crate::error::{Error, Result};
use crate::types::Identifier;
use atom_syndication::{Entry, Feed};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Namespace prefix of arXiv-specific Atom elements
const ARXIV_NS_PREFIX: &str = "arxiv";

/// Stored `metadata.json` content
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaperMetadata {
    /// Storage-key form, e.g. `2305-04793`
    pub arxiv_id: String,
    /// Title with whitespace collapsed
    pub paper_title: String,
    /// Author names in feed order
    pub authors: Vec<String>,
    /// First version date, `YYYY-MM-DD`
    pub submission_date: Option<String>,
    /// Update dates of versions 2..=latest (`None` where unavailable)
    pub revised_dates: Vec<Option<String>>,
    /// Journal reference, if the authors supplied one
    pub publication_venue: Option<String>,
    /// Highest version number
    pub latest_version: u32,
    /// Category terms, primary first
    pub categories: Vec<String>,
    /// Abstract on one line
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    /// Link to the PDF rendition
    pub pdf_url: Option<String>,
}

/// Parses feeds and pulls the version number out of entry ids
#[derive(Clone, Debug)]
pub(crate) struct FeedParser {
    version_suffix: Regex,
}

impl FeedParser {
    pub(crate) fn new() -> Result<Self> {
        let version_suffix = Regex::new(r"v(\d+)$")
            .map_err(|e| Error::Other(format!("invalid version pattern: {}", e)))?;
        Ok(Self { version_suffix })
    }

    /// First real entry of a feed body, `None` for an empty or error feed
    pub(crate) fn first_entry(&self, body: &str) -> Result<Option<Entry>> {
        let feed = Feed::read_from(body.as_bytes()).map_err(|e| Error::Feed(e.to_string()))?;
        Ok(feed.entries().iter().find(|e| !is_error_entry(e)).cloned())
    }

    /// Version number from an entry id like `http://arxiv.org/abs/2305.04793v2`
    pub(crate) fn version_of(&self, entry: &Entry) -> Option<u32> {
        self.version_suffix
            .captures(entry.id())
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse().ok())
    }

    /// Build metadata from the latest-version entry; revised dates are filled in later
    pub(crate) fn metadata(&self, id: &Identifier, entry: &Entry) -> PaperMetadata {
        PaperMetadata {
            arxiv_id: id.storage_key(),
            paper_title: collapse_whitespace(entry.title().as_str()),
            authors: entry.authors().iter().map(|a| a.name().to_string()).collect(),
            submission_date: entry.published().map(|d| d.format("%Y-%m-%d").to_string()),
            revised_dates: Vec::new(),
            publication_venue: journal_ref(entry),
            latest_version: self.version_of(entry).unwrap_or(1),
            categories: entry
                .categories()
                .iter()
                .map(|c| c.term().to_string())
                .collect(),
            abstract_text: entry
                .summary()
                .map(|s| s.as_str().replace('\n', " ").trim().to_string())
                .unwrap_or_default(),
            pdf_url: entry
                .links()
                .iter()
                .find(|l| l.title() == Some("pdf"))
                .map(|l| l.href().to_string()),
        }
    }
}

/// Update date of an entry, `YYYY-MM-DD`
pub(crate) fn updated_date(entry: &Entry) -> String {
    entry.updated().format("%Y-%m-%d").to_string()
}

fn is_error_entry(entry: &Entry) -> bool {
    entry.id().contains("api/errors")
}

fn journal_ref(entry: &Entry) -> Option<String> {
    entry
        .extensions()
        .get(ARXIV_NS_PREFIX)
        .and_then(|elements| elements.get("journal_ref"))
        .and_then(|values| values.first())
        .and_then(|ext| ext.value())
        .map(collapse_whitespace)
        .filter(|s| !s.is_empty())
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Minimal arXiv API answer for one paper
    pub(crate) fn entry_feed(versioned_id: &str, updated: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom" xmlns:arxiv="http://arxiv.org/schemas/atom">
  <id>http://arxiv.org/api/query</id>
  <title>ArXiv Query</title>
  <updated>2024-01-01T00:00:00-05:00</updated>
  <entry>
    <id>http://arxiv.org/abs/{versioned_id}</id>
    <updated>{updated}</updated>
    <published>2023-05-08T17:59:01Z</published>
    <title>Scaling Laws
      for Crawlers</title>
    <summary>  We study crawling.
More text here.
</summary>
    <author><name>Ada Lovelace</name></author>
    <author><name>Alan Turing</name></author>
    <arxiv:journal_ref>J. Crawl. 12 (2024)</arxiv:journal_ref>
    <link href="http://arxiv.org/abs/{versioned_id}" rel="alternate" type="text/html"/>
    <link title="pdf" href="http://arxiv.org/pdf/{versioned_id}" rel="related" type="application/pdf"/>
    <category term="cs.CL" scheme="http://arxiv.org/schemas/atom"/>
    <category term="cs.LG" scheme="http://arxiv.org/schemas/atom"/>
  </entry>
</feed>"#
        )
    }

    pub(crate) const EMPTY_FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <id>http://arxiv.org/api/query</id>
  <title>ArXiv Query</title>
  <updated>2024-01-01T00:00:00-05:00</updated>
</feed>"#;

    pub(crate) const ERROR_FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <id>http://arxiv.org/api/query</id>
  <title>ArXiv Query</title>
  <updated>2024-01-01T00:00:00-05:00</updated>
  <entry>
    <id>http://arxiv.org/api/errors#incorrect_id_format_for_2305.0</id>
    <title>Error</title>
    <summary>incorrect id format for 2305.0</summary>
    <updated>2024-01-01T00:00:00-05:00</updated>
  </entry>
</feed>"#;

    fn id() -> Identifier {
        "2305.04793".parse().unwrap()
    }

    #[test]
    fn metadata_from_entry() {
        let parser = FeedParser::new().unwrap();
        let entry = parser
            .first_entry(&entry_feed("2305.04793v3", "2023-06-01T10:00:00Z"))
            .unwrap()
            .unwrap();

        let meta = parser.metadata(&id(), &entry);

        assert_eq!(meta.arxiv_id, "2305-04793");
        assert_eq!(meta.paper_title, "Scaling Laws for Crawlers");
        assert_eq!(meta.authors, vec!["Ada Lovelace", "Alan Turing"]);
        assert_eq!(meta.submission_date.as_deref(), Some("2023-05-08"));
        assert_eq!(meta.publication_venue.as_deref(), Some("J. Crawl. 12 (2024)"));
        assert_eq!(meta.latest_version, 3);
        assert_eq!(meta.categories, vec!["cs.CL", "cs.LG"]);
        assert_eq!(meta.abstract_text, "We study crawling. More text here.");
        assert_eq!(
            meta.pdf_url.as_deref(),
            Some("http://arxiv.org/pdf/2305.04793v3")
        );
        assert_eq!(updated_date(&entry), "2023-06-01");
    }

    #[test]
    fn empty_and_error_feeds_have_no_entry() {
        let parser = FeedParser::new().unwrap();
        assert!(parser.first_entry(EMPTY_FEED).unwrap().is_none());
        assert!(parser.first_entry(ERROR_FEED).unwrap().is_none());
    }

    #[test]
    fn paper_titled_error_is_still_a_paper() {
        let parser = FeedParser::new().unwrap();
        let body = entry_feed("2305.04793v1", "2023-05-08T17:59:01Z").replace(
            "<title>Scaling Laws\n      for Crawlers</title>",
            "<title>Error</title>",
        );
        let entry = parser.first_entry(&body).unwrap().unwrap();
        assert_eq!(parser.metadata(&id(), &entry).paper_title, "Error");
    }

    #[test]
    fn garbage_is_a_feed_error() {
        let parser = FeedParser::new().unwrap();
        let err = parser.first_entry("<html>nope</html>").unwrap_err();
        assert!(matches!(err, Error::Feed(_)));
    }

    #[test]
    fn metadata_serializes_abstract_key() {
        let parser = FeedParser::new().unwrap();
        let entry = parser
            .first_entry(&entry_feed("2305.04793v1", "2023-05-08T17:59:01Z"))
            .unwrap()
            .unwrap();
        let json = serde_json::to_value(parser.metadata(&id(), &entry)).unwrap();
        assert!(json.get("abstract").is_some());
        assert!(json.get("abstract_text").is_none());
    }
}
