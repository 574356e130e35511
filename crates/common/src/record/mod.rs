//! Bibliographic record model
//!
//! Provides:
//! - Typed, canonical publication identifiers
//! - The raw record shape returned by metadata providers
//! - The normalized publication record stored on graph nodes
//! - Lookup keys used by the fetch cache

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::OnceLock;

const DOI_PREFIXES: &[&str] = &[
    "https://doi.org/",
    "http://doi.org/",
    "https://dx.doi.org/",
    "http://dx.doi.org/",
    "doi.org/",
    "doi:",
];

const PROVIDER_PREFIXES: &[&str] = &[
    "https://openalex.org/",
    "http://openalex.org/",
    "openalex:",
];

/// Alternate identifier schemes recognised in `scheme:value` form
pub const ALTERNATE_SCHEMES: &[&str] = &["pmid", "pmcid", "eid", "mag", "arxiv", "scopus"];

fn doi_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^10\.\d{4,9}/\S+$").expect("static DOI pattern"))
}

fn provider_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[WwAaSsIi]\d+$").expect("static provider id pattern"))
}

/// A typed publication identifier.
///
/// Values are stored in canonical form so that two spellings of the same
/// identifier compare equal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Identifier {
    /// Persistent document identifier (lower-cased, prefix-free)
    Doi { value: String },
    /// Provider-internal identifier (e.g. OpenAlex work id)
    Provider { value: String },
    /// Any other scheme (pmid, eid, ...)
    Alternate { scheme: String, value: String },
}

impl Identifier {
    /// Build a DOI identifier, rejecting values that are not DOIs
    pub fn doi(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        let lowered = trimmed.to_lowercase();
        let stripped = DOI_PREFIXES
            .iter()
            .find_map(|p| lowered.strip_prefix(p))
            .unwrap_or(&lowered)
            .trim();
        doi_pattern().is_match(stripped).then(|| Identifier::Doi {
            value: stripped.to_string(),
        })
    }

    /// Build a provider identifier from a bare id or provider URL
    pub fn provider(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        let stripped = PROVIDER_PREFIXES
            .iter()
            .find_map(|p| trimmed.strip_prefix(p))
            .unwrap_or(trimmed);
        let stripped = stripped.rsplit('/').next().unwrap_or(stripped);
        provider_pattern().is_match(stripped).then(|| Identifier::Provider {
            value: stripped.to_uppercase(),
        })
    }

    /// Build an alternate identifier
    pub fn alternate(scheme: &str, value: &str) -> Option<Self> {
        let scheme = scheme.trim().to_lowercase();
        let value = value.trim();
        if scheme.is_empty() || value.is_empty() {
            return None;
        }
        Some(Identifier::Alternate {
            scheme,
            value: value.to_string(),
        })
    }

    /// Parse a free-form identifier string.
    ///
    /// Returns `None` for anything that is not recognisably an identifier,
    /// in which case the caller treats it as a free-text query.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        if let Some(doi) = Self::doi(trimmed) {
            return Some(doi);
        }
        if let Some(id) = Self::provider(trimmed) {
            return Some(id);
        }
        let (scheme, value) = trimmed.split_once(':')?;
        let scheme_lower = scheme.trim().to_lowercase();
        if ALTERNATE_SCHEMES.contains(&scheme_lower.as_str()) {
            return Self::alternate(&scheme_lower, value);
        }
        None
    }

    /// Preference rank when choosing a canonical identifier (lower first)
    pub fn rank(&self) -> u8 {
        match self {
            Identifier::Doi { .. } => 0,
            Identifier::Provider { .. } => 1,
            Identifier::Alternate { .. } => 2,
        }
    }

    pub fn is_persistent(&self) -> bool {
        matches!(self, Identifier::Doi { .. })
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identifier::Doi { value } => write!(f, "doi:{}", value),
            Identifier::Provider { value } => write!(f, "{}", value),
            Identifier::Alternate { scheme, value } => write!(f, "{}:{}", scheme, value),
        }
    }
}

/// Key of a fetch: either a direct identifier lookup or a free-text search
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LookupKey {
    Id(Identifier),
    Query(String),
}

impl fmt::Display for LookupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LookupKey::Id(id) => write!(f, "{}", id),
            LookupKey::Query(q) => write!(f, "query:{}", q),
        }
    }
}

/// A record as returned by a metadata provider.
///
/// Every field is optional. A list that is `None` is unknown, which is
/// different from a known empty list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawRecord {
    pub record_type: Option<String>,
    pub doi: Option<String>,
    pub provider_id: Option<String>,
    pub alternate_ids: Vec<String>,
    pub title: Option<String>,
    pub authors: Option<Vec<String>>,
    pub year: Option<i32>,
    pub publication_date: Option<String>,
    pub venue: Option<String>,
    pub url: Option<String>,
    pub references: Option<Vec<String>>,
    pub cited_by: Option<Vec<String>>,
    pub cited_by_count: Option<u64>,
}

impl RawRecord {
    /// Identifiers this record can be looked up by, in declaration order
    pub fn identifiers(&self) -> Vec<Identifier> {
        let mut ids = Vec::new();
        if let Some(doi) = self.doi.as_deref().and_then(Identifier::doi) {
            ids.push(doi);
        }
        if let Some(id) = self.provider_id.as_deref().and_then(Identifier::provider) {
            ids.push(id);
        }
        ids.extend(self.alternate_ids.iter().filter_map(|a| Identifier::parse(a)));
        ids
    }
}

/// Normalized publication record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicationRecord {
    pub identifiers: BTreeSet<Identifier>,
    pub title: String,
    pub authors: Vec<String>,
    pub year: Option<i32>,
    pub venue: Option<String>,
    pub url: Option<String>,
    /// Works this record cites; `None` when the provider did not say
    pub references: Option<BTreeSet<Identifier>>,
    /// Works citing this record; `None` when the provider did not say
    pub cited_by: Option<BTreeSet<Identifier>>,
    pub cited_by_count: Option<u64>,
}

impl PublicationRecord {
    /// Preferred identifier: DOI, then provider id, then alternates
    pub fn canonical_id(&self) -> Option<&Identifier> {
        self.identifiers.iter().min_by_key(|id| id.rank())
    }

    /// Fill gaps on `self` from another record describing the same work
    pub fn absorb(&mut self, other: &PublicationRecord) {
        self.identifiers.extend(other.identifiers.iter().cloned());
        if self.title.is_empty() {
            self.title = other.title.clone();
        }
        if self.authors.is_empty() {
            self.authors = other.authors.clone();
        }
        if self.year.is_none() {
            self.year = other.year;
        }
        if self.venue.is_none() {
            self.venue = other.venue.clone();
        }
        if self.url.is_none() {
            self.url = other.url.clone();
        }
        merge_known(&mut self.references, &other.references);
        merge_known(&mut self.cited_by, &other.cited_by);
        self.cited_by_count = match (self.cited_by_count, other.cited_by_count) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
    }
}

fn merge_known(target: &mut Option<BTreeSet<Identifier>>, other: &Option<BTreeSet<Identifier>>) {
    match (target.as_mut(), other) {
        (Some(mine), Some(theirs)) => mine.extend(theirs.iter().cloned()),
        (None, Some(theirs)) => *target = Some(theirs.clone()),
        _ => {}
    }
}
