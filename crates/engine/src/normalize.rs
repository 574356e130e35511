//! Record normalization
//!
//! Maps a raw provider record to a [`PublicationRecord`], or rejects it.

use citegraph_common::errors::NormalizeError;
use citegraph_common::record::{Identifier, PublicationRecord, RawRecord};
use std::collections::BTreeSet;

/// Record types modelled as publications
pub const SUPPORTED_TYPES: &[&str] = &[
    "article",
    "journal-article",
    "review",
    "preprint",
    "posted-content",
    "book",
    "book-chapter",
    "proceedings-article",
    "conference-paper",
    "dissertation",
    "report",
    "letter",
    "editorial",
];

const MIN_YEAR: i32 = 1000;
const MAX_YEAR: i32 = 2200;

/// Normalize one raw record.
///
/// Missing year, authors and reference lists are all accepted. An absent
/// reference (or cited-by) list stays `None`; it is never turned into an
/// empty set.
pub fn normalize(raw: &RawRecord) -> Result<PublicationRecord, NormalizeError> {
    if let Some(record_type) = raw.record_type.as_deref() {
        let record_type = record_type.trim().to_lowercase();
        if !record_type.is_empty() && !SUPPORTED_TYPES.contains(&record_type.as_str()) {
            return Err(NormalizeError::UnsupportedRecordType { record_type });
        }
    }

    let identifiers: BTreeSet<Identifier> = raw.identifiers().into_iter().collect();
    let title = raw.title.as_deref().map(collapse_whitespace).unwrap_or_default();

    if identifiers.is_empty() && title.is_empty() {
        return Err(NormalizeError::MalformedRecord);
    }

    let authors = raw
        .authors
        .iter()
        .flatten()
        .map(|a| collapse_whitespace(a))
        .filter(|a| !a.is_empty())
        .collect();

    let year = raw
        .year
        .or_else(|| year_from_date(raw.publication_date.as_deref()))
        .filter(|y| (MIN_YEAR..=MAX_YEAR).contains(y));

    Ok(PublicationRecord {
        identifiers,
        title,
        authors,
        year,
        venue: non_empty(raw.venue.as_deref()),
        url: non_empty(raw.url.as_deref()),
        references: raw.references.as_ref().map(|ids| parse_ids(ids)),
        cited_by: raw.cited_by.as_ref().map(|ids| parse_ids(ids)),
        cited_by_count: raw.cited_by_count,
    })
}

fn parse_ids(raw: &[String]) -> BTreeSet<Identifier> {
    raw.iter().filter_map(|s| Identifier::parse(s)).collect()
}

/// Year from an ISO-like date (`2018-02-13`, `2018`)
fn year_from_date(date: Option<&str>) -> Option<i32> {
    date?.trim().split('-').next()?.parse().ok()
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn non_empty(s: Option<&str>) -> Option<String> {
    s.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw() -> RawRecord {
        RawRecord {
            record_type: Some("article".into()),
            provider_id: Some("https://openalex.org/W10".into()),
            doi: Some("https://doi.org/10.1234/ABC".into()),
            title: Some("  Deep   learning ".into()),
            authors: Some(vec!["LeCun, Y.".into(), " ".into()]),
            publication_date: Some("2015-05-27".into()),
            references: Some(vec!["W1".into(), "not an id".into()]),
            ..Default::default()
        }
    }

    #[test]
    fn test_normalizes_fields() {
        let record = normalize(&raw()).unwrap();
        assert_eq!(record.title, "Deep learning");
        assert_eq!(record.authors, vec!["LeCun, Y.".to_string()]);
        assert_eq!(record.year, Some(2015));
        assert_eq!(record.identifiers.len(), 2);
        assert_eq!(record.references.as_ref().map(|r| r.len()), Some(1));
        assert!(record.cited_by.is_none());
    }

    #[test]
    fn test_unknown_references_differ_from_none() {
        let mut unknown = raw();
        unknown.references = None;
        assert!(normalize(&unknown).unwrap().references.is_none());

        let mut empty = raw();
        empty.references = Some(vec![]);
        assert_eq!(normalize(&empty).unwrap().references, Some(BTreeSet::new()));
    }

    #[test]
    fn test_rejects_malformed() {
        let record = RawRecord {
            title: Some("   ".into()),
            ..Default::default()
        };
        assert_eq!(normalize(&record), Err(NormalizeError::MalformedRecord));
    }

    #[test]
    fn test_title_only_is_accepted() {
        let record = RawRecord {
            title: Some("An orphan preprint".into()),
            ..Default::default()
        };
        let normalized = normalize(&record).unwrap();
        assert!(normalized.identifiers.is_empty());
        assert!(normalized.year.is_none());
    }

    #[test]
    fn test_rejects_unsupported_type() {
        let mut record = raw();
        record.record_type = Some("Dataset".into());
        assert_eq!(
            normalize(&record),
            Err(NormalizeError::UnsupportedRecordType {
                record_type: "dataset".into()
            })
        );
    }
}
