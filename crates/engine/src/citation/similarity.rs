//! Record similarity for identity resolution
//!
//! Scores how likely two records describe the same work when they share
//! no identifier. Scores are in [0.0, 1.0].

use citegraph_common::record::PublicationRecord;
use std::collections::HashSet;

/// Pluggable similarity function
pub trait SimilarityScorer: Send + Sync {
    fn score(&self, a: &PublicationRecord, b: &PublicationRecord) -> f64;
}

/// Title edit-distance ratio blended with author surname overlap
#[derive(Debug, Clone)]
pub struct WeightedTitleAuthorScorer {
    title_weight: f64,
}

impl WeightedTitleAuthorScorer {
    pub fn new(title_weight: f64) -> Self {
        Self {
            title_weight: title_weight.clamp(0.0, 1.0),
        }
    }
}

impl Default for WeightedTitleAuthorScorer {
    fn default() -> Self {
        Self::new(0.8)
    }
}

impl SimilarityScorer for WeightedTitleAuthorScorer {
    fn score(&self, a: &PublicationRecord, b: &PublicationRecord) -> f64 {
        let title_a = normalize_title(&a.title);
        let title_b = normalize_title(&b.title);
        if title_a.is_empty() || title_b.is_empty() {
            return 0.0;
        }
        let title = edit_ratio(&title_a, &title_b);

        // Without authors on both sides the title has to carry the decision
        if a.authors.is_empty() || b.authors.is_empty() {
            return title;
        }

        let authors = jaccard_similarity(&surnames(&a.authors), &surnames(&b.authors));
        self.title_weight * title + (1.0 - self.title_weight) * authors
    }
}

/// Lower-case, drop punctuation, collapse whitespace
pub fn normalize_title(title: &str) -> String {
    title
        .chars()
        .map(|c| if c.is_alphanumeric() { c.to_ascii_lowercase() } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Surname of each author, lower-cased.
///
/// Handles both `Surname, Given` and `Given Surname` spellings.
pub fn surnames(authors: &[String]) -> HashSet<String> {
    authors
        .iter()
        .filter_map(|name| {
            let surname = match name.split_once(',') {
                Some((last, _)) => last,
                None => name.split_whitespace().last()?,
            };
            let surname: String = surname
                .chars()
                .filter(|c| c.is_alphanumeric())
                .flat_map(char::to_lowercase)
                .collect();
            (!surname.is_empty()).then_some(surname)
        })
        .collect()
}

/// Jaccard similarity coefficient
///
/// J(A, B) = |A ∩ B| / |A ∪ B|
pub fn jaccard_similarity(set_a: &HashSet<String>, set_b: &HashSet<String>) -> f64 {
    if set_a.is_empty() && set_b.is_empty() {
        return 1.0;
    }
    let intersection = set_a.intersection(set_b).count();
    let union = set_a.union(set_b).count();
    intersection as f64 / union as f64
}

/// Levenshtein distance over chars
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0; b_chars.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_chars.len()]
}

/// 1 - distance / longer length
pub fn edit_ratio(a: &str, b: &str) -> f64 {
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 1.0;
    }
    1.0 - levenshtein_distance(a, b) as f64 / longest as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn record(title: &str, authors: &[&str]) -> PublicationRecord {
        PublicationRecord {
            identifiers: BTreeSet::new(),
            title: title.to_string(),
            authors: authors.iter().map(|a| a.to_string()).collect(),
            year: Some(2020),
            venue: None,
            url: None,
            references: None,
            cited_by: None,
            cited_by_count: None,
        }
    }

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein_distance("kitten", "sitting"), 3);
        assert_eq!(levenshtein_distance("", "abc"), 3);
        assert_eq!(levenshtein_distance("same", "same"), 0);
    }

    #[test]
    fn test_normalize_title() {
        assert_eq!(
            normalize_title("Attention Is All You Need!"),
            normalize_title("attention is all   you need")
        );
    }

    #[test]
    fn test_surnames_both_spellings() {
        let names = surnames(&["Vaswani, Ashish".into(), "Noam Shazeer".into()]);
        assert!(names.contains("vaswani"));
        assert!(names.contains("shazeer"));
    }

    #[test]
    fn test_same_work_scores_high() {
        let scorer = WeightedTitleAuthorScorer::default();
        let a = record("Attention is all you need", &["Vaswani, A.", "Shazeer, N."]);
        let b = record("Attention Is All You Need.", &["Ashish Vaswani", "Noam Shazeer"]);
        assert!(scorer.score(&a, &b) > 0.99);
    }

    #[test]
    fn test_different_works_score_low() {
        let scorer = WeightedTitleAuthorScorer::default();
        let a = record("Attention is all you need", &["Vaswani, A."]);
        let b = record("Deep residual learning for image recognition", &["He, K."]);
        assert!(scorer.score(&a, &b) < 0.5);
    }

    #[test]
    fn test_title_only_when_authors_missing() {
        let scorer = WeightedTitleAuthorScorer::default();
        let a = record("Graph attention networks", &[]);
        let b = record("Graph Attention Networks", &["Velickovic, P."]);
        assert_eq!(scorer.score(&a, &b), 1.0);
        assert_eq!(scorer.score(&a, &record("", &[])), 0.0);
    }
}
