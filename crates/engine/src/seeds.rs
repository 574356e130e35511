//! Seed input parsing
//!
//! Seeds come from the command line or from a file. A plain file holds one
//! identifier or query per line (`#` starts a comment); a `.csv` export
//! must have a header with an identifier column (`DOI`, `EID`, `id`, ...).

use citegraph_common::errors::{AppError, Result};
use citegraph_common::record::{Identifier, LookupKey};
use std::path::Path;
use tracing::info;

/// Header names accepted as the identifier column, in preference order
const ID_COLUMNS: &[&str] = &["doi", "id", "identifier", "openalex", "eid", "pmid"];

/// Parse one seed: an identifier when recognisable, otherwise a query
pub fn parse_seed(raw: &str) -> Option<LookupKey> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(match Identifier::parse(trimmed) {
        Some(id) => LookupKey::Id(id),
        None => LookupKey::Query(trimmed.to_string()),
    })
}

pub fn parse_seeds<S: AsRef<str>>(raw: impl IntoIterator<Item = S>) -> Vec<LookupKey> {
    raw.into_iter().filter_map(|s| parse_seed(s.as_ref())).collect()
}

/// Read seeds from a file, keeping at most `limit` of them
pub fn read_seed_file(path: &Path, limit: Option<usize>) -> Result<Vec<LookupKey>> {
    let content = std::fs::read_to_string(path)?;
    let content = content.trim_start_matches('\u{feff}');

    let is_csv = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("csv"))
        .unwrap_or(false);

    let mut seeds = if is_csv {
        parse_csv(content)?
    } else {
        parse_lines(content)
    };
    if let Some(limit) = limit {
        seeds.truncate(limit);
    }

    info!(path = %path.display(), seeds = seeds.len(), "Read seed file");
    Ok(seeds)
}

fn parse_lines(content: &str) -> Vec<LookupKey> {
    content
        .lines()
        .map(|line| line.split_once('#').map(|(before, _)| before).unwrap_or(line))
        .filter_map(parse_seed)
        .collect()
}

fn parse_csv(content: &str) -> Result<Vec<LookupKey>> {
    let mut lines = content.lines().filter(|l| !l.trim().is_empty());
    let header = lines.next().map(split_csv_line).unwrap_or_default();
    let lowered: Vec<String> = header.iter().map(|h| h.trim().to_lowercase()).collect();

    let (column, scheme) = ID_COLUMNS
        .iter()
        .find_map(|name| lowered.iter().position(|h| h == name).map(|i| (i, *name)))
        .ok_or_else(|| AppError::InvalidOption {
            field: "seed_file".to_string(),
            message: format!("no identifier column in header (expected one of {})", ID_COLUMNS.join(", ")),
        })?;

    let mut seeds = Vec::new();
    for line in lines {
        let fields = split_csv_line(line);
        let Some(value) = fields.get(column).map(|v| v.trim()).filter(|v| !v.is_empty()) else {
            continue;
        };
        let parsed = match scheme {
            "eid" | "pmid" => Identifier::alternate(scheme, value),
            _ => Identifier::parse(value),
        };
        match parsed {
            Some(id) => seeds.push(LookupKey::Id(id)),
            None => {
                return Err(AppError::InvalidIdentifier {
                    value: value.to_string(),
                })
            }
        }
    }
    Ok(seeds)
}

/// Split one CSV line, honouring double-quoted fields
fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut field)),
            _ => field.push(c),
        }
    }
    fields.push(field);
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_seed_kinds() {
        assert!(matches!(parse_seed("10.1038/nature14539"), Some(LookupKey::Id(_))));
        assert!(matches!(parse_seed("W2741809807"), Some(LookupKey::Id(_))));
        assert_eq!(
            parse_seed("  deep learning review "),
            Some(LookupKey::Query("deep learning review".into()))
        );
        assert_eq!(parse_seed("   "), None);
    }

    #[test]
    fn test_line_file_with_comments() {
        let mut file = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
        writeln!(file, "# seeds").unwrap();
        writeln!(file, "10.1038/nature14539  # LeCun 2015").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "graph attention networks").unwrap();

        let seeds = read_seed_file(file.path(), None).unwrap();
        assert_eq!(seeds.len(), 2);
        assert!(matches!(seeds[1], LookupKey::Query(_)));
    }

    #[test]
    fn test_csv_export() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        write!(file, "\u{feff}").unwrap();
        writeln!(file, "Authors,Title,EID").unwrap();
        writeln!(file, "\"Doe, J.\",\"A title, with comma\",2-s2.0-1").unwrap();
        writeln!(file, "\"Roe, R.\",Other,2-s2.0-2").unwrap();
        writeln!(file, "\"Poe, P.\",Third,2-s2.0-3").unwrap();

        let seeds = read_seed_file(file.path(), Some(2)).unwrap();
        assert_eq!(
            seeds,
            vec![
                LookupKey::Id(Identifier::alternate("eid", "2-s2.0-1").unwrap()),
                LookupKey::Id(Identifier::alternate("eid", "2-s2.0-2").unwrap()),
            ]
        );
    }

    #[test]
    fn test_csv_without_id_column() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "Authors,Title").unwrap();
        assert!(matches!(
            read_seed_file(file.path(), None),
            Err(AppError::InvalidOption { .. })
        ));
    }

    #[test]
    fn test_split_quoted() {
        assert_eq!(
            split_csv_line(r#"a,"b, c","say ""hi""""#),
            vec!["a".to_string(), "b, c".to_string(), "say \"hi\"".to_string()]
        );
    }
}
