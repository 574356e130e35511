//! OpenAlex works API client

use super::MetadataProvider;
use crate::config::ProviderConfig;
use crate::errors::{ProviderError, Result};
use crate::record::{Identifier, RawRecord};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// OpenAlex HTTP provider
pub struct OpenAlexProvider {
    client: reqwest::Client,
    base_url: String,
    mailto: Option<String>,
    api_key: Option<String>,
    cited_by_limit: usize,
}

#[derive(Debug, Deserialize)]
struct WorkList {
    #[serde(default)]
    results: Vec<Work>,
}

#[derive(Debug, Deserialize)]
struct WorkStub {
    id: String,
}

#[derive(Debug, Deserialize)]
struct StubList {
    #[serde(default)]
    results: Vec<WorkStub>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Work {
    id: Option<String>,
    doi: Option<String>,
    title: Option<String>,
    display_name: Option<String>,
    publication_year: Option<i32>,
    publication_date: Option<String>,
    #[serde(rename = "type")]
    work_type: Option<String>,
    ids: Option<serde_json::Map<String, serde_json::Value>>,
    authorships: Option<Vec<Authorship>>,
    primary_location: Option<Location>,
    referenced_works: Option<Vec<String>>,
    cited_by_count: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Authorship {
    author: Option<AuthorRef>,
    raw_author_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AuthorRef {
    display_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Location {
    landing_page_url: Option<String>,
    source: Option<Source>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Source {
    display_name: Option<String>,
}

impl Work {
    fn into_raw(self) -> RawRecord {
        let alternate_ids = self
            .ids
            .map(|ids| {
                ids.into_iter()
                    .filter(|(scheme, _)| scheme != "openalex" && scheme != "doi")
                    .filter_map(|(scheme, value)| {
                        let value = value.as_str()?;
                        let tail = value.trim_end_matches('/').rsplit('/').next()?;
                        Some(format!("{}:{}", scheme, tail))
                    })
                    .collect()
            })
            .unwrap_or_default();

        let authors = self.authorships.map(|list| {
            list.into_iter()
                .filter_map(|a| {
                    a.author
                        .and_then(|r| r.display_name)
                        .or(a.raw_author_name)
                })
                .collect()
        });

        let (url, venue) = match self.primary_location {
            Some(loc) => (loc.landing_page_url, loc.source.and_then(|s| s.display_name)),
            None => (None, None),
        };

        RawRecord {
            record_type: self.work_type,
            doi: self.doi,
            provider_id: self.id,
            alternate_ids,
            title: self.title.or(self.display_name),
            authors,
            year: self.publication_year,
            publication_date: self.publication_date,
            venue,
            url,
            references: self.referenced_works,
            cited_by: None,
            cited_by_count: self.cited_by_count,
        }
    }
}

impl OpenAlexProvider {
    /// Create a new OpenAlex provider
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            mailto: config.mailto.clone(),
            api_key: config.api_key.clone(),
            cited_by_limit: config.cited_by_limit,
        })
    }

    /// Path segment OpenAlex accepts for an identifier
    fn work_path(id: &Identifier) -> std::result::Result<String, ProviderError> {
        match id {
            Identifier::Doi { value } => Ok(format!("doi:{}", value)),
            Identifier::Provider { value } => Ok(value.clone()),
            Identifier::Alternate { scheme, value }
                if matches!(scheme.as_str(), "pmid" | "pmcid" | "mag") =>
            {
                Ok(format!("{}:{}", scheme, value))
            }
            other => Err(ProviderError::NotFound {
                key: format!("{} (scheme not served by OpenAlex)", other),
            }),
        }
    }

    fn auth_params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(ref mailto) = self.mailto {
            params.push(("mailto", mailto.clone()));
        }
        if let Some(ref key) = self.api_key {
            params.push(("api_key", key.clone()));
        }
        params
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        params: &[(&str, String)],
        key: &str,
    ) -> std::result::Result<T, ProviderError> {
        let response = self
            .client
            .get(url)
            .query(&self.auth_params())
            .query(params)
            .send()
            .await
            .map_err(|e| ProviderError::Transient {
                message: format!("Request failed: {}", e),
            })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ProviderError::NotFound { key: key.to_string() });
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(ProviderError::QuotaExceeded { retry_after });
        }
        if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT {
            return Err(ProviderError::Transient {
                message: format!("API error {}", status),
            });
        }
        if !status.is_success() {
            return Err(ProviderError::BadResponse {
                message: format!("Unexpected status {}", status),
            });
        }

        let body = response.text().await.map_err(|e| ProviderError::Transient {
            message: format!("Failed to read body: {}", e),
        })?;

        serde_json::from_str(&body).map_err(|e| ProviderError::BadResponse {
            message: format!("Failed to parse response: {}", e),
        })
    }

    async fn citing_works(&self, work_id: &str) -> std::result::Result<Vec<String>, ProviderError> {
        let url = format!("{}/works", self.base_url);
        let params = [
            ("filter", format!("cites:{}", work_id)),
            ("per-page", self.cited_by_limit.min(200).to_string()),
            ("select", "id".to_string()),
        ];
        let list: StubList = self.get_json(&url, &params, work_id).await?;
        Ok(list.results.into_iter().map(|w| w.id).collect())
    }
}

#[async_trait]
impl MetadataProvider for OpenAlexProvider {
    async fn lookup(&self, id: &Identifier) -> std::result::Result<RawRecord, ProviderError> {
        let url = format!("{}/works/{}", self.base_url, Self::work_path(id)?);
        let key = id.to_string();
        let work: Work = self.get_json(&url, &[], &key).await?;

        let mut raw = work.into_raw();
        if raw.provider_id.is_none() && raw.doi.is_none() && raw.title.is_none() {
            return Err(ProviderError::BadResponse {
                message: format!("Work {} has no id, doi or title", key),
            });
        }

        if self.cited_by_limit > 0 {
            if let Some(work_id) = raw
                .provider_id
                .as_deref()
                .and_then(Identifier::provider)
            {
                let citing = self.citing_works(&work_id.to_string()).await?;
                debug!(work = %work_id, citing = citing.len(), "Fetched citing works");
                raw.cited_by = Some(citing);
            }
        }

        Ok(raw)
    }

    async fn search(
        &self,
        query: &str,
        limit: usize,
    ) -> std::result::Result<Vec<RawRecord>, ProviderError> {
        let url = format!("{}/works", self.base_url);
        let params = [
            ("search", query.to_string()),
            ("per-page", limit.clamp(1, 200).to_string()),
        ];
        let list: WorkList = self.get_json(&url, &params, query).await?;
        Ok(list.results.into_iter().map(Work::into_raw).collect())
    }

    fn name(&self) -> &str {
        "openalex"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_work_conversion() {
        let json = r#"{
            "id": "https://openalex.org/W2741809807",
            "doi": "https://doi.org/10.7717/peerj.4375",
            "title": "The state of OA",
            "publication_year": 2018,
            "type": "article",
            "ids": {
                "openalex": "https://openalex.org/W2741809807",
                "pmid": "https://pubmed.ncbi.nlm.nih.gov/29456894"
            },
            "authorships": [{"author": {"display_name": "Heather Piwowar"}}],
            "primary_location": {"source": {"display_name": "PeerJ"}},
            "referenced_works": ["https://openalex.org/W1"],
            "cited_by_count": 12
        }"#;
        let work: Work = serde_json::from_str(json).unwrap();
        let raw = work.into_raw();

        assert_eq!(raw.title.as_deref(), Some("The state of OA"));
        assert_eq!(raw.alternate_ids, vec!["pmid:29456894".to_string()]);
        assert_eq!(raw.authors, Some(vec!["Heather Piwowar".to_string()]));
        assert_eq!(raw.venue.as_deref(), Some("PeerJ"));
        assert_eq!(raw.references.as_ref().map(|r| r.len()), Some(1));
        assert!(raw.cited_by.is_none());
    }

    #[test]
    fn test_work_path() {
        let doi = Identifier::parse("10.7717/peerj.4375").unwrap();
        assert_eq!(OpenAlexProvider::work_path(&doi).unwrap(), "doi:10.7717/peerj.4375");

        let eid = Identifier::parse("eid:2-s2.0-123").unwrap();
        assert!(matches!(
            OpenAlexProvider::work_path(&eid),
            Err(ProviderError::NotFound { .. })
        ));
    }

    #[test]
    fn test_missing_lists_stay_unknown() {
        let work: Work = serde_json::from_str(r#"{"id": "W9", "title": "x"}"#).unwrap();
        let raw = work.into_raw();
        assert!(raw.references.is_none());
        assert!(raw.authors.is_none());
    }
}
