//! In-memory provider backed by a fixed set of raw records
//!
//! Serves offline runs from a JSON dump and lets tests script provider
//! behaviour: per-identifier failure sequences, call counting, fixed or
//! random latency, and search hits as sparse as a live search endpoint.

use super::MetadataProvider;
use crate::errors::{ProviderError, Result};
use crate::record::{Identifier, LookupKey, RawRecord};
use async_trait::async_trait;
use rand::Rng;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Static record provider
#[derive(Default)]
pub struct StaticProvider {
    records: Vec<RawRecord>,
    by_id: HashMap<Identifier, usize>,
    failures: Mutex<HashMap<Identifier, VecDeque<ProviderError>>>,
    calls: Mutex<HashMap<LookupKey, u32>>,
    max_jitter: Option<Duration>,
    delay: Option<Duration>,
    lean_search: bool,
}

impl StaticProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a list of records
    pub fn from_records(records: impl IntoIterator<Item = RawRecord>) -> Self {
        records
            .into_iter()
            .fold(Self::new(), |provider, record| provider.with_record(record))
    }

    /// Load records from a JSON array file
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let records: Vec<RawRecord> = serde_json::from_str(&content)?;
        Ok(Self::from_records(records))
    }

    /// Register a record under every identifier it carries
    pub fn with_record(mut self, record: RawRecord) -> Self {
        let index = self.records.len();
        for id in record.identifiers() {
            self.by_id.entry(id).or_insert(index);
        }
        self.records.push(record);
        self
    }

    /// Fail the next lookups of `id` with the given errors, in order
    pub fn with_failures(self, id: Identifier, errors: Vec<ProviderError>) -> Self {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(id)
            .or_default()
            .extend(errors);
        self
    }

    /// Sleep a random duration up to `max` before answering
    pub fn with_jitter(mut self, max: Duration) -> Self {
        self.max_jitter = Some(max);
        self
    }

    /// Sleep exactly `delay` before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Return search hits without their cited-by list, as the OpenAlex
    /// search endpoint does; lookups still carry it
    pub fn with_lean_search(mut self) -> Self {
        self.lean_search = true;
        self
    }

    /// Number of provider calls made for a key
    pub fn calls(&self, key: &LookupKey) -> u32 {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .copied()
            .unwrap_or(0)
    }

    /// Total number of provider calls
    pub fn total_calls(&self) -> u32 {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .sum()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn count(&self, key: LookupKey) {
        *self
            .calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key)
            .or_insert(0) += 1;
    }

    async fn jitter(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(max) = self.max_jitter {
            let millis = rand::thread_rng().gen_range(0..=max.as_millis() as u64);
            tokio::time::sleep(Duration::from_millis(millis)).await;
        }
    }
}

#[async_trait]
impl MetadataProvider for StaticProvider {
    async fn lookup(&self, id: &Identifier) -> std::result::Result<RawRecord, ProviderError> {
        self.count(LookupKey::Id(id.clone()));
        self.jitter().await;

        let scripted = self
            .failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(id)
            .and_then(|queue| queue.pop_front());
        if let Some(err) = scripted {
            return Err(err);
        }

        self.by_id
            .get(id)
            .map(|&index| self.records[index].clone())
            .ok_or_else(|| ProviderError::NotFound { key: id.to_string() })
    }

    async fn search(
        &self,
        query: &str,
        limit: usize,
    ) -> std::result::Result<Vec<RawRecord>, ProviderError> {
        self.count(LookupKey::Query(query.to_string()));
        self.jitter().await;

        let needle = query.to_lowercase();
        Ok(self
            .records
            .iter()
            .filter(|r| {
                r.title
                    .as_deref()
                    .map(|t| t.to_lowercase().contains(&needle))
                    .unwrap_or(false)
            })
            .take(limit)
            .map(|r| RawRecord {
                cited_by: if self.lean_search { None } else { r.cited_by.clone() },
                ..r.clone()
            })
            .collect())
    }

    fn name(&self) -> &str {
        "static"
    }
}
