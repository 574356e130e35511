//! Metadata provider abstraction
//!
//! Provides a unified interface over bibliographic metadata sources:
//! - OpenAlex works API (HTTP)
//! - In-memory static records (tests and offline runs)

mod memory;
mod openalex;

pub use memory::StaticProvider;
pub use openalex::OpenAlexProvider;

use crate::config::ProviderConfig;
use crate::errors::{ProviderError, Result};
use crate::record::{Identifier, RawRecord};
use async_trait::async_trait;
use std::sync::Arc;

/// Trait for bibliographic metadata lookups
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Fetch the record for one identifier
    async fn lookup(&self, id: &Identifier) -> std::result::Result<RawRecord, ProviderError>;

    /// Free-text search, used to resolve seeds given as queries
    async fn search(
        &self,
        query: &str,
        limit: usize,
    ) -> std::result::Result<Vec<RawRecord>, ProviderError>;

    /// Provider name for logs and metrics
    fn name(&self) -> &str;
}

/// Create the HTTP provider from configuration
pub fn create_provider(config: &ProviderConfig) -> Result<Arc<dyn MetadataProvider>> {
    Ok(Arc::new(OpenAlexProvider::new(config)?))
}
