//! CiteGraph Common Library
//!
//! Shared code for the citation graph engine including:
//! - Bibliographic record and identifier model
//! - Metadata provider abstraction (OpenAlex, static records)
//! - Fetch cache with rate governance and retry
//! - Error types and handling
//! - Configuration management
//! - Metrics and observability

pub mod cache;
pub mod config;
pub mod errors;
pub mod metrics;
pub mod provider;
pub mod record;

// Re-export commonly used types
pub use cache::{FetchCache, FetchCacheConfig, FetchStats};
pub use config::AppConfig;
pub use errors::{AppError, Result};
pub use provider::MetadataProvider;
pub use record::{Identifier, LookupKey, PublicationRecord, RawRecord};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
