//! Configuration management for CiteGraph
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with CITEGRAPH__)
//! - Configuration files (config/default, config/{APP_ENV}, config/local)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Metadata provider configuration
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Fetch cache, pacing and retry configuration
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Traversal budgets and directions
    #[serde(default)]
    pub traversal: TraversalConfig,

    /// Identity resolution tuning
    #[serde(default)]
    pub resolver: ResolverConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderConfig {
    /// Works API base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Contact address sent to the provider's polite pool
    pub mailto: Option<String>,

    /// Optional API key
    pub api_key: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,

    /// Maximum citing works requested per lookup (0 disables backward lists)
    #[serde(default = "default_cited_by_limit")]
    pub cited_by_limit: usize,

    /// User agent header
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FetchConfig {
    /// Sustained provider requests per second
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,

    /// Burst capacity
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// Attempts for transient failures (including the first)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Attempts for quota failures (including the first)
    #[serde(default = "default_max_quota_attempts")]
    pub max_quota_attempts: u32,

    /// First backoff delay in milliseconds
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Backoff ceiling in milliseconds
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,

    /// Backoff growth factor
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Maximum memoized lookups
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: u64,

    /// Outstanding fetches per round
    #[serde(default = "default_fetch_concurrency")]
    pub concurrency: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TraversalConfig {
    /// Maximum discovery depth (seeds are depth 0)
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,

    /// Maximum number of committed nodes
    #[serde(default = "default_max_nodes")]
    pub max_nodes: usize,

    /// Expansion directions: "forward", "backward"
    #[serde(default = "default_directions")]
    pub directions: Vec<String>,

    /// Wall-clock budget in seconds (0 disables)
    #[serde(default)]
    pub max_duration_secs: u64,

    /// Search hits taken per free-text seed
    #[serde(default = "default_seed_search_limit")]
    pub seed_search_limit: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResolverConfig {
    /// Score at or above which two records are the same work
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,

    /// Weight of the title ratio against the author overlap
    #[serde(default = "default_title_weight")]
    pub title_weight: f64,

    /// Allowed publication year distance for fuzzy candidates
    #[serde(default = "default_year_tolerance")]
    pub year_tolerance: i32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default)]
    pub metrics_port: u16,

    /// Service name for logs
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

// Default value functions
fn default_base_url() -> String { "https://api.openalex.org".to_string() }
fn default_request_timeout() -> u64 { 30 }
fn default_cited_by_limit() -> usize { 200 }
fn default_user_agent() -> String { format!("citegraph/{}", crate::VERSION) }
fn default_requests_per_second() -> u32 { 8 }
fn default_burst() -> u32 { 8 }
fn default_max_attempts() -> u32 { 3 }
fn default_max_quota_attempts() -> u32 { 5 }
fn default_initial_backoff() -> u64 { 500 }
fn default_max_backoff() -> u64 { 30_000 }
fn default_backoff_multiplier() -> f64 { 2.0 }
fn default_cache_capacity() -> u64 { 100_000 }
fn default_fetch_concurrency() -> usize { 8 }
fn default_max_depth() -> u32 { 1 }
fn default_max_nodes() -> usize { 5_000 }
fn default_directions() -> Vec<String> { vec!["forward".to_string()] }
fn default_seed_search_limit() -> usize { 1 }
fn default_similarity_threshold() -> f64 { 0.92 }
fn default_title_weight() -> f64 { 0.8 }
fn default_year_tolerance() -> i32 { 1 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { false }
fn default_service_name() -> String { "citegraph".to_string() }

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))

            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))

            // Load local overrides
            .add_source(File::with_name("config/local").required(false))

            // Load from environment variables with CITEGRAPH__ prefix
            // e.g., CITEGRAPH__TRAVERSAL__MAX_DEPTH=2
            .add_source(
                Environment::with_prefix("CITEGRAPH")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("traversal.directions")
                    .try_parsing(true)
            )

            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific file, still honouring environment overrides
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("CITEGRAPH")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("traversal.directions")
                    .try_parsing(true)
            )
            .build()?;

        config.try_deserialize()
    }

    /// Get provider request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.provider.timeout_secs)
    }

    /// Get the traversal wall-clock budget, if any
    pub fn max_duration(&self) -> Option<Duration> {
        match self.traversal.max_duration_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            mailto: None,
            api_key: None,
            timeout_secs: default_request_timeout(),
            cited_by_limit: default_cited_by_limit(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_requests_per_second(),
            burst: default_burst(),
            max_attempts: default_max_attempts(),
            max_quota_attempts: default_max_quota_attempts(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
            backoff_multiplier: default_backoff_multiplier(),
            cache_capacity: default_cache_capacity(),
            concurrency: default_fetch_concurrency(),
        }
    }
}

impl Default for TraversalConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            max_nodes: default_max_nodes(),
            directions: default_directions(),
            max_duration_secs: 0,
            seed_search_limit: default_seed_search_limit(),
        }
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            title_weight: default_title_weight(),
            year_tolerance: default_year_tolerance(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: 0,
            service_name: default_service_name(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            provider: ProviderConfig::default(),
            fetch: FetchConfig::default(),
            traversal: TraversalConfig::default(),
            resolver: ResolverConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.traversal.max_depth, 1);
        assert_eq!(config.traversal.directions, vec!["forward".to_string()]);
        assert_eq!(config.provider.base_url, "https://api.openalex.org");
        assert!(config.max_duration().is_none());
    }

    #[test]
    fn test_from_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("citegraph.toml");
        std::fs::write(
            &path,
            "[traversal]\nmax_depth = 3\nmax_nodes = 50\n\n[resolver]\nsimilarity_threshold = 0.95\n",
        )
        .unwrap();

        let config = AppConfig::from_file(path.to_str().unwrap()).unwrap();
        assert_eq!(config.traversal.max_depth, 3);
        assert_eq!(config.traversal.max_nodes, 50);
        assert_eq!(config.resolver.similarity_threshold, 0.95);
        assert_eq!(config.fetch.max_attempts, 3);
    }
}
