//! Error types for CiteGraph
//!
//! Provides the error taxonomy shared by every crate:
//! - Distinct error types for configuration, provider, fetch and
//!   normalization failures
//! - Stable machine-readable error codes
//! - A `Result` alias over [`AppError`]

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Configuration errors (1xxx)
    ConfigurationError,
    InvalidOption,
    NoValidSeeds,

    // Record errors (2xxx)
    MalformedRecord,
    UnsupportedRecordType,
    InvalidIdentifier,

    // Provider errors (3xxx)
    NotFound,
    QuotaExceeded,
    TransientUpstream,
    BadResponse,

    // I/O and encoding errors (4xxx)
    IoError,
    SerializationError,
    HttpClientError,

    // Internal errors (9xxx)
    InternalError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            // Configuration (1xxx)
            ErrorCode::ConfigurationError => 1001,
            ErrorCode::InvalidOption => 1002,
            ErrorCode::NoValidSeeds => 1003,

            // Records (2xxx)
            ErrorCode::MalformedRecord => 2001,
            ErrorCode::UnsupportedRecordType => 2002,
            ErrorCode::InvalidIdentifier => 2003,

            // Provider (3xxx)
            ErrorCode::NotFound => 3001,
            ErrorCode::QuotaExceeded => 3002,
            ErrorCode::TransientUpstream => 3003,
            ErrorCode::BadResponse => 3004,

            // I/O (4xxx)
            ErrorCode::IoError => 4001,
            ErrorCode::SerializationError => 4002,
            ErrorCode::HttpClientError => 4003,

            ErrorCode::InternalError => 9001,
        }
    }
}

/// Errors reported by a metadata provider for a single request
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("Record not found: {key}")]
    NotFound { key: String },

    #[error("Provider quota exhausted")]
    QuotaExceeded { retry_after: Option<Duration> },

    #[error("Transient provider error: {message}")]
    Transient { message: String },

    #[error("Malformed provider response: {message}")]
    BadResponse { message: String },
}

impl ProviderError {
    /// Whether retrying the same request can succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::QuotaExceeded { .. } | ProviderError::Transient { .. }
        )
    }
}

/// Terminal fetch failure kinds, after retries are exhausted
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FetchFailureKind {
    Transient,
    QuotaExceeded,
    BadResponse,
    NotFound,
}

/// A lookup that could not produce a record
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Fetch failed ({kind:?}) after {attempts} attempt(s): {message}")]
pub struct FetchError {
    pub kind: FetchFailureKind,
    pub attempts: u32,
    pub message: String,
}

impl FetchError {
    /// Build the terminal failure for a provider error
    pub fn from_provider(err: &ProviderError, attempts: u32) -> Self {
        let kind = match err {
            ProviderError::NotFound { .. } => FetchFailureKind::NotFound,
            ProviderError::QuotaExceeded { .. } => FetchFailureKind::QuotaExceeded,
            ProviderError::Transient { .. } => FetchFailureKind::Transient,
            ProviderError::BadResponse { .. } => FetchFailureKind::BadResponse,
        };
        Self {
            kind,
            attempts,
            message: err.to_string(),
        }
    }
}

/// Reasons a raw record is rejected by normalization
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("Malformed record: no identifier and no title")]
    MalformedRecord,

    #[error("Unsupported record type: {record_type}")]
    UnsupportedRecordType { record_type: String },
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Invalid option {field}: {message}")]
    InvalidOption { field: String, message: String },

    #[error("No valid seeds: {message}")]
    NoValidSeeds { message: String },

    #[error("Invalid identifier: {value}")]
    InvalidIdentifier { value: String },

    // Component errors
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Normalize(#[from] NormalizeError),

    // I/O and encoding
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    // Internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },

    // Generic
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::InvalidOption { .. } => ErrorCode::InvalidOption,
            AppError::NoValidSeeds { .. } => ErrorCode::NoValidSeeds,
            AppError::InvalidIdentifier { .. } => ErrorCode::InvalidIdentifier,
            AppError::Provider(err) => provider_code(err),
            AppError::Fetch(err) => match err.kind {
                FetchFailureKind::Transient => ErrorCode::TransientUpstream,
                FetchFailureKind::QuotaExceeded => ErrorCode::QuotaExceeded,
                FetchFailureKind::BadResponse => ErrorCode::BadResponse,
                FetchFailureKind::NotFound => ErrorCode::NotFound,
            },
            AppError::Normalize(NormalizeError::MalformedRecord) => ErrorCode::MalformedRecord,
            AppError::Normalize(NormalizeError::UnsupportedRecordType { .. }) => {
                ErrorCode::UnsupportedRecordType
            }
            AppError::Io(_) => ErrorCode::IoError,
            AppError::Serialization(_) => ErrorCode::SerializationError,
            AppError::HttpClient(_) => ErrorCode::HttpClientError,
            AppError::Internal { .. } | AppError::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Configuration problems fail a whole invocation; everything else is
    /// recorded per entry and the batch continues.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.code(),
            ErrorCode::ConfigurationError | ErrorCode::InvalidOption | ErrorCode::NoValidSeeds
        )
    }
}

fn provider_code(err: &ProviderError) -> ErrorCode {
    match err {
        ProviderError::NotFound { .. } => ErrorCode::NotFound,
        ProviderError::QuotaExceeded { .. } => ErrorCode::QuotaExceeded,
        ProviderError::Transient { .. } => ErrorCode::TransientUpstream,
        ProviderError::BadResponse { .. } => ErrorCode::BadResponse,
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration {
            message: err.to_string(),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        let field = err
            .field_errors()
            .keys()
            .next()
            .map(|k| k.to_string())
            .unwrap_or_else(|| "options".to_string());
        AppError::InvalidOption {
            field,
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        let err = AppError::NoValidSeeds {
            message: "empty".into(),
        };
        assert_eq!(err.code(), ErrorCode::NoValidSeeds);
        assert_eq!(err.code().as_code(), 1003);
        assert!(err.is_fatal());
    }

    #[test]
    fn test_fetch_error_from_provider() {
        let err = ProviderError::QuotaExceeded { retry_after: None };
        let fetch = FetchError::from_provider(&err, 4);
        assert_eq!(fetch.kind, FetchFailureKind::QuotaExceeded);
        assert_eq!(fetch.attempts, 4);

        let app: AppError = fetch.into();
        assert_eq!(app.code(), ErrorCode::QuotaExceeded);
        assert!(!app.is_fatal());
    }

    #[test]
    fn test_retryable_kinds() {
        assert!(ProviderError::Transient { message: "503".into() }.is_retryable());
        assert!(ProviderError::QuotaExceeded { retry_after: None }.is_retryable());
        assert!(!ProviderError::BadResponse { message: "eof".into() }.is_retryable());
        assert!(!ProviderError::NotFound { key: "W1".into() }.is_retryable());
    }

    #[test]
    fn test_normalize_error_codes() {
        let err: AppError = NormalizeError::UnsupportedRecordType {
            record_type: "dataset".into(),
        }
        .into();
        assert_eq!(err.code(), ErrorCode::UnsupportedRecordType);
    }
}
