//! Error taxonomy for providers, the record store, and startup configuration.

use std::path::PathBuf;

use thiserror::Error;

/// Failure of one provider call. None of these abort a run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// Provider asked us to slow down; the same unit of work is retried after a cooldown.
    #[error("{provider} rate limited: {message}")]
    RateLimited {
        provider: &'static str,
        message: String,
    },
    /// Network, timeout, or server-side failure; the unit is skipped for this run.
    #[error("{provider} request failed: {message}")]
    Transient {
        provider: &'static str,
        message: String,
    },
    /// Response did not contain the expected structured payload.
    #[error("{provider} response rejected: {message}")]
    Parse {
        provider: &'static str,
        message: String,
    },
}

impl ProviderError {
    pub fn rate_limited(provider: &'static str, message: impl Into<String>) -> Self {
        Self::RateLimited {
            provider,
            message: message.into(),
        }
    }

    pub fn transient(provider: &'static str, message: impl Into<String>) -> Self {
        Self::Transient {
            provider,
            message: message.into(),
        }
    }

    pub fn parse(provider: &'static str, message: impl Into<String>) -> Self {
        Self::Parse {
            provider,
            message: message.into(),
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}

/// Record store failure.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("spot {0} does not exist in the record store")]
    NotFound(String),
    #[error("record store request failed: {0}")]
    Http(String),
    #[error("record store returned an unreadable row: {0}")]
    Decode(String),
}

/// Startup failure. Raised before any record is read; the process exits.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("missing required credential: set {0}")]
    MissingCredential(&'static str),
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("failed to open record store: {0}")]
    Store(#[from] StoreError),
}
