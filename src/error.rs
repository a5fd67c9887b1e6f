//! Error types for newsflow.
//!
//! Fetch-side variants carry the provider tag so the poll loop can
//! route failures: `is_retryable` failures go through the retry queue,
//! malformed payloads are dropped and logged, never retried.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Transport-level fetch failure (connect, timeout, TLS).
    #[error("network error from {provider}: {source}")]
    Network {
        provider: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// Provider-reported throttling (HTTP 429 or an explicit quota code).
    #[error("{provider} rate limited: {message}")]
    RateLimited {
        provider: &'static str,
        message: String,
    },

    /// Provider-reported API error other than throttling (bad key, bad
    /// request). Retried on the same path as network failures.
    #[error("{provider} API error {code}: {message}")]
    Provider {
        provider: &'static str,
        code: String,
        message: String,
    },

    /// Payload that could not be parsed. Waiting will not fix it, so the
    /// scheduler drops the attempt instead of queueing a retry.
    #[error("malformed response from {provider}: {message}")]
    MalformedResponse {
        provider: &'static str,
        message: String,
    },

    /// Append to the topic log failed.
    #[error("publish to topic '{topic}' failed: {source}")]
    Publish {
        topic: String,
        #[source]
        source: sqlx::Error,
    },

    /// Persisting a scheduling-state document failed. The previous
    /// on-disk snapshot is still intact.
    #[error("state write failed for {}: {source}", path.display())]
    StateWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Another live poller holds the state directory.
    #[error("state directory {} locked by pid {pid}", path.display())]
    StateLocked { path: PathBuf, pid: u32 },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a malformed-response error.
    pub fn malformed(provider: &'static str, message: impl Into<String>) -> Self {
        Self::MalformedResponse {
            provider,
            message: message.into(),
        }
    }

    /// Whether this failure should be rescheduled through the retry
    /// queue. Malformed payloads and local state errors are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Network { .. }
                | Error::RateLimited { .. }
                | Error::Provider { .. }
                | Error::Publish { .. }
                | Error::Db(_)
        )
    }
}
