//! Environment-driven configuration.
//!
//! Loaded once at startup; missing or unparsable required vars fail
//! fast. Credentials are wrapped in secrecy::SecretString so they
//! never land in logs. A provider is enabled iff its API key is set.

pub mod secrets;

use std::path::PathBuf;

use secrecy::SecretString;

use crate::error::{Error, Result};

#[derive(Debug)]
pub struct Config {
    pub database_url: SecretString,

    /// Per-provider API keys. A missing key disables that provider's
    /// poller; it is not an error.
    pub newsapi_api_key: Option<SecretString>,
    pub gnews_api_key: Option<SecretString>,
    pub mediastack_api_key: Option<SecretString>,

    /// Search terms, one topic-log queue each.
    pub topics: Vec<String>,

    /// Root for per-provider scheduling-state directories.
    pub state_dir: PathBuf,

    /// Minimum seconds between ordinary polls of one (provider, topic).
    pub min_poll_interval_secs: u64,
    /// Fixed backoff before a failed (provider, topic) is re-attempted.
    pub retry_interval_secs: u64,

    /// Outbound HTTP timeout for provider fetches.
    pub http_timeout_secs: u64,

    /// pgmq visibility timeout: how long a read message stays hidden
    /// before the log redelivers it.
    pub visibility_timeout_secs: i32,
    /// Consumer poll fallback when no NOTIFY arrives.
    pub consumer_poll_interval_secs: u64,

    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    /// In production, systemd EnvironmentFile provides the vars.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: SecretString::from(required_var("DATABASE_URL")?),
            newsapi_api_key: optional_secret("NEWS_API_KEY"),
            gnews_api_key: optional_secret("GNEWS_API_KEY"),
            mediastack_api_key: optional_secret("MEDIASTACK_API_KEY"),
            topics: parse_topics(&std::env::var("NEWS_TOPICS").unwrap_or_default()),
            state_dir: PathBuf::from(
                std::env::var("STATE_DIR").unwrap_or_else(|_| "state".to_string()),
            ),
            min_poll_interval_secs: parsed_var("MIN_POLL_INTERVAL_SECS", 3600)?,
            retry_interval_secs: parsed_var("RETRY_INTERVAL_SECS", 600)?,
            http_timeout_secs: parsed_var("HTTP_TIMEOUT_SECS", 30)?,
            visibility_timeout_secs: parsed_var("CONSUMER_VISIBILITY_TIMEOUT_SECS", 60)?,
            consumer_poll_interval_secs: parsed_var("CONSUMER_POLL_INTERVAL_SECS", 5)?,
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn required_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| Error::Config(format!("required environment variable {name} is not set")))
}

fn optional_secret(name: &str) -> Option<SecretString> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .map(SecretString::from)
}

fn parsed_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| Error::Config(format!("cannot parse {name}={raw}"))),
        Err(_) => Ok(default),
    }
}

/// Parse a comma-separated topic list, dropping empty entries.
pub fn parse_topics(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topics_parse_trims_and_skips_empties() {
        assert_eq!(
            parse_topics(" bitcoin, climate ,,ai "),
            vec!["bitcoin", "climate", "ai"]
        );
        assert!(parse_topics("").is_empty());
    }
}
