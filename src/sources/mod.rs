//! News provider adapters.
//!
//! Each adapter fetches one provider's payload for a topic and
//! normalizes it into the canonical [`Article`] shape. Parsing lives
//! in per-provider `parse_response` functions taking the raw body, so
//! it can be exercised against fixture payloads without a network.
//!
//! [`Article`]: crate::model::Article

pub mod gnews;
pub mod mediastack;
pub mod newsapi;

use std::time::Duration;

use async_trait::async_trait;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::Article;

/// A news provider the poll loop can fetch from.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Fetch and normalize the latest articles for a topic.
    async fn fetch(&self, topic: &str) -> Result<Vec<Article>>;

    /// Stable provider tag, stamped into every article's `source`.
    fn provider(&self) -> &'static str;
}

/// Create a configured HTTP client shared by all adapters.
pub fn build_client(timeout_secs: u64) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?;
    Ok(client)
}

/// Build one adapter per provider with an API key configured.
/// Providers without a key are simply absent from the poll loop.
pub fn adapters_from_config(config: &Config) -> Result<Vec<Box<dyn SourceAdapter>>> {
    let client = build_client(config.http_timeout_secs)?;

    let mut adapters: Vec<Box<dyn SourceAdapter>> = Vec::new();
    if let Some(key) = &config.newsapi_api_key {
        adapters.push(Box::new(newsapi::NewsApi::new(client.clone(), key.clone())));
    }
    if let Some(key) = &config.gnews_api_key {
        adapters.push(Box::new(gnews::GNews::new(client.clone(), key.clone())));
    }
    if let Some(key) = &config.mediastack_api_key {
        adapters.push(Box::new(mediastack::Mediastack::new(client, key.clone())));
    }

    if adapters.is_empty() {
        return Err(Error::config(
            "no provider API keys configured, set NEWS_API_KEY, GNEWS_API_KEY or MEDIASTACK_API_KEY",
        ));
    }
    Ok(adapters)
}

/// Map a failed provider response to the fetch error taxonomy.
///
/// `code` and `message` come from the provider body when it was
/// parsable. Throttling becomes [`Error::RateLimited`], everything
/// else [`Error::Provider`]; both go through the retry queue.
pub(crate) fn http_error(
    provider: &'static str,
    status: reqwest::StatusCode,
    code: Option<String>,
    message: Option<String>,
) -> Error {
    let code = code.unwrap_or_else(|| status.as_u16().to_string());
    let message = message.unwrap_or_default();
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS || is_quota_code(&code) {
        Error::RateLimited { provider, message }
    } else {
        Error::Provider {
            provider,
            code,
            message,
        }
    }
}

/// Quota codes the providers report in their error bodies, sometimes
/// on a 200 status.
fn is_quota_code(code: &str) -> bool {
    matches!(
        code,
        "rateLimited" | "usage_limit_reached" | "rate_limit_reached" | "monthly_limit_reached"
    )
}

/// Parse a provider timestamp leniently. Anything unparsable becomes
/// `None` rather than failing the record or the payload.
pub(crate) fn parse_published_at(raw: Option<&str>) -> Option<chrono::DateTime<chrono::Utc>> {
    raw.and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&chrono::Utc))
}

/// First part of a response body, for error messages.
pub(crate) fn snippet(body: &str) -> String {
    body.chars().take(200).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_429_maps_to_rate_limited() {
        let err = http_error(
            "NewsAPI",
            reqwest::StatusCode::TOO_MANY_REQUESTS,
            None,
            Some("slow down".into()),
        );
        assert!(matches!(err, Error::RateLimited { .. }));
        assert!(err.is_retryable());
    }

    #[test]
    fn quota_code_on_ok_status_maps_to_rate_limited() {
        let err = http_error(
            "MediaStack",
            reqwest::StatusCode::OK,
            Some("usage_limit_reached".into()),
            None,
        );
        assert!(matches!(err, Error::RateLimited { .. }));
    }

    #[test]
    fn other_statuses_map_to_provider_error() {
        let err = http_error(
            "GNews",
            reqwest::StatusCode::INTERNAL_SERVER_ERROR,
            None,
            None,
        );
        match err {
            Error::Provider { code, .. } => assert_eq!(code, "500"),
            other => panic!("expected provider error, got {other:?}"),
        }
    }

    #[test]
    fn timestamps_parse_leniently() {
        assert!(parse_published_at(Some("2024-01-15T10:00:00Z")).is_some());
        assert!(parse_published_at(Some("2020-07-15T00:15:22+00:00")).is_some());
        assert!(parse_published_at(Some("yesterday-ish")).is_none());
        assert!(parse_published_at(None).is_none());
    }
}
