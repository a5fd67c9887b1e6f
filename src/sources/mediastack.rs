//! Mediastack adapter.
//!
//! <https://mediastack.com/documentation>
//!
//! Mediastack reports quota and key errors in a 200 body under an
//! `error` object, so the body is inspected before the article list.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::{SourceAdapter, http_error, parse_published_at, snippet};
use crate::error::{Error, Result};
use crate::model::Article;

const PROVIDER: &str = "MediaStack";
const ENDPOINT: &str = "http://api.mediastack.com/v1/news";

#[derive(Debug, Deserialize)]
struct MediastackResponse {
    data: Option<Vec<RawArticle>>,
    error: Option<MediastackError>,
}

#[derive(Debug, Deserialize)]
struct MediastackError {
    code: String,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawArticle {
    title: Option<String>,
    description: Option<String>,
    url: Option<String>,
    image: Option<String>,
    published_at: Option<String>,
}

pub struct Mediastack {
    client: reqwest::Client,
    api_key: SecretString,
}

impl Mediastack {
    pub fn new(client: reqwest::Client, api_key: SecretString) -> Self {
        Self { client, api_key }
    }

    /// Classify a non-2xx response. The body's error object wins when it
    /// parses; anything else is a provider failure and stays retryable.
    fn error_from_failure(status: reqwest::StatusCode, body: &str) -> Error {
        match serde_json::from_str::<MediastackResponse>(body) {
            Ok(MediastackResponse {
                error: Some(error), ..
            }) => http_error(PROVIDER, status, Some(error.code), error.message),
            _ => http_error(PROVIDER, status, None, Some(snippet(body))),
        }
    }

    fn parse_response(body: &str) -> Result<Vec<Article>> {
        let response: MediastackResponse = serde_json::from_str(body)
            .map_err(|e| Error::malformed(PROVIDER, e.to_string()))?;

        if let Some(error) = response.error {
            return Err(http_error(
                PROVIDER,
                reqwest::StatusCode::OK,
                Some(error.code),
                error.message,
            ));
        }

        let data = response
            .data
            .ok_or_else(|| Error::malformed(PROVIDER, "missing data array"))?;

        Ok(data
            .into_iter()
            .filter_map(|raw| {
                let url = raw.url?;
                let mut article = Article::new(url, PROVIDER);
                article.title = raw.title;
                article.description = raw.description;
                article.image = raw.image;
                article.published_at = parse_published_at(raw.published_at.as_deref());
                Some(article)
            })
            .collect())
    }
}

#[async_trait]
impl SourceAdapter for Mediastack {
    async fn fetch(&self, topic: &str) -> Result<Vec<Article>> {
        let response = self
            .client
            .get(ENDPOINT)
            .query(&[
                ("access_key", self.api_key.expose_secret()),
                ("keywords", topic),
                ("countries", "us,kr"),
            ])
            .send()
            .await
            .map_err(|e| Error::Network {
                provider: PROVIDER,
                source: e,
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| Error::Network {
            provider: PROVIDER,
            source: e,
        })?;

        if !status.is_success() {
            return Err(Self::error_from_failure(status, &body));
        }

        Self::parse_response(&body)
    }

    fn provider(&self) -> &'static str {
        PROVIDER
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    const FIXTURE: &str = r#"{
        "pagination": {"limit": 25, "offset": 0, "count": 1, "total": 1},
        "data": [
            {
                "author": "Staff",
                "title": "Chip Exports Climb",
                "description": "Semiconductor exports rose again",
                "url": "https://example.com/chips",
                "source": "example-biz",
                "image": "https://example.com/chips.png",
                "category": "business",
                "language": "en",
                "country": "kr",
                "published_at": "2024-03-10T02:15:22+00:00"
            }
        ]
    }"#;

    #[test]
    fn parses_and_normalizes_articles() {
        let articles = Mediastack::parse_response(FIXTURE).unwrap();
        assert_eq!(articles.len(), 1);

        let article = &articles[0];
        // The provider tag replaces the upstream source string.
        assert_eq!(article.source, "MediaStack");
        assert_eq!(article.url, "https://example.com/chips");
        assert!(article.published_at.is_some());
        // Mediastack has no content field.
        assert!(article.content.is_none());
    }

    #[test]
    fn quota_error_in_ok_body_maps_to_rate_limited() {
        let body = r#"{"error": {"code": "usage_limit_reached", "message": "monthly limit hit"}}"#;
        let err = Mediastack::parse_response(body).unwrap_err();
        assert!(matches!(err, Error::RateLimited { .. }));
    }

    #[test]
    fn key_error_maps_to_provider_error() {
        let body = r#"{"error": {"code": "invalid_access_key", "message": "bad key"}}"#;
        let err = Mediastack::error_from_failure(StatusCode::UNAUTHORIZED, body);
        assert!(matches!(err, Error::Provider { .. }));
    }

    #[test]
    fn non_success_without_error_object_is_retryable() {
        // A gateway 502 can carry a JSON body with no error key; it must
        // be classified for retry, not dropped as malformed.
        let err = Mediastack::error_from_failure(StatusCode::BAD_GATEWAY, r#"{"data": []}"#);
        assert!(matches!(err, Error::Provider { ref code, .. } if code == "502"));
        assert!(err.is_retryable());

        let err = Mediastack::error_from_failure(StatusCode::SERVICE_UNAVAILABLE, "<html>down</html>");
        assert!(err.is_retryable());
    }
}
