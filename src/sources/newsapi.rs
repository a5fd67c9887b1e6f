//! NewsAPI adapter.
//!
//! <https://newsapi.org/docs/endpoints/everything>
//!
//! NewsAPI reports errors inside the body (`status: "error"` with a
//! `code`), sometimes alongside a non-2xx status, so classification
//! happens on the parsed body rather than the HTTP status alone.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::{SourceAdapter, http_error, parse_published_at, snippet};
use crate::error::{Error, Result};
use crate::model::Article;

const PROVIDER: &str = "NewsAPI";
const ENDPOINT: &str = "https://newsapi.org/v2/everything";

#[derive(Debug, Deserialize)]
struct NewsApiResponse {
    status: String,
    articles: Option<Vec<RawArticle>>,
    code: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawArticle {
    title: Option<String>,
    description: Option<String>,
    url: Option<String>,
    #[serde(rename = "urlToImage")]
    url_to_image: Option<String>,
    #[serde(rename = "publishedAt")]
    published_at: Option<String>,
    content: Option<String>,
}

pub struct NewsApi {
    client: reqwest::Client,
    api_key: SecretString,
}

impl NewsApi {
    pub fn new(client: reqwest::Client, api_key: SecretString) -> Self {
        Self { client, api_key }
    }

    /// Parse a response body into normalized articles.
    ///
    /// Records without a URL are skipped: the URL is the dedup key and
    /// a keyless record can never be stored.
    fn parse_response(body: &str) -> Result<Vec<Article>> {
        let response: NewsApiResponse = serde_json::from_str(body)
            .map_err(|e| Error::malformed(PROVIDER, e.to_string()))?;

        if response.status != "ok" {
            return Err(http_error(
                PROVIDER,
                reqwest::StatusCode::OK,
                response.code,
                response.message,
            ));
        }

        let articles = response
            .articles
            .ok_or_else(|| Error::malformed(PROVIDER, "missing articles array"))?;

        Ok(articles
            .into_iter()
            .filter_map(|raw| {
                let url = raw.url?;
                let mut article = Article::new(url, PROVIDER);
                article.title = raw.title;
                article.description = raw.description;
                article.image = raw.url_to_image;
                article.published_at = parse_published_at(raw.published_at.as_deref());
                article.content = raw.content;
                Some(article)
            })
            .collect())
    }
}

#[async_trait]
impl SourceAdapter for NewsApi {
    async fn fetch(&self, topic: &str) -> Result<Vec<Article>> {
        let response = self
            .client
            .get(ENDPOINT)
            .query(&[
                ("apiKey", self.api_key.expose_secret()),
                ("q", topic),
                ("language", "en"),
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
            // The body usually carries a code and message; fall back
            // to the raw status if it is not JSON.
            return Err(match serde_json::from_str::<NewsApiResponse>(&body) {
                Ok(parsed) => http_error(PROVIDER, status, parsed.code, parsed.message),
                Err(_) => http_error(PROVIDER, status, None, Some(snippet(&body))),
            });
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

    const FIXTURE: &str = r#"{
        "status": "ok",
        "totalResults": 2,
        "articles": [
            {
                "source": {"id": null, "name": "Example Times"},
                "author": "Jane Doe",
                "title": "Economy Rebounds",
                "description": "A look at the rebound",
                "url": "https://example.com/economy-rebounds",
                "urlToImage": "https://example.com/image.jpg",
                "publishedAt": "2024-01-15T10:00:00Z",
                "content": "Full text here"
            },
            {
                "source": {"id": null, "name": "Example Wire"},
                "title": "Untitled wire item",
                "url": "https://example.com/wire-item",
                "publishedAt": "not-a-date"
            }
        ]
    }"#;

    #[test]
    fn parses_and_normalizes_articles() {
        let articles = NewsApi::parse_response(FIXTURE).unwrap();
        assert_eq!(articles.len(), 2);

        let first = &articles[0];
        assert_eq!(first.source, "NewsAPI");
        assert_eq!(first.url, "https://example.com/economy-rebounds");
        assert_eq!(first.image.as_deref(), Some("https://example.com/image.jpg"));
        assert!(first.published_at.is_some());

        // Absent fields stay None, junk dates parse to None.
        let second = &articles[1];
        assert!(second.description.is_none());
        assert!(second.image.is_none());
        assert!(second.published_at.is_none());
    }

    #[test]
    fn records_without_url_are_skipped() {
        let body = r#"{"status": "ok", "articles": [{"title": "No link"}]}"#;
        let articles = NewsApi::parse_response(body).unwrap();
        assert!(articles.is_empty());
    }

    #[test]
    fn error_body_with_rate_limit_code_maps_to_rate_limited() {
        let body = r#"{"status": "error", "code": "rateLimited", "message": "too many requests"}"#;
        let err = NewsApi::parse_response(body).unwrap_err();
        assert!(matches!(err, Error::RateLimited { .. }));
    }

    #[test]
    fn error_body_with_other_code_maps_to_provider_error() {
        let body = r#"{"status": "error", "code": "apiKeyInvalid", "message": "bad key"}"#;
        let err = NewsApi::parse_response(body).unwrap_err();
        match err {
            Error::Provider { code, .. } => assert_eq!(code, "apiKeyInvalid"),
            other => panic!("expected provider error, got {other:?}"),
        }
        assert!(NewsApi::parse_response(body).unwrap_err().is_retryable());
    }

    #[test]
    fn garbage_body_is_malformed_not_retryable() {
        let err = NewsApi::parse_response("<html>gateway</html>").unwrap_err();
        assert!(matches!(err, Error::MalformedResponse { .. }));
        assert!(!err.is_retryable());
    }
}
