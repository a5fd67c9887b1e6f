//! GNews adapter.
//!
//! <https://gnews.io/docs/v4#search-endpoint>

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::{SourceAdapter, http_error, parse_published_at, snippet};
use crate::error::{Error, Result};
use crate::model::Article;

const PROVIDER: &str = "GNews";
const ENDPOINT: &str = "https://gnews.io/api/v4/search";

/// Articles per call, as the search endpoint's `max` parameter.
const MAX_RESULTS: &str = "10";

#[derive(Debug, Deserialize)]
struct GNewsResponse {
    articles: Vec<RawArticle>,
}

/// GNews error bodies carry a list of human-readable strings.
#[derive(Debug, Deserialize)]
struct GNewsErrorBody {
    errors: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawArticle {
    title: Option<String>,
    description: Option<String>,
    url: Option<String>,
    image: Option<String>,
    #[serde(rename = "publishedAt")]
    published_at: Option<String>,
    content: Option<String>,
}

pub struct GNews {
    client: reqwest::Client,
    api_key: SecretString,
}

impl GNews {
    pub fn new(client: reqwest::Client, api_key: SecretString) -> Self {
        Self { client, api_key }
    }

    fn parse_response(body: &str) -> Result<Vec<Article>> {
        let response: GNewsResponse = serde_json::from_str(body)
            .map_err(|e| Error::malformed(PROVIDER, e.to_string()))?;

        Ok(response
            .articles
            .into_iter()
            .filter_map(|raw| {
                let url = raw.url?;
                let mut article = Article::new(url, PROVIDER);
                article.title = raw.title;
                article.description = raw.description;
                article.image = raw.image;
                article.published_at = parse_published_at(raw.published_at.as_deref());
                article.content = raw.content;
                Some(article)
            })
            .collect())
    }
}

#[async_trait]
impl SourceAdapter for GNews {
    async fn fetch(&self, topic: &str) -> Result<Vec<Article>> {
        let response = self
            .client
            .get(ENDPOINT)
            .query(&[
                ("q", topic),
                ("lang", "en"),
                ("country", "us"),
                ("max", MAX_RESULTS),
                ("token", self.api_key.expose_secret()),
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
            let message = match serde_json::from_str::<GNewsErrorBody>(&body) {
                Ok(parsed) => parsed.errors.join("; "),
                Err(_) => snippet(&body),
            };
            return Err(http_error(PROVIDER, status, None, Some(message)));
        }

        Self::parse_response(&body)
    }

    fn provider(&self) -> &'static str {
        PROVIDER
    }
}
