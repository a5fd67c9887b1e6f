//! Core data model.
//!
//! An article has identity (its URL, the business key for dedup),
//! a provider tag, and whatever content fields the provider returned.
//! The wire shape on the topic log is exactly the seven keys of
//! [`Article`]; the consumer stamps topic and created_at on store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A normalized news article as fetched from a provider and carried on
/// the topic log.
///
/// Every field except `url` and `source` is optional: fields absent in
/// the provider response stay `None`, they are never defaulted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub title: Option<String>,

    pub description: Option<String>,

    /// Business key. Exactly one stored row exists per distinct URL.
    pub url: String,

    /// Image URI, as given by the provider.
    pub image: Option<String>,

    pub published_at: Option<DateTime<Utc>>,

    /// Provider tag: `NewsAPI`, `GNews` or `MediaStack`.
    pub source: String,

    pub content: Option<String>,
}

impl Article {
    /// Minimal article: just the business key and provider tag.
    pub fn new(url: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            title: None,
            description: None,
            url: url.into(),
            image: None,
            published_at: None,
            source: source.into(),
            content: None,
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    pub fn published_at(mut self, at: DateTime<Utc>) -> Self {
        self.published_at = Some(at);
        self
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }
}

/// An article as it exists in the durable store: the wire fields plus
/// the server-assigned id, the topic that produced it, and the time the
/// consumer wrote it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredArticle {
    pub id: Uuid,
    pub title: Option<String>,
    pub description: Option<String>,
    pub url: String,
    pub image: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub source: String,
    pub content: Option<String>,
    pub topic: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_format_has_all_seven_keys() {
        let article = Article::new("http://example.com/a", "GNews").title("A title");
        let value = serde_json::to_value(&article).unwrap();
        let obj = value.as_object().unwrap();

        for key in [
            "title",
            "description",
            "url",
            "image",
            "published_at",
            "source",
            "content",
        ] {
            assert!(obj.contains_key(key), "missing wire key {key}");
        }
        assert_eq!(obj.len(), 7);
        assert_eq!(obj["url"], "http://example.com/a");
        assert!(obj["description"].is_null());
    }

    #[test]
    fn wire_format_round_trips_timestamps() {
        let at = "2024-05-01T12:30:00Z".parse::<DateTime<Utc>>().unwrap();
        let article = Article::new("http://example.com/b", "NewsAPI").published_at(at);

        let json = serde_json::to_string(&article).unwrap();
        let back: Article = serde_json::from_str(&json).unwrap();
        assert_eq!(back, article);
        assert_eq!(back.published_at, Some(at));
    }
}
