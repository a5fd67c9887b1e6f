//! Event publisher: appends normalized articles to the topic log.

use std::sync::Arc;

use async_trait::async_trait;
use opentelemetry::KeyValue;
use tracing::debug;

use crate::db::Db;
use crate::error::{Error, Result};
use crate::model::Article;
use crate::telemetry::metrics;

/// Sink for normalized articles.
///
/// The poll loop only sees this trait, so tests can swap in a sink
/// that records or fails without a database.
#[async_trait]
pub trait ArticleSink: Send + Sync {
    /// Append one article to a topic. An error means the article is
    /// not on the log and the whole fetch attempt counts as failed.
    async fn publish(&self, topic: &str, article: &Article) -> Result<()>;
}

/// Publishes to the per-topic pgmq queues behind [`Db`].
pub struct TopicLogPublisher {
    db: Arc<Db>,
}

impl TopicLogPublisher {
    pub fn new(db: Arc<Db>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ArticleSink for TopicLogPublisher {
    async fn publish(&self, topic: &str, article: &Article) -> Result<()> {
        // An unencodable payload is a publish failure like any other,
        // so the poll loop schedules a retry instead of dropping it.
        let payload = serde_json::to_value(article).map_err(|e| Error::Publish {
            topic: topic.to_string(),
            source: sqlx::Error::Encode(Box::new(e)),
        })?;
        let msg_id = self
            .db
            .append_to_topic(topic, &payload)
            .await
            .map_err(|e| match e {
                Error::Db(source) => Error::Publish {
                    topic: topic.to_string(),
                    source,
                },
                other => other,
            })?;

        metrics::articles_published().add(
            1,
            &[
                KeyValue::new("topic", topic.to_string()),
                KeyValue::new("source", article.source.clone()),
            ],
        );
        debug!(topic, msg_id, url = %article.url, "article published");
        Ok(())
    }
}
