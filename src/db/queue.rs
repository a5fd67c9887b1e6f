//! Topic log operations via pgmq and direct SQLx.
//!
//! Each news topic gets its own pgmq queue. Calls pgmq's SQL
//! functions: pgmq.create, pgmq.send, pgmq.read, pgmq.archive.

use crate::error::Result;
use crate::telemetry::metrics;
use opentelemetry::KeyValue;

/// NOTIFY channel fired after a successful append, so consumers can
/// wake without waiting out their poll interval.
pub const ARTICLES_READY_CHANNEL: &str = "articles_ready";

/// Queue name length limit imposed by pgmq (its internal tables add a
/// prefix to the name).
const MAX_QUEUE_NAME_LEN: usize = 47;

/// Derive the pgmq queue name backing a topic.
///
/// Topics are free text from configuration; queue names must be
/// identifier-safe and cannot start with a digit, so everything gets
/// the `news_` prefix and non-alphanumerics become underscores.
pub fn queue_name_for_topic(topic: &str) -> String {
    let mut name = String::with_capacity(topic.len() + 5);
    name.push_str("news_");
    for c in topic.chars() {
        if c.is_ascii_alphanumeric() {
            name.push(c.to_ascii_lowercase());
        } else {
            name.push('_');
        }
    }
    name.truncate(MAX_QUEUE_NAME_LEN);
    name
}

/// A message read from a topic's queue.
#[derive(Debug, Clone)]
pub struct TopicMessage {
    pub msg_id: i64,
    pub read_ct: i32,
    pub enqueued_at: chrono::DateTime<chrono::Utc>,
    pub vt: chrono::DateTime<chrono::Utc>,
    pub payload: serde_json::Value,
}

impl super::Db {
    /// Create the queue backing a topic (idempotent).
    pub async fn ensure_topic(&self, topic: &str) -> Result<()> {
        let queue_name = queue_name_for_topic(topic);
        sqlx::query("SELECT pgmq.create($1)")
            .bind(&queue_name)
            .execute(&self.pool)
            .await?;
        metrics::queue_operations().add(
            1,
            &[
                KeyValue::new("topic", topic.to_string()),
                KeyValue::new("operation", "create"),
            ],
        );
        Ok(())
    }

    /// Append a payload to a topic. Returns the message ID.
    ///
    /// The NOTIFY rides in the same transaction as the send, so it
    /// only fires once the message is actually visible.
    pub async fn append_to_topic(&self, topic: &str, payload: &serde_json::Value) -> Result<i64> {
        let queue_name = queue_name_for_topic(topic);
        let mut tx = self.pool.begin().await?;

        let msg_id: (i64,) = sqlx::query_as("SELECT pgmq.send($1, $2, $3)")
            .bind(&queue_name)
            .bind(payload)
            .bind(0i32)
            .fetch_one(&mut *tx)
            .await?;

        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(ARTICLES_READY_CHANNEL)
            .bind(topic)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        metrics::queue_operations().add(
            1,
            &[
                KeyValue::new("topic", topic.to_string()),
                KeyValue::new("operation", "send"),
            ],
        );
        Ok(msg_id.0)
    }

    /// Read the next message from a topic (visibility timeout in
    /// seconds). Returns None if the topic has no pending messages.
    ///
    /// The message stays in the queue until acked; if the caller
    /// crashes before acking, it reappears after the visibility
    /// timeout elapses.
    pub async fn read_from_topic(
        &self,
        topic: &str,
        vt_seconds: i32,
    ) -> Result<Option<TopicMessage>> {
        let queue_name = queue_name_for_topic(topic);
        let row = sqlx::query_as::<
            _,
            (
                i64,
                i32,
                chrono::DateTime<chrono::Utc>,
                chrono::DateTime<chrono::Utc>,
                serde_json::Value,
            ),
        >(
            "SELECT msg_id, read_ct, enqueued_at, vt, message FROM pgmq.read($1, $2, 1)"
        )
        .bind(&queue_name)
        .bind(vt_seconds)
        .fetch_optional(&self.pool)
        .await?;

        let msg = row.map(|(msg_id, read_ct, enqueued_at, vt, payload)| TopicMessage {
            msg_id,
            read_ct,
            enqueued_at,
            vt,
            payload,
        });

        metrics::queue_operations().add(
            1,
            &[
                KeyValue::new("topic", topic.to_string()),
                KeyValue::new(
                    "operation",
                    if msg.is_some() { "read" } else { "read_empty" },
                ),
            ],
        );

        Ok(msg)
    }

    /// Acknowledge a message by archiving it. Called only after the
    /// article is durably stored, never before.
    pub async fn ack_message(&self, topic: &str, msg_id: i64) -> Result<()> {
        let queue_name = queue_name_for_topic(topic);
        sqlx::query("SELECT pgmq.archive($1, $2)")
            .bind(&queue_name)
            .bind(msg_id)
            .execute(&self.pool)
            .await?;
        metrics::queue_operations().add(
            1,
            &[
                KeyValue::new("topic", topic.to_string()),
                KeyValue::new("operation", "ack"),
            ],
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_names_are_identifier_safe() {
        assert_eq!(queue_name_for_topic("economy"), "news_economy");
        assert_eq!(
            queue_name_for_topic("Machine Learning"),
            "news_machine_learning"
        );
        assert_eq!(queue_name_for_topic("A.I./robots"), "news_a_i__robots");
    }

    #[test]
    fn queue_names_respect_pgmq_length_limit() {
        let long = "w".repeat(100);
        assert_eq!(queue_name_for_topic(&long).len(), MAX_QUEUE_NAME_LEN);
    }
}
