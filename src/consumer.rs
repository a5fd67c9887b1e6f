//! Dedup consumer: drains the per-topic queues into the durable store.
//!
//! Reads with a visibility timeout, upserts, then archives. A message
//! is archived only after its row is durably in the store; any
//! processing failure leaves it in the queue to reappear after the
//! timeout, which is safe because the upsert is idempotent.

use std::sync::Arc;
use std::time::Duration;

use opentelemetry::KeyValue;
use tokio::sync::Notify;
use tracing::{Instrument, error, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::db::Db;
use crate::db::news::UpsertOutcome;
use crate::db::queue::{ARTICLES_READY_CHANNEL, TopicMessage};
use crate::error::Result;
use crate::model::Article;
use crate::telemetry::metrics;
use crate::telemetry::pipeline::start_consume_span;

/// Configuration for the consumer loop.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Visibility timeout (seconds) for queue reads.
    pub visibility_timeout: i32,
    /// Poll interval fallback when no NOTIFY arrives.
    pub poll_interval: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            visibility_timeout: 60,
            poll_interval: Duration::from_secs(5),
        }
    }
}

impl From<&Config> for ConsumerConfig {
    fn from(config: &Config) -> Self {
        Self {
            visibility_timeout: config.visibility_timeout_secs,
            poll_interval: Duration::from_secs(config.consumer_poll_interval_secs),
        }
    }
}

/// Terminal outcome of processing one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeOutcome {
    /// New row created under the article's URL.
    Stored(Uuid),
    /// The URL was already present; the write was a no-op.
    Deduplicated,
}

/// The consumer loop. Multiple instances may run against the same
/// queues; correctness rests on the store's uniqueness constraint.
pub struct DedupConsumer {
    db: Arc<Db>,
    topics: Vec<String>,
    config: ConsumerConfig,
    shutdown: Arc<Notify>,
}

impl DedupConsumer {
    pub fn new(db: Arc<Db>, topics: Vec<String>, config: ConsumerConfig, shutdown: Arc<Notify>) -> Self {
        Self {
            db,
            topics,
            config,
            shutdown,
        }
    }

    /// Run the consume loop until shutdown. A message in flight when
    /// shutdown arrives is finished (or left unacked), never acked
    /// mid-write.
    pub async fn run(&self) -> Result<()> {
        // The consumer may come up before any poller has published.
        for topic in &self.topics {
            self.db.ensure_topic(topic).await?;
        }

        let mut listener = sqlx::postgres::PgListener::connect_with(self.db.pool()).await?;
        listener.listen(ARTICLES_READY_CHANNEL).await?;

        info!(topics = self.topics.len(), "consumer started, waiting for articles");

        loop {
            tokio::select! {
                _ = self.shutdown.notified() => {
                    info!("consumer shutting down");
                    return Ok(());
                }
                notif = listener.recv() => {
                    match notif {
                        Ok(n) => info!(topic = n.payload(), "notified of published articles"),
                        Err(e) => warn!("listener error: {e}, falling back to poll"),
                    }
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }

            if let Err(e) = self.drain_available().await {
                // Store or queue connectivity loss; the next cycle
                // retries, redelivery covers anything half-done.
                error!("drain error: {e}");
            }
        }
    }

    /// Process every pending message across the configured topics.
    /// Returns the number of messages acknowledged.
    pub async fn drain_available(&self) -> Result<usize> {
        let mut processed = 0;
        for topic in &self.topics {
            loop {
                let msg = self
                    .db
                    .read_from_topic(topic, self.config.visibility_timeout)
                    .await?;
                let Some(msg) = msg else { break };

                match self.process_message(topic, &msg).await {
                    Ok(_) => processed += 1,
                    Err(e) => {
                        warn!(
                            topic,
                            msg_id = msg.msg_id,
                            error = %e,
                            "processing failed, message left for redelivery"
                        );
                        metrics::messages_consumed().add(
                            1,
                            &[
                                KeyValue::new("topic", topic.to_string()),
                                KeyValue::new("outcome", "failed"),
                            ],
                        );
                        // A store outage fails everything behind it
                        // too; move on instead of burning reads.
                        break;
                    }
                }
            }
        }
        Ok(processed)
    }

    /// Deserialize, upsert, then ack one message.
    pub async fn process_message(&self, topic: &str, msg: &TopicMessage) -> Result<ConsumeOutcome> {
        let span = start_consume_span(topic, msg.msg_id);

        async {
            let started = std::time::Instant::now();
            if msg.read_ct > 1 {
                info!(topic, msg_id = msg.msg_id, read_ct = msg.read_ct, "redelivered message");
            }

            let article: Article = serde_json::from_value(msg.payload.clone())?;

            let outcome = match self.db.upsert_if_absent(&article, topic).await? {
                UpsertOutcome::Inserted(id) => {
                    info!(topic, msg_id = msg.msg_id, url = %article.url, id = %id, "article stored");
                    ConsumeOutcome::Stored(id)
                }
                UpsertOutcome::AlreadyExists => {
                    info!(topic, msg_id = msg.msg_id, url = %article.url, "duplicate skipped");
                    ConsumeOutcome::Deduplicated
                }
            };

            // Ack strictly after the upsert is durable. Crashing here
            // redelivers the message; the second upsert is a no-op.
            self.db.ack_message(topic, msg.msg_id).await?;

            metrics::messages_consumed().add(
                1,
                &[
                    KeyValue::new("topic", topic.to_string()),
                    KeyValue::new(
                        "outcome",
                        match outcome {
                            ConsumeOutcome::Stored(_) => "stored",
                            ConsumeOutcome::Deduplicated => "duplicate",
                        },
                    ),
                ],
            );
            metrics::operation_duration_ms().record(
                started.elapsed().as_millis() as f64,
                &[KeyValue::new("operation", "consume.process")],
            );

            Ok(outcome)
        }
        .instrument(span)
        .await
    }
}
