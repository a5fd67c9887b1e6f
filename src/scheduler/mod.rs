//! Poll scheduler: decides which topics to fetch and when.
//!
//! One [`Poller`] runs per provider. Each cycle drains due retries
//! first, then walks the configured topics and fetches the ones whose
//! minimum interval has elapsed. Every attempt, successful or not,
//! advances the topic's last-call timestamp; failed attempts that are
//! worth retrying get a single pending retry slot per topic.

pub mod state;

use std::sync::Arc;
use std::time::Duration;

use opentelemetry::KeyValue;
use tokio::sync::Notify;
use tracing::{Instrument, error, info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::publisher::ArticleSink;
use crate::sources::SourceAdapter;
use crate::telemetry::metrics;
use crate::telemetry::pipeline::start_poll_span;
use state::ScheduleState;

/// Intervals governing one poll loop.
#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    /// Minimum seconds between fetch attempts for one topic.
    pub min_interval_secs: i64,
    /// Delay before a failed fetch is retried.
    pub retry_interval_secs: i64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            min_interval_secs: 3600,
            retry_interval_secs: 600,
        }
    }
}

impl From<&Config> for PollConfig {
    fn from(config: &Config) -> Self {
        Self {
            min_interval_secs: config.min_poll_interval_secs as i64,
            retry_interval_secs: config.retry_interval_secs as i64,
        }
    }
}

/// The poll loop for a single provider.
pub struct Poller {
    adapter: Box<dyn SourceAdapter>,
    sink: Arc<dyn ArticleSink>,
    topics: Vec<String>,
    config: PollConfig,
    state: ScheduleState,
    shutdown: Arc<Notify>,
}

impl Poller {
    pub fn new(
        adapter: Box<dyn SourceAdapter>,
        sink: Arc<dyn ArticleSink>,
        topics: Vec<String>,
        config: PollConfig,
        state: ScheduleState,
        shutdown: Arc<Notify>,
    ) -> Self {
        Self {
            adapter,
            sink,
            topics,
            config,
            state,
            shutdown,
        }
    }

    /// Run the poll loop until shutdown. An attempt in flight when
    /// shutdown arrives completes first; the loop only exits at a
    /// sleep point.
    pub async fn run(&mut self) -> Result<()> {
        let provider = self.adapter.provider();
        info!(provider, topics = self.topics.len(), "poller started");

        loop {
            let now = chrono::Utc::now().timestamp();
            if let Err(e) = self.tick(now).await {
                error!(provider, error = %e, "poll cycle failed");
                // Wait out a retry interval instead of spinning on a
                // broken state directory.
                if self.wait(self.config.retry_interval_secs.max(1) as u64).await {
                    return Ok(());
                }
                continue;
            }

            let now = chrono::Utc::now().timestamp();
            let wait_secs = (self.next_wake(now) - now).max(1) as u64;
            if self.wait(wait_secs).await {
                return Ok(());
            }
        }
    }

    /// One scheduling cycle at time `now` (epoch seconds): due retries
    /// first, then the ordinary minimum-interval pass.
    ///
    /// A topic drained by the retry pass has its last-call stamped and
    /// is therefore never fetched twice in one cycle.
    pub async fn tick(&mut self, now: i64) -> Result<()> {
        for topic in self.state.due_retries(now) {
            self.attempt(&topic, now).await?;
        }

        for topic in self.topics.clone() {
            if self.is_eligible(&topic, now) {
                self.attempt(&topic, now).await?;
            }
        }
        Ok(())
    }

    /// Epoch seconds of the next due action. Never in the past.
    pub fn next_wake(&self, now: i64) -> i64 {
        let mut next = now + self.config.min_interval_secs;
        for topic in &self.topics {
            let due = match self.state.retry_at(topic) {
                Some(at) => at,
                None => self.state.last_call(topic).unwrap_or(0) + self.config.min_interval_secs,
            };
            next = next.min(due);
        }
        next.max(now)
    }

    /// Access to the scheduling state, for inspection in tests.
    pub fn state(&self) -> &ScheduleState {
        &self.state
    }

    fn is_eligible(&self, topic: &str, now: i64) -> bool {
        // A topic with a pending retry is owned by the retry path.
        if self.state.retry_at(topic).is_some() {
            return false;
        }
        now - self.state.last_call(topic).unwrap_or(0) >= self.config.min_interval_secs
    }

    async fn attempt(&mut self, topic: &str, now: i64) -> Result<()> {
        let provider = self.adapter.provider();
        let span = start_poll_span(provider, topic);

        async {
            let started = std::time::Instant::now();
            let result = self.fetch_and_publish(topic).await;

            // Stamp the attempt before looking at the outcome so the
            // minimum interval holds even for failures.
            self.state.record_attempt(topic, now).await?;

            let outcome = match result {
                Ok(published) => {
                    self.state.clear_retry(topic).await?;
                    info!(provider, topic, published, "poll complete");
                    "ok"
                }
                Err(e) if e.is_retryable() => {
                    let at = now + self.config.retry_interval_secs;
                    self.state.schedule_retry(topic, at).await?;
                    warn!(provider, topic, error = %e, retry_at = at, "poll failed, retry scheduled");
                    "retry_scheduled"
                }
                Err(e) => {
                    // Retrying will not fix a malformed payload; the
                    // attempt is concluded and any pending retry dies
                    // with it.
                    self.state.clear_retry(topic).await?;
                    warn!(provider, topic, error = %e, "payload dropped");
                    "dropped"
                }
            };

            metrics::poll_attempts().add(
                1,
                &[
                    KeyValue::new("provider", provider),
                    KeyValue::new("topic", topic.to_string()),
                    KeyValue::new("outcome", outcome),
                ],
            );
            metrics::operation_duration_ms().record(
                started.elapsed().as_millis() as f64,
                &[
                    KeyValue::new("operation", "poll.fetch"),
                    KeyValue::new("provider", provider),
                ],
            );
            Ok(())
        }
        .instrument(span)
        .await
    }

    /// Fetch a topic and publish every article. Any publish failure
    /// fails the whole attempt; articles already on the log stay
    /// there, and the store dedups them after the retry.
    async fn fetch_and_publish(&self, topic: &str) -> Result<usize> {
        let articles = self.adapter.fetch(topic).await?;
        metrics::articles_fetched().add(
            articles.len() as u64,
            &[
                KeyValue::new("provider", self.adapter.provider()),
                KeyValue::new("topic", topic.to_string()),
            ],
        );

        let mut published = 0;
        for article in &articles {
            self.sink.publish(topic, article).await?;
            published += 1;
        }
        Ok(published)
    }

    /// Sleep, or return true when shutdown is requested.
    async fn wait(&self, secs: u64) -> bool {
        tokio::select! {
            _ = self.shutdown.notified() => {
                info!(provider = self.adapter.provider(), "poller shutting down");
                true
            }
            _ = tokio::time::sleep(Duration::from_secs(secs)) => false,
        }
    }
}
