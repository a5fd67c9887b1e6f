//! Tick-driven scheduler tests with scripted fetches. Time is passed
//! in explicitly, so nothing here sleeps or touches a network.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use newsflow::error::{Error, Result};
use newsflow::model::Article;
use newsflow::publisher::ArticleSink;
use newsflow::scheduler::state::ScheduleState;
use newsflow::scheduler::{PollConfig, Poller};
use newsflow::sources::SourceAdapter;
use tempfile::TempDir;
use tokio::sync::Notify;

const T0: i64 = 1_700_000_000;
const MIN: i64 = 3600;
const RETRY: i64 = 600;

/// Pops one scripted response per fetch; an exhausted script returns
/// empty payloads. Records the topics fetched, in order.
struct ScriptedAdapter {
    responses: Mutex<VecDeque<Result<Vec<Article>>>>,
    fetched: Arc<Mutex<Vec<String>>>,
}

impl ScriptedAdapter {
    fn new(script: Vec<Result<Vec<Article>>>) -> (Box<Self>, Arc<Mutex<Vec<String>>>) {
        let fetched = Arc::new(Mutex::new(Vec::new()));
        let adapter = Box::new(Self {
            responses: Mutex::new(script.into()),
            fetched: Arc::clone(&fetched),
        });
        (adapter, fetched)
    }
}

#[async_trait]
impl SourceAdapter for ScriptedAdapter {
    async fn fetch(&self, topic: &str) -> Result<Vec<Article>> {
        self.fetched.lock().unwrap().push(topic.to_string());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    fn provider(&self) -> &'static str {
        "Scripted"
    }
}

#[derive(Default)]
struct RecordingSink {
    published: Mutex<Vec<(String, Article)>>,
    fail: AtomicBool,
}

#[async_trait]
impl ArticleSink for RecordingSink {
    async fn publish(&self, topic: &str, article: &Article) -> Result<()> {
        if self.fail.load(Ordering::Relaxed) {
            return Err(Error::Publish {
                topic: topic.to_string(),
                source: sqlx::Error::PoolClosed,
            });
        }
        self.published
            .lock()
            .unwrap()
            .push((topic.to_string(), article.clone()));
        Ok(())
    }
}

fn article(url: &str) -> Article {
    Article::new(url, "Scripted").title("a headline")
}

fn rate_limited() -> Error {
    Error::RateLimited {
        provider: "Scripted",
        message: "quota".to_string(),
    }
}

async fn poller(
    dir: &TempDir,
    topics: &[&str],
    script: Vec<Result<Vec<Article>>>,
) -> (Poller, Arc<Mutex<Vec<String>>>, Arc<RecordingSink>) {
    let (adapter, fetched) = ScriptedAdapter::new(script);
    let sink = Arc::new(RecordingSink::default());
    let state = ScheduleState::load(dir.path()).await.unwrap();
    let poller = Poller::new(
        adapter,
        Arc::clone(&sink) as Arc<dyn ArticleSink>,
        topics.iter().map(|t| t.to_string()).collect(),
        PollConfig {
            min_interval_secs: MIN,
            retry_interval_secs: RETRY,
        },
        state,
        Arc::new(Notify::new()),
    );
    (poller, fetched, sink)
}

#[tokio::test]
async fn first_tick_fetches_every_topic_and_publishes() {
    let dir = TempDir::new().unwrap();
    let (mut p, fetched, sink) = poller(
        &dir,
        &["economy", "sports"],
        vec![
            Ok(vec![article("https://e.com/1")]),
            Ok(vec![article("https://e.com/2"), article("https://e.com/3")]),
        ],
    )
    .await;

    p.tick(T0).await.unwrap();

    assert_eq!(*fetched.lock().unwrap(), vec!["economy", "sports"]);
    assert_eq!(sink.published.lock().unwrap().len(), 3);
    assert_eq!(p.state().last_call("economy"), Some(T0));
    assert_eq!(p.state().last_call("sports"), Some(T0));
    assert!(p.state().retry_at("economy").is_none());
}

#[tokio::test]
async fn min_interval_spaces_fetches() {
    let dir = TempDir::new().unwrap();
    let (mut p, fetched, _sink) = poller(&dir, &["economy"], vec![Ok(vec![]), Ok(vec![])]).await;

    p.tick(T0).await.unwrap();
    p.tick(T0 + 100).await.unwrap();
    p.tick(T0 + MIN - 1).await.unwrap();
    assert_eq!(fetched.lock().unwrap().len(), 1);

    p.tick(T0 + MIN).await.unwrap();
    assert_eq!(fetched.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn failure_schedules_retry_then_drains_it_first() {
    let dir = TempDir::new().unwrap();
    let (mut p, fetched, _sink) = poller(
        &dir,
        &["economy"],
        vec![Err(rate_limited()), Ok(vec![article("https://e.com/1")])],
    )
    .await;

    p.tick(T0).await.unwrap();
    // The failed attempt still stamps the last call.
    assert_eq!(p.state().last_call("economy"), Some(T0));
    assert_eq!(p.state().retry_at("economy"), Some(T0 + RETRY));

    // Not due yet: retry pending blocks the ordinary pass too.
    p.tick(T0 + RETRY - 1).await.unwrap();
    assert_eq!(fetched.lock().unwrap().len(), 1);

    // Due: drained once, not fetched a second time by the ordinary pass.
    p.tick(T0 + RETRY).await.unwrap();
    assert_eq!(fetched.lock().unwrap().len(), 2);
    assert_eq!(p.state().retry_at("economy"), None);
    assert_eq!(p.state().last_call("economy"), Some(T0 + RETRY));
}

#[tokio::test]
async fn failed_retry_is_rescheduled() {
    let dir = TempDir::new().unwrap();
    let (mut p, _fetched, _sink) = poller(
        &dir,
        &["economy"],
        vec![Err(rate_limited()), Err(rate_limited())],
    )
    .await;

    p.tick(T0).await.unwrap();
    p.tick(T0 + RETRY).await.unwrap();

    assert_eq!(p.state().retry_at("economy"), Some(T0 + RETRY + RETRY));
    assert_eq!(p.state().last_call("economy"), Some(T0 + RETRY));
}

#[tokio::test]
async fn malformed_payload_is_dropped_without_retry() {
    let dir = TempDir::new().unwrap();
    let (mut p, fetched, sink) = poller(
        &dir,
        &["economy"],
        vec![Err(Error::malformed("Scripted", "not json"))],
    )
    .await;

    p.tick(T0).await.unwrap();

    assert_eq!(fetched.lock().unwrap().len(), 1);
    assert!(sink.published.lock().unwrap().is_empty());
    // Waiting will not fix it: attempt stamped, no retry queued.
    assert_eq!(p.state().last_call("economy"), Some(T0));
    assert_eq!(p.state().retry_at("economy"), None);
}

#[tokio::test]
async fn publish_failure_takes_the_retry_path() {
    let dir = TempDir::new().unwrap();
    let (mut p, _fetched, sink) = poller(
        &dir,
        &["economy"],
        vec![Ok(vec![article("https://e.com/1")])],
    )
    .await;

    sink.fail.store(true, Ordering::Relaxed);
    p.tick(T0).await.unwrap();
    assert_eq!(p.state().retry_at("economy"), Some(T0 + RETRY));

    // Log back up: the drained retry clears the entry.
    sink.fail.store(false, Ordering::Relaxed);
    p.tick(T0 + RETRY).await.unwrap();
    assert_eq!(p.state().retry_at("economy"), None);
}

#[tokio::test]
async fn restart_resumes_from_persisted_state() {
    let dir = TempDir::new().unwrap();
    {
        let (mut p, _fetched, _sink) = poller(
            &dir,
            &["economy", "sports"],
            vec![Ok(vec![]), Err(rate_limited())],
        )
        .await;
        p.tick(T0).await.unwrap();
    }

    // New process against the same state directory.
    let (mut p, fetched, _sink) = poller(&dir, &["economy", "sports"], vec![Ok(vec![])]).await;
    assert_eq!(p.state().last_call("economy"), Some(T0));
    assert_eq!(p.state().retry_at("sports"), Some(T0 + RETRY));

    // Still inside the interval and before the retry: nothing fires.
    p.tick(T0 + 100).await.unwrap();
    assert!(fetched.lock().unwrap().is_empty());

    // Only the pending retry fires: "sports", not "economy".
    p.tick(T0 + RETRY).await.unwrap();
    assert_eq!(*fetched.lock().unwrap(), vec!["sports"]);
}

#[tokio::test]
async fn retry_due_during_downtime_fires_immediately_on_restart() {
    let dir = TempDir::new().unwrap();
    {
        let (mut p, _fetched, _sink) =
            poller(&dir, &["economy"], vec![Err(rate_limited())]).await;
        p.tick(T0).await.unwrap();
    }

    // Restart long after the retry came due.
    let (mut p, fetched, _sink) = poller(&dir, &["economy"], vec![Ok(vec![])]).await;
    p.tick(T0 + 10_000).await.unwrap();
    assert_eq!(*fetched.lock().unwrap(), vec!["economy"]);
    assert_eq!(p.state().retry_at("economy"), None);
}

#[tokio::test]
async fn next_wake_tracks_the_soonest_due_action() {
    let dir = TempDir::new().unwrap();
    let (mut p, _fetched, _sink) = poller(
        &dir,
        &["economy", "sports"],
        vec![Ok(vec![]), Err(rate_limited())],
    )
    .await;

    // Never polled: due now.
    assert_eq!(p.next_wake(T0), T0);

    p.tick(T0).await.unwrap();
    // "sports" retry at T0+RETRY is sooner than "economy" at T0+MIN.
    assert_eq!(p.next_wake(T0 + 1), T0 + RETRY);

    p.tick(T0 + RETRY).await.unwrap();
    // Retry drained and stamped; next due is the earlier ordinary poll.
    assert_eq!(p.next_wake(T0 + RETRY + 1), T0 + MIN);
}
