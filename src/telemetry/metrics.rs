//! Pipeline metric instruments.
//!
//! Instruments come from the globally-registered meter, so call sites
//! need no handle plumbing; with no OTLP endpoint they are no-ops.

use opentelemetry::metrics::{Counter, Histogram, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter("newsflow")
}

/// Counter: articles returned by provider fetches.
/// Labels: `provider`, `topic`.
pub fn articles_fetched() -> Counter<u64> {
    meter()
        .u64_counter("newsflow.articles.fetched")
        .with_description("Number of articles returned by provider fetches")
        .build()
}

/// Counter: articles appended to the topic log.
/// Labels: `topic`, `source`.
pub fn articles_published() -> Counter<u64> {
    meter()
        .u64_counter("newsflow.articles.published")
        .with_description("Number of articles appended to the topic log")
        .build()
}

/// Counter: poll attempts per (provider, topic).
/// Labels: `provider`, `topic`, `outcome` ("ok" | "retry_scheduled" | "dropped").
pub fn poll_attempts() -> Counter<u64> {
    meter()
        .u64_counter("newsflow.poll.attempts")
        .with_description("Number of poll attempts")
        .build()
}

/// Counter: queue-level operations (create, send, read, ack).
/// Labels: `topic`, `operation`.
pub fn queue_operations() -> Counter<u64> {
    meter()
        .u64_counter("newsflow.queue.operations")
        .with_description("Number of queue operations")
        .build()
}

/// Counter: consumed messages by terminal outcome.
/// Labels: `topic`, `outcome` ("stored" | "duplicate" | "failed").
pub fn messages_consumed() -> Counter<u64> {
    meter()
        .u64_counter("newsflow.messages.consumed")
        .with_description("Number of messages processed by the consumer")
        .build()
}

/// Counter: store writes by outcome.
/// Labels: `source`, `outcome` ("stored" | "duplicate").
pub fn articles_stored() -> Counter<u64> {
    meter()
        .u64_counter("newsflow.articles.stored")
        .with_description("Number of article store writes")
        .build()
}

/// Histogram: how long a poll fetch or a message consume took.
/// Labels: `operation`.
pub fn operation_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("newsflow.operation.duration_ms")
        .with_description("Operation duration in milliseconds")
        .with_unit("ms")
        .build()
}
