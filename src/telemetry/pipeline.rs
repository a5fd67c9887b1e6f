//! Pipeline span helpers.
//!
//! Span creation for the two long-running flows: poll attempts on the
//! producer side and message processing on the consumer side.

use tracing::Span;

/// Start a span for one fetch-and-publish attempt.
pub fn start_poll_span(provider: &str, topic: &str) -> Span {
    tracing::info_span!(
        "poll.attempt",
        "poll.provider" = provider,
        "poll.topic" = topic,
    )
}

/// Start a span for processing one queue message.
pub fn start_consume_span(topic: &str, msg_id: i64) -> Span {
    tracing::info_span!(
        "consume.message",
        "consume.topic" = topic,
        "consume.msg_id" = msg_id,
    )
}
