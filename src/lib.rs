//! # newsflow
//!
//! News ingestion pipeline: per-provider pollers fetch articles for
//! configured topics, publish them to per-topic queues (pgmq), and a
//! dedup consumer upserts them into Postgres keyed by URL.

pub mod config;
pub mod consumer;
pub mod db;
pub mod error;
pub mod model;
pub mod publisher;
pub mod scheduler;
pub mod sources;
pub mod telemetry;
