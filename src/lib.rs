//! Real-time anomaly detection engine over per-service metric windows.
//!
//! Ingests per-request metric events, maintains a bounded sliding window of
//! samples per service, evaluates a fixed rule set with consecutive-window
//! confirmation, and publishes deduplicated alerts with fingerprint-based
//! cooldown. The event bus transport itself is external; this crate only
//! depends on the [`bus::EventConsumer`]/[`bus::EventProducer`] trait
//! boundary plus an in-memory implementation for tests and local runs.

pub mod alerts;
pub mod bus;
pub mod config;
pub mod detector;
pub mod error;
pub mod ingest;
pub mod metrics;
pub mod rules;
pub mod window;

pub use config::Config;
pub use error::{ProcessorError, ProcessorResult};
pub use ingest::{IngestLoop, LoopState};
