use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::alerts::AlertPublisher;
use crate::bus::{BusMessage, EventConsumer, EventProducer};
use crate::config::Config;
use crate::detector::AnomalyDetector;
use crate::metrics::MetricsRegistry;
use crate::window::WindowStore;

/// Lifecycle of the ingest loop. `stop()` is idempotent: it only has an
/// effect from `Running`, transitioning it to `Draining`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Subscribed,
    Running,
    Draining,
    Closed,
}

/// The inbound event JSON. `service`, `latency_ms`, `error` drive window
/// recording and detection; `endpoint`, `region`, `status_code` have no
/// bearing on detection but are carried through to label the scrape-endpoint
/// collectors, which are keyed by all six. Unknown fields are ignored;
/// missing fields fall back to the documented defaults.
#[derive(Debug, Deserialize)]
struct InboundEvent {
    #[serde(default = "default_service")]
    service: String,
    #[serde(default)]
    latency_ms: f64,
    #[serde(default)]
    error: bool,
    #[serde(default = "default_endpoint")]
    endpoint: String,
    #[serde(default = "default_region")]
    region: String,
    #[serde(default)]
    status_code: u16,
}

fn default_service() -> String {
    "unknown".to_string()
}

fn default_endpoint() -> String {
    "unknown".to_string()
}

fn default_region() -> String {
    "unknown".to_string()
}

/// Consumes from the ingest topic, records samples, and periodically
/// triggers detection and publishing. Runs as a single task — the Window
/// Store, Confirmation Tracker, and Active Alerts are all owned exclusively
/// here, so no locking is needed around them.
pub struct IngestLoop<C: EventConsumer, P: EventProducer> {
    config: Config,
    consumer: C,
    store: WindowStore,
    detector: AnomalyDetector,
    publisher: AlertPublisher<P>,
    metrics: Arc<MetricsRegistry>,
    state: LoopState,
    processed_count: u64,
    cancel: CancellationToken,
}

impl<C: EventConsumer, P: EventProducer> IngestLoop<C, P> {
    pub fn new(config: Config, consumer: C, producer: P, metrics: Arc<MetricsRegistry>) -> Self {
        let detector = AnomalyDetector::new(&config);
        let store = WindowStore::new(config.window_size_seconds);
        let publisher = AlertPublisher::new(
            producer,
            config.alerts_topic.clone(),
            config.alert_cooldown_seconds,
        );
        Self {
            config,
            consumer,
            store,
            detector,
            publisher,
            metrics,
            state: LoopState::Idle,
            processed_count: 0,
            cancel: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// A clone of this loop's cancellation token, suitable for wiring to a
    /// signal handler in the binary entry point.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Requests shutdown. Idempotent; has no effect unless currently
    /// `Running`.
    pub fn stop(&mut self) {
        if self.state == LoopState::Running {
            self.state = LoopState::Draining;
            self.cancel.cancel();
        }
    }

    /// Subscribes and runs until cancelled. Consumes `self` because the
    /// loop owns all mutable state for its lifetime.
    pub async fn run(mut self) {
        self.state = LoopState::Subscribed;
        self.state = LoopState::Running;
        info!(
            topic = %self.config.ingest_topic,
            consumer_group = %self.config.consumer_group,
            "stream processor started"
        );

        let poll_timeout = Duration::from_millis(self.config.poll_timeout_ms);

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            let polled = tokio::select! {
                _ = self.cancel.cancelled() => break,
                result = self.consumer.poll(poll_timeout) => result,
            };

            match polled {
                Ok(Some(message)) => {
                    self.process_message(message).await;
                    if let Err(e) = self.consumer.commit().await {
                        warn!(error = %e, "failed to commit consumer offset");
                    }
                }
                Ok(None) => continue, // poll timeout or end-of-partition; not an error
                Err(e) => {
                    let err = crate::error::ProcessorError::FatalBus {
                        reason: e.to_string(),
                    };
                    warn!(error = %err, "consumer lost subscription, escalating to shutdown");
                    break;
                }
            }
        }

        // Reached regardless of whether cancellation, a fatal bus error, or
        // a stop() call triggered the exit from the poll loop.
        self.state = LoopState::Draining;
        self.shutdown().await;
    }

    async fn process_message(&mut self, message: BusMessage) {
        let event: InboundEvent = match serde_json::from_slice(&message.payload) {
            Ok(event) => event,
            Err(e) => {
                let err = crate::error::ProcessorError::Decode {
                    reason: e.to_string(),
                };
                warn!(error = %err, "failed to decode message, skipping");
                self.metrics.decode_errors_total.inc();
                return;
            }
        };

        let truncated_before = self
            .store
            .get_window(&event.service)
            .map(|w| w.truncated_count())
            .unwrap_or(0);

        self.store
            .record(&event.service, event.latency_ms, event.error);

        if let Some(window) = self.store.get_window(&event.service) {
            if window.truncated_count() > truncated_before {
                self.metrics
                    .windows_truncated_total
                    .with_label_values(&[&event.service])
                    .inc();
            }
        }

        let status_code = event.status_code.to_string();
        self.metrics
            .requests_total
            .with_label_values(&[&event.service, &event.endpoint, &event.region, &status_code])
            .inc();
        self.metrics
            .request_latency_ms
            .with_label_values(&[&event.service, &event.endpoint, &event.region])
            .observe(event.latency_ms);
        if event.error {
            self.metrics
                .errors_total
                .with_label_values(&[&event.service, &event.endpoint, &event.region])
                .inc();
        }
        self.metrics
            .active_services
            .set(self.store.list_services().len() as i64);

        self.processed_count += 1;

        if self.processed_count % 1000 == 0 {
            info!(count = self.processed_count, "processed events");
        }

        if self.processed_count % self.config.detection_interval_messages == 0 {
            let violations = self.detector.detect(&self.store);
            for violation in &violations {
                self.publisher.publish(violation).await;
            }
        }
    }

    async fn shutdown(mut self) {
        info!(total_processed = self.processed_count, "shutting down stream processor");
        let _ = self.consumer.close().await;
        let flush_timeout = Duration::from_millis(self.config.shutdown_flush_timeout_ms);
        if tokio::time::timeout(flush_timeout, self.publisher.flush())
            .await
            .is_err()
        {
            warn!("publisher flush exceeded shutdown timeout");
        }
        self.state = LoopState::Closed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::InMemoryBus;

    fn test_config() -> Config {
        Config {
            detection_interval_messages: 2,
            consecutive_windows_for_alert: 1,
            poll_timeout_ms: 20,
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn malformed_message_is_skipped_and_counted() {
        let bus = InMemoryBus::new();
        let config = test_config();
        let metrics = Arc::new(MetricsRegistry::new());
        let mut loop_ = IngestLoop::new(config, bus.consumer(), bus.producer(), metrics.clone());

        loop_
            .process_message(BusMessage {
                key: "x".to_string(),
                payload: b"not json".to_vec(),
            })
            .await;

        assert_eq!(metrics.decode_errors_total.get(), 1);
        assert!(loop_.store.list_services().is_empty());
    }

    #[tokio::test]
    async fn valid_message_is_recorded_and_metrics_updated() {
        let bus = InMemoryBus::new();
        let config = test_config();
        let metrics = Arc::new(MetricsRegistry::new());
        let mut loop_ = IngestLoop::new(config, bus.consumer(), bus.producer(), metrics);

        loop_
            .process_message(BusMessage {
                key: "api".to_string(),
                payload: br#"{"service":"api","latency_ms":120.5,"error":false}"#.to_vec(),
            })
            .await;

        assert_eq!(loop_.store.get_window("api").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_fields_use_documented_defaults() {
        let config = test_config();
        let metrics = Arc::new(MetricsRegistry::new());
        let bus = InMemoryBus::new();
        let mut loop_ = IngestLoop::new(config, bus.consumer(), bus.producer(), metrics);

        loop_
            .process_message(BusMessage {
                key: "x".to_string(),
                payload: b"{}".to_vec(),
            })
            .await;

        assert!(loop_.store.get_window("unknown").is_some());
    }

    #[tokio::test]
    async fn run_reaches_closed_when_cancelled_via_raw_token() {
        // Mirrors how main.rs shuts down: it cancels the cloned token
        // directly rather than calling stop(), because run() already
        // consumed the loop by the time a signal arrives. Draining must
        // still be entered on this path, not just when stop() is called.
        let config = test_config();
        let metrics = Arc::new(MetricsRegistry::new());
        let bus = InMemoryBus::new();
        let loop_ = IngestLoop::new(config, bus.consumer(), bus.producer(), metrics);
        let token = loop_.cancellation_token();

        let handle = tokio::spawn(loop_.run());
        token.cancel();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("run() should complete promptly after cancellation")
            .expect("run() task should not panic");
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let config = test_config();
        let metrics = Arc::new(MetricsRegistry::new());
        let bus = InMemoryBus::new();
        let mut loop_ = IngestLoop::new(config, bus.consumer(), bus.producer(), metrics);
        loop_.state = LoopState::Running;
        loop_.stop();
        assert_eq!(loop_.state(), LoopState::Draining);
        loop_.stop(); // no-op from Draining
        assert_eq!(loop_.state(), LoopState::Draining);
    }
}
