use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, info};

use crate::bus::{BusMessage, EventProducer};
use crate::rules::RuleViolation;

/// Outbound alert payload, matching the wire contract exactly: field names,
/// nesting, and string-formatted numeric annotations are all part of the
/// contract consumers observe.
#[derive(Debug, Serialize)]
pub struct AlertPayload {
    pub alert_name: String,
    pub service: String,
    pub severity: String,
    pub timestamp: String,
    pub fingerprint: String,
    pub labels: HashMap<String, String>,
    pub annotations: HashMap<String, String>,
}

fn fingerprint(violation: &RuleViolation) -> String {
    format!("{}:{}", violation.rule_name, violation.service)
}

fn build_payload(violation: &RuleViolation, fp: &str) -> AlertPayload {
    let mut labels = HashMap::new();
    labels.insert("service".to_string(), violation.service.clone());
    labels.insert("alertname".to_string(), violation.rule_name.to_string());
    labels.insert("severity".to_string(), violation.severity.as_str().to_string());

    let mut annotations = HashMap::new();
    annotations.insert("summary".to_string(), violation.message.clone());
    annotations.insert(
        "value".to_string(),
        format!("{:.4}", violation.value),
    );
    annotations.insert("threshold".to_string(), violation.threshold.to_string());

    AlertPayload {
        alert_name: violation.rule_name.to_string(),
        service: violation.service.clone(),
        severity: violation.severity.as_str().to_string(),
        timestamp: Utc::now().to_rfc3339(),
        fingerprint: fp.to_string(),
        labels,
        annotations,
    }
}

/// Tracks the instant each alert fingerprint was last successfully emitted,
/// for cooldown-based deduplication.
#[derive(Debug, Default)]
pub struct ActiveAlerts {
    last_fired: HashMap<String, Instant>,
}

impl ActiveAlerts {
    pub fn new() -> Self {
        Self::default()
    }

    fn last_fired_at(&self, fingerprint: &str) -> Option<Instant> {
        self.last_fired.get(fingerprint).copied()
    }

    fn record_fired(&mut self, fingerprint: &str, at: Instant) {
        self.last_fired.insert(fingerprint.to_string(), at);
    }
}

/// Publishes alerts to the outbound topic with fingerprint-based cooldown.
///
/// Fire-and-forget at the transport level: the producer's `Result` only
/// reports enqueue failure, not broker acknowledgment. On failure the
/// cooldown state is left untouched so the next detection cycle may retry.
pub struct AlertPublisher<P: EventProducer> {
    producer: P,
    alerts_topic: String,
    cooldown: Duration,
    active: ActiveAlerts,
}

impl<P: EventProducer> AlertPublisher<P> {
    pub fn new(producer: P, alerts_topic: String, cooldown_seconds: u64) -> Self {
        Self {
            producer,
            alerts_topic,
            cooldown: Duration::from_secs(cooldown_seconds),
            active: ActiveAlerts::new(),
        }
    }

    /// Drains any buffered sends in the underlying producer, bounded by the
    /// caller's own timeout. Called once during shutdown.
    pub async fn flush(&mut self) -> Result<(), crate::bus::BusError> {
        self.producer.flush().await
    }

    /// Publishes a single violation, respecting the per-fingerprint
    /// cooldown. Returns `true` if the alert was actually emitted.
    pub async fn publish(&mut self, violation: &RuleViolation) -> bool {
        let fp = fingerprint(violation);
        let now = Instant::now();

        if let Some(last) = self.active.last_fired_at(&fp) {
            if now.duration_since(last) < self.cooldown {
                debug!(fingerprint = %fp, "alert suppressed by cooldown");
                return false;
            }
        }

        let payload = build_payload(violation, &fp);
        let body = match serde_json::to_vec(&payload) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(error = %e, "failed to serialize alert payload");
                return false;
            }
        };

        let message = BusMessage {
            key: fp.clone(),
            payload: body,
        };

        match self.producer.produce(&self.alerts_topic, message).await {
            Ok(()) => {
                self.active.record_fired(&fp, now);
                info!(
                    alert_name = violation.rule_name,
                    service = %violation.service,
                    severity = violation.severity.as_str(),
                    "alert published"
                );
                true
            }
            Err(e) => {
                let err = crate::error::ProcessorError::TransientBus {
                    reason: e.to_string(),
                };
                error!(error = %err, "failed to publish alert");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{FailingProducer, InMemoryBus};
    use crate::rules::Severity;

    fn sample_violation() -> RuleViolation {
        RuleViolation {
            rule_name: "HighLatencyP99",
            service: "api-service".to_string(),
            severity: Severity::Warning,
            value: 512.3456,
            threshold: 500.0,
            message: "P99 latency 512.3ms exceeds threshold 500.0ms".to_string(),
        }
    }

    #[tokio::test]
    async fn first_publish_emits_and_second_is_suppressed_by_cooldown() {
        let bus = InMemoryBus::new();
        let mut publisher = AlertPublisher::new(bus.producer(), "alerts.fired".to_string(), 300);
        let violation = sample_violation();

        assert!(publisher.publish(&violation).await);
        assert!(!publisher.publish(&violation).await);
    }

    #[tokio::test]
    async fn publish_after_cooldown_elapses_emits_again() {
        let bus = InMemoryBus::new();
        let mut publisher = AlertPublisher::new(bus.producer(), "alerts.fired".to_string(), 0);
        let violation = sample_violation();

        assert!(publisher.publish(&violation).await);
        // zero-second cooldown: the next publish is immediately eligible.
        assert!(publisher.publish(&violation).await);
    }

    #[tokio::test]
    async fn bus_rejection_returns_false_and_leaves_cooldown_untouched() {
        let mut publisher = AlertPublisher::new(FailingProducer, "alerts.fired".to_string(), 300);
        let violation = sample_violation();

        assert!(!publisher.publish(&violation).await);
        // cooldown state was never set, so a retry is immediately eligible
        // again rather than being suppressed by a cooldown that was never
        // actually entered.
        assert!(publisher
            .active
            .last_fired_at(&fingerprint(&violation))
            .is_none());
    }

    #[test]
    fn fingerprint_is_stable_for_equal_rule_and_service() {
        let a = sample_violation();
        let mut b = sample_violation();
        b.value = 999.0;
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn payload_rounds_value_to_four_decimals() {
        let violation = sample_violation();
        let payload = build_payload(&violation, &fingerprint(&violation));
        assert_eq!(payload.annotations.get("value").unwrap(), "512.3456");
        assert_eq!(payload.fingerprint, "HighLatencyP99:api-service");
    }
}
