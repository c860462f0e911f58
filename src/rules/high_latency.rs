use crate::window::ServiceWindow;

use super::{Rule, RuleViolation, Severity};

/// Fires when P99 latency strictly exceeds the configured threshold.
pub struct HighLatencyP99 {
    threshold_ms: f64,
}

impl HighLatencyP99 {
    pub fn new(threshold_ms: f64) -> Self {
        Self { threshold_ms }
    }
}

impl Rule for HighLatencyP99 {
    fn name(&self) -> &'static str {
        "HighLatencyP99"
    }

    fn evaluate(&mut self, service: &str, window: &ServiceWindow) -> Option<RuleViolation> {
        let p99 = window.p99_latency()?;
        if p99 > self.threshold_ms {
            Some(RuleViolation {
                rule_name: self.name(),
                service: service.to_string(),
                severity: Severity::Warning,
                value: p99,
                threshold: self.threshold_ms,
                message: format!(
                    "P99 latency {p99:.1}ms exceeds threshold {:.1}ms",
                    self.threshold_ms
                ),
            })
        } else {
            None
        }
    }
}
