use crate::window::ServiceWindow;

use super::{Rule, RuleViolation, Severity};

/// Fires when the error rate strictly exceeds the configured threshold.
pub struct HighErrorRate {
    threshold: f64,
}

impl HighErrorRate {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

impl Rule for HighErrorRate {
    fn name(&self) -> &'static str {
        "HighErrorRate"
    }

    fn evaluate(&mut self, service: &str, window: &ServiceWindow) -> Option<RuleViolation> {
        let error_rate = window.error_rate()?;
        if error_rate > self.threshold {
            Some(RuleViolation {
                rule_name: self.name(),
                service: service.to_string(),
                severity: Severity::Critical,
                value: error_rate,
                threshold: self.threshold,
                message: format!(
                    "Error rate {:.1}% exceeds threshold {:.1}%",
                    error_rate * 100.0,
                    self.threshold * 100.0
                ),
            })
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn does_not_fire_below_threshold() {
        let mut rule = HighErrorRate::new(0.05);
        let mut window = ServiceWindow::new();
        for _ in 0..100 {
            window.add_sample(10.0, false);
        }
        assert!(rule.evaluate("api", &window).is_none());
    }

    #[test]
    fn fires_strictly_above_threshold() {
        let mut rule = HighErrorRate::new(0.05);
        let mut window = ServiceWindow::new();
        for _ in 0..90 {
            window.add_sample(10.0, false);
        }
        for _ in 0..10 {
            window.add_sample(10.0, true);
        }
        let violation = rule.evaluate("api", &window).expect("should fire");
        assert_eq!(violation.rule_name, "HighErrorRate");
        assert_eq!(violation.severity, Severity::Critical);
        assert!((violation.value - 0.10).abs() < 1e-9);
    }

    #[test]
    fn exactly_at_threshold_does_not_fire() {
        let mut rule = HighErrorRate::new(0.10);
        let mut window = ServiceWindow::new();
        for _ in 0..90 {
            window.add_sample(10.0, false);
        }
        for _ in 0..10 {
            window.add_sample(10.0, true);
        }
        assert!(rule.evaluate("api", &window).is_none());
    }
}
