use std::collections::HashMap;

use crate::window::ServiceWindow;

use super::{Rule, RuleViolation, Severity};

/// Fires when observed RPS drops more than `threshold` fraction below a
/// per-service exponentially-smoothed baseline.
///
/// Baseline lives here, keyed by service, rather than on `ServiceWindow` —
/// this keeps windows pure aggregates and couples the stateful EMA to the
/// one rule that needs it.
pub struct TrafficDrop {
    threshold: f64,
    window_size_seconds: u64,
    baseline_rps: HashMap<String, f64>,
}

impl TrafficDrop {
    pub fn new(threshold: f64, window_size_seconds: u64) -> Self {
        Self {
            threshold,
            window_size_seconds,
            baseline_rps: HashMap::new(),
        }
    }

    #[cfg(test)]
    pub(crate) fn set_baseline(&mut self, service: &str, value: f64) {
        self.baseline_rps.insert(service.to_string(), value);
    }

    #[cfg(test)]
    pub(crate) fn baseline(&self, service: &str) -> Option<f64> {
        self.baseline_rps.get(service).copied()
    }
}

impl Rule for TrafficDrop {
    fn name(&self) -> &'static str {
        "TrafficDrop"
    }

    fn evaluate(&mut self, service: &str, window: &ServiceWindow) -> Option<RuleViolation> {
        let current = window.rps(self.window_size_seconds)?;

        let baseline = match self.baseline_rps.get(service) {
            Some(b) => *b,
            None => {
                self.baseline_rps.insert(service.to_string(), current);
                return None;
            }
        };

        let drop = if baseline > 0.0 {
            (baseline - current) / baseline
        } else {
            0.0
        };

        if drop > self.threshold {
            return Some(RuleViolation {
                rule_name: self.name(),
                service: service.to_string(),
                severity: Severity::Warning,
                value: drop,
                threshold: self.threshold,
                message: format!(
                    "RPS dropped {:.1}% from baseline {baseline:.1} to {current:.1}",
                    drop * 100.0
                ),
            });
        }

        // Gradual baseline update via EMA, only on the non-firing branch —
        // the baseline is frozen while an incident is active.
        self.baseline_rps
            .insert(service.to_string(), baseline * 0.95 + current * 0.05);
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window_with_sample_count(n: usize) -> ServiceWindow {
        let mut w = ServiceWindow::new();
        for _ in 0..n {
            w.add_sample(10.0, false);
        }
        w
    }

    #[test]
    fn seeds_baseline_on_first_evaluation_without_firing() {
        let mut rule = TrafficDrop::new(0.5, 60);
        let window = window_with_sample_count(60);
        assert!(rule.evaluate("api", &window).is_none());
        assert_eq!(rule.baseline("api"), Some(1.0));
    }

    #[test]
    fn fires_on_drop_beyond_threshold_and_freezes_baseline() {
        let mut rule = TrafficDrop::new(0.5, 1);
        rule.set_baseline("api", 10.0);
        // window_size=1s -> rps = sample count; 2 samples is well below half of baseline 10.0
        let thin_window = window_with_sample_count(2);
        let violation = rule
            .evaluate("api", &thin_window)
            .expect("should fire on large drop");
        assert_eq!(violation.rule_name, "TrafficDrop");
        assert!(violation.value > 0.5);
        // baseline must remain unchanged during the incident
        assert_eq!(rule.baseline("api"), Some(10.0));
    }

    #[test]
    fn ema_update_on_non_firing_branch() {
        let mut rule = TrafficDrop::new(0.5, 1);
        rule.set_baseline("api", 1.0);
        let window = {
            let mut w = ServiceWindow::new();
            w.add_sample(10.0, false); // rps = 1/1 = 1.0, equals baseline
            w
        };
        assert!(rule.evaluate("api", &window).is_none());
        // baseline unchanged when current == baseline (idempotent EMA step)
        assert!((rule.baseline("api").unwrap() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn empty_window_never_fires_and_does_not_seed_baseline() {
        let mut rule = TrafficDrop::new(0.5, 60);
        let window = ServiceWindow::new();
        assert!(rule.evaluate("api", &window).is_none());
        assert!(rule.baseline("api").is_none());
    }
}
