use std::collections::HashMap;

use tracing::warn;

use crate::config::Config;
use crate::rules::{HighErrorRate, HighLatencyP99, Rule, RuleViolation, TrafficDrop};
use crate::window::WindowStore;

/// Orchestrates the rule set over every known service's window, applying
/// consecutive-window confirmation before surfacing a violation.
///
/// The confirmation counter is keyed by `(service, rule_name)`, incremented
/// on every firing evaluation and reset to zero the moment a rule stops
/// firing. A violation is only surfaced once the counter reaches
/// `consecutive_windows_for_alert`; this guards against transient spikes at
/// the cost of a few cycles of detection lag.
pub struct AnomalyDetector {
    rules: Vec<Box<dyn Rule>>,
    consecutive: HashMap<(String, &'static str), u32>,
    required_consecutive: u32,
}

impl AnomalyDetector {
    pub fn new(config: &Config) -> Self {
        let rules: Vec<Box<dyn Rule>> = vec![
            Box::new(HighLatencyP99::new(config.latency_p99_threshold_ms)),
            Box::new(HighErrorRate::new(config.error_rate_threshold)),
            Box::new(TrafficDrop::new(
                config.traffic_drop_threshold,
                config.window_size_seconds,
            )),
        ];
        Self {
            rules,
            consecutive: HashMap::new(),
            required_consecutive: config.consecutive_windows_for_alert,
        }
    }

    /// Runs every rule against every known service's window once. Returns
    /// the violations confirmed this cycle; ordering is not a contract.
    pub fn detect(&mut self, store: &WindowStore) -> Vec<RuleViolation> {
        let mut surfaced = Vec::new();

        for service in store.list_services() {
            let window = match store.get_window(&service) {
                Some(w) => w,
                None => continue,
            };

            for rule in self.rules.iter_mut() {
                let key = (service.clone(), rule.name());
                match rule.evaluate(&service, window) {
                    Some(violation) => {
                        let count = self.consecutive.entry(key).or_insert(0);
                        *count += 1;
                        if *count >= self.required_consecutive {
                            warn!(
                                rule = violation.rule_name,
                                service = %violation.service,
                                value = violation.value,
                                threshold = violation.threshold,
                                consecutive_windows = *count,
                                "anomaly detected"
                            );
                            surfaced.push(violation);
                        }
                    }
                    None => {
                        self.consecutive.insert(key, 0);
                    }
                }
            }
        }

        surfaced
    }
}
