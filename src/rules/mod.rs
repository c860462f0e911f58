mod high_error_rate;
mod high_latency;
mod traffic_drop;

pub use high_error_rate::HighErrorRate;
pub use high_latency::HighLatencyP99;
pub use traffic_drop::TrafficDrop;

use crate::window::ServiceWindow;

/// Alert severity, carried verbatim into the outbound alert payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

/// A single rule evaluation result.
#[derive(Debug, Clone)]
pub struct RuleViolation {
    pub rule_name: &'static str,
    pub service: String,
    pub severity: Severity,
    pub value: f64,
    pub threshold: f64,
    pub message: String,
}

/// A pure function from a service's window to an optional violation.
///
/// `TrafficDrop` is the one rule with hidden state (a per-service baseline
/// map); the trait itself stays stateless-by-convention, requiring `&mut
/// self` only so that rule can update its baseline in place.
pub trait Rule: Send {
    fn name(&self) -> &'static str;
    fn evaluate(&mut self, service: &str, window: &ServiceWindow) -> Option<RuleViolation>;
}
