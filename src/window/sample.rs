use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Hard cap on samples retained per service, independent of the time-based
/// horizon. An independent backstop against unbounded memory growth under
/// sustained high-cardinality traffic.
const SAMPLE_CAP: usize = 10_000;

/// A single per-request observation.
#[derive(Debug, Clone, Copy)]
pub struct MetricSample {
    pub timestamp: Instant,
    pub latency_ms: f64,
    pub error: bool,
}

/// Sliding window of metric samples for one service.
///
/// Samples are weakly ordered by timestamp, newest appended at the tail.
/// `prune` removes samples older than the configured horizon; independent
/// of that, the `SAMPLE_CAP` hard cap evicts the oldest sample whenever the
/// buffer would otherwise grow past it, which can truncate the window
/// below the time horizon under bursts. `truncated_count` tracks how often
/// that happened so the behavior is observable rather than silent.
#[derive(Debug, Default)]
pub struct ServiceWindow {
    samples: VecDeque<MetricSample>,
    truncated_count: u64,
}

impl ServiceWindow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_sample(&mut self, latency_ms: f64, error: bool) {
        self.samples.push_back(MetricSample {
            timestamp: Instant::now(),
            latency_ms,
            error,
        });
        if self.samples.len() > SAMPLE_CAP {
            self.samples.pop_front();
            self.truncated_count += 1;
        }
    }

    /// Removes samples older than `window_seconds` from the head.
    pub fn prune(&mut self, window_seconds: u64) {
        let horizon = Duration::from_secs(window_seconds);
        let now = Instant::now();
        while let Some(front) = self.samples.front() {
            if now.duration_since(front.timestamp) > horizon {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn truncated_count(&self) -> u64 {
        self.truncated_count
    }

    /// Nearest-rank P99: sort ascending, index `min(floor(n * 0.99), n - 1)`.
    /// Ties are broken toward higher values because of truncation; exact
    /// percentile accuracy is not a goal at fleet scale.
    pub fn p99_latency(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        let mut latencies: Vec<f64> = self.samples.iter().map(|s| s.latency_ms).collect();
        latencies.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let n = latencies.len();
        let idx = ((n as f64) * 0.99) as usize;
        Some(latencies[idx.min(n - 1)])
    }

    pub fn error_rate(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        let errors = self.samples.iter().filter(|s| s.error).count();
        Some(errors as f64 / self.samples.len() as f64)
    }

    /// Average requests-per-second over the configured horizon — NOT the
    /// instantaneous rate, and not based on the span between the oldest and
    /// newest sample. This is the definition the rule set evaluates
    /// `traffic_drop_threshold` against; preserve it as-is.
    pub fn rps(&self, window_seconds: u64) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        Some(self.samples.len() as f64 / window_seconds as f64)
    }

    #[cfg(test)]
    pub(crate) fn oldest_timestamp(&self) -> Option<Instant> {
        self.samples.front().map(|s| s.timestamp)
    }
}
