use std::collections::HashMap;

use super::sample::ServiceWindow;

/// Per-service sliding-window state. Entries are created lazily on first
/// observation and never removed during the process lifetime — acceptable
/// because service cardinality is bounded by the emitting fleet.
#[derive(Debug, Default)]
pub struct WindowStore {
    window_size_seconds: u64,
    windows: HashMap<String, ServiceWindow>,
}

impl WindowStore {
    pub fn new(window_size_seconds: u64) -> Self {
        Self {
            window_size_seconds,
            windows: HashMap::new(),
        }
    }

    /// Appends a sample for `service`, creating its window on first use,
    /// then prunes that window to the configured horizon.
    pub fn record(&mut self, service: &str, latency_ms: f64, error: bool) {
        let window = self
            .windows
            .entry(service.to_string())
            .or_insert_with(ServiceWindow::new);
        window.add_sample(latency_ms, error);
        window.prune(self.window_size_seconds);
    }

    pub fn get_window(&self, service: &str) -> Option<&ServiceWindow> {
        self.windows.get(service)
    }

    pub fn list_services(&self) -> Vec<String> {
        self.windows.keys().cloned().collect()
    }

    pub fn window_size_seconds(&self) -> u64 {
        self.window_size_seconds
    }
}
