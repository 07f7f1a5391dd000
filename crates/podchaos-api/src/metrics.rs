//! Request timing and Prometheus text exposition.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Counts simulated requests served by `/` and their total latency.
#[derive(Debug, Default)]
pub struct RequestTimer {
    count: AtomicU64,
    total_micros: AtomicU64,
}

impl RequestTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, elapsed: Duration) {
        self.count.fetch_add(1, Ordering::Relaxed);
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.total_micros.fetch_add(micros, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> Duration {
        Duration::from_micros(self.total_micros.load(Ordering::Relaxed))
    }
}

/// Point-in-time view of every exported gauge.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsView {
    pub alive: bool,
    pub ready: bool,
    pub memory_observed_percent: u32,
    pub memory_target_percent: u32,
    pub stress_intensity: u32,
    pub stress_processes: usize,
    pub requests_total: u64,
    pub request_seconds_total: f64,
}

/// Render a metrics view in the Prometheus text exposition format.
pub fn render_prometheus(view: &MetricsView) -> String {
    let mut out = String::new();

    gauge(
        &mut out,
        "podchaos_liveness",
        "1 while the liveness probe reports alive.",
        u8::from(view.alive),
    );
    gauge(
        &mut out,
        "podchaos_readiness",
        "1 while the readiness probe reports ready.",
        u8::from(view.ready),
    );
    gauge(
        &mut out,
        "podchaos_memory_observed_percent",
        "Observed share of the memory allowance in use.",
        view.memory_observed_percent,
    );
    gauge(
        &mut out,
        "podchaos_memory_target_percent",
        "Memory utilization the pressure loop steers toward.",
        view.memory_target_percent,
    );
    gauge(
        &mut out,
        "podchaos_stress_intensity",
        "Intensity of the most recent stress session.",
        view.stress_intensity,
    );
    gauge(
        &mut out,
        "podchaos_stress_processes",
        "Live load generator processes.",
        view.stress_processes,
    );

    out.push_str("# HELP podchaos_requests_total Simulated requests served.\n");
    out.push_str("# TYPE podchaos_requests_total counter\n");
    out.push_str(&format!("podchaos_requests_total {}\n", view.requests_total));

    out.push_str("# HELP podchaos_request_seconds_total Time spent in simulated requests.\n");
    out.push_str("# TYPE podchaos_request_seconds_total counter\n");
    out.push_str(&format!(
        "podchaos_request_seconds_total {:.3}\n",
        view.request_seconds_total
    ));

    out
}

fn gauge(out: &mut String, name: &str, help: &str, value: impl std::fmt::Display) {
    out.push_str(&format!("# HELP {name} {help}\n"));
    out.push_str(&format!("# TYPE {name} gauge\n"));
    out.push_str(&format!("{name} {value}\n"));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_view() -> MetricsView {
        MetricsView {
            alive: true,
            ready: false,
            memory_observed_percent: 41,
            memory_target_percent: 40,
            stress_intensity: 3,
            stress_processes: 121,
            requests_total: 7,
            request_seconds_total: 3.5,
        }
    }

    #[test]
    fn render_gauges() {
        let output = render_prometheus(&test_view());

        assert!(output.contains("# TYPE podchaos_liveness gauge\npodchaos_liveness 1\n"));
        assert!(output.contains("podchaos_readiness 0\n"));
        assert!(output.contains("podchaos_memory_observed_percent 41\n"));
        assert!(output.contains("podchaos_memory_target_percent 40\n"));
        assert!(output.contains("podchaos_stress_intensity 3\n"));
        assert!(output.contains("podchaos_stress_processes 121\n"));
    }

    #[test]
    fn render_counters() {
        let output = render_prometheus(&test_view());
        assert!(output.contains("# TYPE podchaos_requests_total counter\n"));
        assert!(output.contains("podchaos_requests_total 7\n"));
        assert!(output.contains("podchaos_request_seconds_total 3.500\n"));
    }

    #[test]
    fn timer_accumulates() {
        let timer = RequestTimer::new();
        timer.record(Duration::from_millis(250));
        timer.record(Duration::from_millis(750));
        assert_eq!(timer.count(), 2);
        assert_eq!(timer.total(), Duration::from_secs(1));
    }
}
