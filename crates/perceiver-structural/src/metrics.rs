//! Telemetry helpers for the HTML reducer.
//!
//! Lightweight counters + latency aggregates so the CLI and the server can
//! surface reduction statistics without a metrics backend.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

static REDUCE_TOTAL: AtomicU64 = AtomicU64::new(0);
static REDUCE_DEGENERATE: AtomicU64 = AtomicU64::new(0);
static REDUCE_LAT_NS: AtomicU64 = AtomicU64::new(0);
static REDUCE_LAT_SAMPLES: AtomicU64 = AtomicU64::new(0);

static ELEMENTS_RETAINED: AtomicU64 = AtomicU64::new(0);
static ELEMENTS_DROPPED: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Copy, Serialize)]
pub struct MetricCounter {
    pub total: u64,
    pub avg_ms: f64,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ElementMetric {
    pub retained: u64,
    pub dropped: u64,
    pub drop_rate: f64,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct MetricSnapshot {
    pub reduce: MetricCounter,
    pub degenerate: u64,
    pub elements: ElementMetric,
}

pub fn record_reduction(retained: usize, dropped: usize, degenerate: bool, duration: Duration) {
    REDUCE_TOTAL.fetch_add(1, Ordering::Relaxed);
    if degenerate {
        REDUCE_DEGENERATE.fetch_add(1, Ordering::Relaxed);
    }
    ELEMENTS_RETAINED.fetch_add(retained as u64, Ordering::Relaxed);
    ELEMENTS_DROPPED.fetch_add(dropped as u64, Ordering::Relaxed);
    record_latency(&REDUCE_LAT_NS, &REDUCE_LAT_SAMPLES, duration);
}

pub fn snapshot() -> MetricSnapshot {
    MetricSnapshot {
        reduce: make_counter(
            REDUCE_TOTAL.load(Ordering::Relaxed),
            REDUCE_LAT_NS.load(Ordering::Relaxed),
            REDUCE_LAT_SAMPLES.load(Ordering::Relaxed),
        ),
        degenerate: REDUCE_DEGENERATE.load(Ordering::Relaxed),
        elements: make_element_metric(
            ELEMENTS_RETAINED.load(Ordering::Relaxed),
            ELEMENTS_DROPPED.load(Ordering::Relaxed),
        ),
    }
}

fn make_counter(total: u64, nanos: u64, samples: u64) -> MetricCounter {
    let avg_ms = if samples == 0 {
        0.0
    } else {
        (nanos as f64 / samples as f64) / 1_000_000.0
    };
    MetricCounter { total, avg_ms }
}

fn make_element_metric(retained: u64, dropped: u64) -> ElementMetric {
    let total = retained + dropped;
    let drop_rate = if total == 0 {
        0.0
    } else {
        dropped as f64 * 100.0 / total as f64
    };
    ElementMetric {
        retained,
        dropped,
        drop_rate,
    }
}

fn record_latency(total_ns: &AtomicU64, samples: &AtomicU64, duration: Duration) {
    let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
    total_ns.fetch_add(nanos, Ordering::Relaxed);
    samples.fetch_add(1, Ordering::Relaxed);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reductions_accumulate() {
        let before = snapshot();
        record_reduction(3, 1, true, Duration::from_millis(2));
        let after = snapshot();
        assert!(after.reduce.total > before.reduce.total);
        assert!(after.degenerate > before.degenerate);
        assert!(after.elements.retained >= before.elements.retained + 3);
    }
}
