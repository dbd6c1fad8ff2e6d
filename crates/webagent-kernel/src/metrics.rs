use std::time::Duration;

use once_cell::sync::{Lazy, OnceCell};
use prometheus::{
    histogram_opts, Encoder, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use tracing::error;

static GLOBAL_REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);
static REGISTER_ONCE: OnceCell<()> = OnceCell::new();
static STEP_OUTCOMES: OnceCell<IntCounterVec> = OnceCell::new();
static STEP_LATENCY: OnceCell<HistogramVec> = OnceCell::new();
static DECISION_ATTEMPTS: OnceCell<IntCounterVec> = OnceCell::new();
static ACTIVE_SESSIONS: OnceCell<IntGauge> = OnceCell::new();

pub fn register_metrics() {
    REGISTER_ONCE.get_or_init(|| {
        let registry = global_registry();
        register_step_metrics(registry);
        register_session_metrics(registry);
    });
}

pub fn global_registry() -> &'static Registry {
    &GLOBAL_REGISTRY
}

fn register_step_metrics(registry: &Registry) {
    let outcomes = IntCounterVec::new(
        Opts::new(
            "webagent_steps_total",
            "Step requests grouped by outcome kind",
        ),
        &["outcome"],
    )
    .expect("create step outcome counter");
    if let Err(err) = registry.register(Box::new(outcomes.clone())) {
        error!(?err, "failed to register step outcome counter");
    }
    let _ = STEP_OUTCOMES.set(outcomes);

    let latency = HistogramVec::new(
        histogram_opts!(
            "webagent_step_latency_ms",
            "End-to-end latency of one step request (milliseconds)",
            vec![5.0, 10.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2000.0, 5000.0, 10000.0, 30000.0, 60000.0]
        ),
        &["outcome"],
    )
    .expect("create step latency histogram");
    if let Err(err) = registry.register(Box::new(latency.clone())) {
        error!(?err, "failed to register step latency histogram");
    }
    let _ = STEP_LATENCY.set(latency);

    let attempts = IntCounterVec::new(
        Opts::new(
            "webagent_decision_attempts_total",
            "Model calls made by the decision engine grouped by result",
        ),
        &["result"],
    )
    .expect("create decision attempts counter");
    if let Err(err) = registry.register(Box::new(attempts.clone())) {
        error!(?err, "failed to register decision attempts counter");
    }
    let _ = DECISION_ATTEMPTS.set(attempts);
}

fn register_session_metrics(registry: &Registry) {
    let active = IntGauge::new(
        "webagent_active_sessions",
        "Sessions currently held by the orchestrator",
    )
    .expect("create active sessions gauge");
    if let Err(err) = registry.register(Box::new(active.clone())) {
        error!(?err, "failed to register active sessions gauge");
    }
    let _ = ACTIVE_SESSIONS.set(active);
}

pub fn record_step(outcome: &str, elapsed: Duration) {
    register_metrics();
    if let Some(counter) = STEP_OUTCOMES.get() {
        counter.with_label_values(&[outcome]).inc();
    }
    if let Some(histogram) = STEP_LATENCY.get() {
        histogram
            .with_label_values(&[outcome])
            .observe(elapsed.as_secs_f64() * 1000.0);
    }
}

/// `accepted` is the number of successful calls (0 or 1), `rejected` the rest.
pub fn record_decision_attempts(accepted: u32, rejected: u32) {
    register_metrics();
    if let Some(counter) = DECISION_ATTEMPTS.get() {
        if accepted > 0 {
            counter
                .with_label_values(&["accepted"])
                .inc_by(u64::from(accepted));
        }
        if rejected > 0 {
            counter
                .with_label_values(&["rejected"])
                .inc_by(u64::from(rejected));
        }
    }
}

pub fn set_active_sessions(count: usize) {
    register_metrics();
    if let Some(gauge) = ACTIVE_SESSIONS.get() {
        gauge.set(count as i64);
    }
}

/// Prometheus text exposition of every registered metric.
pub fn render() -> Result<String, prometheus::Error> {
    register_metrics();
    let encoder = TextEncoder::new();
    let metric_families = global_registry().gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}
