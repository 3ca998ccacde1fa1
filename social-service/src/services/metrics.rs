use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::OnceLock;

pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub static HTTP_REQUESTS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static HTTP_REQUEST_DURATION_SECONDS: OnceLock<HistogramVec> = OnceLock::new();
pub static RELATIONSHIP_TRANSITIONS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static AUTH_EVENTS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Build and register all collectors. Calling it twice keeps the first registry.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    if REGISTRY.get().is_some() {
        return Ok(());
    }
    let registry = Registry::new();

    let requests_total = IntCounterVec::new(
        Opts::new("http_requests_total", "Total number of HTTP requests"),
        &["method", "path", "status"],
    )?;
    let request_duration = HistogramVec::new(
        HistogramOpts::new(
            "http_request_duration_seconds",
            "HTTP request duration in seconds",
        ),
        &["method", "path", "status"],
    )?;
    let transitions_total = IntCounterVec::new(
        Opts::new(
            "relationship_transitions_total",
            "Relationship transitions by action and outcome",
        ),
        &["action", "outcome"],
    )?;
    let auth_events_total = IntCounterVec::new(
        Opts::new(
            "auth_events_total",
            "Session authentication events by kind and outcome",
        ),
        &["event", "outcome"],
    )?;

    registry.register(Box::new(requests_total.clone()))?;
    registry.register(Box::new(request_duration.clone()))?;
    registry.register(Box::new(transitions_total.clone()))?;
    registry.register(Box::new(auth_events_total.clone()))?;

    let _ = REGISTRY.set(registry);
    let _ = HTTP_REQUESTS_TOTAL.set(requests_total);
    let _ = HTTP_REQUEST_DURATION_SECONDS.set(request_duration);
    let _ = RELATIONSHIP_TRANSITIONS_TOTAL.set(transitions_total);
    let _ = AUTH_EVENTS_TOTAL.set(auth_events_total);
    Ok(())
}

pub fn record_transition(action: &str, outcome: &str) {
    if let Some(counter) = RELATIONSHIP_TRANSITIONS_TOTAL.get() {
        counter.with_label_values(&[action, outcome]).inc();
    }
}

pub fn record_auth_event(event: &str, outcome: &str) {
    if let Some(counter) = AUTH_EVENTS_TOTAL.get() {
        counter.with_label_values(&[event, outcome]).inc();
    }
}

pub fn get_metrics() -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();

    let registry = match REGISTRY.get() {
        Some(r) => r,
        None => {
            tracing::error!("Metrics registry not initialized");
            return "# Metrics registry not initialized\n".to_string();
        }
    };

    if let Err(e) = encoder.encode(&registry.gather(), &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return format!("# Failed to encode metrics: {}\n", e);
    }

    String::from_utf8(buffer).unwrap_or_else(|e| {
        tracing::error!("Failed to convert metrics to UTF-8: {}", e);
        format!("# Failed to convert metrics to UTF-8: {}\n", e)
    })
}
