//! Prometheus metrics collection for chatterd.
//!
//! Tracks connection churn, intent throughput and failure codes, and event
//! fan-out volume. Exposed on the HTTP endpoint in `http.rs`.

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::OnceLock;

/// Global Prometheus registry for all metrics.
static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

/// Total connections accepted since startup.
static CONNECTIONS_TOTAL: OnceLock<IntCounter> = OnceLock::new();

/// Currently live connections.
static CONNECTIONS_ACTIVE: OnceLock<IntGauge> = OnceLock::new();

/// Intents received, by event name.
static INTENTS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Intents rejected, by event name and error code.
static INTENT_ERRORS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Events delivered to client connections (fan-out volume).
static EVENTS_OUT_TOTAL: OnceLock<IntCounter> = OnceLock::new();

/// Handshakes rejected before registration (bad credential).
static AUTH_REJECTED_TOTAL: OnceLock<IntCounter> = OnceLock::new();

/// Initialize the metrics registry. Must be called once at startup before
/// any metric is recorded; recording before init is a silent no-op.
pub fn init() {
    let r = registry();

    macro_rules! register {
        ($slot:ident, $init:expr) => {
            let m = $init.expect(concat!(stringify!($slot), " creation failed"));
            r.register(Box::new(m.clone())).ok();
            $slot.set(m).ok();
        };
    }

    register!(
        CONNECTIONS_TOTAL,
        IntCounter::with_opts(Opts::new(
            "chatterd_connections_total",
            "Connections accepted since startup"
        ))
    );
    register!(
        CONNECTIONS_ACTIVE,
        IntGauge::with_opts(Opts::new(
            "chatterd_connections_active",
            "Currently live connections"
        ))
    );
    register!(
        INTENTS_TOTAL,
        IntCounterVec::new(
            Opts::new("chatterd_intents_total", "Intents received by event name"),
            &["event"]
        )
    );
    register!(
        INTENT_ERRORS_TOTAL,
        IntCounterVec::new(
            Opts::new(
                "chatterd_intent_errors_total",
                "Intents rejected by event name and error code"
            ),
            &["event", "code"]
        )
    );
    register!(
        EVENTS_OUT_TOTAL,
        IntCounter::with_opts(Opts::new(
            "chatterd_events_out_total",
            "Events delivered to client connections"
        ))
    );
    register!(
        AUTH_REJECTED_TOTAL,
        IntCounter::with_opts(Opts::new(
            "chatterd_auth_rejected_total",
            "Handshakes rejected for bad credentials"
        ))
    );
}

pub fn connection_opened(active: usize) {
    if let Some(c) = CONNECTIONS_TOTAL.get() {
        c.inc();
    }
    if let Some(g) = CONNECTIONS_ACTIVE.get() {
        g.set(active as i64);
    }
}

pub fn connection_closed(active: usize) {
    if let Some(g) = CONNECTIONS_ACTIVE.get() {
        g.set(active as i64);
    }
}

pub fn intent_received(event: &str) {
    if let Some(c) = INTENTS_TOTAL.get() {
        c.with_label_values(&[event]).inc();
    }
}

pub fn intent_failed(event: &str, code: &str) {
    if let Some(c) = INTENT_ERRORS_TOTAL.get() {
        c.with_label_values(&[event, code]).inc();
    }
}

pub fn events_fanned_out(count: usize) {
    if let Some(c) = EVENTS_OUT_TOTAL.get() {
        c.inc_by(count as u64);
    }
}

pub fn auth_rejected() {
    if let Some(c) = AUTH_REJECTED_TOTAL.get() {
        c.inc();
    }
}

/// Render all metrics in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let families = registry().gather();
    let mut buffer = Vec::new();
    if encoder.encode(&families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
