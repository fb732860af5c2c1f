//! Contract instruments on the global OpenTelemetry meter, exported through a
//! Prometheus registry once `init_metrics` has run.

use std::time::Duration;

use anyhow::Result;
use once_cell::sync::{Lazy, OnceCell};
use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry::{global, KeyValue};
use opentelemetry_sdk::metrics::SdkMeterProvider;
use prometheus::{Encoder, Registry, TextEncoder};
use tracing::info;

static PROM_REGISTRY: OnceCell<Registry> = OnceCell::new();

/// Installs an SDK meter provider backed by the Prometheus exporter as the
/// global provider. Must run before the first contract call: instruments bind
/// to whichever provider is global when `LEDGER_METRICS` is first touched.
pub fn init_metrics() -> Result<()> {
    PROM_REGISTRY.get_or_try_init(|| -> Result<Registry> {
        let registry = Registry::new();
        let exporter = opentelemetry_prometheus::exporter()
            .with_registry(registry.clone())
            .build()?;
        let provider = SdkMeterProvider::builder().with_reader(exporter).build();
        global::set_meter_provider(provider);
        info!(target: "fedledger", "prometheus exporter installed");
        Ok(registry)
    })?;
    Ok(())
}

/// Text exposition of everything recorded so far; `None` before `init_metrics`.
pub fn render_metrics() -> Result<Option<String>> {
    let Some(registry) = PROM_REGISTRY.get() else {
        return Ok(None);
    };
    let mut buf = Vec::new();
    TextEncoder::new().encode(&registry.gather(), &mut buf)?;
    Ok(Some(String::from_utf8(buf)?))
}

pub struct LedgerMetrics {
    pub transactions_total: Counter<u64>,
    pub submissions_total: Counter<u64>,
    pub rounds_completed_total: Counter<u64>,
    pub participants_total: Counter<u64>,
    pub unresolved_models_total: Counter<u64>,
    pub transition_latency_ms: Histogram<f64>,
}

static LEDGER_METER: Lazy<Meter> = Lazy::new(|| global::meter("fedledger"));

pub static LEDGER_METRICS: Lazy<LedgerMetrics> = Lazy::new(|| {
    LedgerMetrics {
        transactions_total: LEDGER_METER.u64_counter("fedledger_transactions_total")
            .with_description("Contract operations by function and outcome")
            .build(),
        submissions_total: LEDGER_METER.u64_counter("fedledger_local_model_submissions_total")
            .with_description("Accepted local model submissions")
            .build(),
        rounds_completed_total: LEDGER_METER.u64_counter("fedledger_rounds_completed_total")
            .with_description("Aggregation transitions committed")
            .build(),
        participants_total: LEDGER_METER.u64_counter("fedledger_participants_total")
            .with_description("Model ids passed to committed aggregations")
            .build(),
        unresolved_models_total: LEDGER_METER.u64_counter("fedledger_unresolved_models_total")
            .with_description("Aggregation inputs that did not resolve to a stored model")
            .build(),
        transition_latency_ms: LEDGER_METER.f64_histogram("fedledger_transition_latency")
            .with_description("Contract operation latency (ms)")
            .with_unit("ms")
            .build(),
    }
});

pub fn record_transaction(function: &'static str, outcome: &'static str, elapsed: Duration) {
    let attrs = [KeyValue::new("function", function), KeyValue::new("outcome", outcome)];
    LEDGER_METRICS.transactions_total.add(1, &attrs);
    LEDGER_METRICS
        .transition_latency_ms
        .record(elapsed.as_secs_f64() * 1000.0, &attrs[..1]);
}
