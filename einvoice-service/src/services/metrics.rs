//! Metrics collection for einvoice-service.
//!
//! HTTP metrics go through the `metrics` recorder; pipeline counters live in
//! a dedicated Prometheus registry. Both are rendered by [`get_metrics`].

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use prometheus::{IntCounter, IntCounterVec, Opts, Registry};
use std::sync::OnceLock;

pub static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
pub static PROMETHEUS_REGISTRY: OnceLock<Registry> = OnceLock::new();
pub static PROVIDER_CALLS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static SUBMISSIONS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static INVOICES_CREATED_TOTAL: OnceLock<IntCounter> = OnceLock::new();

/// Install the recorder and register pipeline counters.
pub fn init_metrics() -> anyhow::Result<()> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    if METRICS_HANDLE.set(handle).is_err() {
        anyhow::bail!("metrics already initialized");
    }

    let registry = Registry::new();

    let provider_calls = IntCounterVec::new(
        Opts::new(
            "einvoice_provider_calls_total",
            "E-invoice provider calls by provider and outcome",
        ),
        &["provider", "status"],
    )?;

    let submissions = IntCounterVec::new(
        Opts::new(
            "einvoice_submissions_total",
            "Invoice submissions by final outcome",
        ),
        &["outcome"],
    )?;

    let created = IntCounter::new("einvoice_invoices_created_total", "Invoices created")?;

    registry.register(Box::new(provider_calls.clone()))?;
    registry.register(Box::new(submissions.clone()))?;
    registry.register(Box::new(created.clone()))?;

    // Only reachable after a successful METRICS_HANDLE.set above.
    let _ = PROMETHEUS_REGISTRY.set(registry);
    let _ = PROVIDER_CALLS_TOTAL.set(provider_calls);
    let _ = SUBMISSIONS_TOTAL.set(submissions);
    let _ = INVOICES_CREATED_TOTAL.set(created);

    Ok(())
}

/// Get metrics output in Prometheus text format.
pub fn get_metrics() -> String {
    let mut output = METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_else(|| "# Metrics recorder not initialized\n".to_string());

    if let Some(registry) = PROMETHEUS_REGISTRY.get() {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&registry.gather(), &mut buffer).ok();
        if let Ok(custom_metrics) = String::from_utf8(buffer) {
            output.push_str(&custom_metrics);
        }
    }

    output
}

pub fn record_provider_call(provider: &str, status: &str) {
    if let Some(counter) = PROVIDER_CALLS_TOTAL.get() {
        counter.with_label_values(&[provider, status]).inc();
    }
}

pub fn record_submission(outcome: &str) {
    if let Some(counter) = SUBMISSIONS_TOTAL.get() {
        counter.with_label_values(&[outcome]).inc();
    }
}

pub fn record_invoice_created() {
    if let Some(counter) = INVOICES_CREATED_TOTAL.get() {
        counter.inc();
    }
}
