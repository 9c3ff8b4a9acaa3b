// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Prometheus metrics for dnsync.
//!
//! Every metric carries the `dnsync_` prefix and lives in
//! [`METRICS_REGISTRY`], which [`serve`] exposes on `/metrics` next to a
//! `/healthz` liveness endpoint.
//!
//! # Metrics
//!
//! - **Source Metrics** - endpoints produced and source failures
//! - **Sync Metrics** - sync loop outcomes, duration and last success
//! - **Plan Metrics** - changes applied per action
//!
//! # Example
//!
//! ```rust,no_run
//! use dnsync::metrics::record_sync_success;
//!
//! record_sync_success(std::time::Duration::from_millis(250));
//! ```

use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use prometheus::{
    CounterVec, Encoder, Gauge, Histogram, HistogramOpts, Opts, Registry, TextEncoder,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::LazyLock;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::info;

/// Namespace prefix for all dnsync metrics
const METRICS_NAMESPACE: &str = "dnsync";

// ============================================================================
// Global Metrics Registry
// ============================================================================

/// Global Prometheus metrics registry
pub static METRICS_REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// ============================================================================
// Source Metrics
// ============================================================================

/// Endpoints produced by the sources on the last pass
pub static SOURCE_ENDPOINTS: LazyLock<Gauge> = LazyLock::new(|| {
    let gauge = Gauge::new(
        format!("{METRICS_NAMESPACE}_source_endpoints"),
        "Number of endpoints produced by the sources on the last sync",
    )
    .unwrap();
    METRICS_REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

/// Total number of failed source reads
///
/// Labels:
/// - `kind`: Error category (`kube`, `template`, `http`, ...)
pub static SOURCE_ERRORS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_source_errors_total"),
        "Total number of errors raised while collecting endpoints, by kind",
    );
    let counter = CounterVec::new(opts, &["kind"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Sync Metrics
// ============================================================================

/// Total number of sync passes by outcome
///
/// Labels:
/// - `status`: `success` or `error`
pub static SYNC_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_syncs_total"),
        "Total number of sync passes by status",
    );
    let counter = CounterVec::new(opts, &["status"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Duration of sync passes in seconds
pub static SYNC_DURATION_SECONDS: LazyLock<Histogram> = LazyLock::new(|| {
    let opts = HistogramOpts::new(
        format!("{METRICS_NAMESPACE}_sync_duration_seconds"),
        "Duration of sync passes in seconds",
    )
    .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]);
    let histogram = Histogram::with_opts(opts).unwrap();
    METRICS_REGISTRY
        .register(Box::new(histogram.clone()))
        .unwrap();
    histogram
});

/// Unix time of the last successful sync
pub static LAST_SYNC_TIMESTAMP_SECONDS: LazyLock<Gauge> = LazyLock::new(|| {
    let gauge = Gauge::new(
        format!("{METRICS_NAMESPACE}_last_sync_timestamp_seconds"),
        "Unix timestamp of the last successful sync",
    )
    .unwrap();
    METRICS_REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

/// Records the provider reported on the last pass
pub static PROVIDER_RECORDS: LazyLock<Gauge> = LazyLock::new(|| {
    let gauge = Gauge::new(
        format!("{METRICS_NAMESPACE}_provider_records"),
        "Number of records the provider reported on the last sync",
    )
    .unwrap();
    METRICS_REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

// ============================================================================
// Plan Metrics
// ============================================================================

/// Total number of planned record changes
///
/// Labels:
/// - `action`: `create`, `update` or `delete`
pub static PLAN_CHANGES_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_plan_changes_total"),
        "Total number of record changes planned, by action",
    );
    let counter = CounterVec::new(opts, &["action"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Helper Functions
// ============================================================================

/// Record how many endpoints the sources produced.
#[allow(clippy::cast_precision_loss)]
pub fn record_source_endpoints(count: usize) {
    SOURCE_ENDPOINTS.set(count as f64);
}

/// Record a source failure
///
/// # Arguments
/// * `kind` - Error category, see [`SourceError::kind`](crate::errors::SourceError::kind)
pub fn record_source_error(kind: &str) {
    SOURCE_ERRORS_TOTAL.with_label_values(&[kind]).inc();
}

#[allow(clippy::cast_precision_loss)]
pub fn record_provider_records(count: usize) {
    PROVIDER_RECORDS.set(count as f64);
}

/// Record a successful sync pass
pub fn record_sync_success(duration: Duration) {
    SYNC_TOTAL.with_label_values(&["success"]).inc();
    SYNC_DURATION_SECONDS.observe(duration.as_secs_f64());
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    LAST_SYNC_TIMESTAMP_SECONDS.set(now.as_secs_f64());
}

/// Record a failed sync pass
pub fn record_sync_error(duration: Duration) {
    SYNC_TOTAL.with_label_values(&["error"]).inc();
    SYNC_DURATION_SECONDS.observe(duration.as_secs_f64());
}

/// Record planned changes
///
/// # Arguments
/// * `action` - `create`, `update` or `delete`
/// * `count` - Number of records affected
#[allow(clippy::cast_precision_loss)]
pub fn record_plan_changes(action: &str, count: usize) {
    if count > 0 {
        PLAN_CHANGES_TOTAL
            .with_label_values(&[action])
            .inc_by(count as f64);
    }
}

/// Gather and encode all metrics in Prometheus text format
///
/// # Errors
/// Returns error if encoding fails
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = METRICS_REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(format!("UTF-8 error: {e}")))
}

async fn metrics_handler() -> (StatusCode, String) {
    match gather_metrics() {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

async fn healthz_handler() -> &'static str {
    "ok"
}

/// Routes served on the metrics address.
pub fn router() -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz_handler))
}

/// Serve `/metrics` and `/healthz` on `addr` until `shutdown` resolves.
///
/// # Errors
/// Returns error if the address cannot be bound or the server fails
pub async fn serve<F>(addr: SocketAddr, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Serving metrics on http://{addr}/metrics");
    axum::serve(listener, router())
        .with_graceful_shutdown(shutdown)
        .await
}
