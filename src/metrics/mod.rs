use std::sync::Once;

use autometrics::prometheus_exporter::{self, PrometheusResponse};
use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec,
    IntGaugeVec, Opts, Registry, TextEncoder,
};
use tracing::warn;


lazy_static! {
    pub static ref SCAN_PASS_COUNTER: IntCounter =
        IntCounter::new("scan_passes", "Completed scan passes")
            .expect("metric can not be created");

    pub static ref SCAN_DURATION_METRIC: Histogram = Histogram::with_opts(
        HistogramOpts::new("scan_duration_ms", "Histogram of scan pass duration in ms")
            .buckets(exponential_buckets(10.0, 2.0, 14).unwrap_or_default())
    )
    .expect("metric can not be created");

    pub static ref PROBE_FAILURES: IntCounterVec = IntCounterVec::new(
        Opts::new("probe_failures", "Failed health probes by probe kind"),
        &["probe"]
    )
    .expect("metric can not be created");

    pub static ref STORE_WRITE_FAILURES: IntCounterVec = IntCounterVec::new(
        Opts::new("store_write_failures", "Node writes the store rejected, by batch"),
        &["batch"]
    )
    .expect("metric can not be created");

    pub static ref REBUILD_BATCHES: IntCounterVec = IntCounterVec::new(
        Opts::new("rebuild_batches", "Rebuild and wipe batches by stage and outcome"),
        &["stage", "outcome"]
    )
    .expect("metric can not be created");

    pub static ref NODES_BY_MODE: IntGaugeVec = IntGaugeVec::new(
        Opts::new("nodes_by_mode", "Nodes per mode at the last aggregation"),
        &["mode"]
    )
    .expect("metric can not be created");

    pub static ref REGISTRY: Registry =
        Registry::new_custom(Some("nodes_monitor".to_string()), None)
            .expect("registry can not be created");
}

pub(crate) const PROBE_STORE: &str = "store";
pub(crate) const PROBE_GATEWAY: &str = "gateway";
pub(crate) const PROBE_PEER: &str = "peer";

pub(crate) const BATCH_CREATE: &str = "create";
pub(crate) const BATCH_UPDATE: &str = "update";
pub(crate) const BATCH_DELETE: &str = "delete";

pub fn register_custom_metrics(registry: &Registry) -> prometheus::Result<()> {
    registry.register(Box::new(SCAN_PASS_COUNTER.clone()))?;
    registry.register(Box::new(SCAN_DURATION_METRIC.clone()))?;
    registry.register(Box::new(PROBE_FAILURES.clone()))?;
    registry.register(Box::new(STORE_WRITE_FAILURES.clone()))?;
    registry.register(Box::new(REBUILD_BATCHES.clone()))?;
    registry.register(Box::new(NODES_BY_MODE.clone()))?;
    Ok(())
}

fn ensure_registered() {
    static REGISTERED: Once = Once::new();
    REGISTERED.call_once(|| {
        if let Err(e) = register_custom_metrics(&REGISTRY) {
            warn!(?e, "could not register custom metrics");
        }
    });
}

/// Renders the crate metrics and the autometrics series in the Prometheus
/// text format. Serving them is left to the embedding process.
pub fn gather_metrics() -> String {
    ensure_registered();
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        warn!(?e, "could not encode custom metrics");
    }
    let mut body = String::from_utf8(buffer).unwrap_or_default();
    body.push_str(&get_metrics_body());
    body
}

/// Export autometrics series for Prometheus to scrape
pub fn get_metrics_body() -> String {
    get_metrics().into_body()
}

pub fn get_metrics() -> PrometheusResponse {
    prometheus_exporter::encode_http_response()
}
