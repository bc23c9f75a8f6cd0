use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Install the Prometheus recorder and serve `/metrics` on `port`
pub fn init_metrics(port: u16) -> Result<()> {
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    PrometheusBuilder::new()
        // Buckets: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s
        .set_buckets_for_metric(
            metrics_exporter_prometheus::Matcher::Full(
                "flightplan.sync.publish_duration_ms".to_string(),
            ),
            &[1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0],
        )
        .context("Failed to set buckets for flightplan.sync.publish_duration_ms")?
        .with_http_listener(addr)
        .install()
        .context("Failed to install Prometheus exporter")?;

    info!("Prometheus metrics available on http://{}/metrics", addr);
    Ok(())
}

/// Initialize sync bus and manager metrics to zero so they appear before the first event
pub fn initialize_sync_metrics() {
    // Sync bus metrics
    metrics::counter!("flightplan.sync.published_total").absolute(0);
    metrics::counter!("flightplan.sync.received_total").absolute(0);
    metrics::counter!("flightplan.sync.decode_error_total").absolute(0);
    metrics::counter!("flightplan.sync.lagged_total").absolute(0);
    metrics::counter!("flightplan.sync.publish_error_total").absolute(0);

    // Manager metrics
    metrics::counter!("flightplan.manager.requests_fired_total").absolute(0);
    metrics::counter!("flightplan.manager.requests_applied_total").absolute(0);
    metrics::counter!("flightplan.manager.requests_failed_total").absolute(0);
    metrics::counter!("flightplan.manager.dropped_requests_total").absolute(0);
    metrics::counter!("flightplan.manager.rollbacks_total").absolute(0);
    metrics::counter!("flightplan.manager.resyncs_total").absolute(0);
}
