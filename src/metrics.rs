use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use anyhow::{Context, Result};
use axum::{Router, http::StatusCode, routing::get};
use opentelemetry::KeyValue;
use opentelemetry::metrics::{Counter, Gauge, Histogram, MeterProvider};
use opentelemetry_sdk::metrics::{MetricError, SdkMeterProvider};
use prometheus::{Encoder, TextEncoder};
use std::net::SocketAddr;

use crate::models::events::EventKind;

pub struct Metrics {
    registry: Arc<prometheus::Registry>,
    _provider: SdkMeterProvider,
    pub contract: String,

    // Ingestion metrics
    pub events_decoded: Counter<u64>,
    pub decode_failures: Counter<u64>,
    pub latest_processed_block: Gauge<u64>,
    pub reconnects: Counter<u64>,

    // Delivery metrics
    pub notifications_delivered: Counter<u64>,
    pub notifications_failed: Counter<u64>,
    pub notification_attempts: Counter<u64>,

    // RPC metrics
    pub rpc_requests: Counter<u64>,
    pub rpc_errors: Counter<u64>,
    pub rpc_latency: Histogram<f64>,
}

impl Metrics {
    pub fn new(contract: String) -> Result<Self, MetricError> {
        // Create a new prometheus registry
        let registry = prometheus::Registry::new();

        // Configure OpenTelemetry to use this registry
        let exporter = opentelemetry_prometheus::exporter()
            .with_registry(registry.clone())
            .build()?;

        // Set up a meter to create instruments
        let provider = SdkMeterProvider::builder().with_reader(exporter).build();
        let meter = provider.meter("relay_metrics");

        let events_decoded = meter
            .u64_counter("relay_events_decoded")
            .with_description("Contract events decoded from logs")
            .build();

        let decode_failures = meter
            .u64_counter("relay_decode_failures")
            .with_description("Logs skipped because they could not be decoded")
            .build();

        let latest_processed_block = meter
            .u64_gauge("relay_latest_processed_block_number")
            .with_description("Latest block number covered by ingestion")
            .build();

        let reconnects = meter
            .u64_counter("relay_reconnects")
            .with_description("Live subscription reconnect attempts")
            .build();

        let notifications_delivered = meter
            .u64_counter("relay_notifications_delivered")
            .with_description("Events delivered to the backend")
            .build();

        let notifications_failed = meter
            .u64_counter("relay_notifications_failed")
            .with_description("Events dropped after delivery failed")
            .build();

        let notification_attempts = meter
            .u64_counter("relay_notification_attempts")
            .with_description("HTTP delivery attempts, including retries")
            .build();

        let rpc_requests = meter
            .u64_counter("relay_rpc_requests")
            .with_description("Number of RPC requests made")
            .build();

        let rpc_errors = meter
            .u64_counter("relay_rpc_errors")
            .with_description("Number of RPC errors encountered")
            .build();

        let rpc_latency = meter
            .f64_histogram("relay_rpc_latency")
            .with_description("RPC request latency")
            .with_boundaries(vec![
                0.025, 0.05, 0.075, 0.1, 0.15, 0.2, 0.3, 0.5, 1.0, 5.0, 10.0,
            ])
            .with_unit("s")
            .build();

        Ok(Self {
            registry: Arc::new(registry),
            _provider: provider,
            contract,
            events_decoded,
            decode_failures,
            latest_processed_block,
            reconnects,
            notifications_delivered,
            notifications_failed,
            notification_attempts,
            rpc_requests,
            rpc_errors,
            rpc_latency,
        })
    }

    fn labels(&self) -> [KeyValue; 1] {
        [KeyValue::new("contract", self.contract.clone())]
    }

    fn kind_labels(&self, kind: EventKind) -> [KeyValue; 2] {
        [
            KeyValue::new("contract", self.contract.clone()),
            KeyValue::new("kind", kind.as_str()),
        ]
    }

    pub fn record_rpc(&self, method: &'static str, elapsed: Duration, failed: bool) {
        let labels = [
            KeyValue::new("contract", self.contract.clone()),
            KeyValue::new("method", method),
        ];
        self.rpc_requests.add(1, &labels);
        self.rpc_latency.record(elapsed.as_secs_f64(), &labels);
        if failed {
            self.rpc_errors.add(1, &labels);
        }
    }

    pub fn record_decoded(&self, kind: EventKind, block_number: u64) {
        self.events_decoded.add(1, &self.kind_labels(kind));
        self.latest_processed_block.record(block_number, &self.labels());
    }

    pub fn record_decode_failure(&self) {
        self.decode_failures.add(1, &self.labels());
    }

    pub fn record_processed_block(&self, block_number: u64) {
        self.latest_processed_block.record(block_number, &self.labels());
    }

    pub fn record_reconnect(&self) {
        self.reconnects.add(1, &self.labels());
    }

    pub fn record_notification_attempt(&self, kind: EventKind) {
        self.notification_attempts.add(1, &self.kind_labels(kind));
    }

    pub fn record_notification(&self, kind: EventKind, delivered: bool) {
        if delivered {
            self.notifications_delivered.add(1, &self.kind_labels(kind));
        } else {
            self.notifications_failed.add(1, &self.kind_labels(kind));
        }
    }

    pub async fn start_metrics_server(&self, addr: &str, port: u16) -> Result<()> {
        let addr = format!("{addr}:{port}")
            .parse::<SocketAddr>()
            .context("invalid metrics address")?;
        let registry = self.registry.clone();

        let app = Router::new().route("/metrics", get(move || metrics_handler(registry.clone())));

        // Determine the access URL based on the binding address. Only used for logging.
        let access_url = if addr.ip().to_string() == "0.0.0.0" {
            format!("http://localhost:{port}/metrics")
        } else {
            format!("http://{}:{port}/metrics", addr.ip())
        };

        info!(
            "Starting metrics server - binding to {} (accessible at {})",
            addr, access_url
        );

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind metrics server to {addr}"))?;

        // Spawn the server in a separate task
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                error!("Metrics server stopped: {}", e);
            }
        });

        Ok(())
    }
}

async fn metrics_handler(registry: Arc<prometheus::Registry>) -> Result<String, StatusCode> {
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();
    let mut buffer = vec![];
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    String::from_utf8(buffer).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn recorded_values_are_exported() {
        let metrics = Metrics::new("0xc0ffe".to_string()).unwrap();
        metrics.record_decoded(EventKind::ItemListed, 42);
        metrics.record_notification(EventKind::ItemListed, true);
        metrics.record_rpc("get_logs", Duration::from_millis(30), false);

        let body = metrics_handler(metrics.registry.clone()).await.unwrap();
        assert!(body.contains("relay_events_decoded"));
        assert!(body.contains("relay_notifications_delivered"));
        assert!(body.contains("relay_rpc_latency"));
        assert!(body.contains(r#"kind="ItemListed""#));
        assert!(body.contains(r#"contract="0xc0ffe""#));
    }
}
