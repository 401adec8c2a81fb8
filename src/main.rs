use std::{env, sync::Arc, time::Duration};

use anyhow::{Context, Result, anyhow};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{self, EnvFilter};

use frima_onchain_relay::api::{self, AppState};
use frima_onchain_relay::indexer::backfill::BackfillScanner;
use frima_onchain_relay::indexer::backoff::ReconnectBackoff;
use frima_onchain_relay::indexer::live::LiveSubscriber;
use frima_onchain_relay::indexer::rpc::AlloySource;
use frima_onchain_relay::indexer::transformations::events::EventDecoder;
use frima_onchain_relay::indexer::{Ingestion, IngestionHandle};
use frima_onchain_relay::items::ItemReader;
use frima_onchain_relay::metrics::Metrics;
use frima_onchain_relay::models::common::Config;
use frima_onchain_relay::notifier::HttpNotifier;
use frima_onchain_relay::payment::{PaymentService, ProductCatalog};
use frima_onchain_relay::utils::load_config;
use frima_onchain_relay::verifier::TransactionVerifier;

const DEFAULT_CONFIG_PATH: &str = "config.yml";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    println!();
    info!("=========================== INITIALIZING ===========================");

    // Load config
    let config_path = env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = match load_config(&config_path) {
        Ok(config) => {
            info!("Config loaded successfully");
            config
        }
        Err(e) => {
            error!("Failed to load config: {:#}", e);
            return Err(anyhow!(e));
        }
    };

    let contract = config.contract.address;
    let contract_label = contract
        .map(|address| address.to_checksum(None))
        .unwrap_or_else(|| "none".to_string());

    // Initialize optional metrics
    let metrics = if config.metrics.enabled {
        Some(Arc::new(Metrics::new(contract_label)?))
    } else {
        info!("Metrics are disabled");
        None
    };
    if let Some(metrics) = &metrics {
        metrics
            .start_metrics_server(&config.metrics.address, config.metrics.port)
            .await?;
    }

    // Prefer the websocket endpoint so log subscriptions can push
    let request_timeout = config.node.request_timeout();
    let stream_url = config.node.stream_url();
    info!("Node URL: {}", stream_url);
    let source = match AlloySource::connect(&stream_url, request_timeout, metrics.clone()).await {
        Ok(source) => source,
        Err(e) => {
            warn!(
                "Could not connect to {} ({}), falling back to {}",
                stream_url, e, config.node.rpc_url
            );
            AlloySource::connect(&config.node.rpc_url, request_timeout, metrics.clone())
                .await
                .context("failed to connect to node")?
        }
    };
    let source = Arc::new(source);

    let ingestion = match contract {
        Some(address) => {
            info!("Marketplace contract: {}", address);
            Some(start_ingestion(&config, address, source.clone(), metrics.clone())?)
        }
        None => {
            warn!("No contract address configured; event ingestion and contract routes are disabled");
            None
        }
    };

    let verifier = Arc::new(TransactionVerifier::new(source.clone(), contract));
    let items = contract.map(|address| Arc::new(ItemReader::new(source.clone(), address)));
    let payments = match &config.payment {
        Some(payment) => {
            let catalog = ProductCatalog::new(
                config.backend.base_url.clone(),
                Duration::from_secs(config.backend.request_timeout_secs),
            )?;
            info!("Payments collect to {}", payment.collect_address);
            Some(Arc::new(PaymentService::new(
                catalog,
                verifier.clone(),
                payment.collect_address,
                payment.amount()?,
            )))
        }
        None => {
            info!("Payment routes are disabled");
            None
        }
    };

    let state = AppState {
        contract,
        verifier,
        items,
        payments,
        ingestion: ingestion.as_ref().map(IngestionHandle::watch_state),
    };

    let addr = format!("{}:{}", config.server.address, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind HTTP server to {addr}"))?;

    println!();
    info!("========================== STARTING RELAY ==========================");
    info!("HTTP server listening on {}", addr);

    axum::serve(listener, api::router(state))
        .with_graceful_shutdown(async {
            if let Err(e) = signal::ctrl_c().await {
                error!("Failed to listen for Ctrl+C: {}", e);
            }
            info!("Received Ctrl+C signal, initiating shutdown...");
        })
        .await
        .context("HTTP server failed")?;

    if let Some(ingestion) = ingestion {
        if let Err(e) = ingestion.shutdown().await {
            error!("Ingestion task ended abnormally: {}", e);
        }
    }

    info!("Shutdown complete");
    Ok(())
}

fn start_ingestion(
    config: &Config,
    address: alloy_primitives::Address,
    source: Arc<AlloySource>,
    metrics: Option<Arc<Metrics>>,
) -> Result<IngestionHandle> {
    let ingestion = &config.ingestion;
    let decoder = Arc::new(EventDecoder::new(address).with_metrics(metrics.clone()));

    let backfill = BackfillScanner::new(source.clone(), decoder.clone())
        .with_lookback(ingestion.lookback_blocks);
    let live = LiveSubscriber::new(source, decoder)
        .with_health_check_timeout(Duration::from_secs(ingestion.health_check_timeout_secs))
        .with_poll_interval(Duration::from_secs(ingestion.poll_interval_secs))
        .with_metrics(metrics.clone());

    let notifier = HttpNotifier::from_config(&config.backend)?.with_metrics(metrics.clone());
    info!("Notifying backend at {}", config.notification_base());

    let handle = Ingestion::new(backfill, live, Arc::new(notifier))
        .with_backoff(ReconnectBackoff::new(
            Duration::from_secs(ingestion.reconnect_floor_secs),
            Duration::from_secs(ingestion.reconnect_ceiling_secs),
        ))
        .with_metrics(metrics)
        .spawn();

    Ok(handle)
}
