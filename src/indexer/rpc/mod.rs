pub mod logs;
#[cfg(any(test, feature = "test-utils"))]
pub mod memory;
pub mod transactions;

use std::{future::IntoFuture, sync::Arc, time::Duration};

use alloy_network::TransactionBuilder;
use alloy_primitives::{Address, B256, Bytes};
use alloy_provider::{DynProvider, Provider, ProviderBuilder};
use alloy_rpc_types_eth::{Filter, TransactionRequest};
use alloy_transport::TransportResult;
use async_trait::async_trait;
use futures::{StreamExt, stream, stream::BoxStream};
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{Instant, timeout};
use tracing::{debug, warn};

use crate::indexer::rpc::{
    logs::{LogParser, into_raw_log},
    transactions::{ReceiptParser, TransactionParser},
};
use crate::metrics::Metrics;
use crate::models::errors::SourceError;
use crate::models::events::RawLog;
use crate::models::verification::{ReceiptInfo, TransactionInfo};

/// Notifications buffered per subscription before the reader lags.
pub const SUBSCRIPTION_CHANNEL_SIZE: usize = 1024;

/// Unbounded sequence of raw logs pushed by the node. A
/// [`SourceError::Lagged`] item means notifications were dropped in between.
pub type LogStream = BoxStream<'static, Result<RawLog, SourceError>>;

/// Read access to contract logs.
#[async_trait]
pub trait LogSource: Send + Sync {
    async fn latest_block(&self) -> Result<u64, SourceError>;

    /// Logs emitted by `address` in the inclusive range, in node order.
    async fn logs_in_range(
        &self,
        address: Address,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<RawLog>, SourceError>;

    /// Opens a push subscription. Transports without push support return
    /// [`SourceError::SubscriptionUnsupported`].
    async fn subscribe_logs(&self, address: Address) -> Result<LogStream, SourceError>;
}

/// Point lookups used by verification and item reads.
#[async_trait]
pub trait ChainReader: Send + Sync {
    async fn transaction(&self, hash: B256) -> Result<Option<TransactionInfo>, SourceError>;
    async fn receipt(&self, hash: B256) -> Result<Option<ReceiptInfo>, SourceError>;
    async fn call(&self, to: Address, input: Bytes) -> Result<Bytes, SourceError>;
}

/// Node adapter backed by an alloy provider. Every call is bounded by
/// `request_timeout`.
#[derive(Clone)]
pub struct AlloySource {
    provider: DynProvider,
    request_timeout: Duration,
    metrics: Option<Arc<Metrics>>,
}

impl AlloySource {
    pub async fn connect(
        url: &str,
        request_timeout: Duration,
        metrics: Option<Arc<Metrics>>,
    ) -> Result<Self, SourceError> {
        let provider = timeout(request_timeout, ProviderBuilder::new().connect(url))
            .await
            .map_err(|_| SourceError::Timeout {
                elapsed: request_timeout,
            })??
            .erased();

        Ok(Self {
            provider,
            request_timeout,
            metrics,
        })
    }

    async fn observe<T, F>(&self, method: &'static str, call: F) -> Result<T, SourceError>
    where
        F: IntoFuture<Output = TransportResult<T>>,
    {
        let start = Instant::now();

        let result = match timeout(self.request_timeout, call).await {
            Ok(result) => result.map_err(SourceError::from),
            Err(_) => Err(SourceError::Timeout {
                elapsed: self.request_timeout,
            }),
        };

        // Record metrics if enabled
        if let Some(metrics) = &self.metrics {
            metrics.record_rpc(method, start.elapsed(), result.is_err());
        }

        if let Err(e) = &result {
            if !matches!(e, SourceError::SubscriptionUnsupported) {
                warn!("RPC call {} failed: {}", method, e);
            }
        }

        result
    }
}

#[async_trait]
impl LogSource for AlloySource {
    async fn latest_block(&self) -> Result<u64, SourceError> {
        self.observe("get_block_number", self.provider.get_block_number())
            .await
    }

    async fn logs_in_range(
        &self,
        address: Address,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<RawLog>, SourceError> {
        let filter = Filter::new()
            .address(address)
            .from_block(from_block)
            .to_block(to_block);

        let logs = self
            .observe("get_logs", self.provider.get_logs(&filter))
            .await?;
        debug!(
            "Fetched {} logs for blocks {}..={}",
            logs.len(),
            from_block,
            to_block
        );

        Ok(logs.parse_raw_logs())
    }

    async fn subscribe_logs(&self, address: Address) -> Result<LogStream, SourceError> {
        let filter = Filter::new().address(address);
        let subscription = self
            .observe(
                "subscribe_logs",
                self.provider
                    .subscribe_logs(&filter)
                    .channel_size(SUBSCRIPTION_CHANNEL_SIZE),
            )
            .await?;

        // `recv` surfaces lag, which the stream adapters only log at debug
        let logs = stream::unfold(subscription, |mut subscription| async move {
            let item = match subscription.recv().await {
                Ok(log) => Ok(into_raw_log(log)),
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Log subscription lagged, {} notifications dropped", skipped);
                    Err(SourceError::Lagged { skipped })
                }
                Err(RecvError::Closed) => return None,
            };
            Some((item, subscription))
        });

        Ok(logs.boxed())
    }
}

#[async_trait]
impl ChainReader for AlloySource {
    async fn transaction(&self, hash: B256) -> Result<Option<TransactionInfo>, SourceError> {
        let tx = self
            .observe(
                "get_transaction_by_hash",
                self.provider.get_transaction_by_hash(hash),
            )
            .await?;
        Ok(tx.map(|tx| tx.parse_transaction()))
    }

    async fn receipt(&self, hash: B256) -> Result<Option<ReceiptInfo>, SourceError> {
        let receipt = self
            .observe(
                "get_transaction_receipt",
                self.provider.get_transaction_receipt(hash),
            )
            .await?;
        Ok(receipt.map(|receipt| receipt.parse_receipt()))
    }

    async fn call(&self, to: Address, input: Bytes) -> Result<Bytes, SourceError> {
        let request = TransactionRequest::default()
            .with_to(to)
            .with_input(input);
        self.observe("eth_call", self.provider.call(request)).await
    }
}
