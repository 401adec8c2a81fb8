use std::sync::Arc;

use tracing::info;

use crate::indexer::rpc::LogSource;
use crate::indexer::transformations::events::EventDecoder;
use crate::models::errors::SourceError;
use crate::models::events::ContractEvent;
use crate::utils::retry::{Failure, RetryConfig, RetryError, retry};

/// How far back a scan starting at block zero reaches.
pub const DEFAULT_LOOKBACK_BLOCKS: u64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanRange {
    pub from: u64,
    pub to: u64,
}

/// Enumerates historical contract events in a bounded block range. Each scan
/// is independent; nothing is remembered between calls.
pub struct BackfillScanner {
    source: Arc<dyn LogSource>,
    decoder: Arc<EventDecoder>,
    lookback_blocks: u64,
    retry_config: RetryConfig,
}

impl BackfillScanner {
    pub fn new(source: Arc<dyn LogSource>, decoder: Arc<EventDecoder>) -> Self {
        Self {
            source,
            decoder,
            lookback_blocks: DEFAULT_LOOKBACK_BLOCKS,
            retry_config: RetryConfig::exponential(
                3,
                std::time::Duration::from_millis(500),
                std::time::Duration::from_secs(5),
            ),
        }
    }

    pub fn with_lookback(mut self, lookback_blocks: u64) -> Self {
        self.lookback_blocks = lookback_blocks;
        self
    }

    pub fn with_retry(mut self, retry_config: RetryConfig) -> Self {
        self.retry_config = retry_config;
        self
    }

    /// Resolves the concrete range: a missing `to_block` means the current
    /// head, and `from_block == 0` means `head - lookback`, clamped at zero.
    pub async fn resolve_range(
        &self,
        from_block: u64,
        to_block: Option<u64>,
    ) -> Result<ScanRange, SourceError> {
        if from_block != 0 {
            if let Some(to) = to_block {
                return Ok(ScanRange {
                    from: from_block,
                    to,
                });
            }
        }

        let head = self.fetch_head().await?;
        let from = match from_block {
            0 => head.saturating_sub(self.lookback_blocks),
            from => from,
        };

        Ok(ScanRange {
            from,
            to: to_block.unwrap_or(head),
        })
    }

    pub async fn scan(
        &self,
        from_block: u64,
        to_block: Option<u64>,
    ) -> Result<Vec<ContractEvent>, SourceError> {
        let range = self.resolve_range(from_block, to_block).await?;
        if range.from > range.to {
            info!(
                "Backfill range {}..={} is empty, nothing to scan",
                range.from, range.to
            );
            return Ok(Vec::new());
        }

        info!("Scanning past events from block {} to {}", range.from, range.to);

        let address = self.decoder.address();
        let source = self.source.clone();
        let logs = retry(
            || {
                let source = source.clone();
                async move {
                    source
                        .logs_in_range(address, range.from, range.to)
                        .await
                        .map_err(Failure::Transient)
                }
            },
            &self.retry_config,
            "backfill_get_logs",
        )
        .await
        .map_err(RetryError::into_source)?;

        let mut events: Vec<ContractEvent> = logs
            .iter()
            .filter_map(|log| self.decoder.decode_or_skip(log))
            .collect();
        // Stable, so node order is kept for entries without a log index
        events.sort_by_key(|event| (event.block_number, event.log_index));

        info!(
            "Backfill found {} events in {} logs ({}..={})",
            events.len(),
            logs.len(),
            range.from,
            range.to
        );

        Ok(events)
    }

    async fn fetch_head(&self) -> Result<u64, SourceError> {
        let source = self.source.clone();
        retry(
            || {
                let source = source.clone();
                async move { source.latest_block().await.map_err(Failure::Transient) }
            },
            &self.retry_config,
            "backfill_latest_block",
        )
        .await
        .map_err(RetryError::into_source)
    }
}
