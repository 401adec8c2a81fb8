use std::{sync::Arc, time::Duration};

use async_stream::stream;
use futures::{StreamExt, stream::BoxStream};
use tokio::time::{MissedTickBehavior, interval, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::indexer::rpc::{LogSource, LogStream};
use crate::indexer::transformations::events::EventDecoder;
use crate::metrics::Metrics;
use crate::models::errors::SourceError;
use crate::models::events::ContractEvent;

pub const DEFAULT_HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveMode {
    /// Logs pushed by the node over a subscription.
    Push,
    /// Periodic ranged fetches, for transports without push support.
    Polling,
}

/// An open live feed. The event stream ends on cancellation or on any
/// upstream failure; the caller decides whether to reconnect.
pub struct LiveFeed {
    pub mode: LiveMode,
    /// Head observed by the connectivity check.
    pub head: u64,
    pub events: BoxStream<'static, ContractEvent>,
}

pub struct LiveSubscriber {
    source: Arc<dyn LogSource>,
    decoder: Arc<EventDecoder>,
    health_check_timeout: Duration,
    poll_interval: Duration,
    metrics: Option<Arc<Metrics>>,
}

impl LiveSubscriber {
    pub fn new(source: Arc<dyn LogSource>, decoder: Arc<EventDecoder>) -> Self {
        Self {
            source,
            decoder,
            health_check_timeout: DEFAULT_HEALTH_CHECK_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            metrics: None,
        }
    }

    pub fn with_health_check_timeout(mut self, health_check_timeout: Duration) -> Self {
        self.health_check_timeout = health_check_timeout;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_metrics(mut self, metrics: Option<Arc<Metrics>>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Checks connectivity, then opens a push subscription. Once the node has
    /// answered the connectivity check, any subscribe failure falls back to
    /// polling.
    pub async fn subscribe(&self, cancel: CancellationToken) -> Result<LiveFeed, SourceError> {
        let head = match timeout(self.health_check_timeout, self.source.latest_block()).await {
            Ok(Ok(head)) => head,
            Ok(Err(e)) => {
                error!("Node connectivity check failed: {}", e);
                return Err(e);
            }
            Err(_) => {
                error!(
                    "Node connectivity check timed out after {:?}",
                    self.health_check_timeout
                );
                return Err(SourceError::Timeout {
                    elapsed: self.health_check_timeout,
                });
            }
        };
        info!("Node connectivity OK, latest block: {}", head);

        let address = self.decoder.address();
        match self.source.subscribe_logs(address).await {
            Ok(logs) => {
                info!("Subscribed to logs of {}", address);
                Ok(LiveFeed {
                    mode: LiveMode::Push,
                    head,
                    events: self.push_events(logs, head, cancel),
                })
            }
            Err(e) => {
                match e {
                    SourceError::SubscriptionUnsupported => {
                        warn!("Transport does not support subscriptions")
                    }
                    e => warn!("Failed to subscribe to logs: {}", e),
                }
                warn!("Polling every {:?} from block {}", self.poll_interval, head);
                Ok(LiveFeed {
                    mode: LiveMode::Polling,
                    head,
                    events: self.polled_events(head, cancel),
                })
            }
        }
    }

    fn push_events(
        &self,
        mut logs: LogStream,
        start_block: u64,
        cancel: CancellationToken,
    ) -> BoxStream<'static, ContractEvent> {
        let source = self.source.clone();
        let decoder = self.decoder.clone();
        let metrics = self.metrics.clone();

        stream! {
            let address = decoder.address();
            // Highest block seen so far; a lag refetch restarts from here
            let mut last_block = start_block;

            loop {
                let next = tokio::select! {
                    _ = cancel.cancelled() => break,
                    next = logs.next() => next,
                };

                match next {
                    Some(Ok(log)) => {
                        if let Some(block) = log.block_number {
                            last_block = last_block.max(block);
                            if let Some(metrics) = &metrics {
                                metrics.record_processed_block(block);
                            }
                        }
                        if let Some(event) = decoder.decode_or_skip(&log) {
                            yield event;
                        }
                    }
                    Some(Err(SourceError::Lagged { skipped })) => {
                        let head = match source.latest_block().await {
                            Ok(head) => head,
                            Err(e) => {
                                error!(
                                    "Log subscription dropped {} notifications and the head is unavailable: {}",
                                    skipped, e
                                );
                                break;
                            }
                        };
                        // The last block may be partly delivered, so it is fetched again
                        warn!(
                            "Log subscription dropped {} notifications, refetching blocks {}..={}",
                            skipped, last_block, head
                        );
                        match source.logs_in_range(address, last_block, head).await {
                            Ok(missed) => {
                                for log in &missed {
                                    if let Some(event) = decoder.decode_or_skip(log) {
                                        yield event;
                                    }
                                }
                                last_block = last_block.max(head);
                            }
                            Err(e) => {
                                error!("Failed to refetch lagged blocks: {}", e);
                                break;
                            }
                        }
                    }
                    Some(Err(e)) => {
                        error!("Log subscription error: {}", e);
                        break;
                    }
                    None => {
                        warn!("Log subscription closed by the node");
                        break;
                    }
                }
            }
        }
        .boxed()
    }

    fn polled_events(
        &self,
        start_block: u64,
        cancel: CancellationToken,
    ) -> BoxStream<'static, ContractEvent> {
        let source = self.source.clone();
        let decoder = self.decoder.clone();
        let metrics = self.metrics.clone();
        let poll_interval = self.poll_interval;

        stream! {
            let address = decoder.address();
            let mut last_processed = start_block;
            let mut ticker = interval(poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let head = match source.latest_block().await {
                    Ok(head) => head,
                    Err(e) => {
                        error!("Polling lost the node: {}", e);
                        break;
                    }
                };
                if head <= last_processed {
                    continue;
                }

                let from = last_processed + 1;
                match source.logs_in_range(address, from, head).await {
                    Ok(logs) => {
                        for log in &logs {
                            if let Some(event) = decoder.decode_or_skip(log) {
                                yield event;
                            }
                        }
                    }
                    // Blocks are not revisited; the next backfill is the recovery path
                    Err(e) => error!(
                        "Failed to fetch logs for blocks {}..={}, skipping: {}",
                        from, head, e
                    ),
                }

                last_processed = head;
                if let Some(metrics) = &metrics {
                    metrics.record_processed_block(last_processed);
                }
            }
        }
        .boxed()
    }
}
