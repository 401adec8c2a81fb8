pub mod backfill;
pub mod backoff;
pub mod live;
pub mod rpc;
pub mod transformations;

use std::{fmt, sync::Arc};

use futures::StreamExt;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::indexer::backfill::BackfillScanner;
use crate::indexer::backoff::ReconnectBackoff;
use crate::indexer::live::LiveSubscriber;
use crate::metrics::Metrics;
use crate::models::events::ContractEvent;
use crate::notifier::EventSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "attempt", rename_all = "snake_case")]
pub enum IngestionState {
    Idle,
    Backfilling,
    Subscribing,
    /// Waiting before reconnect attempt `n`.
    Reconnecting(u32),
    Cancelled,
}

impl fmt::Display for IngestionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestionState::Idle => f.write_str("idle"),
            IngestionState::Backfilling => f.write_str("backfilling"),
            IngestionState::Subscribing => f.write_str("subscribing"),
            IngestionState::Reconnecting(n) => write!(f, "reconnecting({n})"),
            IngestionState::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Runs backfill once, then keeps a live feed open for as long as the
/// process lives, forwarding every event to the sink in order.
pub struct Ingestion {
    backfill: BackfillScanner,
    live: LiveSubscriber,
    sink: Arc<dyn EventSink>,
    backoff: ReconnectBackoff,
    state: watch::Sender<IngestionState>,
    metrics: Option<Arc<Metrics>>,
}

impl Ingestion {
    pub fn new(backfill: BackfillScanner, live: LiveSubscriber, sink: Arc<dyn EventSink>) -> Self {
        let (state, _) = watch::channel(IngestionState::Idle);
        Self {
            backfill,
            live,
            sink,
            backoff: ReconnectBackoff::default(),
            state,
            metrics: None,
        }
    }

    pub fn with_backoff(mut self, backoff: ReconnectBackoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_metrics(mut self, metrics: Option<Arc<Metrics>>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn state(&self) -> watch::Receiver<IngestionState> {
        self.state.subscribe()
    }

    /// Moves the pipeline onto its own task.
    pub fn spawn(self) -> IngestionHandle {
        let cancel = CancellationToken::new();
        let state = self.state();
        let handle = tokio::spawn(self.run(cancel.clone()));
        IngestionHandle {
            cancel,
            state,
            handle,
        }
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        self.set_state(IngestionState::Backfilling);
        let backfill = tokio::select! {
            _ = cancel.cancelled() => return self.set_state(IngestionState::Cancelled),
            result = self.backfill.scan(0, None) => result,
        };
        match backfill {
            Ok(events) => {
                info!("Backfill produced {} events", events.len());
                for event in &events {
                    if !self.dispatch(event, &cancel).await {
                        return self.set_state(IngestionState::Cancelled);
                    }
                }
            }
            // Realtime ingestion still starts
            Err(e) => error!("Backfill failed: {}", e),
        }

        loop {
            self.set_state(IngestionState::Subscribing);
            let subscribed = tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.live.subscribe(cancel.child_token()) => result,
            };

            match subscribed {
                Ok(mut feed) => {
                    self.backoff.reset();
                    info!("Live feed open ({:?} mode, head {})", feed.mode, feed.head);
                    while let Some(event) = feed.events.next().await {
                        if !self.dispatch(&event, &cancel).await {
                            break;
                        }
                    }
                    if cancel.is_cancelled() {
                        break;
                    }
                    warn!("Live feed ended");
                }
                Err(e) => error!("Failed to open live feed: {}", e),
            }

            let delay = self.backoff.record_failure();
            let attempt = self.backoff.consecutive_failures();
            self.set_state(IngestionState::Reconnecting(attempt));
            if let Some(metrics) = &self.metrics {
                metrics.record_reconnect();
            }
            info!("Reconnecting in {:?} (attempt {})", delay, attempt);

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = sleep(delay) => {}
            }
        }

        self.set_state(IngestionState::Cancelled);
        info!("Ingestion stopped");
    }

    /// Returns false when cancelled before the event was handed off.
    async fn dispatch(&self, event: &ContractEvent, cancel: &CancellationToken) -> bool {
        let result = tokio::select! {
            _ = cancel.cancelled() => return false,
            result = self.sink.notify(event) => result,
        };
        if let Err(e) = result {
            // Dropped; the next backfill is the only replay path
            let (kind, item_id, tx_hash) = event.idempotency_key();
            error!(
                "Dropping {} for item {} (tx {}, block {}): {}",
                kind, item_id, tx_hash, event.block_number, e
            );
        }
        true
    }

    fn set_state(&self, state: IngestionState) {
        info!("Ingestion state: {}", state);
        self.state.send_replace(state);
    }
}

/// Owner of a running ingestion task.
pub struct IngestionHandle {
    cancel: CancellationToken,
    state: watch::Receiver<IngestionState>,
    handle: JoinHandle<()>,
}

impl IngestionHandle {
    pub fn state(&self) -> IngestionState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<IngestionState> {
        self.state.clone()
    }

    /// Cancels the task and waits for it to finish.
    pub async fn shutdown(self) -> Result<(), JoinError> {
        self.cancel.cancel();
        self.handle.await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::backfill::BackfillScanner;
    use crate::indexer::rpc::memory::{MemorySource, SubscriptionScript};
    use crate::indexer::transformations::events::EventDecoder;
    use crate::indexer::transformations::events::tests::{CONTRACT, listed, raw_log};
    use crate::models::errors::{DeliveryError, NotifyError};
    use crate::utils::retry::RetryConfig;
    use alloy_sol_types::SolEvent;
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct RecordingSink {
        events: mpsc::UnboundedSender<u64>,
        fail_item: Option<u64>,
    }

    #[async_trait]
    impl EventSink for RecordingSink {
        async fn notify(&self, event: &ContractEvent) -> Result<(), NotifyError> {
            let _ = self.events.send(event.item_id);
            if self.fail_item == Some(event.item_id) {
                return Err(NotifyError::Rejected {
                    path: event.kind().endpoint().to_string(),
                    source: DeliveryError::Status {
                        status: 400,
                        body: String::new(),
                    },
                });
            }
            Ok(())
        }
    }

    fn ingestion(source: Arc<MemorySource>, sink: RecordingSink) -> Ingestion {
        let decoder = Arc::new(EventDecoder::new(CONTRACT));
        let backfill = BackfillScanner::new(source.clone(), decoder.clone())
            .with_retry(RetryConfig::linear(1, Duration::ZERO));
        let live = LiveSubscriber::new(source, decoder);
        Ingestion::new(backfill, live, Arc::new(sink))
    }

    fn sink(fail_item: Option<u64>) -> (RecordingSink, mpsc::UnboundedReceiver<u64>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            RecordingSink {
                events: tx,
                fail_item,
            },
            rx,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn backfill_then_live_with_reconnects() {
        let source = Arc::new(MemorySource::new(1_000));
        source.push_log(raw_log(listed(1).encode_log_data(), 10, 0));
        source.push_log(raw_log(listed(2).encode_log_data(), 20, 0));
        // Two feeds the node closes straight away
        source.push_subscription(SubscriptionScript::Closing(vec![]));
        source.push_subscription(SubscriptionScript::Closing(vec![]));
        source.push_subscription(SubscriptionScript::Open(vec![raw_log(
            listed(3).encode_log_data(),
            1_001,
            0,
        )]));

        let (sink, mut received) = sink(None);
        let handle = ingestion(source.clone(), sink).spawn();

        assert_eq!(received.recv().await, Some(1));
        assert_eq!(received.recv().await, Some(2));
        assert_eq!(received.recv().await, Some(3));
        assert_eq!(source.subscribe_attempts(), 3);
        assert_eq!(handle.state(), IngestionState::Subscribing);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_waits_follow_backoff() {
        let source = Arc::new(MemorySource::new(1_000));
        // The backfill head fetch, then two connectivity checks
        source.fail_head_fetches(3);
        source.push_subscription(SubscriptionScript::Open(vec![raw_log(
            listed(1).encode_log_data(),
            1_001,
            0,
        )]));

        let (sink, mut received) = sink(None);
        let started = tokio::time::Instant::now();
        let handle = ingestion(source, sink).spawn();

        assert_eq!(received.recv().await, Some(1));
        // 5s after the first failure, 10s after the second
        assert!(started.elapsed() >= Duration::from_secs(15));
        assert!(started.elapsed() < Duration::from_secs(20));

        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_resets_after_a_feed_was_open() {
        let source = Arc::new(MemorySource::new(1_000));
        source.fail_head_fetches(3);
        source.push_subscription(SubscriptionScript::Closing(vec![raw_log(
            listed(1).encode_log_data(),
            1_001,
            0,
        )]));
        source.push_subscription(SubscriptionScript::Open(vec![raw_log(
            listed(2).encode_log_data(),
            1_002,
            0,
        )]));

        let (sink, mut received) = sink(None);
        let started = tokio::time::Instant::now();
        let handle = ingestion(source, sink).spawn();

        // Two failed connectivity checks back off 5s then 10s
        assert_eq!(received.recv().await, Some(1));
        let connected = started.elapsed();
        assert!(connected >= Duration::from_secs(15));

        // The feed closing waits the floor again, not 20s
        assert_eq!(received.recv().await, Some(2));
        let reconnected = started.elapsed() - connected;
        assert!(reconnected >= Duration::from_secs(5));
        assert!(reconnected < Duration::from_secs(10));
        assert_eq!(handle.state(), IngestionState::Subscribing);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn failed_backfill_still_goes_live() {
        let source = Arc::new(MemorySource::new(1_000));
        source.fail_range_fetches(1);
        source.push_log(raw_log(listed(1).encode_log_data(), 10, 0));
        source.push_subscription(SubscriptionScript::Open(vec![raw_log(
            listed(2).encode_log_data(),
            1_001,
            0,
        )]));

        let (sink, mut received) = sink(None);
        let handle = ingestion(source, sink).spawn();

        assert_eq!(received.recv().await, Some(2));
        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn failed_notification_does_not_stop_the_pipeline() {
        let source = Arc::new(MemorySource::new(1_000));
        source.push_log(raw_log(listed(1).encode_log_data(), 10, 0));
        source.push_log(raw_log(listed(2).encode_log_data(), 20, 0));
        source.push_subscription(SubscriptionScript::Open(vec![]));

        let (sink, mut received) = sink(Some(1));
        let handle = ingestion(source, sink).spawn();

        assert_eq!(received.recv().await, Some(1));
        assert_eq!(received.recv().await, Some(2));
        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_during_backoff_stops_without_reconnecting() {
        let source = Arc::new(MemorySource::new(1_000));
        source.fail_head_fetches(u32::MAX);
        let (sink, _received) = sink(None);
        let ingestion = ingestion(source.clone(), sink);
        let mut state = ingestion.state();
        let handle = ingestion.spawn();

        state
            .wait_for(|s| matches!(s, IngestionState::Reconnecting(_)))
            .await
            .unwrap();
        let checks = source.head_requests();

        handle.shutdown().await.unwrap();
        assert_eq!(*state.borrow(), IngestionState::Cancelled);
        assert_eq!(source.head_requests(), checks);
        assert_eq!(source.subscribe_attempts(), 0);
    }
}
