//! Scripted in-memory node, used to drive the pipeline without a network.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Mutex, MutexGuard, PoisonError},
};

use alloy_primitives::{Address, B256, Bytes};
use alloy_transport::TransportErrorKind;
use async_trait::async_trait;
use futures::{StreamExt, stream};

use crate::indexer::rpc::{ChainReader, LogSource, LogStream};
use crate::models::errors::SourceError;
use crate::models::events::RawLog;
use crate::models::verification::{ReceiptInfo, TransactionInfo};

/// What the next `subscribe_logs` call returns.
#[derive(Debug, Clone)]
pub enum SubscriptionScript {
    /// Yields the logs, then the stream closes.
    Closing(Vec<RawLog>),
    /// Yields the logs, then stays open until dropped.
    Open(Vec<RawLog>),
    /// Yields `before`, reports `skipped` dropped notifications, yields
    /// `after`, then closes.
    Lagging {
        before: Vec<RawLog>,
        skipped: u64,
        after: Vec<RawLog>,
    },
    /// The subscribe call itself fails.
    Refused,
    /// The transport has no push support.
    Unsupported,
}

#[derive(Default)]
struct State {
    head: u64,
    logs: Vec<RawLog>,
    head_failures: u32,
    range_failures: u32,
    subscriptions: VecDeque<SubscriptionScript>,
    transactions: HashMap<B256, TransactionInfo>,
    receipts: HashMap<B256, ReceiptInfo>,
    call_response: Option<Bytes>,
    requested_ranges: Vec<(u64, u64)>,
    head_requests: u32,
    subscribe_attempts: u32,
}

/// Once the subscription script is exhausted every further subscribe call
/// is refused.
#[derive(Default)]
pub struct MemorySource {
    state: Mutex<State>,
}

fn node_error(message: &str) -> SourceError {
    SourceError::from(TransportErrorKind::custom_str(message))
}

impl MemorySource {
    pub fn new(head: u64) -> Self {
        let source = Self::default();
        source.lock().head = head;
        source
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_head(&self, head: u64) {
        self.lock().head = head;
    }

    pub fn push_log(&self, log: RawLog) {
        self.lock().logs.push(log);
    }

    /// The next `count` head fetches fail.
    pub fn fail_head_fetches(&self, count: u32) {
        self.lock().head_failures = count;
    }

    /// The next `count` ranged log fetches fail.
    pub fn fail_range_fetches(&self, count: u32) {
        self.lock().range_failures = count;
    }

    pub fn push_subscription(&self, script: SubscriptionScript) {
        self.lock().subscriptions.push_back(script);
    }

    pub fn insert_transaction(&self, tx: TransactionInfo) {
        self.lock().transactions.insert(tx.hash, tx);
    }

    pub fn insert_receipt(&self, hash: B256, receipt: ReceiptInfo) {
        self.lock().receipts.insert(hash, receipt);
    }

    pub fn set_call_response(&self, response: Bytes) {
        self.lock().call_response = Some(response);
    }

    pub fn requested_ranges(&self) -> Vec<(u64, u64)> {
        self.lock().requested_ranges.clone()
    }

    pub fn head_requests(&self) -> u32 {
        self.lock().head_requests
    }

    pub fn subscribe_attempts(&self) -> u32 {
        self.lock().subscribe_attempts
    }
}

#[async_trait]
impl LogSource for MemorySource {
    async fn latest_block(&self) -> Result<u64, SourceError> {
        let mut state = self.lock();
        state.head_requests += 1;
        if state.head_failures > 0 {
            state.head_failures -= 1;
            return Err(node_error("head unavailable"));
        }
        Ok(state.head)
    }

    async fn logs_in_range(
        &self,
        address: Address,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<RawLog>, SourceError> {
        let mut state = self.lock();
        state.requested_ranges.push((from_block, to_block));
        if state.range_failures > 0 {
            state.range_failures -= 1;
            return Err(node_error("range unavailable"));
        }

        let mut logs: Vec<RawLog> = state
            .logs
            .iter()
            .filter(|log| log.address == address)
            .filter(|log| {
                log.block_number
                    .is_some_and(|block| block >= from_block && block <= to_block)
            })
            .cloned()
            .collect();
        logs.sort_by_key(|log| (log.block_number, log.log_index));
        Ok(logs)
    }

    async fn subscribe_logs(&self, address: Address) -> Result<LogStream, SourceError> {
        let script = {
            let mut state = self.lock();
            state.subscribe_attempts += 1;
            state
                .subscriptions
                .pop_front()
                .unwrap_or(SubscriptionScript::Refused)
        };

        let matching = |logs: Vec<RawLog>| {
            logs.into_iter()
                .filter(move |log| log.address == address)
                .map(Ok)
                .collect::<Vec<_>>()
        };

        match script {
            SubscriptionScript::Closing(logs) => Ok(stream::iter(matching(logs)).boxed()),
            SubscriptionScript::Open(logs) => Ok(stream::iter(matching(logs))
                .chain(stream::pending())
                .boxed()),
            SubscriptionScript::Lagging {
                before,
                skipped,
                after,
            } => Ok(stream::iter(matching(before))
                .chain(stream::once(async move {
                    Err(SourceError::Lagged { skipped })
                }))
                .chain(stream::iter(matching(after)))
                .boxed()),
            SubscriptionScript::Refused => Err(node_error("subscription refused")),
            SubscriptionScript::Unsupported => Err(SourceError::SubscriptionUnsupported),
        }
    }
}

#[async_trait]
impl ChainReader for MemorySource {
    async fn transaction(&self, hash: B256) -> Result<Option<TransactionInfo>, SourceError> {
        Ok(self.lock().transactions.get(&hash).cloned())
    }

    async fn receipt(&self, hash: B256) -> Result<Option<ReceiptInfo>, SourceError> {
        Ok(self.lock().receipts.get(&hash).cloned())
    }

    async fn call(&self, _to: Address, _input: Bytes) -> Result<Bytes, SourceError> {
        self.lock()
            .call_response
            .clone()
            .ok_or_else(|| node_error("execution reverted"))
    }
}
