use std::{sync::Arc, time::Duration};

use alloy_primitives::{Address, B256, U256};
use alloy_transport::{RpcError, TransportErrorKind};
use thiserror::Error;

use crate::models::events::EventKind;

#[derive(Error, Debug, Clone)]
pub enum SourceError {
    #[error("RPC error: {0}")]
    Rpc(Arc<RpcError<TransportErrorKind>>),
    #[error("RPC call timed out after {elapsed:?}")]
    Timeout { elapsed: Duration },
    #[error("Log subscriptions are not supported by this transport")]
    SubscriptionUnsupported,
    #[error("Log subscription lagged, {skipped} notifications dropped")]
    Lagged { skipped: u64 },
}

impl From<RpcError<TransportErrorKind>> for SourceError {
    fn from(error: RpcError<TransportErrorKind>) -> Self {
        if matches!(error, RpcError::Transport(TransportErrorKind::PubsubUnavailable)) {
            return SourceError::SubscriptionUnsupported;
        }
        SourceError::Rpc(Arc::new(error))
    }
}

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Log has no topics")]
    NoTopics,
    #[error("Log is missing required field: {field}")]
    MissingField { field: &'static str },
    #[error("{kind} log is missing indexed fields {missing:?} (expected {expected} topics, got {found})")]
    MissingTopics {
        kind: EventKind,
        expected: usize,
        found: usize,
        missing: Vec<&'static str>,
    },
    #[error("{kind} log has {found} topics, expected {expected}")]
    UnexpectedTopics {
        kind: EventKind,
        expected: usize,
        found: usize,
    },
    #[error("Failed to decode {kind} payload: {source}")]
    Payload {
        kind: EventKind,
        #[source]
        source: alloy_sol_types::Error,
    },
    #[error("{kind} field {field} does not fit in u64: {value}")]
    OutOfRange {
        kind: EventKind,
        field: &'static str,
        value: U256,
    },
}

/// Outcome of a single delivery attempt.
#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("Backend responded with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Failed to serialize {kind} payload: {source}")]
    Serialize {
        kind: EventKind,
        #[source]
        source: serde_json::Error,
    },
    #[error("Backend rejected {path} permanently: {source}")]
    Rejected {
        path: String,
        #[source]
        source: DeliveryError,
    },
    #[error("Delivery to {path} failed after {attempts} attempts: {source}")]
    Exhausted {
        path: String,
        attempts: u32,
        #[source]
        source: DeliveryError,
    },
}

#[derive(Error, Debug)]
pub enum VerifyError {
    #[error("Invalid transaction hash: {0}")]
    InvalidHash(String),
    #[error("Transaction not found: {0}")]
    NotFound(B256),
    #[error("Receipt not available for transaction {0}")]
    ReceiptUnavailable(B256),
    #[error("Transaction {0} reverted")]
    Reverted(B256),
    #[error("Insufficient amount: expected at least {expected} wei, got {actual} wei")]
    InsufficientAmount { expected: U256, actual: U256 },
    #[error("Transaction has no recipient")]
    NoRecipient,
    #[error("Wrong recipient: expected {expected}, got {actual}")]
    WrongRecipient { expected: Address, actual: Address },
    #[error(transparent)]
    Node(#[from] SourceError),
}

#[derive(Error, Debug)]
pub enum ItemError {
    #[error("Item {0} does not exist")]
    NotFound(u64),
    #[error("Failed to decode getItem response: {0}")]
    Decode(#[from] alloy_sol_types::Error),
    #[error("Item field {field} does not fit in u64: {value}")]
    OutOfRange { field: &'static str, value: U256 },
    #[error("Unknown item status code: {0}")]
    UnknownStatus(u8),
    #[error(transparent)]
    Node(#[from] SourceError),
}

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Product not found: {0}")]
    NotFound(String),
    #[error("Catalog responded with status {status}")]
    Status { status: u16 },
    #[error("Catalog request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Transaction {0} is still pending")]
    Pending(B256),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Verification(#[from] VerifyError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}
