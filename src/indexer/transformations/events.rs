use std::{collections::HashMap, sync::Arc};

use alloy_primitives::{Address, B256, U256};
use alloy_sol_types::SolEvent;
use tracing::{debug, warn};

use crate::metrics::Metrics;
use crate::models::abi;
use crate::models::errors::DecodeError;
use crate::models::events::{
    ContractEvent, EventData, EventKind, ItemCancelled, ItemListed, ItemPurchased, ItemUpdated,
    RawLog, ReceiptConfirmed,
};

/// Topic layout of one contract event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSchema {
    pub kind: EventKind,
    pub signature: B256,
    /// Names of the indexed parameters, in topic order after the signature.
    pub indexed: &'static [&'static str],
}

impl EventSchema {
    pub fn for_kind(kind: EventKind) -> Self {
        let (signature, indexed): (B256, &'static [&'static str]) = match kind {
            EventKind::ItemListed => (
                abi::ItemListed::SIGNATURE_HASH,
                &["itemId", "tokenId", "seller"],
            ),
            EventKind::ItemPurchased => (abi::ItemPurchased::SIGNATURE_HASH, &["itemId", "buyer"]),
            EventKind::ItemUpdated => (abi::ItemUpdated::SIGNATURE_HASH, &["itemId"]),
            EventKind::ItemCancelled => {
                (abi::ItemCancelled::SIGNATURE_HASH, &["itemId", "seller"])
            }
            EventKind::ReceiptConfirmed => (
                abi::ReceiptConfirmed::SIGNATURE_HASH,
                &["itemId", "buyer", "seller"],
            ),
        };
        Self {
            kind,
            signature,
            indexed,
        }
    }

    pub fn expected_topics(&self) -> usize {
        self.indexed.len() + 1
    }
}

/// Turns raw logs of one contract into typed events.
pub struct EventDecoder {
    address: Address,
    schemas: HashMap<B256, EventSchema>,
    metrics: Option<Arc<Metrics>>,
}

impl EventDecoder {
    pub fn new(address: Address) -> Self {
        let schemas = EventKind::ALL
            .into_iter()
            .map(EventSchema::for_kind)
            .map(|schema| (schema.signature, schema))
            .collect();
        Self {
            address,
            schemas,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Option<Arc<Metrics>>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Decodes a log into a typed event.
    ///
    /// Returns `Ok(None)` for logs that are not ours to decode: a different
    /// emitting address, an unknown signature or a log removed by a reorg.
    pub fn decode(&self, log: &RawLog) -> Result<Option<ContractEvent>, DecodeError> {
        if log.address != self.address {
            return Ok(None);
        }
        let Some(signature) = log.topics.first() else {
            return Err(DecodeError::NoTopics);
        };
        let Some(schema) = self.schemas.get(signature) else {
            return Ok(None);
        };
        if log.removed {
            return Ok(None);
        }

        check_topics(schema, log.topics.len())?;

        let tx_hash = log
            .tx_hash
            .ok_or(DecodeError::MissingField { field: "tx_hash" })?;
        let block_number = log.block_number.ok_or(DecodeError::MissingField {
            field: "block_number",
        })?;

        let (item_id, data) = decode_payload(schema.kind, log)?;

        Ok(Some(ContractEvent {
            tx_hash,
            block_number,
            log_index: log.log_index,
            item_id,
            data,
        }))
    }

    /// Like [`decode`](Self::decode), but logs and swallows failures so a
    /// single bad entry never stops a scan or a stream.
    pub fn decode_or_skip(&self, log: &RawLog) -> Option<ContractEvent> {
        match self.decode(log) {
            Ok(Some(event)) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_decoded(event.kind(), event.block_number);
                }
                Some(event)
            }
            Ok(None) => {
                debug!(
                    "Skipping log from {} with topic0 {:?} (tx {:?})",
                    log.address,
                    log.topics.first(),
                    log.tx_hash
                );
                None
            }
            Err(e) => {
                warn!(
                    "Failed to decode log in block {:?} (tx {:?}): {}",
                    log.block_number, log.tx_hash, e
                );
                if let Some(metrics) = &self.metrics {
                    metrics.record_decode_failure();
                }
                None
            }
        }
    }
}

fn check_topics(schema: &EventSchema, found: usize) -> Result<(), DecodeError> {
    let expected = schema.expected_topics();
    if found < expected {
        // Topic 0 is the signature, so topic i carries indexed field i - 1
        let missing = schema.indexed[found.saturating_sub(1)..].to_vec();
        return Err(DecodeError::MissingTopics {
            kind: schema.kind,
            expected,
            found,
            missing,
        });
    }
    if found > expected {
        return Err(DecodeError::UnexpectedTopics {
            kind: schema.kind,
            expected,
            found,
        });
    }
    Ok(())
}

fn decode_payload(kind: EventKind, log: &RawLog) -> Result<(u64, EventData), DecodeError> {
    let topics = log.topics.iter().copied();
    let payload_error = |source| DecodeError::Payload { kind, source };

    match kind {
        EventKind::ItemListed => {
            let e = abi::ItemListed::decode_raw_log(topics, &log.data).map_err(payload_error)?;
            Ok((
                to_u64(kind, "itemId", e.itemId)?,
                EventData::ItemListed(ItemListed {
                    token_id: to_u64(kind, "tokenId", e.tokenId)?,
                    seller: e.seller,
                    title: e.title,
                    price: e.price,
                    explanation: e.explanation,
                    image_url: e.imageUrl,
                    uid: e.uid,
                    created_at: to_u64(kind, "createdAt", e.createdAt)?,
                    category: e.category,
                }),
            ))
        }
        EventKind::ItemPurchased => {
            let e = abi::ItemPurchased::decode_raw_log(topics, &log.data).map_err(payload_error)?;
            Ok((
                to_u64(kind, "itemId", e.itemId)?,
                EventData::ItemPurchased(ItemPurchased {
                    buyer: e.buyer,
                    price: e.price,
                    timestamp: to_u64(kind, "timestamp", e.timestamp)?,
                    token_id: to_u64(kind, "tokenId", e.tokenId)?,
                }),
            ))
        }
        EventKind::ItemUpdated => {
            let e = abi::ItemUpdated::decode_raw_log(topics, &log.data).map_err(payload_error)?;
            Ok((
                to_u64(kind, "itemId", e.itemId)?,
                EventData::ItemUpdated(ItemUpdated {
                    title: e.title,
                    price: e.price,
                    explanation: e.explanation,
                    image_url: e.imageUrl,
                    category: e.category,
                    updated_at: to_u64(kind, "updatedAt", e.updatedAt)?,
                }),
            ))
        }
        EventKind::ItemCancelled => {
            let e = abi::ItemCancelled::decode_raw_log(topics, &log.data).map_err(payload_error)?;
            Ok((
                to_u64(kind, "itemId", e.itemId)?,
                EventData::ItemCancelled(ItemCancelled {
                    seller: e.seller,
                    timestamp: to_u64(kind, "timestamp", e.timestamp)?,
                }),
            ))
        }
        EventKind::ReceiptConfirmed => {
            let e =
                abi::ReceiptConfirmed::decode_raw_log(topics, &log.data).map_err(payload_error)?;
            Ok((
                to_u64(kind, "itemId", e.itemId)?,
                EventData::ReceiptConfirmed(ReceiptConfirmed {
                    buyer: e.buyer,
                    seller: e.seller,
                    price: e.price,
                    timestamp: to_u64(kind, "timestamp", e.timestamp)?,
                }),
            ))
        }
    }
}

fn to_u64(kind: EventKind, field: &'static str, value: U256) -> Result<u64, DecodeError> {
    u64::try_from(value).map_err(|_| DecodeError::OutOfRange { kind, field, value })
}
