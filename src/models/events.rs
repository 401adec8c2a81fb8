use std::fmt;

use alloy_primitives::{Address, B256, Bytes, U256};
use serde::{Deserialize, Serialize};

/// A log entry as delivered by the node, before any decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub tx_hash: Option<B256>,
    pub block_number: Option<u64>,
    pub log_index: Option<u64>,
    pub removed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    ItemListed,
    ItemPurchased,
    ItemUpdated,
    ItemCancelled,
    ReceiptConfirmed,
}

impl EventKind {
    pub const ALL: [EventKind; 5] = [
        EventKind::ItemListed,
        EventKind::ItemPurchased,
        EventKind::ItemUpdated,
        EventKind::ItemCancelled,
        EventKind::ReceiptConfirmed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::ItemListed => "ItemListed",
            EventKind::ItemPurchased => "ItemPurchased",
            EventKind::ItemUpdated => "ItemUpdated",
            EventKind::ItemCancelled => "ItemCancelled",
            EventKind::ReceiptConfirmed => "ReceiptConfirmed",
        }
    }

    /// Backend route segment this kind is delivered to.
    pub fn endpoint(&self) -> &'static str {
        match self {
            EventKind::ItemListed => "/item-listed",
            EventKind::ItemPurchased => "/item-purchased",
            EventKind::ItemUpdated => "/item-updated",
            EventKind::ItemCancelled => "/item-cancelled",
            EventKind::ReceiptConfirmed => "/receipt-confirmed",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemListed {
    pub token_id: u64,
    pub seller: Address,
    pub title: String,
    pub price: U256,
    pub explanation: String,
    pub image_url: String,
    pub uid: String,
    pub created_at: u64,
    pub category: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemPurchased {
    pub buyer: Address,
    pub price: U256,
    pub timestamp: u64,
    pub token_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemUpdated {
    pub title: String,
    pub price: U256,
    pub explanation: String,
    pub image_url: String,
    pub category: String,
    pub updated_at: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemCancelled {
    pub seller: Address,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptConfirmed {
    pub buyer: Address,
    pub seller: Address,
    pub price: U256,
    pub timestamp: u64,
}

/// Kind-specific fields. The variant is the event kind, so a decoded event
/// can never carry fields that belong to another kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventData {
    ItemListed(ItemListed),
    ItemPurchased(ItemPurchased),
    ItemUpdated(ItemUpdated),
    ItemCancelled(ItemCancelled),
    ReceiptConfirmed(ReceiptConfirmed),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractEvent {
    pub tx_hash: B256,
    pub block_number: u64,
    pub log_index: Option<u64>,
    pub item_id: u64,
    pub data: EventData,
}

impl ContractEvent {
    pub fn kind(&self) -> EventKind {
        match &self.data {
            EventData::ItemListed(_) => EventKind::ItemListed,
            EventData::ItemPurchased(_) => EventKind::ItemPurchased,
            EventData::ItemUpdated(_) => EventKind::ItemUpdated,
            EventData::ItemCancelled(_) => EventKind::ItemCancelled,
            EventData::ReceiptConfirmed(_) => EventKind::ReceiptConfirmed,
        }
    }

    /// Key downstream consumers deduplicate on. Backfill and live ingestion
    /// may both deliver the same log.
    pub fn idempotency_key(&self) -> (EventKind, u64, B256) {
        (self.kind(), self.item_id, self.tx_hash)
    }
}
