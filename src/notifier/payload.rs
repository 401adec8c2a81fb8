use serde::Serialize;
use serde_json::Value;

use crate::models::errors::NotifyError;
use crate::models::events::{ContractEvent, EventData, EventKind};

/// A fully-built backend request: the route for the event kind and its JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub kind: EventKind,
    pub path: &'static str,
    pub body: Value,
}

#[derive(Serialize)]
struct ItemListedPayload<'a> {
    chain_item_id: u64,
    token_id: u64,
    title: &'a str,
    price_wei: String,
    explanation: &'a str,
    image_url: &'a str,
    uid: &'a str,
    category: &'a str,
    seller: String,
    created_at: u64,
    tx_hash: String,
}

#[derive(Serialize)]
struct ItemPurchasedPayload {
    chain_item_id: u64,
    buyer: String,
    price_wei: String,
    token_id: u64,
    tx_hash: String,
}

#[derive(Serialize)]
struct ItemUpdatedPayload<'a> {
    chain_item_id: u64,
    title: &'a str,
    price_wei: String,
    explanation: &'a str,
    image_url: &'a str,
    category: &'a str,
    updated_at: u64,
    tx_hash: String,
}

#[derive(Serialize)]
struct ItemCancelledPayload {
    chain_item_id: u64,
    seller: String,
    tx_hash: String,
}

#[derive(Serialize)]
struct ReceiptConfirmedPayload {
    chain_item_id: u64,
    buyer: String,
    seller: String,
    price_wei: String,
    tx_hash: String,
}

impl Notification {
    pub fn from_event(event: &ContractEvent) -> Result<Self, NotifyError> {
        let kind = event.kind();
        let chain_item_id = event.item_id;
        let tx_hash = event.tx_hash.to_string();

        let body = match &event.data {
            EventData::ItemListed(e) => serde_json::to_value(ItemListedPayload {
                chain_item_id,
                token_id: e.token_id,
                title: &e.title,
                price_wei: e.price.to_string(),
                explanation: &e.explanation,
                image_url: &e.image_url,
                uid: &e.uid,
                category: &e.category,
                seller: e.seller.to_checksum(None),
                created_at: e.created_at,
                tx_hash,
            }),
            EventData::ItemPurchased(e) => serde_json::to_value(ItemPurchasedPayload {
                chain_item_id,
                buyer: e.buyer.to_checksum(None),
                price_wei: e.price.to_string(),
                token_id: e.token_id,
                tx_hash,
            }),
            EventData::ItemUpdated(e) => serde_json::to_value(ItemUpdatedPayload {
                chain_item_id,
                title: &e.title,
                price_wei: e.price.to_string(),
                explanation: &e.explanation,
                image_url: &e.image_url,
                category: &e.category,
                updated_at: e.updated_at,
                tx_hash,
            }),
            EventData::ItemCancelled(e) => serde_json::to_value(ItemCancelledPayload {
                chain_item_id,
                seller: e.seller.to_checksum(None),
                tx_hash,
            }),
            EventData::ReceiptConfirmed(e) => serde_json::to_value(ReceiptConfirmedPayload {
                chain_item_id,
                buyer: e.buyer.to_checksum(None),
                seller: e.seller.to_checksum(None),
                price_wei: e.price.to_string(),
                tx_hash,
            }),
        }
        .map_err(|source| NotifyError::Serialize { kind, source })?;

        Ok(Self {
            kind,
            path: kind.endpoint(),
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::events::{ItemCancelled, ItemListed, ReceiptConfirmed};
    use alloy_primitives::{Address, B256, U256};
    use serde_json::json;

    fn event(data: EventData) -> ContractEvent {
        ContractEvent {
            tx_hash: B256::repeat_byte(0xaa),
            block_number: 10,
            log_index: Some(0),
            item_id: 7,
            data,
        }
    }

    #[test]
    fn item_listed_carries_price_as_decimal_string() {
        let seller = Address::repeat_byte(0xab);
        let notification = Notification::from_event(&event(EventData::ItemListed(ItemListed {
            token_id: 3,
            seller,
            title: "Widget".to_string(),
            price: U256::from(1_000_000_000_000_000u64),
            explanation: "desc".to_string(),
            image_url: "img".to_string(),
            uid: "uid-1".to_string(),
            created_at: 1_700_000_000,
            category: "tools".to_string(),
        })))
        .unwrap();

        assert_eq!(notification.path, "/item-listed");
        assert_eq!(
            notification.body,
            json!({
                "chain_item_id": 7,
                "token_id": 3,
                "title": "Widget",
                "price_wei": "1000000000000000",
                "explanation": "desc",
                "image_url": "img",
                "uid": "uid-1",
                "category": "tools",
                "seller": seller.to_checksum(None),
                "created_at": 1_700_000_000u64,
                "tx_hash": B256::repeat_byte(0xaa).to_string(),
            })
        );
    }

    #[test]
    fn item_cancelled_has_only_its_own_fields() {
        let notification = Notification::from_event(&event(EventData::ItemCancelled(
            ItemCancelled {
                seller: Address::repeat_byte(0x01),
                timestamp: 5,
            },
        )))
        .unwrap();

        assert_eq!(notification.path, "/item-cancelled");
        let fields: Vec<&str> = notification
            .body
            .as_object()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(fields, vec!["chain_item_id", "seller", "tx_hash"]);
    }

    #[test]
    fn receipt_confirmed_routes_to_its_endpoint() {
        let notification = Notification::from_event(&event(EventData::ReceiptConfirmed(
            ReceiptConfirmed {
                buyer: Address::repeat_byte(0x02),
                seller: Address::repeat_byte(0x03),
                price: U256::from(42u64),
                timestamp: 5,
            },
        )))
        .unwrap();

        assert_eq!(notification.kind, EventKind::ReceiptConfirmed);
        assert_eq!(notification.path, "/receipt-confirmed");
        assert_eq!(notification.body["price_wei"], "42");
    }
}
