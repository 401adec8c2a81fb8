use alloy_primitives::{Address, B256, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::item::as_decimal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Paid,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentOrder {
    pub order_id: String,
    pub product_id: String,
    pub product_name: String,
    pub price_yen: i64,
    pub amount_eth: String,
    #[serde(serialize_with = "as_decimal")]
    pub amount_wei: U256,
    pub payment_addr: Address,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buyer_wallet: Option<String>,
    pub status: PaymentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<B256>,
    pub created_at: DateTime<Utc>,
}

/// Product record served by the backend catalog.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Product {
    pub id: i64,
    pub title: String,
    pub price: i64,
    #[serde(default)]
    pub explanation: String,
    #[serde(default)]
    pub image_urls: Vec<String>,
    #[serde(default)]
    pub uid: String,
    #[serde(default, rename = "ifPurchased")]
    pub if_purchased: bool,
    #[serde(default)]
    pub category: String,
}
