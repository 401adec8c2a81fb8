use alloy_primitives::{Address, U256};
use serde::{Serialize, Serializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ItemStatus {
    Listed,
    Purchased,
    Completed,
    Cancelled,
}

impl ItemStatus {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Listed),
            1 => Some(Self::Purchased),
            2 => Some(Self::Completed),
            3 => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// Current on-chain state of a marketplace item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContractItem {
    pub item_id: u64,
    pub token_id: u64,
    pub title: String,
    #[serde(rename = "price_wei", serialize_with = "as_decimal")]
    pub price: U256,
    pub explanation: String,
    pub image_url: String,
    pub uid: String,
    pub created_at: u64,
    pub updated_at: u64,
    pub is_purchased: bool,
    pub category: String,
    pub seller: Address,
    pub buyer: Address,
    pub status: ItemStatus,
}

pub(crate) fn as_decimal<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&value.to_string())
}
