use std::sync::Arc;

use alloy_primitives::{Address, U256};
use alloy_sol_types::{SolCall, SolValue};
use tracing::debug;

use crate::indexer::rpc::ChainReader;
use crate::models::abi;
use crate::models::errors::ItemError;
use crate::models::item::{ContractItem, ItemStatus};

/// Reads current item state straight from the marketplace contract.
pub struct ItemReader {
    reader: Arc<dyn ChainReader>,
    contract: Address,
}

impl ItemReader {
    pub fn new(reader: Arc<dyn ChainReader>, contract: Address) -> Self {
        Self { reader, contract }
    }

    pub async fn get_item(&self, item_id: u64) -> Result<ContractItem, ItemError> {
        let input = abi::getItemCall {
            _itemId: U256::from(item_id),
        }
        .abi_encode();

        let output = self.reader.call(self.contract, input.into()).await?;
        debug!("getItem({}) returned {} bytes", item_id, output.len());

        let item = <abi::Item as SolValue>::abi_decode(&output)?;
        // Unknown ids come back as a zeroed struct
        if item.itemId.is_zero() && item_id != 0 {
            return Err(ItemError::NotFound(item_id));
        }
        into_contract_item(item)
    }
}

fn into_contract_item(item: abi::Item) -> Result<ContractItem, ItemError> {
    Ok(ContractItem {
        item_id: to_u64("itemId", item.itemId)?,
        token_id: to_u64("tokenId", item.tokenId)?,
        title: item.title,
        price: item.price,
        explanation: item.explanation,
        image_url: item.imageUrl,
        uid: item.uid,
        created_at: to_u64("createdAt", item.createdAt)?,
        updated_at: to_u64("updatedAt", item.updatedAt)?,
        is_purchased: item.isPurchased,
        category: item.category,
        seller: item.seller,
        buyer: item.buyer,
        status: ItemStatus::from_code(item.status).ok_or(ItemError::UnknownStatus(item.status))?,
    })
}

fn to_u64(field: &'static str, value: U256) -> Result<u64, ItemError> {
    u64::try_from(value).map_err(|_| ItemError::OutOfRange { field, value })
}
