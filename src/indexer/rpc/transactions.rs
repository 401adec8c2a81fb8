use alloy_consensus::Transaction as _;
use alloy_network::{ReceiptResponse, TransactionResponse};
use alloy_rpc_types_eth::{Transaction, TransactionReceipt};

use crate::models::verification::{ReceiptInfo, TransactionInfo};

pub trait TransactionParser {
    fn parse_transaction(&self) -> TransactionInfo;
}

impl TransactionParser for Transaction {
    fn parse_transaction(&self) -> TransactionInfo {
        TransactionInfo {
            hash: TransactionResponse::tx_hash(self),
            from: TransactionResponse::from(self),
            to: self.to(),
            value: self.value(),
            block_number: self.block_number,
        }
    }
}

pub trait ReceiptParser {
    fn parse_receipt(&self) -> ReceiptInfo;
}

impl ReceiptParser for TransactionReceipt {
    fn parse_receipt(&self) -> ReceiptInfo {
        ReceiptInfo {
            block_number: self.block_number,
            gas_used: self.gas_used,
            success: ReceiptResponse::status(self),
        }
    }
}
