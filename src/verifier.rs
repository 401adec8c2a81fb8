use std::{str::FromStr, sync::Arc};

use alloy_primitives::{Address, B256, U256};
use tracing::{info, warn};

use crate::indexer::rpc::ChainReader;
use crate::models::errors::VerifyError;
use crate::models::verification::{VerificationResult, VerificationStatus};

/// What a payment transaction must satisfy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Expectation {
    pub recipient: Option<Address>,
    pub min_amount: Option<U256>,
}

impl Expectation {
    pub fn payment(recipient: Address, min_amount: U256) -> Self {
        Self {
            recipient: Some(recipient),
            min_amount: Some(min_amount),
        }
    }

    fn is_empty(&self) -> bool {
        self.recipient.is_none() && self.min_amount.is_none()
    }
}

pub struct TransactionVerifier {
    reader: Arc<dyn ChainReader>,
    contract: Option<Address>,
}

impl TransactionVerifier {
    /// `contract` is used to flag direct calls to the marketplace.
    pub fn new(reader: Arc<dyn ChainReader>, contract: Option<Address>) -> Self {
        Self { reader, contract }
    }

    pub fn parse_hash(tx_hash: &str) -> Result<B256, VerifyError> {
        let hash = B256::from_str(tx_hash.trim())
            .map_err(|_| VerifyError::InvalidHash(tx_hash.to_string()))?;
        if hash.is_zero() {
            return Err(VerifyError::InvalidHash(tx_hash.to_string()));
        }
        Ok(hash)
    }

    pub async fn verify(
        &self,
        tx_hash: &str,
        expectation: &Expectation,
    ) -> Result<VerificationResult, VerifyError> {
        let hash = Self::parse_hash(tx_hash)?;

        let tx = self
            .reader
            .transaction(hash)
            .await?
            .ok_or(VerifyError::NotFound(hash))?;
        let is_contract_call = self.contract.is_some() && tx.to == self.contract;

        if tx.is_pending() {
            info!("Transaction {} is still pending", hash);
            return Ok(VerificationResult {
                tx_hash: hash,
                status: VerificationStatus::Pending,
                block_number: None,
                gas_used: None,
                success: false,
                is_contract_call,
            });
        }

        let receipt = self
            .reader
            .receipt(hash)
            .await?
            .ok_or(VerifyError::ReceiptUnavailable(hash))?;

        let result = VerificationResult {
            tx_hash: hash,
            status: if receipt.success {
                VerificationStatus::Success
            } else {
                VerificationStatus::Failed
            },
            block_number: receipt.block_number.or(tx.block_number),
            gas_used: Some(receipt.gas_used),
            success: receipt.success,
            is_contract_call,
        };

        if expectation.is_empty() {
            return Ok(result);
        }

        if !receipt.success {
            warn!("Payment transaction {} reverted", hash);
            return Err(VerifyError::Reverted(hash));
        }
        if let Some(expected) = expectation.min_amount {
            if tx.value < expected {
                warn!(
                    "Payment transaction {} sent {} wei, expected {}",
                    hash, tx.value, expected
                );
                return Err(VerifyError::InsufficientAmount {
                    expected,
                    actual: tx.value,
                });
            }
        }
        if let Some(expected) = expectation.recipient {
            let actual = tx.to.ok_or(VerifyError::NoRecipient)?;
            if actual != expected {
                warn!(
                    "Payment transaction {} went to {}, expected {}",
                    hash, actual, expected
                );
                return Err(VerifyError::WrongRecipient { expected, actual });
            }
        }

        info!("Payment transaction {} verified", hash);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::rpc::memory::MemorySource;
    use crate::models::verification::{ReceiptInfo, TransactionInfo};
    use alloy_primitives::address;

    const WALLET: Address = address!("0x7777777777777777777777777777777777777777");
    const CONTRACT: Address = address!("0xcccccccccccccccccccccccccccccccccccccccc");

    fn hash() -> B256 {
        B256::repeat_byte(0x12)
    }

    fn tx(to: Option<Address>, value: u64, block_number: Option<u64>) -> TransactionInfo {
        TransactionInfo {
            hash: hash(),
            from: Address::repeat_byte(0x01),
            to,
            value: U256::from(value),
            block_number,
        }
    }

    fn receipt(success: bool) -> ReceiptInfo {
        ReceiptInfo {
            block_number: Some(500),
            gas_used: 21_000,
            success,
        }
    }

    fn verifier(source: Arc<MemorySource>) -> TransactionVerifier {
        TransactionVerifier::new(source, Some(CONTRACT))
    }

    fn expectation() -> Expectation {
        Expectation::payment(WALLET, U256::from(1_000u64))
    }

    #[tokio::test]
    async fn malformed_and_zero_hashes_are_rejected() {
        let source = Arc::new(MemorySource::new(0));
        let verifier = verifier(source);

        let zero = B256::ZERO.to_string();
        for input in ["", "0x1234", "not-a-hash", zero.as_str()] {
            assert!(matches!(
                verifier.verify(input, &Expectation::default()).await,
                Err(VerifyError::InvalidHash(_))
            ));
        }
    }

    #[tokio::test]
    async fn unknown_transaction_is_not_found() {
        let source = Arc::new(MemorySource::new(0));
        let result = verifier(source)
            .verify(&hash().to_string(), &Expectation::default())
            .await;
        assert!(matches!(result, Err(VerifyError::NotFound(h)) if h == hash()));
    }

    #[tokio::test]
    async fn pending_transaction_has_no_receipt_fields() {
        let source = Arc::new(MemorySource::new(0));
        source.insert_transaction(tx(Some(WALLET), 1_000, None));

        let result = verifier(source)
            .verify(&hash().to_string(), &expectation())
            .await
            .unwrap();

        assert_eq!(result.status, VerificationStatus::Pending);
        assert!(!result.success);
        assert_eq!(result.block_number, None);
        assert_eq!(result.gas_used, None);
    }

    #[tokio::test]
    async fn successful_contract_call() {
        let source = Arc::new(MemorySource::new(0));
        source.insert_transaction(tx(Some(CONTRACT), 0, Some(500)));
        source.insert_receipt(hash(), receipt(true));

        let result = verifier(source)
            .verify(&hash().to_string(), &Expectation::default())
            .await
            .unwrap();

        assert_eq!(result.status, VerificationStatus::Success);
        assert!(result.success);
        assert!(result.is_contract_call);
        assert_eq!(result.block_number, Some(500));
        assert_eq!(result.gas_used, Some(21_000));
    }

    #[tokio::test]
    async fn reverted_transaction_without_expectations_reports_failed() {
        let source = Arc::new(MemorySource::new(0));
        source.insert_transaction(tx(Some(WALLET), 1_000, Some(500)));
        source.insert_receipt(hash(), receipt(false));

        let result = verifier(source)
            .verify(&hash().to_string(), &Expectation::default())
            .await
            .unwrap();

        assert_eq!(result.status, VerificationStatus::Failed);
        assert!(!result.success);
        assert!(!result.is_contract_call);
    }

    #[tokio::test]
    async fn reverted_payment_is_rejected() {
        let source = Arc::new(MemorySource::new(0));
        source.insert_transaction(tx(Some(WALLET), 1_000, Some(500)));
        source.insert_receipt(hash(), receipt(false));

        let result = verifier(source)
            .verify(&hash().to_string(), &expectation())
            .await;
        assert!(matches!(result, Err(VerifyError::Reverted(_))));
    }

    #[tokio::test]
    async fn short_payment_to_right_address_is_insufficient() {
        let source = Arc::new(MemorySource::new(0));
        source.insert_transaction(tx(Some(WALLET), 999, Some(500)));
        source.insert_receipt(hash(), receipt(true));

        let result = verifier(source)
            .verify(&hash().to_string(), &expectation())
            .await;

        match result {
            Err(VerifyError::InsufficientAmount { expected, actual }) => {
                assert_eq!(expected, U256::from(1_000u64));
                assert_eq!(actual, U256::from(999u64));
            }
            other => panic!("expected InsufficientAmount, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn payment_to_other_address_is_wrong_recipient() {
        let source = Arc::new(MemorySource::new(0));
        source.insert_transaction(tx(Some(Address::repeat_byte(0x99)), 5_000, Some(500)));
        source.insert_receipt(hash(), receipt(true));

        let result = verifier(source)
            .verify(&hash().to_string(), &expectation())
            .await;
        assert!(matches!(result, Err(VerifyError::WrongRecipient { .. })));
    }

    #[tokio::test]
    async fn contract_creation_has_no_recipient() {
        let source = Arc::new(MemorySource::new(0));
        source.insert_transaction(tx(None, 5_000, Some(500)));
        source.insert_receipt(hash(), receipt(true));

        let result = verifier(source)
            .verify(&hash().to_string(), &expectation())
            .await;
        assert!(matches!(result, Err(VerifyError::NoRecipient)));
    }

    #[tokio::test]
    async fn exact_payment_is_accepted() {
        let source = Arc::new(MemorySource::new(0));
        source.insert_transaction(tx(Some(WALLET), 1_000, Some(500)));
        source.insert_receipt(hash(), receipt(true));

        let result = verifier(source)
            .verify(&hash().to_string(), &expectation())
            .await
            .unwrap();
        assert!(result.success);
    }

    #[tokio::test]
    async fn missing_receipt_is_reported() {
        let source = Arc::new(MemorySource::new(0));
        source.insert_transaction(tx(Some(WALLET), 1_000, Some(500)));

        let result = verifier(source)
            .verify(&hash().to_string(), &Expectation::default())
            .await;
        assert!(matches!(result, Err(VerifyError::ReceiptUnavailable(_))));
    }
}
