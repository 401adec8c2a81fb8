use std::{sync::Arc, time::Duration};

use alloy_primitives::{Address, U256, utils::format_ether};
use chrono::Utc;
use reqwest::StatusCode;
use tracing::{info, warn};

use crate::models::errors::{CatalogError, PaymentError};
use crate::models::payment::{PaymentOrder, PaymentStatus, Product};
use crate::models::verification::VerificationStatus;
use crate::verifier::{Expectation, TransactionVerifier};

/// Product lookups against the backend catalog.
pub struct ProductCatalog {
    client: reqwest::Client,
    base_url: String,
}

impl ProductCatalog {
    pub fn new(
        base_url: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub async fn product(&self, product_id: &str) -> Result<Product, CatalogError> {
        let url = format!("{}/getItems/{}", self.base_url, product_id);
        let response = self.client.get(&url).send().await?;

        match response.status() {
            status if status.is_success() => Ok(response.json::<Product>().await?),
            StatusCode::NOT_FOUND => Err(CatalogError::NotFound(product_id.to_string())),
            status => Err(CatalogError::Status {
                status: status.as_u16(),
            }),
        }
    }
}

/// Creates ETH payment orders for catalog products and confirms them
/// against on-chain transfers to the collect wallet.
pub struct PaymentService {
    catalog: ProductCatalog,
    verifier: Arc<TransactionVerifier>,
    collect_address: Address,
    amount_wei: U256,
}

impl PaymentService {
    pub fn new(
        catalog: ProductCatalog,
        verifier: Arc<TransactionVerifier>,
        collect_address: Address,
        amount_wei: U256,
    ) -> Self {
        Self {
            catalog,
            verifier,
            collect_address,
            amount_wei,
        }
    }

    pub async fn create_order(
        &self,
        product_id: &str,
        buyer_wallet: Option<String>,
    ) -> Result<PaymentOrder, PaymentError> {
        let product_id = non_empty("product_id", product_id)?;
        let product = self.catalog.product(product_id).await?;

        let order = self.order(product_id, &product, buyer_wallet);
        info!(
            "Created payment order {} for product {} ({} wei)",
            order.order_id, product_id, order.amount_wei
        );
        Ok(order)
    }

    pub async fn confirm_payment(
        &self,
        order_id: &str,
        product_id: &str,
        tx_hash: &str,
    ) -> Result<PaymentOrder, PaymentError> {
        let order_id = non_empty("order_id", order_id)?;
        let product_id = non_empty("product_id", product_id)?;
        let product = self.catalog.product(product_id).await?;

        let expectation = Expectation::payment(self.collect_address, self.amount_wei);
        let verification = match self.verifier.verify(tx_hash, &expectation).await {
            Ok(verification) => verification,
            Err(e) => {
                warn!("Payment for order {} failed verification: {}", order_id, e);
                return Err(e.into());
            }
        };
        if verification.status == VerificationStatus::Pending {
            return Err(PaymentError::Pending(verification.tx_hash));
        }

        let mut order = self.order(product_id, &product, None);
        order.order_id = order_id.to_string();
        order.status = PaymentStatus::Paid;
        order.tx_hash = Some(verification.tx_hash);

        info!(
            "Order {} paid by transaction {}",
            order.order_id, verification.tx_hash
        );
        Ok(order)
    }

    fn order(
        &self,
        product_id: &str,
        product: &Product,
        buyer_wallet: Option<String>,
    ) -> PaymentOrder {
        let created_at = Utc::now();
        PaymentOrder {
            order_id: format!("ORDER-{}-{}", product_id, created_at.format("%Y%m%d%H%M%S")),
            product_id: product_id.to_string(),
            product_name: product.title.clone(),
            price_yen: product.price,
            amount_eth: ether_string(self.amount_wei),
            amount_wei: self.amount_wei,
            payment_addr: self.collect_address,
            buyer_wallet,
            status: PaymentStatus::Pending,
            tx_hash: None,
            created_at,
        }
    }
}

fn non_empty<'a>(field: &str, value: &'a str) -> Result<&'a str, PaymentError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(PaymentError::InvalidRequest(format!("{field} is required")));
    }
    Ok(value)
}

/// `1000000000000000` wei renders as `0.001`.
fn ether_string(amount_wei: U256) -> String {
    let formatted = format_ether(amount_wei);
    if formatted.contains('.') {
        formatted
            .trim_end_matches('0')
            .trim_end_matches('.')
            .to_string()
    } else {
        formatted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::rpc::memory::MemorySource;
    use crate::models::errors::VerifyError;
    use crate::models::verification::{ReceiptInfo, TransactionInfo};
    use alloy_primitives::B256;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const AMOUNT: u64 = 1_000_000_000_000_000;

    fn collect() -> Address {
        Address::repeat_byte(0x77)
    }

    async fn catalog_server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/getItems/42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": 42,
                "title": "Widget",
                "price": 1500,
                "explanation": "A widget",
                "image_urls": ["https://img.example/widget.png"],
                "uid": "user-1",
                "ifPurchased": false,
                "category": "tools",
                "like_count": 3,
                "created_at": "2025-01-01T00:00:00Z"
            })))
            .mount(&server)
            .await;
        server
    }

    fn service(server: &MockServer, source: Arc<MemorySource>) -> PaymentService {
        let catalog = ProductCatalog::new(server.uri(), Duration::from_secs(5)).unwrap();
        let verifier = Arc::new(TransactionVerifier::new(source, None));
        PaymentService::new(catalog, verifier, collect(), U256::from(AMOUNT))
    }

    fn paid(source: &MemorySource, value: u64) -> String {
        let hash = B256::repeat_byte(0x34);
        source.insert_transaction(TransactionInfo {
            hash,
            from: Address::repeat_byte(0x01),
            to: Some(collect()),
            value: U256::from(value),
            block_number: Some(10),
        });
        source.insert_receipt(
            hash,
            ReceiptInfo {
                block_number: Some(10),
                gas_used: 21_000,
                success: true,
            },
        );
        hash.to_string()
    }

    #[test]
    fn ether_string_trims_trailing_zeros() {
        assert_eq!(ether_string(U256::from(AMOUNT)), "0.001");
        assert_eq!(ether_string(U256::from(2_000_000_000_000_000_000u128)), "2");
    }

    #[tokio::test]
    async fn create_order_prices_product() {
        let server = catalog_server().await;
        let order = service(&server, Arc::new(MemorySource::new(0)))
            .create_order("42", Some("0xbuyer".to_string()))
            .await
            .unwrap();

        assert!(order.order_id.starts_with("ORDER-42-"));
        assert_eq!(order.product_name, "Widget");
        assert_eq!(order.price_yen, 1500);
        assert_eq!(order.amount_eth, "0.001");
        assert_eq!(order.amount_wei, U256::from(AMOUNT));
        assert_eq!(order.payment_addr, collect());
        assert_eq!(order.status, PaymentStatus::Pending);

        let json = serde_json::to_value(&order).unwrap();
        assert_eq!(json["amount_wei"], "1000000000000000");
        assert_eq!(json["status"], "PENDING");
    }

    #[tokio::test]
    async fn unknown_product_is_not_found() {
        let server = catalog_server().await;
        let result = service(&server, Arc::new(MemorySource::new(0)))
            .create_order("7", None)
            .await;
        assert!(matches!(
            result,
            Err(PaymentError::Catalog(CatalogError::NotFound(_)))
        ));
    }

    #[tokio::test]
    async fn confirm_marks_order_paid() {
        let server = catalog_server().await;
        let source = Arc::new(MemorySource::new(0));
        let tx_hash = paid(&source, AMOUNT);

        let order = service(&server, source)
            .confirm_payment("ORDER-42-1", "42", &tx_hash)
            .await
            .unwrap();

        assert_eq!(order.order_id, "ORDER-42-1");
        assert_eq!(order.status, PaymentStatus::Paid);
        assert_eq!(order.tx_hash, Some(B256::repeat_byte(0x34)));
    }

    #[tokio::test]
    async fn confirm_rejects_short_payment() {
        let server = catalog_server().await;
        let source = Arc::new(MemorySource::new(0));
        let tx_hash = paid(&source, AMOUNT - 1);

        let result = service(&server, source)
            .confirm_payment("ORDER-42-1", "42", &tx_hash)
            .await;
        assert!(matches!(
            result,
            Err(PaymentError::Verification(VerifyError::InsufficientAmount { .. }))
        ));
    }

    #[tokio::test]
    async fn confirm_reports_pending() {
        let server = catalog_server().await;
        let source = Arc::new(MemorySource::new(0));
        let hash = B256::repeat_byte(0x56);
        source.insert_transaction(TransactionInfo {
            hash,
            from: Address::repeat_byte(0x01),
            to: Some(collect()),
            value: U256::from(AMOUNT),
            block_number: None,
        });

        let result = service(&server, source)
            .confirm_payment("ORDER-42-1", "42", &hash.to_string())
            .await;
        assert!(matches!(result, Err(PaymentError::Pending(h)) if h == hash));
    }

    #[tokio::test]
    async fn missing_fields_are_rejected() {
        let server = catalog_server().await;
        let result = service(&server, Arc::new(MemorySource::new(0)))
            .confirm_payment(" ", "42", "0x00")
            .await;
        assert!(matches!(result, Err(PaymentError::InvalidRequest(_))));
    }
}
