use std::sync::Arc;

use alloy_primitives::Address;
use axum::{
    Json, Router,
    extract::{
        Path, State,
        rejection::{JsonRejection, PathRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{error, warn};

use crate::indexer::IngestionState;
use crate::items::ItemReader;
use crate::models::errors::{CatalogError, ItemError, PaymentError, VerifyError};
use crate::models::item::ContractItem;
use crate::models::payment::PaymentOrder;
use crate::models::verification::VerificationResult;
use crate::payment::PaymentService;
use crate::verifier::{Expectation, TransactionVerifier};

/// Shared handles for the HTTP handlers. Contract and payment routes answer
/// 503 when their part of the configuration is missing.
#[derive(Clone)]
pub struct AppState {
    pub contract: Option<Address>,
    pub verifier: Arc<TransactionVerifier>,
    pub items: Option<Arc<ItemReader>>,
    pub payments: Option<Arc<PaymentService>>,
    pub ingestion: Option<watch::Receiver<IngestionState>>,
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Pending(String),
    #[error("{0}")]
    Verification(String),
    #[error("{0}")]
    Upstream(String),
    #[error("{0} is not configured")]
    Disabled(&'static str),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Pending(_) => StatusCode::CONFLICT,
            ApiError::Verification(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Disabled(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        if status.is_server_error() {
            error!("Request failed with {}: {}", status, self);
        }

        let body = Json(json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        }));
        (status, body).into_response()
    }
}

impl From<VerifyError> for ApiError {
    fn from(error: VerifyError) -> Self {
        let message = error.to_string();
        match error {
            VerifyError::InvalidHash(_) => ApiError::BadRequest(message),
            VerifyError::NotFound(_) => ApiError::NotFound(message),
            VerifyError::Reverted(_)
            | VerifyError::InsufficientAmount { .. }
            | VerifyError::NoRecipient
            | VerifyError::WrongRecipient { .. } => ApiError::Verification(message),
            VerifyError::ReceiptUnavailable(_) | VerifyError::Node(_) => {
                ApiError::Upstream(message)
            }
        }
    }
}

impl From<ItemError> for ApiError {
    fn from(error: ItemError) -> Self {
        match error {
            ItemError::NotFound(_) => ApiError::NotFound(error.to_string()),
            other => ApiError::Upstream(other.to_string()),
        }
    }
}

impl From<PaymentError> for ApiError {
    fn from(error: PaymentError) -> Self {
        match error {
            PaymentError::InvalidRequest(_) => ApiError::BadRequest(error.to_string()),
            PaymentError::Pending(_) => ApiError::Pending(error.to_string()),
            PaymentError::Catalog(CatalogError::NotFound(_)) => {
                ApiError::NotFound(error.to_string())
            }
            PaymentError::Catalog(other) => ApiError::Upstream(other.to_string()),
            PaymentError::Verification(e) => e.into(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub tx_hash: String,
}

#[derive(Debug, Deserialize)]
pub struct OrderRequest {
    pub product_id: String,
    #[serde(default)]
    pub buyer_wallet: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmRequest {
    pub order_id: String,
    pub product_id: String,
    pub tx_hash: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/v1/contract/info", get(contract_info))
        .route("/api/v1/contract/item/{item_id}", get(get_item))
        .route("/api/v1/contract/verify-tx", post(verify_tx))
        .route("/api/v1/payment/order", post(create_order))
        .route("/api/v1/payment/confirm", post(confirm_payment))
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

async fn contract_info(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let address = state.contract.ok_or(ApiError::Disabled("contract address"))?;
    let ingestion = state.ingestion.as_ref().map(|rx| *rx.borrow());

    Ok(Json(json!({
        "contract_address": address.to_checksum(None),
        "ingestion": ingestion,
    })))
}

async fn get_item(
    State(state): State<AppState>,
    item_id: Result<Path<u64>, PathRejection>,
) -> Result<Json<ContractItem>, ApiError> {
    let Path(item_id) = item_id?;
    let items = state.items.ok_or(ApiError::Disabled("contract address"))?;
    Ok(Json(items.get_item(item_id).await?))
}

async fn verify_tx(
    State(state): State<AppState>,
    payload: Result<Json<VerifyRequest>, JsonRejection>,
) -> Result<Json<VerificationResult>, ApiError> {
    let Json(request) = payload?;
    let result = state
        .verifier
        .verify(&request.tx_hash, &Expectation::default())
        .await?;
    Ok(Json(result))
}

async fn create_order(
    State(state): State<AppState>,
    payload: Result<Json<OrderRequest>, JsonRejection>,
) -> Result<Json<PaymentOrder>, ApiError> {
    let Json(request) = payload?;
    let payments = state.payments.ok_or(ApiError::Disabled("payment"))?;
    let order = payments
        .create_order(&request.product_id, request.buyer_wallet)
        .await?;
    Ok(Json(order))
}

async fn confirm_payment(
    State(state): State<AppState>,
    payload: Result<Json<ConfirmRequest>, JsonRejection>,
) -> Result<Json<PaymentOrder>, ApiError> {
    let Json(request) = payload?;
    let payments = state.payments.ok_or(ApiError::Disabled("payment"))?;
    match payments
        .confirm_payment(&request.order_id, &request.product_id, &request.tx_hash)
        .await
    {
        Ok(order) => Ok(Json(order)),
        Err(e) => {
            warn!("Payment confirmation for {} failed: {}", request.order_id, e);
            Err(e.into())
        }
    }
}
