pub mod payload;

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

use crate::metrics::Metrics;
use crate::models::common::BackendConfig;
use crate::models::errors::{DeliveryError, NotifyError};
use crate::models::events::ContractEvent;
use crate::notifier::payload::Notification;
use crate::utils::retry::{Failure, RetryConfig, RetryError, retry};
use crate::utils::truncate_body;

const MAX_LOGGED_BODY: usize = 1024;

/// Where decoded events go.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn notify(&self, event: &ContractEvent) -> Result<(), NotifyError>;
}

/// Delivers events to the backend as JSON POSTs. Server errors and transport
/// failures are retried with a linear delay; client errors are final.
pub struct HttpNotifier {
    client: reqwest::Client,
    base_url: String,
    retry_config: RetryConfig,
    metrics: Option<Arc<Metrics>>,
}

impl HttpNotifier {
    /// `base_url` already includes the API prefix.
    pub fn new(
        base_url: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            retry_config: RetryConfig::linear(3, Duration::from_secs(1)),
            metrics: None,
        })
    }

    pub fn from_config(config: &BackendConfig) -> Result<Self, reqwest::Error> {
        let base_url = format!(
            "{}{}",
            config.base_url.trim_end_matches('/'),
            config.api_prefix
        );
        Ok(Self::new(base_url, Duration::from_secs(config.request_timeout_secs))?
            .with_retry(RetryConfig::linear(
                config.max_attempts,
                Duration::from_millis(config.retry_base_delay_ms),
            )))
    }

    pub fn with_retry(mut self, retry_config: RetryConfig) -> Self {
        self.retry_config = retry_config;
        self
    }

    pub fn with_metrics(mut self, metrics: Option<Arc<Metrics>>) -> Self {
        self.metrics = metrics;
        self
    }

    pub async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let url = format!("{}{}", self.base_url, notification.path);
        let context = format!("notify {}", notification.path);

        let result = retry(
            || self.attempt(notification, &url),
            &self.retry_config,
            &context,
        )
        .await;

        if let Some(metrics) = &self.metrics {
            metrics.record_notification(notification.kind, result.is_ok());
        }

        result.map_err(|e| match e {
            RetryError::Permanent { source, .. } => NotifyError::Rejected {
                path: notification.path.to_string(),
                source,
            },
            RetryError::Exhausted { attempts, source } => NotifyError::Exhausted {
                path: notification.path.to_string(),
                attempts,
                source,
            },
        })
    }

    async fn attempt(
        &self,
        notification: &Notification,
        url: &str,
    ) -> Result<(), Failure<DeliveryError>> {
        if let Some(metrics) = &self.metrics {
            metrics.record_notification_attempt(notification.kind);
        }

        let response = self
            .client
            .post(url)
            .json::<Value>(&notification.body)
            .send()
            .await
            .map_err(|e| Failure::Transient(DeliveryError::Transport(e)))?;

        let status = response.status();
        if status.is_success() {
            debug!("Backend accepted {} with status {}", notification.path, status);
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        let error = DeliveryError::Status {
            status: status.as_u16(),
            body: truncate_body(&body, MAX_LOGGED_BODY),
        };
        if status.is_client_error() {
            Err(Failure::Permanent(error))
        } else {
            Err(Failure::Transient(error))
        }
    }
}

#[async_trait]
impl EventSink for HttpNotifier {
    async fn notify(&self, event: &ContractEvent) -> Result<(), NotifyError> {
        let notification = Notification::from_event(event)?;
        self.send(&notification).await?;
        info!(
            "Notified backend of {} for item {} (tx {})",
            event.kind(),
            event.item_id,
            event.tx_hash
        );
        Ok(())
    }
}
