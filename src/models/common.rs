use std::{str::FromStr, time::Duration};

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::models::errors::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub rpc_url: String,
    // Derived from rpc_url when absent
    #[serde(default)]
    pub ws_url: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl NodeConfig {
    /// Endpoint used for the long-lived connection. Push subscriptions need a
    /// websocket, so an http(s) rpc_url is rewritten to ws(s).
    pub fn stream_url(&self) -> String {
        if let Some(ws_url) = &self.ws_url {
            return ws_url.clone();
        }
        if let Some(rest) = self.rpc_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.rpc_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            self.rpc_url.clone()
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContractConfig {
    #[serde(default)]
    pub address: Option<Address>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    pub base_url: String,
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionConfig {
    #[serde(default = "default_lookback_blocks")]
    pub lookback_blocks: u64,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_health_check_timeout_secs")]
    pub health_check_timeout_secs: u64,
    #[serde(default = "default_reconnect_floor_secs")]
    pub reconnect_floor_secs: u64,
    #[serde(default = "default_reconnect_ceiling_secs")]
    pub reconnect_ceiling_secs: u64,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            lookback_blocks: default_lookback_blocks(),
            poll_interval_secs: default_poll_interval_secs(),
            health_check_timeout_secs: default_health_check_timeout_secs(),
            reconnect_floor_secs: default_reconnect_floor_secs(),
            reconnect_ceiling_secs: default_reconnect_ceiling_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentConfig {
    pub collect_address: Address,
    // Wei, decimal or 0x-prefixed hex
    #[serde(default = "default_amount_wei")]
    pub amount_wei: String,
}

impl PaymentConfig {
    pub fn amount(&self) -> Result<U256, ConfigError> {
        U256::from_str(self.amount_wei.trim()).map_err(|e| ConfigError::Invalid {
            field: "payment.amount_wei",
            reason: e.to_string(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_address")]
    pub address: String,
    #[serde(default = "default_server_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_server_address(),
            port: default_server_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub address: String,
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: "0.0.0.0".to_string(),
            port: 9100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub node: NodeConfig,
    #[serde(default)]
    pub contract: ContractConfig,
    pub backend: BackendConfig,
    #[serde(default)]
    pub ingestion: IngestionConfig,
    #[serde(default)]
    pub payment: Option<PaymentConfig>,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        parse_url("node.rpc_url", &self.node.rpc_url)?;
        parse_url("node.ws_url", &self.node.stream_url())?;
        parse_url("backend.base_url", &self.backend.base_url)?;

        if self.backend.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "backend.max_attempts",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.ingestion.reconnect_floor_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "ingestion.reconnect_floor_secs",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.ingestion.reconnect_ceiling_secs < self.ingestion.reconnect_floor_secs {
            return Err(ConfigError::Invalid {
                field: "ingestion.reconnect_ceiling_secs",
                reason: format!(
                    "ceiling {}s is below floor {}s",
                    self.ingestion.reconnect_ceiling_secs, self.ingestion.reconnect_floor_secs
                ),
            });
        }
        if self.ingestion.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "ingestion.poll_interval_secs",
                reason: "must be greater than zero".to_string(),
            });
        }
        if let Some(payment) = &self.payment {
            payment.amount()?;
        }
        Ok(())
    }

    /// Full URL for a backend notification path such as `/item-listed`.
    pub fn notification_base(&self) -> String {
        format!(
            "{}{}",
            self.backend.base_url.trim_end_matches('/'),
            self.backend.api_prefix
        )
    }
}

fn parse_url(field: &'static str, value: &str) -> Result<Url, ConfigError> {
    Url::parse(value).map_err(|e| ConfigError::Invalid {
        field,
        reason: e.to_string(),
    })
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_api_prefix() -> String {
    "/api/v1/blockchain".to_string()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    1_000
}

fn default_lookback_blocks() -> u64 {
    10_000
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_health_check_timeout_secs() -> u64 {
    10
}

fn default_reconnect_floor_secs() -> u64 {
    5
}

fn default_reconnect_ceiling_secs() -> u64 {
    60
}

fn default_amount_wei() -> String {
    // 0.001 ETH
    "1000000000000000".to_string()
}

fn default_server_address() -> String {
    "0.0.0.0".to_string()
}

fn default_server_port() -> u16 {
    8080
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(rpc_url: &str) -> NodeConfig {
        NodeConfig {
            rpc_url: rpc_url.to_string(),
            ws_url: None,
            request_timeout_secs: 10,
        }
    }

    #[test]
    fn stream_url_swaps_http_scheme_for_websocket() {
        assert_eq!(
            node("https://sepolia.example.io/v3/key").stream_url(),
            "wss://sepolia.example.io/v3/key"
        );
        assert_eq!(node("http://localhost:8545").stream_url(), "ws://localhost:8545");
        assert_eq!(node("ws://localhost:8546").stream_url(), "ws://localhost:8546");
    }

    #[test]
    fn explicit_ws_url_wins() {
        let mut config = node("https://sepolia.example.io");
        config.ws_url = Some("wss://other.example.io".to_string());
        assert_eq!(config.stream_url(), "wss://other.example.io");
    }

    #[test]
    fn payment_amount_accepts_decimal_and_hex() {
        let mut payment = PaymentConfig {
            collect_address: Address::ZERO,
            amount_wei: default_amount_wei(),
        };
        assert_eq!(payment.amount().unwrap(), U256::from(1_000_000_000_000_000u64));

        payment.amount_wei = "0x38d7ea4c68000".to_string();
        assert_eq!(payment.amount().unwrap(), U256::from(1_000_000_000_000_000u64));

        payment.amount_wei = "0.001".to_string();
        assert!(payment.amount().is_err());
    }

    fn config() -> Config {
        Config {
            node: node("https://sepolia.example.io"),
            contract: ContractConfig::default(),
            backend: BackendConfig {
                base_url: "http://localhost:8000/".to_string(),
                api_prefix: default_api_prefix(),
                request_timeout_secs: 10,
                max_attempts: 3,
                retry_base_delay_ms: 1000,
            },
            ingestion: IngestionConfig::default(),
            payment: None,
            server: ServerConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }

    #[test]
    fn defaults_validate() {
        let config = config();
        config.validate().unwrap();
        assert_eq!(
            config.notification_base(),
            "http://localhost:8000/api/v1/blockchain"
        );
    }

    #[test]
    fn invalid_values_name_their_field() {
        let mut bad_url = config();
        bad_url.backend.base_url = "not a url".to_string();
        assert!(matches!(
            bad_url.validate(),
            Err(ConfigError::Invalid { field: "backend.base_url", .. })
        ));

        let mut no_attempts = config();
        no_attempts.backend.max_attempts = 0;
        assert!(matches!(
            no_attempts.validate(),
            Err(ConfigError::Invalid { field: "backend.max_attempts", .. })
        ));

        let mut inverted = config();
        inverted.ingestion.reconnect_floor_secs = 30;
        inverted.ingestion.reconnect_ceiling_secs = 10;
        assert!(matches!(
            inverted.validate(),
            Err(ConfigError::Invalid { field: "ingestion.reconnect_ceiling_secs", .. })
        ));
    }
}
