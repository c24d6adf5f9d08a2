use std::fs;
use std::path::Path;
use std::time::Duration;

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::errors::{WalletError, WalletResult};

const ENV_ENVIRONMENT: &str = "CHAD_WALLET_ENV";
const ENV_INDEXER_URL: &str = "CHAD_INDEXER_URL";
const ENV_INDEXER_API_KEY: &str = "CHAD_INDEXER_API_KEY";
const ENV_BACKEND_URL: &str = "CHAD_BACKEND_URL";
const ENV_BRIDGE_URL: &str = "CHAD_BRIDGE_URL";
const ENV_ASSET_ID: &str = "CHAD_ASSET_ID";
const ENV_PRICE_INTERVAL: &str = "CHAD_PRICE_INTERVAL_SECS";
const ENV_REQUEST_TIMEOUT: &str = "CHAD_REQUEST_TIMEOUT_SECS";

const MAINNET_INDEXER_URL: &str = "https://mainnet-algorand.api.purestake.io/ps2";
const LOCAL_BACKEND_URL: &str = "http://localhost:5000";

/// Asset id of the CHAD token on Algorand mainnet.
pub const CHAD_ASSET_ID: u64 = 355_961_778;

/// Deployment environment, selects the default endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Production,
    Test,
}

impl Environment {
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "production" | "prod" => Environment::Production,
            "test" | "testing" => Environment::Test,
            _ => Environment::Development,
        }
    }
}

impl Default for Environment {
    fn default() -> Self {
        Environment::Development
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NetworkConfig {
    pub indexer_url: String,
    /// Only ever read from the environment or a config file, never written back out.
    #[serde(skip_serializing)]
    pub indexer_api_key: Option<String>,
    pub backend_url: String,
    pub request_timeout_secs: u64,
}

impl NetworkConfig {
    fn for_environment(environment: Environment) -> Self {
        match environment {
            Environment::Production => Self {
                indexer_url: MAINNET_INDEXER_URL.to_string(),
                indexer_api_key: None,
                // Must be supplied explicitly for production deployments.
                backend_url: String::new(),
                request_timeout_secs: 30,
            },
            Environment::Development => Self {
                indexer_url: MAINNET_INDEXER_URL.to_string(),
                indexer_api_key: None,
                backend_url: LOCAL_BACKEND_URL.to_string(),
                request_timeout_secs: 30,
            },
            Environment::Test => Self {
                indexer_url: "http://127.0.0.1:8980".to_string(),
                indexer_api_key: None,
                backend_url: "http://127.0.0.1:5000".to_string(),
                request_timeout_secs: 5,
            },
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self::for_environment(Environment::Development)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PairingConfig {
    pub bridge_url: String,
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            bridge_url: "https://bridge.walletconnect.org".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TokenConfig {
    pub asset_id: u64,
    pub symbol: String,
    pub decimals: u8,
    /// Display-only exchange rate used to estimate a purchase.
    pub tokens_per_algo: u64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            asset_id: CHAD_ASSET_ID,
            symbol: "CHAD".to_string(),
            decimals: 6,
            tokens_per_algo: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PollingConfig {
    pub price_interval_secs: u64,
    /// The backend quotes prices in hundredths.
    pub price_scale: u64,
}

impl PollingConfig {
    pub fn price_interval(&self) -> Duration {
        Duration::from_secs(self.price_interval_secs)
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            price_interval_secs: 10,
            price_scale: 100,
        }
    }
}

/// Complete client configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ClientConfig {
    pub environment: Environment,
    pub network: NetworkConfig,
    pub pairing: PairingConfig,
    pub token: TokenConfig,
    pub polling: PollingConfig,
}

impl ClientConfig {
    pub fn new(environment: Environment) -> Self {
        Self {
            environment,
            network: NetworkConfig::for_environment(environment),
            pairing: PairingConfig::default(),
            token: TokenConfig::default(),
            polling: PollingConfig::default(),
        }
    }

    /// Build a configuration from `CHAD_WALLET_ENV` and the `CHAD_*` overrides.
    pub fn from_env() -> WalletResult<Self> {
        let environment = std::env::var(ENV_ENVIRONMENT)
            .map(|name| Environment::from_name(&name))
            .unwrap_or_default();

        let mut config = Self::new(environment);
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON configuration file. Missing sections fall back to defaults.
    pub fn load(path: impl AsRef<Path>) -> WalletResult<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path)?;
        let config: ClientConfig = serde_json::from_slice(&bytes).map_err(|e| {
            WalletError::ValidationError(format!(
                "Invalid config file {}: {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        log::debug!("Loaded client configuration from {}", path.display());
        Ok(config)
    }

    /// Apply overrides from a key lookup (the process environment in production).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> WalletResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| -> Option<String> {
            let value = lookup(key)?;
            if value.trim().is_empty() {
                log::warn!("Environment variable {} is empty", key);
                return None;
            }
            if value.chars().any(|c| c.is_control()) {
                log::warn!(
                    "Environment variable {} contains control characters, ignoring",
                    key
                );
                return None;
            }
            log::debug!("Loaded configuration from environment variable {}", key);
            Some(value.trim().to_string())
        };

        if let Some(value) = read(ENV_INDEXER_URL) {
            self.network.indexer_url = value;
        }
        if let Some(value) = read(ENV_INDEXER_API_KEY) {
            self.network.indexer_api_key = Some(value);
        }
        if let Some(value) = read(ENV_BACKEND_URL) {
            self.network.backend_url = value;
        }
        if let Some(value) = read(ENV_BRIDGE_URL) {
            self.pairing.bridge_url = value;
        }
        if let Some(value) = read(ENV_ASSET_ID) {
            self.token.asset_id = parse_u64_value(&value, ENV_ASSET_ID)?;
        }
        if let Some(value) = read(ENV_PRICE_INTERVAL) {
            self.polling.price_interval_secs = parse_u64_value(&value, ENV_PRICE_INTERVAL)?;
        }
        if let Some(value) = read(ENV_REQUEST_TIMEOUT) {
            self.network.request_timeout_secs = parse_u64_value(&value, ENV_REQUEST_TIMEOUT)?;
        }

        Ok(())
    }

    pub fn validate(&self) -> WalletResult<()> {
        let required = [
            ("network.indexer_url", &self.network.indexer_url),
            ("network.backend_url", &self.network.backend_url),
            ("pairing.bridge_url", &self.pairing.bridge_url),
        ];
        for (key, value) in required {
            if value.trim().is_empty() {
                return Err(WalletError::ValidationError(format!(
                    "Required configuration key '{}' is missing for {:?} environment",
                    key, self.environment
                )));
            }
        }

        if self.polling.price_interval_secs == 0 {
            return Err(WalletError::ValidationError(
                "Price polling interval must be at least one second".to_string(),
            ));
        }
        if self.polling.price_scale == 0 {
            return Err(WalletError::ValidationError(
                "Price scale cannot be zero".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(Environment::Development)
    }
}

fn parse_u64_value(value: &str, key: &str) -> WalletResult<u64> {
    value.trim().parse::<u64>().map_err(|_| {
        WalletError::ValidationError(format!(
            "Invalid numeric value '{}' for key '{}'",
            value, key
        ))
    })
}

/// Process-wide configuration, initialized once by the host.
static CLIENT_CONFIG: OnceCell<ClientConfig> = OnceCell::new();

/// Initialize the global configuration from the process environment.
pub fn init_client_config_from_env() -> WalletResult<&'static ClientConfig> {
    CLIENT_CONFIG.get_or_try_init(|| {
        let config = ClientConfig::from_env()?;
        log::info!(
            "Client configuration initialized for {:?} environment",
            config.environment
        );
        Ok(config)
    })
}

/// Install an explicit configuration as the global one.
pub fn init_client_config(config: ClientConfig) -> WalletResult<&'static ClientConfig> {
    config.validate()?;
    CLIENT_CONFIG.get_or_try_init(|| Ok(config))
}

pub fn get_client_config() -> WalletResult<&'static ClientConfig> {
    CLIENT_CONFIG.get().ok_or(WalletError::NotInitialized)
}
