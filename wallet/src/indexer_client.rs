/// Indexer client for Algorand account lookups
///
/// Talks to an Algorand indexer over its REST API (`/v2/accounts/{address}`)
/// and returns the account's native balance and asset holdings.
use crate::api::types::{AccountInfo, AccountLookupEnvelope};
use crate::config::NetworkConfig;
use crate::errors::{WalletError, WalletResult};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;

const API_KEY_HEADER: &str = "X-API-Key";

/// Read access to account state on chain.
#[async_trait]
pub trait AccountLookup: Send + Sync {
    async fn lookup_account_by_id(&self, address: &str) -> WalletResult<AccountInfo>;
}

/// HTTP client for the indexing service
pub struct IndexerClient {
    client: Client,
    base_url: String,
    api_key: Option<SecretString>,
}

impl IndexerClient {
    pub fn new(base_url: String, api_key: Option<SecretString>, timeout: Duration) -> WalletResult<Self> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            WalletError::NetworkError(format!("Failed to create HTTP client: {}", e))
        })?;

        Ok(IndexerClient {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    pub fn from_config(config: &NetworkConfig) -> WalletResult<Self> {
        Self::new(
            config.indexer_url.clone(),
            config
                .indexer_api_key
                .clone()
                .map(SecretString::from),
            config.request_timeout(),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl AccountLookup for IndexerClient {
    async fn lookup_account_by_id(&self, address: &str) -> WalletResult<AccountInfo> {
        let url = format!("{}/v2/accounts/{}", self.base_url, address);
        let mut request = self.client.get(&url);
        if let Some(key) = &self.api_key {
            request = request.header(API_KEY_HEADER, key.expose_secret());
        }

        let response = request.send().await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(WalletError::NotFound(format!("Account {} not found", address)));
        }
        if !status.is_success() {
            return Err(WalletError::NetworkError(format!("HTTP error: {}", status)));
        }

        let envelope: AccountLookupEnvelope = response.json().await.map_err(|e| {
            WalletError::InvalidResponse(format!("Failed to parse account lookup: {}", e))
        })?;

        Ok(envelope.account)
    }
}

#[cfg(test)]
mod integration_tests {
    use super::*;

    #[test]
    fn trims_trailing_slash() {
        let client = IndexerClient::new(
            "https://indexer.example/".to_string(),
            None,
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(client.base_url(), "https://indexer.example");
    }

    #[tokio::test]
    #[ignore = "requires a running indexer at localhost:8980"]
    async fn test_real_account_lookup() {
        let client = IndexerClient::new(
            "http://localhost:8980".to_string(),
            None,
            Duration::from_secs(5),
        )
        .unwrap();
        let result = client
            .lookup_account_by_id("AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAY5HFKQ")
            .await;
        assert!(result.is_ok(), "Account lookup should succeed");
    }
}
