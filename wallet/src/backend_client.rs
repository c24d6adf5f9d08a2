/// HTTP client for the CHAD exchange backend
///
/// The backend quotes the current price and builds the atomic transaction
/// group for a purchase.
use crate::api::types::{
    BackendErrorBody, PriceResponse, PurchaseRequest, PurchaseResponse, TransferObject,
};
use crate::config::NetworkConfig;
use crate::errors::{WalletError, WalletResult};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response};
use std::time::Duration;

const PRICE_PATH: &str = "/getPrice";
const PURCHASE_PATH: &str = "/createBuyChadTx";

#[async_trait]
pub trait ExchangeBackend: Send + Sync {
    async fn get_price(&self) -> WalletResult<PriceResponse>;

    async fn create_buy_tx(&self, request: &PurchaseRequest) -> WalletResult<PurchaseResponse>;
}

pub struct BackendClient {
    client: Client,
    base_url: String,
}

impl BackendClient {
    pub fn new(base_url: String, timeout: Duration) -> WalletResult<Self> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            WalletError::NetworkError(format!("Failed to create HTTP client: {}", e))
        })?;

        Ok(BackendClient {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &NetworkConfig) -> WalletResult<Self> {
        Self::new(config.backend_url.clone(), config.request_timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl ExchangeBackend for BackendClient {
    async fn get_price(&self) -> WalletResult<PriceResponse> {
        let response = self.client.get(self.url(PRICE_PATH)).send().await?;

        if !response.status().is_success() {
            return Err(WalletError::NetworkError(format!(
                "HTTP error: {}",
                response.status()
            )));
        }

        let body = response.text().await?;
        PriceResponse::from_json(&body)
            .map_err(|e| WalletError::InvalidResponse(format!("Failed to parse price: {}", e)))
    }

    async fn create_buy_tx(&self, request: &PurchaseRequest) -> WalletResult<PurchaseResponse> {
        let body = request.to_json()?;
        let response = self
            .client
            .post(self.url(PURCHASE_PATH))
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(rejection(response).await);
        }

        let body = response.text().await?;
        log::info!("Purchase response: {}", body);
        PurchaseResponse::from_json(&body).map_err(|e| match e {
            WalletError::InvalidResponse(msg) => WalletError::InvalidResponse(msg),
            other => WalletError::InvalidResponse(format!(
                "Failed to parse purchase response: {}",
                other
            )),
        })
    }
}

async fn rejection(response: Response) -> WalletError {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    WalletError::BackendRejected {
        status: status.as_u16(),
        message: rejection_message(status.to_string(), &text),
    }
}

/// Prefer the backend's `{"error": ...}` message, then the raw body, then the status line.
fn rejection_message(status: String, body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<BackendErrorBody>(body) {
        return parsed.error;
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        status
    } else {
        trimmed.chars().take(200).collect()
    }
}
