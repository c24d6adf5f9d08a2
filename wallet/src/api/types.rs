use crate::errors::{WalletError, WalletResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// JSON shape shared with the exchange backend.
///
/// Parsing is always typed: unknown, missing or mistyped fields fail with a
/// validation error instead of being merged onto the object.
pub trait TransferObject: Serialize + DeserializeOwned + Sized {
    /// Field-level checks beyond what the type system expresses.
    fn validate(&self) -> WalletResult<()> {
        Ok(())
    }

    fn to_json(&self) -> WalletResult<String> {
        self.validate()?;
        Ok(serde_json::to_string(self)?)
    }

    fn from_json(input: &str) -> WalletResult<Self> {
        let parsed: Self = serde_json::from_str(input)?;
        parsed.validate()?;
        Ok(parsed)
    }
}

/// Body of `POST /createBuyChadTx`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PurchaseRequest {
    pub addr: String,
    /// Amount of Algo offered in microAlgos, serialized as `algoAmount`.
    pub algo_amount: u64,
}

impl PurchaseRequest {
    pub fn new(addr: impl Into<String>, algo_amount: u64) -> Self {
        Self {
            addr: addr.into(),
            algo_amount,
        }
    }
}

impl TransferObject for PurchaseRequest {
    fn validate(&self) -> WalletResult<()> {
        if self.addr.trim().is_empty() {
            return Err(WalletError::ValidationError(
                "addr cannot be empty".to_string(),
            ));
        }
        if self.addr.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(WalletError::ValidationError(
                "addr contains whitespace".to_string(),
            ));
        }
        if self.algo_amount == 0 {
            return Err(WalletError::ValidationError(
                "algoAmount must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Successful answer to a purchase request: the atomic transaction group,
/// base64 encoded. The exchange pre-signs all but the last transaction,
/// which the buyer signs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PurchaseResponse {
    pub txs: Vec<String>,
}

impl PurchaseResponse {
    /// The transaction left for the buyer to sign.
    pub fn unsigned_tx(&self) -> Option<&str> {
        self.txs.last().map(String::as_str)
    }
}

impl TransferObject for PurchaseResponse {
    fn validate(&self) -> WalletResult<()> {
        if self.txs.is_empty() {
            return Err(WalletError::InvalidResponse(
                "Purchase response contains no transactions".to_string(),
            ));
        }
        if self.txs.iter().any(|tx| tx.trim().is_empty()) {
            return Err(WalletError::InvalidResponse(
                "Purchase response contains an empty transaction".to_string(),
            ));
        }
        Ok(())
    }
}

/// Error body returned by the backend with a non-success status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendErrorBody {
    pub error: String,
}

/// Body of `GET /getPrice`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceResponse {
    /// Price in hundredths of the quote currency.
    pub price: u64,
    #[serde(default = "default_success")]
    pub success: bool,
}

fn default_success() -> bool {
    true
}

impl TransferObject for PriceResponse {}

/// One asset holding as reported by the indexer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AssetHolding {
    pub asset_id: u64,
    pub amount: u64,
    #[serde(default)]
    pub is_frozen: bool,
}

/// Account state as reported by the indexer. Unlisted indexer fields are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfo {
    #[serde(default)]
    pub address: Option<String>,
    /// Native balance in microAlgos.
    pub amount: u64,
    #[serde(default)]
    pub assets: Vec<AssetHolding>,
}

impl AccountInfo {
    pub fn holding(&self, asset_id: u64) -> Option<&AssetHolding> {
        self.assets.iter().find(|asset| asset.asset_id == asset_id)
    }
}

/// `GET /v2/accounts/{address}` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AccountLookupEnvelope {
    pub account: AccountInfo,
    #[serde(default)]
    pub current_round: Option<u64>,
}
