// lib.rs - Core library structure for the CHAD wallet client

pub mod account;
pub mod api;
pub mod app_state;
pub mod backend_client;
pub mod config;
pub mod errors;
pub mod indexer_client;
pub mod mock;
pub mod pairing;
pub mod price;
pub mod purchase;
pub mod session;
pub mod units;
pub mod validation;

use crate::config::init_client_config_from_env;

/// Initialize the client subsystem from the process environment.
pub fn init() -> WalletResult<&'static ClientConfig> {
    log::info!("Initializing wallet client");
    let config = init_client_config_from_env()?;
    log::info!("Client configuration initialized");
    Ok(config)
}

// Re-export common types
pub use account::AccountInfoFetcher;
pub use api::types::*;
pub use app_state::{SharedWalletContext, WalletContext};
pub use backend_client::{BackendClient, ExchangeBackend};
pub use config::{ClientConfig, Environment, NetworkConfig, PairingConfig, PollingConfig, TokenConfig};
pub use errors::{WalletError, WalletResult};
pub use indexer_client::{AccountLookup, IndexerClient};
pub use pairing::{
    BridgedPairingProvider, PairingBridge, PairingCommand, PairingEvent, PairingPayload,
    PairingProvider,
};
pub use price::{PollerHandle, PricePoller};
pub use purchase::PurchaseRequester;
pub use session::{
    AccountBalances, ConnectionState, PriceQuote, SessionManager, SessionSnapshot,
};
pub use units::BaseUnits;
pub use validation::{short_address, InputValidator};
