//! Account Info Fetcher: native and token balances for the connected account.

use std::sync::Arc;

use crate::api::types::AccountInfo;
use crate::errors::{WalletError, WalletResult};
use crate::indexer_client::AccountLookup;
use crate::session::{BalanceReading, SessionManager};
use crate::units::BaseUnits;

pub struct AccountInfoFetcher {
    lookup: Arc<dyn AccountLookup>,
    asset_id: u64,
    symbol: String,
}

impl AccountInfoFetcher {
    pub fn new(lookup: Arc<dyn AccountLookup>, asset_id: u64, symbol: impl Into<String>) -> Self {
        Self {
            lookup,
            asset_id,
            symbol: symbol.into(),
        }
    }

    pub fn asset_id(&self) -> u64 {
        self.asset_id
    }

    /// Single lookup for `address`, no state is touched.
    pub async fn fetch(&self, address: &str) -> WalletResult<BalanceReading> {
        let info = self.lookup.lookup_account_by_id(address).await?;
        let reading = extract_balances(&info, self.asset_id);

        log::info!("Detected {} Algo", reading.algo);
        match reading.token {
            Some(token) => log::info!("Detected {} {}", token, self.symbol),
            None => log::debug!(
                "Account holds no {} (asset {})",
                self.symbol,
                self.asset_id
            ),
        }
        Ok(reading)
    }

    /// Fetch balances for the connected account and store them in `session`.
    ///
    /// On failure the previous balances stay in place, flagged stale. If the
    /// connection changes while the lookup is in flight the result is
    /// discarded and `Cancelled` is returned.
    pub async fn fetch_into(&self, session: &SessionManager) -> WalletResult<BalanceReading> {
        let (address, ticket) = session.current_account().ok_or(WalletError::NotConnected)?;

        match self.fetch(&address).await {
            Ok(reading) => {
                if session.apply_balances(ticket, reading) {
                    Ok(reading)
                } else {
                    log::debug!("Discarding balances for {}: connection changed", address);
                    Err(WalletError::Cancelled(
                        "Connection changed during balance fetch".to_string(),
                    ))
                }
            }
            Err(err) => {
                log::warn!("Balance fetch for {} failed: {}", address, err);
                session.mark_balances_stale(ticket, &err);
                Err(err)
            }
        }
    }
}

/// Native balance plus the holding for `asset_id`, if any.
pub fn extract_balances(info: &AccountInfo, asset_id: u64) -> BalanceReading {
    BalanceReading {
        algo: BaseUnits::from_base_units(info.amount),
        token: info
            .holding(asset_id)
            .map(|holding| BaseUnits::from_base_units(holding.amount)),
    }
}
