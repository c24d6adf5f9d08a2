use std::sync::Arc;

use crate::api::types::{PurchaseRequest, PurchaseResponse, TransferObject};
use crate::backend_client::ExchangeBackend;
use crate::errors::{WalletError, WalletResult};
use crate::session::SessionManager;
use crate::units::BaseUnits;
use crate::validation::InputValidator;

/// Purchase Requester: turns a user-chosen Algo amount into a backend purchase request.
pub struct PurchaseRequester {
    backend: Arc<dyn ExchangeBackend>,
    session: SessionManager,
    validator: InputValidator,
    tokens_per_algo: u64,
}

impl PurchaseRequester {
    pub fn new(
        backend: Arc<dyn ExchangeBackend>,
        session: SessionManager,
        tokens_per_algo: u64,
    ) -> WalletResult<Self> {
        Ok(Self {
            backend,
            session,
            validator: InputValidator::new()?,
            tokens_per_algo,
        })
    }

    /// Submit a purchase of `amount` Algo for the connected account.
    ///
    /// Connection and amount are checked before anything goes over the wire.
    /// The error, if any, is also recorded on the session for display.
    pub async fn initiate(&self, amount: f64) -> WalletResult<PurchaseResponse> {
        let result = self.submit(amount).await;
        match &result {
            Ok(_) => self.session.clear_error(),
            Err(err) => {
                log::warn!("Purchase failed: {}", err);
                self.session.record_error(err);
            }
        }
        result
    }

    async fn submit(&self, amount: f64) -> WalletResult<PurchaseResponse> {
        let address = self
            .session
            .connected_address()
            .ok_or(WalletError::NotConnected)?;
        let units = self.validator.validate_purchase_amount(amount)?;

        let request = PurchaseRequest::new(address, units.base_units());
        request.validate()?;
        log::info!("Requesting purchase of {} Algo for {}", units, request.addr);

        let response = self.backend.create_buy_tx(&request).await?;
        log::info!(
            "Backend returned a group of {} transactions",
            response.txs.len()
        );
        Ok(response)
    }

    /// Tokens received for `amount` Algo at the configured rate, truncated to base units.
    pub fn estimate_tokens(&self, amount: f64) -> WalletResult<BaseUnits> {
        let units = self.validator.validate_purchase_amount(amount)?;
        units.checked_mul(self.tokens_per_algo)
    }
}
