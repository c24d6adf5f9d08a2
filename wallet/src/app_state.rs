use std::ops::Deref;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::account::AccountInfoFetcher;
use crate::api::types::PurchaseResponse;
use crate::backend_client::{BackendClient, ExchangeBackend};
use crate::config::ClientConfig;
use crate::errors::{WalletError, WalletResult};
use crate::indexer_client::{AccountLookup, IndexerClient};
use crate::pairing::{PairingEvent, PairingPayload, PairingProvider};
use crate::price::{PollerHandle, PricePoller};
use crate::purchase::PurchaseRequester;
use crate::session::{BalanceReading, SessionManager, SessionSnapshot, SessionTicket};
use crate::units::BaseUnits;
use crate::validation::{short_address, InputValidator};

/// Connection manager for one wallet: pairing, balances, price and purchases
/// all operate on the same [`SessionManager`].
pub struct WalletContext {
    config: ClientConfig,
    session: SessionManager,
    pairing: Arc<dyn PairingProvider>,
    backend: Arc<dyn ExchangeBackend>,
    fetcher: Arc<AccountInfoFetcher>,
    requester: PurchaseRequester,
    validator: InputValidator,
    balance_task: Mutex<Option<JoinHandle<()>>>,
    poller: Mutex<Option<PollerHandle>>,
    /// Cancels the pairing wait of the connect attempt holding this ticket.
    pairing_cancel: Mutex<Option<(SessionTicket, watch::Sender<bool>)>>,
}

impl WalletContext {
    pub fn new(
        config: ClientConfig,
        pairing: Arc<dyn PairingProvider>,
        lookup: Arc<dyn AccountLookup>,
        backend: Arc<dyn ExchangeBackend>,
    ) -> WalletResult<Self> {
        config.validate()?;

        let session = SessionManager::new();
        let fetcher = Arc::new(AccountInfoFetcher::new(
            lookup,
            config.token.asset_id,
            config.token.symbol.clone(),
        ));
        let requester =
            PurchaseRequester::new(backend.clone(), session.clone(), config.token.tokens_per_algo)?;

        Ok(Self {
            config,
            session,
            pairing,
            backend,
            fetcher,
            requester,
            validator: InputValidator::new()?,
            balance_task: Mutex::new(None),
            poller: Mutex::new(None),
            pairing_cancel: Mutex::new(None),
        })
    }

    /// Build a context talking to the indexer and backend named in `config`.
    pub fn from_config(
        config: ClientConfig,
        pairing: Arc<dyn PairingProvider>,
    ) -> WalletResult<Self> {
        config.validate()?;
        let lookup = Arc::new(IndexerClient::from_config(&config.network)?);
        let backend = Arc::new(BackendClient::from_config(&config.network)?);
        log::info!(
            "Wallet context using indexer {} and backend {}",
            lookup.base_url(),
            backend.base_url()
        );
        Self::new(config, pairing, lookup, backend)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.session.snapshot()
    }

    /// Pair with a wallet and return the connected address.
    ///
    /// Resolves once the wallet's `connect` event arrives. A pairing error
    /// resets the connection to disconnected, and so does a `disconnect()`
    /// issued while waiting. Balances are fetched in the background afterwards.
    pub async fn connect(&self) -> WalletResult<String> {
        if let Some(address) = self.session.connected_address() {
            return Ok(address);
        }

        let ticket = self.session.begin_connect()?;
        let (cancel_tx, mut cancel_rx) = watch::channel(false);
        *self.pairing_cancel.lock() = Some((ticket, cancel_tx));
        log::info!("Connecting wallet");

        let outcome = tokio::select! {
            result = self.pair(ticket) => result,
            _ = cancel_rx.changed() => Err(WalletError::Cancelled(
                "Connection attempt was cancelled".to_string(),
            )),
        };

        {
            let mut pending = self.pairing_cancel.lock();
            if matches!(pending.as_ref(), Some((owner, _)) if *owner == ticket) {
                pending.take();
            }
        }

        match outcome {
            Ok(address) => {
                log::info!("Wallet connected: {}", short_address(&address));
                self.spawn_balance_refresh();
                Ok(address)
            }
            Err(err) => {
                log::error!("Wallet connection failed: {}", err);
                self.session.fail_connect(ticket, &err);
                Err(err)
            }
        }
    }

    async fn pair(&self, ticket: SessionTicket) -> WalletResult<String> {
        if self.pairing.is_connected() {
            log::debug!("Pairing provider already holds a session");
        } else {
            let session_id = self.pairing.create_session().await?;
            self.session.attach_session(ticket, session_id);
        }

        loop {
            match self.pairing.next_event().await? {
                PairingEvent::Connect(payload) => {
                    let address = self.paired_address(&payload)?;
                    self.session.mark_connected(ticket, &address)?;
                    return Ok(address);
                }
                PairingEvent::SessionUpdate(_) => {
                    log::debug!("Ignoring session update received before connect");
                }
                PairingEvent::Disconnect => {
                    return Err(WalletError::PairingError(
                        "Wallet closed the session before connecting".to_string(),
                    ));
                }
            }
        }
    }

    fn paired_address(&self, payload: &PairingPayload) -> WalletResult<String> {
        let address = payload.primary_account().ok_or_else(|| {
            WalletError::PairingError("Connect event carried no account".to_string())
        })?;
        self.validator.validate_address(address).map_err(|e| {
            WalletError::PairingError(format!("Wallet returned an unusable account: {}", e))
        })?;
        Ok(address.to_string())
    }

    /// Wait for one pairing event after connect and apply it.
    pub async fn process_next_event(&self) -> WalletResult<PairingEvent> {
        let event = self.pairing.next_event().await?;
        match &event {
            PairingEvent::SessionUpdate(payload) => self.apply_session_update(payload)?,
            PairingEvent::Disconnect => {
                log::info!("Wallet ended the session");
                self.reset_session();
            }
            PairingEvent::Connect(_) => {
                log::debug!("Ignoring connect event outside a connect attempt");
            }
        }
        Ok(event)
    }

    fn apply_session_update(&self, payload: &PairingPayload) -> WalletResult<()> {
        let Some(address) = payload.primary_account() else {
            log::warn!("Session update without accounts ignored");
            return Ok(());
        };

        match self.session.connected_address() {
            None => {
                log::debug!("Session update while disconnected ignored");
                return Ok(());
            }
            Some(current) if current == address => return Ok(()),
            Some(_) => {}
        }

        self.validator.validate_address(address)?;
        self.session.switch_account(address)?;
        log::info!("Switched to account {}", short_address(address));
        self.spawn_balance_refresh();
        Ok(())
    }

    /// End the session. State is reset before the provider is told, so no
    /// in-flight balance fetch can write afterwards.
    pub async fn disconnect(&self) -> WalletResult<()> {
        match self.reset_session() {
            Some(address) => log::info!("Disconnecting {}", short_address(&address)),
            None => log::debug!("Disconnect requested without a connected wallet"),
        }
        self.pairing.kill_session().await
    }

    fn reset_session(&self) -> Option<String> {
        let previous = self.session.disconnect();
        if let Some((_, cancel)) = self.pairing_cancel.lock().take() {
            let _ = cancel.send(true);
        }
        if let Some(task) = self.balance_task.lock().take() {
            task.abort();
        }
        previous
    }

    fn spawn_balance_refresh(&self) {
        let fetcher = self.fetcher.clone();
        let session = self.session.clone();
        let task = tokio::spawn(async move {
            if let Err(e) = fetcher.fetch_into(&session).await {
                log::debug!("Background balance fetch ended: {}", e);
            }
        });

        if let Some(previous) = self.balance_task.lock().replace(task) {
            previous.abort();
        }
    }

    /// Fetch balances for the connected account now.
    pub async fn refresh_balances(&self) -> WalletResult<BalanceReading> {
        self.fetcher.fetch_into(&self.session).await
    }

    /// Start the price poller. Returns `false` if it is already running.
    pub fn start_price_polling(&self) -> bool {
        let mut poller = self.poller.lock();
        if poller.as_ref().map_or(false, PollerHandle::is_running) {
            return false;
        }
        let handle = PricePoller::from_config(
            self.backend.clone(),
            self.session.clone(),
            &self.config.polling,
        )
        .spawn();
        *poller = Some(handle);
        true
    }

    pub async fn stop_price_polling(&self) {
        let handle = self.poller.lock().take();
        if let Some(handle) = handle {
            handle.stop().await;
        }
    }

    pub async fn buy(&self, algo_amount: f64) -> WalletResult<PurchaseResponse> {
        self.requester.initiate(algo_amount).await
    }

    pub fn estimate_tokens(&self, algo_amount: f64) -> WalletResult<BaseUnits> {
        self.requester.estimate_tokens(algo_amount)
    }

    /// Stop polling and drop any live session.
    pub async fn shutdown(&self) {
        self.stop_price_polling().await;
        let was_connected = self.reset_session().is_some();
        if was_connected || self.pairing.is_connected() {
            if let Err(e) = self.pairing.kill_session().await {
                log::warn!("Failed to close pairing session: {}", e);
            }
        }
        log::info!("Wallet context shut down");
    }
}

/// Wallet context shared with the UI host.
#[derive(Clone)]
pub struct SharedWalletContext(pub Arc<WalletContext>);

impl SharedWalletContext {
    pub fn new(inner: WalletContext) -> Self {
        Self(Arc::new(inner))
    }
}

impl Deref for SharedWalletContext {
    type Target = WalletContext;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::types::{AccountInfo, AssetHolding};
    use crate::config::Environment;
    use crate::mock::{MockBackend, MockIndexer, MockPairingProvider};
    use crate::session::ConnectionState;
    use std::time::Duration;

    const FIRST: &str = "AEBAGBAFAYDQQCIKBMGA2DQPCAIREEYUCULBOGAZDINRYHI6D4QDTYK3BA";
    const SECOND: &str = "A4DQOBYHA4DQOBYHA4DQOBYHA4DQOBYHA4DQOBYHA4DQOBYHA4DVZ36IB4";

    struct Harness {
        context: WalletContext,
        pairing: Arc<MockPairingProvider>,
        indexer: Arc<MockIndexer>,
        backend: Arc<MockBackend>,
    }

    fn harness() -> Harness {
        let pairing = Arc::new(MockPairingProvider::new());
        let indexer = Arc::new(MockIndexer::new());
        let backend = Arc::new(MockBackend::new());
        let config = ClientConfig::new(Environment::Test);
        let asset_id = config.token.asset_id;

        for (address, algo, token) in [(FIRST, 5_000_000, 20_000_000), (SECOND, 1_000_000, 0)] {
            indexer.set_account(
                address,
                AccountInfo {
                    address: Some(address.to_string()),
                    amount: algo,
                    assets: vec![AssetHolding {
                        asset_id,
                        amount: token,
                        is_frozen: false,
                    }],
                },
            );
        }

        let context =
            WalletContext::new(config, pairing.clone(), indexer.clone(), backend.clone()).unwrap();
        Harness {
            context,
            pairing,
            indexer,
            backend,
        }
    }

    async fn wait_for_algo(session: &SessionManager, expected: f64) {
        for _ in 0..200 {
            if session.snapshot().algo_balance == Some(expected) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("balance never reached {}", expected);
    }

    #[tokio::test]
    async fn connect_event_connects_and_fetches_balances() {
        let h = harness();
        h.pairing.push_connect(FIRST);

        let address = h.context.connect().await.unwrap();
        assert_eq!(address, FIRST);
        assert_eq!(h.pairing.sessions_created(), 1);
        assert!(h.context.session().session_id().is_some());

        wait_for_algo(h.context.session(), 5.0).await;
        assert_eq!(h.context.snapshot().token_balance, Some(20.0));
    }

    #[tokio::test]
    async fn existing_pairing_session_is_reused() {
        let h = harness();
        h.pairing.set_connected(true);
        h.pairing.push_connect(FIRST);

        h.context.connect().await.unwrap();
        assert_eq!(h.pairing.sessions_created(), 0);
    }

    #[tokio::test]
    async fn pairing_error_resets_to_disconnected() {
        let h = harness();
        h.pairing
            .push(Err(WalletError::PairingError("user rejected".into())));

        let err = h.context.connect().await.unwrap_err();
        assert!(matches!(err, WalletError::PairingError(_)));
        assert_eq!(h.context.session().connection(), ConnectionState::Disconnected);
        assert!(h.context.snapshot().last_error.is_some());

        h.pairing.push_connect(FIRST);
        assert_eq!(h.context.connect().await.unwrap(), FIRST);
    }

    #[tokio::test]
    async fn malformed_account_is_a_pairing_error() {
        let h = harness();
        h.pairing.push_connect("not-an-address");

        let err = h.context.connect().await.unwrap_err();
        assert!(matches!(err, WalletError::PairingError(_)));
        assert!(!h.context.session().is_connected());
        assert_eq!(h.indexer.calls(), 0);
    }

    #[tokio::test]
    async fn session_update_switches_account() {
        let h = harness();
        h.pairing.push_connect(FIRST);
        h.context.connect().await.unwrap();
        wait_for_algo(h.context.session(), 5.0).await;

        h.pairing.push_update(SECOND);
        h.context.process_next_event().await.unwrap();
        assert_eq!(
            h.context.session().connected_address().as_deref(),
            Some(SECOND)
        );
        wait_for_algo(h.context.session(), 1.0).await;
        assert_eq!(h.context.snapshot().token_balance, Some(0.0));
    }

    #[tokio::test]
    async fn update_without_accounts_is_ignored() {
        let h = harness();
        h.pairing.push_connect(FIRST);
        h.context.connect().await.unwrap();

        h.pairing
            .push(Ok(PairingEvent::SessionUpdate(PairingPayload { params: vec![] })));
        h.context.process_next_event().await.unwrap();
        assert_eq!(
            h.context.session().connected_address().as_deref(),
            Some(FIRST)
        );
    }

    #[tokio::test]
    async fn wallet_side_disconnect_clears_state() {
        let h = harness();
        h.pairing.push_connect(FIRST);
        h.context.connect().await.unwrap();
        wait_for_algo(h.context.session(), 5.0).await;

        h.pairing.push(Ok(PairingEvent::Disconnect));
        h.context.process_next_event().await.unwrap();
        let snapshot = h.context.snapshot();
        assert_eq!(snapshot.connection, ConnectionState::Disconnected);
        assert_eq!(snapshot.algo_balance, None);
    }

    #[tokio::test]
    async fn disconnect_while_pairing_frees_the_next_attempt() {
        let h = harness();

        let cancel = async {
            while h.context.session().connection() != ConnectionState::Connecting {
                tokio::task::yield_now().await;
            }
            h.context.disconnect().await.unwrap();
        };
        let (first, _) = tokio::join!(h.context.connect(), cancel);
        assert!(matches!(first, Err(WalletError::Cancelled(_))));
        assert_eq!(h.context.session().connection(), ConnectionState::Disconnected);

        h.pairing.push_connect(FIRST);
        let second = tokio::time::timeout(Duration::from_secs(5), h.context.connect())
            .await
            .expect("reconnect should not wait behind the cancelled attempt");
        assert_eq!(second.unwrap(), FIRST);
        assert_eq!(h.pairing.sessions_created(), 2);
    }

    #[tokio::test]
    async fn disconnect_kills_provider_session() {
        let h = harness();
        h.pairing.push_connect(FIRST);
        h.context.connect().await.unwrap();

        h.context.disconnect().await.unwrap();
        assert_eq!(h.pairing.sessions_killed(), 1);
        assert!(!h.pairing.is_connected());
        assert_eq!(
            h.context.buy(1.0).await.unwrap_err(),
            WalletError::NotConnected
        );
        assert_eq!(h.backend.purchase_calls(), 0);
    }

    #[tokio::test]
    async fn price_polling_starts_once_and_stops() {
        let h = harness();
        h.backend.set_price(250);

        assert!(h.context.start_price_polling());
        assert!(!h.context.start_price_polling());

        for _ in 0..200 {
            if h.context.snapshot().price.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(h.context.snapshot().price, Some(2.5));

        h.context.shutdown().await;
        assert!(h.context.start_price_polling());
        h.context.stop_price_polling().await;
    }
}
