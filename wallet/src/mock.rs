//! In-memory pairing provider, indexer and exchange backend for development and testing.
//!
//! All of them record how often they were called so callers can assert that an
//! operation did or did not reach the network.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, Semaphore};
use uuid::Uuid;

use crate::api::types::{AccountInfo, PriceResponse, PurchaseRequest, PurchaseResponse};
use crate::backend_client::ExchangeBackend;
use crate::errors::{WalletError, WalletResult};
use crate::indexer_client::AccountLookup;
use crate::pairing::{PairingEvent, PairingPayload, PairingProvider};
use crate::wallet_error;

/// Blocks callers until released. Used to hold a request in flight.
#[derive(Debug, Clone)]
struct Gate(Arc<Semaphore>);

impl Gate {
    fn new() -> Self {
        Self(Arc::new(Semaphore::new(0)))
    }

    async fn pass(&self) {
        if let Ok(permit) = self.0.acquire().await {
            permit.forget();
        }
    }

    fn release(&self, count: usize) {
        self.0.add_permits(count);
    }
}

#[derive(Default)]
pub struct MockIndexer {
    accounts: Mutex<HashMap<String, WalletResult<AccountInfo>>>,
    calls: AtomicUsize,
    gate: Mutex<Option<Gate>>,
}

impl MockIndexer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_account(&self, address: &str, info: AccountInfo) {
        self.accounts.lock().insert(address.to_string(), Ok(info));
    }

    pub fn set_failure(&self, address: &str, error: WalletError) {
        self.accounts.lock().insert(address.to_string(), Err(error));
    }

    /// Hold every subsequent lookup until [`MockIndexer::release`] is called.
    pub fn hold(&self) {
        *self.gate.lock() = Some(Gate::new());
    }

    pub fn release(&self, count: usize) {
        if let Some(gate) = self.gate.lock().as_ref() {
            gate.release(count);
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AccountLookup for MockIndexer {
    async fn lookup_account_by_id(&self, address: &str) -> WalletResult<AccountInfo> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            gate.pass().await;
        }

        self.accounts
            .lock()
            .get(address)
            .cloned()
            .unwrap_or_else(|| Err(wallet_error!(NotFound, format!("Account {} not found", address))))
    }
}

pub struct MockBackend {
    price: Mutex<WalletResult<PriceResponse>>,
    price_delay: Mutex<Option<Duration>>,
    purchase: Mutex<WalletResult<PurchaseResponse>>,
    price_calls: AtomicUsize,
    purchase_calls: AtomicUsize,
    last_request: Mutex<Option<PurchaseRequest>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            price: Mutex::new(Ok(PriceResponse {
                price: 100,
                success: true,
            })),
            price_delay: Mutex::new(None),
            purchase: Mutex::new(Ok(PurchaseResponse {
                txs: vec![
                    "exchange-signed-payment".to_string(),
                    "exchange-signed-transfer".to_string(),
                    "buyer-payment".to_string(),
                ],
            })),
            price_calls: AtomicUsize::new(0),
            purchase_calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }

    pub fn set_price(&self, price: u64) {
        *self.price.lock() = Ok(PriceResponse {
            price,
            success: true,
        });
    }

    pub fn set_price_response(&self, response: WalletResult<PriceResponse>) {
        *self.price.lock() = response;
    }

    /// Make every price request take `delay` before answering.
    pub fn set_price_delay(&self, delay: Duration) {
        *self.price_delay.lock() = Some(delay);
    }

    pub fn set_purchase_response(&self, response: WalletResult<PurchaseResponse>) {
        *self.purchase.lock() = response;
    }

    pub fn price_calls(&self) -> usize {
        self.price_calls.load(Ordering::SeqCst)
    }

    pub fn purchase_calls(&self) -> usize {
        self.purchase_calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<PurchaseRequest> {
        self.last_request.lock().clone()
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExchangeBackend for MockBackend {
    async fn get_price(&self) -> WalletResult<PriceResponse> {
        self.price_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.price_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.price.lock().clone()
    }

    async fn create_buy_tx(&self, request: &PurchaseRequest) -> WalletResult<PurchaseResponse> {
        self.purchase_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock() = Some(request.clone());
        self.purchase.lock().clone()
    }
}

/// Pairing provider whose events are pushed by the test itself.
pub struct MockPairingProvider {
    connected: AtomicBool,
    events_tx: mpsc::UnboundedSender<WalletResult<PairingEvent>>,
    events_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<WalletResult<PairingEvent>>>,
    sessions_created: AtomicUsize,
    sessions_killed: AtomicUsize,
}

impl MockPairingProvider {
    pub fn new() -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            connected: AtomicBool::new(false),
            events_tx,
            events_rx: tokio::sync::Mutex::new(events_rx),
            sessions_created: AtomicUsize::new(0),
            sessions_killed: AtomicUsize::new(0),
        }
    }

    /// Pretend the provider restored a session from an earlier visit.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn push(&self, event: WalletResult<PairingEvent>) {
        let _ = self.events_tx.send(event);
    }

    pub fn push_connect(&self, address: &str) {
        self.push(Ok(PairingEvent::Connect(PairingPayload::with_account(address))));
    }

    pub fn push_update(&self, address: &str) {
        self.push(Ok(PairingEvent::SessionUpdate(PairingPayload::with_account(
            address,
        ))));
    }

    pub fn sessions_created(&self) -> usize {
        self.sessions_created.load(Ordering::SeqCst)
    }

    pub fn sessions_killed(&self) -> usize {
        self.sessions_killed.load(Ordering::SeqCst)
    }
}

impl Default for MockPairingProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PairingProvider for MockPairingProvider {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn create_session(&self) -> WalletResult<Uuid> {
        self.sessions_created.fetch_add(1, Ordering::SeqCst);
        Ok(Uuid::new_v4())
    }

    async fn next_event(&self) -> WalletResult<PairingEvent> {
        let event = self
            .events_rx
            .lock()
            .await
            .recv()
            .await
            .unwrap_or_else(|| Err(wallet_error!(Cancelled, "no more pairing events")));
        match &event {
            Ok(PairingEvent::Connect(_)) => self.set_connected(true),
            Ok(PairingEvent::Disconnect) => self.set_connected(false),
            _ => {}
        }
        event
    }

    async fn kill_session(&self) -> WalletResult<()> {
        self.sessions_killed.fetch_add(1, Ordering::SeqCst);
        self.set_connected(false);
        Ok(())
    }
}
