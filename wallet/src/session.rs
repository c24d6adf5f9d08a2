use parking_lot::RwLock;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::errors::{WalletError, WalletResult};
use crate::units::BaseUnits;
use crate::validation::short_address;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected { address: String },
}

/// One completed account lookup. `token` is `None` when the account holds no
/// entry for the tracked asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceReading {
    pub algo: BaseUnits,
    pub token: Option<BaseUnits>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountBalances {
    pub algo: BaseUnits,
    pub token: BaseUnits,
    /// Set when the latest refresh failed and these are last-known values.
    pub stale: bool,
    pub updated_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl Default for AccountBalances {
    fn default() -> Self {
        Self {
            algo: BaseUnits::default(),
            token: BaseUnits::default(),
            stale: false,
            updated_at: None,
            last_error: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceQuote {
    pub price: f64,
    pub fetched_at: DateTime<Utc>,
    pub stale: bool,
}

/// Identifies one connection generation. Every connect, disconnect and
/// account switch starts a new one; writes carrying an older ticket are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTicket(u64);

#[derive(Debug, Default)]
struct SessionState {
    connection: ConnectionState,
    balances: Option<AccountBalances>,
    quote: Option<PriceQuote>,
    epoch: u64,
    session_id: Option<Uuid>,
    last_error: Option<String>,
}

impl Default for ConnectionState {
    fn default() -> Self {
        ConnectionState::Disconnected
    }
}

impl SessionState {
    fn advance(&mut self) -> SessionTicket {
        self.epoch += 1;
        SessionTicket(self.epoch)
    }

    fn is_current(&self, ticket: SessionTicket) -> bool {
        self.epoch == ticket.0
    }
}

/// Flattened view of the session for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub connection: ConnectionState,
    pub short_address: Option<String>,
    pub algo_balance: Option<f64>,
    pub token_balance: Option<f64>,
    pub balances_stale: bool,
    pub price: Option<f64>,
    pub price_stale: bool,
    pub last_error: Option<String>,
}

/// Explicit state record for one wallet connection: Connection State,
/// Account Balances and the latest Price Quote.
#[derive(Debug, Clone, Default)]
pub struct SessionManager {
    state: Arc<RwLock<SessionState>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection(&self) -> ConnectionState {
        self.state.read().connection.clone()
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state.read().connection, ConnectionState::Connected { .. })
    }

    pub fn connected_address(&self) -> Option<String> {
        match &self.state.read().connection {
            ConnectionState::Connected { address } => Some(address.clone()),
            _ => None,
        }
    }

    /// Address and ticket of the live connection, for work whose result must
    /// be dropped if the connection changes meanwhile.
    pub fn current_account(&self) -> Option<(String, SessionTicket)> {
        let state = self.state.read();
        match &state.connection {
            ConnectionState::Connected { address } => {
                Some((address.clone(), SessionTicket(state.epoch)))
            }
            _ => None,
        }
    }

    pub fn session_id(&self) -> Option<Uuid> {
        self.state.read().session_id
    }

    /// Move to `Connecting`. Fails if a connection attempt or session is already live.
    pub fn begin_connect(&self) -> WalletResult<SessionTicket> {
        let mut state = self.state.write();
        match state.connection {
            ConnectionState::Disconnected => {}
            ConnectionState::Connecting => {
                return Err(WalletError::ValidationError(
                    "A connection attempt is already in progress".to_string(),
                ))
            }
            ConnectionState::Connected { .. } => {
                return Err(WalletError::ValidationError(
                    "Wallet is already connected".to_string(),
                ))
            }
        }

        state.connection = ConnectionState::Connecting;
        state.balances = None;
        state.last_error = None;
        Ok(state.advance())
    }

    pub fn attach_session(&self, ticket: SessionTicket, session_id: Uuid) {
        let mut state = self.state.write();
        if state.is_current(ticket) {
            state.session_id = Some(session_id);
        }
    }

    pub fn mark_connected(&self, ticket: SessionTicket, address: &str) -> WalletResult<()> {
        let mut state = self.state.write();
        if !state.is_current(ticket) || state.connection != ConnectionState::Connecting {
            return Err(WalletError::Cancelled(
                "Connection attempt was superseded".to_string(),
            ));
        }

        state.connection = ConnectionState::Connected {
            address: address.to_string(),
        };
        state.balances = None;
        Ok(())
    }

    /// Record a failed connect attempt. Stale tickets are ignored.
    pub fn fail_connect(&self, ticket: SessionTicket, error: &WalletError) {
        let mut state = self.state.write();
        if !state.is_current(ticket) {
            return;
        }
        state.connection = ConnectionState::Disconnected;
        state.balances = None;
        state.session_id = None;
        state.last_error = Some(error.user_message());
        state.advance();
    }

    /// Switch the live connection to another account, invalidating in-flight work.
    pub fn switch_account(&self, address: &str) -> WalletResult<SessionTicket> {
        let mut state = self.state.write();
        if !matches!(state.connection, ConnectionState::Connected { .. }) {
            return Err(WalletError::NotConnected);
        }
        state.connection = ConnectionState::Connected {
            address: address.to_string(),
        };
        state.balances = None;
        Ok(state.advance())
    }

    /// Reset to `Disconnected`, dropping balances. Returns the previous address.
    pub fn disconnect(&self) -> Option<String> {
        let mut state = self.state.write();
        let previous = match std::mem::take(&mut state.connection) {
            ConnectionState::Connected { address } => Some(address),
            _ => None,
        };
        state.balances = None;
        state.session_id = None;
        state.advance();
        previous
    }

    /// Store a completed lookup. Returns `false` when the ticket is no longer
    /// current, in which case nothing changes.
    pub fn apply_balances(&self, ticket: SessionTicket, reading: BalanceReading) -> bool {
        let mut state = self.state.write();
        if !state.is_current(ticket)
            || !matches!(state.connection, ConnectionState::Connected { .. })
        {
            return false;
        }

        let balances = state.balances.get_or_insert_with(AccountBalances::default);
        balances.algo = reading.algo;
        if let Some(token) = reading.token {
            balances.token = token;
        }
        balances.stale = false;
        balances.updated_at = Some(Utc::now());
        balances.last_error = None;
        true
    }

    /// Keep last-known balances but flag them stale.
    pub fn mark_balances_stale(&self, ticket: SessionTicket, error: &WalletError) -> bool {
        let mut state = self.state.write();
        if !state.is_current(ticket)
            || !matches!(state.connection, ConnectionState::Connected { .. })
        {
            return false;
        }

        let balances = state.balances.get_or_insert_with(AccountBalances::default);
        balances.stale = true;
        balances.last_error = Some(error.user_message());
        true
    }

    pub fn balances(&self) -> Option<AccountBalances> {
        self.state.read().balances.clone()
    }

    pub fn set_quote(&self, price: f64) {
        self.state.write().quote = Some(PriceQuote {
            price,
            fetched_at: Utc::now(),
            stale: false,
        });
    }

    pub fn mark_quote_stale(&self) {
        if let Some(quote) = self.state.write().quote.as_mut() {
            quote.stale = true;
        }
    }

    pub fn quote(&self) -> Option<PriceQuote> {
        self.state.read().quote.clone()
    }

    pub fn record_error(&self, error: &WalletError) {
        self.state.write().last_error = Some(error.user_message());
    }

    pub fn clear_error(&self) {
        self.state.write().last_error = None;
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.state.read();
        let short = match &state.connection {
            ConnectionState::Connected { address } => Some(short_address(address)),
            _ => None,
        };

        SessionSnapshot {
            connection: state.connection.clone(),
            short_address: short,
            algo_balance: state.balances.as_ref().map(|b| b.algo.as_decimal()),
            token_balance: state.balances.as_ref().map(|b| b.token.as_decimal()),
            balances_stale: state.balances.as_ref().map_or(false, |b| b.stale),
            price: state.quote.as_ref().map(|q| q.price),
            price_stale: state.quote.as_ref().map_or(false, |q| q.stale),
            last_error: state.last_error.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDRESS: &str = "AEBAGBAFAYDQQCIKBMGA2DQPCAIREEYUCULBOGAZDINRYHI6D4QDTYK3BA";

    fn reading(algo: u64, token: Option<u64>) -> BalanceReading {
        BalanceReading {
            algo: BaseUnits::from_base_units(algo),
            token: token.map(BaseUnits::from_base_units),
        }
    }

    fn connected() -> (SessionManager, SessionTicket) {
        let manager = SessionManager::new();
        let ticket = manager.begin_connect().unwrap();
        manager.mark_connected(ticket, ADDRESS).unwrap();
        (manager, ticket)
    }

    #[test]
    fn connect_lifecycle() {
        let manager = SessionManager::new();
        assert_eq!(manager.connection(), ConnectionState::Disconnected);

        let ticket = manager.begin_connect().unwrap();
        assert_eq!(manager.connection(), ConnectionState::Connecting);
        assert!(manager.begin_connect().is_err());

        manager.mark_connected(ticket, ADDRESS).unwrap();
        assert_eq!(manager.connected_address().as_deref(), Some(ADDRESS));

        assert_eq!(manager.disconnect().as_deref(), Some(ADDRESS));
        assert!(!manager.is_connected());
    }

    #[test]
    fn failed_connect_resets_state() {
        let manager = SessionManager::new();
        let ticket = manager.begin_connect().unwrap();
        manager.fail_connect(ticket, &WalletError::PairingError("rejected".into()));

        assert_eq!(manager.connection(), ConnectionState::Disconnected);
        assert!(manager.snapshot().last_error.is_some());
        assert!(manager.mark_connected(ticket, ADDRESS).is_err());
        assert!(manager.begin_connect().is_ok());
    }

    #[test]
    fn missing_token_entry_keeps_previous_token_balance() {
        let (manager, ticket) = connected();
        assert!(manager.apply_balances(ticket, reading(1_000_000, Some(7_000_000))));
        assert!(manager.apply_balances(ticket, reading(2_000_000, None)));

        let balances = manager.balances().unwrap();
        assert_eq!(balances.algo.as_decimal(), 2.0);
        assert_eq!(balances.token.as_decimal(), 7.0);
    }

    #[test]
    fn stale_ticket_writes_are_dropped() {
        let (manager, ticket) = connected();
        manager.disconnect();
        assert!(!manager.apply_balances(ticket, reading(5, Some(5))));
        assert!(manager.balances().is_none());
        assert!(!manager.is_connected());
    }

    #[test]
    fn disconnect_clears_balances() {
        let (manager, ticket) = connected();
        manager.apply_balances(ticket, reading(3_000_000, Some(1)));
        manager.disconnect();

        let snapshot = manager.snapshot();
        assert_eq!(snapshot.algo_balance, None);
        assert_eq!(snapshot.token_balance, None);
    }

    #[test]
    fn failed_refresh_keeps_last_known_values() {
        let (manager, ticket) = connected();
        manager.apply_balances(ticket, reading(4_000_000, Some(2_000_000)));
        assert!(manager.mark_balances_stale(ticket, &WalletError::ConnectionTimeout));

        let snapshot = manager.snapshot();
        assert_eq!(snapshot.algo_balance, Some(4.0));
        assert_eq!(snapshot.token_balance, Some(2.0));
        assert!(snapshot.balances_stale);
    }

    #[test]
    fn switching_account_invalidates_old_ticket() {
        let (manager, old) = connected();
        let new = manager.switch_account("OTHER").unwrap();
        assert!(!manager.apply_balances(old, reading(1, None)));
        assert!(manager.apply_balances(new, reading(1, None)));
        assert_eq!(manager.connected_address().as_deref(), Some("OTHER"));
    }

    #[test]
    fn quote_goes_stale_without_being_dropped() {
        let manager = SessionManager::new();
        manager.mark_quote_stale();
        assert!(manager.quote().is_none());

        manager.set_quote(2.5);
        manager.mark_quote_stale();
        let quote = manager.quote().unwrap();
        assert_eq!(quote.price, 2.5);
        assert!(quote.stale);
    }

    #[test]
    fn snapshot_serializes_for_display() {
        let (manager, _) = connected();
        let json = serde_json::to_value(manager.snapshot()).unwrap();
        assert_eq!(json["connection"]["status"], "connected");
        assert_eq!(json["shortAddress"], "AEBAGBAFAY...");
    }
}
