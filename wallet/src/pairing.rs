//! Wallet pairing seam.
//!
//! The pairing protocol itself (QR handshake, session encryption, relay) lives
//! outside this crate. [`PairingProvider`] is the contract the connection
//! manager consumes, and [`BridgedPairingProvider`] adapts a host that
//! delivers events through error-first callbacks into awaitable events.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use crate::errors::{WalletError, WalletResult};

pub const EVENT_CONNECT: &str = "connect";
pub const EVENT_SESSION_UPDATE: &str = "session_update";
pub const EVENT_DISCONNECT: &str = "disconnect";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairingParams {
    #[serde(default)]
    pub accounts: Vec<String>,
    #[serde(default)]
    pub chain_id: Option<u64>,
}

/// Payload of `connect` and `session_update` events: `{params: [{accounts: [address]}]}`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PairingPayload {
    #[serde(default)]
    pub params: Vec<PairingParams>,
}

impl PairingPayload {
    pub fn with_account(address: impl Into<String>) -> Self {
        Self {
            params: vec![PairingParams {
                accounts: vec![address.into()],
                chain_id: None,
            }],
        }
    }

    /// `params[0].accounts[0]`
    pub fn primary_account(&self) -> Option<&str> {
        self.params
            .first()
            .and_then(|params| params.accounts.first())
            .map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingEvent {
    Connect(PairingPayload),
    SessionUpdate(PairingPayload),
    Disconnect,
}

#[async_trait]
pub trait PairingProvider: Send + Sync {
    /// Whether the provider already holds an established session.
    fn is_connected(&self) -> bool;

    /// Open a new pairing session. The host shows the pairing QR code for it.
    async fn create_session(&self) -> WalletResult<Uuid>;

    /// Wait for the next session event. Errors reported by the wallet arrive as
    /// [`WalletError::PairingError`].
    async fn next_event(&self) -> WalletResult<PairingEvent>;

    async fn kill_session(&self) -> WalletResult<()>;
}

/// Requests from the provider to the host that owns the pairing client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingCommand {
    CreateSession { session_id: Uuid, bridge_url: String },
    KillSession,
}

/// Host side of a [`BridgedPairingProvider`].
pub struct PairingBridge {
    events: mpsc::UnboundedSender<WalletResult<PairingEvent>>,
    commands: mpsc::UnboundedReceiver<PairingCommand>,
}

impl PairingBridge {
    /// Forward a callback invocation `(error, payload)` for the named event.
    pub fn deliver(
        &self,
        event: &str,
        error: Option<String>,
        payload: serde_json::Value,
    ) -> WalletResult<()> {
        let parsed = match error {
            Some(message) => Err(WalletError::PairingError(message)),
            None => parse_event(event, payload),
        };

        self.events
            .send(parsed)
            .map_err(|_| WalletError::Cancelled("pairing provider dropped".to_string()))
    }

    /// Next request the host has to carry out, `None` once the provider is gone.
    pub async fn next_command(&mut self) -> Option<PairingCommand> {
        self.commands.recv().await
    }

    pub fn try_next_command(&mut self) -> Option<PairingCommand> {
        self.commands.try_recv().ok()
    }
}

fn parse_event(event: &str, payload: serde_json::Value) -> WalletResult<PairingEvent> {
    let parse_payload = || {
        serde_json::from_value::<PairingPayload>(payload.clone()).map_err(|e| {
            WalletError::PairingError(format!("Malformed {} payload: {}", event, e))
        })
    };

    match event {
        EVENT_CONNECT => Ok(PairingEvent::Connect(parse_payload()?)),
        EVENT_SESSION_UPDATE => Ok(PairingEvent::SessionUpdate(parse_payload()?)),
        EVENT_DISCONNECT => Ok(PairingEvent::Disconnect),
        other => Err(WalletError::PairingError(format!(
            "Unknown pairing event '{}'",
            other
        ))),
    }
}

/// [`PairingProvider`] fed by a host through a [`PairingBridge`].
pub struct BridgedPairingProvider {
    bridge_url: String,
    events: Mutex<mpsc::UnboundedReceiver<WalletResult<PairingEvent>>>,
    commands: mpsc::UnboundedSender<PairingCommand>,
    /// Tracks events as they are consumed, not as they are queued.
    connected: AtomicBool,
}

impl BridgedPairingProvider {
    pub fn new(bridge_url: impl Into<String>) -> (Self, PairingBridge) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let provider = Self {
            bridge_url: bridge_url.into(),
            events: Mutex::new(event_rx),
            commands: command_tx,
            connected: AtomicBool::new(false),
        };
        let bridge = PairingBridge {
            events: event_tx,
            commands: command_rx,
        };
        (provider, bridge)
    }

    fn send(&self, command: PairingCommand) -> WalletResult<()> {
        self.commands
            .send(command)
            .map_err(|_| WalletError::PairingError("pairing host is gone".to_string()))
    }
}

#[async_trait]
impl PairingProvider for BridgedPairingProvider {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn create_session(&self) -> WalletResult<Uuid> {
        let session_id = Uuid::new_v4();
        self.send(PairingCommand::CreateSession {
            session_id,
            bridge_url: self.bridge_url.clone(),
        })?;
        log::debug!("Requested pairing session {}", session_id);
        Ok(session_id)
    }

    async fn next_event(&self) -> WalletResult<PairingEvent> {
        let mut events = self.events.lock().await;
        let event = events
            .recv()
            .await
            .unwrap_or_else(|| Err(WalletError::PairingError("pairing bridge closed".to_string())));

        match &event {
            Ok(PairingEvent::Connect(_)) => self.connected.store(true, Ordering::SeqCst),
            Ok(PairingEvent::Disconnect) => self.connected.store(false, Ordering::SeqCst),
            _ => {}
        }
        event
    }

    async fn kill_session(&self) -> WalletResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        self.send(PairingCommand::KillSession)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_primary_account() {
        let payload: PairingPayload = serde_json::from_value(json!({
            "params": [{"accounts": ["FIRST", "SECOND"], "chainId": 4160}]
        }))
        .unwrap();
        assert_eq!(payload.primary_account(), Some("FIRST"));
        assert_eq!(payload.params[0].chain_id, Some(4160));
        assert_eq!(PairingPayload::default().primary_account(), None);
    }

    #[tokio::test]
    async fn bridge_delivers_connect_event() {
        let (provider, mut bridge) = BridgedPairingProvider::new("https://bridge.example");
        let session_id = provider.create_session().await.unwrap();
        assert_eq!(
            bridge.try_next_command(),
            Some(PairingCommand::CreateSession {
                session_id,
                bridge_url: "https://bridge.example".to_string()
            })
        );

        bridge
            .deliver(EVENT_CONNECT, None, json!({"params": [{"accounts": ["ADDR"]}]}))
            .unwrap();
        let event = provider.next_event().await.unwrap();
        assert_eq!(event, PairingEvent::Connect(PairingPayload::with_account("ADDR")));
        assert!(provider.is_connected());
    }

    #[tokio::test]
    async fn queued_connect_counts_only_once_consumed() {
        let (provider, mut bridge) = BridgedPairingProvider::new("https://bridge.example");
        bridge
            .deliver(EVENT_CONNECT, None, json!({"params": [{"accounts": ["ADDR"]}]}))
            .unwrap();
        assert!(!provider.is_connected());

        provider.create_session().await.unwrap();
        assert!(matches!(
            bridge.try_next_command(),
            Some(PairingCommand::CreateSession { .. })
        ));

        provider.next_event().await.unwrap();
        assert!(provider.is_connected());

        bridge.deliver(EVENT_DISCONNECT, None, json!(null)).unwrap();
        assert!(provider.is_connected());
        assert_eq!(provider.next_event().await.unwrap(), PairingEvent::Disconnect);
        assert!(!provider.is_connected());
    }

    #[tokio::test]
    async fn callback_error_becomes_pairing_error() {
        let (provider, bridge) = BridgedPairingProvider::new("https://bridge.example");
        bridge
            .deliver(EVENT_CONNECT, Some("User rejected".to_string()), json!(null))
            .unwrap();
        let err = provider.next_event().await.unwrap_err();
        assert_eq!(err, WalletError::PairingError("User rejected".to_string()));
        assert!(!provider.is_connected());
    }

    #[tokio::test]
    async fn malformed_payload_and_unknown_events_are_errors() {
        let (provider, bridge) = BridgedPairingProvider::new("https://bridge.example");
        bridge
            .deliver(EVENT_SESSION_UPDATE, None, json!({"params": "nope"}))
            .unwrap();
        bridge.deliver("call_request", None, json!({})).unwrap();

        assert!(matches!(
            provider.next_event().await,
            Err(WalletError::PairingError(msg)) if msg.contains("Malformed")
        ));
        assert!(matches!(
            provider.next_event().await,
            Err(WalletError::PairingError(msg)) if msg.contains("Unknown")
        ));
    }

    #[tokio::test]
    async fn closed_bridge_ends_pairing() {
        let (provider, bridge) = BridgedPairingProvider::new("https://bridge.example");
        drop(bridge);
        assert!(matches!(
            provider.next_event().await,
            Err(WalletError::PairingError(_))
        ));
        assert!(provider.create_session().await.is_err());
    }

    #[tokio::test]
    async fn kill_session_notifies_host() {
        let (provider, mut bridge) = BridgedPairingProvider::new("https://bridge.example");
        bridge
            .deliver(EVENT_CONNECT, None, json!({"params": [{"accounts": ["ADDR"]}]}))
            .unwrap();
        provider.next_event().await.unwrap();
        assert!(provider.is_connected());
        provider.kill_session().await.unwrap();
        assert!(!provider.is_connected());
        assert_eq!(bridge.next_command().await, Some(PairingCommand::KillSession));
    }
}
