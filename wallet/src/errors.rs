use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WalletError {
    // Pairing errors
    PairingError(String),
    NotConnected,

    // Network errors
    NetworkError(String),
    ConnectionTimeout,
    InvalidResponse(String),
    BackendRejected { status: u16, message: String },

    // Validation errors
    ValidationError(String),
    InvalidAddress(String),
    InvalidAmount(String),

    // Lifecycle errors
    NotInitialized,
    Cancelled(String),
    NotFound(String),

    // Generic errors
    Unknown(String),
}

impl WalletError {
    /// Network-class failures that leave existing data intact and may clear up on their own.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            WalletError::NetworkError(_)
                | WalletError::ConnectionTimeout
                | WalletError::InvalidResponse(_)
                | WalletError::BackendRejected { .. }
        )
    }

    /// Text suitable for showing to the user next to the failed control.
    pub fn user_message(&self) -> String {
        match self {
            WalletError::PairingError(_) => {
                "Could not connect to your wallet. Please try again.".to_string()
            }
            WalletError::NotConnected => "Connect a wallet first.".to_string(),
            WalletError::NetworkError(_) | WalletError::ConnectionTimeout => {
                "Network unavailable, showing last known values.".to_string()
            }
            WalletError::InvalidResponse(_) => {
                "Unexpected response from server, showing last known values.".to_string()
            }
            WalletError::BackendRejected { message, .. } => {
                format!("Purchase rejected: {}", message)
            }
            WalletError::InvalidAmount(msg) => format!("Invalid amount: {}", msg),
            WalletError::InvalidAddress(msg) => format!("Invalid address: {}", msg),
            WalletError::Cancelled(_) => "Request cancelled.".to_string(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for WalletError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            WalletError::PairingError(msg) => write!(f, "Pairing error: {}", msg),
            WalletError::NotConnected => write!(f, "Wallet not connected"),

            WalletError::NetworkError(msg) => write!(f, "Network error: {}", msg),
            WalletError::ConnectionTimeout => write!(f, "Connection timeout"),
            WalletError::InvalidResponse(msg) => write!(f, "Invalid response: {}", msg),
            WalletError::BackendRejected { status, message } => {
                write!(f, "Backend rejected request ({}): {}", status, message)
            }

            WalletError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            WalletError::InvalidAddress(msg) => write!(f, "Invalid address: {}", msg),
            WalletError::InvalidAmount(msg) => write!(f, "Invalid amount: {}", msg),

            WalletError::NotInitialized => write!(f, "Wallet client not initialized"),
            WalletError::Cancelled(msg) => write!(f, "Cancelled: {}", msg),
            WalletError::NotFound(msg) => write!(f, "Not found: {}", msg),

            WalletError::Unknown(msg) => write!(f, "Unknown error: {}", msg),
        }
    }
}

impl std::error::Error for WalletError {}

pub type WalletResult<T> = Result<T, WalletError>;

// Helper macro for easy error creation
#[macro_export]
macro_rules! wallet_error {
    ($variant:ident, $msg:expr) => {
        $crate::errors::WalletError::$variant($msg.to_string())
    };
    ($variant:ident) => {
        $crate::errors::WalletError::$variant
    };
}

// Conversion helpers
impl From<std::io::Error> for WalletError {
    fn from(error: std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::NotFound => WalletError::NotFound(error.to_string()),
            _ => WalletError::Unknown(error.to_string()),
        }
    }
}

impl From<serde_json::Error> for WalletError {
    fn from(error: serde_json::Error) -> Self {
        WalletError::ValidationError(format!("JSON error: {}", error))
    }
}

impl From<reqwest::Error> for WalletError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            WalletError::ConnectionTimeout
        } else if error.is_decode() {
            WalletError::InvalidResponse(error.to_string())
        } else {
            WalletError::NetworkError(format!("HTTP request failed: {}", error))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(WalletError::ConnectionTimeout.is_transient());
        assert!(WalletError::NetworkError("down".into()).is_transient());
        assert!(!WalletError::NotConnected.is_transient());
        assert!(!WalletError::InvalidAmount("zero".into()).is_transient());
        assert!(!WalletError::PairingError("rejected".into()).is_transient());
    }

    #[test]
    fn json_errors_map_to_validation() {
        let err: WalletError = serde_json::from_str::<u64>("\"x\"").unwrap_err().into();
        assert!(matches!(err, WalletError::ValidationError(msg) if msg.starts_with("JSON error")));
    }

    #[test]
    fn macro_builds_variants() {
        assert_eq!(
            wallet_error!(NotFound, "asset"),
            WalletError::NotFound("asset".to_string())
        );
        assert_eq!(wallet_error!(NotConnected), WalletError::NotConnected);
    }

    #[test]
    fn rejected_message_is_user_visible() {
        let err = WalletError::BackendRejected {
            status: 400,
            message: "amount below minimum".into(),
        };
        assert_eq!(err.user_message(), "Purchase rejected: amount below minimum");
        assert!(err.to_string().contains("400"));
    }
}
