/// Fixed-point amounts for Algo and Algorand Standard Assets
///
/// Both microAlgos and CHAD base units use six decimal places, so a single
/// type covers the native coin and the token.
use crate::errors::{WalletError, WalletResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An amount stored as integer base units (1 whole unit = 10^6 base units).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BaseUnits {
    base_units: u64,
}

impl BaseUnits {
    /// Number of decimal places
    pub const DECIMALS: u8 = 6;
    /// Base units per whole unit (10^6)
    pub const UNITS_PER_WHOLE: u64 = 1_000_000;

    pub const fn from_base_units(base_units: u64) -> Self {
        BaseUnits { base_units }
    }

    /// Create amount from whole units
    pub fn from_whole(whole: u64) -> WalletResult<Self> {
        whole
            .checked_mul(Self::UNITS_PER_WHOLE)
            .map(Self::from_base_units)
            .ok_or_else(|| WalletError::InvalidAmount("Amount too large".to_string()))
    }

    /// Create amount from a decimal number, rejecting precision finer than one base unit.
    pub fn from_decimal(value: f64) -> WalletResult<Self> {
        if !value.is_finite() {
            return Err(WalletError::InvalidAmount(
                "Amount must be a finite number".to_string(),
            ));
        }
        if value < 0.0 {
            return Err(WalletError::InvalidAmount(
                "Amount cannot be negative".to_string(),
            ));
        }

        // `Display` for f64 prints the shortest string that round-trips, never in
        // exponent form, so its digit count is the precision the caller typed.
        Self::from_string(&value.to_string())
    }

    /// Create amount from string (supports decimal notation)
    pub fn from_string(amount_str: &str) -> WalletResult<Self> {
        let amount_str = amount_str.trim();
        if amount_str.is_empty() {
            return Err(WalletError::InvalidAmount(
                "Amount cannot be empty".to_string(),
            ));
        }

        let (whole_str, fractional_str) = match amount_str.split_once('.') {
            Some((whole, fractional)) => (whole, fractional),
            None => (amount_str, ""),
        };

        if fractional_str.len() > Self::DECIMALS as usize {
            return Err(WalletError::InvalidAmount(
                "Too many decimal places".to_string(),
            ));
        }
        let is_digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
        if whole_str.is_empty() || !is_digits(whole_str) || !is_digits(fractional_str) {
            return Err(WalletError::InvalidAmount(
                "Invalid number format".to_string(),
            ));
        }

        let whole: u64 = whole_str
            .parse()
            .map_err(|_| WalletError::InvalidAmount("Invalid number format".to_string()))?;
        let fractional = if fractional_str.is_empty() {
            0
        } else {
            format!("{:0<6}", fractional_str)
                .parse::<u64>()
                .map_err(|_| WalletError::InvalidAmount("Invalid fractional part".to_string()))?
        };

        whole
            .checked_mul(Self::UNITS_PER_WHOLE)
            .and_then(|w| w.checked_add(fractional))
            .map(Self::from_base_units)
            .ok_or_else(|| WalletError::InvalidAmount("Amount overflow".to_string()))
    }

    pub fn base_units(&self) -> u64 {
        self.base_units
    }

    /// Get amount as a decimal number (may lose precision)
    pub fn as_decimal(&self) -> f64 {
        self.base_units as f64 / Self::UNITS_PER_WHOLE as f64
    }

    /// Get amount as string with full precision
    pub fn as_string(&self) -> String {
        let whole = self.base_units / Self::UNITS_PER_WHOLE;
        let fractional = self.base_units % Self::UNITS_PER_WHOLE;

        if fractional == 0 {
            whole.to_string()
        } else {
            let frac_str = format!("{:06}", fractional)
                .trim_end_matches('0')
                .to_string();
            format!("{}.{}", whole, frac_str)
        }
    }

    pub fn is_zero(&self) -> bool {
        self.base_units == 0
    }

    /// Multiply by a whole-number rate, e.g. tokens per Algo.
    pub fn checked_mul(&self, factor: u64) -> WalletResult<BaseUnits> {
        self.base_units
            .checked_mul(factor)
            .map(Self::from_base_units)
            .ok_or_else(|| WalletError::InvalidAmount("Amount overflow in multiplication".to_string()))
    }

    pub fn checked_add(&self, other: &BaseUnits) -> WalletResult<BaseUnits> {
        self.base_units
            .checked_add(other.base_units)
            .map(Self::from_base_units)
            .ok_or_else(|| WalletError::InvalidAmount("Amount overflow in addition".to_string()))
    }
}

impl fmt::Display for BaseUnits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_string())
    }
}

impl FromStr for BaseUnits {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BaseUnits::from_string(s)
    }
}
