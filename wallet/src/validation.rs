use crate::errors::{WalletError, WalletResult};
use crate::units::BaseUnits;
use regex::Regex;
use sha2::{Digest, Sha512_256};

const ADDRESS_LENGTH: usize = 58;
const PUBLIC_KEY_LENGTH: usize = 32;
const CHECKSUM_LENGTH: usize = 4;
const SHORT_ADDRESS_PREFIX: usize = 10;

/// Largest purchase the client will submit, in Algo.
pub const MAX_PURCHASE_ALGO: f64 = 1_000_000_000.0;

/// Input validation utilities for the wallet
pub struct InputValidator {
    address_pattern: Regex,
}

impl InputValidator {
    pub fn new() -> WalletResult<Self> {
        let address_pattern = Regex::new(r"^[A-Z2-7]{58}$")
            .map_err(|e| WalletError::ValidationError(format!("Invalid address regex: {}", e)))?;

        Ok(InputValidator { address_pattern })
    }

    /// Validate an Algorand account address, including its checksum.
    pub fn validate_address(&self, address: &str) -> WalletResult<()> {
        if address.is_empty() {
            return Err(WalletError::InvalidAddress(
                "Address cannot be empty".to_string(),
            ));
        }

        if address.len() != ADDRESS_LENGTH {
            return Err(WalletError::InvalidAddress(format!(
                "Invalid address length: expected {} characters, got {}",
                ADDRESS_LENGTH,
                address.len()
            )));
        }

        if !self.address_pattern.is_match(address) {
            return Err(WalletError::InvalidAddress(
                "Address format is invalid".to_string(),
            ));
        }

        let decoded = decode_base32(address)?;
        if decoded.len() != PUBLIC_KEY_LENGTH + CHECKSUM_LENGTH {
            return Err(WalletError::InvalidAddress(
                "Address decodes to the wrong length".to_string(),
            ));
        }

        let (public_key, checksum) = decoded.split_at(PUBLIC_KEY_LENGTH);
        let digest = Sha512_256::digest(public_key);
        if &digest[digest.len() - CHECKSUM_LENGTH..] != checksum {
            return Err(WalletError::InvalidAddress(
                "Address checksum mismatch".to_string(),
            ));
        }

        Ok(())
    }

    /// Validate a purchase amount in Algo, returning it in base units.
    pub fn validate_purchase_amount(&self, amount: f64) -> WalletResult<BaseUnits> {
        if !amount.is_finite() {
            return Err(WalletError::InvalidAmount(
                "Amount must be a finite number".to_string(),
            ));
        }

        if amount <= 0.0 {
            return Err(WalletError::InvalidAmount(
                "Amount must be positive".to_string(),
            ));
        }

        if amount > MAX_PURCHASE_ALGO {
            return Err(WalletError::InvalidAmount("Amount too large".to_string()));
        }

        let units = BaseUnits::from_decimal(amount)?;
        if units.is_zero() {
            return Err(WalletError::InvalidAmount(
                "Amount must be positive".to_string(),
            ));
        }

        Ok(units)
    }

    /// Validate a purchase amount typed by the user.
    pub fn validate_amount_str(&self, amount: &str) -> WalletResult<BaseUnits> {
        let units = BaseUnits::from_string(amount)?;
        self.validate_purchase_amount(units.as_decimal())?;
        Ok(units)
    }
}

impl Default for InputValidator {
    fn default() -> Self {
        Self::new().expect("Failed to create InputValidator")
    }
}

/// Abbreviated address for display, e.g. `AAAAAAAAAA...`.
pub fn short_address(address: &str) -> String {
    let prefix: String = address.chars().take(SHORT_ADDRESS_PREFIX).collect();
    format!("{}...", prefix)
}

/// RFC 4648 base32 without padding.
fn decode_base32(input: &str) -> WalletResult<Vec<u8>> {
    let mut output = Vec::with_capacity(input.len() * 5 / 8);
    let mut buffer: u32 = 0;
    let mut bits: u32 = 0;

    for c in input.bytes() {
        let value = match c {
            b'A'..=b'Z' => c - b'A',
            b'2'..=b'7' => c - b'2' + 26,
            _ => {
                return Err(WalletError::InvalidAddress(format!(
                    "Invalid base32 character '{}'",
                    c as char
                )))
            }
        };
        buffer = (buffer << 5) | value as u32;
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            output.push((buffer >> bits) as u8);
            buffer &= (1 << bits) - 1;
        }
    }

    if buffer != 0 {
        return Err(WalletError::InvalidAddress(
            "Address has non-zero trailing bits".to_string(),
        ));
    }

    Ok(output)
}
