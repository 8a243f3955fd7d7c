//! Account addresses.
//!
//! Ledger addresses are 20-byte identifiers written as `0x` + 40 hex digits.
//! Wallets hand them out in mixed-case checksum form while the ledger may
//! echo them lower-cased, so two spellings of the same bytes must compare
//! equal. [`Address`] keeps the spelling it was given for display and
//! compares on the bytes.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Length of an address in bytes.
pub const ADDRESS_LENGTH: usize = 20;

/// Why a string is not a valid address.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    /// Missing the `0x` prefix.
    #[error("address must start with 0x: {0:?}")]
    MissingPrefix(String),

    /// Wrong number of hex digits.
    #[error("address must be {expected} hex digits, got {found}")]
    WrongLength {
        /// Expected hex digit count.
        expected: usize,
        /// Hex digit count found.
        found: usize,
    },

    /// Non-hex characters after the prefix.
    #[error("address is not hex: {0:?}")]
    NotHex(String),
}

/// A ledger account address. Equality is case-insensitive.
#[derive(Clone, Debug)]
pub struct Address {
    text: String,
    bytes: [u8; ADDRESS_LENGTH],
}

impl Address {
    /// Parses `0x` + 40 hex digits, in any letter case.
    pub fn parse(text: &str) -> Result<Self, AddressError> {
        let text = text.trim();
        let digits = text
            .strip_prefix("0x")
            .or_else(|| text.strip_prefix("0X"))
            .ok_or_else(|| AddressError::MissingPrefix(text.to_string()))?;

        if digits.len() != ADDRESS_LENGTH * 2 {
            return Err(AddressError::WrongLength {
                expected: ADDRESS_LENGTH * 2,
                found: digits.len(),
            });
        }

        let mut bytes = [0u8; ADDRESS_LENGTH];
        hex::decode_to_slice(digits, &mut bytes)
            .map_err(|_| AddressError::NotHex(text.to_string()))?;

        Ok(Self {
            text: text.to_string(),
            bytes,
        })
    }

    /// The address as it was written.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Canonical lower-case form.
    pub fn to_lowercase(&self) -> String {
        format!("0x{}", hex::encode(self.bytes))
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; ADDRESS_LENGTH] {
        &self.bytes
    }

    /// Shortened form for logs and prompts, e.g. `0x1234...abcd`.
    pub fn short(&self) -> String {
        let lower = self.to_lowercase();
        format!("{}...{}", &lower[..6], &lower[lower.len() - 4..])
    }
}

impl PartialEq for Address {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

impl Eq for Address {}

impl Hash for Address {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bytes.hash(state);
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Address::parse(s)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.text)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Address::parse(&text).map_err(serde::de::Error::custom)
    }
}
