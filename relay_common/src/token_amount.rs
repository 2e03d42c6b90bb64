use std::{fmt::Display, str::FromStr};

use alloy_primitives::U256;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

//--------------------------------------    TokenAmount      ---------------------------------------------------------
/// A token quantity, held as a 256-bit unsigned integer.
///
/// Amounts travel as decimal strings, in JSON and in the database. There are no `Add`/`Sub` operator impls, so an
/// amount can never wrap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TokenAmount(U256);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountParseError {
    #[error("Token amount is empty")]
    Empty,
    #[error("Token amount contains an invalid character '{0}'. Only decimal digits are allowed")]
    InvalidCharacter(char),
    #[error("Token amount {0} does not fit in 256 bits")]
    Overflow(String),
}

impl TokenAmount {
    pub const MAX: Self = Self(U256::MAX);
    pub const ZERO: Self = Self(U256::ZERO);

    pub fn new(value: U256) -> Self {
        Self(value)
    }

    pub fn value(&self) -> U256 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn saturating_sub(&self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    /// The 32-byte big-endian word for this amount, as used when hashing order terms.
    pub fn to_be_bytes(&self) -> [u8; 32] {
        self.0.to_be_bytes::<32>()
    }
}

impl From<u64> for TokenAmount {
    fn from(value: u64) -> Self {
        Self(U256::from(value))
    }
}

impl From<U256> for TokenAmount {
    fn from(value: U256) -> Self {
        Self(value)
    }
}

impl FromStr for TokenAmount {
    type Err = AmountParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(AmountParseError::Empty);
        }
        let ten = U256::from(10u8);
        let mut value = U256::ZERO;
        for c in s.chars() {
            let digit = c.to_digit(10).ok_or(AmountParseError::InvalidCharacter(c))?;
            value = value
                .checked_mul(ten)
                .and_then(|v| v.checked_add(U256::from(digit)))
                .ok_or_else(|| AmountParseError::Overflow(s.to_string()))?;
        }
        Ok(Self(value))
    }
}

impl Display for TokenAmount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for TokenAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for TokenAmount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}
