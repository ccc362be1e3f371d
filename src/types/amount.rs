//! Amounts in the ledger's smallest transferable unit
//!
//! Balances and transfers are carried as whole `raw` units in a `u128`, which
//! covers the full supply without rounding. Human-facing values (nyano and
//! NANO) are converted with `rust_decimal` at the edges only.

use super::error::AmountError;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Number of raw units in one nyano
pub const RAW_PER_NYANO: u128 = 1_000_000_000_000_000_000_000_000;

/// Number of raw units in one NANO
pub const RAW_PER_NANO: u128 = 1_000_000_000_000_000_000_000_000_000_000;

/// Decimal places of nyano shown to users
const DISPLAY_SCALE: u32 = 6;

/// Decimal places between raw and nyano
const NYANO_SCALE: u32 = 24;

/// Amount in raw, the indivisible base unit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Raw(pub u128);

impl Raw {
    pub const ZERO: Raw = Raw(0);

    /// Convert a nyano amount (as typed by a user) into raw
    ///
    /// Rejects negative amounts and anything finer than one raw.
    pub fn from_nyano(nyano: Decimal) -> Result<Raw, AmountError> {
        if nyano.is_sign_negative() && !nyano.is_zero() {
            return Err(AmountError::Negative {
                amount: nyano.to_string(),
            });
        }

        let normalized = nyano.normalize();
        let scale = normalized.scale();
        if scale > NYANO_SCALE {
            return Err(AmountError::TooPrecise {
                amount: nyano.to_string(),
            });
        }

        let mantissa = u128::try_from(normalized.mantissa()).map_err(|_| AmountError::Negative {
            amount: nyano.to_string(),
        })?;

        10u128
            .checked_pow(NYANO_SCALE - scale)
            .and_then(|factor| mantissa.checked_mul(factor))
            .map(Raw)
            .ok_or_else(|| AmountError::Overflow {
                amount: nyano.to_string(),
            })
    }

    /// Balance in nyano, truncated to six decimal places
    pub fn to_nyano(self) -> Decimal {
        Self::scaled(self.0 / (RAW_PER_NYANO / 10u128.pow(DISPLAY_SCALE)))
    }

    /// Balance in NANO, truncated to six decimal places
    pub fn to_nano(self) -> Decimal {
        Self::scaled(self.0 / (RAW_PER_NANO / 10u128.pow(DISPLAY_SCALE)))
    }

    fn scaled(units: u128) -> Decimal {
        // Max supply is ~1.3e38 raw, so `units` stays well inside 96 bits.
        Decimal::from_i128_with_scale(units as i128, DISPLAY_SCALE).normalize()
    }

    pub fn checked_sub(self, other: Raw) -> Option<Raw> {
        self.0.checked_sub(other.0).map(Raw)
    }

    pub fn checked_add(self, other: Raw) -> Option<Raw> {
        self.0.checked_add(other.0).map(Raw)
    }
}

impl fmt::Display for Raw {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Raw {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u128>()
            .map(Raw)
            .map_err(|_| AmountError::Unparseable {
                amount: s.to_string(),
            })
    }
}

// Node RPC encodes raw amounts as decimal strings; u128 does not fit in JSON numbers.
impl Serialize for Raw {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for Raw {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
