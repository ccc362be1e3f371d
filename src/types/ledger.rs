//! Values exchanged with the ledger network facade
//!
//! These types describe keys, balances and blocks as the core sees them,
//! independent of whether they came from a node RPC or the in-process
//! simulated ledger.

use super::amount::Raw;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Hash identifying a submitted or confirmed block
pub type TransactionId = String;

/// Account signing key, recomputed on demand and never persisted
#[derive(Clone, PartialEq, Eq)]
pub struct SecretKey(String);

impl SecretKey {
    pub fn new(hex: impl Into<String>) -> Self {
        SecretKey(hex.into())
    }

    /// Hex encoding of the key, for handing to the ledger facade only
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(<redacted>)")
    }
}

/// Signing key together with the address it controls
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountKeys {
    pub secret_key: SecretKey,
    pub address: String,
}

/// Spendable and not-yet-pocketed funds of an address
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    /// Funds the account can spend now
    pub balance: Raw,

    /// Confirmed incoming funds that have not been pocketed yet
    pub pending: Raw,
}

/// A confirmed transfer as delivered by the confirmation stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmedBlock {
    /// Account that signed the send
    pub source_address: String,

    /// Account the funds were sent to
    pub destination_address: String,

    pub transaction_id: TransactionId,

    pub amount: Raw,
}

/// A pending transfer that was pocketed into its recipient's balance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedTransfer {
    /// Hash of the send block that was received
    pub source_transaction_id: TransactionId,

    pub amount: Raw,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_key_debug_is_redacted() {
        let key = SecretKey::new("deadbeef");

        assert_eq!(format!("{:?}", key), "SecretKey(<redacted>)");
        assert_eq!(key.expose(), "deadbeef");
    }
}
