//! Account-related types for the tip ledger
//!
//! This module defines the persisted `Account` record that links an external
//! chat identity to its deterministically derived ledger address.

use serde::{Deserialize, Serialize};

/// Opaque, stable identifier of the identity owning an account
///
/// For chat front ends this is the platform user id rendered as a string.
pub type ExternalId = String;

/// Ordinal used with the master seed to derive an account's keypair
///
/// Index 0 is reserved for the allocation counter, so every account holds an
/// index of at least 1.
pub type SeedIndex = u64;

/// Custodial account record
///
/// The same serialized record is stored under two keys (identity and address),
/// so either lookup path yields an identical value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    /// Identity owning the account
    pub external_id: ExternalId,

    /// Derivation index, assigned once at creation and never reused
    pub seed_index: SeedIndex,

    /// Ledger address derived from the master seed and `seed_index`
    pub address: String,

    /// External address for withdrawals
    ///
    /// No flow sets this yet; it is carried so that records written today stay
    /// compatible once withdrawals exist.
    pub withdrawal_address: Option<String>,
}

impl Account {
    /// Create a freshly provisioned account with no withdrawal address
    pub fn new(external_id: impl Into<ExternalId>, seed_index: SeedIndex, address: String) -> Self {
        Account {
            external_id: external_id.into(),
            seed_index,
            address,
            withdrawal_address: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_account_has_no_withdrawal_address() {
        let account = Account::new("u1", 1, "nano_1abc".to_string());

        assert_eq!(account.external_id, "u1");
        assert_eq!(account.seed_index, 1);
        assert_eq!(account.address, "nano_1abc");
        assert!(account.withdrawal_address.is_none());
    }

    #[test]
    fn test_account_serializes_with_camel_case_fields() {
        let account = Account::new("u1", 7, "nano_1abc".to_string());

        let json = serde_json::to_value(&account).unwrap();

        assert_eq!(json["externalId"], "u1");
        assert_eq!(json["seedIndex"], 7);
        assert_eq!(json["address"], "nano_1abc");
        assert!(json["withdrawalAddress"].is_null());
    }
}
