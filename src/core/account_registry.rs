//! Identity-to-account registry
//!
//! The registry owns the mapping between external identities, seed indices
//! and ledger addresses. Every account is stored twice, once under its
//! identity key and once under its address key:
//!
//! ```text
//! identity:{externalId} -> Account (JSON)
//! address:{address}     -> Account (JSON)
//! lastSeedIndex         -> u64 counter
//! ```
//!
//! # Account creation under contention
//!
//! `get_or_create` commits a new account with the store's insert-if-absent
//! primitive guarded on the identity key. When two first-contact calls for the
//! same identity race, both may allocate an index and derive an address, but
//! only one commits. The other discards its index and returns the committed
//! account. Discarded indices leave gaps in the sequence; uniqueness, not
//! density, is the invariant.

use crate::core::traits::KeyValueStore;
use crate::types::{Account, LedgerError, SeedIndex, ServiceError, StoreError};
use std::future::Future;
use std::sync::Arc;
use tracing::{info, warn};

/// Key of the seed index allocation counter
pub const LAST_SEED_INDEX_KEY: &str = "lastSeedIndex";

const IDENTITY_PREFIX: &str = "identity:";
const ADDRESS_PREFIX: &str = "address:";

fn identity_key(external_id: &str) -> String {
    format!("{}{}", IDENTITY_PREFIX, external_id)
}

fn address_key(address: &str) -> String {
    format!("{}{}", ADDRESS_PREFIX, address)
}

/// Registry of custodial accounts
///
/// Cheap to share: wrap it in an `Arc` and hand it to both the tip
/// orchestrator and the crediting pipeline.
pub struct AccountRegistry {
    store: Arc<dyn KeyValueStore>,
}

impl AccountRegistry {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Look up the account owned by `external_id`
    pub fn find_by_external_id(&self, external_id: &str) -> Result<Option<Account>, StoreError> {
        self.load(&identity_key(external_id))
    }

    /// Look up the account controlling `address`
    pub fn find_by_address(&self, address: &str) -> Result<Option<Account>, StoreError> {
        self.load(&address_key(address))
    }

    /// Reserve the next unused seed index
    ///
    /// Linearizable: concurrent callers never observe the same value. The
    /// first index handed out is 1.
    pub fn allocate_seed_index(&self) -> Result<SeedIndex, StoreError> {
        self.store.increment(LAST_SEED_INDEX_KEY)
    }

    /// Write both index entries of `account`
    ///
    /// This is an upsert. It never detects or rejects duplicates; use
    /// [`get_or_create`](Self::get_or_create) to provision accounts.
    pub fn persist(&self, account: &Account) -> Result<(), StoreError> {
        self.store.put_all(&Self::entries(account)?)
    }

    /// Return the account of `external_id`, provisioning it on first contact
    ///
    /// On first contact this allocates a seed index, asks `derive_address`
    /// for the address at that index and commits both index entries
    /// atomically. If a concurrent call committed first, its account is
    /// returned and the index allocated here is left unused.
    ///
    /// # Errors
    ///
    /// Store failures and derivation failures are returned unchanged. A
    /// failed derivation leaves the allocated index unused.
    pub async fn get_or_create<F, Fut>(
        &self,
        external_id: &str,
        derive_address: F,
    ) -> Result<Account, ServiceError>
    where
        F: FnOnce(SeedIndex) -> Fut,
        Fut: Future<Output = Result<String, LedgerError>>,
    {
        if let Some(account) = self.find_by_external_id(external_id)? {
            return Ok(account);
        }

        let seed_index = self.allocate_seed_index()?;
        let address = derive_address(seed_index).await?;
        let account = Account::new(external_id, seed_index, address);

        let guard = identity_key(external_id);
        match self.store.insert_if_absent(&guard, &Self::entries(&account)?)? {
            None => {
                info!(
                    external_id,
                    seed_index,
                    address = %account.address,
                    "Created account"
                );
                Ok(account)
            }
            Some(committed) => {
                warn!(
                    external_id,
                    orphaned_seed_index = seed_index,
                    "Account was created concurrently; discarding allocated seed index"
                );
                Ok(Self::decode(&guard, &committed)?)
            }
        }
    }

    /// Every account, ordered by seed index
    pub fn all_accounts(&self) -> Result<Vec<Account>, StoreError> {
        let mut accounts = self
            .store
            .scan_prefix(IDENTITY_PREFIX)?
            .into_iter()
            .map(|(key, value)| Self::decode(&key, &value))
            .collect::<Result<Vec<Account>, StoreError>>()?;
        accounts.sort_by_key(|account| account.seed_index);
        Ok(accounts)
    }

    fn load(&self, key: &str) -> Result<Option<Account>, StoreError> {
        self.store
            .get(key)?
            .map(|bytes| Self::decode(key, &bytes))
            .transpose()
    }

    fn entries(account: &Account) -> Result<Vec<(String, Vec<u8>)>, StoreError> {
        let identity = identity_key(&account.external_id);
        let payload = serde_json::to_vec(account).map_err(|e| StoreError::corrupt(&identity, e))?;
        Ok(vec![
            (identity, payload.clone()),
            (address_key(&account.address), payload),
        ])
    }

    fn decode(key: &str, bytes: &[u8]) -> Result<Account, StoreError> {
        serde_json::from_slice(bytes).map_err(|e| StoreError::corrupt(key, e))
    }
}
