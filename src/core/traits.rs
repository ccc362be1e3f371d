//! Core traits for persistence, the ledger facade and notifications
//!
//! The account registry, tip orchestrator and crediting pipeline only talk to
//! the outside world through these traits, so the on-disk store, the node RPC
//! client and the in-process simulations can be used interchangeably.

use crate::config::MasterSeed;
use crate::types::{
    AccountKeys, Balance, ConfirmedBlock, LedgerError, NotifyError, Raw, ReceivedTransfer,
    SecretKey, SeedIndex, StoreError, TransactionId,
};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Generic key-value persistence used by the account registry
///
/// Keys are UTF-8 strings, values opaque bytes. Implementations must make
/// every method atomic with respect to every other method.
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Write all entries in one atomic batch, overwriting existing values
    fn put_all(&self, entries: &[(String, Vec<u8>)]) -> Result<(), StoreError>;

    /// Write all entries atomically, but only if `guard_key` holds no value
    ///
    /// Returns `None` when the entries were written, or the value already
    /// stored under `guard_key` when nothing was written.
    fn insert_if_absent(
        &self,
        guard_key: &str,
        entries: &[(String, Vec<u8>)],
    ) -> Result<Option<Vec<u8>>, StoreError>;

    /// Atomically increment the counter under `key` and return the new value
    ///
    /// A missing counter counts as zero, so the first call returns 1.
    fn increment(&self, key: &str) -> Result<u64, StoreError>;

    /// All entries whose key starts with `prefix`, in key order
    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StoreError>;
}

/// Facade over the ledger network
///
/// Implementations own transport concerns (timeouts, polling, reconnects).
/// Every network-bound method must fail with [`LedgerError::Timeout`] rather
/// than hang when the network does not answer.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Derive the secret key at `index` of the master seed
    async fn derive_key(&self, seed: &MasterSeed, index: SeedIndex)
        -> Result<SecretKey, LedgerError>;

    /// Expand a secret key into its address
    async fn account_metadata(&self, secret_key: &SecretKey) -> Result<AccountKeys, LedgerError>;

    /// Spendable and pending funds of `address`
    async fn get_balance(&self, address: &str) -> Result<Balance, LedgerError>;

    /// Sign and publish a send of `amount` to `to_address`
    async fn submit_transfer(
        &self,
        secret_key: &SecretKey,
        to_address: &str,
        amount: Raw,
    ) -> Result<TransactionId, LedgerError>;

    /// Start streaming confirmed sends
    ///
    /// The stream ends once `shutdown` is cancelled or the facade gives up.
    /// Confirmations may be delivered more than once.
    async fn subscribe_confirmations(
        &self,
        shutdown: CancellationToken,
    ) -> Result<mpsc::Receiver<ConfirmedBlock>, LedgerError>;

    /// Receive every pending transfer of the key's account
    ///
    /// Idempotent: transfers already received are skipped, so calling this
    /// again with nothing pending returns an empty list.
    async fn pocket_pending(
        &self,
        secret_key: &SecretKey,
    ) -> Result<Vec<ReceivedTransfer>, LedgerError>;

    /// Public block explorer link for a transaction
    fn explorer_url(&self, transaction_id: &str) -> String;

    /// Public block explorer link for an account
    fn account_explorer_url(&self, address: &str) -> String;

    /// Derive the key at `index` and expand it to its address
    async fn account_keys(
        &self,
        seed: &MasterSeed,
        index: SeedIndex,
    ) -> Result<AccountKeys, LedgerError> {
        let secret_key = self.derive_key(seed, index).await?;
        self.account_metadata(&secret_key).await
    }
}

/// Receiver of credited-balance events raised by the crediting pipeline
#[async_trait]
pub trait CreditNotifier: Send + Sync {
    /// A managed account received a tip from another managed account
    async fn on_tip(&self, from_external_id: &str, to_external_id: &str)
        -> Result<(), NotifyError>;

    /// A managed account received funds from an outside address
    async fn on_top_up(&self, external_id: &str) -> Result<(), NotifyError>;
}
