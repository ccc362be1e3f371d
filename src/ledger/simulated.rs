//! In-process ledger
//!
//! `SimulatedLedger` behaves like a node for the purposes of the service:
//! keys are derived deterministically from the seed, sends land in the
//! recipient's receivable queue and are announced on the confirmation stream,
//! and pocketing moves receivable funds into the spendable balance exactly
//! once. It backs the test-suite and the CLI's `--simulate` mode.
//!
//! Failures can be injected per operation with [`SimulatedLedger::fail_next`].
//! Like a node, it rejects a block as a fork when a second write to one
//! account's chain starts before the first has finished.

use crate::config::{MasterSeed, DEFAULT_EXPLORER_URL};
use crate::core::traits::LedgerClient;
use crate::types::{
    AccountKeys, Balance, ConfirmedBlock, LedgerError, Raw, ReceivedTransfer, SecretKey,
    SeedIndex, TransactionId,
};
use async_trait::async_trait;
use futures::future::join_all;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Capacity of each confirmation subscription
const SUBSCRIPTION_BUFFER: usize = 256;

/// Facade operations that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LedgerOperation {
    DeriveKey,
    AccountMetadata,
    GetBalance,
    SubmitTransfer,
    SubscribeConfirmations,
    PocketPending,
}

/// A send accepted by the simulated ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedTransfer {
    pub secret_key: SecretKey,
    pub from_address: String,
    pub to_address: String,
    pub amount: Raw,
    pub transaction_id: TransactionId,
}

#[derive(Debug, Clone)]
struct PendingSend {
    transaction_id: TransactionId,
    amount: Raw,
}

#[derive(Debug, Default)]
struct LedgerState {
    balances: HashMap<String, Raw>,
    receivable: HashMap<String, Vec<PendingSend>>,
    transfers: Vec<SubmittedTransfer>,
    pocket_calls: Vec<String>,
    failures: HashMap<LedgerOperation, VecDeque<LedgerError>>,
    subscribers: Vec<(mpsc::Sender<ConfirmedBlock>, CancellationToken)>,
    blocks: u64,
    /// Addresses with a chain write in flight
    writing: HashSet<String>,
}

impl LedgerState {
    fn take_failure(&mut self, operation: LedgerOperation) -> Result<(), LedgerError> {
        match self
            .failures
            .get_mut(&operation)
            .and_then(|queue| queue.pop_front())
        {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn next_block_hash(&mut self) -> TransactionId {
        self.blocks += 1;
        format!("{:064X}", self.blocks)
    }
}

/// Deterministic in-memory stand-in for a ledger node
#[derive(Debug)]
pub struct SimulatedLedger {
    explorer_url: String,
    latency: Duration,
    state: Mutex<LedgerState>,
}

impl Default for SimulatedLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedLedger {
    pub fn new() -> Self {
        Self {
            explorer_url: DEFAULT_EXPLORER_URL.to_string(),
            latency: Duration::ZERO,
            state: Mutex::new(LedgerState::default()),
        }
    }

    /// Use `explorer_url` as the base of explorer links
    pub fn with_explorer_url(mut self, explorer_url: impl Into<String>) -> Self {
        self.explorer_url = explorer_url.into();
        self
    }

    /// Delay key derivation, balance queries and chain writes, to widen race windows
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Set the spendable balance of `address` directly
    pub fn credit(&self, address: &str, amount: Raw) {
        self.lock().balances.insert(address.to_string(), amount);
    }

    /// Simulate a send from an address outside the service
    ///
    /// The funds become receivable for `to_address` and a confirmation is
    /// published to every subscriber.
    pub async fn deposit_external(
        &self,
        from_address: &str,
        to_address: &str,
        amount: Raw,
    ) -> TransactionId {
        let transaction_id = {
            let mut state = self.lock();
            let transaction_id = state.next_block_hash();
            state
                .receivable
                .entry(to_address.to_string())
                .or_default()
                .push(PendingSend {
                    transaction_id: transaction_id.clone(),
                    amount,
                });
            transaction_id
        };

        self.publish(ConfirmedBlock {
            source_address: from_address.to_string(),
            destination_address: to_address.to_string(),
            transaction_id: transaction_id.clone(),
            amount,
        })
        .await;
        transaction_id
    }

    /// Deliver `block` to every live subscriber, including replays
    pub async fn publish(&self, block: ConfirmedBlock) {
        let senders: Vec<mpsc::Sender<ConfirmedBlock>> = {
            let mut state = self.lock();
            state
                .subscribers
                .retain(|(sender, shutdown)| !sender.is_closed() && !shutdown.is_cancelled());
            state
                .subscribers
                .iter()
                .map(|(sender, _)| sender.clone())
                .collect()
        };

        join_all(senders.iter().map(|sender| sender.send(block.clone()))).await;
    }

    /// Make the next call of `operation` fail with `error`
    pub fn fail_next(&self, operation: LedgerOperation, error: LedgerError) {
        self.lock()
            .failures
            .entry(operation)
            .or_default()
            .push_back(error);
    }

    /// Every send accepted so far, oldest first
    pub fn transfers(&self) -> Vec<SubmittedTransfer> {
        self.lock().transfers.clone()
    }

    /// Addresses passed to `pocket_pending`, in call order
    pub fn pocket_calls(&self) -> Vec<String> {
        self.lock().pocket_calls.clone()
    }

    /// Current balance of `address` without going through the facade
    pub fn balance_of(&self, address: &str) -> Balance {
        let state = self.lock();
        Balance {
            balance: state.balances.get(address).copied().unwrap_or_default(),
            pending: Raw(
                state
                    .receivable
                    .get(address)
                    .map(|sends| sends.iter().map(|send| send.amount.0).sum())
                    .unwrap_or(0),
            ),
        }
    }

    /// Number of open confirmation subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.lock()
            .subscribers
            .iter()
            .filter(|(sender, shutdown)| !sender.is_closed() && !shutdown.is_cancelled())
            .count()
    }

    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        // State stays consistent across a panicking test thread.
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn delay(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    /// Occupy `address`'s chain for one latency period
    ///
    /// Fails with a fork if another write to the same chain is in flight.
    async fn write_chain(&self, address: &str) -> Result<(), LedgerError> {
        if !self.lock().writing.insert(address.to_string()) {
            return Err(LedgerError::rpc("process", "Fork"));
        }
        self.delay().await;
        self.lock().writing.remove(address);
        Ok(())
    }

    fn address_of(secret_key: &SecretKey) -> String {
        let digest = Sha256::digest(secret_key.expose().as_bytes());
        format!("nano_sim_{}", &hex::encode(digest)[..40])
    }
}

#[async_trait]
impl LedgerClient for SimulatedLedger {
    async fn derive_key(
        &self,
        seed: &MasterSeed,
        index: SeedIndex,
    ) -> Result<SecretKey, LedgerError> {
        self.delay().await;
        self.lock().take_failure(LedgerOperation::DeriveKey)?;

        let mut hasher = Sha256::new();
        hasher.update(seed.expose().as_bytes());
        hasher.update(index.to_be_bytes());
        Ok(SecretKey::new(hex::encode_upper(hasher.finalize())))
    }

    async fn account_metadata(&self, secret_key: &SecretKey) -> Result<AccountKeys, LedgerError> {
        self.lock().take_failure(LedgerOperation::AccountMetadata)?;
        Ok(AccountKeys {
            secret_key: secret_key.clone(),
            address: Self::address_of(secret_key),
        })
    }

    async fn get_balance(&self, address: &str) -> Result<Balance, LedgerError> {
        self.delay().await;
        self.lock().take_failure(LedgerOperation::GetBalance)?;
        Ok(self.balance_of(address))
    }

    async fn submit_transfer(
        &self,
        secret_key: &SecretKey,
        to_address: &str,
        amount: Raw,
    ) -> Result<TransactionId, LedgerError> {
        let from_address = Self::address_of(secret_key);
        self.lock().take_failure(LedgerOperation::SubmitTransfer)?;
        self.write_chain(&from_address).await?;
        let transaction_id = {
            let mut state = self.lock();

            let available = state.balances.get(&from_address).copied().unwrap_or_default();
            let remaining = available
                .checked_sub(amount)
                .ok_or_else(|| LedgerError::rpc("process", "Insufficient balance"))?;
            state.balances.insert(from_address.clone(), remaining);

            let transaction_id = state.next_block_hash();
            state
                .receivable
                .entry(to_address.to_string())
                .or_default()
                .push(PendingSend {
                    transaction_id: transaction_id.clone(),
                    amount,
                });
            state.transfers.push(SubmittedTransfer {
                secret_key: secret_key.clone(),
                from_address: from_address.clone(),
                to_address: to_address.to_string(),
                amount,
                transaction_id: transaction_id.clone(),
            });
            transaction_id
        };

        self.publish(ConfirmedBlock {
            source_address: from_address,
            destination_address: to_address.to_string(),
            transaction_id: transaction_id.clone(),
            amount,
        })
        .await;
        Ok(transaction_id)
    }

    async fn subscribe_confirmations(
        &self,
        shutdown: CancellationToken,
    ) -> Result<mpsc::Receiver<ConfirmedBlock>, LedgerError> {
        let mut state = self.lock();
        state.take_failure(LedgerOperation::SubscribeConfirmations)?;
        let (sender, receiver) = mpsc::channel(SUBSCRIPTION_BUFFER);
        state.subscribers.push((sender, shutdown));
        Ok(receiver)
    }

    async fn pocket_pending(
        &self,
        secret_key: &SecretKey,
    ) -> Result<Vec<ReceivedTransfer>, LedgerError> {
        let address = Self::address_of(secret_key);
        self.lock().take_failure(LedgerOperation::PocketPending)?;
        self.write_chain(&address).await?;
        let mut state = self.lock();
        state.pocket_calls.push(address.clone());

        let pending = state.receivable.remove(&address).unwrap_or_default();
        let mut balance = state.balances.get(&address).copied().unwrap_or_default();
        let mut received = Vec::with_capacity(pending.len());
        for send in pending {
            balance = balance
                .checked_add(send.amount)
                .ok_or_else(|| LedgerError::rpc("process", "Balance overflow"))?;
            received.push(ReceivedTransfer {
                source_transaction_id: send.transaction_id,
                amount: send.amount,
            });
        }
        state.balances.insert(address, balance);
        Ok(received)
    }

    fn explorer_url(&self, transaction_id: &str) -> String {
        format!("{}/block/{}", self.explorer_url.trim_end_matches('/'), transaction_id)
    }

    fn account_explorer_url(&self, address: &str) -> String {
        format!("{}/account/{}", self.explorer_url.trim_end_matches('/'), address)
    }
}
