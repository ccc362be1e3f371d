//! Balance-checked transfers between managed accounts
//!
//! A tip moves through these states:
//!
//! ```text
//! Requested -> AccountsResolved -> BalanceChecked -> Submitted
//!                                        \
//!                                         -> Rejected(InsufficientBalance)
//! ```
//!
//! Confirmation of a submitted transfer is observed later, independently, by
//! the crediting pipeline.
//!
//! # Concurrency
//!
//! Reading the balance and submitting the send happen under the source
//! address's [`AccountLocks`] entry, so two concurrent tips from one account
//! cannot both pass the balance check, and a send never races the crediting
//! pipeline pocketing into the same account. Tips from different accounts
//! never wait on each other.

use crate::config::ServiceConfig;
use crate::core::account_locks::AccountLocks;
use crate::core::account_registry::AccountRegistry;
use crate::core::traits::LedgerClient;
use crate::types::{Account, Balance, LedgerError, Raw, SeedIndex, ServiceError, TransactionId};
use std::sync::Arc;
use tracing::{info, warn};

/// Result of a tip that reached the balance check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TipOutcome {
    /// The transfer was submitted to the ledger
    Sent {
        transaction_id: TransactionId,
        /// Public link to the submitted block
        explorer_url: String,
    },

    /// The sender cannot cover the amount; nothing was submitted
    InsufficientBalance { balance: Raw, requested: Raw },
}

/// Entry point for tips and account queries
pub struct TipOrchestrator {
    registry: Arc<AccountRegistry>,
    ledger: Arc<dyn LedgerClient>,
    config: Arc<ServiceConfig>,

    /// Shared with the crediting pipeline; held from balance check to submit
    locks: Arc<AccountLocks>,
}

impl TipOrchestrator {
    pub fn new(
        registry: Arc<AccountRegistry>,
        ledger: Arc<dyn LedgerClient>,
        config: Arc<ServiceConfig>,
        locks: Arc<AccountLocks>,
    ) -> Self {
        Self {
            registry,
            ledger,
            config,
            locks,
        }
    }

    /// Send `amount` raw from `from_id`'s account to `to_id`'s account
    ///
    /// Both accounts are created if needed. Returns
    /// [`TipOutcome::InsufficientBalance`] without touching the ledger
    /// further when the sender's spendable balance is below `amount`.
    ///
    /// # Errors
    ///
    /// Store and ledger failures (including timeouts) are returned unchanged
    /// and are never reported as an insufficient balance.
    pub async fn tip_user(
        &self,
        from_id: &str,
        to_id: &str,
        amount: Raw,
    ) -> Result<TipOutcome, ServiceError> {
        let from = self.get_account(from_id).await?;
        let to = self.get_account(to_id).await?;

        let _guard = self.locks.lock(&from.address).await;

        let balance = self.ledger.get_balance(&from.address).await?;
        if balance.balance < amount {
            warn!(
                from = from_id,
                to = to_id,
                balance = %balance.balance,
                requested = %amount,
                "Tip rejected: insufficient balance"
            );
            return Ok(TipOutcome::InsufficientBalance {
                balance: balance.balance,
                requested: amount,
            });
        }

        let secret_key = self
            .ledger
            .derive_key(&self.config.seed, from.seed_index)
            .await?;
        let transaction_id = self
            .ledger
            .submit_transfer(&secret_key, &to.address, amount)
            .await?;

        info!(
            from = from_id,
            to = to_id,
            amount = %amount,
            transaction_id = %transaction_id,
            "Tip submitted"
        );

        Ok(TipOutcome::Sent {
            explorer_url: self.ledger.explorer_url(&transaction_id),
            transaction_id,
        })
    }

    /// The account of `external_id`, created on first contact
    pub async fn get_account(&self, external_id: &str) -> Result<Account, ServiceError> {
        self.registry
            .get_or_create(external_id, |index| self.derive_address(index))
            .await
    }

    /// Spendable and pending funds of `external_id`
    pub async fn get_balance(&self, external_id: &str) -> Result<Balance, ServiceError> {
        let account = self.get_account(external_id).await?;
        Ok(self.ledger.get_balance(&account.address).await?)
    }

    /// Payment page for depositing into `external_id`'s account
    pub async fn get_link_for_top_up(&self, external_id: &str) -> Result<String, ServiceError> {
        let account = self.get_account(external_id).await?;
        Ok(self.config.top_up_link(&account.address))
    }

    /// Block explorer page of `external_id`'s account
    pub async fn get_link_for_account(&self, external_id: &str) -> Result<String, ServiceError> {
        let account = self.get_account(external_id).await?;
        Ok(self.ledger.account_explorer_url(&account.address))
    }

    async fn derive_address(&self, index: SeedIndex) -> Result<String, LedgerError> {
        let keys = self.ledger.account_keys(&self.config.seed, index).await?;
        Ok(keys.address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MasterSeed;
    use crate::ledger::simulated::{LedgerOperation, SimulatedLedger};
    use crate::store::MemoryStore;
    use std::time::Duration;

    const SEED: &str = "9F1D53E732E48F25F94711D5B22086778278624F715D9B2BEC8FB81134E7C904";

    fn service_with(ledger: SimulatedLedger) -> (Arc<SimulatedLedger>, Arc<TipOrchestrator>) {
        let config = Arc::new(ServiceConfig::new(MasterSeed::parse(SEED).unwrap()));
        let ledger = Arc::new(ledger);
        let registry = Arc::new(AccountRegistry::new(Arc::new(MemoryStore::new())));
        let orchestrator = TipOrchestrator::new(
            registry,
            ledger.clone(),
            config,
            Arc::new(AccountLocks::new()),
        );
        (ledger, Arc::new(orchestrator))
    }

    fn service() -> (Arc<SimulatedLedger>, Arc<TipOrchestrator>) {
        service_with(SimulatedLedger::new())
    }

    async fn funded(
        ledger: &SimulatedLedger,
        orchestrator: &TipOrchestrator,
        id: &str,
        amount: u128,
    ) -> Account {
        let account = orchestrator.get_account(id).await.unwrap();
        ledger.credit(&account.address, Raw(amount));
        account
    }

    #[tokio::test]
    async fn test_tip_with_sufficient_balance_submits_one_transfer() {
        let (ledger, orchestrator) = service();
        let u1 = funded(&ledger, &orchestrator, "u1", 1_000_000).await;

        let outcome = orchestrator
            .tip_user("u1", "u2", Raw(500_000))
            .await
            .unwrap();

        let u2 = orchestrator.get_account("u2").await.unwrap();
        assert_eq!(u2.seed_index, 2);

        let transfers = ledger.transfers();
        assert_eq!(transfers.len(), 1);
        let expected_key = ledger
            .derive_key(&MasterSeed::parse(SEED).unwrap(), u1.seed_index)
            .await
            .unwrap();
        assert_eq!(transfers[0].secret_key, expected_key);
        assert_eq!(transfers[0].to_address, u2.address);
        assert_eq!(transfers[0].amount, Raw(500_000));

        assert_eq!(
            outcome,
            TipOutcome::Sent {
                transaction_id: transfers[0].transaction_id.clone(),
                explorer_url: ledger.explorer_url(&transfers[0].transaction_id),
            }
        );
    }

    #[tokio::test]
    async fn test_tip_of_exact_balance_succeeds() {
        let (ledger, orchestrator) = service();
        funded(&ledger, &orchestrator, "u1", 10).await;

        let outcome = orchestrator.tip_user("u1", "u2", Raw(10)).await.unwrap();

        assert!(matches!(outcome, TipOutcome::Sent { .. }));
    }

    #[tokio::test]
    async fn test_tip_with_insufficient_balance_is_rejected_without_transfer() {
        let (ledger, orchestrator) = service();

        let outcome = orchestrator.tip_user("u3", "u4", Raw(1)).await.unwrap();

        assert_eq!(
            outcome,
            TipOutcome::InsufficientBalance {
                balance: Raw::ZERO,
                requested: Raw(1),
            }
        );
        assert!(ledger.transfers().is_empty());
    }

    #[tokio::test]
    async fn test_pending_funds_do_not_count_as_spendable() {
        let (ledger, orchestrator) = service();
        let u1 = orchestrator.get_account("u1").await.unwrap();
        ledger.deposit_external("nano_outside", &u1.address, Raw(50)).await;

        let outcome = orchestrator.tip_user("u1", "u2", Raw(50)).await.unwrap();

        assert!(matches!(outcome, TipOutcome::InsufficientBalance { .. }));
    }

    #[tokio::test]
    async fn test_balance_query_failure_is_not_a_rejection() {
        let (ledger, orchestrator) = service();
        orchestrator.get_account("u1").await.unwrap();
        orchestrator.get_account("u2").await.unwrap();
        ledger.fail_next(
            LedgerOperation::GetBalance,
            LedgerError::timeout("account_balance", 10_000),
        );

        let result = orchestrator.tip_user("u1", "u2", Raw(1)).await;

        assert_eq!(
            result,
            Err(ServiceError::Ledger(LedgerError::timeout(
                "account_balance",
                10_000
            )))
        );
        assert!(ledger.transfers().is_empty());
    }

    #[tokio::test]
    async fn test_submit_failure_propagates_unchanged() {
        let (ledger, orchestrator) = service();
        funded(&ledger, &orchestrator, "u1", 100).await;
        orchestrator.get_account("u2").await.unwrap();
        ledger.fail_next(
            LedgerOperation::SubmitTransfer,
            LedgerError::rpc("process", "Fork"),
        );

        let result = orchestrator.tip_user("u1", "u2", Raw(1)).await;

        assert_eq!(
            result,
            Err(ServiceError::Ledger(LedgerError::rpc("process", "Fork")))
        );
    }

    #[tokio::test]
    async fn test_key_derivation_failure_during_tip_propagates() {
        let (ledger, orchestrator) = service();
        funded(&ledger, &orchestrator, "u1", 100).await;
        orchestrator.get_account("u2").await.unwrap();
        ledger.fail_next(
            LedgerOperation::DeriveKey,
            LedgerError::timeout("deterministic_key", 10_000),
        );

        let result = orchestrator.tip_user("u1", "u2", Raw(1)).await;

        assert_eq!(
            result,
            Err(ServiceError::Ledger(LedgerError::timeout(
                "deterministic_key",
                10_000
            )))
        );
        assert!(ledger.transfers().is_empty());
    }

    #[tokio::test]
    async fn test_address_lookup_failure_leaves_identity_unregistered() {
        let (ledger, orchestrator) = service();
        ledger.fail_next(
            LedgerOperation::AccountMetadata,
            LedgerError::rpc("key_expand", "Bad private key"),
        );

        let result = orchestrator.tip_user("u1", "u2", Raw(1)).await;

        assert_eq!(
            result,
            Err(ServiceError::Ledger(LedgerError::rpc(
                "key_expand",
                "Bad private key"
            )))
        );
        // Index 1 stays orphaned; the retry gets a fresh one.
        assert_eq!(orchestrator.get_account("u1").await.unwrap().seed_index, 2);
        assert!(ledger.transfers().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_tips_from_one_account_cannot_overdraw() {
        let (ledger, orchestrator) =
            service_with(SimulatedLedger::new().with_latency(Duration::from_millis(20)));
        funded(&ledger, &orchestrator, "u1", 100).await;
        orchestrator.get_account("u2").await.unwrap();
        orchestrator.get_account("u3").await.unwrap();

        let first = {
            let orchestrator = Arc::clone(&orchestrator);
            tokio::spawn(async move { orchestrator.tip_user("u1", "u2", Raw(60)).await })
        };
        let second = {
            let orchestrator = Arc::clone(&orchestrator);
            tokio::spawn(async move { orchestrator.tip_user("u1", "u3", Raw(60)).await })
        };

        let outcomes = vec![
            first.await.unwrap().unwrap(),
            second.await.unwrap().unwrap(),
        ];

        let sent = outcomes
            .iter()
            .filter(|outcome| matches!(outcome, TipOutcome::Sent { .. }))
            .count();
        let rejected = outcomes
            .iter()
            .filter(|outcome| matches!(outcome, TipOutcome::InsufficientBalance { .. }))
            .count();
        assert_eq!((sent, rejected), (1, 1));
        assert_eq!(ledger.transfers().len(), 1);
    }

    #[tokio::test]
    async fn test_account_lock_does_not_block_other_sources() {
        let (ledger, orchestrator) = service();
        let a = funded(&ledger, &orchestrator, "a", 10).await;
        funded(&ledger, &orchestrator, "b", 10).await;

        let _held = orchestrator.locks.lock(&a.address).await;

        let outcome = tokio::time::timeout(
            Duration::from_secs(1),
            orchestrator.tip_user("b", "a", Raw(5)),
        )
        .await
        .expect("tip from another account must not wait on a's lock")
        .unwrap();

        assert!(matches!(outcome, TipOutcome::Sent { .. }));
    }

    #[tokio::test]
    async fn test_get_balance_reports_spendable_and_pending() {
        let (ledger, orchestrator) = service();
        let u1 = funded(&ledger, &orchestrator, "u1", 7).await;
        ledger.deposit_external("nano_outside", &u1.address, Raw(3)).await;

        let balance = orchestrator.get_balance("u1").await.unwrap();

        assert_eq!(
            balance,
            Balance {
                balance: Raw(7),
                pending: Raw(3),
            }
        );
    }

    #[tokio::test]
    async fn test_links_point_at_account_address() {
        let (ledger, orchestrator) = service();
        let u1 = orchestrator.get_account("u1").await.unwrap();

        let top_up = orchestrator.get_link_for_top_up("u1").await.unwrap();
        let explorer = orchestrator.get_link_for_account("u1").await.unwrap();

        assert_eq!(top_up, format!("https://paynano.me/{}", u1.address));
        assert_eq!(explorer, ledger.account_explorer_url(&u1.address));
    }

    #[tokio::test]
    async fn test_queries_create_account_once() {
        let (_, orchestrator) = service();

        let first = orchestrator.get_account("u1").await.unwrap();
        orchestrator.get_balance("u1").await.unwrap();
        orchestrator.get_link_for_top_up("u1").await.unwrap();

        assert_eq!(orchestrator.get_account("u1").await.unwrap(), first);
        assert_eq!(orchestrator.get_account("u2").await.unwrap().seed_index, 2);
    }
}
