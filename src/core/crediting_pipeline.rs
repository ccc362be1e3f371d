//! Crediting of confirmed incoming transfers
//!
//! The pipeline subscribes to the ledger facade's confirmation stream and,
//! for every confirmed send into a managed account, pockets the account's
//! pending funds and raises a tip or top-up notification.
//!
//! # Failure isolation
//!
//! An error (or panic) while handling one confirmation is logged with the
//! block's identifying data and the loop moves on to the next confirmation.
//! Only a failure to subscribe at all ends [`CreditingPipeline::run`] with an
//! error.
//!
//! # Concurrency
//!
//! Pocketing writes to the receiver's chain, so it runs under the receiver's
//! [`AccountLocks`] entry, the same lock a tip from that account holds.
//!
//! # Delivery semantics
//!
//! Confirmations may arrive more than once. The pipeline does not deduplicate;
//! pocketing is idempotent at the ledger, so a replay credits nothing twice.
//! A replay can still raise a second notification.

use crate::config::ServiceConfig;
use crate::core::account_locks::AccountLocks;
use crate::core::account_registry::AccountRegistry;
use crate::core::traits::{CreditNotifier, LedgerClient};
use crate::types::{ConfirmedBlock, ExternalId, ReceivedTransfer, ServiceError};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// What handling a single confirmation did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreditOutcome {
    /// The destination is not a managed account
    Ignored,

    /// Funds from another managed account were pocketed
    Tip {
        from: ExternalId,
        to: ExternalId,
        received: Vec<ReceivedTransfer>,
    },

    /// Funds from an outside address were pocketed
    TopUp {
        to: ExternalId,
        received: Vec<ReceivedTransfer>,
    },
}

/// Long-running listener crediting confirmed transfers
pub struct CreditingPipeline {
    registry: Arc<AccountRegistry>,
    ledger: Arc<dyn LedgerClient>,
    config: Arc<ServiceConfig>,
    notifier: Arc<dyn CreditNotifier>,
    locks: Arc<AccountLocks>,
}

impl CreditingPipeline {
    pub fn new(
        registry: Arc<AccountRegistry>,
        ledger: Arc<dyn LedgerClient>,
        config: Arc<ServiceConfig>,
        notifier: Arc<dyn CreditNotifier>,
        locks: Arc<AccountLocks>,
    ) -> Self {
        Self {
            registry,
            ledger,
            config,
            notifier,
            locks,
        }
    }

    /// Run on a background task until `shutdown` is cancelled
    pub fn spawn(
        self: Arc<Self>,
        shutdown: CancellationToken,
    ) -> JoinHandle<Result<(), ServiceError>> {
        tokio::spawn(async move { self.run(shutdown).await })
    }

    /// Process confirmations until `shutdown` is cancelled or the stream ends
    ///
    /// # Errors
    ///
    /// Returns an error only if the subscription cannot be established.
    /// Failures while handling individual confirmations are logged and
    /// skipped.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<(), ServiceError> {
        let mut confirmations = self
            .ledger
            .subscribe_confirmations(shutdown.clone())
            .await?;
        info!("Crediting pipeline listening for confirmations");

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("Crediting pipeline shutting down");
                    break;
                }
                next = confirmations.recv() => match next {
                    Some(block) => self.process(&block).await,
                    None => {
                        warn!("Confirmation stream closed; crediting pipeline stopping");
                        break;
                    }
                },
            }
        }

        Ok(())
    }

    async fn process(&self, block: &ConfirmedBlock) {
        let handled = AssertUnwindSafe(self.handle_confirmation(block))
            .catch_unwind()
            .await;

        match handled {
            Ok(Ok(CreditOutcome::Ignored)) => {}
            Ok(Ok(outcome)) => debug!(?outcome, "Confirmation credited"),
            Ok(Err(e)) => error!(
                transaction_id = %block.transaction_id,
                source = %block.source_address,
                destination = %block.destination_address,
                amount = %block.amount,
                error = %e,
                "Failed to credit confirmation"
            ),
            Err(_) => error!(
                transaction_id = %block.transaction_id,
                source = %block.source_address,
                destination = %block.destination_address,
                amount = %block.amount,
                "Panicked while crediting confirmation"
            ),
        }
    }

    /// Credit a single confirmed block
    ///
    /// Resolves the destination (and source) against the registry, pockets
    /// the receiver's pending funds and notifies. Never creates accounts.
    pub async fn handle_confirmation(
        &self,
        block: &ConfirmedBlock,
    ) -> Result<CreditOutcome, ServiceError> {
        let Some(receiver) = self.registry.find_by_address(&block.destination_address)? else {
            debug!(
                transaction_id = %block.transaction_id,
                destination = %block.destination_address,
                "Ignoring confirmation for unmanaged address"
            );
            return Ok(CreditOutcome::Ignored);
        };
        let sender = self.registry.find_by_address(&block.source_address)?;

        let received = {
            let _guard = self.locks.lock(&receiver.address).await;
            let secret_key = self
                .ledger
                .derive_key(&self.config.seed, receiver.seed_index)
                .await?;
            self.ledger.pocket_pending(&secret_key).await?
        };
        info!(
            transaction_id = %block.transaction_id,
            receiver = %receiver.external_id,
            pocketed = received.len(),
            "Pocketed pending transfers"
        );

        match sender {
            Some(sender) => {
                self.notifier
                    .on_tip(&sender.external_id, &receiver.external_id)
                    .await?;
                Ok(CreditOutcome::Tip {
                    from: sender.external_id,
                    to: receiver.external_id,
                    received,
                })
            }
            None => {
                self.notifier.on_top_up(&receiver.external_id).await?;
                Ok(CreditOutcome::TopUp {
                    to: receiver.external_id,
                    received,
                })
            }
        }
    }
}
