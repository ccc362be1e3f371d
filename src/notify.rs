//! User-facing credit messages
//!
//! [`LogNotifier`] is the notifier used by `tip-ledger listen`: it looks up
//! the recipient's fresh balance and logs the message a chat front-end would
//! send to that user.

use crate::core::tip_orchestrator::TipOrchestrator;
use crate::core::traits::CreditNotifier;
use crate::types::{Account, Balance, NotifyError};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// Message shown to the recipient of a tip
pub fn tip_message(balance: &Balance) -> String {
    format!(
        "You just received a tip! New balance: {} nyano (Pending: {} nyano)",
        balance.balance.to_nyano(),
        balance.pending.to_nyano()
    )
}

/// Message shown after funds arrived from outside the service
pub fn top_up_message(balance: &Balance) -> String {
    format!(
        "Received top-up to balance! New balance: {} nyano (Pending: {} nyano)",
        balance.balance.to_nyano(),
        balance.pending.to_nyano()
    )
}

/// Full balance report for an account
pub fn balance_message(account: &Account, balance: &Balance) -> String {
    format!(
        "Balance: {} nyano ({} NANO)\nPending: {} nyano ({} NANO)\n\nAddress: {}",
        balance.balance.to_nyano(),
        balance.balance.to_nano(),
        balance.pending.to_nyano(),
        balance.pending.to_nano(),
        account.address
    )
}

/// Notifier that logs the message each recipient would receive
pub struct LogNotifier {
    orchestrator: Arc<TipOrchestrator>,
}

impl LogNotifier {
    pub fn new(orchestrator: Arc<TipOrchestrator>) -> Self {
        Self { orchestrator }
    }

    async fn balance_of(&self, external_id: &str) -> Result<Balance, NotifyError> {
        self.orchestrator
            .get_balance(external_id)
            .await
            .map_err(NotifyError::new)
    }
}

#[async_trait]
impl CreditNotifier for LogNotifier {
    async fn on_tip(&self, from_external_id: &str, to_external_id: &str) -> Result<(), NotifyError> {
        let balance = self.balance_of(to_external_id).await?;
        info!(
            from = from_external_id,
            to = to_external_id,
            message = %tip_message(&balance),
            "Tip received"
        );
        Ok(())
    }

    async fn on_top_up(&self, external_id: &str) -> Result<(), NotifyError> {
        let balance = self.balance_of(external_id).await?;
        info!(
            to = external_id,
            message = %top_up_message(&balance),
            "Top-up received"
        );
        Ok(())
    }
}
