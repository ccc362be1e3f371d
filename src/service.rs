//! Wiring of the registry, orchestrator and pipeline around shared collaborators

use crate::config::ServiceConfig;
use crate::core::{
    AccountLocks, AccountRegistry, CreditNotifier, CreditingPipeline, KeyValueStore, LedgerClient,
    TipOrchestrator,
};
use std::sync::Arc;

/// The services of one tip ledger, sharing one store and one ledger facade
pub struct TipService {
    config: Arc<ServiceConfig>,
    ledger: Arc<dyn LedgerClient>,
    registry: Arc<AccountRegistry>,
    orchestrator: Arc<TipOrchestrator>,

    /// Chain-write locks shared by the orchestrator and every pipeline
    locks: Arc<AccountLocks>,
}

impl TipService {
    pub fn new(
        config: Arc<ServiceConfig>,
        store: Arc<dyn KeyValueStore>,
        ledger: Arc<dyn LedgerClient>,
    ) -> Self {
        let registry = Arc::new(AccountRegistry::new(store));
        let locks = Arc::new(AccountLocks::new());
        let orchestrator = Arc::new(TipOrchestrator::new(
            Arc::clone(&registry),
            Arc::clone(&ledger),
            Arc::clone(&config),
            Arc::clone(&locks),
        ));
        Self {
            config,
            ledger,
            registry,
            orchestrator,
            locks,
        }
    }

    pub fn registry(&self) -> &Arc<AccountRegistry> {
        &self.registry
    }

    pub fn orchestrator(&self) -> &Arc<TipOrchestrator> {
        &self.orchestrator
    }

    /// A crediting pipeline reporting to `notifier`
    pub fn crediting_pipeline(&self, notifier: Arc<dyn CreditNotifier>) -> Arc<CreditingPipeline> {
        Arc::new(CreditingPipeline::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.ledger),
            Arc::clone(&self.config),
            notifier,
            Arc::clone(&self.locks),
        ))
    }
}
