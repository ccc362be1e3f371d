//! Core business logic module
//!
//! This module contains the custodial ledger components:
//! - `traits` - Seams to the store, the ledger facade and notifiers
//! - `account_locks` - Per-address serialization of chain writes
//! - `account_registry` - Identity to account mapping and seed index allocation
//! - `tip_orchestrator` - Balance-checked transfers and account queries
//! - `crediting_pipeline` - Crediting of confirmed incoming transfers

pub mod account_locks;
pub mod account_registry;
pub mod crediting_pipeline;
pub mod tip_orchestrator;
pub mod traits;

pub use account_locks::AccountLocks;
pub use account_registry::AccountRegistry;
pub use crediting_pipeline::{CreditOutcome, CreditingPipeline};
pub use tip_orchestrator::{TipOrchestrator, TipOutcome};
pub use traits::{CreditNotifier, KeyValueStore, LedgerClient};
