//! Tip Ledger Library
//! # Overview
//!
//! This library implements a custodial tipping service on top of a block-lattice
//! ledger. Every chat identity gets its own ledger account, derived from one
//! service-wide master seed; users tip each other by name and the service signs
//! the transfers on their behalf.
//!
//! # Architecture
//!
//! The system is organized into several key components:
//!
//! - [`types`] - Core data types (Account, Raw, Balance, errors)
//! - [`config`] - Master seed and service settings
//! - [`cli`] - CLI arguments parsing
//! - [`core`] - Business logic components:
//!   - [`core::account_locks`] - Per-address serialization of chain writes
//!   - [`core::account_registry`] - Identity to account mapping and seed index allocation
//!   - [`core::tip_orchestrator`] - Balance-checked transfers and account queries
//!   - [`core::crediting_pipeline`] - Pocketing and notification of confirmed transfers
//! - [`store`] - Key-value stores backing the registry (in-memory and sled)
//! - [`ledger`] - Ledger facades (node RPC and in-process simulation)
//! - [`notify`] - User-facing credit messages
//! - [`io`] - CSV export of the registry
//!
//! # Funds Flow
//!
//! - **Tip**: a transfer between two managed accounts, submitted by the orchestrator
//! - **Top-up**: a transfer into a managed account from an outside address
//! - **Pocketing**: receiving confirmed pending transfers so they become spendable
//!
//! Tips and top-ups both become spendable only after the crediting pipeline has
//! pocketed them.
//!
//! # Account Records
//!
//! Each account maintains:
//! - `external_id`: The chat identity owning the account
//! - `seed_index`: Position of the account's key under the master seed
//! - `address`: Ledger address controlled by that key
//! - `withdrawal_address`: Optional personal address for withdrawals

// Module declarations
pub mod cli;
pub mod config;
pub mod core;
pub mod io;
pub mod ledger;
pub mod notify;
pub mod service;
pub mod store;
pub mod types;

pub use config::{MasterSeed, ServiceConfig};
pub use core::{AccountRegistry, CreditOutcome, CreditingPipeline, TipOrchestrator, TipOutcome};
pub use io::write_accounts_csv;
pub use service::TipService;
pub use types::{Account, Balance, LedgerError, Raw, ServiceError, StoreError};
