//! Types module
//!
//! Contains core data structures used throughout the application.
//! This module organizes types into logical submodules:
//! - `account`: The persisted account record
//! - `amount`: Raw amounts and unit conversions
//! - `ledger`: Keys, balances and blocks exchanged with the ledger facade
//! - `error`: Error types for the tip ledger

pub mod account;
pub mod amount;
pub mod error;
pub mod ledger;

pub use account::{Account, ExternalId, SeedIndex};
pub use amount::{Raw, RAW_PER_NANO, RAW_PER_NYANO};
pub use error::{AmountError, ConfigError, LedgerError, NotifyError, ServiceError, StoreError};
pub use ledger::{AccountKeys, Balance, ConfirmedBlock, ReceivedTransfer, SecretKey, TransactionId};
