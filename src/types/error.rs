//! Error types for the tip ledger
//!
//! Errors follow the service's failure taxonomy:
//!
//! - **Infrastructure failures**: the store or the ledger facade failed
//!   ([`StoreError`], [`LedgerError`]). These are unexpected and travel to the
//!   caller unchanged inside [`ServiceError`].
//! - **Notification failures**: a downstream callback failed ([`NotifyError`]).
//!   The crediting pipeline contains these per event.
//! - **Input errors**: bad configuration or amounts ([`ConfigError`],
//!   [`AmountError`]), reported before any work starts.
//!
//! An insufficient balance is not an error; it is one of the regular
//! outcomes of a tip (see `TipOutcome`).

use thiserror::Error;

/// Failure of the key-value store backing the account registry
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    /// The storage engine rejected or failed an operation
    #[error("Store backend error: {message}")]
    Backend {
        /// Description of the backend failure
        message: String,
    },

    /// A stored value could not be encoded or decoded
    #[error("Corrupt value under key '{key}': {message}")]
    Corrupt {
        /// Key holding the bad value
        key: String,
        /// Description of the decoding failure
        message: String,
    },
}

impl From<sled::Error> for StoreError {
    fn from(error: sled::Error) -> Self {
        StoreError::Backend {
            message: error.to_string(),
        }
    }
}

impl StoreError {
    /// Create a Corrupt error
    pub fn corrupt(key: &str, message: impl ToString) -> Self {
        StoreError::Corrupt {
            key: key.to_string(),
            message: message.to_string(),
        }
    }
}

/// Failure reported by the ledger network facade
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    /// The call did not complete within the configured timeout
    #[error("Ledger call '{operation}' timed out after {timeout_ms}ms")]
    Timeout {
        /// Facade operation that timed out
        operation: String,
        /// Timeout that elapsed
        timeout_ms: u64,
    },

    /// The node could not be reached
    #[error("Ledger transport error during '{operation}': {message}")]
    Transport {
        operation: String,
        message: String,
    },

    /// The node answered with an error
    #[error("Ledger rejected '{operation}': {message}")]
    Rpc {
        operation: String,
        message: String,
    },

    /// The node answered with something we could not interpret
    #[error("Malformed ledger response to '{operation}': {message}")]
    MalformedResponse {
        operation: String,
        message: String,
    },
}

impl LedgerError {
    /// Create a Timeout error
    pub fn timeout(operation: &str, timeout_ms: u64) -> Self {
        LedgerError::Timeout {
            operation: operation.to_string(),
            timeout_ms,
        }
    }

    /// Create a Transport error
    pub fn transport(operation: &str, message: impl ToString) -> Self {
        LedgerError::Transport {
            operation: operation.to_string(),
            message: message.to_string(),
        }
    }

    /// Create an Rpc error
    pub fn rpc(operation: &str, message: impl ToString) -> Self {
        LedgerError::Rpc {
            operation: operation.to_string(),
            message: message.to_string(),
        }
    }

    /// Create a MalformedResponse error
    pub fn malformed(operation: &str, message: impl ToString) -> Self {
        LedgerError::MalformedResponse {
            operation: operation.to_string(),
            message: message.to_string(),
        }
    }
}

/// Failure of a tip or top-up notification callback
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Notification failed: {message}")]
pub struct NotifyError {
    pub message: String,
}

impl NotifyError {
    pub fn new(message: impl ToString) -> Self {
        NotifyError {
            message: message.to_string(),
        }
    }
}

/// Error returned by registry, orchestrator and pipeline operations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Notify(#[from] NotifyError),
}

/// Invalid service configuration
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// A required setting was not provided
    #[error("Missing configuration: {name}")]
    Missing { name: String },

    /// A setting was provided but is not usable
    #[error("Invalid configuration for {name}: {message}")]
    Invalid { name: String, message: String },
}

impl ConfigError {
    pub fn missing(name: &str) -> Self {
        ConfigError::Missing {
            name: name.to_string(),
        }
    }

    pub fn invalid(name: &str, message: impl ToString) -> Self {
        ConfigError::Invalid {
            name: name.to_string(),
            message: message.to_string(),
        }
    }
}

/// A user-supplied amount that cannot be expressed in raw
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AmountError {
    #[error("Amount '{amount}' is negative")]
    Negative { amount: String },

    #[error("Amount '{amount}' is finer than one raw")]
    TooPrecise { amount: String },

    #[error("Amount '{amount}' exceeds the representable range")]
    Overflow { amount: String },

    #[error("Amount '{amount}' is not a whole number of raw")]
    Unparseable { amount: String },
}
