//! Ledger facade implementations
//!
//! - `rpc` - Talks to a Nano node over its JSON RPC
//! - `simulated` - Deterministic in-process ledger for tests and dry runs

pub mod rpc;
pub mod simulated;

pub use rpc::NanoRpcClient;
pub use simulated::{LedgerOperation, SimulatedLedger, SubmittedTransfer};
