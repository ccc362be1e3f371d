//! Service configuration
//!
//! Configuration is built once at startup (see [`crate::cli::CliArgs`]) and
//! shared read-only through an `Arc`. Nothing in the crate reads settings from
//! the environment on its own.

use crate::types::ConfigError;
use rand::RngCore;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_DB_PATH: &str = "tip-ledger.db";
pub const DEFAULT_RPC_URL: &str = "http://127.0.0.1:7076";
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_EXPLORER_URL: &str = "https://nanolooker.com";
pub const DEFAULT_TOP_UP_URL: &str = "https://paynano.me";

/// Length of a seed in bytes
const SEED_BYTES: usize = 32;

/// Service-wide master seed all account keys are derived from
///
/// The seed never appears in `Debug` output, logs or the store.
#[derive(Clone, PartialEq, Eq)]
pub struct MasterSeed(String);

impl MasterSeed {
    /// Parse a 64 character hex seed
    pub fn parse(hex_seed: &str) -> Result<Self, ConfigError> {
        let trimmed = hex_seed.trim();
        let bytes = hex::decode(trimmed).map_err(|e| ConfigError::invalid("seed", e))?;
        if bytes.len() != SEED_BYTES {
            return Err(ConfigError::invalid(
                "seed",
                format!("expected {} bytes, got {}", SEED_BYTES, bytes.len()),
            ));
        }
        Ok(MasterSeed(trimmed.to_uppercase()))
    }

    /// Generate a fresh random seed
    pub fn generate() -> Self {
        let mut bytes = [0u8; SEED_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        MasterSeed(hex::encode_upper(bytes))
    }

    /// Hex encoding of the seed, for key derivation only
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for MasterSeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterSeed(<redacted>)")
    }
}

/// Validated settings of a running service
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub seed: MasterSeed,

    /// Directory of the sled database holding the account registry
    pub db_path: PathBuf,

    /// Node RPC endpoint
    pub rpc_url: String,

    /// Upper bound on every ledger RPC call
    pub rpc_timeout: Duration,

    /// Interval between two polls of the node's confirmation history
    pub poll_interval: Duration,

    /// Block explorer base, e.g. `https://nanolooker.com`
    pub explorer_url: String,

    /// Payment page base used for top-up links
    pub top_up_url: String,

    /// Representative assigned when a receive opens an account
    ///
    /// When unset, accounts represent themselves.
    pub representative: Option<String>,
}

impl ServiceConfig {
    /// Configuration with every optional setting at its default
    pub fn new(seed: MasterSeed) -> Self {
        ServiceConfig {
            seed,
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            rpc_url: DEFAULT_RPC_URL.to_string(),
            rpc_timeout: DEFAULT_RPC_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            explorer_url: DEFAULT_EXPLORER_URL.to_string(),
            top_up_url: DEFAULT_TOP_UP_URL.to_string(),
            representative: None,
        }
    }

    /// Payment page for topping up `address`
    pub fn top_up_link(&self, address: &str) -> String {
        format!("{}/{}", self.top_up_url.trim_end_matches('/'), address)
    }
}
