use crate::config::{MasterSeed, ServiceConfig, DEFAULT_POLL_INTERVAL, DEFAULT_RPC_TIMEOUT};
use crate::types::{ConfigError, Raw};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable holding the master seed
pub const SEED_ENV: &str = "TIP_LEDGER_SEED";

/// Custodial tip ledger for chat communities
#[derive(Parser, Debug)]
#[command(name = "tip-ledger")]
#[command(about = "Custodial tip ledger for chat communities", long_about = None)]
pub struct CliArgs {
    /// Master seed all account keys are derived from (64 hex characters)
    #[arg(
        long = "seed",
        env = SEED_ENV,
        hide_env_values = true,
        global = true,
        value_name = "HEX"
    )]
    pub seed: Option<String>,

    /// Directory of the account registry database
    #[arg(
        long = "db",
        env = "TIP_LEDGER_DB",
        global = true,
        value_name = "PATH",
        default_value = crate::config::DEFAULT_DB_PATH
    )]
    pub db_path: PathBuf,

    /// Node RPC endpoint
    #[arg(
        long = "rpc-url",
        env = "TIP_LEDGER_RPC_URL",
        global = true,
        value_name = "URL",
        default_value = crate::config::DEFAULT_RPC_URL
    )]
    pub rpc_url: String,

    /// Timeout for every node RPC call
    #[arg(
        long = "rpc-timeout-secs",
        env = "TIP_LEDGER_RPC_TIMEOUT_SECS",
        global = true,
        value_name = "SECONDS",
        help = "Timeout for every node RPC call (default: 10)"
    )]
    pub rpc_timeout_secs: Option<u64>,

    /// Interval between confirmation polls while listening
    #[arg(
        long = "poll-interval-ms",
        env = "TIP_LEDGER_POLL_INTERVAL_MS",
        global = true,
        value_name = "MILLISECONDS",
        help = "Interval between confirmation polls while listening (default: 1000)"
    )]
    pub poll_interval_ms: Option<u64>,

    /// Block explorer base URL
    #[arg(
        long = "explorer-url",
        env = "TIP_LEDGER_EXPLORER_URL",
        global = true,
        value_name = "URL",
        default_value = crate::config::DEFAULT_EXPLORER_URL
    )]
    pub explorer_url: String,

    /// Payment page base URL for top-up links
    #[arg(
        long = "top-up-url",
        env = "TIP_LEDGER_TOP_UP_URL",
        global = true,
        value_name = "URL",
        default_value = crate::config::DEFAULT_TOP_UP_URL
    )]
    pub top_up_url: String,

    /// Representative assigned when an account is opened
    #[arg(
        long = "representative",
        env = "TIP_LEDGER_REPRESENTATIVE",
        global = true,
        value_name = "ADDRESS"
    )]
    pub representative: Option<String>,

    /// Run against an in-process simulated ledger and an in-memory registry
    /// instead of a node and the database. Nothing survives the process, so
    /// every account starts out unfunded and a `tip` is always refused for
    /// insufficient balance.
    #[arg(long = "simulate", global = true)]
    pub simulate: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Operations exposed by the binary
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Print a freshly generated master seed
    GenerateSeed,

    /// Tip another user
    Tip {
        /// Sender's external identity
        #[arg(long)]
        from: String,

        /// Recipient's external identity
        #[arg(long)]
        to: String,

        /// Amount in nyano
        #[arg(long, default_value = "10")]
        amount: Decimal,
    },

    /// Show a user's balance
    Balance {
        #[arg(long)]
        user: String,
    },

    /// Print the payment link for topping up a user's account
    TopUpLink {
        #[arg(long)]
        user: String,
    },

    /// Print the block explorer link of a user's account
    AccountLink {
        #[arg(long)]
        user: String,
    },

    /// Credit confirmed transfers until interrupted
    Listen,

    /// Write every account as CSV to stdout
    ExportAccounts,
}

impl CliArgs {
    /// Build the service configuration from CLI arguments
    ///
    /// Validates the seed and falls back to defaults for unusable optional
    /// values, printing a warning to stderr for each fallback.
    ///
    /// # Returns
    ///
    /// * `Ok(ServiceConfig)` ready to share with the services
    /// * `Err(ConfigError)` if the seed is missing or malformed
    pub fn to_service_config(&self) -> Result<ServiceConfig, ConfigError> {
        let seed = self
            .seed
            .as_deref()
            .ok_or_else(|| ConfigError::missing(SEED_ENV))
            .and_then(MasterSeed::parse)?;

        let rpc_timeout = match self.rpc_timeout_secs {
            Some(0) => {
                eprintln!(
                    "Warning: Invalid rpc_timeout_secs (0), using default ({})",
                    DEFAULT_RPC_TIMEOUT.as_secs()
                );
                DEFAULT_RPC_TIMEOUT
            }
            Some(secs) => Duration::from_secs(secs),
            None => DEFAULT_RPC_TIMEOUT,
        };

        let poll_interval = match self.poll_interval_ms {
            Some(0) => {
                eprintln!(
                    "Warning: Invalid poll_interval_ms (0), using default ({})",
                    DEFAULT_POLL_INTERVAL.as_millis()
                );
                DEFAULT_POLL_INTERVAL
            }
            Some(ms) => Duration::from_millis(ms),
            None => DEFAULT_POLL_INTERVAL,
        };

        Ok(ServiceConfig {
            seed,
            db_path: self.db_path.clone(),
            rpc_url: self.rpc_url.clone(),
            rpc_timeout,
            poll_interval,
            explorer_url: self.explorer_url.clone(),
            top_up_url: self.top_up_url.clone(),
            representative: self.representative.clone(),
        })
    }
}

/// Check a tip request from the command line and convert its amount to raw
///
/// # Arguments
///
/// * `from` - Sender's external identity
/// * `to` - Recipient's external identity
/// * `amount` - Amount in nyano as typed
///
/// # Returns
///
/// * `Ok(Raw)` the amount to send
/// * `Err(String)` why the tip is refused, for self-tips, zero or negative
///   amounts and amounts finer than one raw
pub fn tip_amount(from: &str, to: &str, amount: Decimal) -> Result<Raw, String> {
    if from == to {
        return Err("Try tipping other people instead.".to_string());
    }
    let raw = Raw::from_nyano(amount).map_err(|e| e.to_string())?;
    if raw == Raw::ZERO {
        return Err("Tip amount must be greater than zero".to_string());
    }
    Ok(raw)
}
