//! Tip Ledger CLI
//!
//! Command-line front-end to the custodial tip ledger.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- generate-seed
//! TIP_LEDGER_SEED=... cargo run -- tip --from alice --to bob --amount 10
//! TIP_LEDGER_SEED=... cargo run -- balance --user bob
//! TIP_LEDGER_SEED=... cargo run -- listen
//! TIP_LEDGER_SEED=... cargo run -- export-accounts > accounts.csv
//! ```
//!
//! Every command except `generate-seed` needs the master seed. With
//! `--simulate`, commands run against an in-process ledger and an in-memory
//! registry, so nothing touches the node or the database. That state is
//! discarded when the process exits; every simulated account starts unfunded.
//!
//! Logs go to stderr (filter with `RUST_LOG`); command output goes to stdout.
//!
//! # Exit Codes
//!
//! - 0: Success
//! - 1: Error (invalid configuration, unreachable node, rejected tip, etc.)

use std::process;
use std::sync::Arc;
use tip_ledger::cli::{self, CliArgs, Command};
use tip_ledger::config::{MasterSeed, ServiceConfig};
use tip_ledger::core::{KeyValueStore, LedgerClient, TipOutcome};
use tip_ledger::ledger::{NanoRpcClient, SimulatedLedger};
use tip_ledger::notify::{balance_message, LogNotifier};
use tip_ledger::store::{MemoryStore, SledStore};
use tip_ledger::{write_accounts_csv, TipService};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let args = cli::parse_args();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(args).await {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

async fn run(args: CliArgs) -> Result<(), String> {
    if args.command == Command::GenerateSeed {
        println!("{}", MasterSeed::generate().expose());
        return Ok(());
    }

    let config = Arc::new(args.to_service_config().map_err(|e| e.to_string())?);
    let (store, sled) = open_store(&config, args.simulate)?;
    let ledger = open_ledger(&config, args.simulate)?;
    let service = TipService::new(Arc::clone(&config), store, ledger);
    let orchestrator = service.orchestrator();

    match args.command {
        Command::GenerateSeed => {}
        Command::Tip { from, to, amount } => {
            let amount = cli::tip_amount(&from, &to, amount)?;
            match orchestrator
                .tip_user(&from, &to, amount)
                .await
                .map_err(|e| e.to_string())?
            {
                TipOutcome::Sent { explorer_url, .. } => println!("{}", explorer_url),
                TipOutcome::InsufficientBalance { balance, requested } => {
                    return Err(format!(
                        "Insufficient balance ({} nyano available, {} nyano requested). Please top-up and try again.",
                        balance.to_nyano(),
                        requested.to_nyano()
                    ));
                }
            }
        }
        Command::Balance { user } => {
            let account = orchestrator
                .get_account(&user)
                .await
                .map_err(|e| e.to_string())?;
            let balance = orchestrator
                .get_balance(&user)
                .await
                .map_err(|e| e.to_string())?;
            println!("{}", balance_message(&account, &balance));
        }
        Command::TopUpLink { user } => {
            let link = orchestrator
                .get_link_for_top_up(&user)
                .await
                .map_err(|e| e.to_string())?;
            println!("{}", link);
        }
        Command::AccountLink { user } => {
            let link = orchestrator
                .get_link_for_account(&user)
                .await
                .map_err(|e| e.to_string())?;
            println!("{}", link);
        }
        Command::Listen => {
            let notifier = Arc::new(LogNotifier::new(Arc::clone(orchestrator)));
            let shutdown = CancellationToken::new();
            let mut pipeline = service.crediting_pipeline(notifier).spawn(shutdown.clone());

            tokio::select! {
                signal = tokio::signal::ctrl_c() => {
                    signal.map_err(|e| format!("Failed to listen for Ctrl-C: {}", e))?;
                    info!("Interrupted; stopping");
                    shutdown.cancel();
                    (&mut pipeline)
                        .await
                        .map_err(|e| e.to_string())?
                        .map_err(|e| e.to_string())?;
                }
                finished = &mut pipeline => {
                    finished.map_err(|e| e.to_string())?.map_err(|e| e.to_string())?;
                }
            }
        }
        Command::ExportAccounts => {
            let accounts = service
                .registry()
                .all_accounts()
                .map_err(|e| e.to_string())?;
            write_accounts_csv(&accounts, &mut std::io::stdout())?;
        }
    }

    if let Some(sled) = sled {
        sled.flush().map_err(|e| e.to_string())?;
    }
    Ok(())
}

fn open_store(
    config: &ServiceConfig,
    simulate: bool,
) -> Result<(Arc<dyn KeyValueStore>, Option<SledStore>), String> {
    if simulate {
        return Ok((Arc::new(MemoryStore::new()), None));
    }
    let sled = SledStore::open(&config.db_path).map_err(|e| e.to_string())?;
    Ok((Arc::new(sled.clone()), Some(sled)))
}

fn open_ledger(config: &ServiceConfig, simulate: bool) -> Result<Arc<dyn LedgerClient>, String> {
    if simulate {
        return Ok(Arc::new(
            SimulatedLedger::new().with_explorer_url(config.explorer_url.clone()),
        ));
    }
    let client = NanoRpcClient::new(config).map_err(|e| e.to_string())?;
    Ok(Arc::new(client))
}
