//! End-to-end integration tests
//!
//! These tests run the whole service (registry on an on-disk sled store,
//! orchestrator, crediting pipeline) against the in-process simulated ledger.
//! Each test:
//! 1. Opens a fresh sled database in a temporary directory
//! 2. Drives the service through its public API
//! 3. Checks the registry, the ledger and the notifications that resulted
//!
//! They cover:
//! - Account provisioning and persistence across restarts
//! - Tips with sufficient and insufficient balance
//! - Crediting of top-ups and tips by the running pipeline
//! - A send and a pocket racing on one account chain
//! - The CSV export of the registry

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;
    use tip_ledger::core::CreditNotifier;
    use tip_ledger::ledger::SimulatedLedger;
    use tip_ledger::store::SledStore;
    use tip_ledger::types::{ConfirmedBlock, NotifyError, RAW_PER_NYANO};
    use tip_ledger::{
        write_accounts_csv, Balance, CreditOutcome, MasterSeed, Raw, ServiceConfig, TipOutcome,
        TipService,
    };
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    const SEED: &str = "9F1D53E732E48F25F94711D5B22086778278624F715D9B2BEC8FB81134E7C904";

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Notification {
        Tip(String, String),
        TopUp(String),
    }

    struct RecordingNotifier(mpsc::UnboundedSender<Notification>);

    #[async_trait]
    impl CreditNotifier for RecordingNotifier {
        async fn on_tip(&self, from: &str, to: &str) -> Result<(), NotifyError> {
            let _ = self.0.send(Notification::Tip(from.to_string(), to.to_string()));
            Ok(())
        }

        async fn on_top_up(&self, to: &str) -> Result<(), NotifyError> {
            let _ = self.0.send(Notification::TopUp(to.to_string()));
            Ok(())
        }
    }

    /// A service on a sled store in `dir`, sharing `ledger`
    fn open_service(dir: &TempDir, ledger: Arc<SimulatedLedger>) -> (SledStore, TipService) {
        let mut config = ServiceConfig::new(MasterSeed::parse(SEED).unwrap());
        config.db_path = dir.path().join("registry");
        let store = SledStore::open(&config.db_path).expect("Failed to open sled store");
        let service = TipService::new(Arc::new(config), Arc::new(store.clone()), ledger);
        (store, service)
    }

    /// Run the crediting pipeline until the returned token is cancelled
    async fn start_pipeline(
        service: &TipService,
        ledger: &SimulatedLedger,
    ) -> (CancellationToken, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        service
            .crediting_pipeline(Arc::new(RecordingNotifier(tx)))
            .spawn(shutdown.clone());

        tokio::time::timeout(Duration::from_secs(5), async {
            while ledger.subscriber_count() == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("Pipeline never subscribed");

        (shutdown, rx)
    }

    async fn next_notification(rx: &mut mpsc::UnboundedReceiver<Notification>) -> Notification {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("No notification within timeout")
            .expect("Notifier dropped")
    }

    #[tokio::test]
    async fn test_first_contact_provisions_account_with_both_indices() {
        let dir = TempDir::new().unwrap();
        let ledger = Arc::new(SimulatedLedger::new());
        let (_store, service) = open_service(&dir, ledger);

        let account = service.orchestrator().get_account("u1").await.unwrap();

        assert_eq!(account.seed_index, 1);
        let registry = service.registry();
        assert_eq!(registry.find_by_external_id("u1").unwrap(), Some(account.clone()));
        assert_eq!(
            registry.find_by_address(&account.address).unwrap(),
            Some(account)
        );
    }

    #[tokio::test]
    async fn test_registry_survives_restart() {
        let dir = TempDir::new().unwrap();
        let ledger = Arc::new(SimulatedLedger::new());

        let first = {
            let (store, service) = open_service(&dir, ledger.clone());
            let account = service.orchestrator().get_account("u1").await.unwrap();
            store.flush().unwrap();
            account
        };

        let (_store, service) = open_service(&dir, ledger);
        assert_eq!(service.orchestrator().get_account("u1").await.unwrap(), first);
        assert_eq!(
            service.orchestrator().get_account("u2").await.unwrap().seed_index,
            2
        );
    }

    #[tokio::test]
    async fn test_tip_with_sufficient_balance() {
        let dir = TempDir::new().unwrap();
        let ledger = Arc::new(SimulatedLedger::new());
        let (_store, service) = open_service(&dir, ledger.clone());
        let orchestrator = service.orchestrator();
        let u1 = orchestrator.get_account("u1").await.unwrap();
        ledger.credit(&u1.address, Raw(1_000_000));

        let outcome = orchestrator
            .tip_user("u1", "u2", Raw(500_000))
            .await
            .unwrap();

        let u2 = service.registry().find_by_external_id("u2").unwrap().unwrap();
        assert_eq!(u2.seed_index, 2);
        let transfers = ledger.transfers();
        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers[0].from_address, u1.address);
        assert_eq!(transfers[0].to_address, u2.address);
        assert_eq!(transfers[0].amount, Raw(500_000));
        assert_eq!(
            outcome,
            TipOutcome::Sent {
                explorer_url: format!(
                    "https://nanolooker.com/block/{}",
                    transfers[0].transaction_id
                ),
                transaction_id: transfers[0].transaction_id.clone(),
            }
        );
    }

    #[tokio::test]
    async fn test_tip_with_insufficient_balance() {
        let dir = TempDir::new().unwrap();
        let ledger = Arc::new(SimulatedLedger::new());
        let (_store, service) = open_service(&dir, ledger.clone());

        let outcome = service
            .orchestrator()
            .tip_user("u3", "u4", Raw(1))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            TipOutcome::InsufficientBalance {
                balance: Raw::ZERO,
                requested: Raw(1),
            }
        );
        assert!(ledger.transfers().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_top_up_from_outside_is_pocketed_once() {
        let dir = TempDir::new().unwrap();
        let ledger = Arc::new(SimulatedLedger::new());
        let (_store, service) = open_service(&dir, ledger.clone());
        let u5 = service.orchestrator().get_account("u5").await.unwrap();
        let (shutdown, mut notifications) = start_pipeline(&service, &ledger).await;

        ledger
            .deposit_external("nano_outside", &u5.address, Raw(42))
            .await;

        assert_eq!(
            next_notification(&mut notifications).await,
            Notification::TopUp("u5".to_string())
        );
        assert_eq!(ledger.pocket_calls(), vec![u5.address.clone()]);
        assert_eq!(
            ledger.balance_of(&u5.address),
            Balance {
                balance: Raw(42),
                pending: Raw::ZERO,
            }
        );
        shutdown.cancel();
        assert!(notifications.try_recv().is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_tip_is_credited_to_recipient() {
        let dir = TempDir::new().unwrap();
        let ledger = Arc::new(SimulatedLedger::new());
        let (_store, service) = open_service(&dir, ledger.clone());
        let orchestrator = service.orchestrator();
        let u1 = orchestrator.get_account("u1").await.unwrap();
        ledger.credit(&u1.address, Raw(100 * RAW_PER_NYANO));
        let (shutdown, mut notifications) = start_pipeline(&service, &ledger).await;

        let amount = Raw::from_nyano(Decimal::new(10, 0)).unwrap();
        let outcome = orchestrator.tip_user("u1", "u2", amount).await.unwrap();
        assert!(matches!(outcome, TipOutcome::Sent { .. }));

        assert_eq!(
            next_notification(&mut notifications).await,
            Notification::Tip("u1".to_string(), "u2".to_string())
        );
        assert_eq!(
            orchestrator.get_balance("u2").await.unwrap(),
            Balance {
                balance: amount,
                pending: Raw::ZERO,
            }
        );
        assert_eq!(
            orchestrator.get_balance("u1").await.unwrap().balance,
            Raw(90 * RAW_PER_NYANO)
        );
        shutdown.cancel();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_deposit_to_unmanaged_address_is_ignored() {
        let dir = TempDir::new().unwrap();
        let ledger = Arc::new(SimulatedLedger::new());
        let (_store, service) = open_service(&dir, ledger.clone());
        let u5 = service.orchestrator().get_account("u5").await.unwrap();
        let (shutdown, mut notifications) = start_pipeline(&service, &ledger).await;

        ledger
            .deposit_external("nano_outside", "nano_stranger", Raw(1))
            .await;
        // A later credit proves the first confirmation was already handled.
        ledger
            .deposit_external("nano_outside", &u5.address, Raw(1))
            .await;

        assert_eq!(
            next_notification(&mut notifications).await,
            Notification::TopUp("u5".to_string())
        );
        assert_eq!(ledger.pocket_calls(), vec![u5.address]);
        assert_eq!(service.registry().all_accounts().unwrap().len(), 1);
        shutdown.cancel();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_send_and_pocket_on_one_account_do_not_fork() {
        let dir = TempDir::new().unwrap();
        let ledger = Arc::new(SimulatedLedger::new().with_latency(Duration::from_millis(40)));
        let (_store, service) = open_service(&dir, ledger.clone());
        let orchestrator = service.orchestrator();
        let u1 = orchestrator.get_account("u1").await.unwrap();
        orchestrator.get_account("u2").await.unwrap();
        ledger.credit(&u1.address, Raw(100));
        let deposit = ledger
            .deposit_external("nano_outside", &u1.address, Raw(5))
            .await;
        let (tx, _notifications) = mpsc::unbounded_channel();
        let pipeline = service.crediting_pipeline(Arc::new(RecordingNotifier(tx)));
        let confirmed = ConfirmedBlock {
            source_address: "nano_outside".to_string(),
            destination_address: u1.address.clone(),
            transaction_id: deposit,
            amount: Raw(5),
        };

        // u1 receives the deposit while its own tip is being submitted.
        let (tip, credit) = tokio::join!(orchestrator.tip_user("u1", "u2", Raw(10)), async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            pipeline.handle_confirmation(&confirmed).await
        });

        assert!(matches!(tip.unwrap(), TipOutcome::Sent { .. }));
        assert!(matches!(credit.unwrap(), CreditOutcome::TopUp { .. }));
        assert_eq!(
            ledger.balance_of(&u1.address),
            Balance {
                balance: Raw(95),
                pending: Raw::ZERO,
            }
        );
    }

    #[tokio::test]
    async fn test_export_lists_accounts_in_seed_order() {
        let dir = TempDir::new().unwrap();
        let ledger = Arc::new(SimulatedLedger::new());
        let (_store, service) = open_service(&dir, ledger);
        for id in ["carol", "alice", "bob"] {
            service.orchestrator().get_account(id).await.unwrap();
        }

        let accounts = service.registry().all_accounts().unwrap();
        let mut output = Vec::new();
        write_accounts_csv(&accounts, &mut output).unwrap();

        let csv = String::from_utf8(output).unwrap();
        let ids: Vec<&str> = csv
            .lines()
            .skip(1)
            .map(|line| line.split(',').next().unwrap())
            .collect();
        assert_eq!(csv.lines().next(), Some("externalId,seedIndex,address,withdrawalAddress"));
        assert_eq!(ids, vec!["carol", "alice", "bob"]);
        assert!(!csv.contains(SEED));
    }
}
