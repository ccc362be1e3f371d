//! Ledger facade backed by a Nano node's JSON RPC
//!
//! Every request is a `POST` of `{"action": ..., ...}` to the node. Each call
//! is bounded by the configured RPC timeout and fails with
//! [`LedgerError::Timeout`] when the node does not answer in time.
//!
//! Confirmations are discovered by polling `confirmation_history` and
//! resolving each newly seen hash with `block_info`. Only send blocks are
//! forwarded. Recently seen hashes are remembered in a bounded window, so a
//! hash falling out of the window may be delivered again.
//!
//! Pocketing asks `receivable` for batches of pending blocks and receives
//! them one after another on the account chain, until the node lists nothing
//! new.

use crate::config::{MasterSeed, ServiceConfig};
use crate::core::traits::LedgerClient;
use crate::types::{
    AccountKeys, Balance, ConfirmedBlock, LedgerError, Raw, ReceivedTransfer, SecretKey,
    SeedIndex, TransactionId,
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::{HashSet, VecDeque};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Number of confirmed hashes remembered to suppress repeats
const SEEN_WINDOW: usize = 4096;

/// Number of receivable blocks requested per `receivable` call
const RECEIVABLE_BATCH: u32 = 64;

const SUBSCRIPTION_BUFFER: usize = 256;

/// Previous-block value of an account's first block
const OPEN_PREVIOUS: &str = "0000000000000000000000000000000000000000000000000000000000000000";

#[derive(Debug, Deserialize)]
struct KeyResponse {
    private: String,
    account: String,
}

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    balance: Raw,
    #[serde(default)]
    pending: Option<Raw>,
    #[serde(default)]
    receivable: Option<Raw>,
}

#[derive(Debug, Deserialize)]
struct AccountInfoResponse {
    frontier: String,
    balance: Raw,
    #[serde(default)]
    representative: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BlockCreateResponse {
    hash: String,
    block: Value,
}

#[derive(Debug, Deserialize)]
struct ProcessResponse {
    hash: String,
}

#[derive(Debug, Deserialize)]
struct ConfirmationHistoryResponse {
    #[serde(default)]
    confirmations: Vec<ConfirmationEntry>,
}

#[derive(Debug, Deserialize)]
struct ConfirmationEntry {
    hash: String,
}

#[derive(Debug, Deserialize)]
struct BlockInfoResponse {
    block_account: String,
    amount: Raw,
    #[serde(default)]
    subtype: Option<String>,
    contents: BlockContents,
}

#[derive(Debug, Deserialize)]
struct BlockContents {
    #[serde(default)]
    link_as_account: Option<String>,
}

/// Head of an account chain, or nothing for an unopened account
#[derive(Debug, Clone, PartialEq, Eq)]
struct ChainHead {
    previous: String,
    balance: Raw,
    representative: Option<String>,
}

/// Node RPC client implementing the ledger facade
#[derive(Debug, Clone)]
pub struct NanoRpcClient {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
    explorer_url: String,
    representative: Option<String>,
    poll_interval: Duration,
}

impl NanoRpcClient {
    /// Build a client for the node at `config.rpc_url`
    ///
    /// # Errors
    ///
    /// Returns a transport error if the HTTP client cannot be initialized.
    pub fn new(config: &ServiceConfig) -> Result<Self, LedgerError> {
        let client = reqwest::Client::builder()
            .timeout(config.rpc_timeout)
            .build()
            .map_err(|e| LedgerError::transport("init", e))?;

        Ok(Self {
            client,
            url: config.rpc_url.clone(),
            timeout: config.rpc_timeout,
            explorer_url: config.explorer_url.clone(),
            representative: config.representative.clone(),
            poll_interval: config.poll_interval,
        })
    }

    fn timeout_ms(&self) -> u64 {
        u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX)
    }

    /// Send one RPC action and return the raw JSON answer
    async fn call(&self, action: &str, mut request: Value) -> Result<Value, LedgerError> {
        request["action"] = Value::String(action.to_string());

        let exchange = async {
            let response = self
                .client
                .post(&self.url)
                .json(&request)
                .send()
                .await
                .map_err(|e| self.request_error(action, e))?;
            response
                .json::<Value>()
                .await
                .map_err(|e| LedgerError::malformed(action, e))
        };

        let body = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| LedgerError::timeout(action, self.timeout_ms()))??;

        check_rpc_error(action, &body)?;
        Ok(body)
    }

    fn request_error(&self, action: &str, error: reqwest::Error) -> LedgerError {
        if error.is_timeout() {
            LedgerError::timeout(action, self.timeout_ms())
        } else {
            LedgerError::transport(action, error)
        }
    }

    async fn call_as<T: DeserializeOwned>(
        &self,
        action: &str,
        request: Value,
    ) -> Result<T, LedgerError> {
        let body = self.call(action, request).await?;
        parse_response(action, body)
    }

    async fn expand(&self, secret_key: &SecretKey) -> Result<KeyResponse, LedgerError> {
        self.call_as("key_expand", json!({ "key": secret_key.expose() }))
            .await
    }

    /// Frontier, balance and representative of `address`
    async fn chain_head(&self, address: &str) -> Result<Option<ChainHead>, LedgerError> {
        let request = json!({ "account": address, "representative": "true" });
        match self.call_as::<AccountInfoResponse>("account_info", request).await {
            Ok(info) => Ok(Some(ChainHead {
                previous: info.frontier,
                balance: info.balance,
                representative: info.representative,
            })),
            Err(LedgerError::Rpc { message, .. }) if is_unopened(&message) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Create, sign and publish a state block
    async fn publish_block(
        &self,
        subtype: &str,
        secret_key: &SecretKey,
        head: &ChainHead,
        new_balance: Raw,
        link: &str,
    ) -> Result<TransactionId, LedgerError> {
        let created: BlockCreateResponse = self
            .call_as(
                "block_create",
                json!({
                    "json_block": "true",
                    "type": "state",
                    "key": secret_key.expose(),
                    "previous": head.previous,
                    "balance": new_balance.to_string(),
                    "representative": head.representative,
                    "link": link,
                }),
            )
            .await?;

        let processed: ProcessResponse = self
            .call_as(
                "process",
                json!({
                    "json_block": "true",
                    "subtype": subtype,
                    "block": created.block,
                }),
            )
            .await?;

        if processed.hash != created.hash {
            warn!(
                created = %created.hash,
                processed = %processed.hash,
                "Node processed a different block hash than it created"
            );
        }
        Ok(processed.hash)
    }

    /// One batch of blocks pending for `address`, oldest first as the node lists them
    async fn receivable_batch(&self, address: &str) -> Result<Vec<ReceivedTransfer>, LedgerError> {
        let body = self
            .call(
                "receivable",
                json!({
                    "account": address,
                    "count": RECEIVABLE_BATCH.to_string(),
                    "source": "true",
                }),
            )
            .await?;
        parse_receivable("receivable", &body)
    }

    /// Head to build the next receive on, opening the account if needed
    async fn receive_head(&self, address: &str) -> Result<ChainHead, LedgerError> {
        let existing = self.chain_head(address).await?;
        let representative = self.representative_for(existing.as_ref(), address);
        let mut head = existing.unwrap_or_else(|| ChainHead {
            previous: OPEN_PREVIOUS.to_string(),
            balance: Raw::ZERO,
            representative: None,
        });
        head.representative = Some(representative);
        Ok(head)
    }

    fn representative_for(&self, head: Option<&ChainHead>, own_address: &str) -> String {
        head.and_then(|head| head.representative.clone())
            .or_else(|| self.representative.clone())
            .unwrap_or_else(|| own_address.to_string())
    }

    /// Resolve a confirmed hash into a send block, if it is one
    async fn confirmed_send(&self, hash: &str) -> Result<Option<ConfirmedBlock>, LedgerError> {
        let info: BlockInfoResponse = self
            .call_as("block_info", json!({ "json_block": "true", "hash": hash }))
            .await?;
        Ok(to_confirmed_send(hash, info))
    }

    async fn poll_confirmations(
        self,
        sender: mpsc::Sender<ConfirmedBlock>,
        shutdown: CancellationToken,
    ) {
        let mut seen = SeenWindow::new(SEEN_WINDOW);
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {}
            }

            let history: ConfirmationHistoryResponse =
                match self.call_as("confirmation_history", json!({})).await {
                    Ok(history) => history,
                    Err(e) => {
                        warn!(error = %e, "Confirmation poll failed; retrying");
                        continue;
                    }
                };

            for entry in history.confirmations {
                if !seen.insert(&entry.hash) {
                    continue;
                }
                match self.confirmed_send(&entry.hash).await {
                    Ok(Some(block)) => {
                        if sender.send(block).await.is_err() {
                            debug!("Confirmation receiver dropped; stopping poller");
                            return;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        // Forget the hash so the next poll retries it.
                        seen.remove(&entry.hash);
                        warn!(hash = %entry.hash, error = %e, "Failed to resolve confirmed block");
                    }
                }
            }
        }
        info!("Confirmation poller stopped");
    }
}

#[async_trait]
impl LedgerClient for NanoRpcClient {
    async fn derive_key(
        &self,
        seed: &MasterSeed,
        index: SeedIndex,
    ) -> Result<SecretKey, LedgerError> {
        let keys: KeyResponse = self
            .call_as(
                "deterministic_key",
                json!({ "seed": seed.expose(), "index": index.to_string() }),
            )
            .await?;
        Ok(SecretKey::new(keys.private))
    }

    async fn account_metadata(&self, secret_key: &SecretKey) -> Result<AccountKeys, LedgerError> {
        let keys = self.expand(secret_key).await?;
        Ok(AccountKeys {
            secret_key: SecretKey::new(keys.private),
            address: keys.account,
        })
    }

    async fn get_balance(&self, address: &str) -> Result<Balance, LedgerError> {
        let response: BalanceResponse = self
            .call_as("account_balance", json!({ "account": address }))
            .await?;
        Ok(Balance {
            balance: response.balance,
            pending: response.receivable.or(response.pending).unwrap_or_default(),
        })
    }

    async fn submit_transfer(
        &self,
        secret_key: &SecretKey,
        to_address: &str,
        amount: Raw,
    ) -> Result<TransactionId, LedgerError> {
        let from = self.expand(secret_key).await?;
        let head = self
            .chain_head(&from.account)
            .await?
            .ok_or_else(|| LedgerError::rpc("send", "Account not found"))?;
        let new_balance = head
            .balance
            .checked_sub(amount)
            .ok_or_else(|| LedgerError::rpc("send", "Insufficient balance"))?;

        let head = ChainHead {
            representative: Some(self.representative_for(Some(&head), &from.account)),
            ..head
        };
        self.publish_block("send", secret_key, &head, new_balance, to_address)
            .await
    }

    async fn subscribe_confirmations(
        &self,
        shutdown: CancellationToken,
    ) -> Result<mpsc::Receiver<ConfirmedBlock>, LedgerError> {
        // Fail fast if the node is unreachable.
        self.call("confirmation_history", json!({})).await?;

        let (sender, receiver) = mpsc::channel(SUBSCRIPTION_BUFFER);
        tokio::spawn(self.clone().poll_confirmations(sender, shutdown));
        Ok(receiver)
    }

    async fn pocket_pending(
        &self,
        secret_key: &SecretKey,
    ) -> Result<Vec<ReceivedTransfer>, LedgerError> {
        let keys = self.expand(secret_key).await?;
        let mut batch = self.receivable_batch(&keys.account).await?;
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let mut head = self.receive_head(&keys.account).await?;
        let mut received = Vec::new();
        let mut attempted = HashSet::new();
        loop {
            // A lagging node may list blocks this call already received.
            let fresh: Vec<ReceivedTransfer> = batch
                .into_iter()
                .filter(|transfer| attempted.insert(transfer.source_transaction_id.clone()))
                .collect();
            if fresh.is_empty() {
                break;
            }

            for transfer in fresh {
                let new_balance = head
                    .balance
                    .checked_add(transfer.amount)
                    .ok_or_else(|| LedgerError::malformed("receive", "balance overflow"))?;
                let hash = self
                    .publish_block(
                        "receive",
                        secret_key,
                        &head,
                        new_balance,
                        &transfer.source_transaction_id,
                    )
                    .await?;
                debug!(
                    account = %keys.account,
                    source = %transfer.source_transaction_id,
                    hash = %hash,
                    "Received pending transfer"
                );
                head.previous = hash;
                head.balance = new_balance;
                received.push(transfer);
            }

            batch = self.receivable_batch(&keys.account).await?;
        }
        Ok(received)
    }

    fn explorer_url(&self, transaction_id: &str) -> String {
        format!("{}/block/{}", self.explorer_url.trim_end_matches('/'), transaction_id)
    }

    fn account_explorer_url(&self, address: &str) -> String {
        format!("{}/account/{}", self.explorer_url.trim_end_matches('/'), address)
    }
}

/// Bounded set of recently seen hashes, evicting the oldest first
struct SeenWindow {
    capacity: usize,
    order: VecDeque<String>,
    hashes: HashSet<String>,
}

impl SeenWindow {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity),
            hashes: HashSet::with_capacity(capacity),
        }
    }

    /// Returns `false` if `hash` was already in the window
    fn insert(&mut self, hash: &str) -> bool {
        if !self.hashes.insert(hash.to_string()) {
            return false;
        }
        self.order.push_back(hash.to_string());
        if self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.hashes.remove(&oldest);
            }
        }
        true
    }

    fn remove(&mut self, hash: &str) {
        if self.hashes.remove(hash) {
            self.order.retain(|seen| seen != hash);
        }
    }
}

fn check_rpc_error(action: &str, body: &Value) -> Result<(), LedgerError> {
    match body.get("error") {
        Some(Value::String(message)) => Err(LedgerError::rpc(action, message)),
        Some(other) => Err(LedgerError::rpc(action, other)),
        None => Ok(()),
    }
}

fn parse_response<T: DeserializeOwned>(action: &str, body: Value) -> Result<T, LedgerError> {
    serde_json::from_value(body).map_err(|e| LedgerError::malformed(action, e))
}

fn is_unopened(message: &str) -> bool {
    message.eq_ignore_ascii_case("Account not found")
}

/// Pending sends listed by a `receivable` response
///
/// Nodes answer with an empty string instead of an empty object when nothing
/// is pending, and with bare amounts when `source` is not requested.
fn parse_receivable(action: &str, body: &Value) -> Result<Vec<ReceivedTransfer>, LedgerError> {
    let blocks = match body.get("blocks") {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::String(s)) if s.is_empty() => return Ok(Vec::new()),
        Some(Value::Object(blocks)) => blocks,
        Some(other) => {
            return Err(LedgerError::malformed(
                action,
                format!("unexpected blocks: {}", other),
            ))
        }
    };

    blocks
        .iter()
        .map(|(hash, entry)| {
            let amount = match entry {
                Value::Object(fields) => fields.get("amount").and_then(Value::as_str),
                Value::String(amount) => Some(amount.as_str()),
                _ => None,
            }
            .ok_or_else(|| LedgerError::malformed(action, format!("no amount for {}", hash)))?;
            let amount = amount
                .parse::<Raw>()
                .map_err(|e| LedgerError::malformed(action, e))?;
            Ok(ReceivedTransfer {
                source_transaction_id: hash.clone(),
                amount,
            })
        })
        .collect()
}

fn to_confirmed_send(hash: &str, info: BlockInfoResponse) -> Option<ConfirmedBlock> {
    if info.subtype.as_deref() != Some("send") {
        return None;
    }
    Some(ConfirmedBlock {
        source_address: info.block_account,
        destination_address: info.contents.link_as_account?,
        transaction_id: hash.to_string(),
        amount: info.amount,
    })
}
