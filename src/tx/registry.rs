//! Pending transaction registry
//!
//! Process-wide ledger of submitted transactions. Each pending entry has
//! exactly one background watcher; the watcher is the only writer of status.
//! The ledger is persisted per (account, chain) scope after every change.

use super::{PendingTransaction, TxFailure, TxHash, TxStatus};
use crate::chain::{ChainId, ConfirmationWatcher, WatchOutcome};
use crate::error::{ClientError, ClientResult};
use crate::events::ClientEvent;
use crate::state::{pending_transactions_key, KeyValueStore};
use crate::wallet::Account;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

type Ledger = Arc<Vec<PendingTransaction>>;

pub struct PendingTransactionRegistry {
    /// Insertion-ordered entries; every change publishes a new ledger
    entries: watch::Sender<Ledger>,
    /// Confirmation watcher per chain
    watchers: DashMap<ChainId, Arc<ConfirmationWatcher>>,
    /// Running watch task per pending hash
    tasks: DashMap<TxHash, JoinHandle<()>>,
    store: Arc<dyn KeyValueStore>,
    events: broadcast::Sender<ClientEvent>,
    /// Serializes ledger writes so the last save holds the latest state
    persist_lock: Mutex<()>,
}

impl PendingTransactionRegistry {
    pub fn new(store: Arc<dyn KeyValueStore>, events: broadcast::Sender<ClientEvent>) -> Self {
        let (entries, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            entries,
            watchers: DashMap::new(),
            tasks: DashMap::new(),
            store,
            events,
            persist_lock: Mutex::new(()),
        }
    }

    /// Use `watcher` for transactions on its chain. Pending entries on that
    /// chain that have no running watch are picked up.
    pub fn register_chain(self: &Arc<Self>, watcher: ConfirmationWatcher) {
        let chain = watcher.chain();
        info!(
            "Tracking confirmations on chain {} ({} blocks)",
            chain,
            watcher.confirmation_blocks()
        );
        self.watchers.insert(chain, Arc::new(watcher));

        let pending: Vec<TxHash> = self
            .entries
            .borrow()
            .iter()
            .filter(|tx| tx.chain == chain && tx.status == TxStatus::Pending)
            .map(|tx| tx.hash.clone())
            .collect();
        for hash in pending {
            self.spawn_watch(hash, chain);
        }
    }

    /// Record a freshly submitted transaction and start watching it.
    ///
    /// Returns `false` if the hash is already registered; nothing changes then.
    pub async fn add(self: &Arc<Self>, tx: PendingTransaction) -> ClientResult<bool> {
        if tx.status != TxStatus::Pending {
            return Err(ClientError::InvalidState(format!(
                "Transaction {} registered with status {}",
                tx.hash,
                tx.status.name()
            )));
        }

        let (hash, chain, account, kind) = (tx.hash.clone(), tx.chain, tx.account.clone(), tx.kind);
        let inserted = self.entries.send_if_modified(|ledger| {
            if ledger.iter().any(|t| t.hash == tx.hash) {
                return false;
            }
            Arc::make_mut(ledger).push(tx);
            true
        });

        if !inserted {
            debug!("Transaction {} already registered", hash);
            return Ok(false);
        }

        info!("Registered {} transaction {} on chain {}", kind, hash, chain);
        crate::metrics::record_tx_added(chain, kind);
        let _ = self.events.send(ClientEvent::TransactionAdded {
            hash: hash.clone(),
            kind,
            chain,
        });

        self.spawn_watch(hash, chain);
        self.persist(&account, chain).await;
        Ok(true)
    }

    fn spawn_watch(self: &Arc<Self>, hash: TxHash, chain: ChainId) {
        let Some(watcher) = self.watchers.get(&chain).map(|w| w.value().clone()) else {
            warn!(
                "No chain reader for chain {}; {} stays pending until one is registered",
                chain, hash
            );
            return;
        };

        if let Entry::Vacant(slot) = self.tasks.entry(hash.clone()) {
            let registry = self.clone();
            slot.insert(tokio::spawn(async move {
                let status = match watcher.watch(&hash).await {
                    WatchOutcome::Confirmed { .. } => TxStatus::Success,
                    WatchOutcome::Reverted => TxStatus::Error(TxFailure::Reverted),
                    WatchOutcome::TimedOut => TxStatus::Error(TxFailure::ConfirmationTimeout),
                };
                registry.settle(&hash, status).await;
                registry.tasks.remove(&hash);
            }));
        }
    }

    /// Move a pending entry to its terminal status. Terminal entries never change again.
    async fn settle(&self, hash: &TxHash, status: TxStatus) -> bool {
        if !status.is_terminal() {
            return false;
        }

        let mut settled = None;
        self.entries.send_if_modified(|ledger| {
            let Some(index) = ledger
                .iter()
                .position(|t| &t.hash == hash && t.status == TxStatus::Pending)
            else {
                return false;
            };
            let entry = ledger[index].settled(status);
            Arc::make_mut(ledger)[index] = entry.clone();
            settled = Some(entry);
            true
        });

        let Some(tx) = settled else {
            debug!("Ignoring settle of {}: not pending", hash);
            return false;
        };

        match status {
            TxStatus::Success => info!("Transaction {} succeeded", hash),
            _ => warn!("Transaction {} failed: {}", hash, status.name()),
        }
        crate::metrics::record_tx_settled(&tx);
        let _ = self.events.send(ClientEvent::TransactionSettled {
            hash: hash.clone(),
            status,
            chain: tx.chain,
        });

        self.persist(&tx.account, tx.chain).await;
        true
    }

    /// Dismiss a settled entry
    pub async fn remove(&self, hash: &TxHash) -> ClientResult<PendingTransaction> {
        let mut result = Err(ClientError::TransactionNotFound {
            hash: hash.to_string(),
        });
        self.entries.send_if_modified(|ledger| {
            let Some(index) = ledger.iter().position(|t| &t.hash == hash) else {
                return false;
            };
            if !ledger[index].status.is_terminal() {
                result = Err(ClientError::InvalidState(format!(
                    "Transaction {} is still pending",
                    hash
                )));
                return false;
            }
            result = Ok(Arc::make_mut(ledger).remove(index));
            true
        });

        let removed = result?;
        debug!("Dismissed transaction {}", hash);
        self.persist(&removed.account, removed.chain).await;
        Ok(removed)
    }

    pub fn get(&self, hash: &TxHash) -> Option<PendingTransaction> {
        self.entries.borrow().iter().find(|t| &t.hash == hash).cloned()
    }

    /// Whole ledger in insertion order
    pub fn snapshot(&self) -> Ledger {
        self.entries.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Ledger> {
        self.entries.subscribe()
    }

    /// Entries for one (account, chain) scope, in insertion order
    pub fn scoped(&self, account: &Account, chain: ChainId) -> Vec<PendingTransaction> {
        self.entries
            .borrow()
            .iter()
            .filter(|t| &t.account == account && t.chain == chain)
            .cloned()
            .collect()
    }

    pub fn active_watchers(&self) -> usize {
        self.tasks.len()
    }

    /// Resolve once `hash` reaches a terminal status
    pub async fn wait_for_terminal(&self, hash: &TxHash) -> ClientResult<TxStatus> {
        let mut rx = self.entries.subscribe();
        let ledger = rx
            .wait_for(|ledger| match ledger.iter().find(|t| &t.hash == hash) {
                Some(tx) => tx.status.is_terminal(),
                None => true,
            })
            .await
            .map_err(|_| ClientError::Internal("registry dropped".to_string()))?;

        match ledger.iter().find(|t| &t.hash == hash) {
            Some(tx) => Ok(tx.status),
            None => Err(ClientError::TransactionNotFound {
                hash: hash.to_string(),
            }),
        }
    }

    /// Reload a persisted scope and resume watching its pending entries.
    ///
    /// Returns the number of entries loaded that were not already present.
    pub async fn restore(self: &Arc<Self>, account: &Account, chain: ChainId) -> ClientResult<usize> {
        let key = pending_transactions_key(account, chain);
        let Some(bytes) = self.store.load(&key).await? else {
            return Ok(0);
        };
        let stored: Vec<PendingTransaction> = serde_json::from_slice(&bytes)?;

        let mut loaded = Vec::new();
        self.entries.send_if_modified(|ledger| {
            for tx in stored {
                if !ledger.iter().any(|t| t.hash == tx.hash) {
                    loaded.push(tx.clone());
                    Arc::make_mut(ledger).push(tx);
                }
            }
            !loaded.is_empty()
        });

        let mut resumed = 0;
        for tx in loaded.iter().filter(|t| t.status == TxStatus::Pending) {
            self.spawn_watch(tx.hash.clone(), tx.chain);
            resumed += 1;
        }
        info!(
            "Restored {} transactions for {} on chain {} ({} pending)",
            loaded.len(),
            account,
            chain,
            resumed
        );
        Ok(loaded.len())
    }

    /// Write one scope of the ledger. Failures are logged; the in-memory
    /// entry and its watcher are unaffected.
    async fn persist(&self, account: &Account, chain: ChainId) {
        let _guard = self.persist_lock.lock().await;
        let scoped = self.scoped(account, chain);
        let key = pending_transactions_key(account, chain);

        let result = match serde_json::to_vec(&scoped) {
            Ok(bytes) => self.store.save(&key, &bytes).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            error!("Failed to persist {}: {}", key, e);
            crate::metrics::record_storage_failure("pending_transactions");
        }
    }

    /// Stop every running watch. Entries stay pending and resume on restore.
    pub fn shutdown(&self) {
        for task in self.tasks.iter() {
            task.value().abort();
        }
        self.tasks.clear();
    }
}
