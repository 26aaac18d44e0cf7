//! Test doubles for chain reads, the wallet and data sources

use crate::chain::{ChainId, ChainReader, Receipt};
use crate::config::{ChainConfig, ChainFamily};
use crate::data::{Cadence, DataSource, FetchError, QueryContext};
use crate::error::{ClientError, ClientResult};
use crate::tx::TxHash;
use crate::wallet::{Account, TxRequest, WalletProvider, WalletProviderKind};

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt::Debug;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

pub fn chain_configs() -> Vec<ChainConfig> {
    let chain = |chain_id: u64, name: &str, family: ChainFamily| ChainConfig {
        chain_id,
        name: name.to_string(),
        family,
        rpc_urls: Vec::new(),
        confirmation_blocks: None,
        enabled: true,
    };
    vec![
        chain(1, "Ethereum", ChainFamily::Evm),
        chain(43114, "Avalanche", ChainFamily::Evm),
        chain(101, "Solana", ChainFamily::Solana),
    ]
}

#[derive(Default)]
struct ChainState {
    block: u64,
    receipts: HashMap<TxHash, Receipt>,
    failing: bool,
}

/// Scriptable chain: set the height, mine receipts, make RPCs fail
pub struct FakeChain {
    state: Mutex<ChainState>,
}

impl FakeChain {
    pub fn at_block(block: u64) -> Self {
        Self {
            state: Mutex::new(ChainState {
                block,
                ..ChainState::default()
            }),
        }
    }

    pub fn mine(&self, hash: &TxHash, block_number: u64, success: bool) {
        self.state.lock().unwrap().receipts.insert(
            hash.clone(),
            Receipt {
                block_number,
                success,
            },
        );
    }

    pub fn advance(&self, blocks: u64) {
        self.state.lock().unwrap().block += blocks;
    }

    pub fn set_failing(&self, failing: bool) {
        self.state.lock().unwrap().failing = failing;
    }
}

#[async_trait]
impl ChainReader for FakeChain {
    async fn get_receipt(&self, hash: &TxHash) -> ClientResult<Option<Receipt>> {
        let state = self.state.lock().unwrap();
        if state.failing {
            return Err(ClientError::ChainConnection {
                chain: ChainId::Network(1),
                message: "fake outage".to_string(),
            });
        }
        Ok(state.receipts.get(hash).copied())
    }

    async fn get_block_number(&self) -> ClientResult<u64> {
        let state = self.state.lock().unwrap();
        if state.failing {
            return Err(ClientError::ChainConnection {
                chain: ChainId::Network(1),
                message: "fake outage".to_string(),
            });
        }
        Ok(state.block)
    }
}

/// Wallet that approves everything unless told otherwise.
///
/// `hold(kind)` makes connects for `kind` wait until the returned gate is notified;
/// `hold_send()` does the same for signing.
#[derive(Default)]
pub struct FakeWallet {
    gates: Mutex<HashMap<WalletProviderKind, Arc<Notify>>>,
    send_gate: Mutex<Option<Arc<Notify>>>,
    switch_calls: AtomicUsize,
    switch_failure: Mutex<Option<ClientError>>,
    send_failure: Mutex<Option<ClientError>>,
    hashes: Mutex<VecDeque<TxHash>>,
    sent: Mutex<Vec<TxRequest>>,
}

impl FakeWallet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn account_for(kind: WalletProviderKind) -> Account {
        Account::new(format!("0x{}", kind.name()))
    }

    pub fn hold(&self, kind: WalletProviderKind) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.gates.lock().unwrap().insert(kind, gate.clone());
        gate
    }

    pub fn hold_send(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.send_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn switch_calls(&self) -> usize {
        self.switch_calls.load(Ordering::SeqCst)
    }

    pub fn fail_next_switch(&self, error: ClientError) {
        *self.switch_failure.lock().unwrap() = Some(error);
    }

    pub fn fail_next_send(&self, error: ClientError) {
        *self.send_failure.lock().unwrap() = Some(error);
    }

    pub fn next_hash(&self, hash: TxHash) {
        self.hashes.lock().unwrap().push_back(hash);
    }

    pub fn sent(&self) -> Vec<TxRequest> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl WalletProvider for FakeWallet {
    async fn connect(&self, kind: WalletProviderKind, _chain: ChainId) -> ClientResult<Account> {
        let gate = self.gates.lock().unwrap().get(&kind).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        Ok(Self::account_for(kind))
    }

    async fn sign_and_send(&self, request: &TxRequest) -> ClientResult<TxHash> {
        let gate = self.send_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if let Some(error) = self.send_failure.lock().unwrap().take() {
            return Err(error);
        }
        let mut sent = self.sent.lock().unwrap();
        sent.push(request.clone());
        let hash = self
            .hashes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| TxHash::new(format!("0x{:064x}", sent.len())));
        Ok(hash)
    }

    async fn switch_chain(&self, _target: ChainId) -> ClientResult<()> {
        self.switch_calls.fetch_add(1, Ordering::SeqCst);
        match self.switch_failure.lock().unwrap().take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

/// Source serving whatever the test last set
pub struct StaticSource<K, V> {
    value: Mutex<Result<BTreeMap<K, V>, FetchError>>,
    gate: Mutex<Option<Arc<Notify>>>,
    seen: Mutex<Vec<Option<Account>>>,
    cadence: Cadence,
}

impl<K, V> StaticSource<K, V> {
    pub fn new(value: BTreeMap<K, V>) -> Self {
        Self {
            value: Mutex::new(Ok(value)),
            gate: Mutex::new(None),
            seen: Mutex::new(Vec::new()),
            cadence: Cadence::Both,
        }
    }

    pub fn with_cadence(mut self, cadence: Cadence) -> Self {
        self.cadence = cadence;
        self
    }

    pub fn set(&self, value: BTreeMap<K, V>) {
        *self.value.lock().unwrap() = Ok(value);
    }

    pub fn fail_with(&self, message: &str) {
        *self.value.lock().unwrap() = Err(FetchError::new(message));
    }

    /// Fetches started from now on wait for the returned gate
    pub fn hold(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn release(&self) {
        *self.gate.lock().unwrap() = None;
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    pub fn seen_accounts(&self) -> Vec<Option<Account>> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl<K, V> DataSource for StaticSource<K, V>
where
    K: Ord + Clone + Debug + Send + Sync + 'static,
    V: Clone + Debug + Send + Sync + 'static,
{
    type Key = K;
    type Value = V;

    async fn fetch(&self, ctx: &QueryContext) -> Result<BTreeMap<K, V>, FetchError> {
        self.seen.lock().unwrap().push(ctx.account.clone());
        let value = self.value.lock().unwrap().clone();
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        value
    }

    fn cadence(&self) -> Cadence {
        self.cadence
    }
}
