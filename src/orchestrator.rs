//! Composition root wiring the session, registry, aggregator and flows together

use crate::chain::{ChainId, ChainReader, ChainSessionManager, ConfirmationWatcher, RpcChainReader};
use crate::config::{ChainFamily, Settings};
use crate::data::{AggregatedContext, DataSourceAggregator, DataSources, QueryContext};
use crate::error::{ClientError, ClientResult};
use crate::events::{self, ClientEvent};
use crate::flow::{ActionKind, ActionParams, TransactionActionFlow};
use crate::state::{open_store, KeyValueStore};
use crate::tx::{PendingTransaction, PendingTransactionRegistry};
use crate::wallet::{
    Account, ConnectOutcome, WalletConnectionManager, WalletProvider, WalletProviderKind,
    WalletSession,
};

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Collects the capabilities the client needs before wiring it up
pub struct OrchestratorBuilder {
    settings: Settings,
    provider: Option<Arc<dyn WalletProvider>>,
    store: Option<Arc<dyn KeyValueStore>>,
    readers: HashMap<ChainId, Arc<dyn ChainReader>>,
    sources: DataSources,
}

impl OrchestratorBuilder {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            provider: None,
            store: None,
            readers: HashMap::new(),
            sources: DataSources::default(),
        }
    }

    pub fn wallet_provider(mut self, provider: Arc<dyn WalletProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Use `store` instead of the backend named in the storage config
    pub fn store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Read `chain` through `reader` instead of its configured RPC URLs
    pub fn chain_reader(mut self, chain: ChainId, reader: Arc<dyn ChainReader>) -> Self {
        self.readers.insert(chain, reader);
        self
    }

    pub fn sources(mut self, sources: DataSources) -> Self {
        self.sources = sources;
        self
    }

    pub async fn build(mut self) -> ClientResult<Orchestrator> {
        let provider = self
            .provider
            .take()
            .ok_or_else(|| ClientError::Config("a wallet provider is required".to_string()))?;
        let store = match self.store.take() {
            Some(store) => store,
            None => open_store(&self.settings.storage).await?,
        };

        let events = events::channel();
        let chains = Arc::new(ChainSessionManager::new(
            &self.settings,
            provider.clone(),
            events.clone(),
        ));
        let wallet = Arc::new(WalletConnectionManager::new(
            provider,
            chains.clone(),
            store.clone(),
            events.clone(),
            Duration::from_millis(self.settings.session.connect_timeout_ms),
        ));

        let registry = Arc::new(PendingTransactionRegistry::new(store, events.clone()));
        let limits = &self.settings.registry;
        for config in chains.enabled_chains() {
            let chain = config.id();
            let reader: Arc<dyn ChainReader> = match self.readers.remove(&chain) {
                Some(reader) => reader,
                None if config.family == ChainFamily::Evm && !config.rpc_urls.is_empty() => {
                    Arc::new(RpcChainReader::new(config)?)
                }
                None => {
                    debug!("No chain reader for {}; its transactions are not watched", config.name);
                    continue;
                }
            };
            registry.register_chain(
                ConfirmationWatcher::new(chain, config.confirmation_depth(), reader).with_limits(
                    limits.poll_interval(),
                    limits.timeout_blocks,
                    limits.max_wait(),
                ),
            );
        }

        let aggregator = Arc::new(DataSourceAggregator::new(
            self.sources,
            self.settings.aggregator.clone(),
            QueryContext {
                chain: chains.active_chain(),
                account: None,
            },
            events.clone(),
        ));

        info!(
            "Client initialized for {} chains (default {})",
            chains.enabled_chains().len(),
            chains.default_chain()
        );

        Ok(Orchestrator {
            settings: self.settings,
            events,
            chains,
            wallet,
            registry,
            aggregator,
            tasks: Mutex::new(Vec::new()),
        })
    }
}

/// Owns every component of one client instance
pub struct Orchestrator {
    settings: Settings,
    events: broadcast::Sender<ClientEvent>,
    chains: Arc<ChainSessionManager>,
    wallet: Arc<WalletConnectionManager>,
    registry: Arc<PendingTransactionRegistry>,
    aggregator: Arc<DataSourceAggregator>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Orchestrator {
    pub fn builder(settings: Settings) -> OrchestratorBuilder {
        OrchestratorBuilder::new(settings)
    }

    /// Restore the last wallet if configured, then start polling and
    /// following the session. A failed restore leaves the session disconnected.
    pub async fn start(&self) {
        if self.settings.session.restore_last_wallet {
            match self.wallet.restore().await {
                Ok(Some(ConnectOutcome::Connected(account))) => {
                    info!("Restored wallet session for {}", account)
                }
                Ok(_) => {}
                Err(e) => warn!("Could not restore last wallet: {}", e),
            }
        }

        self.aggregator.start(self.wallet.subscribe());

        let registry = self.registry.clone();
        let mut session = self.wallet.subscribe();
        let follower = tokio::spawn(async move {
            let mut restored: Option<(Account, ChainId)> = None;
            loop {
                let scope = {
                    let s = session.borrow_and_update();
                    s.account().cloned().map(|account| (account, s.chain()))
                };
                if let Some((account, chain)) = scope {
                    if restored.as_ref() != Some(&(account.clone(), chain)) {
                        if let Err(e) = registry.restore(&account, chain).await {
                            warn!("Failed to restore transactions for {}: {}", account, e);
                        }
                        restored = Some((account, chain));
                    }
                }
                if session.changed().await.is_err() {
                    break;
                }
            }
        });

        let mut tasks = match self.tasks.lock() {
            Ok(tasks) => tasks,
            Err(poisoned) => poisoned.into_inner(),
        };
        tasks.push(follower);
        info!("Client started");
    }

    pub async fn connect(&self, kind: WalletProviderKind) -> ClientResult<ConnectOutcome> {
        self.wallet.connect(kind).await
    }

    pub async fn disconnect(&self) {
        self.wallet.disconnect().await
    }

    /// Pick a network before any wallet is connected
    pub fn select_chain(&self, target: ChainId) -> ClientResult<()> {
        self.wallet.select_chain(target)
    }

    /// Ask the connected wallet to move to `target`
    pub async fn request_chain_switch(&self, target: ChainId) -> ClientResult<()> {
        self.wallet.request_chain_switch(target).await
    }

    /// Open a new flow for `kind`, validating against the live aggregated context
    pub fn submit_action(
        &self,
        kind: ActionKind,
        params: ActionParams,
    ) -> ClientResult<Arc<TransactionActionFlow>> {
        let flow = TransactionActionFlow::new(
            kind,
            params,
            self.wallet.clone(),
            self.registry.clone(),
            self.aggregator.subscribe(),
        )?;
        debug!("Opened {} flow {}", kind, flow.id());
        Ok(Arc::new(flow))
    }

    pub fn session(&self) -> WalletSession {
        self.wallet.session()
    }

    pub fn subscribe_session(&self) -> watch::Receiver<WalletSession> {
        self.wallet.subscribe()
    }

    pub fn context(&self) -> Arc<AggregatedContext> {
        self.aggregator.snapshot()
    }

    pub fn subscribe_context(&self) -> watch::Receiver<Arc<AggregatedContext>> {
        self.aggregator.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    /// Ledger entries of the connected account on the active chain
    pub fn pending_transactions(&self) -> Vec<PendingTransaction> {
        let session = self.wallet.session();
        match session.account() {
            Some(account) => self.registry.scoped(account, session.chain()),
            None => Vec::new(),
        }
    }

    pub fn registry(&self) -> &Arc<PendingTransactionRegistry> {
        &self.registry
    }

    pub fn wallet(&self) -> &Arc<WalletConnectionManager> {
        &self.wallet
    }

    pub fn chains(&self) -> &Arc<ChainSessionManager> {
        &self.chains
    }

    pub fn aggregator(&self) -> &Arc<DataSourceAggregator> {
        &self.aggregator
    }

    /// Stop background work. Pending entries stay persisted and resume on the next start.
    pub fn stop(&self) {
        let mut tasks = match self.tasks.lock() {
            Ok(tasks) => tasks,
            Err(poisoned) => poisoned.into_inner(),
        };
        for task in tasks.drain(..) {
            task.abort();
        }
        self.aggregator.stop();
        self.registry.shutdown();
        info!("Client stopped");
    }
}
