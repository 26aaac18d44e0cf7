//! Wallet connection manager
//!
//! Only the most recent `connect` request may change the session: every
//! request takes a new generation number, and a resolution whose generation
//! is no longer current is dropped.

use super::{Account, TxRequest, WalletProvider, WalletProviderKind, WalletSession};
use crate::chain::{ChainId, ChainSessionManager};
use crate::error::{ClientError, ClientResult};
use crate::events::ClientEvent;
use crate::state::KeyValueStore;
use crate::tx::TxHash;

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

const LAST_WALLET_KEY: &str = "session/last_wallet";

/// Result of a `connect` call that did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    Connected(Account),
    /// A later request (or a disconnect) replaced this one; nothing was applied
    Superseded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LastWallet {
    kind: WalletProviderKind,
    chain: ChainId,
}

/// Tracks which wallet is connected and drives connect/disconnect
pub struct WalletConnectionManager {
    provider: Arc<dyn WalletProvider>,
    chains: Arc<ChainSessionManager>,
    session: watch::Sender<WalletSession>,
    /// Bumped by every connect/disconnect; guards against stale resolutions
    generation: AtomicU64,
    connect_timeout: Duration,
    store: Arc<dyn KeyValueStore>,
    events: broadcast::Sender<ClientEvent>,
}

impl WalletConnectionManager {
    pub fn new(
        provider: Arc<dyn WalletProvider>,
        chains: Arc<ChainSessionManager>,
        store: Arc<dyn KeyValueStore>,
        events: broadcast::Sender<ClientEvent>,
        connect_timeout: Duration,
    ) -> Self {
        let (session, _) = watch::channel(WalletSession::disconnected(chains.active_chain()));
        Self {
            provider,
            chains,
            session,
            generation: AtomicU64::new(0),
            connect_timeout,
            store,
            events,
        }
    }

    pub fn session(&self) -> WalletSession {
        self.session.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<WalletSession> {
        self.session.subscribe()
    }

    pub fn chains(&self) -> &Arc<ChainSessionManager> {
        &self.chains
    }

    /// Wallet kinds offered on the active chain
    pub fn available_wallets(&self) -> &'static [WalletProviderKind] {
        self.chains.wallets_for(self.chains.active_chain())
    }

    pub fn status_for(&self, kind: WalletProviderKind) -> super::ConnectorStatus {
        self.session.borrow().status_for(kind)
    }

    /// Connect `kind` on the active chain.
    ///
    /// The session shows `Connecting(kind)` before this first suspends. Any
    /// previous session is cleared in the same step.
    pub async fn connect(&self, kind: WalletProviderKind) -> ClientResult<ConnectOutcome> {
        let chain = self.chains.active_chain();
        if !self.chains.wallets_for(chain).contains(&kind) {
            crate::metrics::record_wallet_connect(kind, "wallet_not_supported");
            return Err(ClientError::WalletNotSupported { kind, chain });
        }

        let mut generation = 0;
        self.session.send_modify(|session| {
            generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(previous) = session.provider() {
                info!("Replacing {} session with {}", previous, kind);
            }
            *session = WalletSession::connecting(kind, chain);
        });
        debug!("Connecting {} on chain {} (request {})", kind, chain, generation);

        let result = match tokio::time::timeout(self.connect_timeout, self.provider.connect(kind, chain)).await {
            Ok(result) => result,
            Err(_) => Err(ClientError::ProviderUnavailable {
                kind,
                message: format!("no response within {:?}", self.connect_timeout),
            }),
        };

        let next = match &result {
            Ok(account) => WalletSession::connected(kind, account.clone(), chain),
            Err(e) => WalletSession::failed(e.kind(), chain),
        };

        let applied = self.session.send_if_modified(|session| {
            if self.generation.load(Ordering::SeqCst) != generation {
                return false;
            }
            *session = next;
            true
        });

        if !applied {
            debug!("Discarding stale connect result for {} (request {})", kind, generation);
            crate::metrics::record_wallet_connect(kind, "superseded");
            return Ok(ConnectOutcome::Superseded);
        }

        match result {
            Ok(account) => {
                info!("Connected {} as {} on chain {}", kind, account, chain);
                crate::metrics::record_wallet_connect(kind, "success");
                let _ = self.events.send(ClientEvent::WalletConnected {
                    kind,
                    account: account.clone(),
                    chain,
                });
                self.remember(Some(LastWallet { kind, chain })).await;
                Ok(ConnectOutcome::Connected(account))
            }
            Err(e) => {
                warn!("Connecting {} failed: {}", kind, e);
                crate::metrics::record_wallet_connect(kind, e.kind());
                Err(e)
            }
        }
    }

    /// Drop the session. Idempotent; abandons any in-flight connect.
    pub async fn disconnect(&self) {
        let mut was_active = false;
        self.session.send_modify(|session| {
            self.generation.fetch_add(1, Ordering::SeqCst);
            was_active = session.is_connected() || session.connecting_kind().is_some();
            *session = WalletSession::disconnected(session.chain());
        });

        if was_active {
            info!("Wallet disconnected");
            let _ = self.events.send(ClientEvent::WalletDisconnected {
                chain: self.chains.active_chain(),
            });
            self.remember(None).await;
        }
    }

    /// Pick the chain before connecting a wallet
    pub fn select_chain(&self, target: ChainId) -> ClientResult<()> {
        self.chains.select(target, &self.session())?;
        self.on_chain_changed(target);
        Ok(())
    }

    /// Ask the connected wallet to switch chains, then follow the new chain
    pub async fn request_chain_switch(&self, target: ChainId) -> ClientResult<()> {
        self.chains.request_switch(target, &self.session()).await?;
        self.on_chain_changed(self.chains.active_chain());
        Ok(())
    }

    /// Re-derive the session for a new active chain.
    ///
    /// A connected wallet that the new chain does not offer is disconnected;
    /// an in-flight connect for the old chain is abandoned.
    pub fn on_chain_changed(&self, chain: ChainId) {
        let offered = self.chains.wallets_for(chain);
        self.session.send_if_modified(|session| {
            if session.chain() == chain {
                return false;
            }

            let keep = session.provider().map(|kind| offered.contains(&kind));
            *session = match keep {
                Some(true) => session.with_chain(chain),
                Some(false) => {
                    info!("Disconnecting wallet not offered on chain {}", chain);
                    self.generation.fetch_add(1, Ordering::SeqCst);
                    WalletSession::disconnected(chain)
                }
                None => {
                    if session.connecting_kind().is_some() {
                        self.generation.fetch_add(1, Ordering::SeqCst);
                    }
                    WalletSession::disconnected(chain)
                }
            };
            true
        });
    }

    /// Sign and broadcast through the connected wallet
    pub async fn sign_and_send(&self, request: &TxRequest) -> ClientResult<TxHash> {
        let session = self.session();
        match session.account() {
            Some(account) if *account == request.from => {}
            Some(_) => {
                return Err(ClientError::InvalidState(
                    "Request is not from the connected account".to_string(),
                ))
            }
            None => return Err(ClientError::NoWalletConnected),
        }
        if session.chain() != request.chain {
            return Err(ClientError::InvalidState(format!(
                "Request targets chain {} but wallet is on {}",
                request.chain,
                session.chain()
            )));
        }

        self.provider.sign_and_send(request).await
    }

    /// Reconnect the last used wallet, if one was remembered
    pub async fn restore(&self) -> ClientResult<Option<ConnectOutcome>> {
        let last: Option<LastWallet> = match self.store.load(LAST_WALLET_KEY).await? {
            Some(bytes) => serde_json::from_slice(&bytes)?,
            None => None,
        };
        let Some(last) = last else {
            return Ok(None);
        };

        if !self.chains.is_enabled(last.chain) {
            warn!("Last used chain {} is no longer enabled", last.chain);
            return Ok(None);
        }
        if self.chains.active_chain() != last.chain {
            self.select_chain(last.chain)?;
        }

        info!("Restoring {} session on chain {}", last.kind, last.chain);
        self.connect(last.kind).await.map(Some)
    }

    async fn remember(&self, last: Option<LastWallet>) {
        let result = match serde_json::to_vec(&last) {
            Ok(bytes) => self.store.save(LAST_WALLET_KEY, &bytes).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            warn!("Failed to persist last used wallet: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::MemoryStore;
    use crate::testing::{chain_configs, FakeWallet};
    use crate::tx::{TransactionKind, TxSubject};
    use crate::wallet::{ConnectionState, ConnectorStatus, MockWalletProvider};
    use ethers::types::U256;

    fn build(provider: Arc<dyn WalletProvider>, store: Arc<MemoryStore>) -> WalletConnectionManager {
        build_with_timeout(provider, store, Duration::from_secs(2))
    }

    fn build_with_timeout(
        provider: Arc<dyn WalletProvider>,
        store: Arc<MemoryStore>,
        connect_timeout: Duration,
    ) -> WalletConnectionManager {
        let (events, _) = broadcast::channel(64);
        let chains = Arc::new(ChainSessionManager::from_chains(
            chain_configs(),
            ChainId::Network(1),
            provider.clone(),
            events.clone(),
        ));
        WalletConnectionManager::new(provider, chains, store, events, connect_timeout)
    }

    #[tokio::test]
    async fn test_connect_shows_progress_then_connects() {
        let wallet = Arc::new(FakeWallet::new());
        let gate = wallet.hold(WalletProviderKind::Metamask);
        let manager = Arc::new(build(wallet, Arc::new(MemoryStore::new())));

        let task = tokio::spawn({
            let manager = manager.clone();
            async move { manager.connect(WalletProviderKind::Metamask).await }
        });

        let mut rx = manager.subscribe();
        rx.wait_for(|s| s.connecting_kind().is_some()).await.unwrap();
        assert_eq!(
            manager.status_for(WalletProviderKind::Metamask),
            ConnectorStatus::Initializing
        );
        assert_eq!(
            manager.status_for(WalletProviderKind::WalletLink),
            ConnectorStatus::Neglected
        );

        gate.notify_one();
        let outcome = task.await.unwrap().unwrap();
        assert_eq!(outcome, ConnectOutcome::Connected(FakeWallet::account_for(WalletProviderKind::Metamask)));
        assert!(matches!(manager.session().state(), ConnectionState::Connected(WalletProviderKind::Metamask, _)));
    }

    #[tokio::test]
    async fn test_later_connect_wins() {
        let wallet = Arc::new(FakeWallet::new());
        let gate_a = wallet.hold(WalletProviderKind::Metamask);
        let manager = Arc::new(build(wallet, Arc::new(MemoryStore::new())));

        let first = tokio::spawn({
            let manager = manager.clone();
            async move { manager.connect(WalletProviderKind::Metamask).await }
        });
        let mut rx = manager.subscribe();
        rx.wait_for(|s| s.connecting_kind() == Some(WalletProviderKind::Metamask))
            .await
            .unwrap();

        let second = manager.connect(WalletProviderKind::WalletConnect).await.unwrap();
        assert!(matches!(second, ConnectOutcome::Connected(_)));

        // First attempt resolves late and must not be applied
        gate_a.notify_one();
        assert_eq!(first.await.unwrap().unwrap(), ConnectOutcome::Superseded);

        let session = manager.session();
        assert_eq!(session.provider(), Some(WalletProviderKind::WalletConnect));
        assert_eq!(
            session.account(),
            Some(&FakeWallet::account_for(WalletProviderKind::WalletConnect))
        );
        assert_eq!(session.connecting_kind(), None);
    }

    #[tokio::test]
    async fn test_rejection_sets_error_state() {
        let mut mock = MockWalletProvider::new();
        mock.expect_connect()
            .returning(|_, _| Err(ClientError::UserRejected));
        let manager = build(Arc::new(mock), Arc::new(MemoryStore::new()));

        let err = manager.connect(WalletProviderKind::Metamask).await.unwrap_err();
        assert!(matches!(err, ClientError::UserRejected));
        assert_eq!(manager.session().state(), ConnectionState::Error("user_rejected"));
        assert!(manager.session().account().is_none());
    }

    #[tokio::test]
    async fn test_unanswered_connect_times_out() {
        let wallet = Arc::new(FakeWallet::new());
        let _gate = wallet.hold(WalletProviderKind::Metamask);
        let manager = build_with_timeout(
            wallet,
            Arc::new(MemoryStore::new()),
            Duration::from_millis(50),
        );

        let err = manager.connect(WalletProviderKind::Metamask).await.unwrap_err();
        assert!(matches!(err, ClientError::ProviderUnavailable { kind: WalletProviderKind::Metamask, .. }));
        assert_eq!(
            manager.session().state(),
            ConnectionState::Error("provider_unavailable")
        );
        assert!(manager.session().account().is_none());
    }

    #[tokio::test]
    async fn test_chain_change_abandons_inflight_connect() {
        let wallet = Arc::new(FakeWallet::new());
        let gate = wallet.hold(WalletProviderKind::Metamask);
        let manager = Arc::new(build(wallet, Arc::new(MemoryStore::new())));

        let pending = tokio::spawn({
            let manager = manager.clone();
            async move { manager.connect(WalletProviderKind::Metamask).await }
        });
        let mut rx = manager.subscribe();
        rx.wait_for(|s| s.connecting_kind().is_some()).await.unwrap();

        manager.select_chain(ChainId::Network(43114)).unwrap();
        assert_eq!(manager.session().state(), ConnectionState::Disconnected);

        gate.notify_one();
        assert_eq!(pending.await.unwrap().unwrap(), ConnectOutcome::Superseded);
        let session = manager.session();
        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert_eq!(session.chain(), ChainId::Network(43114));
    }

    #[tokio::test]
    async fn test_wallet_not_offered_on_chain() {
        let manager = build(Arc::new(FakeWallet::new()), Arc::new(MemoryStore::new()));
        let err = manager.connect(WalletProviderKind::Phantom).await.unwrap_err();
        assert!(matches!(err, ClientError::WalletNotSupported { .. }));
        assert_eq!(manager.session().state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent_and_abandons_connect() {
        let wallet = Arc::new(FakeWallet::new());
        let gate = wallet.hold(WalletProviderKind::Metamask);
        let manager = Arc::new(build(wallet, Arc::new(MemoryStore::new())));

        let pending = tokio::spawn({
            let manager = manager.clone();
            async move { manager.connect(WalletProviderKind::Metamask).await }
        });
        let mut rx = manager.subscribe();
        rx.wait_for(|s| s.connecting_kind().is_some()).await.unwrap();

        manager.disconnect().await;
        manager.disconnect().await;
        gate.notify_one();

        assert_eq!(pending.await.unwrap().unwrap(), ConnectOutcome::Superseded);
        assert_eq!(manager.session().state(), ConnectionState::Disconnected);
        assert_eq!(manager.session().chain(), ChainId::Network(1));
    }

    #[tokio::test]
    async fn test_chain_switch_to_other_family_disconnects() {
        let manager = build(Arc::new(FakeWallet::new()), Arc::new(MemoryStore::new()));
        manager.connect(WalletProviderKind::Metamask).await.unwrap();

        manager.request_chain_switch(ChainId::Network(43114)).await.unwrap();
        assert_eq!(manager.session().chain(), ChainId::Network(43114));
        assert!(manager.session().is_connected());

        manager.request_chain_switch(ChainId::Network(101)).await.unwrap();
        assert_eq!(manager.session().chain(), ChainId::Network(101));
        assert!(!manager.session().is_connected());
    }

    #[tokio::test]
    async fn test_restore_last_wallet() {
        let store = Arc::new(MemoryStore::new());
        let manager = build(Arc::new(FakeWallet::new()), store.clone());
        manager.select_chain(ChainId::Network(43114)).unwrap();
        manager.connect(WalletProviderKind::WalletLink).await.unwrap();

        let restored = build(Arc::new(FakeWallet::new()), store.clone());
        let outcome = restored.restore().await.unwrap();
        assert!(matches!(outcome, Some(ConnectOutcome::Connected(_))));
        assert_eq!(restored.session().chain(), ChainId::Network(43114));
        assert_eq!(restored.session().provider(), Some(WalletProviderKind::WalletLink));

        restored.disconnect().await;
        let after_disconnect = build(Arc::new(FakeWallet::new()), store);
        assert_eq!(after_disconnect.restore().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_sign_requires_connected_account() {
        let manager = build(Arc::new(FakeWallet::new()), Arc::new(MemoryStore::new()));
        let request = TxRequest {
            kind: TransactionKind::Deposit,
            chain: ChainId::Network(1),
            from: Account::new("0xuser"),
            subject: TxSubject::None,
            amount: U256::from(1),
        };

        let err = manager.sign_and_send(&request).await.unwrap_err();
        assert!(matches!(err, ClientError::NoWalletConnected));
    }
}
