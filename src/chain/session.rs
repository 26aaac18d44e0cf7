//! Active-chain session: which network the application targets

use crate::chain::ChainId;
use crate::config::{ChainConfig, ChainFamily, Settings};
use crate::error::{ClientError, ClientResult};
use crate::events::ClientEvent;
use crate::wallet::{WalletProvider, WalletProviderKind, WalletSession};

use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

/// Tracks the selected network and the set of networks the app supports
pub struct ChainSessionManager {
    /// Enabled chains
    chains: Vec<ChainConfig>,
    default_chain: ChainId,
    active: watch::Sender<ChainId>,
    provider: Arc<dyn WalletProvider>,
    events: broadcast::Sender<ClientEvent>,
}

impl ChainSessionManager {
    pub fn new(
        settings: &Settings,
        provider: Arc<dyn WalletProvider>,
        events: broadcast::Sender<ClientEvent>,
    ) -> Self {
        let mut chains: Vec<ChainConfig> = settings
            .enabled_chains()
            .into_iter()
            .map(|(_, c)| c.clone())
            .collect();
        chains.sort_by_key(|c| c.chain_id);

        Self::from_chains(chains, settings.session.default_chain, provider, events)
    }

    pub fn from_chains(
        chains: Vec<ChainConfig>,
        default_chain: ChainId,
        provider: Arc<dyn WalletProvider>,
        events: broadcast::Sender<ClientEvent>,
    ) -> Self {
        let (active, _) = watch::channel(default_chain);
        Self {
            chains,
            default_chain,
            active,
            provider,
            events,
        }
    }

    /// Currently targeted chain; the configured fallback until something is selected
    pub fn active_chain(&self) -> ChainId {
        *self.active.borrow()
    }

    pub fn default_chain(&self) -> ChainId {
        self.default_chain
    }

    pub fn subscribe(&self) -> watch::Receiver<ChainId> {
        self.active.subscribe()
    }

    pub fn enabled_chains(&self) -> &[ChainConfig] {
        &self.chains
    }

    pub fn chain_config(&self, chain: ChainId) -> Option<&ChainConfig> {
        match chain {
            ChainId::Unselected => None,
            ChainId::Network(id) => self.chains.iter().find(|c| c.chain_id == id),
        }
    }

    pub fn is_enabled(&self, chain: ChainId) -> bool {
        self.chain_config(chain).is_some()
    }

    pub fn family(&self, chain: ChainId) -> Option<ChainFamily> {
        self.chain_config(chain).map(|c| c.family)
    }

    /// Wallet kinds offered on `chain`; empty when unselected
    pub fn wallets_for(&self, chain: ChainId) -> &'static [WalletProviderKind] {
        match self.family(chain) {
            Some(family) => WalletProviderKind::for_family(family),
            None => &[],
        }
    }

    /// Pick the target network before any wallet is connected. No wallet prompt.
    pub fn select(&self, target: ChainId, session: &WalletSession) -> ClientResult<()> {
        if target.is_selected() && !self.is_enabled(target) {
            return Err(ClientError::UnsupportedChain { chain: target });
        }
        if session.is_connected() {
            return Err(ClientError::InvalidState(
                "Wallet connected; chain changes must go through the wallet".to_string(),
            ));
        }

        self.set_active(target);
        Ok(())
    }

    /// Ask the connected wallet to move to `target`
    pub async fn request_switch(&self, target: ChainId, session: &WalletSession) -> ClientResult<()> {
        if !self.is_enabled(target) {
            warn!("Refusing switch to unsupported chain {}", target);
            crate::metrics::record_chain_switch("unsupported_chain");
            return Err(ClientError::UnsupportedChain { chain: target });
        }

        if self.active_chain() == target {
            debug!("Chain {} already active", target);
            return Ok(());
        }

        if !session.is_connected() {
            crate::metrics::record_chain_switch("no_wallet_connected");
            return Err(ClientError::NoWalletConnected);
        }

        if let Err(e) = self.provider.switch_chain(target).await {
            warn!("Chain switch to {} failed: {}", target, e);
            crate::metrics::record_chain_switch(e.kind());
            return Err(e);
        }

        crate::metrics::record_chain_switch("success");
        self.set_active(target);
        Ok(())
    }

    fn set_active(&self, target: ChainId) {
        let from = self.active.send_replace(target);
        if from != target {
            info!("Active chain changed from {} to {}", from, target);
            // No receivers is fine
            let _ = self.events.send(ClientEvent::ChainChanged { from, to: target });
        }
    }
}
