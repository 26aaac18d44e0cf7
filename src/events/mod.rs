//! Client events
//!
//! Lifecycle notifications broadcast by the managers. Subscribers receive
//! owned copies; a slow subscriber lags without blocking publishers.

use crate::chain::ChainId;
use crate::tx::{TransactionKind, TxHash, TxStatus};
use crate::wallet::{Account, WalletProviderKind};

use serde::Serialize;
use tokio::sync::broadcast;

/// Buffered events per subscriber before it starts lagging
pub const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ClientEvent {
    WalletConnected {
        kind: WalletProviderKind,
        account: Account,
        chain: ChainId,
    },

    WalletDisconnected {
        chain: ChainId,
    },

    ChainChanged {
        from: ChainId,
        to: ChainId,
    },

    TransactionAdded {
        hash: TxHash,
        kind: TransactionKind,
        chain: ChainId,
    },

    /// A pending transaction reached Success or Error
    TransactionSettled {
        hash: TxHash,
        status: TxStatus,
        chain: ChainId,
    },

    /// A data source fetch failed; the slot keeps its previous data
    SourceFailed {
        source_name: &'static str,
        message: String,
    },
}

impl ClientEvent {
    /// Get event name for metrics
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::WalletConnected { .. } => "wallet_connected",
            ClientEvent::WalletDisconnected { .. } => "wallet_disconnected",
            ClientEvent::ChainChanged { .. } => "chain_changed",
            ClientEvent::TransactionAdded { .. } => "transaction_added",
            ClientEvent::TransactionSettled { .. } => "transaction_settled",
            ClientEvent::SourceFailed { .. } => "source_failed",
        }
    }

    /// Chain the event concerns, if any
    pub fn chain(&self) -> Option<ChainId> {
        match self {
            ClientEvent::WalletConnected { chain, .. }
            | ClientEvent::WalletDisconnected { chain }
            | ClientEvent::TransactionAdded { chain, .. }
            | ClientEvent::TransactionSettled { chain, .. } => Some(*chain),
            ClientEvent::ChainChanged { to, .. } => Some(*to),
            ClientEvent::SourceFailed { .. } => None,
        }
    }
}

pub fn channel() -> broadcast::Sender<ClientEvent> {
    broadcast::channel(EVENT_CAPACITY).0
}
