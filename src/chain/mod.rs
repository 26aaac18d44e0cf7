//! Chain module - network selection and chain reads
//!
//! This module provides:
//! - The active-chain session (selection, wallet-driven switching)
//! - Receipt and block-height reads behind the `ChainReader` capability
//! - Multi-RPC reader with automatic failover
//! - Confirmation-depth watching for submitted transactions

pub mod finality;
pub mod provider;
pub mod session;

pub use finality::{recommended_confirmations, ConfirmationWatcher, WatchOutcome};
pub use provider::RpcChainReader;
pub use session::ChainSessionManager;

use crate::error::ClientResult;
use crate::tx::TxHash;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a supported network. `Unselected` is a valid value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "u64", into = "u64")]
pub enum ChainId {
    Unselected,
    Network(u64),
}

impl ChainId {
    pub fn is_selected(&self) -> bool {
        matches!(self, ChainId::Network(_))
    }
}

impl Default for ChainId {
    fn default() -> Self {
        ChainId::Unselected
    }
}

impl From<u64> for ChainId {
    fn from(id: u64) -> Self {
        match id {
            0 => ChainId::Unselected,
            id => ChainId::Network(id),
        }
    }
}

impl From<ChainId> for u64 {
    fn from(chain: ChainId) -> Self {
        match chain {
            ChainId::Unselected => 0,
            ChainId::Network(id) => id,
        }
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainId::Unselected => write!(f, "unselected"),
            ChainId::Network(id) => write!(f, "{}", id),
        }
    }
}

/// Mined transaction receipt, reduced to what confirmation tracking needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Receipt {
    pub block_number: u64,
    pub success: bool,
}

/// Read access to a chain, used by the confirmation watcher
#[async_trait]
pub trait ChainReader: Send + Sync {
    /// Receipt for a mined transaction; `None` while it is not mined
    async fn get_receipt(&self, hash: &TxHash) -> ClientResult<Option<Receipt>>;

    async fn get_block_number(&self) -> ClientResult<u64>;
}
