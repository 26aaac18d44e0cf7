//! Wallet module - provider capability, session state and connection management
//!
//! Key custody and signing live in the external wallet; this module only
//! tracks which wallet is connected, for which account and chain.

pub mod connection;

pub use connection::{ConnectOutcome, WalletConnectionManager};

use crate::chain::ChainId;
use crate::config::ChainFamily;
use crate::error::ClientResult;
use crate::tx::{TransactionKind, TxHash, TxSubject};

use async_trait::async_trait;
use ethers::types::U256;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Wallets the application can connect to; each chain family offers a subset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalletProviderKind {
    Metamask,
    WalletConnect,
    WalletLink,
    Phantom,
    Solflare,
}

const EVM_WALLETS: [WalletProviderKind; 3] = [
    WalletProviderKind::Metamask,
    WalletProviderKind::WalletConnect,
    WalletProviderKind::WalletLink,
];

const SOLANA_WALLETS: [WalletProviderKind; 2] =
    [WalletProviderKind::Phantom, WalletProviderKind::Solflare];

impl WalletProviderKind {
    pub fn family(&self) -> ChainFamily {
        match self {
            WalletProviderKind::Metamask
            | WalletProviderKind::WalletConnect
            | WalletProviderKind::WalletLink => ChainFamily::Evm,
            WalletProviderKind::Phantom | WalletProviderKind::Solflare => ChainFamily::Solana,
        }
    }

    pub fn for_family(family: ChainFamily) -> &'static [WalletProviderKind] {
        match family {
            ChainFamily::Evm => &EVM_WALLETS,
            ChainFamily::Solana => &SOLANA_WALLETS,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            WalletProviderKind::Metamask => "metamask",
            WalletProviderKind::WalletConnect => "walletconnect",
            WalletProviderKind::WalletLink => "walletlink",
            WalletProviderKind::Phantom => "phantom",
            WalletProviderKind::Solflare => "solflare",
        }
    }
}

impl fmt::Display for WalletProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Account address as reported by the wallet (hex for EVM, base58 for Solana)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Account(String);

impl Account {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What the wallet is asked to sign and broadcast
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxRequest {
    pub kind: TransactionKind,
    pub chain: ChainId,
    pub from: Account,
    pub subject: TxSubject,
    /// Base units of the asset
    pub amount: U256,
}

/// External wallet capability. Every call may fail with `UserRejected`,
/// `ProviderUnavailable` or `Provider`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WalletProvider: Send + Sync {
    async fn connect(&self, kind: WalletProviderKind, chain: ChainId) -> ClientResult<Account>;

    async fn sign_and_send(&self, request: &TxRequest) -> ClientResult<TxHash>;

    async fn switch_chain(&self, target: ChainId) -> ClientResult<()>;
}

/// Snapshot of the wallet connection.
///
/// The connected provider and its account are stored together, so an account
/// can never exist without a provider or the other way round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletSession {
    connected: Option<(WalletProviderKind, Account)>,
    connecting: Option<WalletProviderKind>,
    chain: ChainId,
    error: Option<&'static str>,
}

impl WalletSession {
    pub fn disconnected(chain: ChainId) -> Self {
        Self {
            connected: None,
            connecting: None,
            chain,
            error: None,
        }
    }

    pub fn connecting(kind: WalletProviderKind, chain: ChainId) -> Self {
        Self {
            connecting: Some(kind),
            ..Self::disconnected(chain)
        }
    }

    pub fn connected(kind: WalletProviderKind, account: Account, chain: ChainId) -> Self {
        Self {
            connected: Some((kind, account)),
            ..Self::disconnected(chain)
        }
    }

    pub fn failed(error: &'static str, chain: ChainId) -> Self {
        Self {
            error: Some(error),
            ..Self::disconnected(chain)
        }
    }

    pub fn provider(&self) -> Option<WalletProviderKind> {
        self.connected.as_ref().map(|(kind, _)| *kind)
    }

    pub fn account(&self) -> Option<&Account> {
        self.connected.as_ref().map(|(_, account)| account)
    }

    pub fn connecting_kind(&self) -> Option<WalletProviderKind> {
        self.connecting
    }

    pub fn chain(&self) -> ChainId {
        self.chain
    }

    /// Status name of the last failed connect, if the session ended in error
    pub fn error(&self) -> Option<&'static str> {
        self.error
    }

    pub fn is_connected(&self) -> bool {
        self.connected.is_some()
    }

    pub fn with_chain(&self, chain: ChainId) -> Self {
        Self {
            chain,
            ..self.clone()
        }
    }

    pub fn state(&self) -> ConnectionState {
        if let Some(kind) = self.connecting {
            return ConnectionState::Connecting(kind);
        }
        if let Some((kind, account)) = &self.connected {
            return ConnectionState::Connected(*kind, account.clone());
        }
        match self.error {
            Some(error) => ConnectionState::Error(error),
            None => ConnectionState::Disconnected,
        }
    }

    /// How a candidate wallet should be shown in a wallet picker
    pub fn status_for(&self, kind: WalletProviderKind) -> ConnectorStatus {
        if self.provider() == Some(kind) {
            return ConnectorStatus::Connected;
        }

        match self.connecting {
            None => ConnectorStatus::Normal,
            Some(connecting) if connecting == kind => ConnectorStatus::Initializing,
            Some(_) => ConnectorStatus::Neglected,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting(WalletProviderKind),
    Connected(WalletProviderKind, Account),
    Error(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectorStatus {
    Connected,
    Initializing,
    Neglected,
    Normal,
}
