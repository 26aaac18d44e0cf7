//! Error types for the vaultlink client

use crate::chain::ChainId;
use crate::wallet::WalletProviderKind;

use ethers::types::U256;
use thiserror::Error;

/// Main error type for the client
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Request rejected in wallet")]
    UserRejected,

    #[error("Wallet provider {kind} unavailable: {message}")]
    ProviderUnavailable {
        kind: WalletProviderKind,
        message: String,
    },

    #[error("Wallet provider error: {0}")]
    Provider(String),

    #[error("Chain {chain} is not supported")]
    UnsupportedChain { chain: ChainId },

    #[error("Wallet {kind} is not offered on chain {chain}")]
    WalletNotSupported {
        kind: WalletProviderKind,
        chain: ChainId,
    },

    #[error("No wallet connected")]
    NoWalletConnected,

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Transaction {hash} not found")]
    TransactionNotFound { hash: String },

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Chain connection error for chain {chain}: {message}")]
    ChainConnection { chain: ChainId, message: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ClientError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClientError::ProviderUnavailable { .. }
                | ClientError::Provider(_)
                | ClientError::ChainConnection { .. }
                | ClientError::Storage(_)
        )
    }

    /// Programming or configuration errors: fail the operation, never retry
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ClientError::UnsupportedChain { .. }
                | ClientError::WalletNotSupported { .. }
                | ClientError::InvalidState(_)
                | ClientError::Config(_)
                | ClientError::Internal(_)
        )
    }

    /// Stable status name, distinct per variant
    pub fn kind(&self) -> &'static str {
        match self {
            ClientError::UserRejected => "user_rejected",
            ClientError::ProviderUnavailable { .. } => "provider_unavailable",
            ClientError::Provider(_) => "provider_error",
            ClientError::UnsupportedChain { .. } => "unsupported_chain",
            ClientError::WalletNotSupported { .. } => "wallet_not_supported",
            ClientError::NoWalletConnected => "no_wallet_connected",
            ClientError::InvalidState(_) => "invalid_state",
            ClientError::TransactionNotFound { .. } => "transaction_not_found",
            ClientError::Validation(e) => e.kind(),
            ClientError::ChainConnection { .. } => "chain_connection",
            ClientError::Storage(_) => "storage_error",
            ClientError::Database(_) => "database_error",
            ClientError::Serialization(_) => "serialization_error",
            ClientError::Config(_) => "config_error",
            ClientError::Internal(_) => "internal_error",
        }
    }
}

/// Input validation failures shown on the action form.
///
/// These never block typing; they only keep the flow from leaving `Form`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Amount must be greater than 0")]
    ZeroAmount,

    #[error("Insufficient balance: have {available}, need {requested}")]
    InsufficientBalance { available: U256, requested: U256 },

    #[error("Vault capacity exceeded: {remaining} remaining, need {requested}")]
    CapacityExceeded { remaining: U256, requested: U256 },

    #[error("Data from {source_name} is unavailable")]
    DataUnavailable { source_name: &'static str },
}

impl ValidationError {
    pub fn kind(&self) -> &'static str {
        match self {
            ValidationError::InvalidAmount(_) => "invalid_amount",
            ValidationError::ZeroAmount => "zero_amount",
            ValidationError::InsufficientBalance { .. } => "insufficient_balance",
            ValidationError::CapacityExceeded { .. } => "capacity_exceeded",
            ValidationError::DataUnavailable { .. } => "data_unavailable",
        }
    }
}

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(ClientError::Provider("boom".into()).is_retryable());
        assert!(!ClientError::UserRejected.is_retryable());
        assert!(ClientError::UnsupportedChain { chain: ChainId::Network(5) }.is_fatal());
        assert!(!ClientError::NoWalletConnected.is_fatal());
    }

    #[test]
    fn test_kinds_are_distinct() {
        let errors = vec![
            ClientError::UserRejected,
            ClientError::ProviderUnavailable {
                kind: WalletProviderKind::Metamask,
                message: "timeout".into(),
            },
            ClientError::Provider("boom".into()),
            ClientError::UnsupportedChain { chain: ChainId::Network(5) },
            ClientError::WalletNotSupported {
                kind: WalletProviderKind::Phantom,
                chain: ChainId::Network(1),
            },
            ClientError::NoWalletConnected,
            ClientError::InvalidState("moved".into()),
            ClientError::TransactionNotFound { hash: "0x1".into() },
            ClientError::Validation(ValidationError::ZeroAmount),
            ClientError::ChainConnection {
                chain: ChainId::Network(1),
                message: "down".into(),
            },
            ClientError::Storage("disk".into()),
            ClientError::Config("bad".into()),
            ClientError::Internal("bug".into()),
        ];
        let kinds: std::collections::HashSet<_> = errors.iter().map(|e| e.kind()).collect();
        assert_eq!(kinds.len(), errors.len());
    }

    #[test]
    fn test_validation_kind_passes_through() {
        let err: ClientError = ValidationError::InsufficientBalance {
            available: U256::from(1),
            requested: U256::from(2),
        }
        .into();
        assert_eq!(err.kind(), "insufficient_balance");
        assert_eq!(
            err.to_string(),
            "Validation failed: Insufficient balance: have 1, need 2"
        );
    }
}
