//! vaultlink - client-side orchestration for multi-chain vault applications
//!
//! Tracks which wallet and chain are active, submits and follows signed
//! transactions until they settle, and merges independently polled on-chain
//! data into one consistent snapshot for the presentation layer.

pub mod chain;
pub mod config;
pub mod data;
pub mod error;
pub mod events;
pub mod flow;
pub mod metrics;
pub mod orchestrator;
pub mod state;
pub mod telemetry;
pub mod tx;
pub mod wallet;

#[cfg(test)]
pub(crate) mod testing;

pub use chain::{ChainId, ChainReader, ChainSessionManager};
pub use config::Settings;
pub use data::{AggregatedContext, DataSource, DataSourceAggregator, DataSourceState};
pub use error::{ClientError, ClientResult, ValidationError};
pub use events::ClientEvent;
pub use flow::{ActionKind, ActionParams, FlowStep, TransactionActionFlow};
pub use orchestrator::{Orchestrator, OrchestratorBuilder};
pub use state::KeyValueStore;
pub use tx::{PendingTransaction, PendingTransactionRegistry, TxHash, TxStatus};
pub use wallet::{WalletConnectionManager, WalletProvider, WalletProviderKind, WalletSession};
