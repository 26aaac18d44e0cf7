//! Transaction tracking module: ledger entries and the confirmation-driven registry

mod registry;
mod types;

pub use registry::PendingTransactionRegistry;
pub use types::{PendingTransaction, TransactionKind, TxFailure, TxHash, TxStatus, TxSubject};
