//! Durable key-value state
//!
//! Handles:
//! - The per-account, per-chain pending transaction ledger
//! - The last used wallet for session restore
//!
//! Values are opaque bytes; callers serialize with serde_json.

mod file;
mod postgres;

pub use file::FileStore;
pub use postgres::PgStore;

use crate::chain::ChainId;
use crate::config::{StorageBackend, StorageConfig};
use crate::error::{ClientError, ClientResult};
use crate::wallet::Account;

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::info;

/// Durable storage capability
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn load(&self, key: &str) -> ClientResult<Option<Vec<u8>>>;

    async fn save(&self, key: &str, value: &[u8]) -> ClientResult<()>;
}

/// In-process store; contents are lost on exit
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn load(&self, key: &str) -> ClientResult<Option<Vec<u8>>> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    async fn save(&self, key: &str, value: &[u8]) -> ClientResult<()> {
        self.entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }
}

/// Open the backend named in the storage config
pub async fn open_store(config: &StorageConfig) -> ClientResult<Arc<dyn KeyValueStore>> {
    match config.backend {
        StorageBackend::Memory => {
            info!("Using in-memory state store");
            Ok(Arc::new(MemoryStore::new()))
        }
        StorageBackend::File => {
            let path = config.path.as_deref().ok_or_else(|| {
                ClientError::Config("storage.path is required for the file backend".to_string())
            })?;
            info!("Using file state store at {}", path);
            Ok(Arc::new(FileStore::open(path).await?))
        }
        StorageBackend::Postgres => {
            let url = config.url.as_deref().ok_or_else(|| {
                ClientError::Config("storage.url is required for the postgres backend".to_string())
            })?;
            let store = PgStore::new(url, config.max_connections).await?;
            store.run_migrations().await?;
            info!("Using PostgreSQL state store");
            Ok(Arc::new(store))
        }
    }
}

/// Ledger key for one (account, chain) scope
pub fn pending_transactions_key(account: &Account, chain: ChainId) -> String {
    format!("pending_transactions/{}/{}", account, u64::from(chain))
}
