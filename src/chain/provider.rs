//! Chain reader with multi-RPC support and automatic failover

use crate::chain::{ChainId, ChainReader, Receipt};
use crate::config::ChainConfig;
use crate::error::{ClientError, ClientResult};
use crate::tx::TxHash;

use async_trait::async_trait;
use ethers::prelude::*;
use ethers::providers::{Http, Provider};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, error, warn};

/// Multi-provider wrapper with automatic failover
pub struct RpcChainReader {
    chain: ChainId,
    /// HTTP providers (multiple for failover)
    http_providers: Vec<Provider<Http>>,
    /// Current active provider index
    current_provider: AtomicUsize,
    /// Last known block number
    last_block: AtomicU64,
}

impl RpcChainReader {
    /// Create a new chain reader for every configured RPC URL
    pub fn new(config: &ChainConfig) -> ClientResult<Self> {
        let mut http_providers = Vec::new();

        for url in &config.rpc_urls {
            match Provider::<Http>::try_from(url.as_str()) {
                Ok(provider) => {
                    let provider = provider.interval(Duration::from_millis(100));
                    http_providers.push(provider);
                    debug!("Added HTTP provider for chain {}: {}", config.chain_id, url);
                }
                Err(e) => {
                    warn!("Failed to create provider for {}: {}", url, e);
                }
            }
        }

        if http_providers.is_empty() {
            return Err(ClientError::ChainConnection {
                chain: config.id(),
                message: "No valid RPC providers".to_string(),
            });
        }

        Ok(Self {
            chain: config.id(),
            http_providers,
            current_provider: AtomicUsize::new(0),
            last_block: AtomicU64::new(0),
        })
    }

    /// Get the active HTTP provider
    pub fn http(&self) -> &Provider<Http> {
        let idx = self.current_provider.load(Ordering::Relaxed);
        &self.http_providers[idx % self.http_providers.len()]
    }

    /// Switch to next available provider
    pub fn failover(&self) {
        let current = self.current_provider.load(Ordering::Relaxed);
        let next = (current + 1) % self.http_providers.len();
        self.current_provider.store(next, Ordering::Relaxed);
        warn!("Chain {} failover to provider {}", self.chain, next);
    }

    /// Last block height seen by this reader
    pub fn last_block(&self) -> u64 {
        self.last_block.load(Ordering::Relaxed)
    }

    /// Health check
    pub async fn health_check(&self) -> bool {
        match self.get_block_number().await {
            Ok(_) => true,
            Err(e) => {
                error!("Health check failed for chain {}: {}", self.chain, e);
                false
            }
        }
    }
}

#[async_trait]
impl ChainReader for RpcChainReader {
    async fn get_receipt(&self, hash: &TxHash) -> ClientResult<Option<Receipt>> {
        let tx_hash = H256::from_str(hash.as_str()).map_err(|e| {
            ClientError::InvalidState(format!("Malformed transaction hash {}: {}", hash, e))
        })?;

        for _ in 0..self.http_providers.len() {
            match self.http().get_transaction_receipt(tx_hash).await {
                Ok(receipt) => {
                    // A receipt without a block number is still pending
                    return Ok(receipt.and_then(|r| {
                        r.block_number.map(|block| Receipt {
                            block_number: block.as_u64(),
                            success: r.status == Some(1.into()),
                        })
                    }));
                }
                Err(e) => {
                    warn!(
                        "Failed to get receipt for {} from chain {}: {}",
                        hash, self.chain, e
                    );
                    self.failover();
                }
            }
        }

        Err(ClientError::ChainConnection {
            chain: self.chain,
            message: "All providers failed to get receipt".to_string(),
        })
    }

    /// Get current block number with failover
    async fn get_block_number(&self) -> ClientResult<u64> {
        for _ in 0..self.http_providers.len() {
            match self.http().get_block_number().await {
                Ok(block) => {
                    let block_num = block.as_u64();
                    self.last_block.store(block_num, Ordering::Relaxed);
                    return Ok(block_num);
                }
                Err(e) => {
                    warn!(
                        "Failed to get block number from chain {}: {}",
                        self.chain, e
                    );
                    self.failover();
                }
            }
        }

        Err(ClientError::ChainConnection {
            chain: self.chain,
            message: "All providers failed".to_string(),
        })
    }
}
