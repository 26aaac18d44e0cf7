//! Confirmation-depth tracking for submitted transactions
//!
//! Different chains need different depths before a transaction is treated as final:
//! - Ethereum: Probabilistic (32 blocks for practical finality, ~6 min)
//! - Polygon: Probabilistic (128 blocks)
//! - Arbitrum / Optimism / Base: soft finality from the sequencer
//! - Avalanche: Instant finality (1 block)

use crate::chain::{ChainId, ChainReader};
use crate::error::ClientResult;
use crate::tx::TxHash;

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How a watched transaction ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchOutcome {
    Confirmed { block_number: u64, confirmations: u64 },
    Reverted,
    TimedOut,
}

/// Polls one chain until a transaction reaches its confirmation depth.
///
/// One watcher is shared by every transaction on its chain; each call to
/// [`watch`](Self::watch) runs independently with its own wait bounds.
pub struct ConfirmationWatcher {
    chain: ChainId,
    /// Required confirmation blocks
    confirmation_blocks: u64,
    /// Blocks to wait for a receipt before giving up
    timeout_blocks: u64,
    poll_interval: Duration,
    max_wait: Duration,
    reader: Arc<dyn ChainReader>,
}

impl ConfirmationWatcher {
    pub fn new(chain: ChainId, confirmation_blocks: u64, reader: Arc<dyn ChainReader>) -> Self {
        Self {
            chain,
            confirmation_blocks: confirmation_blocks.max(1),
            timeout_blocks: 250,
            poll_interval: Duration::from_secs(4),
            max_wait: Duration::from_secs(3_600),
            reader,
        }
    }

    /// Override polling cadence and wait bounds
    pub fn with_limits(mut self, poll_interval: Duration, timeout_blocks: u64, max_wait: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.timeout_blocks = timeout_blocks;
        self.max_wait = max_wait;
        self
    }

    pub fn chain(&self) -> ChainId {
        self.chain
    }

    pub fn confirmation_blocks(&self) -> u64 {
        self.confirmation_blocks
    }

    /// Wait until `hash` is confirmed, reverted, or a wait bound is hit.
    ///
    /// The block-count bound starts from the chain height seen on the first
    /// successful poll, so a resumed watch waits from the current chain state.
    pub async fn watch(&self, hash: &TxHash) -> WatchOutcome {
        match tokio::time::timeout(self.max_wait, self.poll_until_settled(hash)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(
                    "Gave up on {} on chain {} after {:?}",
                    hash, self.chain, self.max_wait
                );
                WatchOutcome::TimedOut
            }
        }
    }

    async fn poll_until_settled(&self, hash: &TxHash) -> WatchOutcome {
        let mut start_block = None;

        loop {
            match self.check(hash, &mut start_block).await {
                Ok(Some(outcome)) => return outcome,
                Ok(None) => {}
                Err(e) => {
                    // RPC faults are transient here; the wait bounds still apply
                    warn!("Confirmation check for {} failed: {}", hash, e);
                }
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Run one polling step. Returns `None` while the transaction is still pending.
    pub async fn check(
        &self,
        hash: &TxHash,
        start_block: &mut Option<u64>,
    ) -> ClientResult<Option<WatchOutcome>> {
        let current_block = self.reader.get_block_number().await?;
        let start = *start_block.get_or_insert(current_block);

        match self.reader.get_receipt(hash).await? {
            Some(receipt) if !receipt.success => {
                warn!("Transaction {} reverted on chain {}", hash, self.chain);
                Ok(Some(WatchOutcome::Reverted))
            }
            Some(receipt) => {
                let confirmations = current_block.saturating_sub(receipt.block_number) + 1;

                if confirmations < self.confirmation_blocks {
                    debug!(
                        "Transaction {} has {} / {} confirmations on chain {}",
                        hash, confirmations, self.confirmation_blocks, self.chain
                    );
                    return Ok(None);
                }

                // Verify the transaction is still included (reorg protection)
                if !self.verify_inclusion(hash).await? {
                    warn!(
                        "Reorg detected: tx {} no longer included on chain {}",
                        hash, self.chain
                    );
                    return Ok(None);
                }

                info!(
                    "Transaction {} confirmed on chain {} ({} confirmations)",
                    hash, self.chain, confirmations
                );
                Ok(Some(WatchOutcome::Confirmed {
                    block_number: receipt.block_number,
                    confirmations,
                }))
            }
            None => {
                let waited = current_block.saturating_sub(start);
                if waited >= self.timeout_blocks {
                    warn!(
                        "No receipt for {} on chain {} after {} blocks",
                        hash, self.chain, waited
                    );
                    return Ok(Some(WatchOutcome::TimedOut));
                }
                debug!("Transaction {} not mined yet on chain {}", hash, self.chain);
                Ok(None)
            }
        }
    }

    /// Verify a transaction is still included in the chain
    async fn verify_inclusion(&self, hash: &TxHash) -> ClientResult<bool> {
        match self.reader.get_receipt(hash).await? {
            Some(receipt) => Ok(receipt.success),
            None => Ok(false),
        }
    }
}

/// Get recommended confirmation blocks for a chain
pub fn recommended_confirmations(chain_id: u64) -> u64 {
    match chain_id {
        // Ethereum mainnet
        1 => 32,
        // Ethereum testnets
        11155111 | 5 => 12,
        // Polygon mainnet
        137 => 128,
        // Polygon testnets
        80001 | 80002 => 32,
        // Arbitrum
        42161 | 421614 => 64,
        // Optimism
        10 | 11155420 => 64,
        // Base
        8453 | 84532 => 64,
        // Avalanche (instant finality)
        43114 | 43113 => 1,
        // Aurora
        1313161554 => 5,
        // Solana clusters: finalized commitment
        101..=103 => 1,
        // Default conservative
        _ => 64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeChain;

    fn watcher(chain: Arc<FakeChain>, depth: u64) -> ConfirmationWatcher {
        ConfirmationWatcher::new(ChainId::Network(1), depth, chain).with_limits(
            Duration::from_millis(5),
            10,
            Duration::from_secs(2),
        )
    }

    #[tokio::test]
    async fn test_waits_for_depth() {
        let chain = Arc::new(FakeChain::at_block(100));
        let hash = TxHash::new("0xabc");
        chain.mine(&hash, 100, true);
        let watcher = watcher(chain.clone(), 5);

        let mut start = None;
        assert_eq!(watcher.check(&hash, &mut start).await.unwrap(), None);

        chain.advance(4);
        assert_eq!(
            watcher.check(&hash, &mut start).await.unwrap(),
            Some(WatchOutcome::Confirmed {
                block_number: 100,
                confirmations: 5
            })
        );
    }

    #[tokio::test]
    async fn test_reverted_receipt() {
        let chain = Arc::new(FakeChain::at_block(10));
        let hash = TxHash::new("0xdead");
        chain.mine(&hash, 9, false);

        assert_eq!(watcher(chain, 1).watch(&hash).await, WatchOutcome::Reverted);
    }

    #[tokio::test]
    async fn test_block_bound_counts_from_first_poll() {
        let chain = Arc::new(FakeChain::at_block(1_000));
        let hash = TxHash::new("0xdropped");
        let watcher = watcher(chain.clone(), 1);

        let mut start = None;
        assert_eq!(watcher.check(&hash, &mut start).await.unwrap(), None);
        assert_eq!(start, Some(1_000));

        chain.advance(9);
        assert_eq!(watcher.check(&hash, &mut start).await.unwrap(), None);
        chain.advance(1);
        assert_eq!(
            watcher.check(&hash, &mut start).await.unwrap(),
            Some(WatchOutcome::TimedOut)
        );
    }

    #[tokio::test]
    async fn test_rpc_failures_are_bounded_by_max_wait() {
        let chain = Arc::new(FakeChain::at_block(1));
        chain.set_failing(true);
        let watcher = ConfirmationWatcher::new(ChainId::Network(1), 1, chain).with_limits(
            Duration::from_millis(5),
            10,
            Duration::from_millis(50),
        );

        assert_eq!(
            watcher.watch(&TxHash::new("0x1")).await,
            WatchOutcome::TimedOut
        );
    }

    #[test]
    fn test_recommended_confirmations() {
        assert_eq!(recommended_confirmations(1), 32);
        assert_eq!(recommended_confirmations(43114), 1);
        assert_eq!(recommended_confirmations(999_999), 64);
    }
}
