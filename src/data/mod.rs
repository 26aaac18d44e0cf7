//! Polled on-chain data merged into one consistent snapshot
//!
//! Sources:
//! - First-generation and round-based vaults
//! - The user's asset balances
//! - Liquidity-mining and gauge staking pools
//! - Exchange-rate oracle
//! - Treasury balances

mod aggregator;
mod context;
mod models;
mod source;

pub use aggregator::DataSourceAggregator;
pub use context::{AggregatedContext, LoadStatus, SourceView, VaultView};
pub use models::{Asset, ExchangeRate, StakingPoolData, V2VaultData, VaultData, VaultId};
pub use source::{Cadence, DataSource, DataSourceState, EmptySource, FetchError, QueryContext};

use ethers::types::U256;
use std::fmt;
use std::sync::Arc;

/// Aggregator slots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceId {
    Vaults,
    V2Vaults,
    AssetBalances,
    LiquidityMining,
    LiquidityGauge,
    Oracle,
    Treasury,
}

impl SourceId {
    pub const COUNT: usize = 7;

    pub const ALL: [SourceId; SourceId::COUNT] = [
        SourceId::Vaults,
        SourceId::V2Vaults,
        SourceId::AssetBalances,
        SourceId::LiquidityMining,
        SourceId::LiquidityGauge,
        SourceId::Oracle,
        SourceId::Treasury,
    ];

    pub fn index(&self) -> usize {
        *self as usize
    }

    /// Name used in config interval overrides, metrics and events
    pub fn name(&self) -> &'static str {
        match self {
            SourceId::Vaults => "vaults",
            SourceId::V2Vaults => "v2_vaults",
            SourceId::AssetBalances => "asset_balances",
            SourceId::LiquidityMining => "liquidity_mining",
            SourceId::LiquidityGauge => "liquidity_gauge",
            SourceId::Oracle => "oracle",
            SourceId::Treasury => "treasury",
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The query behind each slot
#[derive(Clone)]
pub struct DataSources {
    pub vaults: Arc<dyn DataSource<Key = VaultId, Value = VaultData>>,
    pub v2_vaults: Arc<dyn DataSource<Key = VaultId, Value = V2VaultData>>,
    pub asset_balances: Arc<dyn DataSource<Key = Asset, Value = U256>>,
    pub liquidity_mining: Arc<dyn DataSource<Key = VaultId, Value = StakingPoolData>>,
    pub liquidity_gauge: Arc<dyn DataSource<Key = VaultId, Value = StakingPoolData>>,
    pub oracle: Arc<dyn DataSource<Key = Asset, Value = ExchangeRate>>,
    pub treasury: Arc<dyn DataSource<Key = VaultId, Value = U256>>,
}

impl Default for DataSources {
    fn default() -> Self {
        Self {
            vaults: Arc::new(EmptySource::default()),
            v2_vaults: Arc::new(EmptySource::default()),
            asset_balances: Arc::new(EmptySource::default()),
            liquidity_mining: Arc::new(EmptySource::default()),
            liquidity_gauge: Arc::new(EmptySource::default()),
            oracle: Arc::new(EmptySource::default()),
            treasury: Arc::new(EmptySource::default()),
        }
    }
}
