//! Merged snapshot over every source, plus composite selectors

use super::models::{Asset, ExchangeRate, StakingPoolData, V2VaultData, VaultData, VaultId};
use super::source::{DataSourceState, QueryContext};
use super::SourceId;

use ethers::types::U256;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    Loading,
    Success,
}

impl LoadStatus {
    /// Loading if any contributing source is loading
    pub fn of(loading: &[bool]) -> Self {
        if loading.iter().any(|l| *l) {
            LoadStatus::Loading
        } else {
            LoadStatus::Success
        }
    }
}

/// Read of one key from one source
#[derive(Debug, Clone, PartialEq)]
pub struct SourceView<T> {
    pub data: Option<T>,
    pub status: LoadStatus,
}

/// A vault joined with the user's balance of its asset
#[derive(Debug, Clone, PartialEq)]
pub struct VaultView<T> {
    pub data: Option<T>,
    pub asset_balance: Option<U256>,
    pub status: LoadStatus,
}

/// Product of every source's state at one instant.
///
/// Published whole; a reader holding an `Arc<AggregatedContext>` never sees
/// a later publish mix into it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AggregatedContext {
    pub query: QueryContext,
    pub vaults: DataSourceState<VaultId, VaultData>,
    pub v2_vaults: DataSourceState<VaultId, V2VaultData>,
    pub asset_balances: DataSourceState<Asset, U256>,
    pub liquidity_mining: DataSourceState<VaultId, StakingPoolData>,
    pub liquidity_gauge: DataSourceState<VaultId, StakingPoolData>,
    pub oracle: DataSourceState<Asset, ExchangeRate>,
    pub treasury: DataSourceState<VaultId, U256>,
}

impl AggregatedContext {
    pub fn new(query: QueryContext) -> Self {
        Self {
            query,
            ..Self::default()
        }
    }

    pub fn loading(&self, id: SourceId) -> bool {
        match id {
            SourceId::Vaults => self.vaults.loading,
            SourceId::V2Vaults => self.v2_vaults.loading,
            SourceId::AssetBalances => self.asset_balances.loading,
            SourceId::LiquidityMining => self.liquidity_mining.loading,
            SourceId::LiquidityGauge => self.liquidity_gauge.loading,
            SourceId::Oracle => self.oracle.loading,
            SourceId::Treasury => self.treasury.loading,
        }
    }

    pub fn error(&self, id: SourceId) -> Option<&str> {
        let error = match id {
            SourceId::Vaults => &self.vaults.error,
            SourceId::V2Vaults => &self.v2_vaults.error,
            SourceId::AssetBalances => &self.asset_balances.error,
            SourceId::LiquidityMining => &self.liquidity_mining.error,
            SourceId::LiquidityGauge => &self.liquidity_gauge.error,
            SourceId::Oracle => &self.oracle.error,
            SourceId::Treasury => &self.treasury.error,
        };
        error.as_deref()
    }

    /// Status over every source
    pub fn status(&self) -> LoadStatus {
        let loading: Vec<bool> = SourceId::ALL.iter().map(|id| self.loading(*id)).collect();
        LoadStatus::of(&loading)
    }

    pub fn vault(&self, vault: &VaultId) -> VaultView<VaultData> {
        let data = self.vaults.get(vault).cloned();
        let asset_balance = data
            .as_ref()
            .and_then(|v| self.asset_balances.get(&v.asset).copied());
        VaultView {
            data,
            asset_balance,
            status: LoadStatus::of(&[self.vaults.loading, self.asset_balances.loading]),
        }
    }

    pub fn v2_vault(&self, vault: &VaultId) -> VaultView<V2VaultData> {
        let data = self.v2_vaults.get(vault).cloned();
        let asset_balance = data
            .as_ref()
            .and_then(|v| self.asset_balances.get(&v.asset).copied());
        VaultView {
            data,
            asset_balance,
            status: LoadStatus::of(&[self.v2_vaults.loading, self.asset_balances.loading]),
        }
    }

    pub fn staking_pool(&self, vault: &VaultId) -> SourceView<StakingPoolData> {
        single(&self.liquidity_mining, vault)
    }

    pub fn gauge_pool(&self, vault: &VaultId) -> SourceView<StakingPoolData> {
        single(&self.liquidity_gauge, vault)
    }

    pub fn asset_balance(&self, asset: &Asset) -> SourceView<U256> {
        single(&self.asset_balances, asset)
    }

    pub fn oracle(&self, asset: &Asset) -> SourceView<ExchangeRate> {
        single(&self.oracle, asset)
    }

    pub fn treasury(&self) -> SourceView<Arc<BTreeMap<VaultId, U256>>> {
        SourceView {
            data: Some(self.treasury.responses.clone()),
            status: LoadStatus::of(&[self.treasury.loading]),
        }
    }
}

fn single<K: Ord, V: Clone>(state: &DataSourceState<K, V>, key: &K) -> SourceView<V> {
    SourceView {
        data: state.get(key).cloned(),
        status: LoadStatus::of(&[state.loading]),
    }
}
