//! On-chain values read by the data sources. All amounts are base units.

use ethers::types::U256;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Vault identifier, e.g. `T-USDC-P-ETH`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VaultId(String);

impl VaultId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VaultId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Asset symbol, e.g. `USDC`
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Asset(String);

impl Asset {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self(symbol.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// First-generation vault
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultData {
    pub asset: Asset,
    pub deposits: U256,
    pub vault_limit: U256,
    /// User's share of the vault, in the vault asset
    pub vault_balance_in_asset: U256,
    pub max_withdraw_amount: U256,
}

impl VaultData {
    pub fn remaining_capacity(&self) -> U256 {
        self.vault_limit.saturating_sub(self.deposits)
    }
}

/// Round-based vault
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct V2VaultData {
    pub asset: Asset,
    pub total_balance: U256,
    pub cap: U256,
    pub price_per_share: U256,
    pub round: u64,
    /// Deposited this round, not yet in the strategy
    pub deposit_balance_in_asset: U256,
    pub locked_balance_in_asset: U256,
}

impl V2VaultData {
    /// Everything the user holds in the vault
    pub fn user_position(&self) -> U256 {
        self.deposit_balance_in_asset
            .saturating_add(self.locked_balance_in_asset)
    }

    pub fn remaining_capacity(&self) -> U256 {
        self.cap.saturating_sub(self.total_balance)
    }
}

/// Liquidity-mining or gauge staking pool
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakingPoolData {
    pub pool_size: U256,
    pub pool_reward_for_duration: U256,
    pub current_stake: U256,
    /// Stake tokens the user holds but has not staked
    pub unstaked_balance: U256,
    pub claimable_rewards: U256,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeRate {
    pub rate: U256,
    pub decimals: u8,
}
