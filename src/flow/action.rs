//! Action kinds: what each flow submits and what it validates against

use crate::data::{AggregatedContext, Asset, DataSourceState, SourceId, VaultId};
use crate::error::{ClientError, ClientResult, ValidationError};
use crate::tx::{TransactionKind, TxSubject};

use ethers::types::U256;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Deposit,
    Withdraw,
    Stake,
    Unstake,
    Claim,
    Transfer,
}

/// Per-instance parameters of a flow
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionParams {
    pub subject: TxSubject,
    /// Decimals of the asset the amount is entered in
    pub decimals: u8,
}

impl ActionKind {
    pub fn name(&self) -> &'static str {
        match self {
            ActionKind::Deposit => "deposit",
            ActionKind::Withdraw => "withdraw",
            ActionKind::Stake => "stake",
            ActionKind::Unstake => "unstake",
            ActionKind::Claim => "claim",
            ActionKind::Transfer => "transfer",
        }
    }

    /// Ledger kind recorded for a submitted action
    pub fn transaction_kind(&self) -> TransactionKind {
        match self {
            ActionKind::Deposit => TransactionKind::Deposit,
            ActionKind::Withdraw => TransactionKind::Withdraw,
            ActionKind::Stake => TransactionKind::Stake,
            ActionKind::Unstake => TransactionKind::Unstake,
            ActionKind::Claim => TransactionKind::RewardClaim,
            ActionKind::Transfer => TransactionKind::Transfer,
        }
    }

    pub fn check_subject(&self, subject: &TxSubject) -> ClientResult<()> {
        let ok = match self {
            ActionKind::Deposit => {
                matches!(subject, TxSubject::Vault { .. } | TxSubject::VaultAsset { .. })
            }
            ActionKind::Withdraw => matches!(subject, TxSubject::Vault { .. }),
            ActionKind::Stake | ActionKind::Unstake | ActionKind::Claim => {
                matches!(subject, TxSubject::Stake { .. })
            }
            ActionKind::Transfer => matches!(subject, TxSubject::Transfer { .. }),
        };

        if ok {
            Ok(())
        } else {
            Err(ClientError::InvalidState(format!(
                "{} cannot act on {:?}",
                self, subject
            )))
        }
    }

    /// Most the user can submit right now
    pub fn available(
        &self,
        ctx: &AggregatedContext,
        subject: &TxSubject,
    ) -> Result<U256, ValidationError> {
        match (self, subject) {
            (ActionKind::Deposit, TxSubject::Vault { vault }) => {
                let (balance, capacity) = deposit_limits(ctx, vault, None)?;
                Ok(balance.min(capacity))
            }
            (ActionKind::Deposit, TxSubject::VaultAsset { vault, asset }) => {
                let (balance, capacity) = deposit_limits(ctx, vault, Some(asset))?;
                Ok(balance.min(capacity))
            }
            (ActionKind::Withdraw, TxSubject::Vault { vault }) => {
                Ok(require(&ctx.v2_vaults, SourceId::V2Vaults, vault)?.user_position())
            }
            (ActionKind::Stake, TxSubject::Stake { stake_asset }) => {
                Ok(require(&ctx.liquidity_gauge, SourceId::LiquidityGauge, stake_asset)?
                    .unstaked_balance)
            }
            (ActionKind::Unstake, TxSubject::Stake { stake_asset }) => {
                Ok(require(&ctx.liquidity_gauge, SourceId::LiquidityGauge, stake_asset)?
                    .current_stake)
            }
            (ActionKind::Claim, TxSubject::Stake { stake_asset }) => {
                Ok(require(&ctx.liquidity_gauge, SourceId::LiquidityGauge, stake_asset)?
                    .claimable_rewards)
            }
            (
                ActionKind::Transfer,
                TxSubject::Transfer {
                    transfer_vault,
                    receive_vault,
                },
            ) => {
                let (position, capacity) = transfer_limits(ctx, transfer_vault, receive_vault)?;
                Ok(position.min(capacity))
            }
            _ => Err(ValidationError::InvalidAmount(format!(
                "{} does not apply to this subject",
                self
            ))),
        }
    }

    /// Check `amount` against the latest data. Never blocks; the flow shows the error.
    pub fn validate(
        &self,
        ctx: &AggregatedContext,
        subject: &TxSubject,
        amount: U256,
    ) -> Result<(), ValidationError> {
        if amount.is_zero() {
            return Err(ValidationError::ZeroAmount);
        }

        let (available, capacity) = match (self, subject) {
            (ActionKind::Deposit, TxSubject::Vault { vault }) => {
                let (balance, capacity) = deposit_limits(ctx, vault, None)?;
                (balance, Some(capacity))
            }
            (ActionKind::Deposit, TxSubject::VaultAsset { vault, asset }) => {
                let (balance, capacity) = deposit_limits(ctx, vault, Some(asset))?;
                (balance, Some(capacity))
            }
            (
                ActionKind::Transfer,
                TxSubject::Transfer {
                    transfer_vault,
                    receive_vault,
                },
            ) => {
                let (position, capacity) = transfer_limits(ctx, transfer_vault, receive_vault)?;
                (position, Some(capacity))
            }
            _ => (self.available(ctx, subject)?, None),
        };

        if amount > available {
            return Err(ValidationError::InsufficientBalance {
                available,
                requested: amount,
            });
        }
        if let Some(remaining) = capacity {
            if amount > remaining {
                return Err(ValidationError::CapacityExceeded {
                    remaining,
                    requested: amount,
                });
            }
        }
        Ok(())
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Value for `key`, or `DataUnavailable` if the source failed or has no entry
fn require<'a, K: Ord, V>(
    state: &'a DataSourceState<K, V>,
    id: SourceId,
    key: &K,
) -> Result<&'a V, ValidationError> {
    state
        .usable(key)
        .ok_or(ValidationError::DataUnavailable {
            source_name: id.name(),
        })
}

/// (user's balance of the deposit asset, vault's remaining capacity)
fn deposit_limits(
    ctx: &AggregatedContext,
    vault: &VaultId,
    asset: Option<&Asset>,
) -> Result<(U256, U256), ValidationError> {
    let data = require(&ctx.v2_vaults, SourceId::V2Vaults, vault)?;
    let asset = asset.unwrap_or(&data.asset);
    let balance = require(&ctx.asset_balances, SourceId::AssetBalances, asset)?;
    Ok((*balance, data.remaining_capacity()))
}

/// (user's position in the source vault, receiving vault's remaining capacity)
fn transfer_limits(
    ctx: &AggregatedContext,
    from: &VaultId,
    to: &VaultId,
) -> Result<(U256, U256), ValidationError> {
    let source = require(&ctx.v2_vaults, SourceId::V2Vaults, from)?;
    let target = require(&ctx.v2_vaults, SourceId::V2Vaults, to)?;
    Ok((source.user_position(), target.remaining_capacity()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{FetchError, StakingPoolData, V2VaultData};
    use std::collections::BTreeMap;

    fn vault() -> VaultId {
        VaultId::new("T-USDC-P-ETH")
    }

    fn ctx(balance: u64, cap: u64, total: u64) -> AggregatedContext {
        AggregatedContext {
            v2_vaults: DataSourceState::succeeded(
                BTreeMap::from([
                    (
                        vault(),
                        V2VaultData {
                            asset: Asset::new("USDC"),
                            cap: U256::from(cap),
                            total_balance: U256::from(total),
                            locked_balance_in_asset: U256::from(30),
                            ..V2VaultData::default()
                        },
                    ),
                    (
                        VaultId::new("T-ETH-C"),
                        V2VaultData {
                            asset: Asset::new("ETH"),
                            cap: U256::from(10),
                            ..V2VaultData::default()
                        },
                    ),
                ]),
                false,
            ),
            asset_balances: DataSourceState::succeeded(
                BTreeMap::from([(Asset::new("USDC"), U256::from(balance))]),
                false,
            ),
            liquidity_gauge: DataSourceState::succeeded(
                BTreeMap::from([(
                    vault(),
                    StakingPoolData {
                        unstaked_balance: U256::from(8),
                        current_stake: U256::from(4),
                        claimable_rewards: U256::from(2),
                        ..StakingPoolData::default()
                    },
                )]),
                false,
            ),
            ..AggregatedContext::default()
        }
    }

    fn deposit() -> TxSubject {
        TxSubject::Vault { vault: vault() }
    }

    #[test]
    fn test_deposit_checks_balance_then_capacity() {
        let ctx = ctx(100, 1_000, 960);

        assert_eq!(
            ActionKind::Deposit.validate(&ctx, &deposit(), U256::from(150)),
            Err(ValidationError::InsufficientBalance {
                available: U256::from(100),
                requested: U256::from(150)
            })
        );
        assert_eq!(
            ActionKind::Deposit.validate(&ctx, &deposit(), U256::from(50)),
            Err(ValidationError::CapacityExceeded {
                remaining: U256::from(40),
                requested: U256::from(50)
            })
        );
        assert!(ActionKind::Deposit.validate(&ctx, &deposit(), U256::from(40)).is_ok());
        assert_eq!(
            ActionKind::Deposit.available(&ctx, &deposit()),
            Ok(U256::from(40))
        );
    }

    #[test]
    fn test_zero_amount_rejected() {
        assert_eq!(
            ActionKind::Deposit.validate(&ctx(100, 1_000, 0), &deposit(), U256::zero()),
            Err(ValidationError::ZeroAmount)
        );
    }

    #[test]
    fn test_failed_source_is_data_unavailable() {
        let mut ctx = ctx(100, 1_000, 0);
        ctx.asset_balances = ctx
            .asset_balances
            .failed(&FetchError::new("timeout"), false);

        assert_eq!(
            ActionKind::Deposit.validate(&ctx, &deposit(), U256::from(10)),
            Err(ValidationError::DataUnavailable {
                source_name: "asset_balances"
            })
        );
    }

    #[test]
    fn test_staking_actions_use_gauge_pool() {
        let ctx = ctx(0, 0, 0);
        let subject = TxSubject::Stake {
            stake_asset: vault(),
        };
        assert_eq!(ActionKind::Stake.available(&ctx, &subject), Ok(U256::from(8)));
        assert_eq!(ActionKind::Unstake.available(&ctx, &subject), Ok(U256::from(4)));
        assert_eq!(ActionKind::Claim.available(&ctx, &subject), Ok(U256::from(2)));
        assert!(ActionKind::Unstake
            .validate(&ctx, &subject, U256::from(5))
            .is_err());
    }

    #[test]
    fn test_transfer_limits() {
        let ctx = ctx(0, 1_000, 0);
        let subject = TxSubject::Transfer {
            transfer_vault: vault(),
            receive_vault: VaultId::new("T-ETH-C"),
        };
        assert_eq!(ActionKind::Transfer.available(&ctx, &subject), Ok(U256::from(10)));
        assert_eq!(
            ActionKind::Transfer.validate(&ctx, &subject, U256::from(20)),
            Err(ValidationError::CapacityExceeded {
                remaining: U256::from(10),
                requested: U256::from(20)
            })
        );
    }

    #[test]
    fn test_subject_must_match_kind() {
        assert!(ActionKind::Withdraw.check_subject(&deposit()).is_ok());
        assert!(ActionKind::Stake.check_subject(&deposit()).is_err());
        assert!(ActionKind::Claim.check_subject(&TxSubject::None).is_err());
    }
}
