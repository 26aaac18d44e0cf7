//! Pending transaction record and its parts

use crate::chain::ChainId;
use crate::data::{Asset, VaultId};
use crate::wallet::Account;

use chrono::{DateTime, Utc};
use ethers::types::{H256, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Transaction hash as returned by the wallet.
///
/// `0x`-prefixed hex hashes are lowercased. Anything else (Solana base58
/// signatures) is case-sensitive and kept as given.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxHash(String);

impl TxHash {
    pub fn new(hash: impl AsRef<str>) -> Self {
        let hash = hash.as_ref();
        let is_hex = match hash.strip_prefix("0x").or_else(|| hash.strip_prefix("0X")) {
            Some(digits) => !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_hexdigit()),
            None => false,
        };
        if is_hex {
            Self(hash.to_ascii_lowercase())
        } else {
            Self(hash.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<H256> for TxHash {
    fn from(hash: H256) -> Self {
        Self(format!("0x{}", hex::encode(hash.as_bytes())))
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TransactionKind {
    Deposit,
    Approval,
    Withdraw,
    WithdrawInitiation,
    Migrate,
    Claim,
    StakingApproval,
    Stake,
    Unstake,
    RewardClaim,
    Transfer,
}

impl TransactionKind {
    pub fn name(&self) -> &'static str {
        match self {
            TransactionKind::Deposit => "deposit",
            TransactionKind::Approval => "approval",
            TransactionKind::Withdraw => "withdraw",
            TransactionKind::WithdrawInitiation => "withdrawInitiation",
            TransactionKind::Migrate => "migrate",
            TransactionKind::Claim => "claim",
            TransactionKind::StakingApproval => "stakingApproval",
            TransactionKind::Stake => "stake",
            TransactionKind::Unstake => "unstake",
            TransactionKind::RewardClaim => "rewardClaim",
            TransactionKind::Transfer => "transfer",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// On-chain identifiers a transaction acts on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TxSubject {
    Vault { vault: VaultId },
    VaultAsset { vault: VaultId, asset: Asset },
    Stake { stake_asset: VaultId },
    Transfer { transfer_vault: VaultId, receive_vault: VaultId },
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxFailure {
    Reverted,
    ConfirmationTimeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum TxStatus {
    Pending,
    Success,
    Error(TxFailure),
}

impl TxStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TxStatus::Pending)
    }

    pub fn name(&self) -> &'static str {
        match self {
            TxStatus::Pending => "pending",
            TxStatus::Success => "success",
            TxStatus::Error(TxFailure::Reverted) => "reverted",
            TxStatus::Error(TxFailure::ConfirmationTimeout) => "confirmation_timeout",
        }
    }
}

/// A submitted transaction. Identity is the hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTransaction {
    pub hash: TxHash,
    pub kind: TransactionKind,
    /// Base units of the asset
    pub amount: U256,
    pub subject: TxSubject,
    pub status: TxStatus,
    pub submitted_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
    pub account: Account,
    pub chain: ChainId,
}

impl PendingTransaction {
    pub fn new(
        hash: TxHash,
        kind: TransactionKind,
        amount: U256,
        subject: TxSubject,
        account: Account,
        chain: ChainId,
    ) -> Self {
        Self {
            hash,
            kind,
            amount,
            subject,
            status: TxStatus::Pending,
            submitted_at: Utc::now(),
            settled_at: None,
            account,
            chain,
        }
    }

    /// Copy of this entry moved to a terminal status
    pub(crate) fn settled(&self, status: TxStatus) -> Self {
        Self {
            status,
            settled_at: Some(Utc::now()),
            ..self.clone()
        }
    }
}
