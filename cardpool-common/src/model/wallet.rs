use serde::{Deserialize, Serialize};

use super::{UserId, WalletId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemberRole {
    Admin,
    Member,
}

/// How a card capture is divided among the wallet members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SplitPolicy {
    /// Entire amount lands on the cardholder.
    PayerOnly,
    /// Amount divided evenly, remainder one minor unit per member in join order.
    EqualSplit,
}

/// A named group of members pooling funds. Exactly one admin, who is always
/// also a member. Purely a grouping container; all balances live on the
/// card-scoped ledger accounts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    pub wallet_id: WalletId,
    pub name: String,
    pub admin_user_id: UserId,
    pub split_policy: SplitPolicy,
    pub created_at: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletMember {
    pub wallet_id: WalletId,
    pub user_id: UserId,
    pub role: MemberRole,
    pub joined_at: u64,
}
