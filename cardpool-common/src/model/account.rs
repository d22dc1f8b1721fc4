use serde::{Deserialize, Serialize};

use super::{AccountId, AmountMinor, CardId, UserId, WalletId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountScope {
    /// The shared pot backing a card. Debit-normal: debits grow it, so a
    /// deposit (debit pool, credit member equity) grows both sides and the
    /// stored balance stays non-negative.
    CardPool,
    /// A member's claim on the pool. Credit-normal.
    CardMemberEquity,
    /// Funds reserved for an in-flight withdrawal. Credit-normal.
    CardPendingWithdrawal,
}

impl AccountScope {
    /// Whether a debit increases (`true`) or decreases (`false`) the stored
    /// balance of an account with this scope.
    pub fn debit_normal(&self) -> bool {
        matches!(self, AccountScope::CardPool)
    }
}

/// A card-scoped ledger account. At most one `CardPool` and one
/// `CardPendingWithdrawal` per card; at most one `CardMemberEquity` per
/// `(card, user)`. `user_id` is set only for member equity accounts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerAccount {
    pub account_id: AccountId,
    pub wallet_id: WalletId,
    pub card_id: CardId,
    pub scope: AccountScope,
    pub user_id: Option<UserId>,
    pub balance: AmountMinor,
    pub currency: String,
    pub created_at: u64,
}
