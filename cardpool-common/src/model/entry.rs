use serde::{Deserialize, Serialize};

use super::{AccountId, AmountMinor, LedgerAccount};

/// One balanced movement: `amount` flows from the debit account to the credit
/// account. Amounts are strictly positive; how a debit affects a balance
/// depends on the account's scope (see `AccountScope::debit_normal`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Posting {
    pub debit_account_id: AccountId,
    pub credit_account_id: AccountId,
    pub amount: AmountMinor,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// One member's share of a card capture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureSplit {
    pub user_id: super::UserId,
    pub amount: AmountMinor,
}

/// A committed ledger entry. Append-only and immutable; all entries sharing a
/// `transaction_id` form one logical posting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub entry_id: String,
    pub transaction_id: String,
    pub debit_account_id: AccountId,
    pub credit_account_id: AccountId,
    pub amount: AmountMinor,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub created_at: u64,
}

/// What the posting engine hands back: the entries under the transaction id
/// and a snapshot of every account they touch. `replayed` is set when the
/// transaction id had already been committed and nothing was written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostingReceipt {
    pub transaction_id: String,
    pub entries: Vec<LedgerEntry>,
    pub accounts: Vec<LedgerAccount>,
    pub replayed: bool,
}
