use serde::{Deserialize, Serialize};

use super::{AmountMinor, CardId, WalletId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HoldStatus {
    Pending,
    Cleared,
    Reversed,
    Expired,
}

/// A reserved amount against a card's available pool, created when an
/// authorisation is approved and resolved by a clearing, a reversal, or the
/// expiry sweep. Unique on `(provider_name, provider_auth_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardAuthHold {
    pub wallet_id: WalletId,
    pub card_id: CardId,
    pub provider_name: String,
    pub provider_auth_id: String,
    pub amount_minor: AmountMinor,
    pub status: HoldStatus,
    pub created_at: u64,
}
