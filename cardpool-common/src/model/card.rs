use serde::{Deserialize, Serialize};

use super::{CardId, UserId, WalletId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CardStatus {
    PendingActivation,
    Active,
    Locked,
    Terminated,
}

/// A prepaid card drawn against a wallet's pooled funds. `external_card_id`
/// is the provider's identifier and is globally unique across the system;
/// the owning wallet never changes for the card's lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Card {
    pub card_id: CardId,
    pub wallet_id: WalletId,
    pub holder_user_id: UserId,
    pub status: CardStatus,
    pub provider_name: String,
    pub external_card_id: String,
    /// Provider account the card settles against, when one is linked.
    pub external_account_id: Option<String>,
    pub currency: String,
    pub created_at: u64,
}
