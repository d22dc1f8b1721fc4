use serde::{Deserialize, Serialize};

use super::{CardId, UserId, WalletId};

/// Maps an inbound provider credit to the `(card, user)` it funds. Unique on
/// `(provider_name, provider_account_id, reference)`; an empty reference is
/// the wallet's default route for that provider account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaasFundingRoute {
    pub provider_name: String,
    pub provider_account_id: String,
    #[serde(default)]
    pub reference: String,
    pub wallet_id: WalletId,
    pub card_id: CardId,
    pub user_id: UserId,
}
