use serde::{Deserialize, Serialize};

use super::{AmountMinor, CardId, UserId, WalletId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WithdrawalStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl WithdrawalStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WithdrawalStatus::Completed | WithdrawalStatus::Failed | WithdrawalStatus::Cancelled
        )
    }

    /// Valid next states from the current state. A terminal status refuses
    /// every transition, which is what shields the ledger from contradictory
    /// provider callbacks.
    pub fn can_transition(&self, to: WithdrawalStatus) -> bool {
        match self {
            WithdrawalStatus::Pending => matches!(
                to,
                WithdrawalStatus::Processing
                    | WithdrawalStatus::Failed
                    | WithdrawalStatus::Cancelled
            ),
            WithdrawalStatus::Processing => {
                matches!(to, WithdrawalStatus::Completed | WithdrawalStatus::Failed)
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferStatus {
    Pending,
    Completed,
    Failed,
}

impl TransferStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransferStatus::Pending)
    }
}

/// A member's request to move equity out of the pool through the provider.
/// The ledger side is the pending/finalise posting pair; the provider side is
/// the owned `WithdrawalTransfer`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    pub id: String,
    pub wallet_id: WalletId,
    pub card_id: CardId,
    pub user_id: UserId,
    pub amount_minor: AmountMinor,
    pub currency: String,
    pub status: WithdrawalStatus,
    pub failure_reason: Option<String>,
    pub created_at: u64,
    pub completed_at: Option<u64>,
    pub failed_at: Option<u64>,
    pub ledger_transaction_id: Option<String>,
}

/// The provider-plane leg of a withdrawal. Unique on
/// `(provider_name, provider_transfer_id)` once the provider has assigned one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalTransfer {
    pub id: String,
    pub withdrawal_request_id: String,
    pub provider_name: String,
    pub provider_transfer_id: Option<String>,
    pub amount_minor: AmountMinor,
    pub status: TransferStatus,
}
