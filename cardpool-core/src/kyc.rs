//! Status updater for verification, account and card status events. All
//! handlers are idempotent overwrites; unknown subjects or statuses are
//! logged and ignored so the pipeline never crashes on provider noise.

use std::sync::Arc;

use cardpool_common::model::{CardStatus, KycStatus};
use cardpool_common::Result;
use cardpool_ledger::Ledger;

pub struct StatusUpdater {
    ledger: Arc<Ledger>,
}

impl StatusUpdater {
    pub fn new(ledger: Arc<Ledger>) -> Self {
        Self { ledger }
    }

    pub async fn handle_kyc_verification(&self, user_id: &str, status: &str) -> Result<()> {
        let mapped = match status {
            "VERIFIED" | "ACCEPTED" => KycStatus::Verified,
            "PENDING" | "REVIEW" => KycStatus::Pending,
            "REJECTED" | "DENIED" => KycStatus::Rejected,
            "UNVERIFIED" => KycStatus::Unverified,
            other => {
                tracing::warn!(user_id, status = other, "unknown KYC status ignored");
                return Ok(());
            }
        };
        self.ledger.set_kyc_status(user_id, mapped).await;
        tracing::info!(user_id, ?mapped, "KYC status updated");
        Ok(())
    }

    pub async fn handle_card_status(&self, provider_card_id: &str, status: &str) -> Result<()> {
        let card = match self.ledger.card_by_external(provider_card_id).await {
            Some(card) => card,
            None => {
                tracing::warn!(provider_card_id, status, "card status for unknown card ignored");
                return Ok(());
            }
        };
        let mapped = match status {
            "ACTIVE" => CardStatus::Active,
            "SUSPENDED" | "LOCKED" => CardStatus::Locked,
            "TERMINATED" | "CANCELLED" => CardStatus::Terminated,
            "UNACTIVATED" | "PENDING" => CardStatus::PendingActivation,
            other => {
                tracing::warn!(provider_card_id, status = other, "unknown card status ignored");
                return Ok(());
            }
        };
        self.ledger.set_card_status(&card.card_id, mapped).await?;
        tracing::info!(card_id = %card.card_id, ?mapped, "card status updated");
        Ok(())
    }

    /// No ledger effect; recorded for operators.
    pub async fn handle_account_status(&self, provider_account_id: &str, status: &str) -> Result<()> {
        tracing::info!(provider_account_id, status, "provider account status changed");
        Ok(())
    }
}
