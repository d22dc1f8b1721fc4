//! The withdrawal coordinator: an application-level two-phase commit. Phase
//! one reserves equity in the ledger; the payout call happens outside any
//! storage transaction; phase two lands via the provider's status callback.

use std::sync::Arc;

use cardpool_baas::{BaasProvider, PayoutRequest, PayoutState};
use cardpool_common::model::{WithdrawalRequest, WithdrawalTransfer};
use cardpool_common::{CardpoolError, Result};
use cardpool_ledger::Ledger;

pub struct WithdrawalCoordinator {
    ledger: Arc<Ledger>,
    provider: Arc<dyn BaasProvider>,
}

impl WithdrawalCoordinator {
    pub fn new(ledger: Arc<Ledger>, provider: Arc<dyn BaasProvider>) -> Self {
        Self { ledger, provider }
    }

    /// Opens a withdrawal and initiates the payout. On provider failure the
    /// pending posting is reversed and the provider's error is surfaced; the
    /// request row remains as the `Failed` audit trail.
    pub async fn request_withdrawal(
        &self,
        wallet_id: &str,
        card_id: &str,
        user_id: &str,
        amount_minor: i64,
        currency: &str,
    ) -> Result<(WithdrawalRequest, WithdrawalTransfer)> {
        let card = self.ledger.card(card_id).await?;
        let source_account_id = card.external_account_id.clone().ok_or_else(|| {
            CardpoolError::Validation(format!(
                "card {} has no linked provider account to pay out from",
                card_id
            ))
        })?;

        let request = self
            .ledger
            .create_withdrawal_request(wallet_id, card_id, user_id, amount_minor, currency)
            .await?;

        // External call, deliberately outside the storage transaction.
        let payout = PayoutRequest {
            source_account_id,
            destination_card_token: card.external_card_id.clone(),
            amount_minor,
            currency: currency.to_string(),
            reference: request.id.clone(),
        };
        match self.provider.initiate_payout(&payout).await {
            Ok(handle) => {
                let (request, transfer) = self
                    .ledger
                    .mark_withdrawal_processing(
                        &request.id,
                        self.provider.name(),
                        Some(handle.external_transfer_id),
                    )
                    .await?;
                Ok((request, transfer))
            }
            Err(provider_err) => {
                let err = CardpoolError::from(provider_err);
                self.ledger
                    .fail_withdrawal(&request.id, &err.to_string())
                    .await?;
                Err(err)
            }
        }
    }

    /// Applies a payout status callback. Unknown transfers are logged and
    /// ignored; terminal transfers refuse contradictory updates inside the
    /// ledger transitions.
    pub async fn handle_payout_status(
        &self,
        provider_name: &str,
        provider_transfer_id: &str,
        status: PayoutState,
        reason: Option<&str>,
    ) -> Result<()> {
        match status {
            PayoutState::Completed => {
                if self
                    .ledger
                    .complete_withdrawal_by_transfer(provider_name, provider_transfer_id)
                    .await?
                    .is_none()
                {
                    tracing::warn!(
                        provider = provider_name,
                        provider_transfer_id,
                        "payout status for unknown transfer ignored"
                    );
                }
            }
            PayoutState::Failed | PayoutState::Reversed => {
                let reason = reason.unwrap_or("payout failed");
                if self
                    .ledger
                    .fail_withdrawal_by_transfer(provider_name, provider_transfer_id, reason)
                    .await?
                    .is_none()
                {
                    tracing::warn!(
                        provider = provider_name,
                        provider_transfer_id,
                        "payout status for unknown transfer ignored"
                    );
                }
            }
            PayoutState::Pending => {
                tracing::debug!(
                    provider = provider_name,
                    provider_transfer_id,
                    "payout still pending"
                );
            }
        }
        Ok(())
    }

    /// Cancels a request that has not reached the provider yet.
    pub async fn cancel(&self, request_id: &str, user_id: &str) -> Result<WithdrawalRequest> {
        self.ledger.cancel_withdrawal(request_id, user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardpool_baas::MockProvider;
    use cardpool_common::model::{CardStatus, WithdrawalStatus};
    use cardpool_ledger::directory::CardSpec;
    use serde_json::Value;

    async fn fixture(equity: i64) -> (Arc<Ledger>, Arc<MockProvider>, WithdrawalCoordinator, String, String) {
        let ledger = Arc::new(Ledger::new());
        let provider = Arc::new(MockProvider::new());
        let wallet = ledger.create_wallet("trip", "alice").await;
        let card = ledger
            .register_card(CardSpec {
                wallet_id: wallet.wallet_id.clone(),
                holder_user_id: "alice".to_string(),
                provider_name: "MOCK".to_string(),
                external_card_id: "ext_1".to_string(),
                external_account_id: Some("acct_1".to_string()),
                currency: "USD".to_string(),
            })
            .await
            .unwrap();
        ledger
            .set_card_status(&card.card_id, CardStatus::Active)
            .await
            .unwrap();
        if equity > 0 {
            ledger
                .post_card_deposit(&card.card_id, "alice", equity, "seed", Value::Null)
                .await
                .unwrap();
        }
        let coordinator =
            WithdrawalCoordinator::new(Arc::clone(&ledger), Arc::clone(&provider) as Arc<dyn BaasProvider>);
        (ledger, provider, coordinator, wallet.wallet_id, card.card_id)
    }

    #[tokio::test]
    async fn test_request_initiates_payout_and_processes() {
        let (ledger, provider, coordinator, wallet_id, card_id) = fixture(60_000).await;
        let (request, transfer) = coordinator
            .request_withdrawal(&wallet_id, &card_id, "alice", 10_000, "USD")
            .await
            .unwrap();

        assert_eq!(request.status, WithdrawalStatus::Processing);
        assert!(transfer.provider_transfer_id.is_some());
        assert_eq!(provider.payouts.lock().unwrap().len(), 1);
        assert_eq!(provider.payouts.lock().unwrap()[0].reference, request.id);

        let view = ledger.reconcile_card(&card_id).await.unwrap();
        assert_eq!(view.pending_withdrawals, 10_000);
        assert!(view.consistent);
    }

    #[tokio::test]
    async fn test_provider_rejection_reverses_pending() {
        let (ledger, provider, coordinator, wallet_id, card_id) = fixture(60_000).await;
        provider.fail_next_payout("limits exceeded");

        let err = coordinator
            .request_withdrawal(&wallet_id, &card_id, "alice", 10_000, "USD")
            .await
            .unwrap_err();
        assert!(matches!(err, CardpoolError::ProviderRejected { .. }));

        let view = ledger.reconcile_card(&card_id).await.unwrap();
        assert_eq!(view.pending_withdrawals, 0);
        assert_eq!(view.member_equity[0].balance, 60_000);

        let failed = ledger
            .list_withdrawals(&wallet_id, Some(WithdrawalStatus::Failed), 10, 0)
            .await;
        assert_eq!(failed.len(), 1);
        assert!(failed[0].failure_reason.as_deref().unwrap().contains("limits exceeded"));
    }

    #[tokio::test]
    async fn test_completed_callback_finalises() {
        let (ledger, _provider, coordinator, wallet_id, card_id) = fixture(60_000).await;
        let (request, transfer) = coordinator
            .request_withdrawal(&wallet_id, &card_id, "alice", 10_000, "USD")
            .await
            .unwrap();
        let transfer_id = transfer.provider_transfer_id.unwrap();

        coordinator
            .handle_payout_status("MOCK", &transfer_id, PayoutState::Completed, None)
            .await
            .unwrap();

        let request = ledger.withdrawal(&request.id).await.unwrap();
        assert_eq!(request.status, WithdrawalStatus::Completed);
        let view = ledger.reconcile_card(&card_id).await.unwrap();
        assert_eq!(view.pool_balance, 50_000);
        assert_eq!(view.pending_withdrawals, 0);
    }

    #[tokio::test]
    async fn test_unknown_transfer_callback_is_ignored() {
        let (_ledger, _provider, coordinator, _wallet_id, _card_id) = fixture(0).await;
        coordinator
            .handle_payout_status("MOCK", "ghost", PayoutState::Completed, None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_card_without_linked_account_cannot_withdraw() {
        let ledger = Arc::new(Ledger::new());
        let provider = Arc::new(MockProvider::new());
        let wallet = ledger.create_wallet("trip", "alice").await;
        let card = ledger
            .register_card(CardSpec {
                wallet_id: wallet.wallet_id.clone(),
                holder_user_id: "alice".to_string(),
                provider_name: "MOCK".to_string(),
                external_card_id: "ext_1".to_string(),
                external_account_id: None,
                currency: "USD".to_string(),
            })
            .await
            .unwrap();
        let coordinator = WithdrawalCoordinator::new(Arc::clone(&ledger), provider);
        let err = coordinator
            .request_withdrawal(&wallet.wallet_id, &card.card_id, "alice", 1_000, "USD")
            .await
            .unwrap_err();
        assert!(matches!(err, CardpoolError::Validation(_)));
        // Nothing was reserved.
        assert_eq!(ledger.entry_count().await, 0);
    }
}
