//! The webhook ingestion pipeline: verify, normalise, journal, dedupe,
//! dispatch, mark processed. Safe under concurrent redelivery because the
//! handlers are idempotent and the processed-event marker is written only
//! after a handler commits.

use std::collections::HashMap;
use std::sync::Arc;

use cardpool_baas::{BaasProvider, NormalizedEvent, WebhookHeaders};
use cardpool_common::{CardpoolError, Result};
use cardpool_ledger::{AuthorizationDecision, Ledger};

use crate::card_program::CardProgram;
use crate::funding::FundingRouter;
use crate::kyc::StatusUpdater;
use crate::withdrawal::WithdrawalCoordinator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Event handled and marked processed. Carries the authorisation decision
    /// when the event was a `CARD_AUTH`, so the transport can answer the
    /// provider inline.
    Processed {
        auth_decision: Option<AuthorizationDecision>,
    },
    /// Already processed earlier; nothing dispatched.
    Duplicate,
}

pub struct WebhookPipeline {
    ledger: Arc<Ledger>,
    providers: HashMap<String, Arc<dyn BaasProvider>>,
    card_program: Arc<CardProgram>,
    withdrawals: Arc<WithdrawalCoordinator>,
    funding: Arc<FundingRouter>,
    statuses: Arc<StatusUpdater>,
}

impl WebhookPipeline {
    pub fn new(
        ledger: Arc<Ledger>,
        card_program: Arc<CardProgram>,
        withdrawals: Arc<WithdrawalCoordinator>,
        funding: Arc<FundingRouter>,
        statuses: Arc<StatusUpdater>,
    ) -> Self {
        Self {
            ledger,
            providers: HashMap::new(),
            card_program,
            withdrawals,
            funding,
            statuses,
        }
    }

    pub fn register_provider(mut self, provider: Arc<dyn BaasProvider>) -> Self {
        self.providers.insert(provider.name().to_string(), provider);
        self
    }

    /// Runs one delivery through the pipeline. `raw_body` must be the exact
    /// bytes that arrived; the signature is computed over them, not over any
    /// re-serialisation.
    pub async fn ingest(
        &self,
        provider_name: &str,
        raw_body: &[u8],
        headers: &WebhookHeaders,
    ) -> Result<IngestOutcome> {
        let adapter = self
            .providers
            .get(provider_name)
            .ok_or_else(|| CardpoolError::NotFound(format!("provider {}", provider_name)))?;

        adapter
            .verify_webhook_signature(raw_body, headers)
            .map_err(CardpoolError::from)?;
        let event = adapter.parse_event(raw_body).map_err(CardpoolError::from)?;

        let provider = adapter.name().to_string();
        let event_id = event.provider_event_id().to_string();
        let payload: serde_json::Value =
            serde_json::from_slice(raw_body).unwrap_or(serde_json::Value::Null);
        self.ledger
            .record_event(&provider, &event_id, event.type_name(), payload)
            .await;

        if self.ledger.is_event_processed(&provider, &event_id).await {
            metrics::counter!("webhook_events_duplicate").increment(1);
            tracing::info!(provider = %provider, event_id = %event_id, "duplicate event ignored");
            return Ok(IngestOutcome::Duplicate);
        }

        let auth_decision = self.dispatch(&provider, &event).await?;

        self.ledger.mark_event_processed(&provider, &event_id).await;
        metrics::counter!("webhook_events_processed").increment(1);
        Ok(IngestOutcome::Processed { auth_decision })
    }

    async fn dispatch(
        &self,
        provider: &str,
        event: &NormalizedEvent,
    ) -> Result<Option<AuthorizationDecision>> {
        match event {
            NormalizedEvent::CardAuth {
                provider_card_id,
                provider_auth_id,
                amount_minor,
                ..
            } => {
                let decision = self
                    .card_program
                    .handle_auth(provider, provider_card_id, provider_auth_id, *amount_minor)
                    .await?;
                Ok(Some(decision))
            }
            NormalizedEvent::CardAuthReversal {
                provider_auth_id, ..
            } => {
                self.card_program
                    .handle_auth_reversal(provider, provider_auth_id)
                    .await?;
                Ok(None)
            }
            NormalizedEvent::CardClearing {
                provider_card_id,
                provider_auth_id,
                amount_minor,
                provider_transaction_id,
                ..
            } => {
                self.card_program
                    .handle_clearing(
                        provider,
                        provider_card_id,
                        provider_auth_id.as_deref(),
                        *amount_minor,
                        provider_transaction_id,
                    )
                    .await?;
                Ok(None)
            }
            NormalizedEvent::WalletFunding {
                provider_account_id,
                reference,
                amount_minor,
                provider_transaction_id,
                ..
            } => {
                self.funding
                    .handle_wallet_funding(
                        provider,
                        provider_account_id,
                        reference,
                        *amount_minor,
                        provider_transaction_id,
                    )
                    .await?;
                Ok(None)
            }
            NormalizedEvent::PayoutStatus {
                provider_transfer_id,
                status,
                reason,
                ..
            } => {
                self.withdrawals
                    .handle_payout_status(provider, provider_transfer_id, *status, reason.as_deref())
                    .await?;
                Ok(None)
            }
            NormalizedEvent::KycVerification { user_id, status, .. } => {
                self.statuses.handle_kyc_verification(user_id, status).await?;
                Ok(None)
            }
            NormalizedEvent::AccountStatus {
                provider_account_id,
                status,
                ..
            } => {
                self.statuses
                    .handle_account_status(provider_account_id, status)
                    .await?;
                Ok(None)
            }
            NormalizedEvent::CardStatus {
                provider_card_id,
                status,
                ..
            } => {
                self.statuses
                    .handle_card_status(provider_card_id, status)
                    .await?;
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::splitting::PolicyService;
    use cardpool_baas::MockProvider;
    use cardpool_common::model::BaasFundingRoute;
    use cardpool_ledger::directory::CardSpec;

    async fn pipeline_fixture() -> (Arc<Ledger>, WebhookPipeline, String) {
        let ledger = Arc::new(Ledger::new());
        let provider: Arc<dyn BaasProvider> = Arc::new(MockProvider::new());
        let wallet = ledger.create_wallet("trip", "alice").await;
        let card = ledger
            .register_card(CardSpec {
                wallet_id: wallet.wallet_id.clone(),
                holder_user_id: "alice".to_string(),
                provider_name: "MOCK".to_string(),
                external_card_id: "ext_1".to_string(),
                external_account_id: Some("acct_src".to_string()),
                currency: "USD".to_string(),
            })
            .await
            .unwrap();
        ledger
            .upsert_funding_route(BaasFundingRoute {
                provider_name: "MOCK".to_string(),
                provider_account_id: "acct_1".to_string(),
                reference: String::new(),
                wallet_id: wallet.wallet_id.clone(),
                card_id: card.card_id.clone(),
                user_id: "alice".to_string(),
            })
            .await
            .unwrap();

        let policies = Arc::new(PolicyService::new(Arc::clone(&ledger)));
        let card_program = Arc::new(CardProgram::new(Arc::clone(&ledger), policies));
        let withdrawals = Arc::new(WithdrawalCoordinator::new(
            Arc::clone(&ledger),
            Arc::clone(&provider),
        ));
        let funding = Arc::new(FundingRouter::new(Arc::clone(&ledger)));
        let statuses = Arc::new(StatusUpdater::new(Arc::clone(&ledger)));
        let pipeline = WebhookPipeline::new(
            Arc::clone(&ledger),
            card_program,
            withdrawals,
            funding,
            statuses,
        )
        .register_provider(provider);
        (ledger, pipeline, card.card_id)
    }

    fn funding_body(event_id: &str, tx_id: &str) -> Vec<u8> {
        serde_json::json!({
            "type": "WALLET_FUNDING",
            "provider_event_id": event_id,
            "provider_account_id": "acct_1",
            "reference": "",
            "amount_minor": 10_000,
            "currency": "USD",
            "provider_transaction_id": tx_id,
        })
        .to_string()
        .into_bytes()
    }

    #[tokio::test]
    async fn test_redelivery_is_deduplicated() {
        let (ledger, pipeline, card_id) = pipeline_fixture().await;
        let body = funding_body("evt_1", "tx_1");

        let first = pipeline
            .ingest("MOCK", &body, &WebhookHeaders::default())
            .await
            .unwrap();
        assert!(matches!(first, IngestOutcome::Processed { auth_decision: None }));

        let second = pipeline
            .ingest("MOCK", &body, &WebhookHeaders::default())
            .await
            .unwrap();
        assert_eq!(second, IngestOutcome::Duplicate);

        assert_eq!(ledger.processed_event_count().await, 1);
        let view = ledger.reconcile_card(&card_id).await.unwrap();
        assert_eq!(view.pool_balance, 10_000);
    }

    #[tokio::test]
    async fn test_failed_handler_leaves_event_retryable() {
        let (ledger, pipeline, _card_id) = pipeline_fixture().await;
        // Negative amount makes the funding handler fail after the audit row
        // has been recorded.
        let bad = serde_json::json!({
            "type": "WALLET_FUNDING",
            "provider_event_id": "evt_bad",
            "provider_account_id": "acct_1",
            "reference": "",
            "amount_minor": -5,
            "currency": "USD",
            "provider_transaction_id": "tx_bad",
        })
        .to_string()
        .into_bytes();

        assert!(pipeline
            .ingest("MOCK", &bad, &WebhookHeaders::default())
            .await
            .is_err());
        // Audit row exists, processed marker does not: the provider's retry
        // will not be swallowed as a duplicate.
        assert!(ledger.event("MOCK", "evt_bad").await.is_some());
        assert!(!ledger.is_event_processed("MOCK", "evt_bad").await);
    }

    #[tokio::test]
    async fn test_unknown_provider_is_rejected() {
        let (_ledger, pipeline, _card_id) = pipeline_fixture().await;
        let err = pipeline
            .ingest("GHOST", b"{}", &WebhookHeaders::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CardpoolError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_malformed_body_is_invalid_payload() {
        let (_ledger, pipeline, _card_id) = pipeline_fixture().await;
        let err = pipeline
            .ingest("MOCK", b"not json", &WebhookHeaders::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CardpoolError::InvalidPayload(_)));
    }
}
