//! The funding router: maps an inbound provider credit to the `(card, user)`
//! pair it funds and posts the deposit. Unroutable credits are a structured
//! operator error, never a crash; the money stays at the provider until the
//! route is fixed and the event replayed offline.

use std::sync::Arc;

use serde_json::json;

use cardpool_common::Result;
use cardpool_ledger::Ledger;

pub struct FundingRouter {
    ledger: Arc<Ledger>,
}

impl FundingRouter {
    pub fn new(ledger: Arc<Ledger>) -> Self {
        Self { ledger }
    }

    pub async fn handle_wallet_funding(
        &self,
        provider_name: &str,
        provider_account_id: &str,
        reference: &str,
        amount_minor: i64,
        provider_transaction_id: &str,
    ) -> Result<()> {
        if amount_minor <= 0 {
            return Err(cardpool_common::CardpoolError::InvalidPayload(format!(
                "funding amount must be positive, got {}",
                amount_minor
            )));
        }

        let route = match self
            .ledger
            .resolve_funding_route(provider_name, provider_account_id, reference)
            .await
        {
            Some(route) => route,
            None => {
                metrics::counter!("funding_route_misses").increment(1);
                tracing::error!(
                    code = "FUNDING_ROUTE_NOT_FOUND",
                    provider = provider_name,
                    provider_account_id,
                    reference,
                    amount_minor,
                    provider_transaction_id,
                    "no funding route matched; credit left for manual reconciliation"
                );
                return Ok(());
            }
        };

        self.ledger
            .post_card_deposit(
                &route.card_id,
                &route.user_id,
                amount_minor,
                provider_transaction_id,
                json!({
                    "provider": provider_name,
                    "provider_account_id": provider_account_id,
                    "reference": reference,
                }),
            )
            .await?;
        tracing::info!(
            card_id = %route.card_id,
            user_id = %route.user_id,
            amount_minor,
            "inbound funding credited"
        );
        Ok(())
    }
}
