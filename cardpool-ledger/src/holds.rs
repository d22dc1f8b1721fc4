//! Authorisation holds. The decision, the hold insert and the available-funds
//! computation happen under one write acquisition so concurrent
//! authorisations cannot double-spend the pool.

use serde::Serialize;

use cardpool_common::model::{AmountMinor, CardAuthHold, CardStatus, HoldStatus};
use cardpool_common::utils::time::current_time;
use cardpool_common::{CardpoolError, Result};

use crate::manager::Ledger;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeclineReason {
    UnknownCard,
    CardNotActive,
    WalletNotFound,
    InsufficientFunds,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthorizationDecision {
    Approve,
    Decline { reason: DeclineReason },
}

impl AuthorizationDecision {
    pub fn is_approved(&self) -> bool {
        matches!(self, AuthorizationDecision::Approve)
    }
}

impl Ledger {
    /// Decides an authorisation request. Approval inserts a pending hold; a
    /// replayed `provider_auth_id` returns the earlier approval without
    /// touching the books. Declines are not persisted.
    pub async fn authorize_card(
        &self,
        provider_name: &str,
        external_card_id: &str,
        provider_auth_id: &str,
        amount: AmountMinor,
    ) -> Result<AuthorizationDecision> {
        if amount <= 0 {
            return Err(CardpoolError::Validation(format!(
                "authorisation amount must be positive, got {}",
                amount
            )));
        }

        let mut state = self.state.write().await;
        let hold_key = (provider_name.to_string(), provider_auth_id.to_string());
        if state.holds.contains_key(&hold_key) {
            return Ok(AuthorizationDecision::Approve);
        }

        let card = match state
            .cards_by_external
            .get(external_card_id)
            .and_then(|id| state.cards.get(id))
        {
            Some(card) => card.clone(),
            None => return Ok(decline(DeclineReason::UnknownCard, external_card_id, amount)),
        };
        if card.status != CardStatus::Active {
            return Ok(decline(DeclineReason::CardNotActive, external_card_id, amount));
        }
        if !state.wallets.contains_key(&card.wallet_id) {
            return Ok(decline(DeclineReason::WalletNotFound, external_card_id, amount));
        }

        let available = state.pool_balance(&card.card_id) - state.pending_hold_total(&card.card_id);
        if available < amount {
            return Ok(decline(DeclineReason::InsufficientFunds, external_card_id, amount));
        }

        state.holds.insert(
            hold_key,
            CardAuthHold {
                wallet_id: card.wallet_id.clone(),
                card_id: card.card_id.clone(),
                provider_name: provider_name.to_string(),
                provider_auth_id: provider_auth_id.to_string(),
                amount_minor: amount,
                status: HoldStatus::Pending,
                created_at: current_time(),
            },
        );
        metrics::counter!("card_auths_approved").increment(1);
        tracing::info!(
            card_id = %card.card_id,
            auth_id = %provider_auth_id,
            amount,
            "authorisation approved"
        );
        Ok(AuthorizationDecision::Approve)
    }

    /// Marks the hold behind a clearing as settled. The clearing amount may
    /// differ from the authorised amount; the hold is simply closed.
    pub async fn clear_hold(
        &self,
        provider_name: &str,
        provider_auth_id: &str,
    ) -> Option<CardAuthHold> {
        let mut state = self.state.write().await;
        let hold = state
            .holds
            .get_mut(&(provider_name.to_string(), provider_auth_id.to_string()))?;
        if matches!(hold.status, HoldStatus::Pending | HoldStatus::Expired) {
            hold.status = HoldStatus::Cleared;
        }
        Some(hold.clone())
    }

    /// Releases a hold on an authorisation reversal. Only pending holds move.
    pub async fn reverse_hold(
        &self,
        provider_name: &str,
        provider_auth_id: &str,
    ) -> Option<CardAuthHold> {
        let mut state = self.state.write().await;
        let hold = state
            .holds
            .get_mut(&(provider_name.to_string(), provider_auth_id.to_string()))?;
        if hold.status == HoldStatus::Pending {
            hold.status = HoldStatus::Reversed;
        }
        Some(hold.clone())
    }

    /// Expires pending holds older than `ttl_secs` so the card's available
    /// funds recover when a clearing never arrives. Returns what expired.
    pub async fn expire_holds(&self, ttl_secs: u64) -> Vec<CardAuthHold> {
        let now = current_time();
        let mut state = self.state.write().await;
        let mut expired = Vec::new();
        for hold in state.holds.values_mut() {
            if hold.status == HoldStatus::Pending && now.saturating_sub(hold.created_at) >= ttl_secs {
                hold.status = HoldStatus::Expired;
                expired.push(hold.clone());
            }
        }
        for hold in &expired {
            metrics::counter!("card_auth_holds_expired").increment(1);
            tracing::warn!(
                card_id = %hold.card_id,
                auth_id = %hold.provider_auth_id,
                amount = hold.amount_minor,
                "authorisation hold expired without clearing"
            );
        }
        expired
    }

    pub async fn hold(&self, provider_name: &str, provider_auth_id: &str) -> Option<CardAuthHold> {
        self.state
            .read()
            .await
            .holds
            .get(&(provider_name.to_string(), provider_auth_id.to_string()))
            .cloned()
    }
}

fn decline(
    reason: DeclineReason,
    external_card_id: &str,
    amount: AmountMinor,
) -> AuthorizationDecision {
    metrics::counter!("card_auths_declined").increment(1);
    tracing::info!(
        external_card_id = %external_card_id,
        amount,
        ?reason,
        "authorisation declined"
    );
    AuthorizationDecision::Decline { reason }
}
