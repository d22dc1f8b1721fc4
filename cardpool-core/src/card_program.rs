//! The card program: turns normalised card events into ledger postings and
//! hold transitions, and owns the background sweep that expires stale holds.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use cardpool_common::{CardpoolError, Result};
use cardpool_ledger::{AuthorizationDecision, Ledger};

use crate::splitting::{compute_splits, PolicyService};

/// Holds with no clearing after this long stop blocking the pool.
pub const DEFAULT_HOLD_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

pub struct CardProgram {
    ledger: Arc<Ledger>,
    policies: Arc<PolicyService>,
    hold_ttl: Duration,
}

impl CardProgram {
    pub fn new(ledger: Arc<Ledger>, policies: Arc<PolicyService>) -> Self {
        Self {
            ledger,
            policies,
            hold_ttl: DEFAULT_HOLD_TTL,
        }
    }

    pub fn with_hold_ttl(mut self, hold_ttl: Duration) -> Self {
        self.hold_ttl = hold_ttl;
        self
    }

    /// Authorisation decision. Everything that matters (card status, available
    /// pool, hold insert) happens inside one ledger transaction.
    pub async fn handle_auth(
        &self,
        provider_name: &str,
        provider_card_id: &str,
        provider_auth_id: &str,
        amount_minor: i64,
    ) -> Result<AuthorizationDecision> {
        self.ledger
            .authorize_card(provider_name, provider_card_id, provider_auth_id, amount_minor)
            .await
    }

    /// Clearing: split per policy, post the capture keyed by the provider's
    /// transaction id, and settle the hold if one is referenced. The clearing
    /// amount wins when it differs from the authorised amount.
    pub async fn handle_clearing(
        &self,
        provider_name: &str,
        provider_card_id: &str,
        provider_auth_id: Option<&str>,
        amount_minor: i64,
        provider_transaction_id: &str,
    ) -> Result<()> {
        if amount_minor <= 0 {
            return Err(CardpoolError::InvalidPayload(format!(
                "clearing amount must be positive, got {}",
                amount_minor
            )));
        }
        let card = match self.ledger.card_by_external(provider_card_id).await {
            Some(card) => card,
            None => {
                tracing::warn!(
                    provider = provider_name,
                    provider_card_id,
                    provider_transaction_id,
                    "clearing for unknown card ignored"
                );
                return Ok(());
            }
        };

        let policy = self.policies.policy_for(&card.wallet_id).await?;
        let members: Vec<String> = self
            .ledger
            .members_of(&card.wallet_id)
            .await?
            .into_iter()
            .map(|m| m.user_id)
            .collect();
        let splits = compute_splits(policy, &card.holder_user_id, &members, amount_minor);

        self.ledger
            .post_card_capture(
                &card.card_id,
                &splits,
                provider_transaction_id,
                json!({
                    "provider": provider_name,
                    "provider_card_id": provider_card_id,
                    "provider_auth_id": provider_auth_id,
                }),
            )
            .await?;

        if let Some(auth_id) = provider_auth_id {
            if self.ledger.clear_hold(provider_name, auth_id).await.is_none() {
                tracing::debug!(
                    provider = provider_name,
                    auth_id,
                    "clearing referenced an unknown authorisation"
                );
            }
        }
        Ok(())
    }

    /// Authorisation reversal: release the hold. The auth never posted, so
    /// there is nothing to do on the ledger; a missing hold is logged and
    /// ignored (it may have expired, or the reversal raced its own auth).
    pub async fn handle_auth_reversal(
        &self,
        provider_name: &str,
        provider_auth_id: &str,
    ) -> Result<()> {
        if self
            .ledger
            .reverse_hold(provider_name, provider_auth_id)
            .await
            .is_none()
        {
            tracing::info!(
                provider = provider_name,
                provider_auth_id,
                "auth reversal without a matching hold ignored"
            );
        }
        Ok(())
    }

    /// Spawns the hold expiry sweep. Operational safety net only; nothing in
    /// the inbound event flow depends on it.
    pub fn spawn_hold_sweep(self: &Arc<Self>, every: Duration) -> tokio::task::JoinHandle<()> {
        let program = Arc::clone(self);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(every);
            loop {
                tick.tick().await;
                let expired = program.ledger.expire_holds(program.hold_ttl.as_secs()).await;
                if !expired.is_empty() {
                    tracing::info!(count = expired.len(), "expired stale authorisation holds");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardpool_common::model::{CardStatus, HoldStatus, SplitPolicy};
    use cardpool_ledger::directory::CardSpec;
    use serde_json::Value;

    async fn fixture(members: &[&str], policy: SplitPolicy) -> (Arc<Ledger>, Arc<CardProgram>, String) {
        let ledger = Arc::new(Ledger::new());
        let wallet = ledger.create_wallet("trip", members[0]).await;
        for member in &members[1..] {
            ledger.add_member(&wallet.wallet_id, member).await.unwrap();
        }
        ledger
            .set_split_policy(&wallet.wallet_id, policy)
            .await
            .unwrap();
        let card = ledger
            .register_card(CardSpec {
                wallet_id: wallet.wallet_id.clone(),
                holder_user_id: members[0].to_string(),
                provider_name: "MOCK".to_string(),
                external_card_id: "ext_1".to_string(),
                external_account_id: None,
                currency: "USD".to_string(),
            })
            .await
            .unwrap();
        ledger
            .set_card_status(&card.card_id, CardStatus::Active)
            .await
            .unwrap();
        let policies = Arc::new(PolicyService::new(Arc::clone(&ledger)));
        let program = Arc::new(CardProgram::new(Arc::clone(&ledger), policies));
        (ledger, program, card.card_id)
    }

    #[tokio::test]
    async fn test_clearing_posts_equal_splits() {
        let (ledger, program, card_id) = fixture(&["alice", "bob", "carol"], SplitPolicy::EqualSplit).await;
        for (i, user) in ["alice", "bob", "carol"].iter().enumerate() {
            ledger
                .post_card_deposit(&card_id, user, 1_000, &format!("seed_{}", i), Value::Null)
                .await
                .unwrap();
        }

        program
            .handle_clearing("MOCK", "ext_1", None, 1_000, "txn_1")
            .await
            .unwrap();

        let view = ledger.reconcile_card(&card_id).await.unwrap();
        assert!(view.consistent);
        assert_eq!(view.pool_balance, 2_000);
        assert_eq!(view.member_equity[0].balance, 666); // 1000 - 334
        assert_eq!(view.member_equity[1].balance, 667);
        assert_eq!(view.member_equity[2].balance, 667);
    }

    #[tokio::test]
    async fn test_clearing_settles_referenced_hold() {
        let (ledger, program, card_id) = fixture(&["alice"], SplitPolicy::PayerOnly).await;
        ledger
            .post_card_deposit(&card_id, "alice", 50_000, "seed", Value::Null)
            .await
            .unwrap();
        program
            .handle_auth("MOCK", "ext_1", "auth_1", 5_000)
            .await
            .unwrap();

        // Clears for a different amount than authorised; the posted capture
        // uses the clearing amount and the hold is still settled.
        program
            .handle_clearing("MOCK", "ext_1", Some("auth_1"), 4_500, "txn_1")
            .await
            .unwrap();

        let hold = ledger.hold("MOCK", "auth_1").await.unwrap();
        assert_eq!(hold.status, HoldStatus::Cleared);
        let view = ledger.reconcile_card(&card_id).await.unwrap();
        assert_eq!(view.pool_balance, 45_500);
    }

    #[tokio::test]
    async fn test_clearing_for_unknown_card_is_ignored() {
        let (ledger, program, _card_id) = fixture(&["alice"], SplitPolicy::PayerOnly).await;
        program
            .handle_clearing("MOCK", "ext_ghost", None, 1_000, "txn_1")
            .await
            .unwrap();
        assert_eq!(ledger.entry_count().await, 0);
    }

    #[tokio::test]
    async fn test_clearing_is_idempotent_by_provider_transaction() {
        let (ledger, program, card_id) = fixture(&["alice"], SplitPolicy::PayerOnly).await;
        ledger
            .post_card_deposit(&card_id, "alice", 10_000, "seed", Value::Null)
            .await
            .unwrap();

        program
            .handle_clearing("MOCK", "ext_1", None, 1_000, "txn_1")
            .await
            .unwrap();
        program
            .handle_clearing("MOCK", "ext_1", None, 1_000, "txn_1")
            .await
            .unwrap();

        let view = ledger.reconcile_card(&card_id).await.unwrap();
        assert_eq!(view.pool_balance, 9_000);
    }

    #[tokio::test]
    async fn test_auth_reversal_releases_hold() {
        let (ledger, program, card_id) = fixture(&["alice"], SplitPolicy::PayerOnly).await;
        ledger
            .post_card_deposit(&card_id, "alice", 10_000, "seed", Value::Null)
            .await
            .unwrap();
        program
            .handle_auth("MOCK", "ext_1", "auth_1", 5_000)
            .await
            .unwrap();
        program.handle_auth_reversal("MOCK", "auth_1").await.unwrap();
        let hold = ledger.hold("MOCK", "auth_1").await.unwrap();
        assert_eq!(hold.status, HoldStatus::Reversed);

        // Reversal before its auth is a no-op.
        program.handle_auth_reversal("MOCK", "auth_ghost").await.unwrap();
    }
}
