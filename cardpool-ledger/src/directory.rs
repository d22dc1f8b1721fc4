//! Wallet, membership and card directory operations, including the eager
//! ledger-account initialisation that keeps capture and reconciliation reads
//! free of lazy-creation writes.

use uuid::Uuid;

use cardpool_common::model::{
    AccountScope, Card, CardStatus, KycRecord, KycStatus, MemberRole, SplitPolicy, UserId, Wallet,
    WalletMember,
};
use cardpool_common::utils::time::current_time;
use cardpool_common::{CardpoolError, Result};

use crate::manager::Ledger;

/// Everything needed to register a card issued by the provider layer.
#[derive(Debug, Clone)]
pub struct CardSpec {
    pub wallet_id: String,
    pub holder_user_id: String,
    pub provider_name: String,
    pub external_card_id: String,
    pub external_account_id: Option<String>,
    pub currency: String,
}

impl Ledger {
    pub async fn create_wallet(&self, name: &str, admin_user_id: &str) -> Wallet {
        let now = current_time();
        let wallet = Wallet {
            wallet_id: format!("wal_{}", Uuid::new_v4().simple()),
            name: name.to_string(),
            admin_user_id: admin_user_id.to_string(),
            split_policy: SplitPolicy::PayerOnly,
            created_at: now,
        };

        let mut state = self.state.write().await;
        state.members.insert(
            wallet.wallet_id.clone(),
            vec![WalletMember {
                wallet_id: wallet.wallet_id.clone(),
                user_id: admin_user_id.to_string(),
                role: MemberRole::Admin,
                joined_at: now,
            }],
        );
        state.wallets.insert(wallet.wallet_id.clone(), wallet.clone());
        wallet
    }

    /// Adds a member and eagerly creates an equity account for every card the
    /// wallet already has, so later captures can split onto the newcomer
    /// without lazy account creation on the read path.
    pub async fn add_member(&self, wallet_id: &str, user_id: &str) -> Result<WalletMember> {
        let now = current_time();
        let mut state = self.state.write().await;
        state.wallet(wallet_id)?;
        if state.is_member(wallet_id, user_id) {
            return Err(CardpoolError::Duplicate(format!(
                "user {} is already a member of wallet {}",
                user_id, wallet_id
            )));
        }

        let member = WalletMember {
            wallet_id: wallet_id.to_string(),
            user_id: user_id.to_string(),
            role: MemberRole::Member,
            joined_at: now,
        };
        state
            .members
            .entry(wallet_id.to_string())
            .or_default()
            .push(member.clone());

        let wallet_cards: Vec<Card> = state
            .cards
            .values()
            .filter(|c| c.wallet_id == wallet_id)
            .cloned()
            .collect();
        for card in wallet_cards {
            state.ensure_account(&card, AccountScope::CardMemberEquity, Some(user_id), now);
        }

        Ok(member)
    }

    pub async fn members_of(&self, wallet_id: &str) -> Result<Vec<WalletMember>> {
        let state = self.state.read().await;
        state.wallet(wallet_id)?;
        Ok(state.members_of(wallet_id).to_vec())
    }

    pub async fn is_member(&self, wallet_id: &str, user_id: &str) -> bool {
        self.state.read().await.is_member(wallet_id, user_id)
    }

    pub async fn wallet(&self, wallet_id: &str) -> Result<Wallet> {
        Ok(self.state.read().await.wallet(wallet_id)?.clone())
    }

    pub async fn split_policy(&self, wallet_id: &str) -> Result<SplitPolicy> {
        Ok(self.state.read().await.wallet(wallet_id)?.split_policy)
    }

    pub async fn set_split_policy(&self, wallet_id: &str, policy: SplitPolicy) -> Result<Wallet> {
        let mut state = self.state.write().await;
        state.wallet(wallet_id)?;
        let wallet = state
            .wallets
            .get_mut(wallet_id)
            .expect("wallet checked above");
        wallet.split_policy = policy;
        Ok(wallet.clone())
    }

    /// Registers a provider-issued card and initialises its ledger accounts
    /// in the same storage transaction: one pool account and one equity
    /// account per current member, all at zero.
    pub async fn register_card(&self, spec: CardSpec) -> Result<Card> {
        let now = current_time();
        let mut state = self.state.write().await;
        state.wallet(&spec.wallet_id)?;
        if !state.is_member(&spec.wallet_id, &spec.holder_user_id) {
            return Err(CardpoolError::Forbidden(format!(
                "user {} is not a member of wallet {}",
                spec.holder_user_id, spec.wallet_id
            )));
        }
        if state.cards_by_external.contains_key(&spec.external_card_id) {
            return Err(CardpoolError::Duplicate(format!(
                "external card id {} is already registered",
                spec.external_card_id
            )));
        }
        if let Some(account_id) = &spec.external_account_id {
            let key = (spec.provider_name.clone(), account_id.clone());
            if state.linked_accounts.contains_key(&key) {
                return Err(CardpoolError::AccountAlreadyLinkedToCard(account_id.clone()));
            }
        }

        let card = Card {
            card_id: format!("card_{}", Uuid::new_v4().simple()),
            wallet_id: spec.wallet_id.clone(),
            holder_user_id: spec.holder_user_id.clone(),
            status: CardStatus::PendingActivation,
            provider_name: spec.provider_name.clone(),
            external_card_id: spec.external_card_id.clone(),
            external_account_id: spec.external_account_id.clone(),
            currency: spec.currency.clone(),
            created_at: now,
        };

        state.ensure_account(&card, AccountScope::CardPool, None, now);
        let member_ids: Vec<UserId> = state
            .members_of(&spec.wallet_id)
            .iter()
            .map(|m| m.user_id.clone())
            .collect();
        for user_id in member_ids {
            state.ensure_account(&card, AccountScope::CardMemberEquity, Some(&user_id), now);
        }

        state
            .cards_by_external
            .insert(spec.external_card_id.clone(), card.card_id.clone());
        if let Some(account_id) = &spec.external_account_id {
            state.linked_accounts.insert(
                (spec.provider_name.clone(), account_id.clone()),
                card.card_id.clone(),
            );
        }
        state.cards.insert(card.card_id.clone(), card.clone());

        tracing::info!(
            card_id = %card.card_id,
            wallet_id = %card.wallet_id,
            provider = %card.provider_name,
            "card registered"
        );
        Ok(card)
    }

    pub async fn card(&self, card_id: &str) -> Result<Card> {
        Ok(self.state.read().await.card(card_id)?.clone())
    }

    pub async fn cards_of_wallet(&self, wallet_id: &str) -> Vec<Card> {
        let state = self.state.read().await;
        let mut cards: Vec<Card> = state
            .cards
            .values()
            .filter(|c| c.wallet_id == wallet_id)
            .cloned()
            .collect();
        cards.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        cards
    }

    pub async fn card_by_external(&self, external_card_id: &str) -> Option<Card> {
        let state = self.state.read().await;
        let card_id = state.cards_by_external.get(external_card_id)?;
        state.cards.get(card_id).cloned()
    }

    pub async fn set_card_status(&self, card_id: &str, status: CardStatus) -> Result<Card> {
        let mut state = self.state.write().await;
        state.card(card_id)?;
        let card = state.cards.get_mut(card_id).expect("card checked above");
        card.status = status;
        Ok(card.clone())
    }

    pub async fn set_kyc_status(&self, user_id: &str, status: KycStatus) -> KycRecord {
        let record = KycRecord {
            user_id: user_id.to_string(),
            status,
            updated_at: current_time(),
        };
        let mut state = self.state.write().await;
        state.kyc.insert(user_id.to_string(), record.clone());
        record
    }

    pub async fn kyc_status(&self, user_id: &str) -> Option<KycRecord> {
        self.state.read().await.kyc.get(user_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card_spec(wallet_id: &str, holder: &str, external: &str) -> CardSpec {
        CardSpec {
            wallet_id: wallet_id.to_string(),
            holder_user_id: holder.to_string(),
            provider_name: "MOCK".to_string(),
            external_card_id: external.to_string(),
            external_account_id: None,
            currency: "USD".to_string(),
        }
    }

    #[tokio::test]
    async fn test_register_card_initialises_accounts() {
        let ledger = Ledger::new();
        let wallet = ledger.create_wallet("trip", "alice").await;
        ledger.add_member(&wallet.wallet_id, "bob").await.unwrap();

        let card = ledger
            .register_card(card_spec(&wallet.wallet_id, "alice", "ext_1"))
            .await
            .unwrap();

        let state = ledger.state.read().await;
        assert_eq!(state.pool_balance(&card.card_id), 0);
        assert!(state
            .accounts
            .contains_key(&crate::state::equity_account_id(&card.card_id, "alice")));
        assert!(state
            .accounts
            .contains_key(&crate::state::equity_account_id(&card.card_id, "bob")));
    }

    #[tokio::test]
    async fn test_register_card_rejects_duplicate_external_id() {
        let ledger = Ledger::new();
        let wallet = ledger.create_wallet("trip", "alice").await;
        ledger
            .register_card(card_spec(&wallet.wallet_id, "alice", "ext_1"))
            .await
            .unwrap();

        let err = ledger
            .register_card(card_spec(&wallet.wallet_id, "alice", "ext_1"))
            .await
            .unwrap_err();
        assert!(matches!(err, CardpoolError::Duplicate(_)));
    }

    #[tokio::test]
    async fn test_register_card_rejects_linked_account_reuse() {
        let ledger = Ledger::new();
        let wallet = ledger.create_wallet("trip", "alice").await;
        let mut spec = card_spec(&wallet.wallet_id, "alice", "ext_1");
        spec.external_account_id = Some("acct_9".to_string());
        ledger.register_card(spec).await.unwrap();

        let mut spec2 = card_spec(&wallet.wallet_id, "alice", "ext_2");
        spec2.external_account_id = Some("acct_9".to_string());
        let err = ledger.register_card(spec2).await.unwrap_err();
        assert!(matches!(err, CardpoolError::AccountAlreadyLinkedToCard(_)));
    }

    #[tokio::test]
    async fn test_new_member_gets_equity_accounts_for_existing_cards() {
        let ledger = Ledger::new();
        let wallet = ledger.create_wallet("trip", "alice").await;
        let card = ledger
            .register_card(card_spec(&wallet.wallet_id, "alice", "ext_1"))
            .await
            .unwrap();

        ledger.add_member(&wallet.wallet_id, "carol").await.unwrap();

        let state = ledger.state.read().await;
        assert!(state
            .accounts
            .contains_key(&crate::state::equity_account_id(&card.card_id, "carol")));
    }

    #[tokio::test]
    async fn test_add_member_rejects_duplicates() {
        let ledger = Ledger::new();
        let wallet = ledger.create_wallet("trip", "alice").await;
        ledger.add_member(&wallet.wallet_id, "bob").await.unwrap();
        let err = ledger.add_member(&wallet.wallet_id, "bob").await.unwrap_err();
        assert!(matches!(err, CardpoolError::Duplicate(_)));
    }
}
