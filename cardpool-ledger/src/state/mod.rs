use std::collections::HashMap;

use cardpool_common::model::{
    AccountId, AccountScope, AmountMinor, BaasEvent, BaasFundingRoute, Card, CardAuthHold, CardId,
    HoldStatus, KycRecord, LedgerAccount, LedgerEntry, ProcessedEvent, UserId, Wallet,
    WalletId, WalletMember, WithdrawalRequest, WithdrawalTransfer,
};
use cardpool_common::{CardpoolError, Result};

/// Deterministic account ids in the chart-of-accounts path form
/// `scope:card[:user]`. Deriving the id from the key is what enforces the
/// at-most-one-account-per-scope constraints.
pub fn pool_account_id(card_id: &str) -> AccountId {
    format!("pool:{}", card_id)
}

pub fn equity_account_id(card_id: &str, user_id: &str) -> AccountId {
    format!("equity:{}:{}", card_id, user_id)
}

pub fn pending_account_id(card_id: &str) -> AccountId {
    format!("pending:{}", card_id)
}

/// The global persisted state. One write acquisition of the surrounding lock
/// is one storage transaction; every mutating method validates before it
/// applies, so a failed precondition leaves no partial writes.
#[derive(Debug, Default)]
pub struct State {
    pub wallets: HashMap<WalletId, Wallet>,
    /// Members per wallet in join order; the order is load-bearing for
    /// remainder distribution in equal splits.
    pub members: HashMap<WalletId, Vec<WalletMember>>,
    pub cards: HashMap<CardId, Card>,
    pub cards_by_external: HashMap<String, CardId>,
    /// `(provider_name, external_account_id)` -> card that account settles.
    pub linked_accounts: HashMap<(String, String), CardId>,

    pub accounts: HashMap<AccountId, LedgerAccount>,
    pub entries: Vec<LedgerEntry>,
    pub entries_by_tx: HashMap<String, Vec<usize>>,

    /// `(provider_name, provider_auth_id)` -> hold.
    pub holds: HashMap<(String, String), CardAuthHold>,

    pub withdrawal_requests: HashMap<String, WithdrawalRequest>,
    /// Request ids in insertion order, for newest-first listings.
    pub withdrawal_order: Vec<String>,
    pub transfers: HashMap<String, WithdrawalTransfer>,
    /// `(provider_name, provider_transfer_id)` -> transfer id.
    pub transfers_by_provider: HashMap<(String, String), String>,
    pub transfer_by_request: HashMap<String, String>,

    /// `(provider_name, provider_account_id, reference)` -> route.
    pub routes: HashMap<(String, String, String), BaasFundingRoute>,

    /// `(provider_name, provider_event_id)` keyed audit and dedup journals.
    pub baas_events: HashMap<(String, String), BaasEvent>,
    pub processed_events: HashMap<(String, String), ProcessedEvent>,

    pub kyc: HashMap<UserId, KycRecord>,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance(&self, account_id: &str) -> AmountMinor {
        self.accounts.get(account_id).map(|a| a.balance).unwrap_or(0)
    }

    pub fn pool_balance(&self, card_id: &str) -> AmountMinor {
        self.balance(&pool_account_id(card_id))
    }

    pub fn equity_balance(&self, card_id: &str, user_id: &str) -> AmountMinor {
        self.balance(&equity_account_id(card_id, user_id))
    }

    pub fn pending_balance(&self, card_id: &str) -> AmountMinor {
        self.balance(&pending_account_id(card_id))
    }

    /// Creates an account for the scope if it does not exist yet and returns
    /// its id. Accounts persist for the card's lifetime once created.
    pub fn ensure_account(
        &mut self,
        card: &Card,
        scope: AccountScope,
        user_id: Option<&str>,
        now: u64,
    ) -> AccountId {
        let account_id = match scope {
            AccountScope::CardPool => pool_account_id(&card.card_id),
            AccountScope::CardPendingWithdrawal => pending_account_id(&card.card_id),
            AccountScope::CardMemberEquity => {
                equity_account_id(&card.card_id, user_id.expect("equity account requires a user"))
            }
        };
        self.accounts.entry(account_id.clone()).or_insert_with(|| LedgerAccount {
            account_id: account_id.clone(),
            wallet_id: card.wallet_id.clone(),
            card_id: card.card_id.clone(),
            scope,
            user_id: user_id.map(|u| u.to_string()),
            balance: 0,
            currency: card.currency.clone(),
            created_at: now,
        });
        account_id
    }

    pub fn members_of(&self, wallet_id: &str) -> &[WalletMember] {
        self.members.get(wallet_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_member(&self, wallet_id: &str, user_id: &str) -> bool {
        self.members_of(wallet_id).iter().any(|m| m.user_id == user_id)
    }

    pub fn card(&self, card_id: &str) -> Result<&Card> {
        self.cards
            .get(card_id)
            .ok_or_else(|| CardpoolError::NotFound(format!("card {}", card_id)))
    }

    pub fn wallet(&self, wallet_id: &str) -> Result<&Wallet> {
        self.wallets
            .get(wallet_id)
            .ok_or_else(|| CardpoolError::NotFound(format!("wallet {}", wallet_id)))
    }

    /// Sum of amounts still held by pending authorisations on the card.
    pub fn pending_hold_total(&self, card_id: &str) -> AmountMinor {
        self.holds
            .values()
            .filter(|h| h.card_id == card_id && h.status == HoldStatus::Pending)
            .map(|h| h.amount_minor)
            .sum()
    }
}
