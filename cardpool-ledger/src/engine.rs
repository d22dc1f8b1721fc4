//! The posting engine: applies one atomic balanced set of entries keyed by a
//! caller-supplied transaction id. The engine is sign-agnostic; which side of
//! an operation plays debit and which plays credit is chosen by the recipes in
//! `service`.

use std::collections::HashMap;

use thiserror::Error;

use cardpool_common::model::{AccountId, LedgerEntry, Posting, PostingReceipt};
use cardpool_common::CardpoolError;

use crate::state::State;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PostingError {
    #[error("Transaction id must not be empty")]
    MissingTransactionId,

    #[error("A posting must contain at least one entry")]
    NoPostings,

    #[error("Entry amount must be strictly positive, got {0}")]
    InvalidAmount(i64),

    #[error("Entry debits and credits the same account: {0}")]
    SelfPosting(AccountId),

    #[error("Ledger account not found: {0}")]
    AccountNotFound(AccountId),

    #[error("Balance overflow on account {0}")]
    BalanceOverflow(AccountId),

    #[error("Unbalanced posting for transaction {0}")]
    UnbalancedPosting(String),
}

impl From<PostingError> for CardpoolError {
    fn from(err: PostingError) -> Self {
        match err {
            PostingError::AccountNotFound(id) => {
                CardpoolError::NotFound(format!("ledger account {}", id))
            }
            PostingError::BalanceOverflow(_) | PostingError::UnbalancedPosting(_) => {
                CardpoolError::Invariant(err.to_string())
            }
            other => CardpoolError::Validation(other.to_string()),
        }
    }
}

/// Returns the committed receipt for `transaction_id` if it was already
/// applied. Recipes call this before re-evaluating their preconditions so a
/// replayed request short-circuits instead of failing against post-commit
/// balances.
pub fn existing_receipt(state: &State, transaction_id: &str) -> Option<PostingReceipt> {
    let indices = state.entries_by_tx.get(transaction_id)?;
    let entries: Vec<LedgerEntry> = indices.iter().map(|i| state.entries[*i].clone()).collect();
    let accounts = snapshot_accounts(state, &entries);
    Some(PostingReceipt {
        transaction_id: transaction_id.to_string(),
        entries,
        accounts,
        replayed: true,
    })
}

/// Applies a balanced posting atomically: validates everything, computes the
/// prospective balances, verifies per-card conservation, and only then
/// writes. Idempotent by transaction id.
pub fn apply(
    state: &mut State,
    transaction_id: &str,
    postings: &[Posting],
    now: u64,
) -> Result<PostingReceipt, PostingError> {
    if transaction_id.is_empty() {
        return Err(PostingError::MissingTransactionId);
    }
    if postings.is_empty() {
        return Err(PostingError::NoPostings);
    }
    if let Some(receipt) = existing_receipt(state, transaction_id) {
        return Ok(receipt);
    }

    // Prospective balance deltas, debit and credit applied per the account's
    // normal side. Nothing is written until every check has passed.
    let mut deltas: HashMap<AccountId, i64> = HashMap::new();
    for posting in postings {
        if posting.amount <= 0 {
            return Err(PostingError::InvalidAmount(posting.amount));
        }
        if posting.debit_account_id == posting.credit_account_id {
            return Err(PostingError::SelfPosting(posting.debit_account_id.clone()));
        }
        let debit = state
            .accounts
            .get(&posting.debit_account_id)
            .ok_or_else(|| PostingError::AccountNotFound(posting.debit_account_id.clone()))?;
        let credit = state
            .accounts
            .get(&posting.credit_account_id)
            .ok_or_else(|| PostingError::AccountNotFound(posting.credit_account_id.clone()))?;

        let debit_delta = if debit.scope.debit_normal() { posting.amount } else { -posting.amount };
        let credit_delta = if credit.scope.debit_normal() { -posting.amount } else { posting.amount };
        add_delta(&mut deltas, &posting.debit_account_id, debit_delta)?;
        add_delta(&mut deltas, &posting.credit_account_id, credit_delta)?;
    }

    // Conservation check: for every touched card the prospective pool must
    // still equal member equity plus pending withdrawals. A posting that
    // crosses cards, or a recipe bug, surfaces here before anything commits.
    let mut touched_cards: Vec<String> = deltas
        .keys()
        .filter_map(|id| state.accounts.get(id).map(|a| a.card_id.clone()))
        .collect();
    touched_cards.sort();
    touched_cards.dedup();
    for card_id in &touched_cards {
        let mut pool: i64 = 0;
        let mut claims: i64 = 0;
        for account in state.accounts.values().filter(|a| &a.card_id == card_id) {
            let delta = deltas.get(&account.account_id).copied().unwrap_or(0);
            let balance = account
                .balance
                .checked_add(delta)
                .ok_or_else(|| PostingError::BalanceOverflow(account.account_id.clone()))?;
            if account.scope.debit_normal() {
                pool += balance;
            } else {
                claims += balance;
            }
        }
        if pool != claims {
            return Err(PostingError::UnbalancedPosting(transaction_id.to_string()));
        }
    }

    // Commit: append entries, move balances.
    let mut entry_indices = Vec::with_capacity(postings.len());
    let mut entries = Vec::with_capacity(postings.len());
    for (idx, posting) in postings.iter().enumerate() {
        let entry = LedgerEntry {
            entry_id: format!("entry-{}-{}", transaction_id, idx),
            transaction_id: transaction_id.to_string(),
            debit_account_id: posting.debit_account_id.clone(),
            credit_account_id: posting.credit_account_id.clone(),
            amount: posting.amount,
            metadata: posting.metadata.clone(),
            created_at: now,
        };
        entry_indices.push(state.entries.len());
        state.entries.push(entry.clone());
        entries.push(entry);
    }
    state
        .entries_by_tx
        .insert(transaction_id.to_string(), entry_indices);
    for (account_id, delta) in &deltas {
        if let Some(account) = state.accounts.get_mut(account_id) {
            account.balance += delta;
        }
    }

    let accounts = snapshot_accounts(state, &entries);
    Ok(PostingReceipt {
        transaction_id: transaction_id.to_string(),
        entries,
        accounts,
        replayed: false,
    })
}

fn add_delta(
    deltas: &mut HashMap<AccountId, i64>,
    account_id: &AccountId,
    amount: i64,
) -> Result<(), PostingError> {
    let slot = deltas.entry(account_id.clone()).or_insert(0);
    *slot = slot
        .checked_add(amount)
        .ok_or_else(|| PostingError::BalanceOverflow(account_id.clone()))?;
    Ok(())
}

fn snapshot_accounts(state: &State, entries: &[LedgerEntry]) -> Vec<cardpool_common::model::LedgerAccount> {
    let mut seen: Vec<AccountId> = Vec::new();
    for entry in entries {
        for id in [&entry.debit_account_id, &entry.credit_account_id] {
            if !seen.contains(id) {
                seen.push(id.clone());
            }
        }
    }
    seen.iter()
        .filter_map(|id| state.accounts.get(id).cloned())
        .collect()
}
