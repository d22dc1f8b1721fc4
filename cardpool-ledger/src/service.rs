//! High-level posting recipes. Each recipe resolves the card-scoped accounts,
//! enforces its balance preconditions, builds the entry list and hands it to
//! the engine under one write acquisition. Replays short-circuit before the
//! preconditions so a retried request returns the original outcome.

use serde_json::{json, Value};

use cardpool_common::model::{
    AccountScope, AmountMinor, CaptureSplit, PostingReceipt, Posting,
};
use cardpool_common::utils::time::current_time;
use cardpool_common::{CardpoolError, Result};

use crate::engine;
use crate::manager::Ledger;
use crate::state::{equity_account_id, pending_account_id, pool_account_id};

/// Folds an operation tag into caller-supplied metadata.
fn tagged(metadata: Value, operation: &str) -> Value {
    match metadata {
        Value::Object(mut map) => {
            map.insert("operation".to_string(), Value::String(operation.to_string()));
            Value::Object(map)
        }
        Value::Null => json!({ "operation": operation }),
        other => json!({ "operation": operation, "details": other }),
    }
}

impl Ledger {
    /// A member funds the card: the pool and the member's equity both grow.
    pub async fn post_card_deposit(
        &self,
        card_id: &str,
        user_id: &str,
        amount: AmountMinor,
        transaction_id: &str,
        metadata: Value,
    ) -> Result<PostingReceipt> {
        let receipt = {
            let mut state = self.state.write().await;
            if let Some(receipt) = engine::existing_receipt(&state, transaction_id) {
                return Ok(receipt);
            }
            let card = state.card(card_id)?.clone();
            if !state.is_member(&card.wallet_id, user_id) {
                return Err(CardpoolError::Forbidden(format!(
                    "user {} is not a member of wallet {}",
                    user_id, card.wallet_id
                )));
            }
            let posting = Posting {
                debit_account_id: pool_account_id(card_id),
                credit_account_id: equity_account_id(card_id, user_id),
                amount,
                metadata: tagged(metadata, "card_deposit"),
            };
            engine::apply(&mut state, transaction_id, &[posting], current_time())?
        };
        self.journal_posting(&receipt).await;
        Ok(receipt)
    }

    /// Settles a clearing: each split debits a member's equity, the pool
    /// shrinks by the total. Refuses any split that would overdraw a member.
    pub async fn post_card_capture(
        &self,
        card_id: &str,
        splits: &[CaptureSplit],
        transaction_id: &str,
        metadata: Value,
    ) -> Result<PostingReceipt> {
        let receipt = {
            let mut state = self.state.write().await;
            if let Some(receipt) = engine::existing_receipt(&state, transaction_id) {
                return Ok(receipt);
            }
            let card = state.card(card_id)?.clone();
            if splits.is_empty() {
                return Err(CardpoolError::Validation(
                    "capture requires at least one split".to_string(),
                ));
            }
            for split in splits {
                if split.amount <= 0 {
                    return Err(CardpoolError::Validation(format!(
                        "split amount must be positive, got {}",
                        split.amount
                    )));
                }
                if !state.is_member(&card.wallet_id, &split.user_id) {
                    return Err(CardpoolError::Forbidden(format!(
                        "user {} is not a member of wallet {}",
                        split.user_id, card.wallet_id
                    )));
                }
            }
            // A user may appear in several splits; the overdraft refusal has
            // to consider their combined share.
            for split in splits {
                let total: i64 = splits
                    .iter()
                    .filter(|s| s.user_id == split.user_id)
                    .map(|s| s.amount)
                    .sum();
                let available = state.equity_balance(card_id, &split.user_id);
                if available < total {
                    return Err(CardpoolError::InsufficientEquity {
                        user_id: split.user_id.clone(),
                        available,
                        requested: total,
                    });
                }
            }
            let metadata = tagged(metadata, "card_capture");
            let postings: Vec<Posting> = splits
                .iter()
                .map(|split| Posting {
                    debit_account_id: equity_account_id(card_id, &split.user_id),
                    credit_account_id: pool_account_id(card_id),
                    amount: split.amount,
                    metadata: metadata.clone(),
                })
                .collect();
            engine::apply(&mut state, transaction_id, &postings, current_time())?
        };
        self.journal_posting(&receipt).await;
        Ok(receipt)
    }

    /// Immediate withdrawal: equity and pool shrink together, no pending
    /// phase and no provider payout. The two-phase path goes through
    /// `create_withdrawal_request` instead.
    pub async fn post_card_withdrawal(
        &self,
        card_id: &str,
        user_id: &str,
        amount: AmountMinor,
        transaction_id: &str,
        metadata: Value,
    ) -> Result<PostingReceipt> {
        let receipt = {
            let mut state = self.state.write().await;
            if let Some(receipt) = engine::existing_receipt(&state, transaction_id) {
                return Ok(receipt);
            }
            state.card(card_id)?;
            let available = state.equity_balance(card_id, user_id);
            if available < amount {
                return Err(CardpoolError::InsufficientEquity {
                    user_id: user_id.to_string(),
                    available,
                    requested: amount,
                });
            }
            let posting = Posting {
                debit_account_id: equity_account_id(card_id, user_id),
                credit_account_id: pool_account_id(card_id),
                amount,
                metadata: tagged(metadata, "card_withdrawal"),
            };
            engine::apply(&mut state, transaction_id, &[posting], current_time())?
        };
        self.journal_posting(&receipt).await;
        Ok(receipt)
    }

    /// Phase one of a coordinated withdrawal: move the member's equity into
    /// the pending account while the payout is in flight.
    pub async fn post_pending_card_withdrawal(
        &self,
        card_id: &str,
        user_id: &str,
        amount: AmountMinor,
        transaction_id: &str,
    ) -> Result<PostingReceipt> {
        let receipt = {
            let mut state = self.state.write().await;
            if let Some(receipt) = engine::existing_receipt(&state, transaction_id) {
                return Ok(receipt);
            }
            let card = state.card(card_id)?.clone();
            let available = state.equity_balance(card_id, user_id);
            if available < amount {
                return Err(CardpoolError::InsufficientEquity {
                    user_id: user_id.to_string(),
                    available,
                    requested: amount,
                });
            }
            let now = current_time();
            state.ensure_account(&card, AccountScope::CardPendingWithdrawal, None, now);
            let posting = Posting {
                debit_account_id: equity_account_id(card_id, user_id),
                credit_account_id: pending_account_id(card_id),
                amount,
                metadata: json!({ "operation": "withdrawal_pending", "user_id": user_id }),
            };
            engine::apply(&mut state, transaction_id, &[posting], now)?
        };
        self.journal_posting(&receipt).await;
        Ok(receipt)
    }

    /// Phase two on provider success: the reserved amount leaves the ledger.
    pub async fn finalize_card_withdrawal(
        &self,
        card_id: &str,
        amount: AmountMinor,
        transaction_id: &str,
    ) -> Result<PostingReceipt> {
        let receipt = {
            let mut state = self.state.write().await;
            if let Some(receipt) = engine::existing_receipt(&state, transaction_id) {
                return Ok(receipt);
            }
            state.card(card_id)?;
            let pending = state.pending_balance(card_id);
            if pending < amount {
                return Err(CardpoolError::InsufficientPendingBalance {
                    card_id: card_id.to_string(),
                    available: pending,
                    requested: amount,
                });
            }
            let posting = Posting {
                debit_account_id: pending_account_id(card_id),
                credit_account_id: pool_account_id(card_id),
                amount,
                metadata: json!({ "operation": "withdrawal_finalize" }),
            };
            engine::apply(&mut state, transaction_id, &[posting], current_time())?
        };
        self.journal_posting(&receipt).await;
        Ok(receipt)
    }

    /// Phase two on provider failure: the reserved amount flows back to the
    /// member it came from.
    pub async fn reverse_pending_card_withdrawal(
        &self,
        card_id: &str,
        user_id: &str,
        amount: AmountMinor,
        transaction_id: &str,
    ) -> Result<PostingReceipt> {
        let receipt = {
            let mut state = self.state.write().await;
            if let Some(receipt) = engine::existing_receipt(&state, transaction_id) {
                return Ok(receipt);
            }
            state.card(card_id)?;
            let pending = state.pending_balance(card_id);
            if pending < amount {
                return Err(CardpoolError::InsufficientPendingBalance {
                    card_id: card_id.to_string(),
                    available: pending,
                    requested: amount,
                });
            }
            let posting = Posting {
                debit_account_id: pending_account_id(card_id),
                credit_account_id: equity_account_id(card_id, user_id),
                amount,
                metadata: json!({ "operation": "withdrawal_reverse", "user_id": user_id }),
            };
            engine::apply(&mut state, transaction_id, &[posting], current_time())?
        };
        self.journal_posting(&receipt).await;
        Ok(receipt)
    }
}
