//! Withdrawal request and transfer bookkeeping. The ledger postings and the
//! request rows move together inside one write acquisition; the coordinator
//! in the core crate drives the provider side between those transactions.

use serde_json::json;
use uuid::Uuid;

use cardpool_common::model::{
    AmountMinor, TransferStatus, WithdrawalRequest, WithdrawalStatus, WithdrawalTransfer,
};
use cardpool_common::utils::time::current_time;
use cardpool_common::{CardpoolError, Result};

use crate::engine;
use crate::manager::Ledger;
use crate::state::{equity_account_id, pending_account_id};

fn pending_tx_id(request_id: &str) -> String {
    format!("withdrawal_pending_{}", request_id)
}

fn finalize_tx_id(request_id: &str) -> String {
    format!("withdrawal_finalize_{}", request_id)
}

fn reverse_tx_id(request_id: &str) -> String {
    format!("withdrawal_reverse_{}", request_id)
}

impl Ledger {
    /// Opens a withdrawal: inserts the request row and posts the pending
    /// movement in the same storage transaction. Both commit or neither does.
    pub async fn create_withdrawal_request(
        &self,
        wallet_id: &str,
        card_id: &str,
        user_id: &str,
        amount: AmountMinor,
        currency: &str,
    ) -> Result<WithdrawalRequest> {
        if amount <= 0 {
            return Err(CardpoolError::Validation(format!(
                "withdrawal amount must be positive, got {}",
                amount
            )));
        }

        let request_id = format!("wd_{}", Uuid::new_v4().simple());
        let receipt = {
            let mut state = self.state.write().await;
            state.wallet(wallet_id)?;
            let card = state.card(card_id)?.clone();
            if card.wallet_id != wallet_id {
                return Err(CardpoolError::Validation(format!(
                    "card {} does not belong to wallet {}",
                    card_id, wallet_id
                )));
            }
            if !state.is_member(wallet_id, user_id) {
                return Err(CardpoolError::Forbidden(format!(
                    "user {} is not a member of wallet {}",
                    user_id, wallet_id
                )));
            }
            if currency != card.currency {
                return Err(CardpoolError::Validation(format!(
                    "currency {} does not match card currency {}",
                    currency, card.currency
                )));
            }
            let available = state.equity_balance(card_id, user_id);
            if available < amount {
                return Err(CardpoolError::InsufficientEquity {
                    user_id: user_id.to_string(),
                    available,
                    requested: amount,
                });
            }

            let now = current_time();
            state.ensure_account(
                &card,
                cardpool_common::model::AccountScope::CardPendingWithdrawal,
                None,
                now,
            );
            let transaction_id = pending_tx_id(&request_id);
            let posting = cardpool_common::model::Posting {
                debit_account_id: equity_account_id(card_id, user_id),
                credit_account_id: pending_account_id(card_id),
                amount,
                metadata: json!({
                    "operation": "withdrawal_pending",
                    "withdrawal_request_id": request_id,
                    "user_id": user_id,
                }),
            };
            let receipt = engine::apply(&mut state, &transaction_id, &[posting], now)
                .map_err(CardpoolError::from)?;

            let request = WithdrawalRequest {
                id: request_id.clone(),
                wallet_id: wallet_id.to_string(),
                card_id: card_id.to_string(),
                user_id: user_id.to_string(),
                amount_minor: amount,
                currency: currency.to_string(),
                status: WithdrawalStatus::Pending,
                failure_reason: None,
                created_at: now,
                completed_at: None,
                failed_at: None,
                ledger_transaction_id: Some(transaction_id),
            };
            state
                .withdrawal_requests
                .insert(request_id.clone(), request);
            state.withdrawal_order.push(request_id.clone());
            receipt
        };
        self.journal_posting(&receipt).await;

        let request = self.withdrawal(&request_id).await?;
        tracing::info!(
            request_id = %request.id,
            card_id = %request.card_id,
            amount = request.amount_minor,
            "withdrawal request opened"
        );
        Ok(request)
    }

    /// Records the provider transfer after a successful payout initiation and
    /// moves the request to `Processing`.
    pub async fn mark_withdrawal_processing(
        &self,
        request_id: &str,
        provider_name: &str,
        provider_transfer_id: Option<String>,
    ) -> Result<(WithdrawalRequest, WithdrawalTransfer)> {
        let mut state = self.state.write().await;
        let request = state
            .withdrawal_requests
            .get(request_id)
            .cloned()
            .ok_or_else(|| CardpoolError::NotFound(format!("withdrawal {}", request_id)))?;
        if !request.status.can_transition(WithdrawalStatus::Processing) {
            return Err(CardpoolError::Validation(format!(
                "withdrawal {} cannot move from {:?} to Processing",
                request_id, request.status
            )));
        }
        if let Some(id) = &provider_transfer_id {
            let key = (provider_name.to_string(), id.clone());
            if state.transfers_by_provider.contains_key(&key) {
                return Err(CardpoolError::Duplicate(format!(
                    "provider transfer id {} already recorded",
                    id
                )));
            }
        }

        let transfer = WithdrawalTransfer {
            id: format!("tr_{}", Uuid::new_v4().simple()),
            withdrawal_request_id: request_id.to_string(),
            provider_name: provider_name.to_string(),
            provider_transfer_id: provider_transfer_id.clone(),
            amount_minor: request.amount_minor,
            status: TransferStatus::Pending,
        };
        if let Some(id) = &provider_transfer_id {
            state
                .transfers_by_provider
                .insert((provider_name.to_string(), id.clone()), transfer.id.clone());
        }
        state
            .transfer_by_request
            .insert(request_id.to_string(), transfer.id.clone());
        state.transfers.insert(transfer.id.clone(), transfer.clone());

        let request = state
            .withdrawal_requests
            .get_mut(request_id)
            .expect("request fetched above");
        request.status = WithdrawalStatus::Processing;
        Ok((request.clone(), transfer))
    }

    /// Fails a withdrawal and returns the reserved funds to the member. Used
    /// by the provider-rejection path and by cancellation; replays are no-ops
    /// because the reverse posting's transaction id is deterministic.
    pub async fn fail_withdrawal(&self, request_id: &str, reason: &str) -> Result<WithdrawalRequest> {
        let (request, receipt) = {
            let mut state = self.state.write().await;
            let request = state
                .withdrawal_requests
                .get(request_id)
                .cloned()
                .ok_or_else(|| CardpoolError::NotFound(format!("withdrawal {}", request_id)))?;
            if request.status == WithdrawalStatus::Failed {
                return Ok(request);
            }
            if !request.status.can_transition(WithdrawalStatus::Failed) {
                return Err(CardpoolError::Validation(format!(
                    "withdrawal {} cannot move from {:?} to Failed",
                    request_id, request.status
                )));
            }

            let posting = cardpool_common::model::Posting {
                debit_account_id: pending_account_id(&request.card_id),
                credit_account_id: equity_account_id(&request.card_id, &request.user_id),
                amount: request.amount_minor,
                metadata: json!({
                    "operation": "withdrawal_reverse",
                    "withdrawal_request_id": request_id,
                    "reason": reason,
                }),
            };
            let receipt = engine::apply(
                &mut state,
                &reverse_tx_id(request_id),
                &[posting],
                current_time(),
            )
            .map_err(CardpoolError::from)?;

            let now = current_time();
            if let Some(transfer_id) = state.transfer_by_request.get(request_id).cloned() {
                if let Some(transfer) = state.transfers.get_mut(&transfer_id) {
                    transfer.status = TransferStatus::Failed;
                }
            }
            let request = state
                .withdrawal_requests
                .get_mut(request_id)
                .expect("request fetched above");
            request.status = WithdrawalStatus::Failed;
            request.failure_reason = Some(reason.to_string());
            request.failed_at = Some(now);
            (request.clone(), receipt)
        };
        self.journal_posting(&receipt).await;
        tracing::warn!(request_id = %request.id, reason, "withdrawal failed");
        Ok(request)
    }

    /// Cancels a withdrawal that has not reached the provider yet.
    pub async fn cancel_withdrawal(
        &self,
        request_id: &str,
        user_id: &str,
    ) -> Result<WithdrawalRequest> {
        let (request, receipt) = {
            let mut state = self.state.write().await;
            let request = state
                .withdrawal_requests
                .get(request_id)
                .cloned()
                .ok_or_else(|| CardpoolError::NotFound(format!("withdrawal {}", request_id)))?;
            if request.user_id != user_id {
                return Err(CardpoolError::Forbidden(format!(
                    "withdrawal {} belongs to another member",
                    request_id
                )));
            }
            if request.status != WithdrawalStatus::Pending {
                return Err(CardpoolError::CannotCancelProcessingWithdrawal(
                    request_id.to_string(),
                ));
            }

            let posting = cardpool_common::model::Posting {
                debit_account_id: pending_account_id(&request.card_id),
                credit_account_id: equity_account_id(&request.card_id, &request.user_id),
                amount: request.amount_minor,
                metadata: json!({
                    "operation": "withdrawal_reverse",
                    "withdrawal_request_id": request_id,
                    "reason": "cancelled",
                }),
            };
            let receipt = engine::apply(
                &mut state,
                &reverse_tx_id(request_id),
                &[posting],
                current_time(),
            )
            .map_err(CardpoolError::from)?;

            let request = state
                .withdrawal_requests
                .get_mut(request_id)
                .expect("request fetched above");
            request.status = WithdrawalStatus::Cancelled;
            (request.clone(), receipt)
        };
        self.journal_posting(&receipt).await;
        Ok(request)
    }

    /// Settles a withdrawal from a `Completed` payout callback. A missing
    /// transfer is the caller's log-and-ignore case (`Ok(None)`); a transfer
    /// already in a terminal state refuses the change and reports what stands.
    pub async fn complete_withdrawal_by_transfer(
        &self,
        provider_name: &str,
        provider_transfer_id: &str,
    ) -> Result<Option<WithdrawalRequest>> {
        let outcome = {
            let mut state = self.state.write().await;
            let key = (provider_name.to_string(), provider_transfer_id.to_string());
            let transfer_id = match state.transfers_by_provider.get(&key) {
                Some(id) => id.clone(),
                None => return Ok(None),
            };
            let transfer = state.transfers.get(&transfer_id).cloned().ok_or_else(|| {
                CardpoolError::Storage(format!("transfer {} indexed but missing", transfer_id))
            })?;
            let request_id = transfer.withdrawal_request_id.clone();
            let request = state
                .withdrawal_requests
                .get(&request_id)
                .cloned()
                .ok_or_else(|| CardpoolError::NotFound(format!("withdrawal {}", request_id)))?;

            if transfer.status.is_terminal() {
                tracing::warn!(
                    request_id = %request_id,
                    transfer_status = ?transfer.status,
                    "ignoring completed callback for terminal transfer"
                );
                return Ok(Some(request));
            }

            let posting = cardpool_common::model::Posting {
                debit_account_id: pending_account_id(&request.card_id),
                credit_account_id: crate::state::pool_account_id(&request.card_id),
                amount: request.amount_minor,
                metadata: json!({
                    "operation": "withdrawal_finalize",
                    "withdrawal_request_id": request_id,
                }),
            };
            let receipt = engine::apply(
                &mut state,
                &finalize_tx_id(&request_id),
                &[posting],
                current_time(),
            )
            .map_err(CardpoolError::from)?;

            let now = current_time();
            state
                .transfers
                .get_mut(&transfer_id)
                .expect("transfer fetched above")
                .status = TransferStatus::Completed;
            let request = state
                .withdrawal_requests
                .get_mut(&request_id)
                .expect("request fetched above");
            request.status = WithdrawalStatus::Completed;
            request.completed_at = Some(now);
            (request.clone(), receipt)
        };
        self.journal_posting(&outcome.1).await;
        tracing::info!(request_id = %outcome.0.id, "withdrawal completed");
        Ok(Some(outcome.0))
    }

    /// Fails a withdrawal from a `Failed` or `Reversed` payout callback.
    pub async fn fail_withdrawal_by_transfer(
        &self,
        provider_name: &str,
        provider_transfer_id: &str,
        reason: &str,
    ) -> Result<Option<WithdrawalRequest>> {
        let request_id = {
            let state = self.state.read().await;
            let key = (provider_name.to_string(), provider_transfer_id.to_string());
            let transfer_id = match state.transfers_by_provider.get(&key) {
                Some(id) => id.clone(),
                None => return Ok(None),
            };
            let transfer = state.transfers.get(&transfer_id).cloned().ok_or_else(|| {
                CardpoolError::Storage(format!("transfer {} indexed but missing", transfer_id))
            })?;
            if transfer.status.is_terminal() {
                let request = state
                    .withdrawal_requests
                    .get(&transfer.withdrawal_request_id)
                    .cloned();
                tracing::warn!(
                    transfer_id = %transfer_id,
                    transfer_status = ?transfer.status,
                    "ignoring failed callback for terminal transfer"
                );
                return Ok(request);
            }
            transfer.withdrawal_request_id
        };
        let request = self.fail_withdrawal(&request_id, reason).await?;
        Ok(Some(request))
    }

    pub async fn withdrawal(&self, request_id: &str) -> Result<WithdrawalRequest> {
        self.state
            .read()
            .await
            .withdrawal_requests
            .get(request_id)
            .cloned()
            .ok_or_else(|| CardpoolError::NotFound(format!("withdrawal {}", request_id)))
    }

    pub async fn withdrawal_transfer(&self, request_id: &str) -> Option<WithdrawalTransfer> {
        let state = self.state.read().await;
        let transfer_id = state.transfer_by_request.get(request_id)?;
        state.transfers.get(transfer_id).cloned()
    }

    /// Newest-first listing for a wallet with an optional status filter.
    pub async fn list_withdrawals(
        &self,
        wallet_id: &str,
        status: Option<WithdrawalStatus>,
        limit: usize,
        offset: usize,
    ) -> Vec<WithdrawalRequest> {
        let state = self.state.read().await;
        state
            .withdrawal_order
            .iter()
            .rev()
            .filter_map(|id| state.withdrawal_requests.get(id))
            .filter(|r| r.wallet_id == wallet_id)
            .filter(|r| status.map_or(true, |s| r.status == s))
            .skip(offset)
            .take(limit)
            .cloned()
            .collect()
    }
}
