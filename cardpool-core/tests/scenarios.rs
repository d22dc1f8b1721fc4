//! End-to-end scenarios: client-initiated deposits and withdrawals on one
//! side, provider webhooks through the full pipeline on the other, with the
//! reconciliation identity checked after every step.

use std::sync::Arc;

use serde_json::{json, Value};

use cardpool_baas::{BaasProvider, MockProvider, WebhookHeaders};
use cardpool_common::model::{
    BaasFundingRoute, CardStatus, HoldStatus, SplitPolicy, WithdrawalStatus,
};
use cardpool_core::{
    CardProgram, FundingRouter, IngestOutcome, PolicyService, StatusUpdater, WebhookPipeline,
    WithdrawalCoordinator,
};
use cardpool_ledger::directory::CardSpec;
use cardpool_ledger::Ledger;

struct Harness {
    ledger: Arc<Ledger>,
    provider: Arc<MockProvider>,
    pipeline: WebhookPipeline,
    coordinator: Arc<WithdrawalCoordinator>,
    wallet_id: String,
    card_id: String,
}

async fn harness(members: &[&str], policy: SplitPolicy) -> Harness {
    let ledger = Arc::new(Ledger::new());
    let provider = Arc::new(MockProvider::new());
    let dyn_provider: Arc<dyn BaasProvider> = Arc::clone(&provider) as Arc<dyn BaasProvider>;

    let wallet = ledger.create_wallet("shared trip", members[0]).await;
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
            external_card_id: "ext_card_1".to_string(),
            external_account_id: Some("acct_card_1".to_string()),
            currency: "USD".to_string(),
        })
        .await
        .unwrap();
    ledger
        .set_card_status(&card.card_id, CardStatus::Active)
        .await
        .unwrap();

    let policies = Arc::new(PolicyService::new(Arc::clone(&ledger)));
    let card_program = Arc::new(CardProgram::new(Arc::clone(&ledger), policies));
    let coordinator = Arc::new(WithdrawalCoordinator::new(
        Arc::clone(&ledger),
        Arc::clone(&dyn_provider),
    ));
    let funding = Arc::new(FundingRouter::new(Arc::clone(&ledger)));
    let statuses = Arc::new(StatusUpdater::new(Arc::clone(&ledger)));
    let pipeline = WebhookPipeline::new(
        Arc::clone(&ledger),
        card_program,
        Arc::clone(&coordinator),
        funding,
        statuses,
    )
    .register_provider(dyn_provider);

    Harness {
        ledger,
        provider,
        pipeline,
        coordinator,
        wallet_id: wallet.wallet_id,
        card_id: card.card_id,
    }
}

impl Harness {
    async fn deliver(&self, body: Value) -> IngestOutcome {
        self.pipeline
            .ingest("MOCK", body.to_string().as_bytes(), &WebhookHeaders::default())
            .await
            .unwrap()
    }

    async fn assert_balances(&self, pool: i64, equity: &[(&str, i64)], pending: i64) {
        let view = self.ledger.reconcile_card(&self.card_id).await.unwrap();
        assert!(view.consistent, "card must reconcile: {:?}", view);
        assert_eq!(view.pool_balance, pool, "pool balance");
        assert_eq!(view.pending_withdrawals, pending, "pending withdrawals");
        for (user, expected) in equity {
            let actual = view
                .member_equity
                .iter()
                .find(|m| m.user_id == *user)
                .map(|m| m.balance)
                .unwrap_or(0);
            assert_eq!(actual, *expected, "equity of {}", user);
        }
    }
}

fn auth_event(event_id: &str, auth_id: &str, amount: i64) -> Value {
    json!({
        "type": "CARD_AUTH",
        "provider_event_id": event_id,
        "provider_card_id": "ext_card_1",
        "provider_auth_id": auth_id,
        "amount_minor": amount,
        "currency": "USD",
    })
}

fn clearing_event(event_id: &str, auth_id: Option<&str>, amount: i64, tx_id: &str) -> Value {
    json!({
        "type": "CARD_CLEARING",
        "provider_event_id": event_id,
        "provider_card_id": "ext_card_1",
        "provider_auth_id": auth_id,
        "amount_minor": amount,
        "currency": "USD",
        "provider_transaction_id": tx_id,
    })
}

fn payout_event(event_id: &str, transfer_id: &str, status: &str, reason: Option<&str>) -> Value {
    json!({
        "type": "PAYOUT_STATUS",
        "provider_event_id": event_id,
        "provider_transfer_id": transfer_id,
        "status": status,
        "reason": reason,
    })
}

/// S1: deposit, authorise at a merchant, clear. Single member.
#[tokio::test]
async fn scenario_happy_path_single_member() {
    let h = harness(&["m1"], SplitPolicy::PayerOnly).await;
    h.ledger
        .post_card_deposit(&h.card_id, "m1", 50_000, "dep_1", Value::Null)
        .await
        .unwrap();

    let outcome = h.deliver(auth_event("evt_auth", "auth_x", 5_000)).await;
    match outcome {
        IngestOutcome::Processed { auth_decision: Some(decision) } => {
            assert!(decision.is_approved())
        }
        other => panic!("expected an authorisation decision, got {:?}", other),
    }

    h.deliver(clearing_event("evt_clear", Some("auth_x"), 5_000, "txn_x"))
        .await;

    h.assert_balances(45_000, &[("m1", 45_000)], 0).await;
    let hold = h.ledger.hold("MOCK", "auth_x").await.unwrap();
    assert_eq!(hold.status, HoldStatus::Cleared);
}

/// S2: inbound funding through a default route, redelivered. (Also P3.)
#[tokio::test]
async fn scenario_inbound_funding_is_exactly_once() {
    let h = harness(&["m1"], SplitPolicy::PayerOnly).await;
    h.ledger
        .upsert_funding_route(BaasFundingRoute {
            provider_name: "MOCK".to_string(),
            provider_account_id: "acct_1".to_string(),
            reference: String::new(),
            wallet_id: h.wallet_id.clone(),
            card_id: h.card_id.clone(),
            user_id: "m1".to_string(),
        })
        .await
        .unwrap();

    let funding = json!({
        "type": "WALLET_FUNDING",
        "provider_event_id": "evt_fund",
        "provider_account_id": "acct_1",
        "reference": "",
        "amount_minor": 10_000,
        "currency": "USD",
        "provider_transaction_id": "tx1",
    });
    assert!(matches!(
        h.deliver(funding.clone()).await,
        IngestOutcome::Processed { .. }
    ));
    assert_eq!(h.deliver(funding).await, IngestOutcome::Duplicate);

    h.assert_balances(10_000, &[("m1", 10_000)], 0).await;
    assert_eq!(h.ledger.processed_event_count().await, 1);
}

/// S3 + P7: full cycle with a completed withdrawal.
#[tokio::test]
async fn scenario_full_cycle_with_withdrawal() {
    let h = harness(&["m1"], SplitPolicy::PayerOnly).await;
    h.ledger
        .post_card_deposit(&h.card_id, "m1", 50_000, "dep_1", Value::Null)
        .await
        .unwrap();
    h.deliver(auth_event("evt_auth", "auth_x", 5_000)).await;
    h.deliver(clearing_event("evt_clear", Some("auth_x"), 5_000, "txn_x"))
        .await;
    h.ledger
        .post_card_deposit(&h.card_id, "m1", 10_000, "dep_2", Value::Null)
        .await
        .unwrap();
    h.assert_balances(55_000, &[("m1", 55_000)], 0).await;

    let (request, transfer) = h
        .coordinator
        .request_withdrawal(&h.wallet_id, &h.card_id, "m1", 10_000, "USD")
        .await
        .unwrap();
    assert_eq!(request.status, WithdrawalStatus::Processing);
    h.assert_balances(55_000, &[("m1", 45_000)], 10_000).await;

    let transfer_id = transfer.provider_transfer_id.unwrap();
    h.deliver(payout_event("evt_payout", &transfer_id, "COMPLETED", None))
        .await;

    h.assert_balances(45_000, &[("m1", 45_000)], 0).await;
    let request = h.ledger.withdrawal(&request.id).await.unwrap();
    assert_eq!(request.status, WithdrawalStatus::Completed);

    // P7: exactly one pending posting and one finalise posting for this id.
    let pending_receipt = h
        .ledger
        .post_pending_card_withdrawal(&h.card_id, "m1", 10_000, &format!("withdrawal_pending_{}", request.id))
        .await
        .unwrap();
    assert!(pending_receipt.replayed);
    let finalize_receipt = h
        .ledger
        .finalize_card_withdrawal(&h.card_id, 10_000, &format!("withdrawal_finalize_{}", request.id))
        .await
        .unwrap();
    assert!(finalize_receipt.replayed);
}

/// S4 + P8: withdrawal failing at the provider callback restores equity.
#[tokio::test]
async fn scenario_withdrawal_failure_path() {
    let h = harness(&["m1"], SplitPolicy::PayerOnly).await;
    h.ledger
        .post_card_deposit(&h.card_id, "m1", 55_000, "dep_1", Value::Null)
        .await
        .unwrap();

    let (request, transfer) = h
        .coordinator
        .request_withdrawal(&h.wallet_id, &h.card_id, "m1", 10_000, "USD")
        .await
        .unwrap();
    let transfer_id = transfer.provider_transfer_id.unwrap();

    h.deliver(payout_event(
        "evt_payout",
        &transfer_id,
        "FAILED",
        Some("card network declined"),
    ))
    .await;

    h.assert_balances(55_000, &[("m1", 55_000)], 0).await;
    let request = h.ledger.withdrawal(&request.id).await.unwrap();
    assert_eq!(request.status, WithdrawalStatus::Failed);
    assert_eq!(request.failure_reason.as_deref(), Some("card network declined"));

    // A late contradictory COMPLETED callback changes nothing.
    h.deliver(payout_event("evt_late", &transfer_id, "COMPLETED", None))
        .await;
    h.assert_balances(55_000, &[("m1", 55_000)], 0).await;
    assert_eq!(
        h.ledger.withdrawal(&request.id).await.unwrap().status,
        WithdrawalStatus::Failed
    );
}

/// S5: authorisation larger than the pool declines and leaves no trace.
#[tokio::test]
async fn scenario_insufficient_funds_authorisation() {
    let h = harness(&["m1"], SplitPolicy::PayerOnly).await;
    h.ledger
        .post_card_deposit(&h.card_id, "m1", 1_000, "dep_1", Value::Null)
        .await
        .unwrap();
    let entries_before = h.ledger.entry_count().await;

    let outcome = h.deliver(auth_event("evt_auth", "auth_big", 5_000)).await;
    match outcome {
        IngestOutcome::Processed { auth_decision: Some(decision) } => {
            assert!(!decision.is_approved())
        }
        other => panic!("expected a decline, got {:?}", other),
    }

    assert!(h.ledger.hold("MOCK", "auth_big").await.is_none());
    assert_eq!(h.ledger.entry_count().await, entries_before);
    h.assert_balances(1_000, &[("m1", 1_000)], 0).await;
}

/// S6 + P6: equal split across three members, remainder in join order.
#[tokio::test]
async fn scenario_equal_split_capture() {
    let h = harness(&["m1", "m2", "m3"], SplitPolicy::EqualSplit).await;
    for (i, member) in ["m1", "m2", "m3"].iter().enumerate() {
        h.ledger
            .post_card_deposit(&h.card_id, member, 2_000, &format!("dep_{}", i), Value::Null)
            .await
            .unwrap();
    }

    h.deliver(clearing_event("evt_clear", None, 1_000, "txn_split"))
        .await;

    h.assert_balances(
        5_000,
        &[("m1", 2_000 - 334), ("m2", 2_000 - 333), ("m3", 2_000 - 333)],
        0,
    )
    .await;
}

/// The provider rejecting a payout surfaces the error and leaves the books
/// as they were before the request.
#[tokio::test]
async fn scenario_provider_rejection_rolls_back() {
    let h = harness(&["m1"], SplitPolicy::PayerOnly).await;
    h.ledger
        .post_card_deposit(&h.card_id, "m1", 20_000, "dep_1", Value::Null)
        .await
        .unwrap();
    h.provider.fail_next_payout("velocity limit");

    let err = h
        .coordinator
        .request_withdrawal(&h.wallet_id, &h.card_id, "m1", 5_000, "USD")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("velocity limit"));
    h.assert_balances(20_000, &[("m1", 20_000)], 0).await;
}
