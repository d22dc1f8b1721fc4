//! Synctera wire schema and its mapping onto the normalised event shape.

use serde::Deserialize;

use crate::event::{NormalizedEvent, PayoutState};
use crate::provider::ProviderError;

/// Envelope of every Synctera webhook: a dotted event type plus a
/// type-specific data object.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncteraEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct AuthorizationData {
    card_id: String,
    authorization_id: String,
    amount: i64,
    currency: String,
}

#[derive(Debug, Deserialize)]
struct AuthReversalData {
    authorization_id: String,
}

#[derive(Debug, Deserialize)]
struct ClearingData {
    card_id: String,
    #[serde(default)]
    authorization_id: Option<String>,
    amount: i64,
    currency: String,
    transaction_id: String,
}

#[derive(Debug, Deserialize)]
struct FundingData {
    account_id: String,
    #[serde(default)]
    reference: String,
    amount: i64,
    currency: String,
    transaction_id: String,
}

#[derive(Debug, Deserialize)]
struct PayoutStatusData {
    transfer_id: String,
    status: String,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct KycData {
    customer_external_ref: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct AccountStatusData {
    account_id: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct CardStatusData {
    card_id: String,
    status: String,
}

fn data<T: serde::de::DeserializeOwned>(value: serde_json::Value) -> Result<T, ProviderError> {
    serde_json::from_value(value).map_err(|e| ProviderError::MalformedPayload(e.to_string()))
}

fn payout_state(status: &str) -> PayoutState {
    match status {
        "COMPLETED" => PayoutState::Completed,
        "FAILED" => PayoutState::Failed,
        "REVERSED" => PayoutState::Reversed,
        _ => PayoutState::Pending,
    }
}

pub fn normalize(event: SyncteraEvent) -> Result<NormalizedEvent, ProviderError> {
    let provider_event_id = event.id;
    match event.event_type.as_str() {
        "card.authorization.created" => {
            let d: AuthorizationData = data(event.data)?;
            Ok(NormalizedEvent::CardAuth {
                provider_event_id,
                provider_card_id: d.card_id,
                provider_auth_id: d.authorization_id,
                amount_minor: d.amount,
                currency: d.currency,
            })
        }
        "card.authorization.reversed" => {
            let d: AuthReversalData = data(event.data)?;
            Ok(NormalizedEvent::CardAuthReversal {
                provider_event_id,
                provider_auth_id: d.authorization_id,
            })
        }
        "card.transaction.posted" => {
            let d: ClearingData = data(event.data)?;
            Ok(NormalizedEvent::CardClearing {
                provider_event_id,
                provider_card_id: d.card_id,
                provider_auth_id: d.authorization_id,
                amount_minor: d.amount,
                currency: d.currency,
                provider_transaction_id: d.transaction_id,
            })
        }
        "account.credit.posted" => {
            let d: FundingData = data(event.data)?;
            Ok(NormalizedEvent::WalletFunding {
                provider_event_id,
                provider_account_id: d.account_id,
                reference: d.reference,
                amount_minor: d.amount,
                currency: d.currency,
                provider_transaction_id: d.transaction_id,
            })
        }
        "transfer.status.updated" => {
            let d: PayoutStatusData = data(event.data)?;
            Ok(NormalizedEvent::PayoutStatus {
                provider_event_id,
                provider_transfer_id: d.transfer_id,
                status: payout_state(&d.status),
                reason: d.reason,
            })
        }
        "customer.verification.updated" => {
            let d: KycData = data(event.data)?;
            Ok(NormalizedEvent::KycVerification {
                provider_event_id,
                user_id: d.customer_external_ref,
                status: d.status,
            })
        }
        "account.status.updated" => {
            let d: AccountStatusData = data(event.data)?;
            Ok(NormalizedEvent::AccountStatus {
                provider_event_id,
                provider_account_id: d.account_id,
                status: d.status,
            })
        }
        "card.status.updated" => {
            let d: CardStatusData = data(event.data)?;
            Ok(NormalizedEvent::CardStatus {
                provider_event_id,
                provider_card_id: d.card_id,
                status: d.status,
            })
        }
        other => Err(ProviderError::UnsupportedEventType(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_authorization() {
        let event: SyncteraEvent = serde_json::from_value(serde_json::json!({
            "id": "evt_1",
            "type": "card.authorization.created",
            "data": {
                "card_id": "card_abc",
                "authorization_id": "auth_1",
                "amount": 5_000,
                "currency": "USD",
            },
        }))
        .unwrap();

        match normalize(event).unwrap() {
            NormalizedEvent::CardAuth { provider_card_id, amount_minor, .. } => {
                assert_eq!(provider_card_id, "card_abc");
                assert_eq!(amount_minor, 5_000);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_normalize_clearing_without_authorization() {
        let event: SyncteraEvent = serde_json::from_value(serde_json::json!({
            "id": "evt_2",
            "type": "card.transaction.posted",
            "data": {
                "card_id": "card_abc",
                "amount": 1_200,
                "currency": "USD",
                "transaction_id": "txn_9",
            },
        }))
        .unwrap();

        match normalize(event).unwrap() {
            NormalizedEvent::CardClearing { provider_auth_id, provider_transaction_id, .. } => {
                assert!(provider_auth_id.is_none());
                assert_eq!(provider_transaction_id, "txn_9");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_normalize_payout_states() {
        for (wire, expected) in [
            ("COMPLETED", PayoutState::Completed),
            ("FAILED", PayoutState::Failed),
            ("REVERSED", PayoutState::Reversed),
            ("IN_FLIGHT", PayoutState::Pending),
        ] {
            let event: SyncteraEvent = serde_json::from_value(serde_json::json!({
                "id": "evt_3",
                "type": "transfer.status.updated",
                "data": { "transfer_id": "t1", "status": wire },
            }))
            .unwrap();
            match normalize(event).unwrap() {
                NormalizedEvent::PayoutStatus { status, .. } => assert_eq!(status, expected),
                other => panic!("unexpected event: {:?}", other),
            }
        }
    }

    #[test]
    fn test_unknown_type_is_unsupported() {
        let event: SyncteraEvent = serde_json::from_value(serde_json::json!({
            "id": "evt_4",
            "type": "statement.created",
            "data": {},
        }))
        .unwrap();
        let err = normalize(event).unwrap_err();
        assert!(matches!(err, ProviderError::UnsupportedEventType(_)));
    }
}
