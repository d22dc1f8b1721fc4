use serde::{Deserialize, Serialize};

/// Terminal and transient payout states as reported by providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PayoutState {
    Pending,
    Completed,
    Failed,
    Reversed,
}

/// The provider-independent event shape the pipeline dispatches on. The wire
/// discriminator is the `type` field; each adapter maps its own schema onto
/// this one. The originating provider is carried alongside by the pipeline,
/// not inside the event, so a payload can never spoof another provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NormalizedEvent {
    CardAuth {
        provider_event_id: String,
        provider_card_id: String,
        provider_auth_id: String,
        amount_minor: i64,
        currency: String,
    },
    CardAuthReversal {
        provider_event_id: String,
        provider_auth_id: String,
    },
    CardClearing {
        provider_event_id: String,
        provider_card_id: String,
        provider_auth_id: Option<String>,
        amount_minor: i64,
        currency: String,
        provider_transaction_id: String,
    },
    WalletFunding {
        provider_event_id: String,
        provider_account_id: String,
        #[serde(default)]
        reference: String,
        amount_minor: i64,
        currency: String,
        provider_transaction_id: String,
    },
    PayoutStatus {
        provider_event_id: String,
        provider_transfer_id: String,
        status: PayoutState,
        reason: Option<String>,
    },
    KycVerification {
        provider_event_id: String,
        user_id: String,
        status: String,
    },
    AccountStatus {
        provider_event_id: String,
        provider_account_id: String,
        status: String,
    },
    CardStatus {
        provider_event_id: String,
        provider_card_id: String,
        status: String,
    },
}

impl NormalizedEvent {
    pub fn provider_event_id(&self) -> &str {
        match self {
            NormalizedEvent::CardAuth { provider_event_id, .. }
            | NormalizedEvent::CardAuthReversal { provider_event_id, .. }
            | NormalizedEvent::CardClearing { provider_event_id, .. }
            | NormalizedEvent::WalletFunding { provider_event_id, .. }
            | NormalizedEvent::PayoutStatus { provider_event_id, .. }
            | NormalizedEvent::KycVerification { provider_event_id, .. }
            | NormalizedEvent::AccountStatus { provider_event_id, .. }
            | NormalizedEvent::CardStatus { provider_event_id, .. } => provider_event_id,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            NormalizedEvent::CardAuth { .. } => "CARD_AUTH",
            NormalizedEvent::CardAuthReversal { .. } => "CARD_AUTH_REVERSAL",
            NormalizedEvent::CardClearing { .. } => "CARD_CLEARING",
            NormalizedEvent::WalletFunding { .. } => "WALLET_FUNDING",
            NormalizedEvent::PayoutStatus { .. } => "PAYOUT_STATUS",
            NormalizedEvent::KycVerification { .. } => "KYC_VERIFICATION",
            NormalizedEvent::AccountStatus { .. } => "ACCOUNT_STATUS",
            NormalizedEvent::CardStatus { .. } => "CARD_STATUS",
        }
    }
}
