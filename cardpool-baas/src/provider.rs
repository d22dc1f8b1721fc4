//! The provider abstraction. The core depends only on this trait; each BaaS
//! partner gets one adapter that owns the HTTP details, the retry policy and
//! the wire schema mapping.

use std::fmt::Debug;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use cardpool_common::CardpoolError;

use crate::event::NormalizedEvent;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    #[error("Provider rejected request ({status}): {detail}")]
    Rejected { status: u16, detail: String },

    #[error("Account creation is not supported by this provider")]
    AccountCreationNotSupported,

    #[error("Payouts are not supported by this provider")]
    PayoutsNotSupported,

    #[error("Invalid webhook signature")]
    InvalidSignature,

    #[error("Webhook timestamp outside the accepted window")]
    StaleTimestamp,

    #[error("Unsupported event type: {0}")]
    UnsupportedEventType(String),

    #[error("Malformed provider payload: {0}")]
    MalformedPayload(String),
}

impl From<ProviderError> for CardpoolError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Unavailable(detail) => CardpoolError::ProviderUnavailable(detail),
            ProviderError::Rejected { status, detail } => CardpoolError::ProviderRejected {
                code: status.to_string(),
                detail,
            },
            ProviderError::AccountCreationNotSupported => {
                CardpoolError::ProviderUnavailable("account creation not supported".to_string())
            }
            ProviderError::PayoutsNotSupported => {
                CardpoolError::ProviderUnavailable("payouts not supported".to_string())
            }
            ProviderError::InvalidSignature | ProviderError::StaleTimestamp => {
                CardpoolError::InvalidSignature
            }
            ProviderError::UnsupportedEventType(t) => CardpoolError::UnsupportedEventType(t),
            ProviderError::MalformedPayload(detail) => CardpoolError::InvalidPayload(detail),
        }
    }
}

/// Signature material the transport layer lifts out of the HTTP headers so
/// adapters never see framework types.
#[derive(Debug, Clone, Default)]
pub struct WebhookHeaders {
    pub signature: Option<String>,
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CardType {
    Physical,
    Virtual,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerHandle {
    pub external_customer_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountHandle {
    pub external_account_id: String,
    pub status: String,
    pub last4: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardHandle {
    pub external_card_id: String,
    pub last4: Option<String>,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayoutRequest {
    pub source_account_id: String,
    pub destination_card_token: String,
    pub amount_minor: i64,
    pub currency: String,
    pub reference: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayoutHandle {
    pub external_transfer_id: String,
    pub status: String,
}

#[async_trait]
pub trait BaasProvider: Send + Sync + Debug {
    fn name(&self) -> &str;

    /// Idempotent: a user who already has a provider customer gets the same
    /// handle back.
    async fn ensure_customer(
        &self,
        user_id: &str,
        email: &str,
        legal_name: Option<&str>,
    ) -> Result<CustomerHandle, ProviderError>;

    async fn ensure_account(
        &self,
        external_customer_id: &str,
        currency: &str,
        template_id: Option<&str>,
    ) -> Result<AccountHandle, ProviderError>;

    async fn create_card(
        &self,
        external_customer_id: &str,
        external_account_id: &str,
        product_id: &str,
        card_type: CardType,
        emboss_name: Option<&str>,
    ) -> Result<CardHandle, ProviderError>;

    async fn initiate_payout(&self, request: &PayoutRequest) -> Result<PayoutHandle, ProviderError>;

    /// Verifies the webhook signature over the raw body bytes. Adapters for
    /// providers without signatures (the mock) accept everything.
    fn verify_webhook_signature(
        &self,
        raw_body: &[u8],
        headers: &WebhookHeaders,
    ) -> Result<(), ProviderError>;

    /// Parses and normalises a webhook body into a `NormalizedEvent`.
    fn parse_event(&self, raw_body: &[u8]) -> Result<NormalizedEvent, ProviderError>;
}
