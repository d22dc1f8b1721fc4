//! Deterministic in-process adapter for tests and local runs. Records every
//! payout it is asked to initiate and can be primed to fail the next one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::event::NormalizedEvent;
use crate::provider::{
    AccountHandle, BaasProvider, CardHandle, CardType, CustomerHandle, PayoutHandle,
    PayoutRequest, ProviderError, WebhookHeaders,
};

pub const MOCK_PROVIDER_NAME: &str = "MOCK";

#[derive(Debug, Default)]
pub struct MockProvider {
    pub payouts: Mutex<Vec<PayoutRequest>>,
    pub fail_next_payout: Mutex<Option<String>>,
    counter: AtomicU64,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `initiate_payout` fail with the given detail.
    pub fn fail_next_payout(&self, detail: &str) {
        *self.fail_next_payout.lock().unwrap() = Some(detail.to_string());
    }

    fn next_id(&self, prefix: &str) -> String {
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        format!("mock_{}_{}", prefix, n)
    }
}

#[async_trait]
impl BaasProvider for MockProvider {
    fn name(&self) -> &str {
        MOCK_PROVIDER_NAME
    }

    async fn ensure_customer(
        &self,
        user_id: &str,
        _email: &str,
        _legal_name: Option<&str>,
    ) -> Result<CustomerHandle, ProviderError> {
        // Derived from the user id so repeated calls return the same handle.
        Ok(CustomerHandle {
            external_customer_id: format!("mock_cust_{}", user_id),
        })
    }

    async fn ensure_account(
        &self,
        external_customer_id: &str,
        _currency: &str,
        _template_id: Option<&str>,
    ) -> Result<AccountHandle, ProviderError> {
        Ok(AccountHandle {
            external_account_id: format!("mock_acct_{}", external_customer_id),
            status: "ACTIVE".to_string(),
            last4: Some("0000".to_string()),
        })
    }

    async fn create_card(
        &self,
        _external_customer_id: &str,
        _external_account_id: &str,
        _product_id: &str,
        _card_type: CardType,
        _emboss_name: Option<&str>,
    ) -> Result<CardHandle, ProviderError> {
        Ok(CardHandle {
            external_card_id: self.next_id("card"),
            last4: Some("4242".to_string()),
            status: "ACTIVE".to_string(),
        })
    }

    async fn initiate_payout(&self, request: &PayoutRequest) -> Result<PayoutHandle, ProviderError> {
        if let Some(detail) = self.fail_next_payout.lock().unwrap().take() {
            return Err(ProviderError::Rejected {
                status: 422,
                detail,
            });
        }
        self.payouts.lock().unwrap().push(request.clone());
        Ok(PayoutHandle {
            external_transfer_id: self.next_id("transfer"),
            status: "PENDING".to_string(),
        })
    }

    /// The mock has no webhook secret; everything passes.
    fn verify_webhook_signature(
        &self,
        _raw_body: &[u8],
        _headers: &WebhookHeaders,
    ) -> Result<(), ProviderError> {
        Ok(())
    }

    /// The mock wire format is the normalised event itself.
    fn parse_event(&self, raw_body: &[u8]) -> Result<NormalizedEvent, ProviderError> {
        serde_json::from_slice(raw_body)
            .map_err(|e| ProviderError::MalformedPayload(e.to_string()))
    }
}
