//! Synctera adapter: outbound JSON calls with a 10 s cap and two retries with
//! exponential backoff on 429/5xx, webhook signature verification, and the
//! wire-to-normalised event mapping in `wire`.

pub mod wire;

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde::de::DeserializeOwned;
use serde_json::json;

use cardpool_common::utils::time::current_time;

use crate::event::NormalizedEvent;
use crate::provider::{
    AccountHandle, BaasProvider, CardHandle, CardType, CustomerHandle, PayoutHandle,
    PayoutRequest, ProviderError, WebhookHeaders,
};
use crate::signature;

pub const SYNCTERA_PROVIDER_NAME: &str = "SYNCTERA";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_RETRIES: u32 = 2;
const BACKOFF_BASE_MS: u64 = 250;

#[derive(Debug, Clone)]
pub struct SyncteraConfig {
    pub api_key: String,
    pub base_url: String,
    pub webhook_secret: String,
    pub account_template_id: Option<String>,
    pub card_product_id: String,
    pub account_currency: String,
}

#[derive(Debug)]
pub struct SyncteraProvider {
    config: SyncteraConfig,
    client: reqwest::Client,
}

#[derive(Debug, serde::Deserialize)]
struct CustomerDto {
    id: String,
}

#[derive(Debug, serde::Deserialize)]
struct CustomerList {
    #[serde(default)]
    customers: Vec<CustomerDto>,
}

#[derive(Debug, serde::Deserialize)]
struct AccountDto {
    id: String,
    status: String,
    #[serde(default)]
    last_four: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct CardDto {
    id: String,
    #[serde(default)]
    last_four: Option<String>,
    status: String,
}

#[derive(Debug, serde::Deserialize)]
struct TransferDto {
    id: String,
    status: String,
}

impl SyncteraProvider {
    pub fn new(config: SyncteraConfig) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ProviderError::Unavailable(e.to_string()))?;
        Ok(Self { config, client })
    }

    async fn backoff(&self, attempt: u32) {
        let jitter = rand::thread_rng().gen_range(0..100);
        let delay = BACKOFF_BASE_MS * 2u64.pow(attempt - 1) + jitter;
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }

    /// Sends the request, retrying up to twice on 429, 5xx and transport
    /// timeouts. Anything else is returned to the caller as-is.
    async fn request(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<reqwest::Response, ProviderError> {
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), path);
        let mut attempt: u32 = 0;
        loop {
            let mut builder = self
                .client
                .request(method.clone(), &url)
                .bearer_auth(&self.config.api_key);
            if let Some(body) = &body {
                builder = builder.json(body);
            }
            match builder.send().await {
                Ok(response) => {
                    let status = response.status();
                    if (status.as_u16() == 429 || status.is_server_error())
                        && attempt < MAX_RETRIES
                    {
                        attempt += 1;
                        tracing::warn!(%url, %status, attempt, "retrying provider call");
                        self.backoff(attempt).await;
                        continue;
                    }
                    return Ok(response);
                }
                Err(e) if (e.is_timeout() || e.is_connect()) && attempt < MAX_RETRIES => {
                    attempt += 1;
                    tracing::warn!(%url, attempt, "retrying provider call after {}", e);
                    self.backoff(attempt).await;
                }
                Err(e) => return Err(ProviderError::Unavailable(e.to_string())),
            }
        }
    }

    async fn read_json<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, ProviderError> {
        let status = response.status();
        if status.is_success() {
            response
                .json()
                .await
                .map_err(|e| ProviderError::MalformedPayload(e.to_string()))
        } else if status.as_u16() == 429 || status.is_server_error() {
            Err(ProviderError::Unavailable(format!(
                "provider returned {} after retries",
                status
            )))
        } else {
            let detail = response.text().await.unwrap_or_default();
            Err(ProviderError::Rejected {
                status: status.as_u16(),
                detail,
            })
        }
    }
}

#[async_trait]
impl BaasProvider for SyncteraProvider {
    fn name(&self) -> &str {
        SYNCTERA_PROVIDER_NAME
    }

    /// Looks the customer up by our user id (stored as the external ref) and
    /// only creates one when the lookup comes back empty.
    async fn ensure_customer(
        &self,
        user_id: &str,
        email: &str,
        legal_name: Option<&str>,
    ) -> Result<CustomerHandle, ProviderError> {
        let response = self
            .request(
                reqwest::Method::GET,
                &format!("/v0/customers?external_ref={}", user_id),
                None,
            )
            .await?;
        let existing: CustomerList = self.read_json(response).await?;
        if let Some(customer) = existing.customers.into_iter().next() {
            return Ok(CustomerHandle {
                external_customer_id: customer.id,
            });
        }

        let response = self
            .request(
                reqwest::Method::POST,
                "/v0/customers",
                Some(json!({
                    "external_ref": user_id,
                    "email": email,
                    "legal_name": legal_name,
                })),
            )
            .await?;
        let created: CustomerDto = self.read_json(response).await?;
        Ok(CustomerHandle {
            external_customer_id: created.id,
        })
    }

    async fn ensure_account(
        &self,
        external_customer_id: &str,
        currency: &str,
        template_id: Option<&str>,
    ) -> Result<AccountHandle, ProviderError> {
        let template_id = template_id
            .map(str::to_string)
            .or_else(|| self.config.account_template_id.clone())
            .ok_or(ProviderError::AccountCreationNotSupported)?;

        let response = self
            .request(
                reqwest::Method::POST,
                "/v0/accounts",
                Some(json!({
                    "customer_id": external_customer_id,
                    "account_template_id": template_id,
                    "currency": currency,
                })),
            )
            .await?;
        let account: AccountDto = self.read_json(response).await?;
        Ok(AccountHandle {
            external_account_id: account.id,
            status: account.status,
            last4: account.last_four,
        })
    }

    async fn create_card(
        &self,
        external_customer_id: &str,
        external_account_id: &str,
        product_id: &str,
        card_type: CardType,
        emboss_name: Option<&str>,
    ) -> Result<CardHandle, ProviderError> {
        let form = match card_type {
            CardType::Physical => "PHYSICAL",
            CardType::Virtual => "VIRTUAL",
        };
        let response = self
            .request(
                reqwest::Method::POST,
                "/v0/cards",
                Some(json!({
                    "customer_id": external_customer_id,
                    "account_id": external_account_id,
                    "card_product_id": product_id,
                    "form": form,
                    "emboss_name": emboss_name,
                })),
            )
            .await?;
        let card: CardDto = self.read_json(response).await?;
        Ok(CardHandle {
            external_card_id: card.id,
            last4: card.last_four,
            status: card.status,
        })
    }

    async fn initiate_payout(&self, request: &PayoutRequest) -> Result<PayoutHandle, ProviderError> {
        let response = self
            .request(
                reqwest::Method::POST,
                "/v0/transfers",
                Some(json!({
                    "originating_account_id": request.source_account_id,
                    "receiving_card_token": request.destination_card_token,
                    "amount": request.amount_minor,
                    "currency": request.currency,
                    "reference": request.reference,
                })),
            )
            .await?;
        let transfer: TransferDto = self.read_json(response).await?;
        Ok(PayoutHandle {
            external_transfer_id: transfer.id,
            status: transfer.status,
        })
    }

    fn verify_webhook_signature(
        &self,
        raw_body: &[u8],
        headers: &WebhookHeaders,
    ) -> Result<(), ProviderError> {
        signature::verify(
            self.config.webhook_secret.as_bytes(),
            raw_body,
            headers,
            current_time(),
            signature::DEFAULT_TOLERANCE_SECS,
        )
    }

    fn parse_event(&self, raw_body: &[u8]) -> Result<NormalizedEvent, ProviderError> {
        let event: wire::SyncteraEvent = serde_json::from_slice(raw_body)
            .map_err(|e| ProviderError::MalformedPayload(e.to_string()))?;
        wire::normalize(event)
    }
}
