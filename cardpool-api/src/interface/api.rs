//! HTTP interface: translates transport shapes into domain calls and domain
//! errors into status codes. No business logic lives here.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use cardpool_baas::WebhookHeaders;
use cardpool_common::model::{BaasFundingRoute, CaptureSplit, WithdrawalStatus};
use cardpool_common::CardpoolError;
use cardpool_core::{IngestOutcome, WebhookPipeline, WithdrawalCoordinator};
use cardpool_ledger::Ledger;

use crate::auth::Authenticator;

#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<Ledger>,
    pub coordinator: Arc<WithdrawalCoordinator>,
    pub pipeline: Arc<WebhookPipeline>,
    pub auth: Arc<Authenticator>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ledger/cards/{card_id}/deposit", post(deposit))
        .route("/ledger/cards/{card_id}/withdraw", post(withdraw))
        .route("/ledger/cards/{card_id}/capture", post(capture))
        .route("/ledger/cards/{card_id}/reconciliation", get(reconciliation))
        .route(
            "/wallet/{wallet_id}/withdrawals",
            post(create_withdrawal).get(list_withdrawals),
        )
        .route(
            "/wallet/{wallet_id}/withdrawals/{withdrawal_id}",
            get(get_withdrawal),
        )
        .route(
            "/wallet/{wallet_id}/withdrawals/{withdrawal_id}/cancel",
            post(cancel_withdrawal),
        )
        .route(
            "/wallet/{wallet_id}/funding-routes",
            post(upsert_funding_route).get(list_funding_routes),
        )
        .route("/webhooks/baas/{provider}", post(webhook))
        .route("/webhooks/synctera", post(synctera_webhook))
        .with_state(state)
}

#[derive(Debug)]
pub struct ApiError(pub CardpoolError);

impl From<CardpoolError> for ApiError {
    fn from(err: CardpoolError) -> Self {
        ApiError(err)
    }
}

fn classify(err: &CardpoolError) -> (StatusCode, &'static str) {
    match err {
        CardpoolError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION"),
        CardpoolError::InvalidPayload(_) | CardpoolError::Serde(_) => {
            (StatusCode::BAD_REQUEST, "INVALID_PAYLOAD")
        }
        CardpoolError::UnsupportedEventType(_) => (StatusCode::BAD_REQUEST, "UNSUPPORTED_EVENT_TYPE"),
        CardpoolError::InsufficientEquity { .. } => (StatusCode::BAD_REQUEST, "INSUFFICIENT_EQUITY"),
        CardpoolError::InsufficientPendingBalance { .. } => {
            (StatusCode::BAD_REQUEST, "INSUFFICIENT_PENDING_BALANCE")
        }
        CardpoolError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
        CardpoolError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
        CardpoolError::AccountAlreadyLinkedToCard(_) => {
            (StatusCode::CONFLICT, "ACCOUNT_ALREADY_LINKED_TO_CARD")
        }
        CardpoolError::CannotCancelProcessingWithdrawal(_) => {
            (StatusCode::CONFLICT, "CANNOT_CANCEL_PROCESSING_WITHDRAWAL")
        }
        CardpoolError::Duplicate(_) => (StatusCode::CONFLICT, "DUPLICATE"),
        CardpoolError::InvalidSignature => (StatusCode::UNAUTHORIZED, "INVALID_SIGNATURE"),
        CardpoolError::ProviderUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "PROVIDER_UNAVAILABLE"),
        CardpoolError::ProviderRejected { .. } => (StatusCode::BAD_GATEWAY, "PROVIDER_REJECTED"),
        CardpoolError::Invariant(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INVARIANT_VIOLATION"),
        CardpoolError::Storage(_) | CardpoolError::Config(_) | CardpoolError::Io(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL")
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = classify(&self.0);
        if status.is_server_error() {
            tracing::error!(
                fatal = matches!(self.0, CardpoolError::Invariant(_)),
                code,
                "request failed: {}",
                self.0
            );
        }
        let body = json!({ "error": { "code": code, "message": self.0.to_string() } });
        (status, Json(body)).into_response()
    }
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

async fn require_member(state: &AppState, wallet_id: &str, user_id: &str) -> Result<(), ApiError> {
    if state.ledger.is_member(wallet_id, user_id).await {
        Ok(())
    } else {
        Err(CardpoolError::Forbidden(format!(
            "user {} is not a member of wallet {}",
            user_id, wallet_id
        ))
        .into())
    }
}

async fn require_admin(state: &AppState, wallet_id: &str, user_id: &str) -> Result<(), ApiError> {
    let wallet = state.ledger.wallet(wallet_id).await?;
    if wallet.admin_user_id == user_id {
        Ok(())
    } else {
        Err(CardpoolError::Forbidden(format!(
            "user {} is not the admin of wallet {}",
            user_id, wallet_id
        ))
        .into())
    }
}

// --- Card-centric ledger endpoints ---

#[derive(Debug, Deserialize)]
struct DepositRequest {
    amount: i64,
    #[serde(default)]
    metadata: Value,
}

async fn deposit(
    State(state): State<AppState>,
    Path(card_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<DepositRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = state.auth.verify_header(bearer(&headers))?;
    let transaction_id = format!("deposit_{}", Uuid::new_v4().simple());
    let receipt = state
        .ledger
        .post_card_deposit(&card_id, &user_id, body.amount, &transaction_id, body.metadata)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "transactionId": receipt.transaction_id, "ledger": receipt })),
    ))
}

async fn withdraw(
    State(state): State<AppState>,
    Path(card_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<DepositRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = state.auth.verify_header(bearer(&headers))?;
    let card = state.ledger.card(&card_id).await?;
    require_member(&state, &card.wallet_id, &user_id).await?;
    let transaction_id = format!("withdraw_{}", Uuid::new_v4().simple());
    let receipt = state
        .ledger
        .post_card_withdrawal(&card_id, &user_id, body.amount, &transaction_id, body.metadata)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "transactionId": receipt.transaction_id, "ledger": receipt })),
    ))
}

#[derive(Debug, Deserialize)]
struct CaptureRequest {
    splits: Vec<CaptureSplit>,
    #[serde(default)]
    metadata: Value,
}

async fn capture(
    State(state): State<AppState>,
    Path(card_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<CaptureRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = state.auth.verify_header(bearer(&headers))?;
    let card = state.ledger.card(&card_id).await?;
    require_member(&state, &card.wallet_id, &user_id).await?;
    let transaction_id = format!("capture_{}", Uuid::new_v4().simple());
    let receipt = state
        .ledger
        .post_card_capture(&card_id, &body.splits, &transaction_id, body.metadata)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "transactionId": receipt.transaction_id, "ledger": receipt })),
    ))
}

async fn reconciliation(
    State(state): State<AppState>,
    Path(card_id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = state.auth.verify_header(bearer(&headers))?;
    let card = state.ledger.card(&card_id).await?;
    require_member(&state, &card.wallet_id, &user_id).await?;
    let view = state.ledger.reconcile_card(&card_id).await?;
    Ok(Json(view))
}

// --- Wallet-scoped withdrawals ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateWithdrawalRequest {
    #[serde(default)]
    card_id: Option<String>,
    amount_minor: i64,
    currency: String,
}

async fn create_withdrawal(
    State(state): State<AppState>,
    Path(wallet_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<CreateWithdrawalRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = state.auth.verify_header(bearer(&headers))?;
    require_member(&state, &wallet_id, &user_id).await?;

    let card_id = match body.card_id {
        Some(id) => id,
        None => {
            let cards = state.ledger.cards_of_wallet(&wallet_id).await;
            match cards.len() {
                0 => {
                    return Err(
                        CardpoolError::NotFound(format!("wallet {} has no cards", wallet_id)).into(),
                    )
                }
                1 => cards[0].card_id.clone(),
                _ => {
                    return Err(CardpoolError::Validation(
                        "wallet has more than one card; specify cardId".to_string(),
                    )
                    .into())
                }
            }
        }
    };

    let (request, transfer) = state
        .coordinator
        .request_withdrawal(&wallet_id, &card_id, &user_id, body.amount_minor, &body.currency)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "request": request, "transfer": transfer })),
    ))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    limit: Option<usize>,
    offset: Option<usize>,
    status: Option<String>,
}

fn parse_status(raw: &str) -> Result<WithdrawalStatus, ApiError> {
    serde_json::from_value(Value::String(raw.to_uppercase()))
        .map_err(|_| CardpoolError::Validation(format!("unknown withdrawal status {}", raw)).into())
}

async fn list_withdrawals(
    State(state): State<AppState>,
    Path(wallet_id): Path<String>,
    Query(query): Query<ListQuery>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = state.auth.verify_header(bearer(&headers))?;
    require_member(&state, &wallet_id, &user_id).await?;

    let status = match &query.status {
        Some(raw) => Some(parse_status(raw)?),
        None => None,
    };
    let withdrawals = state
        .ledger
        .list_withdrawals(
            &wallet_id,
            status,
            query.limit.unwrap_or(50),
            query.offset.unwrap_or(0),
        )
        .await;
    Ok(Json(json!({ "withdrawals": withdrawals })))
}

async fn get_withdrawal(
    State(state): State<AppState>,
    Path((wallet_id, withdrawal_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = state.auth.verify_header(bearer(&headers))?;
    require_member(&state, &wallet_id, &user_id).await?;

    let request = state.ledger.withdrawal(&withdrawal_id).await?;
    if request.wallet_id != wallet_id {
        return Err(CardpoolError::NotFound(format!("withdrawal {}", withdrawal_id)).into());
    }
    let transfer = state.ledger.withdrawal_transfer(&withdrawal_id).await;
    Ok(Json(json!({ "request": request, "transfer": transfer })))
}

async fn cancel_withdrawal(
    State(state): State<AppState>,
    Path((wallet_id, withdrawal_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = state.auth.verify_header(bearer(&headers))?;
    require_member(&state, &wallet_id, &user_id).await?;
    let request = state.coordinator.cancel(&withdrawal_id, &user_id).await?;
    Ok(Json(json!({ "request": request })))
}

// --- Funding route administration ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FundingRouteRequest {
    provider_name: String,
    provider_account_id: String,
    #[serde(default)]
    reference: String,
    user_id: String,
    card_id: String,
}

async fn upsert_funding_route(
    State(state): State<AppState>,
    Path(wallet_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<FundingRouteRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = state.auth.verify_header(bearer(&headers))?;
    require_admin(&state, &wallet_id, &user_id).await?;

    let route = state
        .ledger
        .upsert_funding_route(BaasFundingRoute {
            provider_name: body.provider_name,
            provider_account_id: body.provider_account_id,
            reference: body.reference,
            wallet_id: wallet_id.clone(),
            card_id: body.card_id,
            user_id: body.user_id,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(json!({ "route": route }))))
}

async fn list_funding_routes(
    State(state): State<AppState>,
    Path(wallet_id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = state.auth.verify_header(bearer(&headers))?;
    require_admin(&state, &wallet_id, &user_id).await?;
    let routes = state.ledger.list_funding_routes(&wallet_id).await;
    Ok(Json(json!({ "routes": routes })))
}

// --- Webhooks ---

async fn ingest_webhook(
    state: &AppState,
    provider: &str,
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<Response, ApiError> {
    let hook_headers = WebhookHeaders {
        signature: header_string(headers, "webhook-signature"),
        timestamp: header_string(headers, "webhook-timestamp"),
    };
    let outcome = state.pipeline.ingest(provider, body, &hook_headers).await?;
    let body = match outcome {
        IngestOutcome::Processed {
            auth_decision: Some(decision),
        } => json!({ "status": "ok", "decision": decision }),
        IngestOutcome::Processed { auth_decision: None } => json!({ "status": "ok" }),
        IngestOutcome::Duplicate => json!({ "status": "duplicate" }),
    };
    Ok((StatusCode::OK, Json(body)).into_response())
}

async fn webhook(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    ingest_webhook(&state, &provider.to_uppercase(), &headers, &body).await
}

async fn synctera_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    ingest_webhook(&state, "SYNCTERA", &headers, &body).await
}
