//! API Routes
//!
//! HTTP endpoint definitions.

use axum::{
    extract::{rejection::JsonRejection, Extension, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::domain::{
    Account, AccountChanges, AccountId, ClientId, HistoryEntry, HistoryId, OperationContext,
};
use crate::error::{AppError, AppResult};
use crate::ledger::{
    BalanceView, CreateAccountCommand, DepositCommand, DepositResult, TransferCommand,
};
use crate::metrics::MetricsSummary;

use super::AppState;

const MAX_AGENCY_LEN: usize = 10;
const MAX_ACCOUNT_NUMBER_LEN: usize = 20;

// =========================================================================
// Request types
// =========================================================================

#[derive(Debug, Deserialize)]
pub struct CreateAccountRequest {
    pub client_id: ClientId,
    /// Initial balance
    pub value: Decimal,
    pub history_id: i64,
    pub agency: String,
    pub account_number: String,
}

impl CreateAccountRequest {
    pub fn validate(&self) -> AppResult<()> {
        require_positive("client_id", self.client_id)?;
        require_positive("history_id", self.history_id)?;
        require_length("agency", &self.agency, MAX_AGENCY_LEN)?;
        require_length("account_number", &self.account_number, MAX_ACCOUNT_NUMBER_LEN)
    }

    fn into_command(self) -> CreateAccountCommand {
        CreateAccountCommand {
            client_id: self.client_id,
            initial_balance: self.value,
            history_id: self.history_id,
            agency: self.agency,
            account_number: self.account_number,
        }
    }
}

/// Descriptive fields only; a balance in the body is rejected
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateAccountRequest {
    #[serde(default)]
    pub client_id: Option<ClientId>,
    #[serde(default)]
    pub history_id: Option<i64>,
    #[serde(default)]
    pub agency: Option<String>,
    #[serde(default)]
    pub account_number: Option<String>,
}

impl UpdateAccountRequest {
    pub fn validate(&self) -> AppResult<()> {
        if let Some(client_id) = self.client_id {
            require_positive("client_id", client_id)?;
        }
        if let Some(history_id) = self.history_id {
            require_positive("history_id", history_id)?;
        }
        if let Some(ref agency) = self.agency {
            require_length("agency", agency, MAX_AGENCY_LEN)?;
        }
        if let Some(ref account_number) = self.account_number {
            require_length("account_number", account_number, MAX_ACCOUNT_NUMBER_LEN)?;
        }
        Ok(())
    }
}

impl From<UpdateAccountRequest> for AccountChanges {
    fn from(request: UpdateAccountRequest) -> Self {
        AccountChanges {
            client_id: request.client_id,
            history_id: request.history_id,
            agency: request.agency,
            account_number: request.account_number,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    pub sender_user_id: ClientId,
    pub receiver_user_id: ClientId,
    pub amount: Decimal,
    #[serde(default)]
    pub description: Option<String>,
}

impl TransferRequest {
    /// Amount rules are left to the ledger, which checks them after the
    /// same-client rule.
    pub fn validate(&self) -> AppResult<()> {
        require_positive("senderUserId", self.sender_user_id)?;
        require_positive("receiverUserId", self.receiver_user_id)
    }
}

#[derive(Debug, Deserialize)]
pub struct DepositRequest {
    pub amount: Decimal,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateHistoryRequest {
    pub description: String,
}

impl UpdateHistoryRequest {
    pub fn validate(&self) -> AppResult<()> {
        if self.description.trim().is_empty() {
            return Err(AppError::InvalidRequest(
                "description must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

fn require_positive(field: &str, value: i64) -> AppResult<()> {
    if value <= 0 {
        return Err(AppError::InvalidRequest(format!(
            "{} must be a positive number",
            field
        )));
    }
    Ok(())
}

fn require_length(field: &str, value: &str, max: usize) -> AppResult<()> {
    let len = value.trim().chars().count();
    if len == 0 || len > max {
        return Err(AppError::InvalidRequest(format!(
            "{} must be between 1 and {} characters",
            field, max
        )));
    }
    Ok(())
}

// =========================================================================
// API Router
// =========================================================================

/// Create the API router
pub fn create_router() -> Router<AppState> {
    Router::new()
        // Accounts
        .route("/accounts", post(create_account).get(list_accounts))
        .route(
            "/accounts/:id",
            get(get_account).patch(update_account).delete(delete_account),
        )
        .route("/accounts/client/:client_id", get(get_account_by_client))
        // Ledger operations
        .route("/accounts/transfer", post(transfer))
        .route("/accounts/:id/deposit", post(deposit))
        .route("/accounts/:id/balance", get(get_balance))
        // History
        .route("/history", get(list_history))
        .route("/history/:id", get(get_history).patch(update_history))
        .route("/history/account/:account_id", get(history_by_account))
        .route("/history/target/:account_id", get(history_by_target))
        // Metrics
        .route("/metrics", get(metrics_summary))
        .route("/metrics/health", get(metrics_health))
        .route("/metrics/prometheus", get(metrics_prometheus))
}

// =========================================================================
// Accounts
// =========================================================================

/// POST /accounts
async fn create_account(
    State(state): State<AppState>,
    payload: Result<Json<CreateAccountRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<Account>)> {
    let Json(request) = payload?;
    request.validate()?;

    let account = state.engine.create_account(request.into_command()).await?;
    Ok((StatusCode::CREATED, Json(account)))
}

/// GET /accounts
async fn list_accounts(State(state): State<AppState>) -> AppResult<Json<Vec<Account>>> {
    Ok(Json(state.engine.list_accounts().await?))
}

/// GET /accounts/:id
async fn get_account(
    State(state): State<AppState>,
    Path(id): Path<AccountId>,
) -> AppResult<Json<Account>> {
    Ok(Json(state.engine.find_account(id).await?))
}

/// GET /accounts/client/:client_id
async fn get_account_by_client(
    State(state): State<AppState>,
    Path(client_id): Path<ClientId>,
) -> AppResult<Json<Account>> {
    Ok(Json(state.engine.find_account_by_client(client_id).await?))
}

/// PATCH /accounts/:id
async fn update_account(
    State(state): State<AppState>,
    Path(id): Path<AccountId>,
    payload: Result<Json<UpdateAccountRequest>, JsonRejection>,
) -> AppResult<Json<Account>> {
    let Json(request) = payload?;
    request.validate()?;

    Ok(Json(state.engine.update_account(id, request.into()).await?))
}

/// DELETE /accounts/:id
async fn delete_account(
    State(state): State<AppState>,
    Path(id): Path<AccountId>,
) -> AppResult<StatusCode> {
    state.engine.delete_account(id).await?;
    Ok(StatusCode::OK)
}

// =========================================================================
// Ledger operations
// =========================================================================

/// POST /accounts/transfer
///
/// Responds with the sender's account after the transfer.
async fn transfer(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    payload: Result<Json<TransferRequest>, JsonRejection>,
) -> AppResult<Json<Account>> {
    let Json(request) = payload?;
    request.validate()?;

    tracing::debug!(
        correlation_id = %context.correlation_id,
        waited_ms = context.elapsed_ms(),
        sender = request.sender_user_id,
        receiver = request.receiver_user_id,
        "Transfer requested"
    );

    let mut command = TransferCommand::new(
        request.sender_user_id,
        request.receiver_user_id,
        request.amount,
    );
    if let Some(description) = request.description {
        command = command.with_description(description);
    }

    Ok(Json(state.engine.transfer(command).await?))
}

/// POST /accounts/:id/deposit
async fn deposit(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Path(id): Path<AccountId>,
    payload: Result<Json<DepositRequest>, JsonRejection>,
) -> AppResult<Json<DepositResult>> {
    let Json(request) = payload?;

    tracing::debug!(
        correlation_id = %context.correlation_id,
        waited_ms = context.elapsed_ms(),
        account_id = id,
        "Deposit requested"
    );

    let mut command = DepositCommand::new(id, request.amount);
    if let Some(description) = request.description {
        command = command.with_description(description);
    }

    Ok(Json(state.engine.deposit(command).await?))
}

/// GET /accounts/:id/balance
async fn get_balance(
    State(state): State<AppState>,
    Path(id): Path<AccountId>,
) -> AppResult<Json<BalanceView>> {
    Ok(Json(state.engine.get_balance(id).await?))
}

// =========================================================================
// History
// =========================================================================

/// GET /history
async fn list_history(State(state): State<AppState>) -> AppResult<Json<Vec<HistoryEntry>>> {
    Ok(Json(state.engine.list_history().await?))
}

/// GET /history/:id
async fn get_history(
    State(state): State<AppState>,
    Path(id): Path<HistoryId>,
) -> AppResult<Json<HistoryEntry>> {
    Ok(Json(state.engine.find_history(id).await?))
}

/// PATCH /history/:id
async fn update_history(
    State(state): State<AppState>,
    Path(id): Path<HistoryId>,
    payload: Result<Json<UpdateHistoryRequest>, JsonRejection>,
) -> AppResult<Json<HistoryEntry>> {
    let Json(request) = payload?;
    request.validate()?;

    Ok(Json(
        state
            .engine
            .update_history_description(id, &request.description)
            .await?,
    ))
}

/// GET /history/account/:account_id
async fn history_by_account(
    State(state): State<AppState>,
    Path(account_id): Path<AccountId>,
) -> AppResult<Json<Vec<HistoryEntry>>> {
    Ok(Json(state.engine.history_by_account(account_id).await?))
}

/// GET /history/target/:account_id
async fn history_by_target(
    State(state): State<AppState>,
    Path(account_id): Path<AccountId>,
) -> AppResult<Json<Vec<HistoryEntry>>> {
    Ok(Json(state.engine.history_by_target(account_id).await?))
}

// =========================================================================
// Metrics
// =========================================================================

/// Service name reported by the metrics health check
const SERVICE_NAME: &str = "transfer-service";

const OPENMETRICS_CONTENT_TYPE: &str = "application/openmetrics-text; version=1.0.0; charset=utf-8";

/// GET /metrics
async fn metrics_summary(State(state): State<AppState>) -> Json<MetricsSummary> {
    Json(state.metrics.summary())
}

/// GET /metrics/health
async fn metrics_health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now(),
        "service": SERVICE_NAME,
    }))
}

/// GET /metrics/prometheus
async fn metrics_prometheus(State(state): State<AppState>) -> Response {
    match state.metrics.encode_text() {
        Ok(body) => ([(header::CONTENT_TYPE, OPENMETRICS_CONTENT_TYPE)], body).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
