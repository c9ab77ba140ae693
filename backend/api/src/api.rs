//! Axum REST API handlers.

use std::sync::Arc;

use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Request, State},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use rewards_ledger::{Ledger, NewAccount, Profile, SystemClock, TaskData, WithdrawalRequest};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::auth::{AuthUser, BcryptHasher, TokenKeys};
use crate::db::SqliteStore;
use crate::errors::{ApiError, Result};

pub type AppLedger = Ledger<SqliteStore, SystemClock, BcryptHasher>;

pub struct ApiState {
    pub ledger: AppLedger,
    pub tokens: TokenKeys,
}

// ─────────────────────────────────────────────────────────
// Request shapes
// ─────────────────────────────────────────────────────────

/// [`Json`] whose rejection answers in the `{"error": ...}` shape.
#[derive(Debug)]
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> std::result::Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(ApiJson(value))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub phone: String,
    pub password: String,
    pub device_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRequest {
    pub task_type: String,
    pub data: Option<TaskData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefillRequest {
    pub task_type: String,
}

// ─────────────────────────────────────────────────────────
// Response shapes
// ─────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: Profile,
}

#[derive(Debug, Serialize)]
pub struct TaskResponse {
    pub success: bool,
    pub balance: i64,
    pub earned: i64,
}

#[derive(Debug, Serialize)]
pub struct WithdrawResponse {
    pub success: bool,
    pub balance: i64,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ─────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `POST /api/auth/register`
pub async fn register(
    State(state): State<Arc<ApiState>>,
    ApiJson(req): ApiJson<NewAccount>,
) -> Result<Json<AuthResponse>> {
    let account = state.ledger.register(&req).await?;
    signed_in(&state, &account.id).await
}

/// `POST /api/auth/login`
pub async fn login(
    State(state): State<Arc<ApiState>>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<Json<AuthResponse>> {
    let account = state
        .ledger
        .login(&req.phone, &req.password, req.device_id.as_deref())
        .await?;
    signed_in(&state, &account.id).await
}

/// `GET /api/user/profile`
pub async fn profile(
    State(state): State<Arc<ApiState>>,
    AuthUser(id): AuthUser,
) -> Result<Json<Profile>> {
    Ok(Json(state.ledger.profile(&id).await?))
}

/// `POST /api/tasks/complete`
pub async fn complete_task(
    State(state): State<Arc<ApiState>>,
    AuthUser(id): AuthUser,
    ApiJson(req): ApiJson<TaskRequest>,
) -> Result<Json<TaskResponse>> {
    let receipt = state
        .ledger
        .complete_task(&id, &req.task_type, req.data)
        .await?;
    Ok(Json(TaskResponse {
        success: true,
        balance: receipt.balance,
        earned: receipt.earned,
    }))
}

/// `POST /api/withdraw`
pub async fn withdraw(
    State(state): State<Arc<ApiState>>,
    AuthUser(id): AuthUser,
    ApiJson(req): ApiJson<WithdrawalRequest>,
) -> Result<Json<WithdrawResponse>> {
    let balance = state.ledger.withdraw(&id, &req).await?;
    Ok(Json(WithdrawResponse {
        success: true,
        balance,
    }))
}

/// `POST /api/user/refill`
///
/// Responds with the new limit under a task-specific key, e.g. `mathLimit`.
pub async fn refill(
    State(state): State<Arc<ApiState>>,
    AuthUser(id): AuthUser,
    ApiJson(req): ApiJson<RefillRequest>,
) -> Result<Json<Value>> {
    let (task, limit) = state.ledger.refill_limit(&id, &req.task_type).await?;
    let mut body = Map::new();
    body.insert("success".to_string(), Value::Bool(true));
    body.insert(format!("{task}Limit"), Value::from(limit));
    Ok(Json(Value::Object(body)))
}

async fn signed_in(state: &ApiState, id: &str) -> Result<Json<AuthResponse>> {
    let token = state.tokens.issue(id, Utc::now())?;
    let user = state.ledger.profile(id).await?;
    Ok(Json(AuthResponse { token, user }))
}
