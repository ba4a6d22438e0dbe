// 🌐 REST API with Axum
// Thin transport over Ledger: success → JSON payload, failure → {"error": msg}

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::error;

use crate::entities::{AccountUpdate, ClaimUpdate, NewAccount, NewClaim, NewPolicy, PolicyUpdate};
use crate::error::{LedgerError, StorageError};
use crate::ledger::Ledger;
use crate::schema::Collection;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<Ledger>,
}

/// Error body; the only failure shape the API emits
#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        let status = match &err {
            LedgerError::Validation(_) | LedgerError::NothingToModify => StatusCode::BAD_REQUEST,
            LedgerError::NotFound(_) => StatusCode::NOT_FOUND,
            LedgerError::Storage(StorageError::Locked { .. }) => StatusCode::SERVICE_UNAVAILABLE,
            LedgerError::Storage(_) | LedgerError::Audit(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!(error = %err, "request failed");
        }
        ApiError {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { error: self.message })).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError {
            status: StatusCode::BAD_REQUEST,
            message: rejection.body_text(),
        }
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Request body, with decode failures reported as {"error": msg}
type JsonBody<T> = Result<Json<T>, JsonRejection>;

/// Run a blocking ledger call off the async workers
async fn blocking<T, F>(state: AppState, f: F) -> ApiResult<T>
where
    T: Send + 'static,
    F: FnOnce(&Ledger) -> Result<T, LedgerError> + Send + 'static,
{
    let ledger = state.ledger;
    match tokio::task::spawn_blocking(move || f(&ledger)).await {
        Ok(result) => result.map(Json).map_err(ApiError::from),
        Err(join_err) => {
            error!(error = %join_err, "ledger task failed");
            Err(ApiError {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: "internal error".to_string(),
            })
        }
    }
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "OK" }))
}

/// GET /api/customers/:account_id - merged customer view
async fn get_customer_info(State(state): State<AppState>, Path(account_id): Path<String>) -> impl IntoResponse {
    blocking(state, move |l| l.get_customer_info(&account_id)).await
}

async fn get_account(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    blocking(state, move |l| l.get_account(&id)).await
}

async fn create_account(
    State(state): State<AppState>,
    payload: JsonBody<NewAccount>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(body) = payload?;
    let outcome = blocking(state, move |l| l.create_account(body)).await?;
    Ok((StatusCode::CREATED, outcome))
}

async fn update_account(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: JsonBody<AccountUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(body) = payload?;
    blocking(state, move |l| l.update_account(&id, &body)).await
}

async fn delete_account(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    blocking(state, move |l| l.delete_account(&id)).await
}

async fn get_claim(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    blocking(state, move |l| l.get_claim(&id)).await
}

async fn create_claim(
    State(state): State<AppState>,
    payload: JsonBody<NewClaim>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(body) = payload?;
    let outcome = blocking(state, move |l| l.create_claim(body)).await?;
    Ok((StatusCode::CREATED, outcome))
}

async fn update_claim(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: JsonBody<ClaimUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(body) = payload?;
    blocking(state, move |l| l.update_claim(&id, &body)).await
}

async fn delete_claim(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    blocking(state, move |l| l.delete_claim(&id)).await
}

async fn get_policy(State(state): State<AppState>, Path(han): Path<String>) -> impl IntoResponse {
    blocking(state, move |l| l.get_policy(&han)).await
}

async fn create_policy(
    State(state): State<AppState>,
    payload: JsonBody<NewPolicy>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(body) = payload?;
    let outcome = blocking(state, move |l| l.create_policy(body)).await?;
    Ok((StatusCode::CREATED, outcome))
}

async fn update_policy(
    State(state): State<AppState>,
    Path(han): Path<String>,
    payload: JsonBody<PolicyUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(body) = payload?;
    blocking(state, move |l| l.update_policy(&han, &body)).await
}

async fn delete_policy(State(state): State<AppState>, Path(han): Path<String>) -> impl IntoResponse {
    blocking(state, move |l| l.delete_policy(&han)).await
}

/// GET /api/audit/:kind/:id - audit entries for one record
async fn audit_history(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let kind: Collection = kind
        .parse()
        .map_err(|msg: String| ApiError::from(LedgerError::Validation(msg)))?;
    blocking(state, move |l| l.audit_history(kind, &id)).await
}

/// GET /api/cache - view cache counters
async fn cache_stats(State(state): State<AppState>) -> impl IntoResponse {
    // the cache lock is held across a recompute
    blocking(state, |l| Ok(l.cache_stats())).await
}

// ============================================================================
// Router
// ============================================================================

pub fn router(ledger: Arc<Ledger>) -> Router {
    let state = AppState { ledger };

    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/cache", get(cache_stats))
        .route("/customers/:account_id", get(get_customer_info))
        .route("/accounts", axum::routing::post(create_account))
        .route(
            "/accounts/:id",
            get(get_account).patch(update_account).delete(delete_account),
        )
        .route("/claims", axum::routing::post(create_claim))
        .route(
            "/claims/:id",
            get(get_claim).patch(update_claim).delete(delete_claim),
        )
        .route("/policies", axum::routing::post(create_policy))
        .route(
            "/policies/:han",
            get(get_policy).patch(update_policy).delete(delete_policy),
        )
        .route("/audit/:kind/:id", get(audit_history))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive())
}
