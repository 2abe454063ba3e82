use super::LimitQuery;
use crate::{
    auth::Actor,
    entities::{alert, movement, MovementKind},
    errors::ServiceError,
    services::ledger::{Balance, BalanceCheck, MovementOptions, MovementOutcome, MovementRequest},
    ApiResponse, ApiResult, AppState,
};
use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct RecordMovementRequest {
    pub kind: MovementKind,
    /// `in` and `out` take the absolute value; `adjust` keeps the sign
    #[schema(value_type = String, example = "5")]
    pub quantity: Decimal,
    pub reason: String,
    pub ref_doc: Option<String>,
    /// Only valid on `out` movements
    pub customer_id: Option<Uuid>,
    pub delivery_note: Option<String>,
    /// Admin override for taking stock below zero
    #[serde(default)]
    pub allow_negative: bool,
}

impl RecordMovementRequest {
    fn into_request(self, item_id: Uuid) -> MovementRequest {
        MovementRequest {
            item_id,
            kind: self.kind,
            magnitude: self.quantity,
            reason: self.reason,
            options: MovementOptions {
                customer_id: self.customer_id,
                ref_doc: self.ref_doc,
                delivery_note: self.delivery_note,
                allow_negative: self.allow_negative,
            },
        }
    }
}

/// Ledger routes: movements, balances and the audit trail
pub fn movements_router() -> Router<AppState> {
    Router::new()
        .route(
            "/items/:id/movements",
            get(movement_history).post(record_movement),
        )
        .route("/items/:id/balance", get(current_balance))
        .route("/items/:id/balance/verify", get(verify_balance))
        .route("/items/:id/balance/repair", post(repair_balance))
        .route("/items/:id/alerts", get(item_alerts))
        .route("/movements", get(recent_movements))
}

/// Record a stock movement against an item
#[utoipa::path(
    post,
    path = "/api/v1/items/{id}/movements",
    params(("id" = Uuid, Path, description = "Item ID")),
    request_body = RecordMovementRequest,
    responses(
        (status = 201, description = "Movement committed", body = crate::ApiResponse<MovementOutcome>),
        (status = 400, description = "Invalid movement", body = crate::errors::ErrorResponse),
        (status = 401, description = "Missing actor headers", body = crate::errors::ErrorResponse),
        (status = 403, description = "Denied by negative stock policy", body = crate::errors::ErrorResponse),
        (status = 404, description = "Item not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Concurrent modification; safe to retry", body = crate::errors::ErrorResponse)
    ),
    tag = "ledger"
)]
pub async fn record_movement(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<RecordMovementRequest>,
) -> Result<(StatusCode, Json<ApiResponse<MovementOutcome>>), ServiceError> {
    let outcome = state
        .services
        .ledger
        .submit_movement(payload.into_request(id), actor)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(outcome))))
}

/// Movement history for an item, newest commit first
#[utoipa::path(
    get,
    path = "/api/v1/items/{id}/movements",
    params(("id" = Uuid, Path, description = "Item ID"), LimitQuery),
    responses(
        (status = 200, description = "History returned", body = crate::ApiResponse<Vec<movement::Model>>),
        (status = 404, description = "Item not found", body = crate::errors::ErrorResponse)
    ),
    tag = "ledger"
)]
pub async fn movement_history(
    State(state): State<AppState>,
    _actor: Actor,
    Path(id): Path<Uuid>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Vec<movement::Model>> {
    let history = state
        .services
        .ledger
        .movement_history(id, query.limit)
        .await?;
    Ok(Json(ApiResponse::success(history)))
}

/// Low-stock alerts raised for an item, newest first
#[utoipa::path(
    get,
    path = "/api/v1/items/{id}/alerts",
    params(("id" = Uuid, Path, description = "Item ID"), LimitQuery),
    responses(
        (status = 200, description = "Alert history returned", body = crate::ApiResponse<Vec<alert::Model>>),
        (status = 404, description = "Item not found", body = crate::errors::ErrorResponse)
    ),
    tag = "ledger"
)]
pub async fn item_alerts(
    State(state): State<AppState>,
    _actor: Actor,
    Path(id): Path<Uuid>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Vec<alert::Model>> {
    let alerts = state.services.ledger.item_alerts(id, query.limit).await?;
    Ok(Json(ApiResponse::success(alerts)))
}

#[utoipa::path(
    get,
    path = "/api/v1/items/{id}/balance",
    params(("id" = Uuid, Path, description = "Item ID")),
    responses(
        (status = 200, description = "Cached balance", body = crate::ApiResponse<Balance>),
        (status = 404, description = "Item not found", body = crate::errors::ErrorResponse)
    ),
    tag = "ledger"
)]
pub async fn current_balance(
    State(state): State<AppState>,
    _actor: Actor,
    Path(id): Path<Uuid>,
) -> ApiResult<Balance> {
    let balance = state.services.ledger.current_balance(id).await?;
    Ok(Json(ApiResponse::success(balance)))
}

/// Compare the cached balance with the movement log
#[utoipa::path(
    get,
    path = "/api/v1/items/{id}/balance/verify",
    params(("id" = Uuid, Path, description = "Item ID")),
    responses(
        (status = 200, description = "Balance check", body = crate::ApiResponse<BalanceCheck>),
        (status = 404, description = "Item not found", body = crate::errors::ErrorResponse)
    ),
    tag = "ledger"
)]
pub async fn verify_balance(
    State(state): State<AppState>,
    _actor: Actor,
    Path(id): Path<Uuid>,
) -> ApiResult<BalanceCheck> {
    let check = state.services.ledger.recompute_balance(id).await?;
    Ok(Json(ApiResponse::success(check)))
}

/// Rewrite a drifted cached balance from the movement log (admin only)
#[utoipa::path(
    post,
    path = "/api/v1/items/{id}/balance/repair",
    params(("id" = Uuid, Path, description = "Item ID")),
    responses(
        (status = 200, description = "Balance check before repair", body = crate::ApiResponse<BalanceCheck>),
        (status = 403, description = "Admin role required", body = crate::errors::ErrorResponse),
        (status = 404, description = "Item not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Concurrent modification; safe to retry", body = crate::errors::ErrorResponse)
    ),
    tag = "ledger"
)]
pub async fn repair_balance(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> ApiResult<BalanceCheck> {
    let check = state.services.ledger.repair_balance(id, actor).await?;
    Ok(Json(ApiResponse::success(check)))
}

/// Audit trail across all items, newest first
#[utoipa::path(
    get,
    path = "/api/v1/movements",
    params(LimitQuery),
    responses(
        (status = 200, description = "Recent movements", body = crate::ApiResponse<Vec<movement::Model>>),
        (status = 401, description = "Missing actor headers", body = crate::errors::ErrorResponse)
    ),
    tag = "ledger"
)]
pub async fn recent_movements(
    State(state): State<AppState>,
    _actor: Actor,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Vec<movement::Model>> {
    let movements = state.services.ledger.recent_movements(query.limit).await?;
    Ok(Json(ApiResponse::success(movements)))
}
