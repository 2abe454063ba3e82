use crate::{
    auth::Actor,
    entities::item,
    errors::ServiceError,
    services::items::{CreateItemRequest, ItemFilter, UpdateItemRequest},
    ApiResponse, ApiResult, AppState,
};
use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    routing::get,
    Router,
};
use uuid::Uuid;

/// Item directory routes
pub fn items_router() -> Router<AppState> {
    Router::new()
        .route("/items", get(list_items).post(create_item))
        .route("/items/categories", get(list_categories))
        .route("/items/low-stock", get(low_stock_items))
        .route("/items/:id", get(get_item).put(update_item))
}

/// Create an item, recording a non-zero initial quantity as its opening balance
#[utoipa::path(
    post,
    path = "/api/v1/items",
    request_body = CreateItemRequest,
    responses(
        (status = 201, description = "Item created", body = crate::ApiResponse<item::Model>),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 401, description = "Missing actor headers", body = crate::errors::ErrorResponse),
        (status = 403, description = "Read-only role", body = crate::errors::ErrorResponse),
        (status = 409, description = "SKU already exists", body = crate::errors::ErrorResponse)
    ),
    tag = "items"
)]
pub async fn create_item(
    State(state): State<AppState>,
    actor: Actor,
    Json(payload): Json<CreateItemRequest>,
) -> Result<(StatusCode, Json<ApiResponse<item::Model>>), ServiceError> {
    let created = state.services.items.create_item(payload, actor).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(created))))
}

/// List items, newest first
#[utoipa::path(
    get,
    path = "/api/v1/items",
    params(ItemFilter),
    responses(
        (status = 200, description = "Items returned", body = crate::ApiResponse<Vec<item::Model>>),
        (status = 401, description = "Missing actor headers", body = crate::errors::ErrorResponse)
    ),
    tag = "items"
)]
pub async fn list_items(
    State(state): State<AppState>,
    _actor: Actor,
    Query(filter): Query<ItemFilter>,
) -> ApiResult<Vec<item::Model>> {
    let items = state.services.items.list_items(filter).await?;
    Ok(Json(ApiResponse::success(items)))
}

/// Distinct item categories
#[utoipa::path(
    get,
    path = "/api/v1/items/categories",
    responses(
        (status = 200, description = "Categories returned", body = crate::ApiResponse<Vec<String>>),
        (status = 401, description = "Missing actor headers", body = crate::errors::ErrorResponse)
    ),
    tag = "items"
)]
pub async fn list_categories(State(state): State<AppState>, _actor: Actor) -> ApiResult<Vec<String>> {
    let categories = state.services.items.list_categories().await?;
    Ok(Json(ApiResponse::success(categories)))
}

/// Active items at or below their minimum threshold
#[utoipa::path(
    get,
    path = "/api/v1/items/low-stock",
    responses(
        (status = 200, description = "Low stock items returned", body = crate::ApiResponse<Vec<item::Model>>),
        (status = 401, description = "Missing actor headers", body = crate::errors::ErrorResponse)
    ),
    tag = "items"
)]
pub async fn low_stock_items(
    State(state): State<AppState>,
    _actor: Actor,
) -> ApiResult<Vec<item::Model>> {
    let items = state.services.items.low_stock_items().await?;
    Ok(Json(ApiResponse::success(items)))
}

#[utoipa::path(
    get,
    path = "/api/v1/items/{id}",
    params(("id" = Uuid, Path, description = "Item ID")),
    responses(
        (status = 200, description = "Item returned", body = crate::ApiResponse<item::Model>),
        (status = 401, description = "Missing actor headers", body = crate::errors::ErrorResponse),
        (status = 404, description = "Item not found", body = crate::errors::ErrorResponse)
    ),
    tag = "items"
)]
pub async fn get_item(
    State(state): State<AppState>,
    _actor: Actor,
    Path(id): Path<Uuid>,
) -> ApiResult<item::Model> {
    let item = state.services.items.get_item(id).await?;
    Ok(Json(ApiResponse::success(item)))
}

/// Edit item metadata; quantities only change through movements
#[utoipa::path(
    put,
    path = "/api/v1/items/{id}",
    params(("id" = Uuid, Path, description = "Item ID")),
    request_body = UpdateItemRequest,
    responses(
        (status = 200, description = "Item updated", body = crate::ApiResponse<item::Model>),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 403, description = "Read-only role", body = crate::errors::ErrorResponse),
        (status = 404, description = "Item not found", body = crate::errors::ErrorResponse)
    ),
    tag = "items"
)]
pub async fn update_item(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateItemRequest>,
) -> ApiResult<item::Model> {
    let updated = state.services.items.update_item(id, payload, actor).await?;
    Ok(Json(ApiResponse::success(updated)))
}
