use crate::AppState;
use axum::{response::Json, routing::get, Router};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Stock Ledger API",
        version = "0.1.0",
        description = r#"
# Stock Ledger API

Tracks inventory items and every change to their quantities.

- **Movements** are immutable `in`, `out` and `adjust` records. Each item's
  current quantity is a cached sum of its movements.
- **Negative stock** is refused unless an admin sets `allow_negative`.
- **Customers** can be attached to `out` movements as delivery recipients.

## Identity

Requests carry the acting user in two headers set by the upstream proxy:

```
x-actor-id: <uuid>
x-actor-role: admin | staff | viewer
```

## Errors

Failures use a single body shape:

```json
{
  "error": "Conflict",
  "message": "Conflict: item ... is being modified concurrently; retry the request",
  "request_id": "req-abc123",
  "timestamp": "2024-01-01T00:00:00Z"
}
```

`409 Conflict` responses never leave partial effects and are safe to retry.
"#,
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "http://localhost:8080/api/v1", description = "Local development")
    ),
    tags(
        (name = "items", description = "Item directory"),
        (name = "ledger", description = "Movements, balances and audit trail"),
        (name = "customers", description = "Customer directory"),
        (name = "health", description = "Health check")
    ),
    paths(
        crate::handlers::items::create_item,
        crate::handlers::items::list_items,
        crate::handlers::items::list_categories,
        crate::handlers::items::low_stock_items,
        crate::handlers::items::get_item,
        crate::handlers::items::update_item,

        crate::handlers::movements::record_movement,
        crate::handlers::movements::movement_history,
        crate::handlers::movements::current_balance,
        crate::handlers::movements::verify_balance,
        crate::handlers::movements::repair_balance,
        crate::handlers::movements::recent_movements,
        crate::handlers::movements::item_alerts,

        crate::handlers::customers::create_customer,
        crate::handlers::customers::list_customers,
        crate::handlers::customers::get_customer,
        crate::handlers::customers::update_customer,
        crate::handlers::customers::delete_customer,
        crate::handlers::customers::customer_deliveries,

        crate::handlers::health::health_check,
    ),
    components(
        schemas(
            crate::errors::ErrorResponse,
            crate::ResponseMeta,
            crate::entities::ItemStatus,
            crate::entities::MovementKind,
            crate::entities::CustomerStatus,
            crate::entities::AlertType,
            crate::entities::item::Model,
            crate::entities::movement::Model,
            crate::entities::customer::Model,
            crate::entities::alert::Model,
            crate::services::items::CreateItemRequest,
            crate::services::items::UpdateItemRequest,
            crate::services::customers::CreateCustomerRequest,
            crate::services::customers::UpdateCustomerRequest,
            crate::services::ledger::MovementOutcome,
            crate::services::ledger::Balance,
            crate::services::ledger::BalanceCheck,
            crate::handlers::movements::RecordMovementRequest,
            crate::handlers::health::HealthStatus,
        )
    )
)]
pub struct ApiDocV1;

/// Serves the generated document at `/api-docs/openapi.json`.
pub fn openapi_router() -> Router<AppState> {
    Router::new().route(
        "/api-docs/openapi.json",
        get(|| async { Json(ApiDocV1::openapi()) }),
    )
}
