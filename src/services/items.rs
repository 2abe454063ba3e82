use crate::{
    auth::Actor,
    db::DbPool,
    entities::{
        item::{self, Entity as Item, ItemStatus},
        quantity,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::ledger::{append_movement, LedgerEntry},
};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::{Expr, Func},
    ActiveModelTrait, ColumnTrait, Condition, DbErr, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, SqlErr, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Non-negative and storable without rounding.
fn validate_stock_level(value: &Decimal) -> Result<(), ValidationError> {
    if *value < Decimal::ZERO {
        let mut err = ValidationError::new("non_negative");
        err.message = Some("must not be negative".into());
        return Err(err);
    }
    if let Err(e) = quantity::check(*value) {
        let mut err = ValidationError::new("quantity");
        err.message = Some(e.to_string().into());
        return Err(err);
    }
    Ok(())
}

fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("not_blank");
        err.message = Some("must not be blank".into());
        return Err(err);
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct CreateItemRequest {
    #[validate(length(min = 1, max = 64), custom = "validate_not_blank")]
    pub sku: String,
    #[validate(length(min = 1, max = 255), custom = "validate_not_blank")]
    pub name: String,
    #[validate(length(min = 1, max = 100), custom = "validate_not_blank")]
    pub category: String,
    #[validate(length(min = 1, max = 32), custom = "validate_not_blank")]
    pub unit: String,
    /// Opening balance; a non-zero value is recorded as an `adjust` movement
    #[serde(default)]
    #[validate(custom = "validate_stock_level")]
    pub initial_qty: Decimal,
    #[serde(default)]
    #[validate(custom = "validate_stock_level")]
    pub min_threshold: Decimal,
    pub location: Option<String>,
}

/// Metadata edit. Absent fields are left unchanged; the SKU and the balance
/// cannot be edited here.
#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate, ToSchema)]
pub struct UpdateItemRequest {
    #[validate(length(min = 1, max = 255), custom = "validate_not_blank")]
    pub name: Option<String>,
    #[validate(length(min = 1, max = 100), custom = "validate_not_blank")]
    pub category: Option<String>,
    #[validate(length(min = 1, max = 32), custom = "validate_not_blank")]
    pub unit: Option<String>,
    #[validate(custom = "validate_stock_level")]
    pub min_threshold: Option<Decimal>,
    /// An empty string clears the location
    pub location: Option<String>,
    pub status: Option<ItemStatus>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ItemFilter {
    /// Defaults to `active`
    pub status: Option<ItemStatus>,
    pub category: Option<String>,
    /// Case-insensitive match on SKU or name
    pub search: Option<String>,
}

fn trimmed_or_none(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn canonical_items(items: Vec<item::Model>) -> Vec<item::Model> {
    items.into_iter().map(item::Model::canonical).collect()
}

fn map_sku_conflict(err: DbErr, sku: &str) -> ServiceError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => {
            ServiceError::Conflict(format!("SKU {} already exists", sku))
        }
        _ => ServiceError::db_error(err),
    }
}

/// Item metadata directory. Balances are owned by the ledger engine; this
/// service only writes `current_qty` through the opening-balance movement.
#[derive(Clone)]
pub struct ItemService {
    db: Arc<DbPool>,
    event_sender: EventSender,
}

impl ItemService {
    pub fn new(db: Arc<DbPool>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Creates an item and records its opening balance in the same transaction.
    #[instrument(skip(self, request), fields(sku = %request.sku, user_id = %actor.user_id))]
    pub async fn create_item(
        &self,
        request: CreateItemRequest,
        actor: Actor,
    ) -> Result<item::Model, ServiceError> {
        actor.require_writer()?;
        request.validate()?;

        let sku = request.sku.trim().to_string();
        let initial_qty = request.initial_qty;
        let user_id = actor.user_id;
        let new_item = item::ActiveModel {
            id: Set(Uuid::new_v4()),
            sku: Set(sku.clone()),
            name: Set(request.name.trim().to_string()),
            category: Set(request.category.trim().to_string()),
            unit: Set(request.unit.trim().to_string()),
            current_qty: Set(Decimal::ZERO),
            min_threshold: Set(request.min_threshold),
            location: Set(trimmed_or_none(request.location)),
            status: Set(ItemStatus::Active),
            version: Set(0),
            ..Default::default()
        };

        let created = self
            .db
            .transaction::<_, item::Model, ServiceError>(move |txn| {
                Box::pin(async move {
                    let existing = Item::find()
                        .filter(item::Column::Sku.eq(sku.as_str()))
                        .one(txn)
                        .await
                        .map_err(ServiceError::db_error)?;
                    if existing.is_some() {
                        return Err(ServiceError::Conflict(format!(
                            "SKU {} already exists",
                            sku
                        )));
                    }

                    let item = new_item
                        .insert(txn)
                        .await
                        .map_err(|e| map_sku_conflict(e, &sku))?;
                    if initial_qty.is_zero() {
                        return Ok(item.canonical());
                    }

                    let entry = LedgerEntry::opening_balance(initial_qty);
                    append_movement(txn, &item, &entry, user_id).await?;

                    Item::find_by_id(item.id)
                        .one(txn)
                        .await
                        .map_err(ServiceError::db_error)?
                        .map(item::Model::canonical)
                        .ok_or_else(|| {
                            ServiceError::InternalError(format!(
                                "item {} vanished during creation",
                                item.id
                            ))
                        })
                })
            })
            .await
            .map_err(ServiceError::from)?;

        info!(item_id = %created.id, opening_qty = %initial_qty, "Item created");
        self.event_sender
            .send_or_log(Event::ItemCreated {
                item_id: created.id,
                sku: created.sku.clone(),
                opening_qty: initial_qty,
            })
            .await;

        Ok(created)
    }

    #[instrument(skip(self))]
    pub async fn get_item(&self, item_id: Uuid) -> Result<item::Model, ServiceError> {
        Item::find_by_id(item_id)
            .one(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?
            .map(item::Model::canonical)
            .ok_or_else(|| ServiceError::NotFound(format!("Item {} not found", item_id)))
    }

    /// Edits item metadata. Never touches `current_qty` or `version`.
    #[instrument(skip(self, request), fields(user_id = %actor.user_id))]
    pub async fn update_item(
        &self,
        item_id: Uuid,
        request: UpdateItemRequest,
        actor: Actor,
    ) -> Result<item::Model, ServiceError> {
        actor.require_writer()?;
        request.validate()?;

        let existing = self.get_item(item_id).await?;
        let mut active: item::ActiveModel = existing.into();

        if let Some(name) = request.name {
            active.name = Set(name.trim().to_string());
        }
        if let Some(category) = request.category {
            active.category = Set(category.trim().to_string());
        }
        if let Some(unit) = request.unit {
            active.unit = Set(unit.trim().to_string());
        }
        if let Some(min_threshold) = request.min_threshold {
            active.min_threshold = Set(min_threshold);
        }
        if let Some(location) = request.location {
            active.location = Set(trimmed_or_none(Some(location)));
        }
        if let Some(status) = request.status {
            active.status = Set(status);
        }

        let updated = active
            .update(self.db.as_ref())
            .await
            .map(item::Model::canonical)
            .map_err(ServiceError::db_error)?;

        info!(item_id = %updated.id, "Item updated");
        self.event_sender
            .send_or_log(Event::ItemUpdated(updated.id))
            .await;
        Ok(updated)
    }

    /// Lists items, newest first.
    #[instrument(skip(self))]
    pub async fn list_items(&self, filter: ItemFilter) -> Result<Vec<item::Model>, ServiceError> {
        let status = filter.status.unwrap_or_default();
        let mut query = Item::find().filter(item::Column::Status.eq(status));

        if let Some(category) = trimmed_or_none(filter.category) {
            query = query.filter(item::Column::Category.eq(category));
        }
        if let Some(search) = trimmed_or_none(filter.search) {
            let pattern = format!("%{}%", search.to_lowercase());
            query = query.filter(
                Condition::any()
                    .add(Expr::expr(Func::lower(Expr::col(item::Column::Sku))).like(pattern.as_str()))
                    .add(
                        Expr::expr(Func::lower(Expr::col(item::Column::Name)))
                            .like(pattern.as_str()),
                    ),
            );
        }

        query
            .order_by_desc(item::Column::CreatedAt)
            .all(self.db.as_ref())
            .await
            .map(canonical_items)
            .map_err(ServiceError::db_error)
    }

    /// Distinct categories in alphabetical order.
    pub async fn list_categories(&self) -> Result<Vec<String>, ServiceError> {
        Item::find()
            .select_only()
            .column(item::Column::Category)
            .distinct()
            .order_by_asc(item::Column::Category)
            .into_tuple()
            .all(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }

    /// Active items at or below their minimum threshold.
    #[instrument(skip(self))]
    pub async fn low_stock_items(&self) -> Result<Vec<item::Model>, ServiceError> {
        Item::find()
            .filter(item::Column::Status.eq(ItemStatus::Active))
            .filter(Expr::col(item::Column::CurrentQty).lte(Expr::col(item::Column::MinThreshold)))
            .order_by_asc(item::Column::Sku)
            .all(self.db.as_ref())
            .await
            .map(canonical_items)
            .map_err(ServiceError::db_error)
    }
}
