use crate::{
    auth::Actor,
    db::DbPool,
    entities::{
        customer::{self, CustomerStatus, Entity as Customer},
        movement::{self, Entity as Movement},
    },
    errors::ServiceError,
    events::{Event, EventSender},
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DbErr, EntityTrait, ModelTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, SqlErr,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::{Validate, ValidationError};

fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("not_blank");
        err.message = Some("must not be blank".into());
        return Err(err);
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct CreateCustomerRequest {
    #[validate(length(min = 1, max = 255), custom = "validate_not_blank")]
    pub name: String,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(max = 50))]
    pub phone: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate, ToSchema)]
pub struct UpdateCustomerRequest {
    #[validate(length(min = 1, max = 255), custom = "validate_not_blank")]
    pub name: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(max = 50))]
    pub phone: Option<String>,
    pub address: Option<String>,
    pub status: Option<CustomerStatus>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CustomerFilter {
    pub status: Option<CustomerStatus>,
}

fn trimmed_or_none(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Customer records referenced by outbound movements.
#[derive(Clone)]
pub struct CustomerService {
    db: Arc<DbPool>,
    event_sender: EventSender,
}

impl CustomerService {
    pub fn new(db: Arc<DbPool>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self, request), fields(user_id = %actor.user_id))]
    pub async fn create_customer(
        &self,
        request: CreateCustomerRequest,
        actor: Actor,
    ) -> Result<customer::Model, ServiceError> {
        actor.require_admin()?;
        request.validate()?;

        let created = customer::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(request.name.trim().to_string()),
            email: Set(trimmed_or_none(request.email)),
            phone: Set(trimmed_or_none(request.phone)),
            address: Set(trimmed_or_none(request.address)),
            status: Set(CustomerStatus::Active),
            ..Default::default()
        }
        .insert(self.db.as_ref())
        .await
        .map_err(ServiceError::db_error)?;

        info!(customer_id = %created.id, "Customer created");
        self.event_sender
            .send_or_log(Event::CustomerCreated(created.id))
            .await;
        Ok(created)
    }

    #[instrument(skip(self))]
    pub async fn get_customer(&self, customer_id: Uuid) -> Result<customer::Model, ServiceError> {
        Customer::find_by_id(customer_id)
            .one(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Customer {} not found", customer_id)))
    }

    #[instrument(skip(self, request), fields(user_id = %actor.user_id))]
    pub async fn update_customer(
        &self,
        customer_id: Uuid,
        request: UpdateCustomerRequest,
        actor: Actor,
    ) -> Result<customer::Model, ServiceError> {
        actor.require_admin()?;
        request.validate()?;

        let existing = self.get_customer(customer_id).await?;
        let mut active: customer::ActiveModel = existing.into();

        if let Some(name) = request.name {
            active.name = Set(name.trim().to_string());
        }
        if let Some(email) = request.email {
            active.email = Set(trimmed_or_none(Some(email)));
        }
        if let Some(phone) = request.phone {
            active.phone = Set(trimmed_or_none(Some(phone)));
        }
        if let Some(address) = request.address {
            active.address = Set(trimmed_or_none(Some(address)));
        }
        if let Some(status) = request.status {
            active.status = Set(status);
        }

        let updated = active
            .update(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?;

        info!(customer_id = %updated.id, "Customer updated");
        self.event_sender
            .send_or_log(Event::CustomerUpdated(updated.id))
            .await;
        Ok(updated)
    }

    /// Customers ordered by name, optionally filtered by status.
    #[instrument(skip(self))]
    pub async fn list_customers(
        &self,
        filter: CustomerFilter,
    ) -> Result<Vec<customer::Model>, ServiceError> {
        let mut query = Customer::find();
        if let Some(status) = filter.status {
            query = query.filter(customer::Column::Status.eq(status));
        }
        query
            .order_by_asc(customer::Column::Name)
            .all(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }

    /// Deletes a customer that no movement references.
    #[instrument(skip(self), fields(user_id = %actor.user_id))]
    pub async fn delete_customer(&self, customer_id: Uuid, actor: Actor) -> Result<(), ServiceError> {
        actor.require_admin()?;
        let db = self.db.as_ref();
        let existing = self.get_customer(customer_id).await?;

        let references = Movement::find()
            .filter(movement::Column::CustomerId.eq(customer_id))
            .count(db)
            .await
            .map_err(ServiceError::db_error)?;
        if references > 0 {
            return Err(ServiceError::Conflict(format!(
                "customer {} is referenced by {} movement(s); set it inactive instead",
                customer_id, references
            )));
        }

        existing
            .delete(db)
            .await
            .map_err(|e| map_reference_conflict(e, customer_id))?;

        info!(%customer_id, "Customer deleted");
        self.event_sender
            .send_or_log(Event::CustomerDeleted(customer_id))
            .await;
        Ok(())
    }
}

// A movement committed between the reference count and the delete still trips the FK.
fn map_reference_conflict(err: DbErr, customer_id: Uuid) -> ServiceError {
    match err.sql_err() {
        Some(SqlErr::ForeignKeyConstraintViolation(_)) => ServiceError::Conflict(format!(
            "customer {} is referenced by movements",
            customer_id
        )),
        _ => ServiceError::db_error(err),
    }
}
