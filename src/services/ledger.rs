use crate::{
    auth::{policy, Actor, Decision, DenyReason},
    config::LedgerSettings,
    db::{self, DbPool},
    entities::{
        alert::{self, AlertType, Entity as Alert},
        customer::Entity as Customer,
        item::{self, Entity as Item},
        movement::{self, Entity as Movement, MovementKind},
        quantity,
    },
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use dashmap::DashMap;
use metrics::{counter, histogram};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseTransaction,
    EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::{
    future::Future,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::{
    sync::Mutex,
    time::{timeout_at, Instant as Deadline},
};
use tracing::{debug, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

pub const OPENING_BALANCE_REASON: &str = "Opening balance";

/// Caller-supplied intent for one stock movement.
#[derive(Debug, Clone)]
pub struct MovementRequest {
    pub item_id: Uuid,
    pub kind: MovementKind,
    /// Requested quantity; `in`/`out` use its absolute value, `adjust` keeps the sign
    pub magnitude: Decimal,
    pub reason: String,
    pub options: MovementOptions,
}

#[derive(Debug, Clone, Default)]
pub struct MovementOptions {
    pub customer_id: Option<Uuid>,
    pub ref_doc: Option<String>,
    pub delivery_note: Option<String>,
    /// Admin override for taking an item below zero
    pub allow_negative: bool,
}

/// A movement after shape validation and sign normalization, ready to commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub kind: MovementKind,
    pub delta: Decimal,
    pub reason: String,
    pub ref_doc: Option<String>,
    pub customer_id: Option<Uuid>,
    pub delivery_note: Option<String>,
    pub allow_negative: bool,
}

impl LedgerEntry {
    /// Validates a request without touching storage.
    pub fn from_request(request: &MovementRequest) -> Result<Self, ServiceError> {
        let reason = request.reason.trim();
        if reason.is_empty() {
            return Err(ServiceError::InvalidInput(
                "reason must not be empty".to_string(),
            ));
        }

        let delta = request.kind.signed_delta(request.magnitude);
        if delta.is_zero() {
            return Err(ServiceError::InvalidInput(
                "quantity must be non-zero".to_string(),
            ));
        }
        quantity::check(delta)
            .map_err(|e| ServiceError::InvalidInput(format!("quantity {}: {}", request.magnitude, e)))?;

        if request.options.customer_id.is_some() && request.kind != MovementKind::Out {
            return Err(ServiceError::InvalidInput(format!(
                "customer_id is only allowed on out movements, got {}",
                request.kind.as_str()
            )));
        }

        Ok(Self {
            kind: request.kind,
            delta,
            reason: reason.to_string(),
            ref_doc: non_blank(request.options.ref_doc.as_deref()),
            customer_id: request.options.customer_id,
            delivery_note: non_blank(request.options.delivery_note.as_deref()),
            allow_negative: request.options.allow_negative,
        })
    }

    pub fn opening_balance(quantity: Decimal) -> Self {
        Self {
            kind: MovementKind::Adjust,
            delta: quantity,
            reason: OPENING_BALANCE_REASON.to_string(),
            ref_doc: None,
            customer_id: None,
            delivery_note: None,
            allow_negative: false,
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Result of a committed movement
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MovementOutcome {
    pub movement: movement::Model,
    pub previous_qty: Decimal,
    pub new_qty: Decimal,
}

/// Cached balance of one item
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Balance {
    pub item_id: Uuid,
    pub sku: String,
    pub unit: String,
    pub current_qty: Decimal,
    pub min_threshold: Decimal,
    pub version: i64,
    pub low_stock: bool,
}

impl From<&item::Model> for Balance {
    fn from(item: &item::Model) -> Self {
        Self {
            item_id: item.id,
            sku: item.sku.clone(),
            unit: item.unit.clone(),
            current_qty: item.current_qty,
            min_threshold: item.min_threshold,
            version: item.version,
            low_stock: item.is_low_stock(),
        }
    }
}

/// Comparison of the cached balance against the sum of the movement log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BalanceCheck {
    pub item_id: Uuid,
    pub cached: Decimal,
    pub derived: Decimal,
    /// `cached - derived`; zero when consistent
    pub drift: Decimal,
}

impl BalanceCheck {
    fn new(item_id: Uuid, cached: Decimal, derived: Decimal) -> Self {
        Self {
            item_id,
            cached,
            derived,
            drift: cached - derived,
        }
    }

    pub fn is_consistent(&self) -> bool {
        self.drift.is_zero()
    }
}

/// Appends one movement and advances the item's cached balance.
///
/// Must run inside the caller's transaction. The item row is only updated if
/// its version still matches `item.version`; otherwise nothing is written and
/// `ConcurrentModification` is returned.
pub(crate) async fn append_movement<C>(
    conn: &C,
    item: &item::Model,
    entry: &LedgerEntry,
    user_id: Uuid,
) -> Result<movement::Model, ServiceError>
where
    C: ConnectionTrait,
{
    let next_version = item.version + 1;
    let new_qty = item.current_qty + entry.delta;
    let now = Utc::now();

    let updated = Item::update_many()
        .col_expr(item::Column::CurrentQty, Expr::value(new_qty))
        .col_expr(item::Column::Version, Expr::value(next_version))
        .col_expr(item::Column::UpdatedAt, Expr::value(now))
        .filter(item::Column::Id.eq(item.id))
        .filter(item::Column::Version.eq(item.version))
        .exec(conn)
        .await
        .map_err(ServiceError::db_error)?;

    if updated.rows_affected == 0 {
        return Err(ServiceError::ConcurrentModification(item.id));
    }

    movement::ActiveModel {
        id: Set(Uuid::new_v4()),
        item_id: Set(item.id),
        sequence: Set(next_version),
        kind: Set(entry.kind),
        delta: Set(entry.delta),
        reason: Set(entry.reason.clone()),
        ref_doc: Set(entry.ref_doc.clone()),
        user_id: Set(user_id),
        customer_id: Set(entry.customer_id),
        delivery_note: Set(entry.delivery_note.clone()),
        created_at: Set(now),
    }
    .insert(conn)
    .await
    .map(movement::Model::canonical)
    .map_err(ServiceError::db_error)
}

fn canonical_movements(movements: Vec<movement::Model>) -> Vec<movement::Model> {
    movements.into_iter().map(movement::Model::canonical).collect()
}

/// Sum of every delta recorded for the item.
async fn derived_balance<C>(conn: &C, item_id: Uuid) -> Result<Decimal, ServiceError>
where
    C: ConnectionTrait,
{
    let deltas: Vec<Decimal> = Movement::find()
        .select_only()
        .column(movement::Column::Delta)
        .filter(movement::Column::ItemId.eq(item_id))
        .into_tuple()
        .all(conn)
        .await
        .map_err(ServiceError::db_error)?;

    Ok(deltas.into_iter().map(quantity::canonical).sum())
}

fn denial_error(reason: DenyReason, actor: &Actor, item: &item::Model, projected: Decimal) -> ServiceError {
    match reason {
        DenyReason::ReadOnlyRole => ServiceError::Forbidden(format!(
            "role {} cannot record movements",
            actor.role
        )),
        DenyReason::NegativeStockRequiresAdmin => ServiceError::Forbidden(format!(
            "movement would take {} to {} {}; an admin override is required",
            item.sku, projected, item.unit
        )),
        DenyReason::OverrideNotRequested => ServiceError::Forbidden(format!(
            "movement would take {} to {} {}; an admin override is required, set allow_negative to apply it",
            item.sku, projected, item.unit
        )),
    }
}

/// Pause before retry `n` is `n * RETRY_BACKOFF`.
const RETRY_BACKOFF: Duration = Duration::from_millis(5);

/// Failures that left nothing behind because another writer got there first.
fn is_contention(err: &ServiceError) -> bool {
    match err {
        ServiceError::ConcurrentModification(_) => true,
        ServiceError::DatabaseError(db_err) => db::is_lock_contention(db_err),
        _ => false,
    }
}

fn crosses_threshold(previous: Decimal, new: Decimal, threshold: Decimal) -> bool {
    previous > threshold && new <= threshold
}

async fn load_item<C>(conn: &C, item_id: Uuid) -> Result<item::Model, ServiceError>
where
    C: ConnectionTrait,
{
    Item::find_by_id(item_id)
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .map(item::Model::canonical)
        .ok_or_else(|| ServiceError::NotFound(format!("Item {} not found", item_id)))
}

/// A staged movement plus the low-stock alert it raised, if any.
struct Committed {
    outcome: MovementOutcome,
    item: item::Model,
    alert: Option<alert::Model>,
}

/// Everything a movement writes, inside `txn` and without committing.
async fn stage_movement(
    txn: &DatabaseTransaction,
    item_id: Uuid,
    entry: &LedgerEntry,
    actor: Actor,
) -> Result<Committed, ServiceError> {
    let item = load_item(txn, item_id).await?;
    if !item.is_active() {
        return Err(ServiceError::InvalidInput(format!(
            "item {} is archived and accepts no movements",
            item.sku
        )));
    }

    if let Some(customer_id) = entry.customer_id {
        let customer = Customer::find_by_id(customer_id)
            .one(txn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| {
                ServiceError::InvalidInput(format!("customer {} does not exist", customer_id))
            })?;
        if !customer.is_active() {
            return Err(ServiceError::InvalidInput(format!(
                "customer {} is inactive",
                customer_id
            )));
        }
    }

    let projected = item.current_qty + entry.delta;
    if let Decision::Deny(reason) =
        policy::evaluate(actor.role, projected < Decimal::ZERO, entry.allow_negative)
    {
        counter!("stock_ledger_movements_denied_total", 1, "reason" => format!("{:?}", reason));
        info!(sku = %item.sku, %projected, ?reason, "Movement denied");
        return Err(denial_error(reason, &actor, &item, projected));
    }
    quantity::check(projected).map_err(|e| {
        ServiceError::InvalidInput(format!(
            "movement would take {} to {} {}; {}",
            item.sku, projected, item.unit, e
        ))
    })?;

    let movement = append_movement(txn, &item, entry, actor.user_id).await?;

    let alert = if crosses_threshold(item.current_qty, projected, item.min_threshold) {
        let alert = alert::ActiveModel {
            id: Set(Uuid::new_v4()),
            item_id: Set(item.id),
            movement_id: Set(movement.id),
            alert_type: Set(AlertType::LowStock),
            current_qty: Set(projected),
            min_threshold: Set(item.min_threshold),
            created_at: Set(movement.created_at),
        }
        .insert(txn)
        .await
        .map_err(ServiceError::db_error)?;
        Some(alert.canonical())
    } else {
        None
    };

    Ok(Committed {
        outcome: MovementOutcome {
            movement,
            previous_qty: item.current_qty,
            new_qty: projected,
        },
        item,
        alert,
    })
}

/// Rewrites a drifted cache inside `txn` and returns the check before the repair.
async fn stage_repair(txn: &DatabaseTransaction, item_id: Uuid) -> Result<BalanceCheck, ServiceError> {
    let item = load_item(txn, item_id).await?;
    let derived = derived_balance(txn, item_id).await?;
    let check = BalanceCheck::new(item_id, item.current_qty, derived);
    if check.is_consistent() {
        return Ok(check);
    }

    let updated = Item::update_many()
        .col_expr(item::Column::CurrentQty, Expr::value(derived))
        .col_expr(item::Column::Version, Expr::value(item.version + 1))
        .col_expr(item::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(item::Column::Id.eq(item_id))
        .filter(item::Column::Version.eq(item.version))
        .exec(txn)
        .await
        .map_err(ServiceError::db_error)?;

    if updated.rows_affected == 0 {
        return Err(ServiceError::ConcurrentModification(item_id));
    }
    Ok(check)
}

/// Commits staged work, or rolls it back when staging failed.
async fn finish<T>(
    txn: DatabaseTransaction,
    staged: Result<T, ServiceError>,
) -> Result<T, ServiceError> {
    match staged {
        Ok(value) => {
            txn.commit().await.map_err(ServiceError::db_error)?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = txn.rollback().await {
                warn!(error = %rollback_err, "Rollback after failed commit attempt failed");
            }
            Err(err)
        }
    }
}

/// Records stock movements and maintains each item's cached balance.
///
/// Commits for one item are serialized through an in-process lock and guarded
/// by the item's version column, so concurrent writers in other processes are
/// detected and retried rather than silently overwritten.
#[derive(Clone)]
pub struct LedgerEngine {
    db: Arc<DbPool>,
    event_sender: EventSender,
    settings: LedgerSettings,
    locks: Arc<DashMap<Uuid, Arc<Mutex<()>>>>,
}

impl LedgerEngine {
    pub fn new(db: Arc<DbPool>, event_sender: EventSender, settings: LedgerSettings) -> Self {
        Self {
            db,
            event_sender,
            settings,
            locks: Arc::new(DashMap::new()),
        }
    }

    pub fn settings(&self) -> &LedgerSettings {
        &self.settings
    }

    fn lock_for(&self, item_id: Uuid) -> Arc<Mutex<()>> {
        self.locks
            .entry(item_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn timed_out(&self, item_id: Uuid) -> ServiceError {
        counter!("stock_ledger_commit_timeouts_total", 1);
        warn!(%item_id, timeout = ?self.settings.commit_timeout, "Ledger commit timed out");
        ServiceError::Conflict(format!(
            "timed out committing a change to item {}; retry the request",
            item_id
        ))
    }

    /// Runs `attempt` under the item's lock, retrying lost version checks and
    /// lock contention.
    ///
    /// The commit timeout bounds waiting for the lock and each attempt's work
    /// up to its commit. A commit that has been sent is always awaited, so a
    /// timeout never hides a movement that was recorded.
    async fn serialized<T, F, Fut>(&self, item_id: Uuid, mut attempt: F) -> Result<T, ServiceError>
    where
        F: FnMut(Deadline) -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let deadline = Deadline::now() + self.settings.commit_timeout;
        let max_retries = self.settings.max_commit_retries;
        let lock = self.lock_for(item_id);

        let _guard = timeout_at(deadline, lock.lock())
            .await
            .map_err(|_| self.timed_out(item_id))?;

        let mut retries = 0;
        loop {
            match attempt(deadline).await {
                Err(err) if is_contention(&err) => {
                    if retries >= max_retries {
                        counter!("stock_ledger_commit_conflicts_total", 1);
                        warn!(%item_id, retries, error = %err, "Giving up after repeated conflicts");
                        return Err(ServiceError::Conflict(format!(
                            "item {} is being modified concurrently; retry the request",
                            item_id
                        )));
                    }
                    retries += 1;
                    counter!("stock_ledger_commit_retries_total", 1);
                    debug!(%item_id, retries, error = %err, "Commit lost a race, retrying");
                    tokio::time::sleep(RETRY_BACKOFF * retries).await;
                }
                other => return other,
            }
        }
    }

    /// Opens a transaction, giving up once `deadline` passes.
    async fn begin_before(
        &self,
        deadline: Deadline,
        item_id: Uuid,
    ) -> Result<DatabaseTransaction, ServiceError> {
        timeout_at(deadline, self.db.begin())
            .await
            .map_err(|_| self.timed_out(item_id))?
            .map_err(ServiceError::db_error)
    }

    /// Validates, authorizes and atomically records one movement.
    #[instrument(
        skip(self, request),
        fields(item_id = %request.item_id, kind = request.kind.as_str(), user_id = %actor.user_id)
    )]
    pub async fn submit_movement(
        &self,
        request: MovementRequest,
        actor: Actor,
    ) -> Result<MovementOutcome, ServiceError> {
        let start = Instant::now();
        let entry = LedgerEntry::from_request(&request)?;
        let item_id = request.item_id;

        let Committed {
            outcome,
            item,
            alert,
        } = self
            .serialized(item_id, |deadline| {
                self.try_commit(item_id, &entry, actor, deadline)
            })
            .await?;

        histogram!("stock_ledger_commit_duration_seconds", start.elapsed());
        counter!("stock_ledger_movements_committed_total", 1, "kind" => entry.kind.as_str());
        info!(
            movement_id = %outcome.movement.id,
            sequence = outcome.movement.sequence,
            delta = %outcome.movement.delta,
            previous_qty = %outcome.previous_qty,
            new_qty = %outcome.new_qty,
            "Movement committed"
        );

        self.event_sender
            .send_or_log(Event::MovementRecorded {
                movement_id: outcome.movement.id,
                item_id,
                kind: outcome.movement.kind,
                delta: outcome.movement.delta,
                previous_qty: outcome.previous_qty,
                new_qty: outcome.new_qty,
                user_id: actor.user_id,
                at: outcome.movement.created_at,
            })
            .await;

        if let Some(alert) = alert {
            counter!("stock_ledger_low_stock_alerts_total", 1);
            self.event_sender
                .send_or_log(Event::LowStockDetected {
                    item_id,
                    sku: item.sku.clone(),
                    current_qty: alert.current_qty,
                    min_threshold: alert.min_threshold,
                })
                .await;
        }

        Ok(outcome)
    }

    /// One transactional attempt: read, authorize, append, commit.
    async fn try_commit(
        &self,
        item_id: Uuid,
        entry: &LedgerEntry,
        actor: Actor,
        deadline: Deadline,
    ) -> Result<Committed, ServiceError> {
        let txn = self.begin_before(deadline, item_id).await?;
        let staged = match timeout_at(deadline, stage_movement(&txn, item_id, entry, actor)).await {
            Ok(staged) => staged,
            Err(_) => Err(self.timed_out(item_id)),
        };
        finish(txn, staged).await
    }

    /// Movements for an item, newest commit first.
    #[instrument(skip(self))]
    pub async fn movement_history(
        &self,
        item_id: Uuid,
        limit: Option<u64>,
    ) -> Result<Vec<movement::Model>, ServiceError> {
        let db = self.db.as_ref();
        self.find_item(item_id).await?;

        Movement::find()
            .filter(movement::Column::ItemId.eq(item_id))
            .order_by_desc(movement::Column::Sequence)
            .limit(self.settings.clamp_limit(limit))
            .all(db)
            .await
            .map(canonical_movements)
            .map_err(ServiceError::db_error)
    }

    #[instrument(skip(self))]
    pub async fn current_balance(&self, item_id: Uuid) -> Result<Balance, ServiceError> {
        let item = self.find_item(item_id).await?;
        Ok(Balance::from(&item))
    }

    /// Recomputes the balance from the movement log without changing anything.
    #[instrument(skip(self))]
    pub async fn recompute_balance(&self, item_id: Uuid) -> Result<BalanceCheck, ServiceError> {
        let item = self.find_item(item_id).await?;
        let derived = derived_balance(self.db.as_ref(), item_id).await?;
        let check = BalanceCheck::new(item_id, item.current_qty, derived);

        if !check.is_consistent() {
            warn!(
                sku = %item.sku,
                cached = %check.cached,
                derived = %check.derived,
                "Cached balance drifted from movement log"
            );
        }
        Ok(check)
    }

    /// Rewrites a drifted cached balance with the log-derived value. Admin only.
    ///
    /// Returns the check as it stood before the repair.
    #[instrument(skip(self), fields(user_id = %actor.user_id))]
    pub async fn repair_balance(
        &self,
        item_id: Uuid,
        actor: Actor,
    ) -> Result<BalanceCheck, ServiceError> {
        actor.require_admin()?;

        let check = self
            .serialized(item_id, |deadline| self.try_repair(item_id, deadline))
            .await?;

        if !check.is_consistent() {
            counter!("stock_ledger_balance_repairs_total", 1);
            info!(cached = %check.cached, derived = %check.derived, "Cached balance repaired");
            self.event_sender
                .send_or_log(Event::BalanceRepaired {
                    item_id,
                    previous_qty: check.cached,
                    repaired_qty: check.derived,
                    user_id: actor.user_id,
                })
                .await;
        }
        Ok(check)
    }

    async fn try_repair(
        &self,
        item_id: Uuid,
        deadline: Deadline,
    ) -> Result<BalanceCheck, ServiceError> {
        let txn = self.begin_before(deadline, item_id).await?;
        let staged = match timeout_at(deadline, stage_repair(&txn, item_id)).await {
            Ok(staged) => staged,
            Err(_) => Err(self.timed_out(item_id)),
        };
        finish(txn, staged).await
    }

    /// Global audit trail, newest first.
    #[instrument(skip(self))]
    pub async fn recent_movements(
        &self,
        limit: Option<u64>,
    ) -> Result<Vec<movement::Model>, ServiceError> {
        Movement::find()
            .order_by_desc(movement::Column::CreatedAt)
            .order_by_desc(movement::Column::Sequence)
            .limit(self.settings.clamp_limit(limit))
            .all(self.db.as_ref())
            .await
            .map(canonical_movements)
            .map_err(ServiceError::db_error)
    }

    /// Outbound movements delivered to a customer, newest first.
    #[instrument(skip(self))]
    pub async fn customer_deliveries(
        &self,
        customer_id: Uuid,
    ) -> Result<Vec<movement::Model>, ServiceError> {
        let db = self.db.as_ref();
        Customer::find_by_id(customer_id)
            .one(db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Customer {} not found", customer_id)))?;

        Movement::find()
            .filter(movement::Column::CustomerId.eq(customer_id))
            .filter(movement::Column::Kind.eq(MovementKind::Out))
            .order_by_desc(movement::Column::CreatedAt)
            .all(db)
            .await
            .map(canonical_movements)
            .map_err(ServiceError::db_error)
    }

    /// Low-stock alerts raised for an item, newest first.
    #[instrument(skip(self))]
    pub async fn item_alerts(
        &self,
        item_id: Uuid,
        limit: Option<u64>,
    ) -> Result<Vec<alert::Model>, ServiceError> {
        let db = self.db.as_ref();
        self.find_item(item_id).await?;

        Alert::find()
            .filter(alert::Column::ItemId.eq(item_id))
            .order_by_desc(alert::Column::CreatedAt)
            .limit(self.settings.clamp_limit(limit))
            .all(db)
            .await
            .map(|alerts| alerts.into_iter().map(alert::Model::canonical).collect())
            .map_err(ServiceError::db_error)
    }

    async fn find_item(&self, item_id: Uuid) -> Result<item::Model, ServiceError> {
        load_item(self.db.as_ref(), item_id).await
    }
}
