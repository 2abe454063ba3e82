use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::entities::MovementKind;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event after a commit has already succeeded. Delivery failures
    /// are logged and never reach the caller.
    pub async fn send_or_log(&self, event: Event) {
        let name = event.name();
        if let Err(e) = self.send(event).await {
            warn!(event = name, error = %e, "Dropping domain event");
            metrics::counter!("stock_ledger_events_dropped_total", 1);
        }
    }
}

/// Domain events published after successful commits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    ItemCreated {
        item_id: Uuid,
        sku: String,
        opening_qty: Decimal,
    },
    ItemUpdated(Uuid),
    MovementRecorded {
        movement_id: Uuid,
        item_id: Uuid,
        kind: MovementKind,
        delta: Decimal,
        previous_qty: Decimal,
        new_qty: Decimal,
        user_id: Uuid,
        at: DateTime<Utc>,
    },
    LowStockDetected {
        item_id: Uuid,
        sku: String,
        current_qty: Decimal,
        min_threshold: Decimal,
    },
    BalanceRepaired {
        item_id: Uuid,
        previous_qty: Decimal,
        repaired_qty: Decimal,
        user_id: Uuid,
    },
    CustomerCreated(Uuid),
    CustomerUpdated(Uuid),
    CustomerDeleted(Uuid),
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::ItemCreated { .. } => "item_created",
            Event::ItemUpdated(_) => "item_updated",
            Event::MovementRecorded { .. } => "movement_recorded",
            Event::LowStockDetected { .. } => "low_stock_detected",
            Event::BalanceRepaired { .. } => "balance_repaired",
            Event::CustomerCreated(_) => "customer_created",
            Event::CustomerUpdated(_) => "customer_updated",
            Event::CustomerDeleted(_) => "customer_deleted",
        }
    }
}

/// Consumes the event channel until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        metrics::counter!("stock_ledger_events_processed_total", 1, "event" => event.name());

        match event {
            Event::LowStockDetected {
                item_id,
                sku,
                current_qty,
                min_threshold,
            } => {
                warn!(
                    %item_id,
                    %sku,
                    %current_qty,
                    %min_threshold,
                    "Item reached its low stock threshold"
                );
            }
            Event::BalanceRepaired {
                item_id,
                previous_qty,
                repaired_qty,
                user_id,
            } => {
                warn!(
                    %item_id,
                    %previous_qty,
                    %repaired_qty,
                    %user_id,
                    "Cached balance rewritten from movement log"
                );
            }
            Event::MovementRecorded {
                movement_id,
                item_id,
                kind,
                delta,
                new_qty,
                ..
            } => {
                info!(
                    %movement_id,
                    %item_id,
                    kind = kind.as_str(),
                    %delta,
                    %new_qty,
                    "Movement recorded"
                );
            }
            other => info!(event = other.name(), payload = ?other, "Domain event"),
        }
    }

    info!("Event processing loop stopped");
}
