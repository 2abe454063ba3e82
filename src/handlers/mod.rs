pub mod customers;
pub mod health;
pub mod items;
pub mod movements;

use crate::config::LedgerSettings;
use crate::db::DbPool;
use crate::events::EventSender;
use crate::services::{CustomerService, ItemService, LedgerEngine};
use serde::Deserialize;
use std::sync::Arc;
use utoipa::IntoParams;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub items: Arc<ItemService>,
    pub ledger: Arc<LedgerEngine>,
    pub customers: Arc<CustomerService>,
}

impl AppServices {
    pub fn new(db: Arc<DbPool>, event_sender: EventSender, settings: LedgerSettings) -> Self {
        Self {
            items: Arc::new(ItemService::new(db.clone(), event_sender.clone())),
            ledger: Arc::new(LedgerEngine::new(db.clone(), event_sender.clone(), settings)),
            customers: Arc::new(CustomerService::new(db, event_sender)),
        }
    }
}

/// Page size for history style listings
#[derive(Debug, Clone, Copy, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LimitQuery {
    /// Maximum number of records; clamped to the configured maximum
    pub limit: Option<u64>,
}
