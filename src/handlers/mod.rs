pub mod orders;

use crate::db::DbPool;
use crate::events::EventSender;
use crate::payments::PaymentMethodMap;
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub order: Arc<crate::services::orders::OrderService>,
    pub order_queries: Arc<crate::services::order_queries::OrderQueryService>,
}

impl AppServices {
    pub fn new(
        db_pool: Arc<DbPool>,
        payment_methods: Arc<PaymentMethodMap>,
        event_sender: Arc<EventSender>,
    ) -> Self {
        let order = Arc::new(crate::services::orders::OrderService::new(
            db_pool.clone(),
            payment_methods,
            Some(event_sender),
        ));
        let order_queries = Arc::new(crate::services::order_queries::OrderQueryService::new(
            db_pool,
        ));

        Self {
            order,
            order_queries,
        }
    }
}
