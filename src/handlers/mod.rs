pub mod carts;
pub mod orders;
pub mod refunds;

use axum::{extract::State, response::IntoResponse, routing::get, Json};
use serde_json::json;
use std::sync::Arc;

use crate::{
    catalog::ProductCatalog,
    config::AppConfig,
    db::{self, DbPool},
    errors::ServiceError,
    events::EventSender,
    payments::PaymentProcessor,
    services::{
        commerce::{CartService, CheckoutService},
        order_status::OrderStatusService,
        orders::OrderService,
        refunds::RefundService,
        OrderLocks,
    },
    AppState,
};

/// Shared service container handed to every handler through `AppState`.
#[derive(Clone)]
pub struct AppServices {
    pub orders: Arc<OrderService>,
    pub order_status: Arc<OrderStatusService>,
    pub refunds: Arc<RefundService>,
    pub carts: Arc<CartService>,
    pub checkout: Arc<CheckoutService>,
}

impl AppServices {
    /// Wires up the full service graph over one database pool and one
    /// per-order lock registry.
    pub fn build(
        db: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        config: Arc<AppConfig>,
        catalog: Arc<dyn ProductCatalog>,
        payments: Arc<dyn PaymentProcessor>,
    ) -> Self {
        let locks = Arc::new(OrderLocks::new());

        let orders = Arc::new(OrderService::new(
            db.clone(),
            event_sender.clone(),
            catalog.clone(),
            payments,
            config.clone(),
        ));
        let order_status = Arc::new(OrderStatusService::new(
            db.clone(),
            event_sender.clone(),
            locks.clone(),
        ));
        let refunds = Arc::new(RefundService::new(
            db.clone(),
            event_sender.clone(),
            locks,
            config.clone(),
        ));
        let carts = Arc::new(CartService::new(
            db.clone(),
            event_sender.clone(),
            catalog,
            config,
        ));
        let checkout = Arc::new(CheckoutService::new(db, event_sender, orders.clone()));

        Self {
            orders,
            order_status,
            refunds,
            carts,
            checkout,
        }
    }
}

/// Builds the application router.
pub fn router(state: AppState) -> axum::Router {
    axum::Router::new()
        .nest("/api/v1/orders", orders::orders_routes())
        .nest("/api/v1/refunds", refunds::refunds_routes())
        .nest("/api/v1/carts", carts::carts_routes())
        .route("/health", get(health))
        .with_state(Arc::new(state))
}

/// Liveness/readiness probe.
async fn health(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ServiceError> {
    db::health_check(&state.db).await?;
    Ok(Json(json!({ "status": "ok" })))
}
