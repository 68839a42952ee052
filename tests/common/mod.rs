#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use uuid::Uuid;

use storefront_api::{
    catalog::{CatalogError, InMemoryCatalog, ProductCatalog, ProductSnapshot},
    config::AppConfig,
    db::{self, DbConfig},
    entities::order::{self, Entity as OrderEntity, OrderStatus},
    events::{self, event_channel},
    payments::InMemoryPaymentProcessor,
    services::orders::{OrderLineInput, OrderWithItemsResponse, PlaceOrderRequest},
    AppState,
};

/// Helper harness backed by an in-memory SQLite database.
pub struct TestApp {
    pub state: AppState,
    pub catalog: Arc<InMemoryCatalog>,
    pub payments: Arc<InMemoryPaymentProcessor>,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    /// Construct a new test application with fresh database state.
    pub async fn new() -> Self {
        let config = AppConfig::new(
            "sqlite::memory:".to_string(),
            "127.0.0.1".to_string(),
            0,
            "test".to_string(),
        );

        // A single connection keeps every query on the same in-memory
        // database.
        let db_config = DbConfig {
            url: config.database_url.clone(),
            max_connections: 1,
            min_connections: 1,
            ..Default::default()
        };
        let pool = db::establish_connection_with_config(&db_config)
            .await
            .expect("failed to create test database");
        let db = Arc::new(pool);

        db::run_migrations(&db)
            .await
            .expect("failed to run migrations in tests");

        let (event_sender, event_rx) = event_channel(64);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let catalog = Arc::new(InMemoryCatalog::new());
        let payments = Arc::new(InMemoryPaymentProcessor::new());

        let state = AppState::new(
            db,
            Arc::new(config),
            event_sender,
            catalog.clone(),
            payments.clone(),
        );

        Self {
            state,
            catalog,
            payments,
            _event_task: event_task,
        }
    }

    /// Registers a product in the catalog and returns its id.
    pub fn seed_product(&self, name: &str, model: &str, price: Decimal, stock: i32) -> Uuid {
        let product_id = Uuid::new_v4();
        self.catalog.insert(
            ProductSnapshot {
                product_id,
                name: name.to_string(),
                model: model.to_string(),
                price,
                currency: "USD".to_string(),
            },
            stock,
        );
        product_id
    }

    /// Places an order for the given (product, quantity) lines.
    pub async fn place_order(&self, lines: &[(Uuid, i32)]) -> OrderWithItemsResponse {
        self.state
            .services
            .orders
            .place_order(PlaceOrderRequest {
                customer_id: Uuid::new_v4(),
                shipping_address: "1 Test Lane".to_string(),
                payment_method: "card".to_string(),
                items: lines
                    .iter()
                    .map(|(product_id, quantity)| OrderLineInput {
                        product_id: *product_id,
                        quantity: *quantity,
                    })
                    .collect(),
            })
            .await
            .expect("failed to place order")
    }

    /// Walks an order forward to delivered.
    pub async fn deliver_order(&self, order_id: Uuid) {
        for status in [OrderStatus::InTransit, OrderStatus::Delivered] {
            self.state
                .services
                .order_status
                .update_status(order_id, status)
                .await
                .expect("failed to advance order");
        }
    }

    /// Rewrites an order's creation time, for eligibility-window tests.
    pub async fn backdate_order(&self, order_id: Uuid, days: i64) {
        let order = OrderEntity::find_by_id(order_id)
            .one(&*self.state.db)
            .await
            .expect("failed to load order")
            .expect("order missing");

        let mut active: order::ActiveModel = order.into();
        active.created_at = Set(Utc::now() - Duration::days(days));
        active
            .update(&*self.state.db)
            .await
            .expect("failed to backdate order");
    }
}

/// Catalog double standing in for an unreachable stock/catalog service.
pub struct OutageCatalog;

#[async_trait]
impl ProductCatalog for OutageCatalog {
    async fn stock_level(&self, _product_id: Uuid) -> Result<i32, CatalogError> {
        Err(CatalogError::Unavailable("stock service down".to_string()))
    }

    async fn product_snapshot(&self, _product_id: Uuid) -> Result<ProductSnapshot, CatalogError> {
        Err(CatalogError::Unavailable("catalog service down".to_string()))
    }
}
