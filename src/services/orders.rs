use crate::{
    catalog::{with_timeout, ProductCatalog, ProductSnapshot},
    config::AppConfig,
    db::DbPool,
    entities::order::{
        self, ActiveModel as OrderActiveModel, Entity as OrderEntity, Model as OrderModel,
        OrderStatus,
    },
    entities::order_item::{
        self, ActiveModel as OrderItemActiveModel, Entity as OrderItemEntity,
        Model as OrderItemModel,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    payments::{PaymentProcessor, PaymentRequest},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Request/Response types for the order service
#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct PlaceOrderRequest {
    pub customer_id: Uuid,
    #[validate(length(min = 1, message = "Shipping address is required"))]
    pub shipping_address: String,
    #[validate(length(min = 1, message = "Payment method is required"))]
    pub payment_method: String,
    #[validate(length(min = 1, message = "An order needs at least one line"))]
    pub items: Vec<OrderLineInput>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderLineInput {
    pub product_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderResponse {
    pub id: Uuid,
    pub order_number: String,
    pub customer_id: Uuid,
    /// Raw lifecycle status.
    pub status: OrderStatus,
    /// Customer-facing status; resolved refund cycles show as `delivered`.
    pub display_status: OrderStatus,
    pub shipping_address: String,
    pub currency: String,
    pub total_amount: Decimal,
    pub refund_total: Decimal,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub version: i32,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderItemResponse {
    pub id: Uuid,
    pub product_id: Uuid,
    pub name: String,
    pub model: String,
    pub price_at_purchase: Decimal,
    pub quantity: i32,
    pub refund_requested_qty: i32,
    pub refund_approved_qty: i32,
    pub refund_rejected_qty: i32,
    /// Units still unclaimed by any refund request.
    pub refundable_qty: i32,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderWithItemsResponse {
    #[serde(flatten)]
    pub order: OrderResponse,
    pub items: Vec<OrderItemResponse>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderListResponse {
    pub orders: Vec<OrderResponse>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

/// Service for placing and reading orders.
///
/// Order creation is gated on the payment collaborator; the order header and
/// its items are inserted in a single transaction so an order is never
/// half-created.
#[derive(Clone)]
pub struct OrderService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    catalog: Arc<dyn ProductCatalog>,
    payments: Arc<dyn PaymentProcessor>,
    config: Arc<AppConfig>,
}

impl OrderService {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        catalog: Arc<dyn ProductCatalog>,
        payments: Arc<dyn PaymentProcessor>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            catalog,
            payments,
            config,
        }
    }

    /// Creates a new order from explicit lines.
    ///
    /// Fetches a purchase-time snapshot per product, totals the order,
    /// authorizes payment, and only then persists. A declined payment or an
    /// unreachable collaborator leaves nothing behind.
    #[instrument(skip(self, request), fields(customer_id = %request.customer_id))]
    pub async fn place_order(
        &self,
        request: PlaceOrderRequest,
    ) -> Result<OrderWithItemsResponse, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        for line in &request.items {
            if line.quantity < 1 {
                return Err(ServiceError::ValidationError(format!(
                    "Quantity for product {} must be at least 1",
                    line.product_id
                )));
            }
        }

        let timeout = self.config.collaborator_timeout();
        let mut snapshots: Vec<ProductSnapshot> = Vec::with_capacity(request.items.len());
        for line in &request.items {
            let snapshot = with_timeout(
                timeout,
                "product snapshot",
                self.catalog.product_snapshot(line.product_id),
            )
            .await?;
            snapshots.push(snapshot);
        }

        let currency = snapshots
            .first()
            .map(|s| s.currency.clone())
            .unwrap_or_else(|| self.config.default_currency.clone());
        if snapshots.iter().any(|s| s.currency != currency) {
            return Err(ServiceError::ValidationError(
                "All order lines must share one currency".to_string(),
            ));
        }

        let total_amount: Decimal = request
            .items
            .iter()
            .zip(&snapshots)
            .map(|(line, snap)| snap.price * Decimal::from(line.quantity))
            .sum();

        let authorization = with_timeout(
            timeout,
            "payment authorization",
            self.payments.authorize(PaymentRequest {
                amount: total_amount,
                currency: currency.clone(),
                method: request.payment_method.clone(),
            }),
        )
        .await?;

        if !authorization.approved {
            warn!(customer_id = %request.customer_id, %total_amount, "Payment declined");
            return Err(ServiceError::PaymentFailed(
                "Payment authorization was declined".to_string(),
            ));
        }

        let db = &*self.db_pool;
        let now = Utc::now();
        let order_id = Uuid::new_v4();
        let order_number = format!("ORD-{}", &order_id.simple().to_string()[..12].to_uppercase());

        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for order creation");
            ServiceError::DatabaseError(e)
        })?;

        let order_active_model = OrderActiveModel {
            id: Set(order_id),
            order_number: Set(order_number),
            customer_id: Set(request.customer_id),
            status: Set(OrderStatus::Processing),
            shipping_address: Set(request.shipping_address.clone()),
            currency: Set(currency),
            total_amount: Set(total_amount),
            refund_total: Set(Decimal::ZERO),
            refund_cycle_approved: Set(false),
            notes: Set(None),
            created_at: Set(now),
            updated_at: Set(Some(now)),
            version: Set(1),
        };

        let order_model = order_active_model.insert(&txn).await.map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to create order in database");
            ServiceError::DatabaseError(e)
        })?;

        let mut item_models = Vec::with_capacity(request.items.len());
        for (position, (line, snapshot)) in request.items.iter().zip(&snapshots).enumerate() {
            let item = OrderItemActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(line.product_id),
                name: Set(snapshot.name.clone()),
                model: Set(snapshot.model.clone()),
                price_at_purchase: Set(snapshot.price),
                quantity: Set(line.quantity),
                position: Set(position as i32),
                refund_requested_qty: Set(0),
                refund_approved_qty: Set(0),
                refund_rejected_qty: Set(0),
                created_at: Set(now),
                updated_at: Set(Some(now)),
            };
            item_models.push(item.insert(&txn).await.map_err(|e| {
                error!(error = %e, order_id = %order_id, "Failed to create order item");
                ServiceError::DatabaseError(e)
            })?);
        }

        txn.commit().await.map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to commit order creation transaction");
            ServiceError::DatabaseError(e)
        })?;

        info!(order_id = %order_id, customer_id = %request.customer_id, "Order created");

        self.event_sender.send_or_log(Event::OrderCreated(order_id)).await;

        Ok(OrderWithItemsResponse {
            order: model_to_response(order_model),
            items: item_models.into_iter().map(item_to_response).collect(),
        })
    }

    /// Retrieves an order header by ID
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn get_order(&self, order_id: Uuid) -> Result<OrderResponse, ServiceError> {
        let order = self.load_order(order_id).await?;
        Ok(model_to_response(order))
    }

    /// Retrieves an order with its items, in checkout display order.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn get_order_with_items(
        &self,
        order_id: Uuid,
    ) -> Result<OrderWithItemsResponse, ServiceError> {
        let order = self.load_order(order_id).await?;
        let items = OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .order_by_asc(order_item::Column::Position)
            .all(&*self.db_pool)
            .await
            .map_err(ServiceError::DatabaseError)?;

        Ok(OrderWithItemsResponse {
            order: model_to_response(order),
            items: items.into_iter().map(item_to_response).collect(),
        })
    }

    /// Lists orders with pagination, newest first.
    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<OrderListResponse, ServiceError> {
        let page = page.max(1);
        let paginator = OrderEntity::find()
            .order_by_desc(order::Column::CreatedAt)
            .paginate(&*self.db_pool, per_page.clamp(1, 100));

        let total = paginator.num_items().await.map_err(|e| {
            error!(error = %e, "Failed to count orders");
            ServiceError::DatabaseError(e)
        })?;

        let orders = paginator.fetch_page(page - 1).await.map_err(|e| {
            error!(error = %e, page, per_page, "Failed to fetch orders page");
            ServiceError::DatabaseError(e)
        })?;

        Ok(OrderListResponse {
            orders: orders.into_iter().map(model_to_response).collect(),
            total,
            page,
            per_page,
        })
    }

    async fn load_order(&self, order_id: Uuid) -> Result<OrderModel, ServiceError> {
        OrderEntity::find_by_id(order_id)
            .one(&*self.db_pool)
            .await
            .map_err(|e| {
                error!(error = %e, order_id = %order_id, "Failed to fetch order from database");
                ServiceError::DatabaseError(e)
            })?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
    }
}

/// Converts an order model to response format
pub(crate) fn model_to_response(model: OrderModel) -> OrderResponse {
    OrderResponse {
        id: model.id,
        order_number: model.order_number,
        customer_id: model.customer_id,
        status: model.status,
        display_status: model.status.display(),
        shipping_address: model.shipping_address,
        currency: model.currency,
        total_amount: model.total_amount,
        refund_total: model.refund_total,
        notes: model.notes,
        created_at: model.created_at,
        updated_at: model.updated_at,
        version: model.version,
    }
}

pub(crate) fn item_to_response(model: OrderItemModel) -> OrderItemResponse {
    let refundable_qty = model.refundable_qty();
    OrderItemResponse {
        id: model.id,
        product_id: model.product_id,
        name: model.name,
        model: model.model,
        price_at_purchase: model.price_at_purchase,
        quantity: model.quantity,
        refund_requested_qty: model.refund_requested_qty,
        refund_approved_qty: model.refund_approved_qty,
        refund_rejected_qty: model.refund_rejected_qty,
        refundable_qty,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn model_to_response_exposes_display_status() {
        let now = Utc::now();
        let order_id = Uuid::new_v4();

        let model = OrderModel {
            id: order_id,
            order_number: "ORD-001".to_string(),
            customer_id: Uuid::new_v4(),
            status: OrderStatus::RefundAccepted,
            shipping_address: "123 Main St".to_string(),
            currency: "USD".to_string(),
            total_amount: dec!(99.99),
            refund_total: dec!(9.99),
            refund_cycle_approved: true,
            notes: None,
            created_at: now,
            updated_at: Some(now),
            version: 4,
        };

        let response = model_to_response(model);
        assert_eq!(response.id, order_id);
        assert_eq!(response.status, OrderStatus::RefundAccepted);
        assert_eq!(response.display_status, OrderStatus::Delivered);
        assert_eq!(response.refund_total, dec!(9.99));
    }

    #[test]
    fn item_response_carries_remaining_refundable_units() {
        let now = Utc::now();
        let model = OrderItemModel {
            id: Uuid::new_v4(),
            order_id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            name: "Widget".to_string(),
            model: "W-100".to_string(),
            price_at_purchase: dec!(19.99),
            quantity: 5,
            position: 0,
            refund_requested_qty: 1,
            refund_approved_qty: 2,
            refund_rejected_qty: 0,
            created_at: now,
            updated_at: None,
        };

        let response = item_to_response(model);
        assert_eq!(response.refundable_qty, 2);
    }
}
