use crate::{
    entities::commerce::{cart, cart_item, Cart, CartItem, CartStatus},
    errors::ServiceError,
    events::{Event, EventSender},
    services::orders::{OrderLineInput, OrderService, OrderWithItemsResponse, PlaceOrderRequest},
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, ModelTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::db::DbPool;

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct CheckoutInput {
    #[validate(length(min = 1, message = "Shipping address is required"))]
    pub shipping_address: String,
    #[validate(length(min = 1, message = "Payment method is required"))]
    pub payment_method: String,
}

/// Checkout service for converting carts to orders.
///
/// Delegates order creation (snapshots, payment, persistence) to the order
/// service; on success the cart is marked converted and emptied. A declined
/// payment or unreachable collaborator leaves the cart untouched.
#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    order_service: Arc<OrderService>,
}

impl CheckoutService {
    pub fn new(
        db: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        order_service: Arc<OrderService>,
    ) -> Self {
        Self {
            db,
            event_sender,
            order_service,
        }
    }

    /// Converts an account cart into an order.
    #[instrument(skip(self, input), fields(cart_id = %cart_id))]
    pub async fn complete_checkout(
        &self,
        cart_id: Uuid,
        input: CheckoutInput,
    ) -> Result<OrderWithItemsResponse, ServiceError> {
        input
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        let cart = Cart::find_by_id(cart_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Cart {} not found", cart_id)))?;

        if cart.status != CartStatus::Active {
            return Err(ServiceError::ValidationError(format!(
                "Cart {} is not active",
                cart_id
            )));
        }

        let customer_id = cart.customer_id.ok_or_else(|| {
            ServiceError::ValidationError(
                "Guest carts must be merged into an account before checkout".to_string(),
            )
        })?;

        let items = cart
            .find_related(CartItem)
            .order_by_asc(cart_item::Column::CreatedAt)
            .all(&*self.db)
            .await?;

        if items.is_empty() {
            return Err(ServiceError::ValidationError("Cart is empty".to_string()));
        }

        let order = self
            .order_service
            .place_order(PlaceOrderRequest {
                customer_id,
                shipping_address: input.shipping_address,
                payment_method: input.payment_method,
                items: items
                    .iter()
                    .map(|item| OrderLineInput {
                        product_id: item.product_id,
                        quantity: item.quantity,
                    })
                    .collect(),
            })
            .await?;

        // Order exists; the cart is now spent.
        let txn = self.db.begin().await?;
        CartItem::delete_many()
            .filter(cart_item::Column::CartId.eq(cart_id))
            .exec(&txn)
            .await?;
        let mut active: cart::ActiveModel = cart.into();
        active.status = Set(CartStatus::Converted);
        active.updated_at = Set(Utc::now());
        active.update(&txn).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CheckoutCompleted {
                cart_id,
                order_id: order.order.id,
            })
            .await;

        info!(cart_id = %cart_id, order_id = %order.order.id, "Checkout completed");

        Ok(order)
    }
}
