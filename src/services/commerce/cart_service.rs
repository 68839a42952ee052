use crate::{
    catalog::{with_timeout, ProductCatalog},
    config::AppConfig,
    db::DbPool,
    entities::commerce::{cart, cart_item, Cart, CartItem, CartItemModel, CartModel, CartStatus},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseTransaction, EntityTrait, ModelTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct CreateCartInput {
    /// Browser session token for guest carts.
    pub session_token: Option<String>,
    /// Account id for customer carts.
    pub customer_id: Option<Uuid>,
    pub currency: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AddToCartInput {
    pub product_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CartWithItems {
    #[serde(flatten)]
    pub cart: CartModel,
    pub items: Vec<CartItemModel>,
}

/// One guest line that could not be merged in full because of stock limits.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UnmergedLine {
    pub product_id: Uuid,
    pub requested: i32,
    pub merged: i32,
    pub unmerged: i32,
}

/// Result of reconciling a guest cart into an account cart. A partially
/// satisfied merge is a degraded success, never a hard failure; the deltas
/// tell the caller exactly what was dropped.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CartMergeOutcome {
    #[serde(flatten)]
    pub cart: CartWithItems,
    pub unmerged: Vec<UnmergedLine>,
}

/// Shopping cart service.
///
/// Guest carts live per browser session; account carts persist across
/// sessions. Stock limits are enforced against the catalog collaborator on
/// every quantity change.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    catalog: Arc<dyn ProductCatalog>,
    config: Arc<AppConfig>,
}

impl CartService {
    pub fn new(
        db: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        catalog: Arc<dyn ProductCatalog>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            db,
            event_sender,
            catalog,
            config,
        }
    }

    /// Creates a new shopping cart for a guest session or an account.
    #[instrument(skip(self))]
    pub async fn create_cart(&self, input: CreateCartInput) -> Result<CartModel, ServiceError> {
        if input.session_token.is_none() && input.customer_id.is_none() {
            return Err(ServiceError::ValidationError(
                "A cart needs a session token or a customer".to_string(),
            ));
        }

        let cart_id = Uuid::new_v4();
        let now = Utc::now();

        let cart = cart::ActiveModel {
            id: Set(cart_id),
            session_token: Set(input.session_token),
            customer_id: Set(input.customer_id),
            currency: Set(input
                .currency
                .unwrap_or_else(|| self.config.default_currency.clone())),
            status: Set(CartStatus::Active),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let cart = cart.insert(&*self.db).await?;

        self.event_sender.send_or_log(Event::CartCreated(cart_id)).await;

        info!(cart_id = %cart_id, "Created cart");
        Ok(cart)
    }

    /// Gets a cart with its items.
    #[instrument(skip(self))]
    pub async fn get_cart(&self, cart_id: Uuid) -> Result<CartWithItems, ServiceError> {
        let cart = Cart::find_by_id(cart_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Cart {} not found", cart_id)))?;

        let items = cart
            .find_related(CartItem)
            .order_by_asc(cart_item::Column::CreatedAt)
            .all(&*self.db)
            .await?;

        Ok(CartWithItems { cart, items })
    }

    /// Returns the customer's active cart, creating one on first login.
    #[instrument(skip(self))]
    pub async fn find_or_create_account_cart(
        &self,
        customer_id: Uuid,
    ) -> Result<CartModel, ServiceError> {
        let existing = Cart::find()
            .filter(cart::Column::CustomerId.eq(customer_id))
            .filter(cart::Column::Status.eq(CartStatus::Active))
            .one(&*self.db)
            .await?;

        if let Some(cart) = existing {
            return Ok(cart);
        }

        self.create_cart(CreateCartInput {
            session_token: None,
            customer_id: Some(customer_id),
            currency: None,
        })
        .await
    }

    /// Adds an item to the cart or bumps its quantity if already present.
    ///
    /// The combined quantity must fit within the catalog's stock level;
    /// otherwise nothing changes for that product and the caller gets
    /// `InsufficientStock`.
    #[instrument(skip(self))]
    pub async fn add_item(
        &self,
        cart_id: Uuid,
        input: AddToCartInput,
    ) -> Result<CartWithItems, ServiceError> {
        if input.quantity < 1 {
            return Err(ServiceError::ValidationError(
                "Quantity must be at least 1".to_string(),
            ));
        }

        let stock = with_timeout(
            self.config.collaborator_timeout(),
            "stock lookup",
            self.catalog.stock_level(input.product_id),
        )
        .await?;

        let txn = self.db.begin().await?;

        let cart = self.active_cart(&txn, cart_id).await?;

        let existing_item = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart_id))
            .filter(cart_item::Column::ProductId.eq(input.product_id))
            .one(&txn)
            .await?;

        let existing_qty = existing_item.as_ref().map_or(0, |item| item.quantity);
        if existing_qty + input.quantity > stock {
            return Err(ServiceError::InsufficientStock(format!(
                "Product {}: {} in cart plus {} requested exceeds stock of {}",
                input.product_id, existing_qty, input.quantity, stock
            )));
        }

        upsert_line(&txn, &cart, existing_item, input.product_id, existing_qty + input.quantity)
            .await?;
        touch_cart(&txn, cart).await?;

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartItemAdded {
                cart_id,
                product_id: input.product_id,
            })
            .await;

        info!(cart_id = %cart_id, product_id = %input.product_id, quantity = input.quantity, "Added item to cart");
        self.get_cart(cart_id).await
    }

    /// Sets the quantity of a cart item. Zero or negative removes the line.
    #[instrument(skip(self))]
    pub async fn update_item_quantity(
        &self,
        cart_id: Uuid,
        item_id: Uuid,
        quantity: i32,
    ) -> Result<CartWithItems, ServiceError> {
        if quantity <= 0 {
            return self.remove_item(cart_id, item_id).await;
        }

        let txn = self.db.begin().await?;

        let cart = self.active_cart(&txn, cart_id).await?;

        let item = CartItem::find_by_id(item_id)
            .one(&txn)
            .await?
            .filter(|item| item.cart_id == cart_id)
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Cart item {} not found in cart {}", item_id, cart_id))
            })?;

        let stock = with_timeout(
            self.config.collaborator_timeout(),
            "stock lookup",
            self.catalog.stock_level(item.product_id),
        )
        .await?;
        if quantity > stock {
            return Err(ServiceError::InsufficientStock(format!(
                "Product {}: requested {} exceeds stock of {}",
                item.product_id, quantity, stock
            )));
        }

        let mut active: cart_item::ActiveModel = item.into();
        active.quantity = Set(quantity);
        active.updated_at = Set(Some(Utc::now()));
        active.update(&txn).await?;
        touch_cart(&txn, cart).await?;

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartItemUpdated { cart_id, item_id })
            .await;

        self.get_cart(cart_id).await
    }

    /// Removes a line from the cart.
    #[instrument(skip(self))]
    pub async fn remove_item(
        &self,
        cart_id: Uuid,
        item_id: Uuid,
    ) -> Result<CartWithItems, ServiceError> {
        let txn = self.db.begin().await?;

        let cart = self.active_cart(&txn, cart_id).await?;

        let item = CartItem::find_by_id(item_id)
            .one(&txn)
            .await?
            .filter(|item| item.cart_id == cart_id)
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Cart item {} not found in cart {}", item_id, cart_id))
            })?;

        item.delete(&txn).await?;
        touch_cart(&txn, cart).await?;

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartItemRemoved { cart_id, item_id })
            .await;

        self.get_cart(cart_id).await
    }

    /// Removes every line from the cart.
    #[instrument(skip(self))]
    pub async fn clear_cart(&self, cart_id: Uuid) -> Result<CartWithItems, ServiceError> {
        let txn = self.db.begin().await?;

        let cart = self.active_cart(&txn, cart_id).await?;

        CartItem::delete_many()
            .filter(cart_item::Column::CartId.eq(cart_id))
            .exec(&txn)
            .await?;
        touch_cart(&txn, cart).await?;

        txn.commit().await?;

        self.event_sender.send_or_log(Event::CartCleared(cart_id)).await;

        self.get_cart(cart_id).await
    }

    /// Reconciles a guest cart into the account cart at login.
    ///
    /// Every guest line is added to the account cart up to the product's
    /// stock level; whatever does not fit is reported per product as an
    /// unmerged delta. The guest cart is consumed unconditionally in the
    /// same transaction, so a retry can never apply the same quantities
    /// twice. If the store or the stock lookup is unreachable the whole
    /// merge aborts and the guest cart survives for a later retry.
    #[instrument(skip(self), fields(guest_cart_id = %guest_cart_id, customer_id = %customer_id))]
    pub async fn merge_on_login(
        &self,
        guest_cart_id: Uuid,
        customer_id: Uuid,
    ) -> Result<CartMergeOutcome, ServiceError> {
        let guest_cart = Cart::find_by_id(guest_cart_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Cart {} not found", guest_cart_id)))?;

        if !guest_cart.is_guest() {
            return Err(ServiceError::ValidationError(format!(
                "Cart {} is not a guest cart",
                guest_cart_id
            )));
        }
        if guest_cart.status != CartStatus::Active {
            return Err(ServiceError::ValidationError(format!(
                "Cart {} is not active",
                guest_cart_id
            )));
        }

        let guest_items = guest_cart
            .find_related(CartItem)
            .order_by_asc(cart_item::Column::CreatedAt)
            .all(&*self.db)
            .await?;

        // Stock levels are fetched up front: an unreachable catalog aborts
        // the merge before anything is written, leaving the guest cart
        // intact for retry.
        let timeout = self.config.collaborator_timeout();
        let mut stock_levels = Vec::with_capacity(guest_items.len());
        for item in &guest_items {
            let stock = with_timeout(
                timeout,
                "stock lookup",
                self.catalog.stock_level(item.product_id),
            )
            .await?;
            stock_levels.push(stock);
        }

        let account_cart = self.find_or_create_account_cart(customer_id).await?;
        let account_cart_id = account_cart.id;

        let txn = self.db.begin().await?;

        let mut unmerged = Vec::new();

        for (guest_item, stock) in guest_items.iter().zip(stock_levels) {
            let existing_item = CartItem::find()
                .filter(cart_item::Column::CartId.eq(account_cart_id))
                .filter(cart_item::Column::ProductId.eq(guest_item.product_id))
                .one(&txn)
                .await?;
            let existing_qty = existing_item.as_ref().map_or(0, |item| item.quantity);

            let allowed = (stock - existing_qty).clamp(0, guest_item.quantity);
            if allowed > 0 {
                upsert_line(
                    &txn,
                    &account_cart,
                    existing_item,
                    guest_item.product_id,
                    existing_qty + allowed,
                )
                .await?;
            }
            if allowed < guest_item.quantity {
                warn!(
                    product_id = %guest_item.product_id,
                    requested = guest_item.quantity,
                    merged = allowed,
                    stock,
                    "Guest line only partially merged"
                );
                unmerged.push(UnmergedLine {
                    product_id: guest_item.product_id,
                    requested: guest_item.quantity,
                    merged: allowed,
                    unmerged: guest_item.quantity - allowed,
                });
            }
        }

        // The guest cart is consumed no matter how much fit.
        CartItem::delete_many()
            .filter(cart_item::Column::CartId.eq(guest_cart_id))
            .exec(&txn)
            .await?;
        let mut guest_active: cart::ActiveModel = guest_cart.into();
        guest_active.status = Set(CartStatus::Merged);
        guest_active.updated_at = Set(Utc::now());
        guest_active.update(&txn).await?;

        touch_cart(&txn, account_cart).await?;

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartMerged {
                guest_cart_id,
                account_cart_id,
                unmerged_products: unmerged.len(),
            })
            .await;

        info!(
            guest_cart_id = %guest_cart_id,
            account_cart_id = %account_cart_id,
            unmerged = unmerged.len(),
            "Guest cart merged into account cart"
        );

        Ok(CartMergeOutcome {
            cart: self.get_cart(account_cart_id).await?,
            unmerged,
        })
    }

    async fn active_cart(
        &self,
        txn: &DatabaseTransaction,
        cart_id: Uuid,
    ) -> Result<CartModel, ServiceError> {
        let cart = Cart::find_by_id(cart_id)
            .one(txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Cart {} not found", cart_id)))?;

        if cart.status != CartStatus::Active {
            return Err(ServiceError::ValidationError(format!(
                "Cart {} is not active",
                cart_id
            )));
        }

        Ok(cart)
    }
}

async fn upsert_line(
    txn: &DatabaseTransaction,
    cart: &CartModel,
    existing: Option<CartItemModel>,
    product_id: Uuid,
    new_quantity: i32,
) -> Result<(), ServiceError> {
    match existing {
        Some(item) => {
            let mut active: cart_item::ActiveModel = item.into();
            active.quantity = Set(new_quantity);
            active.updated_at = Set(Some(Utc::now()));
            active.update(txn).await?;
        }
        None => {
            let item = cart_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                cart_id: Set(cart.id),
                product_id: Set(product_id),
                quantity: Set(new_quantity),
                created_at: Set(Utc::now()),
                updated_at: Set(Some(Utc::now())),
            };
            item.insert(txn).await?;
        }
    }
    Ok(())
}

async fn touch_cart(txn: &DatabaseTransaction, cart: CartModel) -> Result<(), ServiceError> {
    let mut active: cart::ActiveModel = cart.into();
    active.updated_at = Set(Utc::now());
    active.update(txn).await?;
    Ok(())
}
