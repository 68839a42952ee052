use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    errors::ServiceError,
    services::commerce::{AddToCartInput, CheckoutInput, CreateCartInput},
    AppState,
};

/// Creates the router for cart endpoints
pub fn carts_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(create_cart))
        .route("/:id", get(get_cart))
        .route("/:id/items", post(add_to_cart))
        .route("/:id/items/:item_id", put(update_cart_item))
        .route("/:id/items/:item_id", delete(remove_cart_item))
        .route("/:id/clear", post(clear_cart))
        .route("/:id/merge", post(merge_cart))
        .route("/:id/checkout", post(checkout))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateCartItemRequest {
    pub quantity: i32,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct MergeCartRequest {
    pub customer_id: Uuid,
}

/// Create a new cart
async fn create_cart(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateCartInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let cart = state.services.carts.create_cart(payload).await?;
    Ok((StatusCode::CREATED, Json(cart)))
}

/// Get cart with items
async fn get_cart(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let cart = state.services.carts.get_cart(id).await?;
    Ok(Json(cart))
}

/// Add an item to the cart, stock permitting
async fn add_to_cart(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AddToCartInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let cart = state.services.carts.add_item(id, payload).await?;
    Ok(Json(cart))
}

/// Set a cart line's quantity (zero removes it)
async fn update_cart_item(
    State(state): State<Arc<AppState>>,
    Path((id, item_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<UpdateCartItemRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let cart = state
        .services
        .carts
        .update_item_quantity(id, item_id, payload.quantity)
        .await?;
    Ok(Json(cart))
}

/// Remove a line from the cart
async fn remove_cart_item(
    State(state): State<Arc<AppState>>,
    Path((id, item_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, ServiceError> {
    let cart = state.services.carts.remove_item(id, item_id).await?;
    Ok(Json(cart))
}

/// Empty the cart
async fn clear_cart(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let cart = state.services.carts.clear_cart(id).await?;
    Ok(Json(cart))
}

/// Merge this guest cart into the customer's account cart
async fn merge_cart(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<MergeCartRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let outcome = state
        .services
        .carts
        .merge_on_login(id, payload.customer_id)
        .await?;
    Ok(Json(outcome))
}

/// Convert the cart into an order
async fn checkout(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CheckoutInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state.services.checkout.complete_checkout(id, payload).await?;
    Ok((StatusCode::CREATED, Json(order)))
}
