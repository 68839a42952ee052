use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    entities::order::OrderStatus,
    errors::ServiceError,
    services::orders::PlaceOrderRequest,
    AppState, ListQuery,
};

/// Creates the router for order endpoints
pub fn orders_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(place_order))
        .route("/", get(list_orders))
        .route("/:id", get(get_order))
        .route("/:id/status", put(update_status))
        .route("/:id/cancel", post(cancel_order))
        .route("/:id/refunds", post(super::refunds::request_refund))
        .route("/status/batch", post(batch_update_status))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateOrderStatusRequest {
    pub status: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CancelOrderRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct BatchStatusUpdateRequest {
    pub order_ids: Vec<Uuid>,
    pub status: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StatusResponse {
    pub order_id: Uuid,
    pub status: OrderStatus,
    pub display_status: OrderStatus,
}

pub(crate) fn map_status_str(status: &str) -> Result<OrderStatus, ServiceError> {
    match status.to_ascii_lowercase().as_str() {
        "processing" => Ok(OrderStatus::Processing),
        "in_transit" | "in-transit" => Ok(OrderStatus::InTransit),
        "delivered" => Ok(OrderStatus::Delivered),
        "cancelled" | "canceled" => Ok(OrderStatus::Cancelled),
        "refund_requested" => Ok(OrderStatus::RefundRequested),
        "refund_accepted" => Ok(OrderStatus::RefundAccepted),
        "refund_rejected" => Ok(OrderStatus::RefundRejected),
        other => Err(ServiceError::ValidationError(format!(
            "Unknown order status: {other}"
        ))),
    }
}

/// Place a new order
async fn place_order(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<PlaceOrderRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state.services.orders.place_order(payload).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// Get an order with its items
async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state.services.orders.get_order_with_items(id).await?;
    Ok(Json(order))
}

/// List orders, newest first
async fn list_orders(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let orders = state
        .services
        .orders
        .list_orders(query.page, query.per_page)
        .await?;
    Ok(Json(orders))
}

/// Advance an order's fulfillment status
async fn update_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateOrderStatusRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let status = map_status_str(&payload.status)?;
    let order = state.services.order_status.update_status(id, status).await?;
    Ok(Json(StatusResponse {
        order_id: order.id,
        status: order.status,
        display_status: order.status.display(),
    }))
}

/// Cancel an order that is still processing
async fn cancel_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CancelOrderRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state
        .services
        .order_status
        .cancel_order(id, payload.reason)
        .await?;
    Ok(Json(StatusResponse {
        order_id: order.id,
        status: order.status,
        display_status: order.status.display(),
    }))
}

/// Apply one status to many orders; invalid orders are reported, not fatal
async fn batch_update_status(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<BatchStatusUpdateRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let status = map_status_str(&payload.status)?;
    let outcome = state
        .services
        .order_status
        .batch_update_status(payload.order_ids, status)
        .await?;
    Ok(Json(outcome))
}
