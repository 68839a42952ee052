use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    errors::ServiceError,
    services::refunds::{RefundDecision, RefundRequestInput},
    AppState,
};

/// Creates the router for refund resolution endpoints. Requesting a refund
/// lives under the order routes; resolution is item-addressed.
pub fn refunds_routes() -> Router<Arc<AppState>> {
    Router::new().route("/items/:item_id/resolve", post(resolve_refund))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ResolveRefundRequest {
    pub quantity: i32,
    pub decision: RefundDecision,
}

/// Submit item-level refund requests against a delivered order
pub(crate) async fn request_refund(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<Uuid>,
    Json(payload): Json<RefundRequestInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let outcome = state
        .services
        .refunds
        .request_refund(order_id, payload)
        .await?;

    // Some lines may have failed while others applied; the outcome carries
    // both, so a batch caller can retry just the failures.
    let status = if outcome.failed.is_empty() {
        StatusCode::OK
    } else {
        StatusCode::MULTI_STATUS
    };
    Ok((status, Json(outcome)))
}

/// Approve or reject requested units on one order item
async fn resolve_refund(
    State(state): State<Arc<AppState>>,
    Path(item_id): Path<Uuid>,
    Json(payload): Json<ResolveRefundRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    state
        .services
        .refunds
        .resolve_refund(item_id, payload.quantity, payload.decision)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
