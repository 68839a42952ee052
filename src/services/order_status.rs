use std::sync::Arc;

use chrono::Utc;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, EntityTrait, TransactionTrait};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    db::DbPool,
    entities::order::{
        ActiveModel as OrderActiveModel, Entity as OrderEntity, Model as OrderModel, OrderStatus,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::OrderLocks,
};

/// Outcome of a bulk status update. Valid orders apply; failing orders are
/// reported back by id instead of aborting the whole batch.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BatchStatusOutcome {
    pub updated: Vec<Uuid>,
    pub failed: Vec<BatchStatusFailure>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BatchStatusFailure {
    pub order_id: Uuid,
    pub error: String,
}

/// Drives the order fulfillment lifecycle.
///
/// All changes are validated against [`OrderStatus::can_transition_to`];
/// refund-cycle statuses are reserved for the refund workflow and rejected
/// here even though the table knows their edges.
#[derive(Clone)]
pub struct OrderStatusService {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    locks: Arc<OrderLocks>,
}

impl OrderStatusService {
    pub fn new(db: Arc<DbPool>, event_sender: Arc<EventSender>, locks: Arc<OrderLocks>) -> Self {
        Self {
            db,
            event_sender,
            locks,
        }
    }

    /// Advances an order to a new fulfillment status.
    ///
    /// Setting the current status again is a no-op success. Any transition
    /// not in the lifecycle table is rejected without touching the order.
    #[instrument(skip(self), fields(order_id = %order_id, new_status = %new_status))]
    pub async fn update_status(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
    ) -> Result<OrderModel, ServiceError> {
        self.apply_transition(order_id, new_status, None).await
    }

    /// Cancels an order. Only legal while the order is still processing.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn cancel_order(
        &self,
        order_id: Uuid,
        reason: Option<String>,
    ) -> Result<OrderModel, ServiceError> {
        let order = self
            .apply_transition(order_id, OrderStatus::Cancelled, reason)
            .await?;

        self.event_sender
            .send_or_log(Event::OrderCancelled(order_id))
            .await;

        Ok(order)
    }

    /// Gets the current status of an order
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn get_status(&self, order_id: Uuid) -> Result<OrderStatus, ServiceError> {
        let order = OrderEntity::find_by_id(order_id)
            .one(&*self.db)
            .await
            .map_err(|e| {
                error!(error = %e, order_id = %order_id, "Failed to fetch order");
                ServiceError::DatabaseError(e)
            })?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        Ok(order.status)
    }

    /// Batch update status for multiple orders.
    ///
    /// Each order is validated against the transition table independently;
    /// one illegal order never blocks the rest, it is reported back in the
    /// outcome with its error.
    #[instrument(skip(self, order_ids), fields(count = order_ids.len(), new_status = %new_status))]
    pub async fn batch_update_status(
        &self,
        order_ids: Vec<Uuid>,
        new_status: OrderStatus,
    ) -> Result<BatchStatusOutcome, ServiceError> {
        let mut outcome = BatchStatusOutcome {
            updated: Vec::new(),
            failed: Vec::new(),
        };

        for order_id in order_ids {
            match self.update_status(order_id, new_status).await {
                Ok(_) => outcome.updated.push(order_id),
                Err(e) => {
                    warn!(order_id = %order_id, error = %e, "Order excluded from batch update");
                    outcome.failed.push(BatchStatusFailure {
                        order_id,
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            updated = outcome.updated.len(),
            failed = outcome.failed.len(),
            "Batch status update finished"
        );

        Ok(outcome)
    }

    async fn apply_transition(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
        notes: Option<String>,
    ) -> Result<OrderModel, ServiceError> {
        let _guard = self.locks.acquire(order_id).await;

        let txn = self.db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to begin transaction");
            ServiceError::DatabaseError(e)
        })?;

        let order = OrderEntity::find_by_id(order_id)
            .one(&txn)
            .await
            .map_err(|e| {
                error!(error = %e, order_id = %order_id, "Failed to fetch order");
                ServiceError::DatabaseError(e)
            })?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let old_status = order.status;

        // Re-setting the current status is a no-op, not an error.
        if old_status == new_status {
            return Ok(order);
        }

        // Refund-cycle statuses are driven by the refund subsystem, never
        // set directly by operators.
        if new_status.is_refund_cycle() || !old_status.can_transition_to(new_status) {
            return Err(ServiceError::InvalidTransition {
                from: old_status,
                to: new_status,
            });
        }

        let version = order.version;
        let mut active: OrderActiveModel = order.into();
        active.status = Set(new_status);
        active.updated_at = Set(Some(Utc::now()));
        active.version = Set(version + 1);
        if let Some(notes) = notes {
            active.notes = Set(Some(notes));
        }

        let updated = active.update(&txn).await.map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to update order status");
            ServiceError::DatabaseError(e)
        })?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to commit status update");
            ServiceError::DatabaseError(e)
        })?;

        info!(order_id = %order_id, %old_status, %new_status, "Order status updated");

        self.event_sender
            .send_or_log(Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            })
            .await;

        Ok(updated)
    }
}
