use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    config::AppConfig,
    db::DbPool,
    entities::order::{ActiveModel as OrderActiveModel, Entity as OrderEntity, OrderStatus},
    entities::order_item::{
        self, ActiveModel as OrderItemActiveModel, Entity as OrderItemEntity,
        Model as OrderItemModel,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::OrderLocks,
};

/// One line of a customer refund request.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RefundLineInput {
    pub order_item_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RefundRequestInput {
    pub lines: Vec<RefundLineInput>,
    pub reason: String,
}

/// Per-line outcome of a refund request. Lines are validated independently;
/// a failing line never rolls back its siblings.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RefundRequestOutcome {
    pub order_id: Uuid,
    /// Order item ids whose units were moved to requested.
    pub accepted: Vec<Uuid>,
    pub failed: Vec<RefundLineFailure>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RefundLineFailure {
    pub order_item_id: Uuid,
    pub error: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RefundDecision {
    Approve,
    Reject,
}

/// Item-level refund workflow against delivered orders.
///
/// Requests move units into `refund_requested_qty`; operator resolutions
/// move them on to approved or rejected. The order-level status follows:
/// the first accepted line opens a refund cycle, and the cycle closes once
/// no requested units remain anywhere on the order.
#[derive(Clone)]
pub struct RefundService {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    locks: Arc<OrderLocks>,
    config: Arc<AppConfig>,
}

impl RefundService {
    pub fn new(
        db: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        locks: Arc<OrderLocks>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            db,
            event_sender,
            locks,
            config,
        }
    }

    /// Submits item-level refund requests against a delivered order.
    ///
    /// Order-level preconditions (status, eligibility window, non-empty
    /// reason) fail the whole call. Line-level validation is per item: valid
    /// lines apply even when others fail, and the caller gets an itemized
    /// outcome rather than an all-or-nothing verdict.
    #[instrument(skip(self, input), fields(order_id = %order_id, lines = input.lines.len()))]
    pub async fn request_refund(
        &self,
        order_id: Uuid,
        input: RefundRequestInput,
    ) -> Result<RefundRequestOutcome, ServiceError> {
        if input.reason.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "A refund request needs a reason".to_string(),
            ));
        }
        if input.lines.is_empty() {
            return Err(ServiceError::ValidationError(
                "A refund request needs at least one line".to_string(),
            ));
        }

        let _guard = self.locks.acquire(order_id).await;

        let txn = self.db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to begin transaction");
            ServiceError::DatabaseError(e)
        })?;

        let order = OrderEntity::find_by_id(order_id)
            .one(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        if !order.status.accepts_refund_requests() {
            return Err(ServiceError::InvalidTransition {
                from: order.status,
                to: OrderStatus::RefundRequested,
            });
        }

        let age = Utc::now() - order.created_at;
        if age > self.config.refund_window() {
            return Err(ServiceError::EligibilityExpired(format!(
                "Order {} left the {}-day refund window",
                order.order_number, self.config.refund_window_days
            )));
        }

        let items: HashMap<Uuid, OrderItemModel> = OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?
            .into_iter()
            .map(|item| (item.id, item))
            .collect();

        let mut outcome = RefundRequestOutcome {
            order_id,
            accepted: Vec::new(),
            failed: Vec::new(),
        };
        // Line updates are staged here so repeated lines against the same
        // item see each other's claims.
        let mut staged: HashMap<Uuid, OrderItemModel> = HashMap::new();
        let mut requested_units = 0;

        for line in &input.lines {
            let item = match staged
                .get(&line.order_item_id)
                .or_else(|| items.get(&line.order_item_id))
            {
                Some(item) => item.clone(),
                None => {
                    outcome.failed.push(RefundLineFailure {
                        order_item_id: line.order_item_id,
                        error: format!("Order item {} not found on order", line.order_item_id),
                    });
                    continue;
                }
            };

            if line.quantity < 1 {
                outcome.failed.push(RefundLineFailure {
                    order_item_id: line.order_item_id,
                    error: "Quantity must be at least 1".to_string(),
                });
                continue;
            }

            let refundable = item.refundable_qty();
            if line.quantity > refundable {
                outcome.failed.push(RefundLineFailure {
                    order_item_id: line.order_item_id,
                    error: format!(
                        "Requested {} units but only {} remain unclaimed",
                        line.quantity, refundable
                    ),
                });
                continue;
            }

            let mut updated = item;
            updated.refund_requested_qty += line.quantity;
            requested_units += line.quantity;
            staged.insert(updated.id, updated);
            outcome.accepted.push(line.order_item_id);
        }

        if outcome.accepted.is_empty() {
            // Nothing applied; the transaction is dropped untouched.
            warn!(order_id = %order_id, failed = outcome.failed.len(), "Refund request had no valid lines");
            return Ok(outcome);
        }

        for (item_id, staged_item) in &staged {
            let original = &items[item_id];
            let mut active: OrderItemActiveModel = original.clone().into();
            active.refund_requested_qty = Set(staged_item.refund_requested_qty);
            active.updated_at = Set(Some(Utc::now()));
            active.update(&txn).await.map_err(|e| {
                error!(error = %e, order_item_id = %item_id, "Failed to update refund counters");
                ServiceError::DatabaseError(e)
            })?;
        }

        let old_status = order.status;
        let version = order.version;
        let mut active: OrderActiveModel = order.into();
        active.status = Set(OrderStatus::RefundRequested);
        // A fresh cycle starts with no approvals.
        active.refund_cycle_approved = Set(false);
        active.updated_at = Set(Some(Utc::now()));
        active.version = Set(version + 1);
        active.update(&txn).await.map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to open refund cycle");
            ServiceError::DatabaseError(e)
        })?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to commit refund request");
            ServiceError::DatabaseError(e)
        })?;

        info!(
            order_id = %order_id,
            requested_units,
            accepted = outcome.accepted.len(),
            failed = outcome.failed.len(),
            "Refund request recorded"
        );

        self.event_sender
            .send_or_log(Event::RefundRequested {
                order_id,
                requested_units,
            })
            .await;
        self.event_sender
            .send_or_log(Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status: OrderStatus::RefundRequested,
            })
            .await;

        Ok(outcome)
    }

    /// Resolves requested units on one order item.
    ///
    /// Moves `quantity` units from requested to approved or rejected. A
    /// retry after a successful resolution fails the `refund_requested_qty`
    /// bound and is rejected instead of double-applying. When the last
    /// requested unit on the order is resolved the cycle closes:
    /// `refund_accepted` if anything was approved this cycle, else
    /// `refund_rejected`.
    #[instrument(skip(self), fields(order_item_id = %order_item_id, quantity, decision = ?decision))]
    pub async fn resolve_refund(
        &self,
        order_item_id: Uuid,
        quantity: i32,
        decision: RefundDecision,
    ) -> Result<(), ServiceError> {
        if quantity < 1 {
            return Err(ServiceError::ValidationError(
                "Quantity must be at least 1".to_string(),
            ));
        }

        // Resolve the owning order first so the per-order lock can be taken
        // before any validation reads.
        let item_probe = OrderItemEntity::find_by_id(order_item_id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Order item {} not found", order_item_id))
            })?;
        let order_id = item_probe.order_id;

        let _guard = self.locks.acquire(order_id).await;

        let txn = self.db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to begin transaction");
            ServiceError::DatabaseError(e)
        })?;

        let item = OrderItemEntity::find_by_id(order_item_id)
            .one(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Order item {} not found", order_item_id))
            })?;

        let order = OrderEntity::find_by_id(order_id)
            .one(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let target = match decision {
            RefundDecision::Approve => OrderStatus::RefundAccepted,
            RefundDecision::Reject => OrderStatus::RefundRejected,
        };

        if order.status != OrderStatus::RefundRequested {
            return Err(ServiceError::InvalidTransition {
                from: order.status,
                to: target,
            });
        }

        if quantity > item.refund_requested_qty {
            return Err(ServiceError::ValidationError(format!(
                "Only {} units awaiting resolution on item {}",
                item.refund_requested_qty, order_item_id
            )));
        }

        let approved = decision == RefundDecision::Approve;
        let price = item.price_at_purchase;

        let mut item_active: OrderItemActiveModel = item.clone().into();
        item_active.refund_requested_qty = Set(item.refund_requested_qty - quantity);
        if approved {
            item_active.refund_approved_qty = Set(item.refund_approved_qty + quantity);
        } else {
            item_active.refund_rejected_qty = Set(item.refund_rejected_qty + quantity);
        }
        item_active.updated_at = Set(Some(Utc::now()));
        item_active.update(&txn).await.map_err(|e| {
            error!(error = %e, order_item_id = %order_item_id, "Failed to move refund counters");
            ServiceError::DatabaseError(e)
        })?;

        // Does any item on the order still have requested units open?
        let open_items = OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .filter(order_item::Column::RefundRequestedQty.gt(0))
            .count(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;

        let cycle_approved = order.refund_cycle_approved || approved;
        let cycle_closed = open_items == 0;
        let old_status = order.status;
        let new_status = if cycle_closed {
            if cycle_approved {
                OrderStatus::RefundAccepted
            } else {
                OrderStatus::RefundRejected
            }
        } else {
            old_status
        };

        let version = order.version;
        let refund_total = order.refund_total;
        let mut order_active: OrderActiveModel = order.into();
        order_active.refund_cycle_approved = Set(cycle_approved);
        if approved {
            order_active.refund_total = Set(refund_total + price * Decimal::from(quantity));
        }
        order_active.status = Set(new_status);
        order_active.updated_at = Set(Some(Utc::now()));
        order_active.version = Set(version + 1);
        order_active.update(&txn).await.map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to update order for refund resolution");
            ServiceError::DatabaseError(e)
        })?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to commit refund resolution");
            ServiceError::DatabaseError(e)
        })?;

        info!(
            order_item_id = %order_item_id,
            order_id = %order_id,
            quantity,
            approved,
            cycle_closed,
            "Refund resolution applied"
        );

        self.event_sender
            .send_or_log(Event::RefundResolved {
                order_item_id,
                quantity,
                approved,
            })
            .await;

        if cycle_closed {
            self.event_sender
                .send_or_log(Event::RefundCycleClosed {
                    order_id,
                    accepted: cycle_approved,
                })
                .await;
            self.event_sender
                .send_or_log(Event::OrderStatusChanged {
                    order_id,
                    old_status,
                    new_status,
                })
                .await;
        }

        Ok(())
    }
}
