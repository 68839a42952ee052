use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize, Validate)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[validate(length(
        min = 1,
        max = 50,
        message = "Order number must be between 1 and 50 characters"
    ))]
    pub order_number: String,

    pub customer_id: Uuid,
    pub status: OrderStatus,
    pub shipping_address: String,
    pub currency: String,
    /// Sum of item subtotals captured at checkout. Never changes afterwards;
    /// refunded money is tracked in `refund_total` instead.
    pub total_amount: Decimal,
    pub refund_total: Decimal,
    /// True once any unit in the currently open refund cycle was approved.
    pub refund_cycle_approved: bool,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub version: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItem,
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItem.def()
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C: ConnectionTrait>(self, _db: &C, _insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        Ok(self)
    }
}

/// Order fulfillment status.
///
/// The single authoritative status vocabulary; every status change anywhere
/// in the crate goes through [`OrderStatus::can_transition_to`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[sea_orm(string_value = "processing")]
    Processing,
    #[sea_orm(string_value = "in_transit")]
    InTransit,
    #[sea_orm(string_value = "delivered")]
    Delivered,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
    #[sea_orm(string_value = "refund_requested")]
    RefundRequested,
    #[sea_orm(string_value = "refund_accepted")]
    RefundAccepted,
    #[sea_orm(string_value = "refund_rejected")]
    RefundRejected,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Processing => "processing",
            OrderStatus::InTransit => "in_transit",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::RefundRequested => "refund_requested",
            OrderStatus::RefundAccepted => "refund_accepted",
            OrderStatus::RefundRejected => "refund_rejected",
        }
    }

    /// Validates a status transition against the fulfillment lifecycle.
    ///
    /// Forward transitions advance one step at a time; a resolved refund
    /// cycle may be followed by another request for the remaining units.
    /// Setting the current status again is a no-op, not an error.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        match (self, next) {
            (Processing, InTransit) => true,
            (Processing, Cancelled) => true,
            (InTransit, Delivered) => true,

            (Delivered, RefundRequested) => true,
            (RefundRequested, RefundAccepted) => true,
            (RefundRequested, RefundRejected) => true,

            // A resolved cycle leaves the order delivered for all practical
            // purposes; remaining units can open a new cycle.
            (RefundAccepted, RefundRequested) => true,
            (RefundRejected, RefundRequested) => true,

            _ if self == next => true,

            _ => false,
        }
    }

    /// Statuses that belong to a refund cycle. These are never set through
    /// the operator-facing status endpoints.
    pub fn is_refund_cycle(self) -> bool {
        matches!(
            self,
            OrderStatus::RefundRequested | OrderStatus::RefundAccepted | OrderStatus::RefundRejected
        )
    }

    /// Whether item-level refund requests may be submitted in this status
    /// (the eligibility window is checked separately).
    pub fn accepts_refund_requests(self) -> bool {
        matches!(
            self,
            OrderStatus::Delivered | OrderStatus::RefundAccepted | OrderStatus::RefundRejected
        )
    }

    /// Customer-facing status. A resolved refund cycle displays as
    /// `delivered`; the per-item refund counters stay visible on the items.
    pub fn display(self) -> OrderStatus {
        match self {
            OrderStatus::RefundAccepted | OrderStatus::RefundRejected => OrderStatus::Delivered,
            other => other,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::OrderStatus::{self, *};
    use proptest::prelude::*;
    use test_case::test_case;

    const ALL: [OrderStatus; 7] = [
        Processing,
        InTransit,
        Delivered,
        Cancelled,
        RefundRequested,
        RefundAccepted,
        RefundRejected,
    ];

    // The lifecycle edges, written out independently of the match in
    // `can_transition_to` so the two can be checked against each other.
    const EDGES: [(OrderStatus, OrderStatus); 8] = [
        (Processing, InTransit),
        (Processing, Cancelled),
        (InTransit, Delivered),
        (Delivered, RefundRequested),
        (RefundRequested, RefundAccepted),
        (RefundRequested, RefundRejected),
        (RefundAccepted, RefundRequested),
        (RefundRejected, RefundRequested),
    ];

    #[test]
    fn transition_table_matches_edge_list() {
        for from in ALL {
            for to in ALL {
                let expected = from == to || EDGES.contains(&(from, to));
                assert_eq!(
                    from.can_transition_to(to),
                    expected,
                    "unexpected verdict for {from} -> {to}"
                );
            }
        }
    }

    #[test_case(Delivered, InTransit ; "no going back from delivered")]
    #[test_case(Processing, Delivered ; "no skipping in_transit")]
    #[test_case(InTransit, Cancelled ; "cancel only while processing")]
    #[test_case(Cancelled, Processing ; "cancelled is terminal")]
    #[test_case(Delivered, RefundAccepted ; "no direct refund resolution")]
    fn illegal_transitions_are_rejected(from: OrderStatus, to: OrderStatus) {
        assert!(!from.can_transition_to(to));
    }

    #[test]
    fn self_transition_is_allowed() {
        for status in ALL {
            assert!(status.can_transition_to(status));
        }
    }

    #[test]
    fn resolved_refund_cycles_display_as_delivered() {
        assert_eq!(RefundAccepted.display(), Delivered);
        assert_eq!(RefundRejected.display(), Delivered);
        assert_eq!(RefundRequested.display(), RefundRequested);
        assert_eq!(Processing.display(), Processing);
    }

    proptest! {
        // Walking the machine with arbitrary requested targets can only ever
        // follow listed edges, no matter the order of attempts.
        #[test]
        fn random_walks_stay_on_listed_edges(targets in proptest::collection::vec(0usize..7, 0..64)) {
            let mut current = Processing;
            for idx in targets {
                let target = ALL[idx];
                if current.can_transition_to(target) && current != target {
                    prop_assert!(EDGES.contains(&(current, target)));
                    current = target;
                }
            }
        }
    }
}
