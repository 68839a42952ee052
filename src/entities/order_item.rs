use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::*;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One purchased line within an order.
///
/// `name`, `model` and `price_at_purchase` are snapshots taken at checkout
/// and never follow later catalog edits. The three refund counters partition
/// a subset of `quantity`: a purchased unit is unclaimed or sits in exactly
/// one of requested/approved/rejected.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "order_items")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub name: String,
    pub model: String,
    pub price_at_purchase: Decimal,
    pub quantity: i32,
    /// Display position within the order, preserved from checkout.
    pub position: i32,
    pub refund_requested_qty: i32,
    pub refund_approved_qty: i32,
    pub refund_rejected_qty: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Model {
    /// Units not yet claimed by any refund request.
    pub fn refundable_qty(&self) -> i32 {
        self.quantity
            - self.refund_requested_qty
            - self.refund_approved_qty
            - self.refund_rejected_qty
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::order::Entity",
        from = "Column::OrderId",
        to = "super::order::Column::Id"
    )]
    Order,
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Order.def()
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C: ConnectionTrait>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;

        let now = Utc::now();

        if insert {
            active_model.created_at = Set(now);
        }

        if let ActiveValue::NotSet = active_model.updated_at {
            active_model.updated_at = Set(Some(now));
        }

        Ok(active_model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn item(quantity: i32, requested: i32, approved: i32, rejected: i32) -> Model {
        Model {
            id: Uuid::new_v4(),
            order_id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            name: "Widget".to_string(),
            model: "W-100".to_string(),
            price_at_purchase: dec!(9.99),
            quantity,
            position: 0,
            refund_requested_qty: requested,
            refund_approved_qty: approved,
            refund_rejected_qty: rejected,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    #[test]
    fn refundable_qty_subtracts_all_claimed_units() {
        assert_eq!(item(5, 0, 0, 0).refundable_qty(), 5);
        assert_eq!(item(5, 2, 1, 1).refundable_qty(), 1);
        assert_eq!(item(3, 1, 1, 1).refundable_qty(), 0);
    }
}
