mod common;

use assert_matches::assert_matches;
use common::TestApp;
use rust_decimal_macros::dec;
use storefront_api::{
    entities::order::OrderStatus,
    errors::ServiceError,
    services::orders::{OrderLineInput, PlaceOrderRequest},
};
use uuid::Uuid;

#[tokio::test]
async fn place_order_snapshots_products_and_totals() {
    let app = TestApp::new().await;
    let lamp = app.seed_product("Desk Lamp", "DL-20", dec!(24.50), 10);
    let chair = app.seed_product("Office Chair", "OC-7", dec!(120.00), 5);

    let order = app.place_order(&[(lamp, 2), (chair, 1)]).await;

    assert_eq!(order.order.status, OrderStatus::Processing);
    assert_eq!(order.order.display_status, OrderStatus::Processing);
    // 2 * 24.50 + 120.00
    assert_eq!(order.order.total_amount, dec!(169.00));
    assert_eq!(order.order.refund_total, dec!(0));
    assert_eq!(order.order.currency, "USD");

    // Items preserve checkout order and the purchase-time snapshot.
    assert_eq!(order.items.len(), 2);
    assert_eq!(order.items[0].name, "Desk Lamp");
    assert_eq!(order.items[0].model, "DL-20");
    assert_eq!(order.items[0].price_at_purchase, dec!(24.50));
    assert_eq!(order.items[0].quantity, 2);
    assert_eq!(order.items[1].name, "Office Chair");

    // A later catalog edit must not leak into the stored item.
    app.catalog.set_stock(lamp, 0);
    let reloaded = app
        .state
        .services
        .orders
        .get_order_with_items(order.order.id)
        .await
        .unwrap();
    assert_eq!(reloaded.items[0].price_at_purchase, dec!(24.50));
}

#[tokio::test]
async fn declined_payment_persists_nothing() {
    let app = TestApp::new().await;
    let lamp = app.seed_product("Desk Lamp", "DL-20", dec!(24.50), 10);
    app.payments.set_declining(true);

    let result = app
        .state
        .services
        .orders
        .place_order(PlaceOrderRequest {
            customer_id: Uuid::new_v4(),
            shipping_address: "1 Test Lane".to_string(),
            payment_method: "card".to_string(),
            items: vec![OrderLineInput {
                product_id: lamp,
                quantity: 1,
            }],
        })
        .await;

    assert_matches!(result, Err(ServiceError::PaymentFailed(_)));

    let orders = app.state.services.orders.list_orders(1, 20).await.unwrap();
    assert_eq!(orders.total, 0);
}

#[tokio::test]
async fn unknown_product_fails_validation() {
    let app = TestApp::new().await;

    let result = app
        .state
        .services
        .orders
        .place_order(PlaceOrderRequest {
            customer_id: Uuid::new_v4(),
            shipping_address: "1 Test Lane".to_string(),
            payment_method: "card".to_string(),
            items: vec![OrderLineInput {
                product_id: Uuid::new_v4(),
                quantity: 1,
            }],
        })
        .await;

    assert_matches!(result, Err(ServiceError::ValidationError(_)));
}

#[tokio::test]
async fn forward_transitions_advance_one_step_at_a_time() {
    let app = TestApp::new().await;
    let lamp = app.seed_product("Desk Lamp", "DL-20", dec!(24.50), 10);
    let order = app.place_order(&[(lamp, 1)]).await;
    let order_id = order.order.id;
    let statuses = &app.state.services.order_status;

    // Skipping in_transit is rejected and mutates nothing.
    let result = statuses.update_status(order_id, OrderStatus::Delivered).await;
    assert_matches!(
        result,
        Err(ServiceError::InvalidTransition {
            from: OrderStatus::Processing,
            to: OrderStatus::Delivered,
        })
    );
    assert_eq!(
        statuses.get_status(order_id).await.unwrap(),
        OrderStatus::Processing
    );

    let updated = statuses
        .update_status(order_id, OrderStatus::InTransit)
        .await
        .unwrap();
    assert_eq!(updated.status, OrderStatus::InTransit);

    let updated = statuses
        .update_status(order_id, OrderStatus::Delivered)
        .await
        .unwrap();
    assert_eq!(updated.status, OrderStatus::Delivered);

    // No going backwards.
    let result = statuses.update_status(order_id, OrderStatus::InTransit).await;
    assert_matches!(result, Err(ServiceError::InvalidTransition { .. }));
    assert_eq!(
        statuses.get_status(order_id).await.unwrap(),
        OrderStatus::Delivered
    );
}

#[tokio::test]
async fn setting_the_same_status_is_a_noop_success() {
    let app = TestApp::new().await;
    let lamp = app.seed_product("Desk Lamp", "DL-20", dec!(24.50), 10);
    let order = app.place_order(&[(lamp, 1)]).await;

    let before = app
        .state
        .services
        .orders
        .get_order(order.order.id)
        .await
        .unwrap();

    let updated = app
        .state
        .services
        .order_status
        .update_status(order.order.id, OrderStatus::Processing)
        .await
        .unwrap();

    assert_eq!(updated.status, OrderStatus::Processing);
    // A no-op does not bump the version.
    assert_eq!(updated.version, before.version);
}

#[tokio::test]
async fn refund_cycle_statuses_cannot_be_set_by_operators() {
    let app = TestApp::new().await;
    let lamp = app.seed_product("Desk Lamp", "DL-20", dec!(24.50), 10);
    let order = app.place_order(&[(lamp, 1)]).await;
    app.deliver_order(order.order.id).await;

    let result = app
        .state
        .services
        .order_status
        .update_status(order.order.id, OrderStatus::RefundRequested)
        .await;

    assert_matches!(result, Err(ServiceError::InvalidTransition { .. }));
    assert_eq!(
        app.state
            .services
            .order_status
            .get_status(order.order.id)
            .await
            .unwrap(),
        OrderStatus::Delivered
    );
}

#[tokio::test]
async fn cancel_is_only_legal_while_processing() {
    let app = TestApp::new().await;
    let lamp = app.seed_product("Desk Lamp", "DL-20", dec!(24.50), 10);
    let statuses = &app.state.services.order_status;

    let cancellable = app.place_order(&[(lamp, 1)]).await;
    let cancelled = statuses
        .cancel_order(cancellable.order.id, Some("changed my mind".to_string()))
        .await
        .unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert_eq!(cancelled.notes.as_deref(), Some("changed my mind"));

    let shipped = app.place_order(&[(lamp, 1)]).await;
    statuses
        .update_status(shipped.order.id, OrderStatus::InTransit)
        .await
        .unwrap();
    let result = statuses.cancel_order(shipped.order.id, None).await;
    assert_matches!(
        result,
        Err(ServiceError::InvalidTransition {
            from: OrderStatus::InTransit,
            to: OrderStatus::Cancelled,
        })
    );
}

#[tokio::test]
async fn batch_update_applies_valid_orders_and_reports_failures() {
    let app = TestApp::new().await;
    let lamp = app.seed_product("Desk Lamp", "DL-20", dec!(24.50), 10);
    let statuses = &app.state.services.order_status;

    let order_a = app.place_order(&[(lamp, 1)]).await.order.id;
    let order_b = app.place_order(&[(lamp, 1)]).await.order.id;
    app.deliver_order(order_b).await;

    let outcome = statuses
        .batch_update_status(vec![order_a, order_b], OrderStatus::InTransit)
        .await
        .unwrap();

    assert_eq!(outcome.updated, vec![order_a]);
    assert_eq!(outcome.failed.len(), 1);
    assert_eq!(outcome.failed[0].order_id, order_b);
    assert!(outcome.failed[0].error.contains("delivered"));

    // The failing order kept its status.
    assert_eq!(
        statuses.get_status(order_b).await.unwrap(),
        OrderStatus::Delivered
    );
    assert_eq!(
        statuses.get_status(order_a).await.unwrap(),
        OrderStatus::InTransit
    );
}

#[tokio::test]
async fn unknown_orders_in_a_batch_are_reported_back() {
    let app = TestApp::new().await;
    let lamp = app.seed_product("Desk Lamp", "DL-20", dec!(24.50), 10);
    let order_id = app.place_order(&[(lamp, 1)]).await.order.id;
    let ghost = Uuid::new_v4();

    let outcome = app
        .state
        .services
        .order_status
        .batch_update_status(vec![order_id, ghost], OrderStatus::InTransit)
        .await
        .unwrap();

    assert_eq!(outcome.updated, vec![order_id]);
    assert_eq!(outcome.failed.len(), 1);
    assert_eq!(outcome.failed[0].order_id, ghost);
    assert!(outcome.failed[0].error.contains("not found"));
}
