mod common;

use assert_matches::assert_matches;
use common::{OutageCatalog, TestApp};
use rust_decimal_macros::dec;
use std::sync::Arc;
use storefront_api::{
    entities::commerce::CartStatus,
    errors::ServiceError,
    services::commerce::{AddToCartInput, CartService, CreateCartInput},
};
use uuid::Uuid;

async fn guest_cart(app: &TestApp) -> Uuid {
    app.state
        .services
        .carts
        .create_cart(CreateCartInput {
            session_token: Some(format!("session-{}", Uuid::new_v4())),
            customer_id: None,
            currency: None,
        })
        .await
        .expect("failed to create guest cart")
        .id
}

async fn add(app: &TestApp, cart_id: Uuid, product_id: Uuid, quantity: i32) {
    app.state
        .services
        .carts
        .add_item(cart_id, AddToCartInput {
            product_id,
            quantity,
        })
        .await
        .expect("failed to add item");
}

#[tokio::test]
async fn carts_need_an_owner() {
    let app = TestApp::new().await;
    let result = app
        .state
        .services
        .carts
        .create_cart(CreateCartInput::default())
        .await;
    assert_matches!(result, Err(ServiceError::ValidationError(_)));
}

#[tokio::test]
async fn add_to_cart_enforces_the_stock_limit() {
    let app = TestApp::new().await;
    let lamp = app.seed_product("Desk Lamp", "DL-20", dec!(24.50), 2);
    let cart_id = guest_cart(&app).await;

    add(&app, cart_id, lamp, 2).await;

    // One more unit would exceed stock; the add is refused outright.
    let result = app
        .state
        .services
        .carts
        .add_item(cart_id, AddToCartInput {
            product_id: lamp,
            quantity: 1,
        })
        .await;
    assert_matches!(result, Err(ServiceError::InsufficientStock(_)));

    let cart = app.state.services.carts.get_cart(cart_id).await.unwrap();
    assert_eq!(cart.items.len(), 1);
    assert_eq!(cart.items[0].quantity, 2);
}

#[tokio::test]
async fn adding_the_same_product_merges_the_line() {
    let app = TestApp::new().await;
    let lamp = app.seed_product("Desk Lamp", "DL-20", dec!(24.50), 10);
    let cart_id = guest_cart(&app).await;

    add(&app, cart_id, lamp, 1).await;
    add(&app, cart_id, lamp, 2).await;

    let cart = app.state.services.carts.get_cart(cart_id).await.unwrap();
    assert_eq!(cart.items.len(), 1);
    assert_eq!(cart.items[0].quantity, 3);
}

#[tokio::test]
async fn merge_clamps_to_stock_and_reports_the_delta() {
    let app = TestApp::new().await;
    // stock(P1) = 2, guest wants 3, account cart empty
    let p1 = app.seed_product("Desk Lamp", "DL-20", dec!(24.50), 3);
    let customer_id = Uuid::new_v4();

    let cart_id = guest_cart(&app).await;
    add(&app, cart_id, p1, 3).await;
    app.catalog.set_stock(p1, 2);

    let outcome = app
        .state
        .services
        .carts
        .merge_on_login(cart_id, customer_id)
        .await
        .unwrap();

    assert_eq!(outcome.cart.items.len(), 1);
    assert_eq!(outcome.cart.items[0].product_id, p1);
    assert_eq!(outcome.cart.items[0].quantity, 2);

    assert_eq!(outcome.unmerged.len(), 1);
    assert_eq!(outcome.unmerged[0].product_id, p1);
    assert_eq!(outcome.unmerged[0].requested, 3);
    assert_eq!(outcome.unmerged[0].merged, 2);
    assert_eq!(outcome.unmerged[0].unmerged, 1);
}

#[tokio::test]
async fn merge_respects_quantities_already_in_the_account_cart() {
    let app = TestApp::new().await;
    let p1 = app.seed_product("Desk Lamp", "DL-20", dec!(24.50), 4);
    let customer_id = Uuid::new_v4();

    // The account cart already holds 3 units.
    let account_cart = app
        .state
        .services
        .carts
        .find_or_create_account_cart(customer_id)
        .await
        .unwrap();
    add(&app, account_cart.id, p1, 3).await;

    let cart_id = guest_cart(&app).await;
    add(&app, cart_id, p1, 2).await;

    let outcome = app
        .state
        .services
        .carts
        .merge_on_login(cart_id, customer_id)
        .await
        .unwrap();

    // Only one more unit fits under the stock limit of 4.
    assert_eq!(outcome.cart.items[0].quantity, 4);
    assert_eq!(outcome.unmerged.len(), 1);
    assert_eq!(outcome.unmerged[0].merged, 1);
    assert_eq!(outcome.unmerged[0].unmerged, 1);
}

#[tokio::test]
async fn a_clean_merge_reports_no_deltas() {
    let app = TestApp::new().await;
    let p1 = app.seed_product("Desk Lamp", "DL-20", dec!(24.50), 10);
    let p2 = app.seed_product("Office Chair", "OC-7", dec!(120.00), 10);
    let customer_id = Uuid::new_v4();

    let cart_id = guest_cart(&app).await;
    add(&app, cart_id, p1, 2).await;
    add(&app, cart_id, p2, 1).await;

    let outcome = app
        .state
        .services
        .carts
        .merge_on_login(cart_id, customer_id)
        .await
        .unwrap();

    assert!(outcome.unmerged.is_empty());
    assert_eq!(outcome.cart.items.len(), 2);
    assert_eq!(outcome.cart.cart.customer_id, Some(customer_id));
}

#[tokio::test]
async fn the_guest_cart_is_consumed_by_the_merge() {
    let app = TestApp::new().await;
    let p1 = app.seed_product("Desk Lamp", "DL-20", dec!(24.50), 10);
    let customer_id = Uuid::new_v4();

    let cart_id = guest_cart(&app).await;
    add(&app, cart_id, p1, 2).await;

    app.state
        .services
        .carts
        .merge_on_login(cart_id, customer_id)
        .await
        .unwrap();

    let guest = app.state.services.carts.get_cart(cart_id).await.unwrap();
    assert_eq!(guest.cart.status, CartStatus::Merged);
    assert!(guest.items.is_empty());

    // Replaying the merge cannot apply the quantities twice.
    let result = app
        .state
        .services
        .carts
        .merge_on_login(cart_id, customer_id)
        .await;
    assert_matches!(result, Err(ServiceError::ValidationError(_)));

    let account = app
        .state
        .services
        .carts
        .find_or_create_account_cart(customer_id)
        .await
        .unwrap();
    let account = app.state.services.carts.get_cart(account.id).await.unwrap();
    assert_eq!(account.items[0].quantity, 2);
}

#[tokio::test]
async fn an_unreachable_stock_service_aborts_the_merge_atomically() {
    let app = TestApp::new().await;
    let p1 = app.seed_product("Desk Lamp", "DL-20", dec!(24.50), 10);
    let customer_id = Uuid::new_v4();

    let cart_id = guest_cart(&app).await;
    add(&app, cart_id, p1, 2).await;

    // Same store, but the catalog collaborator is down.
    let degraded = CartService::new(
        app.state.db.clone(),
        Arc::new(app.state.event_sender.clone()),
        Arc::new(OutageCatalog),
        app.state.config.clone(),
    );

    let result = degraded.merge_on_login(cart_id, customer_id).await;
    let err = result.unwrap_err();
    assert_matches!(err, ServiceError::ServiceUnavailable(_));
    assert!(err.is_retryable());

    // The guest cart survives untouched, so the login can retry the merge.
    let guest = app.state.services.carts.get_cart(cart_id).await.unwrap();
    assert_eq!(guest.cart.status, CartStatus::Active);
    assert_eq!(guest.items.len(), 1);
    assert_eq!(guest.items[0].quantity, 2);

    let retried = app
        .state
        .services
        .carts
        .merge_on_login(cart_id, customer_id)
        .await
        .unwrap();
    assert_eq!(retried.cart.items[0].quantity, 2);
}

#[tokio::test]
async fn only_active_guest_carts_can_merge() {
    let app = TestApp::new().await;
    let customer_id = Uuid::new_v4();

    // An account cart is not a merge source.
    let account = app
        .state
        .services
        .carts
        .find_or_create_account_cart(customer_id)
        .await
        .unwrap();
    let result = app
        .state
        .services
        .carts
        .merge_on_login(account.id, customer_id)
        .await;
    assert_matches!(result, Err(ServiceError::ValidationError(_)));
}
