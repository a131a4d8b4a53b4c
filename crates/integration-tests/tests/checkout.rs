//! Checkout and payment confirmation through the web tier.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use axum::http::StatusCode;
use rural_grow_core::{Role, UserId};
use rural_grow_integration_tests::TestApp;
use serde_json::json;

struct Market {
    app: TestApp,
    wanjiru: UserId,
    njeri: UserId,
}

async fn buyer_with_cart() -> Market {
    let mut app = TestApp::new().await;
    let wanjiru = app.user("wanjiru@farms.test", Some(Role::Farmer));
    let njeri = app.user("njeri@farms.test", Some(Role::Farmer));
    let tomatoes = app.product(wanjiru, "Tomatoes", 120.0);
    let kale = app.product(wanjiru, "Kale", 30.0);
    let honey = app.product(njeri, "Honey", 800.0);
    app.user("otieno@buyers.test", Some(Role::Seller));
    app.sign_in("otieno@buyers.test").await;

    for (product, quantity) in [(tomatoes, 2), (kale, 1), (honey, 1)] {
        app.post(
            "/cart/add",
            &json!({ "product_id": product, "quantity": quantity }),
        )
        .await;
    }
    Market {
        app,
        wanjiru,
        njeri,
    }
}

#[tokio::test]
async fn test_empty_cart_never_reaches_payment_provider() {
    let mut app = TestApp::new().await;
    app.user("otieno@buyers.test", Some(Role::Seller));
    app.sign_in("otieno@buyers.test").await;

    let response = app.post_empty("/checkout").await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json()["error"], "Your cart is empty");
    assert!(app.backend.function_calls("create-checkout").is_empty());
}

#[tokio::test]
async fn test_checkout_redirects_to_hosted_payment_page() {
    let Market { mut app, .. } = buyer_with_cart().await;

    let response = app.post_empty("/checkout").await;

    response.assert_redirect("https://checkout.example.test/pay/cs_test_1");
    let calls = app.backend.function_calls("create-checkout");
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0]["items"].as_array().unwrap().len(), 3);
    assert_eq!(
        calls[0]["successUrl"],
        "http://localhost:3000/payment-success?session_id={CHECKOUT_SESSION_ID}"
    );
}

#[tokio::test]
async fn test_checkout_notifies_each_farmer_once() {
    let Market {
        mut app,
        wanjiru,
        njeri,
    } = buyer_with_cart().await;

    app.post_empty("/checkout").await;

    let mut recipients: Vec<String> = app
        .backend
        .rows("user_notifications")
        .iter()
        .map(|row| row["user_id"].as_str().unwrap().to_owned())
        .collect();
    recipients.sort();
    let mut expected = vec![wanjiru.to_string(), njeri.to_string()];
    expected.sort();
    assert_eq!(recipients, expected);
}

#[tokio::test]
async fn test_payment_provider_outage_is_bad_gateway() {
    let Market { mut app, .. } = buyer_with_cart().await;
    app.backend.fail_function("create-checkout", 1);

    let response = app.post_empty("/checkout").await;

    assert_eq!(response.status, StatusCode::BAD_GATEWAY);
    assert_eq!(response.json()["error"], "External service error");
    assert_eq!(app.get("/cart").await.json()["total_items"], 4);
}

#[tokio::test]
async fn test_confirmed_payment_clears_cart() {
    let Market { mut app, .. } = buyer_with_cart().await;
    app.post_empty("/checkout").await;

    let response = app.get("/payment-success?session_id=cs_test_1").await;

    assert_eq!(response.status, StatusCode::OK);
    let body = response.json();
    assert_eq!(body["success"], true);
    assert_eq!(body["cart_cleared"], true);
    assert_eq!(app.get("/cart").await.json()["total_items"], 0);
}

#[tokio::test]
async fn test_unpaid_session_keeps_cart() {
    let Market { mut app, .. } = buyer_with_cart().await;
    app.post_empty("/checkout").await;
    app.backend.set_payment_status("cs_test_1", "unpaid");

    let body = app
        .get("/payment-success?session_id=cs_test_1")
        .await
        .json();

    assert_eq!(body["success"], false);
    assert_eq!(body["cart_cleared"], false);
    assert_eq!(app.get("/cart").await.json()["total_items"], 4);
}

#[tokio::test]
async fn test_payment_return_without_session_id() {
    let Market { mut app, .. } = buyer_with_cart().await;

    let response = app.get("/payment-success").await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(app.backend.function_calls("verify-payment").is_empty());
}
