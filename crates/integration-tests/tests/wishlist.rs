//! Wishlist through the web tier.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use axum::http::StatusCode;
use rural_grow_core::Role;
use rural_grow_integration_tests::TestApp;
use serde_json::json;

#[tokio::test]
async fn test_saving_twice_keeps_one_entry() {
    let mut app = TestApp::new().await;
    let farmer = app.user("wanjiru@farms.test", Some(Role::Farmer));
    let honey = app.product(farmer, "Honey", 800.0);
    app.user("otieno@buyers.test", Some(Role::Seller));
    app.sign_in("otieno@buyers.test").await;

    app.post("/wishlist/add", &json!({ "product_id": honey })).await;
    let entries = app
        .post("/wishlist/add", &json!({ "product_id": honey }))
        .await
        .json();

    assert_eq!(entries.as_array().unwrap().len(), 1);
    assert_eq!(entries[0]["products"]["name"], "Honey");
    assert_eq!(app.backend.rows("wishlist").len(), 1);
}

#[tokio::test]
async fn test_saved_products_are_flagged_in_listing() {
    let mut app = TestApp::new().await;
    let farmer = app.user("wanjiru@farms.test", Some(Role::Farmer));
    let honey = app.product(farmer, "Honey", 800.0);
    app.product(farmer, "Kale", 30.0);
    app.user("otieno@buyers.test", Some(Role::Seller));
    app.sign_in("otieno@buyers.test").await;
    app.post("/wishlist/add", &json!({ "product_id": honey })).await;

    let products = app.get("/products").await.json();

    let flagged: Vec<_> = products
        .as_array()
        .unwrap()
        .iter()
        .filter(|p| p["in_wishlist"] == true)
        .map(|p| p["name"].as_str().unwrap())
        .collect();
    assert_eq!(flagged, ["Honey"]);
}

#[tokio::test]
async fn test_remove_and_refetch() {
    let mut app = TestApp::new().await;
    let farmer = app.user("wanjiru@farms.test", Some(Role::Farmer));
    let honey = app.product(farmer, "Honey", 800.0);
    let kale = app.product(farmer, "Kale", 30.0);
    app.user("otieno@buyers.test", Some(Role::Seller));
    app.sign_in("otieno@buyers.test").await;
    app.post("/wishlist/add", &json!({ "product_id": honey })).await;
    app.post("/wishlist/add", &json!({ "product_id": kale })).await;

    let entries = app
        .post("/wishlist/remove", &json!({ "product_id": honey }))
        .await
        .json();
    assert_eq!(entries.as_array().unwrap().len(), 1);

    let entries = app.get("/wishlist").await.json();
    assert_eq!(entries.as_array().unwrap().len(), 1);
    assert_eq!(entries[0]["product_id"], kale.to_string());
}

#[tokio::test]
async fn test_wishlist_outage_is_bad_gateway() {
    let mut app = TestApp::new().await;
    app.user("otieno@buyers.test", Some(Role::Seller));
    app.sign_in("otieno@buyers.test").await;
    app.backend.fail_table("wishlist", 3);

    let response = app.get("/wishlist").await;

    assert_eq!(response.status, StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_next_user_on_the_browser_never_sees_previous_wishlist() {
    let mut app = TestApp::new().await;
    let farmer = app.user("wanjiru@farms.test", Some(Role::Farmer));
    let honey = app.product(farmer, "Honey", 800.0);
    app.user("otieno@buyers.test", Some(Role::Seller));
    app.user("baraka@buyers.test", Some(Role::Seller));
    app.sign_in("otieno@buyers.test").await;
    app.post("/wishlist/add", &json!({ "product_id": honey })).await;

    app.sign_out().await;
    app.sign_in("baraka@buyers.test")
        .await
        .assert_redirect("/dashboard");

    let dashboard = app.get("/dashboard").await.json();
    assert!(dashboard["wishlist"].as_array().unwrap().is_empty());
    let products = app.get("/products").await.json();
    assert!(products
        .as_array()
        .unwrap()
        .iter()
        .all(|p| p["in_wishlist"] == false));
    assert!(app.get("/wishlist").await.json().as_array().unwrap().is_empty());
}
