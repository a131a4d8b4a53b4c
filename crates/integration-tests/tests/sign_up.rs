//! Account creation through the web tier.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use axum::http::StatusCode;
use rural_grow_core::Role;
use rural_grow_integration_tests::TestApp;
use serde_json::json;

fn account(email: &str, role: &str) -> serde_json::Value {
    json!({
        "email": email,
        "password": "mavuno-2025",
        "full_name": "Achieng Odhiambo",
        "role": role,
    })
}

#[tokio::test]
async fn test_buyer_sign_up_lands_on_dashboard() {
    let mut app = TestApp::new().await;

    app.post("/auth/sign-up", &account("achieng@buyers.test", "seller"))
        .await
        .assert_redirect("/dashboard");
    let dashboard = app.get("/dashboard").await.json();

    assert_eq!(dashboard["dashboard"], "buyer");
    assert_eq!(dashboard["user"]["email"], "achieng@buyers.test");
    let profiles = app.backend.rows("profiles");
    assert_eq!(profiles[0]["full_name"], "Achieng Odhiambo");
}

#[tokio::test]
async fn test_farmer_sign_up_lands_on_farmer_dashboard() {
    let mut app = TestApp::new().await;

    app.post("/auth/sign-up", &account("achieng@farms.test", "farmer"))
        .await
        .assert_redirect("/dashboard");

    assert_eq!(app.get("/dashboard").await.json()["dashboard"], "farmer");
}

#[tokio::test]
async fn test_admin_cannot_be_chosen_at_sign_up() {
    let mut app = TestApp::new().await;

    let response = app
        .post("/auth/sign-up", &account("achieng@admin.test", "admin"))
        .await;

    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert!(app.backend.rows("user_roles").is_empty());
}

#[tokio::test]
async fn test_existing_email_is_conflict() {
    let mut app = TestApp::new().await;
    app.user("achieng@buyers.test", Some(Role::Seller));

    let response = app
        .post("/auth/sign-up", &account("achieng@buyers.test", "seller"))
        .await;

    assert_eq!(response.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_short_password_is_rejected() {
    let mut app = TestApp::new().await;

    let response = app
        .post(
            "/auth/sign-up",
            &json!({ "email": "achieng@buyers.test", "password": "abc", "role": "seller" }),
        )
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        response.json()["error"],
        "Password must be at least 6 characters"
    );
}

#[tokio::test]
async fn test_auth_endpoints_are_rate_limited() {
    let mut app = TestApp::new().await;

    let mut statuses = Vec::new();
    for _ in 0..8 {
        let response = app
            .post(
                "/auth/sign-in",
                &json!({ "email": "nobody@buyers.test", "password": "wrong-one" }),
            )
            .await;
        statuses.push(response.status);
    }

    assert!(statuses.contains(&StatusCode::UNAUTHORIZED));
    assert!(statuses.contains(&StatusCode::TOO_MANY_REQUESTS));
}
