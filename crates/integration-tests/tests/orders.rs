//! Orders, purchase requests and payouts through the web tier.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use axum::http::StatusCode;
use rural_grow_core::{OrderId, PurchaseRequestId, Role, UserId};
use rural_grow_integration_tests::TestApp;
use serde_json::json;

struct Market {
    farmer: TestApp,
    buyer: TestApp,
    farmer_id: UserId,
    buyer_id: UserId,
}

async fn market() -> Market {
    let mut farmer = TestApp::new().await;
    let farmer_id = farmer.user("wanjiru@farms.test", Some(Role::Farmer));
    farmer.sign_in("wanjiru@farms.test").await;
    let mut buyer = farmer.other_browser();
    let buyer_id = buyer.user("otieno@buyers.test", Some(Role::Seller));
    buyer.sign_in("otieno@buyers.test").await;
    Market {
        farmer,
        buyer,
        farmer_id,
        buyer_id,
    }
}

impl Market {
    fn order(&self, name: &str, total: u32, status: &str) -> OrderId {
        let product = self.farmer.product(self.farmer_id, name, 50.0);
        let id = OrderId::generate();
        self.farmer.backend.insert_row(
            "orders",
            json!({
                "id": id,
                "buyer_id": self.buyer_id,
                "farmer_id": self.farmer_id,
                "product_id": product,
                "quantity": 2,
                "total_price": total,
                "status": status,
            }),
        );
        id
    }

    fn request(&self, name: &str) -> PurchaseRequestId {
        let product = self.farmer.product(self.farmer_id, name, 50.0);
        let id = PurchaseRequestId::generate();
        self.farmer.backend.insert_row(
            "purchase_requests",
            json!({
                "id": id,
                "buyer_id": self.buyer_id,
                "farmer_id": self.farmer_id,
                "product_id": product,
                "quantity": 40,
                "status": "pending",
                "notes": "Weekly supply for the school",
            }),
        );
        id
    }
}

#[tokio::test]
async fn test_farmer_ships_order_and_buyer_sees_status() {
    let mut m = market().await;
    let id = m.order("Tomatoes", 100, "accepted");

    let orders = m.farmer.get("/farmer/orders").await.json();
    assert_eq!(orders.as_array().unwrap().len(), 1);
    assert_eq!(orders[0]["products"]["name"], "Tomatoes");

    let response = m
        .farmer
        .post(&format!("/farmer/orders/{id}/status"), &json!({ "status": "shipped" }))
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json()["status"], "shipped");

    let history = m.buyer.get("/orders").await;
    assert_eq!(history.status, StatusCode::OK);
    let history = history.json();
    assert_eq!(history[0]["id"], id.to_string());
    assert_eq!(history[0]["status"], "shipped");
}

#[tokio::test]
async fn test_unknown_order_status_is_rejected() {
    let mut m = market().await;
    let id = m.order("Tomatoes", 100, "accepted");

    let response = m
        .farmer
        .post(&format!("/farmer/orders/{id}/status"), &json!({ "status": "teleported" }))
        .await;

    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(m.farmer.backend.rows("orders")[0]["status"], "accepted");
}

#[tokio::test]
async fn test_buyer_cannot_update_orders() {
    let mut m = market().await;
    let id = m.order("Tomatoes", 100, "pending");

    m.buyer
        .post(&format!("/farmer/orders/{id}/status"), &json!({ "status": "cancelled" }))
        .await
        .assert_redirect("/dashboard");
    assert_eq!(m.buyer.backend.rows("orders")[0]["status"], "pending");
}

#[tokio::test]
async fn test_answering_request_notifies_buyer_once() {
    let mut m = market().await;
    let id = m.request("Maize");

    let requests = m.farmer.get("/farmer/requests").await.json();
    assert_eq!(requests[0]["status"], "pending");
    assert_eq!(requests[0]["products"]["name"], "Maize");

    let path = format!("/farmer/requests/{id}/decision");
    let response = m.farmer.post(&path, &json!({ "decision": "accept" })).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json()["status"], "accepted");

    let again = m.farmer.post(&path, &json!({ "decision": "reject" })).await;
    assert_eq!(again.status, StatusCode::CONFLICT);

    let notifications = m.farmer.backend.rows("user_notifications");
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0]["user_id"], m.buyer_id.to_string());
    assert_eq!(
        notifications[0]["message"],
        "Your request for Maize has been accepted"
    );
}

#[tokio::test]
async fn test_payout_within_available_balance() {
    let mut m = market().await;
    m.order("Tomatoes", 1000, "delivered");
    m.order("Onions", 250, "processing");

    let earnings = m.farmer.get("/farmer/earnings").await.json();
    assert_eq!(earnings["total_earnings"], 1000.0);
    assert_eq!(earnings["available_balance"], 1000.0);
    assert_eq!(earnings["pending_balance"], 250.0);

    let method = json!({
        "type": "bank_transfer",
        "account_name": "Wanjiru Kamau",
        "account_number": "0123456789",
        "bank_name": "Equity Bank",
    });
    let response = m
        .farmer
        .post("/farmer/payouts", &json!({ "amount": 600.0, "payment_method": method }))
        .await;
    assert_eq!(response.status, StatusCode::CREATED);
    assert_eq!(response.json()["status"], "pending");

    let too_much = m
        .farmer
        .post("/farmer/payouts", &json!({ "amount": 500.0, "payment_method": method }))
        .await;
    assert_eq!(too_much.status, StatusCode::BAD_REQUEST);

    let earnings = m.farmer.get("/farmer/earnings").await.json();
    assert_eq!(earnings["available_balance"], 400.0);
    assert_eq!(earnings["payouts"].as_array().unwrap().len(), 1);
}
