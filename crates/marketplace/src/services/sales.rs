//! Orders and purchase requests.
//!
//! Farmers work through the orders placed for their produce and answer the
//! purchase requests buyers send them; buyers read their own order history.
//! Every query is scoped to the caller, and row-level security enforces the
//! same remotely.

use std::sync::Arc;

use rural_grow_core::{
    NotificationKind, OrderId, OrderStatus, PurchaseRequestId, RequestDecision, RequestStatus,
    UserId,
};
use serde_json::json;
use thiserror::Error;
use tracing::{info, instrument, warn};

use super::notifications::{Notification, Notifier};
use crate::baas::{AccessToken, BaasError, DataApi, Order, OrderRecord, PurchaseRequest, Query};

const ORDERS: &str = "orders";
const REQUESTS: &str = "purchase_requests";

/// Order columns, with the product embedded.
const ORDER_COLUMNS: &str = "*,products(id,name,price,unit,image_url)";

/// Purchase request columns, with the product embedded.
const REQUEST_COLUMNS: &str = "*,products(name,price)";

/// Errors from order and purchase request operations.
#[derive(Debug, Error)]
pub enum SalesError {
    /// The row does not exist or does not belong to the caller.
    #[error("not found: {0}")]
    NotFound(String),

    /// The purchase request was already answered.
    #[error("request already {0}")]
    AlreadyDecided(RequestStatus),

    #[error(transparent)]
    Baas(#[from] BaasError),
}

/// Order and purchase request access.
#[derive(Clone)]
pub struct Sales {
    data: Arc<dyn DataApi>,
    notifier: Notifier,
}

impl Sales {
    #[must_use]
    pub fn new(data: Arc<dyn DataApi>, notifier: Notifier) -> Self {
        Self { data, notifier }
    }

    /// Orders placed for `farmer`'s produce, newest first.
    ///
    /// # Errors
    ///
    /// Returns `SalesError::Baas` if the lookup fails.
    pub async fn farmer_orders(
        &self,
        farmer: UserId,
        token: Option<&AccessToken>,
    ) -> Result<Vec<OrderRecord>, SalesError> {
        let query = Query::table(ORDERS)
            .select(ORDER_COLUMNS)
            .eq("farmer_id", farmer)
            .order("created_at", Order::Desc);
        Ok(self.data.select_as(&query, token).await?)
    }

    /// Orders placed by `buyer`, newest first.
    ///
    /// # Errors
    ///
    /// Returns `SalesError::Baas` if the lookup fails.
    pub async fn buyer_orders(
        &self,
        buyer: UserId,
        token: Option<&AccessToken>,
    ) -> Result<Vec<OrderRecord>, SalesError> {
        let query = Query::table(ORDERS)
            .select(ORDER_COLUMNS)
            .eq("buyer_id", buyer)
            .order("created_at", Order::Desc);
        Ok(self.data.select_as(&query, token).await?)
    }

    /// Move one of `farmer`'s orders to `status`.
    ///
    /// # Errors
    ///
    /// Returns `SalesError::NotFound` if `farmer` has no such order, or
    /// `SalesError::Baas` if the update fails.
    #[instrument(skip(self, token))]
    pub async fn update_order_status(
        &self,
        farmer: UserId,
        order: OrderId,
        status: OrderStatus,
        token: Option<&AccessToken>,
    ) -> Result<OrderRecord, SalesError> {
        let query = Query::table(ORDERS).eq("id", order).eq("farmer_id", farmer);
        let row = self
            .data
            .update(&query, json!({ "status": status }), token)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| SalesError::NotFound(format!("order {order}")))?;

        info!(%order, %status, "Order status updated");
        Ok(serde_json::from_value(row).map_err(BaasError::from)?)
    }

    /// Purchase requests sent to `farmer`, newest first.
    ///
    /// # Errors
    ///
    /// Returns `SalesError::Baas` if the lookup fails.
    pub async fn farmer_requests(
        &self,
        farmer: UserId,
        token: Option<&AccessToken>,
    ) -> Result<Vec<PurchaseRequest>, SalesError> {
        let query = Query::table(REQUESTS)
            .select(REQUEST_COLUMNS)
            .eq("farmer_id", farmer)
            .order("created_at", Order::Desc);
        Ok(self.data.select_as(&query, token).await?)
    }

    /// Accept or reject a pending purchase request, then tell the buyer.
    ///
    /// The answer stands even if the buyer cannot be notified.
    ///
    /// # Errors
    ///
    /// Returns `SalesError::NotFound` if `farmer` has no such request,
    /// `SalesError::AlreadyDecided` if it is no longer pending, or
    /// `SalesError::Baas` if a remote call fails.
    #[instrument(skip(self, token))]
    pub async fn respond_to_request(
        &self,
        farmer: UserId,
        request: PurchaseRequestId,
        decision: RequestDecision,
        token: Option<&AccessToken>,
    ) -> Result<PurchaseRequest, SalesError> {
        let lookup = Query::table(REQUESTS)
            .select(REQUEST_COLUMNS)
            .eq("id", request)
            .eq("farmer_id", farmer)
            .limit(1);
        let current = self
            .data
            .select_as::<PurchaseRequest>(&lookup, token)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| SalesError::NotFound(format!("purchase request {request}")))?;
        if current.status != RequestStatus::Pending {
            return Err(SalesError::AlreadyDecided(current.status));
        }

        let status = decision.status();
        let pending = Query::table(REQUESTS)
            .eq("id", request)
            .eq("farmer_id", farmer)
            .eq("status", RequestStatus::Pending.as_str());
        let updated = self
            .data
            .update(&pending, json!({ "status": status }), token)
            .await?;
        if updated.is_empty() {
            // Answered by a concurrent call between lookup and update
            return Err(SalesError::AlreadyDecided(status));
        }
        info!(%request, %status, "Purchase request answered");

        let product = current
            .product
            .as_ref()
            .map_or("your produce", |p| p.name.as_str());
        let notification = Notification {
            recipient: current.buyer_id,
            title: "Request Status Updated".to_owned(),
            message: format!("Your request for {product} has been {status}"),
            kind: NotificationKind::Request,
            related_id: Some(request.to_string()),
        };
        if let Err(e) = self.notifier.send(&notification, token).await {
            warn!(buyer_id = %current.buyer_id, error = %e, "Buyer not notified of request answer");
        }

        Ok(PurchaseRequest { status, ..current })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use std::time::Duration;

    use rural_grow_core::ProductId;
    use serde_json::Value;

    use super::*;
    use crate::baas::memory::MemoryBackend;
    use crate::services::notifications::RetryPolicy;

    fn sales(backend: &MemoryBackend) -> Sales {
        let notifier = Notifier::with_policy(
            Arc::new(backend.clone()),
            RetryPolicy {
                max_attempts: 2,
                base_delay: Duration::from_millis(1),
            },
        );
        Sales::new(Arc::new(backend.clone()), notifier)
    }

    fn beans(backend: &MemoryBackend, farmer: UserId) -> ProductId {
        let id = ProductId::generate();
        backend.insert_row(
            "products",
            json!({ "id": id, "farmer_id": farmer, "name": "Beans", "price": 120, "unit": "kg" }),
        );
        id
    }

    fn order(backend: &MemoryBackend, buyer: UserId, farmer: UserId, status: &str) -> OrderId {
        let product = beans(backend, farmer);
        let id = OrderId::generate();
        backend.insert_row(
            ORDERS,
            json!({
                "id": id,
                "buyer_id": buyer,
                "farmer_id": farmer,
                "product_id": product,
                "quantity": 2,
                "total_price": 240,
                "status": status,
            }),
        );
        id
    }

    fn request(backend: &MemoryBackend, buyer: UserId, farmer: UserId) -> PurchaseRequestId {
        let product = beans(backend, farmer);
        let id = PurchaseRequestId::generate();
        backend.insert_row(
            REQUESTS,
            json!({
                "id": id,
                "buyer_id": buyer,
                "farmer_id": farmer,
                "product_id": product,
                "quantity": 10,
                "status": "pending",
                "notes": "Deliver to Kisumu",
                "total_amount": 1200,
            }),
        );
        id
    }

    #[tokio::test]
    async fn test_orders_are_scoped_by_side() {
        let backend = MemoryBackend::new();
        let (buyer, farmer) = (UserId::generate(), UserId::generate());
        let mine = order(&backend, buyer, farmer, "pending");
        order(&backend, UserId::generate(), UserId::generate(), "pending");
        let sales = sales(&backend);

        let for_farmer = sales.farmer_orders(farmer, None).await.unwrap();
        let for_buyer = sales.buyer_orders(buyer, None).await.unwrap();

        assert_eq!(for_farmer.len(), 1);
        assert_eq!(for_farmer[0].id, mine);
        assert_eq!(for_farmer[0].product.as_ref().unwrap().name, "Beans");
        assert_eq!(for_buyer, for_farmer);
    }

    #[tokio::test]
    async fn test_farmer_moves_own_order_only() {
        let backend = MemoryBackend::new();
        let farmer = UserId::generate();
        let id = order(&backend, UserId::generate(), farmer, "accepted");
        let sales = sales(&backend);

        let updated = sales
            .update_order_status(farmer, id, OrderStatus::Shipped, None)
            .await
            .unwrap();
        assert_eq!(updated.status, OrderStatus::Shipped);
        assert_eq!(backend.rows(ORDERS)[0]["status"], "shipped");

        let foreign = sales
            .update_order_status(UserId::generate(), id, OrderStatus::Cancelled, None)
            .await;
        assert!(matches!(foreign, Err(SalesError::NotFound(_))));
        assert_eq!(backend.rows(ORDERS)[0]["status"], "shipped");
    }

    #[tokio::test]
    async fn test_answering_request_notifies_buyer() {
        let backend = MemoryBackend::new();
        let (buyer, farmer) = (UserId::generate(), UserId::generate());
        let id = request(&backend, buyer, farmer);
        let sales = sales(&backend);

        let answered = sales
            .respond_to_request(farmer, id, RequestDecision::Accept, None)
            .await
            .unwrap();

        assert_eq!(answered.status, RequestStatus::Accepted);
        assert_eq!(backend.rows(REQUESTS)[0]["status"], "accepted");
        let calls = backend.function_calls("create-notification");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0]["userId"], buyer.to_string());
        assert_eq!(calls[0]["title"], "Request Status Updated");
        assert_eq!(calls[0]["message"], "Your request for Beans has been accepted");
        assert_eq!(calls[0]["type"], "request");
    }

    #[tokio::test]
    async fn test_request_is_answered_once() {
        let backend = MemoryBackend::new();
        let farmer = UserId::generate();
        let id = request(&backend, UserId::generate(), farmer);
        let sales = sales(&backend);
        sales
            .respond_to_request(farmer, id, RequestDecision::Reject, None)
            .await
            .unwrap();

        let again = sales
            .respond_to_request(farmer, id, RequestDecision::Accept, None)
            .await;

        assert!(matches!(
            again,
            Err(SalesError::AlreadyDecided(RequestStatus::Rejected))
        ));
        assert_eq!(backend.rows(REQUESTS)[0]["status"], "rejected");
        assert_eq!(backend.function_calls("create-notification").len(), 1);
    }

    #[tokio::test]
    async fn test_notification_outage_keeps_answer() {
        let backend = MemoryBackend::new();
        let farmer = UserId::generate();
        let id = request(&backend, UserId::generate(), farmer);
        backend.fail_function("create-notification", 5);

        let answered = sales(&backend)
            .respond_to_request(farmer, id, RequestDecision::Reject, None)
            .await
            .unwrap();

        assert_eq!(answered.status, RequestStatus::Rejected);
        assert!(backend.rows("user_notifications").is_empty());
        assert_eq!(
            backend.rows(REQUESTS)[0]["status"],
            Value::String("rejected".to_owned())
        );
    }
}
