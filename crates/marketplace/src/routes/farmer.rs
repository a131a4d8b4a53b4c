//! Farmer dashboard: products, orders, purchase requests and payouts.

use axum::{
    Json,
    extract::{Multipart, Path, State},
    http::StatusCode,
};
use rural_grow_core::{OrderId, OrderStatus, Price, ProductId, PurchaseRequestId, RequestDecision};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::baas::{
    EarningsSummary, NewProduct, OrderRecord, PaymentMethod, PayoutRequest, Product,
    PurchaseRequest,
};
use crate::error::{AppError, Result};
use crate::middleware::Client;
use crate::models::Viewer;
use crate::state::AppState;

/// Multipart field carrying the image.
const IMAGE_FIELD: &str = "image";

/// Result of an image upload.
#[derive(Debug, Serialize)]
pub struct ImageUploaded {
    pub image_url: String,
}

/// Availability change for a product.
#[derive(Debug, Deserialize)]
pub struct Availability {
    pub is_available: bool,
}

/// New status for an order.
#[derive(Debug, Deserialize)]
pub struct StatusChange {
    pub status: OrderStatus,
}

/// Answer to a purchase request.
#[derive(Debug, Deserialize)]
pub struct Decision {
    pub decision: RequestDecision,
}

/// Payout request form.
#[derive(Debug, Deserialize)]
pub struct PayoutForm {
    pub amount: Price,
    pub payment_method: PaymentMethod,
}

/// Earnings overview with the payout history.
#[derive(Debug, Serialize)]
pub struct Earnings {
    #[serde(flatten)]
    pub summary: EarningsSummary,
    pub payouts: Vec<PayoutRequest>,
}

/// The farmer's own products, newest first.
#[instrument(skip_all, fields(user_id = %viewer.id()))]
pub async fn index(
    State(state): State<AppState>,
    viewer: Viewer,
    Client(client): Client,
) -> Result<Json<Vec<Product>>> {
    let token = client.auth.access_token().await?;
    let products = state
        .catalog()
        .farmer_products(viewer.id(), token.as_ref())
        .await?;
    Ok(Json(products))
}

/// List a new product.
#[instrument(skip_all, fields(user_id = %viewer.id(), name = %product.name))]
pub async fn create(
    State(state): State<AppState>,
    viewer: Viewer,
    Client(client): Client,
    Json(product): Json<NewProduct>,
) -> Result<(StatusCode, Json<Product>)> {
    let token = client.auth.access_token().await?;
    let created = state
        .catalog()
        .create_product(viewer.id(), product, token.as_ref())
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Upload the image of one of the farmer's products.
#[instrument(skip_all, fields(user_id = %viewer.id(), %product_id))]
pub async fn upload_image(
    State(state): State<AppState>,
    viewer: Viewer,
    Client(client): Client,
    Path(product_id): Path<ProductId>,
    mut multipart: Multipart,
) -> Result<Json<ImageUploaded>> {
    let (bytes, content_type) = loop {
        let field = multipart
            .next_field()
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?
            .ok_or_else(|| AppError::BadRequest(format!("missing {IMAGE_FIELD} field")))?;
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_owned();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?;
        break (bytes.to_vec(), content_type);
    };

    let token = client.auth.access_token().await?;
    let image_url = state
        .catalog()
        .upload_product_image(viewer.id(), product_id, bytes, &content_type, token.as_ref())
        .await?;
    Ok(Json(ImageUploaded { image_url }))
}

/// Open or close one of the farmer's products for purchase.
#[instrument(skip_all, fields(user_id = %viewer.id(), %product_id))]
pub async fn set_availability(
    State(state): State<AppState>,
    viewer: Viewer,
    Client(client): Client,
    Path(product_id): Path<ProductId>,
    Json(form): Json<Availability>,
) -> Result<Json<Product>> {
    let token = client.auth.access_token().await?;
    let product = state
        .catalog()
        .set_availability(product_id, form.is_available, Some(viewer.id()), token.as_ref())
        .await?;
    Ok(Json(product))
}

/// Delete one of the farmer's products.
#[instrument(skip_all, fields(user_id = %viewer.id(), %product_id))]
pub async fn delete(
    State(state): State<AppState>,
    viewer: Viewer,
    Client(client): Client,
    Path(product_id): Path<ProductId>,
) -> Result<StatusCode> {
    let token = client.auth.access_token().await?;
    state
        .catalog()
        .delete_product(product_id, Some(viewer.id()), token.as_ref())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Orders placed for the farmer's produce.
#[instrument(skip_all, fields(user_id = %viewer.id()))]
pub async fn orders(
    State(state): State<AppState>,
    viewer: Viewer,
    Client(client): Client,
) -> Result<Json<Vec<OrderRecord>>> {
    let token = client.auth.access_token().await?;
    let orders = state
        .sales()
        .farmer_orders(viewer.id(), token.as_ref())
        .await?;
    Ok(Json(orders))
}

/// Move an order along.
#[instrument(skip_all, fields(user_id = %viewer.id(), %order_id, status = %form.status))]
pub async fn update_order_status(
    State(state): State<AppState>,
    viewer: Viewer,
    Client(client): Client,
    Path(order_id): Path<OrderId>,
    Json(form): Json<StatusChange>,
) -> Result<Json<OrderRecord>> {
    let token = client.auth.access_token().await?;
    let order = state
        .sales()
        .update_order_status(viewer.id(), order_id, form.status, token.as_ref())
        .await?;
    Ok(Json(order))
}

/// Purchase requests sent to the farmer.
#[instrument(skip_all, fields(user_id = %viewer.id()))]
pub async fn requests(
    State(state): State<AppState>,
    viewer: Viewer,
    Client(client): Client,
) -> Result<Json<Vec<PurchaseRequest>>> {
    let token = client.auth.access_token().await?;
    let requests = state
        .sales()
        .farmer_requests(viewer.id(), token.as_ref())
        .await?;
    Ok(Json(requests))
}

/// Accept or reject a purchase request.
#[instrument(skip_all, fields(user_id = %viewer.id(), %request_id))]
pub async fn decide_request(
    State(state): State<AppState>,
    viewer: Viewer,
    Client(client): Client,
    Path(request_id): Path<PurchaseRequestId>,
    Json(form): Json<Decision>,
) -> Result<Json<PurchaseRequest>> {
    let token = client.auth.access_token().await?;
    let request = state
        .sales()
        .respond_to_request(viewer.id(), request_id, form.decision, token.as_ref())
        .await?;
    Ok(Json(request))
}

/// Earnings summary and payout history.
#[instrument(skip_all, fields(user_id = %viewer.id()))]
pub async fn earnings(
    State(state): State<AppState>,
    viewer: Viewer,
    Client(client): Client,
) -> Result<Json<Earnings>> {
    let token = client.auth.access_token().await?;
    let (summary, payouts) = tokio::try_join!(
        state.payouts().summary(viewer.id(), token.as_ref()),
        state.payouts().payout_requests(viewer.id(), token.as_ref()),
    )?;
    Ok(Json(Earnings { summary, payouts }))
}

/// Request a payout of available earnings.
#[instrument(skip_all, fields(user_id = %viewer.id(), amount = %form.amount))]
pub async fn request_payout(
    State(state): State<AppState>,
    viewer: Viewer,
    Client(client): Client,
    Json(form): Json<PayoutForm>,
) -> Result<(StatusCode, Json<PayoutRequest>)> {
    let token = client.auth.access_token().await?;
    let payout = state
        .payouts()
        .request_payout(viewer.id(), form.amount, form.payment_method, token.as_ref())
        .await?;
    Ok((StatusCode::CREATED, Json(payout)))
}
