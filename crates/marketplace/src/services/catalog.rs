//! Products and profiles.
//!
//! Thin pass-through over the `products` and `profiles` tables and the
//! product image bucket. Ownership is enforced remotely by row-level security;
//! the filters here only scope what is asked for.

use std::sync::Arc;

use rural_grow_core::{Price, ProductId, UserId};
use serde_json::json;
use thiserror::Error;
use tracing::{info, instrument};

use crate::baas::{
    AccessToken, BaasError, DataApi, NewProduct, Order, Product, Profile, ProfileUpdate, Query,
    StorageApi,
};

/// Errors from catalog operations.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Input rejected before any remote call.
    #[error("invalid input: {0}")]
    Invalid(String),

    /// The row does not exist (or is not visible to the caller).
    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Baas(#[from] BaasError),
}

/// Product and profile access.
#[derive(Clone)]
pub struct Catalog {
    data: Arc<dyn DataApi>,
    storage: Arc<dyn StorageApi>,
    image_bucket: String,
}

impl Catalog {
    #[must_use]
    pub fn new(data: Arc<dyn DataApi>, storage: Arc<dyn StorageApi>, image_bucket: &str) -> Self {
        Self {
            data,
            storage,
            image_bucket: image_bucket.to_owned(),
        }
    }

    /// Products open for purchase, newest first.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Baas` if the lookup fails.
    pub async fn available_products(
        &self,
        token: Option<&AccessToken>,
    ) -> Result<Vec<Product>, CatalogError> {
        let query = Query::table("products")
            .eq("is_available", true)
            .order("created_at", Order::Desc);
        Ok(self.data.select_as(&query, token).await?)
    }

    /// One product by id.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::NotFound` if no visible product has this id.
    pub async fn product(
        &self,
        id: ProductId,
        token: Option<&AccessToken>,
    ) -> Result<Product, CatalogError> {
        let query = Query::table("products").eq("id", id).limit(1);
        self.data
            .select_as::<Product>(&query, token)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| CatalogError::NotFound(format!("product {id}")))
    }

    /// Products listed by `farmer`, newest first.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Baas` if the lookup fails.
    pub async fn farmer_products(
        &self,
        farmer: UserId,
        token: Option<&AccessToken>,
    ) -> Result<Vec<Product>, CatalogError> {
        let query = Query::table("products")
            .eq("farmer_id", farmer)
            .order("created_at", Order::Desc);
        Ok(self.data.select_as(&query, token).await?)
    }

    /// List a new product for `farmer`.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Invalid` for an empty name or unit, a
    /// non-positive price or negative stock; `CatalogError::Baas` if the
    /// insert fails.
    #[instrument(skip(self, product, token), fields(name = %product.name))]
    pub async fn create_product(
        &self,
        farmer: UserId,
        product: NewProduct,
        token: Option<&AccessToken>,
    ) -> Result<Product, CatalogError> {
        validate_product(&product)?;

        let mut row = serde_json::to_value(&product).map_err(BaasError::from)?;
        if let Some(fields) = row.as_object_mut() {
            fields.insert("farmer_id".to_owned(), json!(farmer));
            fields.insert("is_available".to_owned(), json!(true));
        }

        let created = self
            .data
            .insert("products", vec![row], token)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| CatalogError::NotFound("inserted product".to_owned()))?;
        let created: Product = serde_json::from_value(created).map_err(BaasError::from)?;

        info!(product_id = %created.id, "Product listed");
        Ok(created)
    }

    /// Upload a product image and point the product at its public URL.
    ///
    /// Returns the public URL.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Invalid` for unsupported or empty uploads,
    /// `CatalogError::NotFound` if `farmer` has no such product, or
    /// `CatalogError::Baas` if a remote call fails.
    #[instrument(skip(self, bytes, token), fields(size = bytes.len()))]
    pub async fn upload_product_image(
        &self,
        farmer: UserId,
        product: ProductId,
        bytes: Vec<u8>,
        content_type: &str,
        token: Option<&AccessToken>,
    ) -> Result<String, CatalogError> {
        if bytes.is_empty() {
            return Err(CatalogError::Invalid("image is empty".to_owned()));
        }
        let extension = image_extension(content_type).ok_or_else(|| {
            CatalogError::Invalid(format!("unsupported image type {content_type}"))
        })?;

        let path = format!("{farmer}/{product}.{extension}");
        self.storage
            .upload(&self.image_bucket, &path, bytes, content_type, token)
            .await?;
        let url = self.storage.public_url(&self.image_bucket, &path);

        let query = Query::table("products")
            .eq("id", product)
            .eq("farmer_id", farmer);
        let updated = self
            .data
            .update(&query, json!({ "image_url": url }), token)
            .await?;
        if updated.is_empty() {
            return Err(CatalogError::NotFound(format!("product {product}")));
        }

        Ok(url)
    }

    /// Every product, listed or not, newest first.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Baas` if the lookup fails.
    pub async fn all_products(
        &self,
        token: Option<&AccessToken>,
    ) -> Result<Vec<Product>, CatalogError> {
        let query = Query::table("products").order("created_at", Order::Desc);
        Ok(self.data.select_as(&query, token).await?)
    }

    /// Open or close a product for purchase.
    ///
    /// With `owner` set only that farmer's product is touched; `None` is the
    /// moderator path.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::NotFound` if no matching product exists.
    #[instrument(skip(self, token))]
    pub async fn set_availability(
        &self,
        product: ProductId,
        available: bool,
        owner: Option<UserId>,
        token: Option<&AccessToken>,
    ) -> Result<Product, CatalogError> {
        let row = self
            .data
            .update(
                &owned_product(product, owner),
                json!({ "is_available": available }),
                token,
            )
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| CatalogError::NotFound(format!("product {product}")))?;

        info!(%product, available, "Product availability changed");
        Ok(serde_json::from_value(row).map_err(BaasError::from)?)
    }

    /// Remove a product listing.
    ///
    /// `owner` scopes the delete as in [`Catalog::set_availability`].
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::NotFound` if no matching product exists.
    #[instrument(skip(self, token))]
    pub async fn delete_product(
        &self,
        product: ProductId,
        owner: Option<UserId>,
        token: Option<&AccessToken>,
    ) -> Result<(), CatalogError> {
        let query = owned_product(product, owner);
        let existing = self.data.select(&query.clone().limit(1), token).await?;
        if existing.is_empty() {
            return Err(CatalogError::NotFound(format!("product {product}")));
        }
        self.data.delete(&query, token).await?;

        info!(%product, "Product deleted");
        Ok(())
    }

    /// The profile of `user`.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::NotFound` if no profile row exists.
    pub async fn profile(
        &self,
        user: UserId,
        token: Option<&AccessToken>,
    ) -> Result<Profile, CatalogError> {
        let query = Query::table("profiles").eq("user_id", user).limit(1);
        self.data
            .select_as::<Profile>(&query, token)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| CatalogError::NotFound(format!("profile {user}")))
    }

    /// Every profile, newest first.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Baas` if the lookup fails.
    pub async fn profiles(&self, token: Option<&AccessToken>) -> Result<Vec<Profile>, CatalogError> {
        let query = Query::table("profiles").order("created_at", Order::Desc);
        Ok(self.data.select_as(&query, token).await?)
    }

    /// Apply `update` to the profile of `user`, returning the stored row.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Invalid` for an empty update or
    /// `CatalogError::NotFound` if no profile row exists.
    #[instrument(skip(self, update, token))]
    pub async fn update_profile(
        &self,
        user: UserId,
        update: &ProfileUpdate,
        token: Option<&AccessToken>,
    ) -> Result<Profile, CatalogError> {
        if update.is_empty() {
            return Err(CatalogError::Invalid("nothing to update".to_owned()));
        }
        let patch = serde_json::to_value(update).map_err(BaasError::from)?;
        let query = Query::table("profiles").eq("user_id", user);
        let row = self
            .data
            .update(&query, patch, token)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| CatalogError::NotFound(format!("profile {user}")))?;
        Ok(serde_json::from_value(row).map_err(BaasError::from)?)
    }

    /// Delete the profile of `user`.
    ///
    /// The auth account itself stays; only an admin service key can remove it.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::NotFound` if no profile row exists.
    #[instrument(skip(self, token))]
    pub async fn delete_profile(
        &self,
        user: UserId,
        token: Option<&AccessToken>,
    ) -> Result<(), CatalogError> {
        self.profile(user, token).await?;
        let query = Query::table("profiles").eq("user_id", user);
        self.data.delete(&query, token).await?;

        info!(%user, "Profile deleted");
        Ok(())
    }
}

fn owned_product(product: ProductId, owner: Option<UserId>) -> Query {
    let query = Query::table("products").eq("id", product);
    match owner {
        Some(farmer) => query.eq("farmer_id", farmer),
        None => query,
    }
}

fn validate_product(product: &NewProduct) -> Result<(), CatalogError> {
    if product.name.trim().is_empty() {
        return Err(CatalogError::Invalid("name is required".to_owned()));
    }
    if product.unit.trim().is_empty() {
        return Err(CatalogError::Invalid("unit is required".to_owned()));
    }
    if product.price <= Price::ZERO {
        return Err(CatalogError::Invalid("price must be positive".to_owned()));
    }
    if product.stock_quantity < 0 {
        return Err(CatalogError::Invalid("stock cannot be negative".to_owned()));
    }
    Ok(())
}

fn image_extension(content_type: &str) -> Option<&'static str> {
    match content_type {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        _ => None,
    }
}
