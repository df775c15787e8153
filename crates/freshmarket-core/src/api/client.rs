//! API client for the produce marketplace REST API.
//!
//! This module provides the `ApiClient` struct with typed operations for
//! accounts, product listings and orders. Authenticated calls go through
//! the request pipeline; login, registration and refresh do not.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::auth::TokenStore;
use crate::config::Config;
use crate::models::{
    CredentialPair, Credentials, Listing, Order, OrderFilter, OrderStats, OrderStatus, Product,
    ProductDraft, ProfileUpdate, RegisterRequest, User,
};

use super::pipeline::RequestPipeline;
use super::transport::{ApiRequest, ReqwestTransport};
use super::ApiError;

// ============================================================================
// Endpoints
// ============================================================================

const REGISTER_PATH: &str = "auth/register/";
const LOGIN_PATH: &str = "auth/login/";
const PROFILE_PATH: &str = "auth/profile/";
const PRODUCTS_PATH: &str = "products/";
const MY_PRODUCTS_PATH: &str = "products/my-products/";
const CREATE_PRODUCT_PATH: &str = "products/create/";
const ORDERS_PATH: &str = "orders/";
const ORDER_STATS_PATH: &str = "orders/stats/";

/// Upper bound on pages followed for one list call
const MAX_PAGES: u32 = 50;

fn product_path(id: i64) -> String {
    format!("products/{}/", id)
}

fn order_path(id: i64) -> String {
    format!("orders/{}/", id)
}

fn order_status_path(id: i64) -> String {
    format!("orders/{}/update-status/", id)
}

fn to_body<T: Serialize>(value: &T) -> Result<Value, ApiError> {
    Ok(serde_json::to_value(value)?)
}

/// API client for the marketplace.
/// Clone is cheap - the pipeline is shared behind an Arc.
#[derive(Clone)]
pub struct ApiClient {
    pipeline: Arc<RequestPipeline>,
}

impl ApiClient {
    pub fn new(pipeline: Arc<RequestPipeline>) -> Self {
        Self { pipeline }
    }

    /// Build a client over reqwest for the configured API base URL
    pub fn from_config(config: &Config, tokens: Arc<dyn TokenStore>) -> Result<Self> {
        let transport = ReqwestTransport::new(
            &config.api_base_url,
            Duration::from_secs(config.request_timeout_secs),
        )?;
        let pipeline = RequestPipeline::new(Arc::new(transport), tokens);
        Ok(Self::new(Arc::new(pipeline)))
    }

    pub fn pipeline(&self) -> &Arc<RequestPipeline> {
        &self.pipeline
    }

    pub fn tokens(&self) -> &Arc<dyn TokenStore> {
        self.pipeline.tokens()
    }

    async fn fetch<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ApiError> {
        self.pipeline.execute(&request).await?.json()
    }

    /// Fetch every page of a list endpoint.
    async fn fetch_list<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<Vec<T>, ApiError> {
        let mut items = Vec::new();
        let mut page = 1;
        loop {
            let paged = if page == 1 {
                request.clone()
            } else {
                request.clone().with_query("page", page.to_string())
            };
            let listing: Listing<T> = self.fetch(paged).await?;
            let more = listing.has_next();
            let batch = listing.into_vec();
            let empty = batch.is_empty();
            items.extend(batch);

            if !more || empty || page >= MAX_PAGES {
                break;
            }
            page += 1;
        }
        debug!(path = %request.path, pages = page, count = items.len(), "Fetched list");
        Ok(items)
    }

    async fn send(&self, request: ApiRequest) -> Result<(), ApiError> {
        self.pipeline.execute(&request).await?;
        Ok(())
    }

    // ===== Accounts =====

    /// Create an account. Returns the created-user payload as sent by the server.
    pub async fn register(&self, data: &RegisterRequest) -> Result<Value, ApiError> {
        debug!(name = %data.name, role = %data.user_type, "Registering account");
        let request = ApiRequest::post(REGISTER_PATH, to_body(data)?);
        let response = self.pipeline.execute_public(&request).await?;
        if response.body().trim().is_empty() {
            return Ok(Value::Null);
        }
        response.json()
    }

    /// Exchange a username and password for a token pair
    pub async fn login(&self, credentials: &Credentials) -> Result<CredentialPair, ApiError> {
        debug!(username = %credentials.username, "Requesting token pair");
        let request = ApiRequest::post(LOGIN_PATH, to_body(credentials)?);
        self.pipeline.execute_public(&request).await?.json()
    }

    pub async fn get_profile(&self) -> Result<User, ApiError> {
        self.fetch(ApiRequest::get(PROFILE_PATH)).await
    }

    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<User, ApiError> {
        self.fetch(ApiRequest::patch(PROFILE_PATH, to_body(update)?))
            .await
    }

    // ===== Products =====

    /// All marketplace listings
    pub async fn list_products(&self) -> Result<Vec<Product>, ApiError> {
        self.fetch_list(ApiRequest::get(PRODUCTS_PATH)).await
    }

    /// Listings owned by the signed-in farmer
    pub async fn my_products(&self) -> Result<Vec<Product>, ApiError> {
        self.fetch_list(ApiRequest::get(MY_PRODUCTS_PATH)).await
    }

    pub async fn get_product(&self, id: i64) -> Result<Product, ApiError> {
        self.fetch(ApiRequest::get(product_path(id))).await
    }

    pub async fn create_product(&self, draft: &ProductDraft) -> Result<Product, ApiError> {
        self.fetch(ApiRequest::post(CREATE_PRODUCT_PATH, to_body(draft)?))
            .await
    }

    pub async fn update_product(&self, id: i64, draft: &ProductDraft) -> Result<Product, ApiError> {
        self.fetch(ApiRequest::put(product_path(id), to_body(draft)?))
            .await
    }

    pub async fn set_product_availability(
        &self,
        id: i64,
        available: bool,
    ) -> Result<Product, ApiError> {
        self.fetch(ApiRequest::patch(
            product_path(id),
            json!({ "available": available }),
        ))
        .await
    }

    pub async fn delete_product(&self, id: i64) -> Result<(), ApiError> {
        self.send(ApiRequest::delete(product_path(id))).await
    }

    // ===== Orders =====

    pub async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>, ApiError> {
        let request = filter
            .query_pairs()
            .into_iter()
            .fold(ApiRequest::get(ORDERS_PATH), |request, (key, value)| {
                request.with_query(key, value)
            });
        self.fetch_list(request).await
    }

    pub async fn order_stats(&self) -> Result<OrderStats, ApiError> {
        self.fetch(ApiRequest::get(ORDER_STATS_PATH)).await
    }

    pub async fn update_order_status(&self, id: i64, status: OrderStatus) -> Result<(), ApiError> {
        debug!(order = id, status = status.as_str(), "Updating order status");
        self.send(ApiRequest::patch(
            order_status_path(id),
            json!({ "status": status }),
        ))
        .await
    }

    pub async fn delete_order(&self, id: i64) -> Result<(), ApiError> {
        self.send(ApiRequest::delete(order_path(id))).await
    }
}
