//! Catalog endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{Money, ProductId};
use domain::DEFAULT_PAGE_SIZE;
use serde::{Deserialize, Serialize};
use store::{Product, ProductDraft, Store};

use crate::auth::Principal;
use crate::error::ApiError;
use crate::state::AppState;

/// Body of both product creation and replacement.
#[derive(Deserialize)]
pub struct ProductRequest {
    pub name: String,
    pub price: Money,
    pub stock: i64,
}

impl From<ProductRequest> for ProductDraft {
    fn from(req: ProductRequest) -> Self {
        Self {
            name: req.name,
            price: req.price,
            stock: req.stock,
        }
    }
}

#[derive(Deserialize)]
pub struct ListProductsQuery {
    #[serde(default)]
    pub offset: u32,
    pub limit: Option<u32>,
}

#[derive(Serialize)]
pub struct ProductResponse {
    pub id: ProductId,
    pub name: String,
    pub price: Money,
    pub stock: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Product> for ProductResponse {
    fn from(product: Product) -> Self {
        Self {
            id: product.id,
            name: product.name,
            price: product.price,
            stock: product.stock,
            created_at: product.created_at,
            updated_at: product.updated_at,
        }
    }
}

#[derive(Serialize)]
pub struct ProductListResponse {
    pub products: Vec<ProductResponse>,
}

/// GET /products: list the catalog by id.
pub async fn list<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    _principal: Principal,
    Query(query): Query<ListProductsQuery>,
) -> Result<Json<ProductListResponse>, ApiError> {
    let products = state
        .catalog
        .list_products(query.offset, query.limit.unwrap_or(DEFAULT_PAGE_SIZE))
        .await?;
    Ok(Json(ProductListResponse {
        products: products.into_iter().map(Into::into).collect(),
    }))
}

/// GET /products/{id}
pub async fn get<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    _principal: Principal,
    Path(id): Path<i64>,
) -> Result<Json<ProductResponse>, ApiError> {
    let product = state.catalog.get_product(ProductId::new(id)).await?;
    Ok(Json(product.into()))
}

/// POST /products: add a product (operators only).
pub async fn create<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    principal: Principal,
    Json(req): Json<ProductRequest>,
) -> Result<(StatusCode, Json<ProductResponse>), ApiError> {
    principal.require_admin()?;
    let product = state.catalog.create_product(req.into()).await?;
    Ok((StatusCode::CREATED, Json(product.into())))
}

/// PUT /products/{id}: reprice or restock a product (operators only).
pub async fn update<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    principal: Principal,
    Path(id): Path<i64>,
    Json(req): Json<ProductRequest>,
) -> Result<Json<ProductResponse>, ApiError> {
    principal.require_admin()?;
    let product = state
        .catalog
        .update_product(ProductId::new(id), req.into())
        .await?;
    Ok(Json(product.into()))
}
