//! Cart endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::ProductId;
use serde::{Deserialize, Serialize};
use store::{CartLine, Store};

use crate::auth::Principal;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct AddItemRequest {
    pub product_id: ProductId,
    pub quantity: u32,
}

#[derive(Serialize)]
pub struct CartLineResponse {
    pub product_id: ProductId,
    pub quantity: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<CartLine> for CartLineResponse {
    fn from(line: CartLine) -> Self {
        Self {
            product_id: line.product_id,
            quantity: line.quantity,
            created_at: line.created_at,
            updated_at: line.updated_at,
        }
    }
}

#[derive(Serialize)]
pub struct CartResponse {
    pub items: Vec<CartLineResponse>,
}

/// GET /cart: list the caller's cart.
pub async fn list<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    principal: Principal,
) -> Result<Json<CartResponse>, ApiError> {
    let items = state.cart.items(principal.user_id).await?;
    Ok(Json(CartResponse {
        items: items.into_iter().map(CartLineResponse::from).collect(),
    }))
}

/// POST /cart/items: add a product to the caller's cart.
pub async fn add_item<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    principal: Principal,
    Json(req): Json<AddItemRequest>,
) -> Result<(StatusCode, Json<CartLineResponse>), ApiError> {
    let line = state
        .cart
        .add_item(principal.user_id, req.product_id, req.quantity)
        .await?;
    Ok((StatusCode::CREATED, Json(line.into())))
}

/// DELETE /cart/items/{product_id}: remove a product from the caller's cart.
pub async fn remove_item<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    principal: Principal,
    Path(product_id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state
        .cart
        .remove_item(principal.user_id, ProductId::new(product_id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /cart: empty the caller's cart.
pub async fn clear<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    principal: Principal,
) -> Result<StatusCode, ApiError> {
    state.cart.clear(principal.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
