//! Operator endpoints for fulfillment.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::{OrderId, OrderStatus};
use serde::Serialize;
use store::Store;

use crate::auth::Principal;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Serialize)]
pub struct StatusResponse {
    pub id: OrderId,
    pub status: OrderStatus,
}

/// POST /admin/orders/{id}/ship
pub async fn ship<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    principal: Principal,
    Path(id): Path<i64>,
) -> Result<Json<StatusResponse>, ApiError> {
    transition(&state, principal, id, OrderStatus::Shipped).await
}

/// POST /admin/orders/{id}/deliver
pub async fn deliver<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    principal: Principal,
    Path(id): Path<i64>,
) -> Result<Json<StatusResponse>, ApiError> {
    transition(&state, principal, id, OrderStatus::Delivered).await
}

/// POST /admin/orders/{id}/cancel
pub async fn cancel<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    principal: Principal,
    Path(id): Path<i64>,
) -> Result<Json<StatusResponse>, ApiError> {
    transition(&state, principal, id, OrderStatus::Cancelled).await
}

#[tracing::instrument(skip(state, principal), fields(admin = %principal.user_id))]
async fn transition<S: Store>(
    state: &AppState<S>,
    principal: Principal,
    id: i64,
    to: OrderStatus,
) -> Result<Json<StatusResponse>, ApiError> {
    principal.require_admin()?;
    let order_id = OrderId::new(id);
    let status = state.orders.transition(order_id, to).await?;
    Ok(Json(StatusResponse {
        id: order_id,
        status,
    }))
}
