//! Order endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use chrono::{DateTime, Utc};
use common::{Money, OrderId, OrderStatus, ProductId, UserId};
use domain::DEFAULT_PAGE_SIZE;
use serde::{Deserialize, Serialize};
use store::{Order, OrderLine, OrderWithLines, Store};

use crate::auth::Principal;
use crate::error::ApiError;
use crate::state::AppState;

/// Header carrying the client's idempotency key.
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

// -- Request types --

#[derive(Deserialize)]
pub struct ListOrdersQuery {
    #[serde(default)]
    pub offset: u32,
    pub limit: Option<u32>,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderCreatedResponse {
    pub id: OrderId,
}

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: OrderId,
    pub user_id: UserId,
    pub status: OrderStatus,
    pub total_amount: Money,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            id: order.id,
            user_id: order.user_id,
            status: order.status,
            total_amount: order.total_amount,
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }
}

#[derive(Serialize)]
pub struct OrderLineResponse {
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Money,
}

impl From<OrderLine> for OrderLineResponse {
    fn from(line: OrderLine) -> Self {
        Self {
            product_id: line.product_id,
            quantity: line.quantity,
            unit_price: line.unit_price,
        }
    }
}

#[derive(Serialize)]
pub struct OrderDetailResponse {
    #[serde(flatten)]
    pub order: OrderResponse,
    pub lines: Vec<OrderLineResponse>,
}

impl From<OrderWithLines> for OrderDetailResponse {
    fn from(detail: OrderWithLines) -> Self {
        Self {
            order: detail.order.into(),
            lines: detail.lines.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Serialize)]
pub struct OrderListResponse {
    pub orders: Vec<OrderResponse>,
}

// -- Handlers --

/// POST /orders: turn the caller's cart into an order.
#[tracing::instrument(skip(state, headers), fields(user_id = %principal.user_id))]
pub async fn create<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    principal: Principal,
    headers: HeaderMap,
) -> Result<(StatusCode, Json<OrderCreatedResponse>), ApiError> {
    let key = headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|v| v.to_str().ok());

    let id = state
        .orders
        .create_from_cart(principal.user_id, key)
        .await?;

    Ok((StatusCode::CREATED, Json(OrderCreatedResponse { id })))
}

/// GET /orders: list the caller's orders, most recent first.
pub async fn list<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    principal: Principal,
    Query(query): Query<ListOrdersQuery>,
) -> Result<Json<OrderListResponse>, ApiError> {
    let orders = state
        .orders
        .list_orders(
            principal.user_id,
            query.offset,
            query.limit.unwrap_or(DEFAULT_PAGE_SIZE),
        )
        .await?;

    Ok(Json(OrderListResponse {
        orders: orders.into_iter().map(Into::into).collect(),
    }))
}

/// GET /orders/{id}: load one of the caller's orders with its lines.
pub async fn get<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    principal: Principal,
    Path(id): Path<i64>,
) -> Result<Json<OrderDetailResponse>, ApiError> {
    let order = state
        .orders
        .get_order(principal.user_id, OrderId::new(id))
        .await?;
    Ok(Json(order.into()))
}
