//! Payment intent endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{Money, OrderId, PaymentIntentId, PaymentIntentStatus};
use serde::{Deserialize, Serialize};
use store::{PaymentIntent, Store};

use crate::auth::Principal;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ConfirmRequest {
    pub client_secret: String,
}

#[derive(Serialize)]
pub struct PaymentIntentResponse {
    pub id: PaymentIntentId,
    pub order_id: OrderId,
    pub amount: Money,
    pub status: PaymentIntentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
}

impl PaymentIntentResponse {
    fn new(intent: PaymentIntent, reveal_secret: bool) -> Self {
        Self {
            id: intent.id,
            order_id: intent.order_id,
            amount: intent.amount,
            status: intent.status,
            client_secret: reveal_secret.then_some(intent.client_secret),
        }
    }
}

/// POST /payments/intents/{order_id}: open a payment intent for an order.
///
/// The client secret is only ever returned here.
pub async fn create_intent<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    principal: Principal,
    Path(order_id): Path<i64>,
) -> Result<(StatusCode, Json<PaymentIntentResponse>), ApiError> {
    let intent = state
        .payments
        .create_intent(principal.user_id, OrderId::new(order_id))
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(PaymentIntentResponse::new(intent, true)),
    ))
}

/// POST /payments/intents/{order_id}/confirm: confirm with the client secret.
pub async fn confirm<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    principal: Principal,
    Path(order_id): Path<i64>,
    Json(req): Json<ConfirmRequest>,
) -> Result<Json<PaymentIntentResponse>, ApiError> {
    let intent = state
        .payments
        .confirm(principal.user_id, OrderId::new(order_id), &req.client_secret)
        .await?;
    Ok(Json(PaymentIntentResponse::new(intent, false)))
}
