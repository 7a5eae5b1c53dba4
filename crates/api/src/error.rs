//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::{CartError, CatalogError, OrderError};
use payment::PaymentError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// No authenticated principal on the request.
    Unauthorized,
    /// The principal may not perform this operation.
    Forbidden,
    /// Order workflow error.
    Order(OrderError),
    /// Cart error.
    Cart(CartError),
    /// Catalog error.
    Catalog(CatalogError),
    /// Payment workflow error.
    Payment(PaymentError),
}

impl ApiError {
    /// Returns the status code and stable error code for this error.
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, "forbidden"),
            ApiError::Order(err) => order_status_and_code(err),
            ApiError::Cart(err) => match err {
                CartError::InvalidQuantity { .. } => (StatusCode::BAD_REQUEST, "invalid_quantity"),
                CartError::UnknownProduct { .. } => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "unknown_product")
                }
                CartError::Persistence(_) => internal(),
            },
            ApiError::Catalog(err) => match err {
                CatalogError::InvalidName { .. }
                | CatalogError::InvalidPrice { .. }
                | CatalogError::InvalidStock { .. } => (StatusCode::BAD_REQUEST, "invalid_product"),
                CatalogError::NotFound { .. } => (StatusCode::NOT_FOUND, "product_not_found"),
                CatalogError::Persistence(_) => internal(),
            },
            ApiError::Payment(err) => match err {
                PaymentError::OrderNotFound(_) => (StatusCode::NOT_FOUND, "order_not_found"),
                PaymentError::NotPayable { .. } => (StatusCode::CONFLICT, "order_not_payable"),
                PaymentError::ConfirmationFailed => {
                    (StatusCode::CONFLICT, "payment_confirmation_failed")
                }
                PaymentError::Persistence(_) => internal(),
            },
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::Unauthorized => "Authentication required".to_string(),
            ApiError::Forbidden => "Operation not permitted".to_string(),
            ApiError::Order(err) => err.to_string(),
            ApiError::Cart(err) => err.to_string(),
            ApiError::Catalog(err) => err.to_string(),
            ApiError::Payment(err) => err.to_string(),
        }
    }
}

fn order_status_and_code(err: &OrderError) -> (StatusCode, &'static str) {
    match err {
        OrderError::EmptyCart => (StatusCode::BAD_REQUEST, "empty_cart"),
        OrderError::InvalidIdempotencyKey { .. } => {
            (StatusCode::BAD_REQUEST, "invalid_idempotency_key")
        }
        OrderError::PriceNotFound { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "price_not_found"),
        OrderError::TotalOverflow => (StatusCode::UNPROCESSABLE_ENTITY, "total_overflow"),
        OrderError::InsufficientStock { .. } => (StatusCode::CONFLICT, "insufficient_stock"),
        OrderError::IdempotencyConflict => (StatusCode::CONFLICT, "idempotency_conflict"),
        OrderError::InvalidStatusTransition { .. } => {
            (StatusCode::CONFLICT, "invalid_status_transition")
        }
        OrderError::StaleStatus { .. } => (StatusCode::CONFLICT, "stale_status"),
        OrderError::NotFound { .. } => (StatusCode::NOT_FOUND, "order_not_found"),
        OrderError::Persistence(_) => internal(),
    }
}

fn internal() -> (StatusCode, &'static str) {
    (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self.message(), "internal server error");
            "Internal server error".to_string()
        } else {
            self.message()
        };

        let body = serde_json::json!({ "error": message, "code": code });
        (status, axum::Json(body)).into_response()
    }
}

impl From<OrderError> for ApiError {
    fn from(err: OrderError) -> Self {
        ApiError::Order(err)
    }
}

impl From<CartError> for ApiError {
    fn from(err: CartError) -> Self {
        ApiError::Cart(err)
    }
}

impl From<CatalogError> for ApiError {
    fn from(err: CatalogError) -> Self {
        ApiError::Catalog(err)
    }
}

impl From<PaymentError> for ApiError {
    fn from(err: PaymentError) -> Self {
        ApiError::Payment(err)
    }
}
