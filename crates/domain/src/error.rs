//! Domain error types.

use common::{Money, OrderId, OrderStatus, ProductId};
use store::StoreError;
use thiserror::Error;

/// Errors that can occur in the order workflow.
#[derive(Debug, Error)]
pub enum OrderError {
    /// The cart has no lines.
    #[error("Cart is empty")]
    EmptyCart,

    /// A cart line references a product without a resolvable price.
    #[error("Price not found for product {product_id}")]
    PriceNotFound { product_id: ProductId },

    /// Stock could not cover the requested quantity.
    #[error("Insufficient stock for product {product_id}")]
    InsufficientStock { product_id: ProductId },

    /// A previous attempt with the same key is in flight or failed without a result.
    #[error("A request with this idempotency key is in progress or failed")]
    IdempotencyConflict,

    /// The idempotency key is too long to store.
    #[error("Idempotency key must be at most {max} bytes")]
    InvalidIdempotencyKey { max: usize },

    /// The requested status is not reachable from the current one.
    #[error("Invalid status transition from {from} to {to}")]
    InvalidStatusTransition { from: OrderStatus, to: OrderStatus },

    /// The order does not exist or belongs to another user.
    #[error("Order not found: {order_id}")]
    NotFound { order_id: OrderId },

    /// The order's status changed between read and conditional update.
    #[error("Order {order_id} is no longer in {expected} status")]
    StaleStatus {
        order_id: OrderId,
        expected: OrderStatus,
    },

    /// The order total does not fit in the money representation.
    #[error("Order total overflows")]
    TotalOverflow,

    /// A store operation failed.
    #[error("Persistence error: {0}")]
    Persistence(#[from] StoreError),
}

impl OrderError {
    /// Short label used for the `reason` metric label.
    pub fn reason(&self) -> &'static str {
        match self {
            OrderError::EmptyCart => "empty_cart",
            OrderError::PriceNotFound { .. } => "price_not_found",
            OrderError::InsufficientStock { .. } => "insufficient_stock",
            OrderError::IdempotencyConflict => "idempotency_conflict",
            OrderError::InvalidIdempotencyKey { .. } => "invalid_idempotency_key",
            OrderError::InvalidStatusTransition { .. } => "invalid_status_transition",
            OrderError::NotFound { .. } => "order_not_found",
            OrderError::StaleStatus { .. } => "stale_status",
            OrderError::TotalOverflow => "total_overflow",
            OrderError::Persistence(_) => "persistence",
        }
    }
}

/// Errors that can occur in cart operations.
#[derive(Debug, Error)]
pub enum CartError {
    /// Quantity is zero, or would push the cart line past `u32::MAX`.
    #[error("Invalid quantity: {quantity}")]
    InvalidQuantity { quantity: u32 },

    /// The product does not exist.
    #[error("Unknown product: {product_id}")]
    UnknownProduct { product_id: ProductId },

    /// A store operation failed.
    #[error("Persistence error: {0}")]
    Persistence(StoreError),
}

impl From<StoreError> for CartError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::UnknownProduct(product_id) => CartError::UnknownProduct { product_id },
            other => CartError::Persistence(other),
        }
    }
}

/// Errors that can occur in catalog operations.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The product name is blank or too long.
    #[error("Product name must be between {min} and {max} characters")]
    InvalidName { min: usize, max: usize },

    /// Prices must be positive.
    #[error("Invalid price: {price} (must be greater than 0)")]
    InvalidPrice { price: Money },

    /// Stock can't go below zero.
    #[error("Invalid stock: {stock} (must not be negative)")]
    InvalidStock { stock: i64 },

    /// The product does not exist.
    #[error("Product not found: {product_id}")]
    NotFound { product_id: ProductId },

    /// A store operation failed.
    #[error("Persistence error: {0}")]
    Persistence(#[from] StoreError),
}
