//! Payment error types.

use common::{OrderId, OrderStatus};
use store::StoreError;
use thiserror::Error;

/// Errors that can occur during payment operations.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// The order does not exist or belongs to another user.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The order is not in a status that accepts a new payment intent.
    #[error("Order {order_id} cannot be paid in {status} status")]
    NotPayable {
        order_id: OrderId,
        status: OrderStatus,
    },

    /// No pending intent matched the order and secret, or the order was not
    /// awaiting payment.
    #[error("Payment confirmation failed")]
    ConfirmationFailed,

    /// A store operation failed.
    #[error("Persistence error: {0}")]
    Persistence(#[from] StoreError),
}

/// Convenience type alias for payment results.
pub type Result<T> = std::result::Result<T, PaymentError>;
