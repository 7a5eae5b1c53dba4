//! Order status state machine.
//!
//! ```text
//! new ──► awaiting_payment ──► paid ──► shipped ──► delivered
//!  │             │              │
//!  └─────────────┴──────────────┴──► cancelled
//! ```

use common::OrderStatus;

use crate::OrderError;

/// Statuses reachable in one step from `from`, excluding `from` itself.
pub fn allowed_targets(from: OrderStatus) -> &'static [OrderStatus] {
    match from {
        OrderStatus::New => &[OrderStatus::AwaitingPayment, OrderStatus::Cancelled],
        OrderStatus::AwaitingPayment => &[OrderStatus::Paid, OrderStatus::Cancelled],
        OrderStatus::Paid => &[OrderStatus::Shipped, OrderStatus::Cancelled],
        OrderStatus::Shipped => &[OrderStatus::Delivered],
        OrderStatus::Delivered | OrderStatus::Cancelled => &[],
    }
}

/// Returns true if an order may move from `from` to `to`.
///
/// Staying in the same status is always allowed.
pub fn is_valid_transition(from: OrderStatus, to: OrderStatus) -> bool {
    from == to || allowed_targets(from).contains(&to)
}

/// Like [`is_valid_transition`], but reports both states on failure.
pub fn check_transition(from: OrderStatus, to: OrderStatus) -> Result<(), OrderError> {
    if is_valid_transition(from, to) {
        Ok(())
    } else {
        Err(OrderError::InvalidStatusTransition { from, to })
    }
}

/// Returns true if no transition leaves this status.
pub fn is_terminal(status: OrderStatus) -> bool {
    allowed_targets(status).is_empty()
}
