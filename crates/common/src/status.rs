//! Persisted status values for orders and payment intents.
//!
//! These enums are the storage and wire vocabulary only. Which transitions
//! are allowed between order statuses is decided by the domain crate.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A status string read from storage or a request that names no known status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} status: {value}")]
pub struct ParseStatusError {
    kind: &'static str,
    value: String,
}

/// The lifecycle status of an order.
///
/// ```text
/// new ──► awaiting_payment ──► paid ──► shipped ──► delivered
///  │             │              │
///  └─────────────┴──────────────┴──► cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Created from a cart, nothing paid yet.
    New,
    /// A payment intent exists and awaits confirmation.
    AwaitingPayment,
    /// Payment confirmed.
    Paid,
    /// Handed to the carrier.
    Shipped,
    /// Received by the customer (terminal).
    Delivered,
    /// Cancelled before shipping (terminal).
    Cancelled,
}

impl OrderStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [OrderStatus; 6] = [
        OrderStatus::New,
        OrderStatus::AwaitingPayment,
        OrderStatus::Paid,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    /// Returns the status name as stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::New => "new",
            OrderStatus::AwaitingPayment => "awaiting_payment",
            OrderStatus::Paid => "paid",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ParseStatusError {
                kind: "order",
                value: s.to_string(),
            })
    }
}

/// The status of a payment intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentIntentStatus {
    /// Created, waiting for the client to confirm with its secret.
    RequiresConfirmation,
    /// Confirmed; the order has been marked paid.
    Succeeded,
}

impl PaymentIntentStatus {
    /// Returns the status name as stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentIntentStatus::RequiresConfirmation => "requires_confirmation",
            PaymentIntentStatus::Succeeded => "succeeded",
        }
    }
}

impl std::fmt::Display for PaymentIntentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentIntentStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "requires_confirmation" => Ok(PaymentIntentStatus::RequiresConfirmation),
            "succeeded" => Ok(PaymentIntentStatus::Succeeded),
            other => Err(ParseStatusError {
                kind: "payment intent",
                value: other.to_string(),
            }),
        }
    }
}
