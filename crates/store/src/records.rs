//! Rows read from and written to the store.

use chrono::{DateTime, Utc};
use common::{
    Money, OrderId, OrderStatus, PaymentIntentId, PaymentIntentStatus, ProductId, UserId,
};

/// A catalog product with its current price and stock counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub price: Money,
    pub stock: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Editable product fields, used for both creation and full replacement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductDraft {
    pub name: String,
    pub price: Money,
    pub stock: i64,
}

/// One product a user intends to buy. Unique per `(user_id, product_id)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartLine {
    pub user_id: UserId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An order header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub status: OrderStatus,
    pub total_amount: Money,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Immutable snapshot of a product, quantity and price inside an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Money,
}

impl OrderLine {
    /// Returns `quantity * unit_price`, or `None` on overflow.
    pub fn line_total(&self) -> Option<Money> {
        self.unit_price.checked_mul(self.quantity)
    }
}

/// An order header together with its lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderWithLines {
    pub order: Order,
    pub lines: Vec<OrderLine>,
}

/// Values for a new order header; id and timestamps are assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub user_id: UserId,
    pub status: OrderStatus,
    pub total_amount: Money,
}

/// A "create order" attempt recorded under a client-supplied key.
///
/// The record is terminal once `status_code` and `order_id` are set. A record
/// without them belongs to an attempt that is still running or that failed
/// before recording a result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdempotencyRecord {
    pub key: String,
    pub user_id: UserId,
    pub fingerprint: String,
    pub status_code: Option<u16>,
    pub order_id: Option<OrderId>,
}

/// Outcome of an insert-if-absent on an idempotency key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdempotencyStart {
    /// No record existed; one was created for this attempt.
    Started,
    /// A record already existed and was left untouched.
    Existing(IdempotencyRecord),
}

/// A payment intent for one order.
#[derive(Clone, PartialEq, Eq)]
pub struct PaymentIntent {
    pub id: PaymentIntentId,
    pub order_id: OrderId,
    pub amount: Money,
    pub status: PaymentIntentStatus,
    pub client_secret: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl std::fmt::Debug for PaymentIntent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentIntent")
            .field("id", &self.id)
            .field("order_id", &self.order_id)
            .field("amount", &self.amount)
            .field("status", &self.status)
            .field("client_secret", &"<redacted>")
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

/// Values for a new payment intent; it always starts as `requires_confirmation`.
#[derive(Clone, PartialEq, Eq)]
pub struct NewPaymentIntent {
    pub order_id: OrderId,
    pub amount: Money,
    pub client_secret: String,
}

impl std::fmt::Debug for NewPaymentIntent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewPaymentIntent")
            .field("order_id", &self.order_id)
            .field("amount", &self.amount)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}
