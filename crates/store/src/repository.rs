//! Collaborator traits consumed by the order and payment workflows.
//!
//! Reads that only feed validation run outside any transaction. Every write
//! takes the caller's open transaction explicitly, so a workflow decides
//! exactly which writes commit together.

use std::collections::HashMap;

use async_trait::async_trait;
use common::{Money, OrderId, OrderStatus, PaymentIntentId, ProductId, UserId};

use crate::{
    CartLine, IdempotencyStart, NewOrder, NewPaymentIntent, Order, OrderLine, OrderWithLines,
    PaymentIntent, Product, ProductDraft, Result, UnitOfWork,
};

/// Cart lines per user.
#[async_trait]
pub trait CartRepository: UnitOfWork {
    /// Returns the user's current cart lines.
    async fn cart_lines(&self, user_id: UserId) -> Result<Vec<CartLine>>;

    /// Adds `quantity` of a product to the user's cart.
    ///
    /// If the product is already in the cart the quantities accumulate.
    /// Fails with `UnknownProduct` if the product does not exist, and with
    /// `QuantityOverflow`, leaving the line unchanged, if the sum would not
    /// fit in a `u32`.
    async fn add_to_cart(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<CartLine>;

    /// Removes a product from the user's cart. Returns false if it was not there.
    async fn remove_from_cart(&self, user_id: UserId, product_id: ProductId) -> Result<bool>;

    /// Deletes every line of the user's cart, returning how many were removed.
    async fn clear_cart(&self, tx: &mut Self::Tx, user_id: UserId) -> Result<u64>;
}

/// Product prices and stock counters.
#[async_trait]
pub trait CatalogRepository: UnitOfWork {
    /// Returns products ordered by id.
    async fn list_products(&self, offset: u32, limit: u32) -> Result<Vec<Product>>;

    /// Returns a product if it exists.
    async fn get_product(&self, product_id: ProductId) -> Result<Option<Product>>;

    /// Inserts a product and returns it with its assigned id.
    async fn insert_product(&self, draft: ProductDraft) -> Result<Product>;

    /// Replaces a product's name, price and stock. Returns `None` if it does not exist.
    ///
    /// Order lines keep the price captured when they were created.
    async fn update_product(
        &self,
        product_id: ProductId,
        draft: ProductDraft,
    ) -> Result<Option<Product>>;

    /// Returns current unit prices. Products that don't exist are absent from the map.
    async fn prices(&self, product_ids: &[ProductId]) -> Result<HashMap<ProductId, Money>>;

    /// Decrements stock only if at least `quantity` is available.
    ///
    /// Returns false, changing nothing, when stock is insufficient or the
    /// product does not exist.
    async fn decrement_stock(
        &self,
        tx: &mut Self::Tx,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<bool>;
}

/// Order headers and lines.
#[async_trait]
pub trait OrderRepository: UnitOfWork {
    /// Inserts an order header and returns it with its assigned id.
    async fn insert_order(&self, tx: &mut Self::Tx, order: NewOrder) -> Result<Order>;

    /// Inserts all lines of an order.
    async fn insert_order_lines(
        &self,
        tx: &mut Self::Tx,
        order_id: OrderId,
        lines: &[OrderLine],
    ) -> Result<()>;

    /// Returns the user's orders, most recent first.
    async fn list_orders(&self, user_id: UserId, offset: u32, limit: u32) -> Result<Vec<Order>>;

    /// Returns an order header if it exists and belongs to the user.
    async fn get_order(&self, user_id: UserId, order_id: OrderId) -> Result<Option<Order>>;

    /// Returns an order and its lines if it exists and belongs to the user.
    async fn get_order_with_lines(
        &self,
        user_id: UserId,
        order_id: OrderId,
    ) -> Result<Option<OrderWithLines>>;

    /// Returns the current status of any order.
    async fn order_status(&self, order_id: OrderId) -> Result<Option<OrderStatus>>;

    /// Sets the status to `to` only if it is still `from`.
    ///
    /// Returns false when no row matched, i.e. the order is gone or its
    /// status changed since it was read.
    async fn update_order_status(
        &self,
        tx: &mut Self::Tx,
        order_id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<bool>;
}

/// Ledger of "create order" attempts keyed by client-supplied tokens.
#[async_trait]
pub trait IdempotencyRepository: UnitOfWork {
    /// Inserts a record for `key` unless one exists, in which case the
    /// existing record is returned unchanged.
    async fn try_start(
        &self,
        user_id: UserId,
        key: &str,
        fingerprint: &str,
    ) -> Result<IdempotencyStart>;

    /// Records the final result of the attempt started under `key`.
    async fn save_result(
        &self,
        tx: &mut Self::Tx,
        key: &str,
        status_code: u16,
        order_id: OrderId,
    ) -> Result<()>;
}

/// Payment intents.
#[async_trait]
pub trait PaymentRepository: UnitOfWork {
    /// Inserts a new intent in `requires_confirmation` status.
    async fn insert_payment_intent(
        &self,
        tx: &mut Self::Tx,
        intent: NewPaymentIntent,
    ) -> Result<PaymentIntent>;

    /// Returns the order's intent awaiting confirmation, locking it for the
    /// rest of the transaction.
    async fn pending_intent_for_update(
        &self,
        tx: &mut Self::Tx,
        order_id: OrderId,
    ) -> Result<Option<PaymentIntent>>;

    /// Marks an intent succeeded only if it still requires confirmation.
    async fn mark_intent_succeeded(
        &self,
        tx: &mut Self::Tx,
        intent_id: PaymentIntentId,
    ) -> Result<bool>;
}

/// Everything the HTTP layer needs from one backend.
pub trait Store:
    CartRepository
    + CatalogRepository
    + OrderRepository
    + IdempotencyRepository
    + PaymentRepository
    + Clone
    + 'static
{
}

impl<T> Store for T where
    T: CartRepository
        + CatalogRepository
        + OrderRepository
        + IdempotencyRepository
        + PaymentRepository
        + Clone
        + 'static
{
}
