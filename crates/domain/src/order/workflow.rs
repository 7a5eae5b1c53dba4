//! Turning a cart into an order.

use std::time::Instant;

use common::{Money, OrderId, OrderStatus, ProductId, UserId};
use store::{
    CartLine, CartRepository, CatalogRepository, IdempotencyRepository, IdempotencyStart,
    NewOrder, Order, OrderLine, OrderRepository, OrderWithLines, Transaction, UnitOfWork,
    rollback_quietly,
};

use super::idempotency::{self, CREATED_STATUS};
use crate::OrderError;

/// Page size used when the caller gives none.
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Largest page a caller may request.
pub const MAX_PAGE_SIZE: u32 = 100;

enum CreateOutcome {
    Created(OrderId),
    Replayed(OrderId),
}

/// Creates, reads and transitions orders.
///
/// Order creation reads the cart and prices outside any transaction, then
/// reserves stock, writes the order, clears the cart and records the
/// idempotency result in a single transaction.
#[derive(Clone)]
pub struct OrderWorkflow<S> {
    pub(crate) store: S,
}

impl<S> OrderWorkflow<S>
where
    S: CartRepository + CatalogRepository + OrderRepository + IdempotencyRepository,
{
    /// Creates a new workflow over the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Converts the user's cart into an order and returns its id.
    ///
    /// With a non-blank `idempotency_key`, a retry of a completed request
    /// returns the original order id without creating another order.
    #[tracing::instrument(skip(self, idempotency_key))]
    pub async fn create_from_cart(
        &self,
        user_id: UserId,
        idempotency_key: Option<&str>,
    ) -> Result<OrderId, OrderError> {
        let start = Instant::now();
        let result = self.create_or_replay(user_id, idempotency_key).await;
        metrics::histogram!("order_create_duration_seconds")
            .record(start.elapsed().as_secs_f64());

        match result {
            Ok(CreateOutcome::Created(order_id)) => {
                metrics::counter!("orders_created_total").increment(1);
                tracing::info!(%order_id, "order created");
                Ok(order_id)
            }
            Ok(CreateOutcome::Replayed(order_id)) => {
                metrics::counter!("idempotent_replays_total").increment(1);
                tracing::info!(%order_id, "idempotent replay");
                Ok(order_id)
            }
            Err(e) => {
                metrics::counter!("orders_create_failed_total", "reason" => e.reason())
                    .increment(1);
                tracing::warn!(error = %e, "order creation failed");
                Err(e)
            }
        }
    }

    async fn create_or_replay(
        &self,
        user_id: UserId,
        idempotency_key: Option<&str>,
    ) -> Result<CreateOutcome, OrderError> {
        let key = idempotency::normalize_key(idempotency_key)?;

        if let Some(key) = key {
            let fingerprint = idempotency::fingerprint(user_id);
            if let IdempotencyStart::Existing(record) =
                self.store.try_start(user_id, key, &fingerprint).await?
            {
                let order_id = idempotency::resolve_existing(&record, user_id, &fingerprint)?;
                return Ok(CreateOutcome::Replayed(order_id));
            }
        }

        let cart = self.store.cart_lines(user_id).await?;
        if cart.is_empty() {
            return Err(OrderError::EmptyCart);
        }

        let (lines, total) = self.price_lines(&cart).await?;

        let mut tx = self.store.begin().await?;
        match self.write_order(&mut tx, user_id, key, &lines, total).await {
            Ok(order) => {
                tx.commit().await?;
                Ok(CreateOutcome::Created(order.id))
            }
            Err(e) => {
                rollback_quietly(tx).await;
                Err(e)
            }
        }
    }

    /// Captures current prices into order lines and sums the total.
    async fn price_lines(&self, cart: &[CartLine]) -> Result<(Vec<OrderLine>, Money), OrderError> {
        let mut product_ids: Vec<ProductId> = cart.iter().map(|line| line.product_id).collect();
        product_ids.sort_unstable();
        product_ids.dedup();

        let prices = self.store.prices(&product_ids).await?;

        let mut total = Money::zero();
        let mut lines = Vec::with_capacity(cart.len());
        for item in cart {
            let unit_price = prices.get(&item.product_id).copied().ok_or(
                OrderError::PriceNotFound {
                    product_id: item.product_id,
                },
            )?;
            let line = OrderLine {
                product_id: item.product_id,
                quantity: item.quantity,
                unit_price,
            };
            total = line
                .line_total()
                .and_then(|amount| total.checked_add(amount))
                .ok_or(OrderError::TotalOverflow)?;
            lines.push(line);
        }

        Ok((lines, total))
    }

    async fn write_order(
        &self,
        tx: &mut <S as UnitOfWork>::Tx,
        user_id: UserId,
        key: Option<&str>,
        lines: &[OrderLine],
        total: Money,
    ) -> Result<Order, OrderError> {
        // Stock rows are touched in product order so concurrent orders
        // lock them in the same sequence.
        let mut reservations: Vec<&OrderLine> = lines.iter().collect();
        reservations.sort_by_key(|line| line.product_id);
        for line in reservations {
            if !self
                .store
                .decrement_stock(tx, line.product_id, line.quantity)
                .await?
            {
                return Err(OrderError::InsufficientStock {
                    product_id: line.product_id,
                });
            }
        }

        let order = self
            .store
            .insert_order(
                tx,
                NewOrder {
                    user_id,
                    status: OrderStatus::New,
                    total_amount: total,
                },
            )
            .await?;
        self.store.insert_order_lines(tx, order.id, lines).await?;
        self.store.clear_cart(tx, user_id).await?;

        if let Some(key) = key {
            self.store
                .save_result(tx, key, CREATED_STATUS, order.id)
                .await?;
        }

        Ok(order)
    }

    /// Returns the user's orders, most recent first.
    ///
    /// `limit` is clamped to `1..=MAX_PAGE_SIZE`.
    #[tracing::instrument(skip(self))]
    pub async fn list_orders(
        &self,
        user_id: UserId,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<Order>, OrderError> {
        let limit = limit.clamp(1, MAX_PAGE_SIZE);
        Ok(self.store.list_orders(user_id, offset, limit).await?)
    }

    /// Returns one of the user's orders with its lines.
    ///
    /// Orders of other users are reported as not found.
    #[tracing::instrument(skip(self))]
    pub async fn get_order(
        &self,
        user_id: UserId,
        order_id: OrderId,
    ) -> Result<OrderWithLines, OrderError> {
        self.store
            .get_order_with_lines(user_id, order_id)
            .await?
            .ok_or(OrderError::NotFound { order_id })
    }
}
