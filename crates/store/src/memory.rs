use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use common::{
    Money, OrderId, OrderStatus, PaymentIntentId, PaymentIntentStatus, ProductId, UserId,
};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    CartLine, CartRepository, CatalogRepository, IdempotencyRecord, IdempotencyRepository,
    IdempotencyStart, NewOrder, NewPaymentIntent, Order, OrderLine, OrderRepository,
    OrderWithLines, PaymentIntent, PaymentRepository, Product, ProductDraft, Result, StoreError,
    Transaction, UnitOfWork,
};

#[derive(Debug, Clone, Default)]
struct Tables {
    products: BTreeMap<ProductId, Product>,
    cart: BTreeMap<(UserId, ProductId), CartLine>,
    orders: BTreeMap<OrderId, OrderWithLines>,
    idempotency: HashMap<String, IdempotencyRecord>,
    payment_intents: BTreeMap<PaymentIntentId, PaymentIntent>,
    next_order_id: i64,
    next_intent_id: i64,
}

#[derive(Debug, Default)]
struct Faults {
    fail_on_commit: AtomicBool,
    fail_on_idempotency_save: AtomicBool,
    status_change: std::sync::Mutex<Option<(OrderId, OrderStatus)>>,
}

impl Faults {
    fn take_status_change(&self, order_id: OrderId) -> Option<OrderStatus> {
        let mut pending = self
            .status_change
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match *pending {
            Some((target, status)) if target == order_id => {
                *pending = None;
                Some(status)
            }
            _ => None,
        }
    }
}

impl Tables {
    fn set_status(&mut self, order_id: OrderId, status: OrderStatus) -> bool {
        match self.orders.get_mut(&order_id) {
            Some(entry) => {
                entry.order.status = status;
                entry.order.updated_at = Utc::now();
                true
            }
            None => false,
        }
    }
}

/// In-memory store implementation for testing and local runs.
///
/// A transaction holds the store lock for its whole lifetime and writes to a
/// private copy of the tables that replaces the live ones on commit. This
/// gives serializable isolation and makes a dropped or rolled-back
/// transaction leave no trace.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<Mutex<Tables>>,
    faults: Arc<Faults>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates or replaces a catalog product under a fixed id.
    pub async fn upsert_product(&self, product_id: ProductId, price: Money, stock: i64) {
        let now = Utc::now();
        self.tables.lock().await.products.insert(
            product_id,
            Product {
                id: product_id,
                name: format!("product-{product_id}"),
                price,
                stock,
                created_at: now,
                updated_at: now,
            },
        );
    }

    /// Deletes a catalog product, leaving cart lines that reference it.
    pub async fn remove_product(&self, product_id: ProductId) -> bool {
        self.tables
            .lock()
            .await
            .products
            .remove(&product_id)
            .is_some()
    }

    /// Returns the product's current stock.
    pub async fn stock_of(&self, product_id: ProductId) -> Option<i64> {
        self.tables
            .lock()
            .await
            .products
            .get(&product_id)
            .map(|p| p.stock)
    }

    /// Returns the total number of orders stored.
    pub async fn order_count(&self) -> usize {
        self.tables.lock().await.orders.len()
    }

    /// Returns the total number of payment intents stored.
    pub async fn payment_intent_count(&self) -> usize {
        self.tables.lock().await.payment_intents.len()
    }

    /// Returns the record stored under an idempotency key.
    pub async fn idempotency_record(&self, key: &str) -> Option<IdempotencyRecord> {
        self.tables.lock().await.idempotency.get(key).cloned()
    }

    /// Overwrites an order's status, bypassing the lifecycle rules.
    ///
    /// Only meant for seeding fixtures.
    pub async fn set_order_status(&self, order_id: OrderId, status: OrderStatus) -> bool {
        self.tables.lock().await.set_status(order_id, status)
    }

    /// Makes the next conditional status update of `order_id` find the order
    /// already moved to `status`, as if another writer had committed between
    /// the caller's read and its write. The change survives a rollback.
    pub fn interleave_status_change(&self, order_id: OrderId, status: OrderStatus) {
        *self
            .faults
            .status_change
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some((order_id, status));
    }

    /// Makes every subsequent commit fail.
    pub fn set_fail_on_commit(&self, fail: bool) {
        self.faults.fail_on_commit.store(fail, Ordering::SeqCst);
    }

    /// Makes every subsequent idempotency result write fail.
    pub fn set_fail_on_idempotency_save(&self, fail: bool) {
        self.faults
            .fail_on_idempotency_save
            .store(fail, Ordering::SeqCst);
    }
}

/// Transaction handle of [`InMemoryStore`].
#[derive(Debug)]
pub struct MemoryTx {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
    faults: Arc<Faults>,
}

#[async_trait]
impl Transaction for MemoryTx {
    async fn commit(self) -> Result<()> {
        if self.faults.fail_on_commit.load(Ordering::SeqCst) {
            return Err(StoreError::Injected("commit"));
        }
        let MemoryTx {
            mut guard, working, ..
        } = self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl UnitOfWork for InMemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> Result<MemoryTx> {
        let guard = self.tables.clone().lock_owned().await;
        let working = guard.clone();
        Ok(MemoryTx {
            guard,
            working,
            faults: self.faults.clone(),
        })
    }
}

#[async_trait]
impl CartRepository for InMemoryStore {
    async fn cart_lines(&self, user_id: UserId) -> Result<Vec<CartLine>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .cart
            .values()
            .filter(|line| line.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn add_to_cart(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<CartLine> {
        let mut tables = self.tables.lock().await;
        if !tables.products.contains_key(&product_id) {
            return Err(StoreError::UnknownProduct(product_id));
        }

        let now = Utc::now();
        match tables.cart.get_mut(&(user_id, product_id)) {
            Some(line) => {
                line.quantity = line
                    .quantity
                    .checked_add(quantity)
                    .ok_or(StoreError::QuantityOverflow(product_id))?;
                line.updated_at = now;
                Ok(line.clone())
            }
            None => {
                let line = CartLine {
                    user_id,
                    product_id,
                    quantity,
                    created_at: now,
                    updated_at: now,
                };
                tables.cart.insert((user_id, product_id), line.clone());
                Ok(line)
            }
        }
    }

    async fn remove_from_cart(&self, user_id: UserId, product_id: ProductId) -> Result<bool> {
        let mut tables = self.tables.lock().await;
        Ok(tables.cart.remove(&(user_id, product_id)).is_some())
    }

    async fn clear_cart(&self, tx: &mut MemoryTx, user_id: UserId) -> Result<u64> {
        let before = tx.working.cart.len();
        tx.working.cart.retain(|(owner, _), _| *owner != user_id);
        Ok((before - tx.working.cart.len()) as u64)
    }
}

#[async_trait]
impl CatalogRepository for InMemoryStore {
    async fn list_products(&self, offset: u32, limit: u32) -> Result<Vec<Product>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .products
            .values()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn get_product(&self, product_id: ProductId) -> Result<Option<Product>> {
        Ok(self.tables.lock().await.products.get(&product_id).cloned())
    }

    async fn insert_product(&self, draft: ProductDraft) -> Result<Product> {
        let mut tables = self.tables.lock().await;
        let id = ProductId::new(
            tables
                .products
                .keys()
                .next_back()
                .map_or(1, |last| last.get() + 1),
        );
        let now = Utc::now();
        let product = Product {
            id,
            name: draft.name,
            price: draft.price,
            stock: draft.stock,
            created_at: now,
            updated_at: now,
        };
        tables.products.insert(id, product.clone());
        Ok(product)
    }

    async fn update_product(
        &self,
        product_id: ProductId,
        draft: ProductDraft,
    ) -> Result<Option<Product>> {
        let mut tables = self.tables.lock().await;
        Ok(tables.products.get_mut(&product_id).map(|product| {
            product.name = draft.name;
            product.price = draft.price;
            product.stock = draft.stock;
            product.updated_at = Utc::now();
            product.clone()
        }))
    }

    async fn prices(&self, product_ids: &[ProductId]) -> Result<HashMap<ProductId, Money>> {
        let tables = self.tables.lock().await;
        Ok(product_ids
            .iter()
            .filter_map(|id| tables.products.get(id).map(|p| (*id, p.price)))
            .collect())
    }

    async fn decrement_stock(
        &self,
        tx: &mut MemoryTx,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<bool> {
        match tx.working.products.get_mut(&product_id) {
            Some(product) if product.stock >= i64::from(quantity) => {
                product.stock -= i64::from(quantity);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl OrderRepository for InMemoryStore {
    async fn insert_order(&self, tx: &mut MemoryTx, order: NewOrder) -> Result<Order> {
        tx.working.next_order_id += 1;
        let id = OrderId::new(tx.working.next_order_id);
        let now = Utc::now();
        let header = Order {
            id,
            user_id: order.user_id,
            status: order.status,
            total_amount: order.total_amount,
            created_at: now,
            updated_at: now,
        };
        tx.working.orders.insert(
            id,
            OrderWithLines {
                order: header.clone(),
                lines: Vec::new(),
            },
        );
        Ok(header)
    }

    async fn insert_order_lines(
        &self,
        tx: &mut MemoryTx,
        order_id: OrderId,
        lines: &[OrderLine],
    ) -> Result<()> {
        let entry = tx
            .working
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| StoreError::Decode(format!("order {order_id} does not exist")))?;
        entry.lines.extend_from_slice(lines);
        Ok(())
    }

    async fn list_orders(&self, user_id: UserId, offset: u32, limit: u32) -> Result<Vec<Order>> {
        let tables = self.tables.lock().await;
        let mut orders: Vec<Order> = tables
            .orders
            .values()
            .filter(|entry| entry.order.user_id == user_id)
            .map(|entry| entry.order.clone())
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        Ok(orders
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn get_order(&self, user_id: UserId, order_id: OrderId) -> Result<Option<Order>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .orders
            .get(&order_id)
            .filter(|entry| entry.order.user_id == user_id)
            .map(|entry| entry.order.clone()))
    }

    async fn get_order_with_lines(
        &self,
        user_id: UserId,
        order_id: OrderId,
    ) -> Result<Option<OrderWithLines>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .orders
            .get(&order_id)
            .filter(|entry| entry.order.user_id == user_id)
            .cloned())
    }

    async fn order_status(&self, order_id: OrderId) -> Result<Option<OrderStatus>> {
        let tables = self.tables.lock().await;
        Ok(tables.orders.get(&order_id).map(|entry| entry.order.status))
    }

    async fn update_order_status(
        &self,
        tx: &mut MemoryTx,
        order_id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<bool> {
        if let Some(status) = tx.faults.take_status_change(order_id) {
            tx.guard.set_status(order_id, status);
            tx.working.set_status(order_id, status);
        }

        match tx.working.orders.get_mut(&order_id) {
            Some(entry) if entry.order.status == from => {
                entry.order.status = to;
                entry.order.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl IdempotencyRepository for InMemoryStore {
    async fn try_start(
        &self,
        user_id: UserId,
        key: &str,
        fingerprint: &str,
    ) -> Result<IdempotencyStart> {
        let mut tables = self.tables.lock().await;
        if let Some(existing) = tables.idempotency.get(key) {
            return Ok(IdempotencyStart::Existing(existing.clone()));
        }
        tables.idempotency.insert(
            key.to_string(),
            IdempotencyRecord {
                key: key.to_string(),
                user_id,
                fingerprint: fingerprint.to_string(),
                status_code: None,
                order_id: None,
            },
        );
        Ok(IdempotencyStart::Started)
    }

    async fn save_result(
        &self,
        tx: &mut MemoryTx,
        key: &str,
        status_code: u16,
        order_id: OrderId,
    ) -> Result<()> {
        if self.faults.fail_on_idempotency_save.load(Ordering::SeqCst) {
            return Err(StoreError::Injected("idempotency save"));
        }
        let record = tx
            .working
            .idempotency
            .get_mut(key)
            .ok_or_else(|| StoreError::MissingIdempotencyKey(key.to_string()))?;
        record.status_code = Some(status_code);
        record.order_id = Some(order_id);
        Ok(())
    }
}

#[async_trait]
impl PaymentRepository for InMemoryStore {
    async fn insert_payment_intent(
        &self,
        tx: &mut MemoryTx,
        intent: NewPaymentIntent,
    ) -> Result<PaymentIntent> {
        tx.working.next_intent_id += 1;
        let id = PaymentIntentId::new(tx.working.next_intent_id);
        let now = Utc::now();
        let stored = PaymentIntent {
            id,
            order_id: intent.order_id,
            amount: intent.amount,
            status: PaymentIntentStatus::RequiresConfirmation,
            client_secret: intent.client_secret,
            created_at: now,
            updated_at: now,
        };
        tx.working.payment_intents.insert(id, stored.clone());
        Ok(stored)
    }

    async fn pending_intent_for_update(
        &self,
        tx: &mut MemoryTx,
        order_id: OrderId,
    ) -> Result<Option<PaymentIntent>> {
        Ok(tx
            .working
            .payment_intents
            .values()
            .rev()
            .find(|intent| {
                intent.order_id == order_id
                    && intent.status == PaymentIntentStatus::RequiresConfirmation
            })
            .cloned())
    }

    async fn mark_intent_succeeded(
        &self,
        tx: &mut MemoryTx,
        intent_id: PaymentIntentId,
    ) -> Result<bool> {
        match tx.working.payment_intents.get_mut(&intent_id) {
            Some(intent) if intent.status == PaymentIntentStatus::RequiresConfirmation => {
                intent.status = PaymentIntentStatus::Succeeded;
                intent.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
