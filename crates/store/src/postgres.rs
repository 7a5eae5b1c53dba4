use std::collections::HashMap;

use async_trait::async_trait;
use common::{
    Money, OrderId, OrderStatus, PaymentIntentId, PaymentIntentStatus, ProductId, UserId,
};
use sqlx::{PgPool, Postgres, QueryBuilder, Row, postgres::PgPoolOptions, postgres::PgRow};

use crate::{
    CartLine, CartRepository, CatalogRepository, IdempotencyRecord, IdempotencyRepository,
    IdempotencyStart, NewOrder, NewPaymentIntent, Order, OrderLine, OrderRepository,
    OrderWithLines, PaymentIntent, PaymentRepository, Product, ProductDraft, Result, StoreError,
    Transaction, UnitOfWork,
};

/// PostgreSQL-backed store implementation.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects a new pool to `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Returns the product's current stock.
    pub async fn stock_of(&self, product_id: ProductId) -> Result<Option<i64>> {
        let stock = sqlx::query_scalar("SELECT stock FROM products WHERE id = $1")
            .bind(product_id.get())
            .fetch_optional(&self.pool)
            .await?;
        Ok(stock)
    }

    fn row_to_product(row: PgRow) -> Result<Product> {
        Ok(Product {
            id: ProductId::new(row.try_get("id")?),
            name: row.try_get("name")?,
            price: Money::from_cents(row.try_get("price")?),
            stock: row.try_get("stock")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_cart_line(row: PgRow) -> Result<CartLine> {
        Ok(CartLine {
            user_id: UserId::new(row.try_get("user_id")?),
            product_id: ProductId::new(row.try_get("product_id")?),
            quantity: decode_quantity(row.try_get("quantity")?)?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_order(row: PgRow) -> Result<Order> {
        let status: String = row.try_get("status")?;
        Ok(Order {
            id: OrderId::new(row.try_get("id")?),
            user_id: UserId::new(row.try_get("user_id")?),
            status: status
                .parse()
                .map_err(|e: common::ParseStatusError| StoreError::Decode(e.to_string()))?,
            total_amount: Money::from_cents(row.try_get("total_amount")?),
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_order_line(row: PgRow) -> Result<OrderLine> {
        Ok(OrderLine {
            product_id: ProductId::new(row.try_get("product_id")?),
            quantity: decode_quantity(row.try_get("quantity")?)?,
            unit_price: Money::from_cents(row.try_get("price")?),
        })
    }

    fn row_to_idempotency_record(row: PgRow) -> Result<IdempotencyRecord> {
        let status_code = row
            .try_get::<Option<i32>, _>("status_code")?
            .map(|code| {
                u16::try_from(code)
                    .map_err(|_| StoreError::Decode(format!("status code out of range: {code}")))
            })
            .transpose()?;
        Ok(IdempotencyRecord {
            key: row.try_get("key")?,
            user_id: UserId::new(row.try_get("user_id")?),
            fingerprint: row.try_get("request_hash")?,
            status_code,
            order_id: row.try_get::<Option<i64>, _>("order_id")?.map(OrderId::new),
        })
    }

    fn row_to_payment_intent(row: PgRow) -> Result<PaymentIntent> {
        let status: String = row.try_get("status")?;
        Ok(PaymentIntent {
            id: PaymentIntentId::new(row.try_get("id")?),
            order_id: OrderId::new(row.try_get("order_id")?),
            amount: Money::from_cents(row.try_get("amount")?),
            status: status
                .parse()
                .map_err(|e: common::ParseStatusError| StoreError::Decode(e.to_string()))?,
            client_secret: row.try_get("client_secret")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

fn decode_quantity(value: i64) -> Result<u32> {
    u32::try_from(value).map_err(|_| StoreError::Decode(format!("quantity out of range: {value}")))
}

/// Transaction handle of [`PostgresStore`].
///
/// Dropping it without committing rolls the transaction back.
pub struct PgTx(sqlx::Transaction<'static, Postgres>);

#[async_trait]
impl Transaction for PgTx {
    async fn commit(self) -> Result<()> {
        self.0.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        self.0.rollback().await?;
        Ok(())
    }
}

#[async_trait]
impl UnitOfWork for PostgresStore {
    type Tx = PgTx;

    async fn begin(&self) -> Result<PgTx> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL READ COMMITTED")
            .execute(&mut *tx)
            .await?;
        Ok(PgTx(tx))
    }
}

#[async_trait]
impl CartRepository for PostgresStore {
    async fn cart_lines(&self, user_id: UserId) -> Result<Vec<CartLine>> {
        let rows = sqlx::query(
            r#"
            SELECT user_id, product_id, quantity, created_at, updated_at
            FROM cart_items
            WHERE user_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(user_id.get())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_cart_line).collect()
    }

    async fn add_to_cart(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<CartLine> {
        let row = sqlx::query(
            r#"
            INSERT INTO cart_items (user_id, product_id, quantity)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, product_id)
            DO UPDATE SET quantity = cart_items.quantity + EXCLUDED.quantity, updated_at = NOW()
            WHERE cart_items.quantity + EXCLUDED.quantity <= $4
            RETURNING user_id, product_id, quantity, created_at, updated_at
            "#,
        )
        .bind(user_id.get())
        .bind(product_id.get())
        .bind(i64::from(quantity))
        .bind(i64::from(u32::MAX))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_foreign_key_violation()
            {
                return StoreError::UnknownProduct(product_id);
            }
            StoreError::Database(e)
        })?;

        // The conflict branch returns no row when its WHERE rejects the sum.
        let row = row.ok_or(StoreError::QuantityOverflow(product_id))?;
        Self::row_to_cart_line(row)
    }

    async fn remove_from_cart(&self, user_id: UserId, product_id: ProductId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM cart_items WHERE user_id = $1 AND product_id = $2")
            .bind(user_id.get())
            .bind(product_id.get())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn clear_cart(&self, tx: &mut PgTx, user_id: UserId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM cart_items WHERE user_id = $1")
            .bind(user_id.get())
            .execute(&mut *tx.0)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl CatalogRepository for PostgresStore {
    async fn list_products(&self, offset: u32, limit: u32) -> Result<Vec<Product>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, price, stock, created_at, updated_at
            FROM products
            ORDER BY id ASC
            OFFSET $1 LIMIT $2
            "#,
        )
        .bind(i64::from(offset))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_product).collect()
    }

    async fn get_product(&self, product_id: ProductId) -> Result<Option<Product>> {
        sqlx::query(
            "SELECT id, name, price, stock, created_at, updated_at FROM products WHERE id = $1",
        )
        .bind(product_id.get())
        .fetch_optional(&self.pool)
        .await?
        .map(Self::row_to_product)
        .transpose()
    }

    async fn insert_product(&self, draft: ProductDraft) -> Result<Product> {
        let row = sqlx::query(
            r#"
            INSERT INTO products (name, price, stock)
            VALUES ($1, $2, $3)
            RETURNING id, name, price, stock, created_at, updated_at
            "#,
        )
        .bind(draft.name)
        .bind(draft.price.cents())
        .bind(draft.stock)
        .fetch_one(&self.pool)
        .await?;

        Self::row_to_product(row)
    }

    async fn update_product(
        &self,
        product_id: ProductId,
        draft: ProductDraft,
    ) -> Result<Option<Product>> {
        sqlx::query(
            r#"
            UPDATE products SET name = $2, price = $3, stock = $4, updated_at = NOW()
            WHERE id = $1
            RETURNING id, name, price, stock, created_at, updated_at
            "#,
        )
        .bind(product_id.get())
        .bind(draft.name)
        .bind(draft.price.cents())
        .bind(draft.stock)
        .fetch_optional(&self.pool)
        .await?
        .map(Self::row_to_product)
        .transpose()
    }

    async fn prices(&self, product_ids: &[ProductId]) -> Result<HashMap<ProductId, Money>> {
        let ids: Vec<i64> = product_ids.iter().map(ProductId::get).collect();
        let rows = sqlx::query("SELECT id, price FROM products WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|row| {
                Ok((
                    ProductId::new(row.try_get("id")?),
                    Money::from_cents(row.try_get("price")?),
                ))
            })
            .collect()
    }

    #[tracing::instrument(skip(self, tx))]
    async fn decrement_stock(
        &self,
        tx: &mut PgTx,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE products SET stock = stock - $1, updated_at = NOW() WHERE id = $2 AND stock >= $1",
        )
        .bind(i64::from(quantity))
        .bind(product_id.get())
        .execute(&mut *tx.0)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl OrderRepository for PostgresStore {
    async fn insert_order(&self, tx: &mut PgTx, order: NewOrder) -> Result<Order> {
        let row = sqlx::query(
            r#"
            INSERT INTO orders (user_id, status, total_amount)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, status, total_amount, created_at, updated_at
            "#,
        )
        .bind(order.user_id.get())
        .bind(order.status.as_str())
        .bind(order.total_amount.cents())
        .fetch_one(&mut *tx.0)
        .await?;

        Self::row_to_order(row)
    }

    async fn insert_order_lines(
        &self,
        tx: &mut PgTx,
        order_id: OrderId,
        lines: &[OrderLine],
    ) -> Result<()> {
        if lines.is_empty() {
            return Ok(());
        }

        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new("INSERT INTO order_items (order_id, product_id, quantity, price) ");
        builder.push_values(lines, |mut b, line| {
            b.push_bind(order_id.get())
                .push_bind(line.product_id.get())
                .push_bind(i64::from(line.quantity))
                .push_bind(line.unit_price.cents());
        });
        builder.build().execute(&mut *tx.0).await?;
        Ok(())
    }

    async fn list_orders(&self, user_id: UserId, offset: u32, limit: u32) -> Result<Vec<Order>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, status, total_amount, created_at, updated_at
            FROM orders
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            OFFSET $2 LIMIT $3
            "#,
        )
        .bind(user_id.get())
        .bind(i64::from(offset))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_order).collect()
    }

    async fn get_order(&self, user_id: UserId, order_id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, status, total_amount, created_at, updated_at
            FROM orders
            WHERE id = $1 AND user_id = $2
            "#,
        )
        .bind(order_id.get())
        .bind(user_id.get())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_order).transpose()
    }

    async fn get_order_with_lines(
        &self,
        user_id: UserId,
        order_id: OrderId,
    ) -> Result<Option<OrderWithLines>> {
        let Some(order) = self.get_order(user_id, order_id).await? else {
            return Ok(None);
        };

        let rows = sqlx::query(
            r#"
            SELECT product_id, quantity, price
            FROM order_items
            WHERE order_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(order_id.get())
        .fetch_all(&self.pool)
        .await?;

        let lines = rows
            .into_iter()
            .map(Self::row_to_order_line)
            .collect::<Result<Vec<_>>>()?;
        Ok(Some(OrderWithLines { order, lines }))
    }

    async fn order_status(&self, order_id: OrderId) -> Result<Option<OrderStatus>> {
        let status: Option<String> = sqlx::query_scalar("SELECT status FROM orders WHERE id = $1")
            .bind(order_id.get())
            .fetch_optional(&self.pool)
            .await?;

        status
            .map(|s| {
                s.parse()
                    .map_err(|e: common::ParseStatusError| StoreError::Decode(e.to_string()))
            })
            .transpose()
    }

    async fn update_order_status(
        &self,
        tx: &mut PgTx,
        order_id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE orders SET status = $1, updated_at = NOW() WHERE id = $2 AND status = $3",
        )
        .bind(to.as_str())
        .bind(order_id.get())
        .bind(from.as_str())
        .execute(&mut *tx.0)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl IdempotencyRepository for PostgresStore {
    #[tracing::instrument(skip(self, fingerprint))]
    async fn try_start(
        &self,
        user_id: UserId,
        key: &str,
        fingerprint: &str,
    ) -> Result<IdempotencyStart> {
        let inserted: Option<String> = sqlx::query_scalar(
            r#"
            INSERT INTO idempotency_keys (key, user_id, request_hash)
            VALUES ($1, $2, $3)
            ON CONFLICT (key) DO NOTHING
            RETURNING key
            "#,
        )
        .bind(key)
        .bind(user_id.get())
        .bind(fingerprint)
        .fetch_optional(&self.pool)
        .await?;

        if inserted.is_some() {
            return Ok(IdempotencyStart::Started);
        }

        let row = sqlx::query(
            r#"
            SELECT key, user_id, request_hash, status_code, order_id
            FROM idempotency_keys
            WHERE key = $1
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::MissingIdempotencyKey(key.to_string()))?;

        Ok(IdempotencyStart::Existing(Self::row_to_idempotency_record(
            row,
        )?))
    }

    async fn save_result(
        &self,
        tx: &mut PgTx,
        key: &str,
        status_code: u16,
        order_id: OrderId,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE idempotency_keys SET status_code = $1, order_id = $2 WHERE key = $3",
        )
        .bind(i32::from(status_code))
        .bind(order_id.get())
        .bind(key)
        .execute(&mut *tx.0)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::MissingIdempotencyKey(key.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl PaymentRepository for PostgresStore {
    async fn insert_payment_intent(
        &self,
        tx: &mut PgTx,
        intent: NewPaymentIntent,
    ) -> Result<PaymentIntent> {
        let row = sqlx::query(
            r#"
            INSERT INTO payment_intents (order_id, amount, status, client_secret)
            VALUES ($1, $2, $3, $4)
            RETURNING id, order_id, amount, status, client_secret, created_at, updated_at
            "#,
        )
        .bind(intent.order_id.get())
        .bind(intent.amount.cents())
        .bind(PaymentIntentStatus::RequiresConfirmation.as_str())
        .bind(&intent.client_secret)
        .fetch_one(&mut *tx.0)
        .await?;

        Self::row_to_payment_intent(row)
    }

    async fn pending_intent_for_update(
        &self,
        tx: &mut PgTx,
        order_id: OrderId,
    ) -> Result<Option<PaymentIntent>> {
        let row = sqlx::query(
            r#"
            SELECT id, order_id, amount, status, client_secret, created_at, updated_at
            FROM payment_intents
            WHERE order_id = $1 AND status = $2
            ORDER BY id DESC
            LIMIT 1
            FOR UPDATE
            "#,
        )
        .bind(order_id.get())
        .bind(PaymentIntentStatus::RequiresConfirmation.as_str())
        .fetch_optional(&mut *tx.0)
        .await?;

        row.map(Self::row_to_payment_intent).transpose()
    }

    async fn mark_intent_succeeded(
        &self,
        tx: &mut PgTx,
        intent_id: PaymentIntentId,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE payment_intents SET status = $1, updated_at = NOW() WHERE id = $2 AND status = $3",
        )
        .bind(PaymentIntentStatus::Succeeded.as_str())
        .bind(intent_id.get())
        .bind(PaymentIntentStatus::RequiresConfirmation.as_str())
        .execute(&mut *tx.0)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}
