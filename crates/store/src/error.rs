use common::ProductId;
use thiserror::Error;

/// Errors that can occur when interacting with the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A row referenced a product that does not exist.
    #[error("Unknown product: {0}")]
    UnknownProduct(ProductId),

    /// Adding to a cart line would push its quantity past `u32::MAX`.
    #[error("Cart quantity overflow for product {0}")]
    QuantityOverflow(ProductId),

    /// A column held a value outside the range the domain accepts.
    #[error("Decode error: {0}")]
    Decode(String),

    /// A result was saved against an idempotency key that was never started.
    #[error("Idempotency key not found: {0}")]
    MissingIdempotencyKey(String),

    /// A failure injected by the in-memory backend.
    #[error("Injected failure: {0}")]
    Injected(&'static str),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
