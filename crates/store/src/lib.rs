//! Persistence layer for the marketplace.
//!
//! Every collaborator the order and payment workflows need is an async trait
//! in [`repository`]. They all extend [`UnitOfWork`], so one backend hands out
//! a single transaction type that is threaded explicitly through every
//! mutating call. Two backends are provided: [`PostgresStore`] for production
//! and [`InMemoryStore`] for tests and local runs.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod records;
pub mod repository;
pub mod tx;

pub use error::{Result, StoreError};
pub use memory::{InMemoryStore, MemoryTx};
pub use postgres::{PgTx, PostgresStore};
pub use records::{
    CartLine, IdempotencyRecord, IdempotencyStart, NewOrder, NewPaymentIntent, Order, OrderLine,
    OrderWithLines, PaymentIntent, Product, ProductDraft,
};
pub use repository::{
    CartRepository, CatalogRepository, IdempotencyRepository, OrderRepository, PaymentRepository,
    Store,
};
pub use tx::{Transaction, UnitOfWork, rollback_quietly};
