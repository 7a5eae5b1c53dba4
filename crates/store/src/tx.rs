//! Transaction handles.

use async_trait::async_trait;

use crate::Result;

/// An open database transaction.
///
/// `commit` and `rollback` consume the handle. Dropping a handle that was
/// neither committed nor rolled back discards its writes, which is what
/// happens when a request future is cancelled mid-transaction.
#[async_trait]
pub trait Transaction: Send + Sized + 'static {
    /// Makes every write performed through this handle visible atomically.
    async fn commit(self) -> Result<()>;

    /// Discards every write performed through this handle.
    async fn rollback(self) -> Result<()>;
}

/// A backend that can open transactions with at least read-committed isolation.
///
/// All repository traits extend this one, so a backend implementing several
/// of them shares a single [`UnitOfWork::Tx`] type across all of them.
#[async_trait]
pub trait UnitOfWork: Send + Sync {
    /// The transaction handle type of this backend.
    type Tx: Transaction;

    /// Opens a new transaction.
    async fn begin(&self) -> Result<Self::Tx>;
}

/// Rolls `tx` back, logging instead of returning a failure.
///
/// Used on error paths, where the error that caused the rollback is the one
/// worth reporting.
pub async fn rollback_quietly<T: Transaction>(tx: T) {
    if let Err(e) = tx.rollback().await {
        tracing::warn!(error = %e, "transaction rollback failed");
    }
}
