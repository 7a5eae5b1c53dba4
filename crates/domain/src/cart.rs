//! Cart maintenance.

use common::{ProductId, UserId};
use store::{CartLine, CartRepository, StoreError, Transaction, UnitOfWork, rollback_quietly};

use crate::CartError;

/// Adds, lists and removes the products a user intends to buy.
#[derive(Clone)]
pub struct CartService<S> {
    store: S,
}

impl<S: CartRepository> CartService<S> {
    /// Creates a new cart service over the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Adds `quantity` of a product, accumulating onto an existing line.
    ///
    /// A sum that does not fit in a `u32` is rejected as an invalid quantity
    /// and leaves the line as it was.
    #[tracing::instrument(skip(self))]
    pub async fn add_item(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<CartLine, CartError> {
        if quantity == 0 {
            return Err(CartError::InvalidQuantity { quantity });
        }
        match self.store.add_to_cart(user_id, product_id, quantity).await {
            Ok(line) => Ok(line),
            Err(StoreError::QuantityOverflow(_)) => {
                tracing::warn!(%product_id, quantity, "cart quantity would overflow");
                Err(CartError::InvalidQuantity { quantity })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Returns the user's cart lines.
    pub async fn items(&self, user_id: UserId) -> Result<Vec<CartLine>, CartError> {
        Ok(self.store.cart_lines(user_id).await?)
    }

    /// Removes a product from the cart. Returns false if it was not there.
    pub async fn remove_item(
        &self,
        user_id: UserId,
        product_id: ProductId,
    ) -> Result<bool, CartError> {
        Ok(self.store.remove_from_cart(user_id, product_id).await?)
    }

    /// Empties the cart, returning how many lines were removed.
    #[tracing::instrument(skip(self))]
    pub async fn clear(&self, user_id: UserId) -> Result<u64, CartError> {
        let mut tx = self.store.begin().await?;
        match self.store.clear_cart(&mut tx, user_id).await {
            Ok(removed) => {
                tx.commit().await?;
                Ok(removed)
            }
            Err(e) => {
                rollback_quietly(tx).await;
                Err(e.into())
            }
        }
    }
}
