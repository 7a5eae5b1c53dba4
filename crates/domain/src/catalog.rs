//! Catalog maintenance.

use common::{Money, ProductId};
use store::{CatalogRepository, Product, ProductDraft};

use crate::{CatalogError, MAX_PAGE_SIZE};

/// Shortest accepted product name, in characters.
pub const MIN_NAME_LEN: usize = 2;

/// Longest accepted product name, in characters.
pub const MAX_NAME_LEN: usize = 200;

/// Lists products and lets operators create, reprice and restock them.
#[derive(Clone)]
pub struct CatalogService<S> {
    store: S,
}

impl<S: CatalogRepository> CatalogService<S> {
    /// Creates a new catalog service over the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns products ordered by id. `limit` is clamped to `1..=MAX_PAGE_SIZE`.
    pub async fn list_products(
        &self,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<Product>, CatalogError> {
        let limit = limit.clamp(1, MAX_PAGE_SIZE);
        Ok(self.store.list_products(offset, limit).await?)
    }

    /// Returns one product.
    pub async fn get_product(&self, product_id: ProductId) -> Result<Product, CatalogError> {
        self.store
            .get_product(product_id)
            .await?
            .ok_or(CatalogError::NotFound { product_id })
    }

    /// Adds a product to the catalog.
    #[tracing::instrument(skip(self, draft), fields(name = %draft.name))]
    pub async fn create_product(&self, draft: ProductDraft) -> Result<Product, CatalogError> {
        let draft = validate(draft)?;
        let product = self.store.insert_product(draft).await?;
        tracing::info!(product_id = %product.id, "product created");
        Ok(product)
    }

    /// Replaces a product's name, price and stock.
    ///
    /// Orders already placed keep the price they captured.
    #[tracing::instrument(skip(self, draft))]
    pub async fn update_product(
        &self,
        product_id: ProductId,
        draft: ProductDraft,
    ) -> Result<Product, CatalogError> {
        let draft = validate(draft)?;
        let product = self
            .store
            .update_product(product_id, draft)
            .await?
            .ok_or(CatalogError::NotFound { product_id })?;
        tracing::info!(%product_id, price = %product.price, stock = product.stock, "product updated");
        Ok(product)
    }
}

fn validate(mut draft: ProductDraft) -> Result<ProductDraft, CatalogError> {
    draft.name = draft.name.trim().to_string();
    let name_len = draft.name.chars().count();
    if !(MIN_NAME_LEN..=MAX_NAME_LEN).contains(&name_len) {
        return Err(CatalogError::InvalidName {
            min: MIN_NAME_LEN,
            max: MAX_NAME_LEN,
        });
    }
    if draft.price <= Money::zero() {
        return Err(CatalogError::InvalidPrice { price: draft.price });
    }
    if draft.stock < 0 {
        return Err(CatalogError::InvalidStock { stock: draft.stock });
    }
    Ok(draft)
}

#[cfg(test)]
mod tests {
    use super::*;
    use store::InMemoryStore;

    fn draft(name: &str, cents: i64, stock: i64) -> ProductDraft {
        ProductDraft {
            name: name.to_string(),
            price: Money::from_cents(cents),
            stock,
        }
    }

    #[tokio::test]
    async fn test_create_then_restock() {
        let catalog = CatalogService::new(InMemoryStore::new());

        let created = catalog
            .create_product(draft("  Lamp  ", 4500, 2))
            .await
            .unwrap();
        let updated = catalog
            .update_product(created.id, draft("Lamp", 4000, 12))
            .await
            .unwrap();

        assert_eq!(created.name, "Lamp");
        assert_eq!(updated.price, Money::from_cents(4000));
        assert_eq!(catalog.get_product(created.id).await.unwrap().stock, 12);
        assert_eq!(catalog.list_products(0, 0).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_drafts_rejected() {
        let catalog = CatalogService::new(InMemoryStore::new());

        assert!(matches!(
            catalog.create_product(draft("x", 100, 1)).await,
            Err(CatalogError::InvalidName { .. })
        ));
        assert!(matches!(
            catalog.create_product(draft(&"x".repeat(201), 100, 1)).await,
            Err(CatalogError::InvalidName { .. })
        ));
        assert!(matches!(
            catalog.create_product(draft("Lamp", 0, 1)).await,
            Err(CatalogError::InvalidPrice { .. })
        ));
        assert!(matches!(
            catalog.create_product(draft("Lamp", 100, -1)).await,
            Err(CatalogError::InvalidStock { stock: -1 })
        ));
        assert!(catalog.list_products(0, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_product_not_found() {
        let catalog = CatalogService::new(InMemoryStore::new());

        let result = catalog
            .update_product(ProductId::new(9), draft("Lamp", 100, 1))
            .await;

        assert!(matches!(result, Err(CatalogError::NotFound { product_id }) if product_id.get() == 9));
        assert!(matches!(
            catalog.get_product(ProductId::new(9)).await,
            Err(CatalogError::NotFound { .. })
        ));
    }
}
