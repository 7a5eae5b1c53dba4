//! Shared application state.

use std::sync::Arc;

use domain::{CartService, CatalogService, OrderWorkflow};
use payment::PaymentWorkflow;
use store::Store;

/// Shared application state accessible from all handlers.
pub struct AppState<S: Store> {
    pub orders: OrderWorkflow<S>,
    pub cart: CartService<S>,
    pub catalog: CatalogService<S>,
    pub payments: PaymentWorkflow<S>,
    pub store: S,
}

impl<S: Store> AppState<S> {
    /// Wires every workflow to the same store.
    pub fn new(store: S) -> Arc<Self> {
        Arc::new(Self {
            orders: OrderWorkflow::new(store.clone()),
            cart: CartService::new(store.clone()),
            catalog: CatalogService::new(store.clone()),
            payments: PaymentWorkflow::new(store.clone()),
            store,
        })
    }
}
