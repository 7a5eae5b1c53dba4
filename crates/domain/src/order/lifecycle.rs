//! Fulfillment transitions performed by operators.

use common::{OrderId, OrderStatus};
use store::{
    CartRepository, CatalogRepository, IdempotencyRepository, OrderRepository, Transaction,
    UnitOfWork, rollback_quietly,
};

use super::{OrderWorkflow, state};
use crate::OrderError;

impl<S> OrderWorkflow<S>
where
    S: CartRepository + CatalogRepository + OrderRepository + IdempotencyRepository,
{
    /// Marks a paid order as shipped.
    pub async fn ship(&self, order_id: OrderId) -> Result<OrderStatus, OrderError> {
        self.transition(order_id, OrderStatus::Shipped).await
    }

    /// Marks a shipped order as delivered.
    pub async fn deliver(&self, order_id: OrderId) -> Result<OrderStatus, OrderError> {
        self.transition(order_id, OrderStatus::Delivered).await
    }

    /// Cancels an order that has not shipped yet.
    pub async fn cancel(&self, order_id: OrderId) -> Result<OrderStatus, OrderError> {
        self.transition(order_id, OrderStatus::Cancelled).await
    }

    /// Moves an order to `to` if the lifecycle allows it from its current status.
    ///
    /// The write only applies if the status is still the one that was
    /// validated; otherwise [`OrderError::StaleStatus`] is returned.
    #[tracing::instrument(skip(self))]
    pub async fn transition(
        &self,
        order_id: OrderId,
        to: OrderStatus,
    ) -> Result<OrderStatus, OrderError> {
        let from = self
            .store
            .order_status(order_id)
            .await?
            .ok_or(OrderError::NotFound { order_id })?;

        state::check_transition(from, to)?;
        if from == to {
            return Ok(to);
        }

        let mut tx = self.store.begin().await?;
        let applied = match self
            .store
            .update_order_status(&mut tx, order_id, from, to)
            .await
        {
            Ok(applied) => applied,
            Err(e) => {
                rollback_quietly(tx).await;
                return Err(e.into());
            }
        };

        if !applied {
            rollback_quietly(tx).await;
            tracing::warn!(%order_id, expected = %from, "order status changed concurrently");
            return Err(OrderError::StaleStatus {
                order_id,
                expected: from,
            });
        }

        tx.commit().await?;

        metrics::counter!("order_status_transitions_total", "to" => to.as_str()).increment(1);
        tracing::info!(%order_id, %from, %to, "order status changed");
        Ok(to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{Money, ProductId, UserId};
    use store::InMemoryStore;

    async fn order_in(status: OrderStatus) -> (OrderWorkflow<InMemoryStore>, OrderId) {
        let store = InMemoryStore::new();
        store
            .upsert_product(ProductId::new(1), Money::from_cents(500), 5)
            .await;
        store
            .add_to_cart(UserId::new(1), ProductId::new(1), 1)
            .await
            .unwrap();
        let workflow = OrderWorkflow::new(store);
        let order_id = workflow
            .create_from_cart(UserId::new(1), None)
            .await
            .unwrap();
        workflow.store().set_order_status(order_id, status).await;
        (workflow, order_id)
    }

    #[tokio::test]
    async fn test_ship_paid_order() {
        let (workflow, order_id) = order_in(OrderStatus::Paid).await;

        assert_eq!(workflow.ship(order_id).await.unwrap(), OrderStatus::Shipped);
        assert_eq!(
            workflow.store().order_status(order_id).await.unwrap(),
            Some(OrderStatus::Shipped)
        );
    }

    #[tokio::test]
    async fn test_deliver_requires_shipped() {
        let (workflow, order_id) = order_in(OrderStatus::Paid).await;

        let result = workflow.deliver(order_id).await;

        assert!(matches!(
            result,
            Err(OrderError::InvalidStatusTransition {
                from: OrderStatus::Paid,
                to: OrderStatus::Delivered
            })
        ));
    }

    #[tokio::test]
    async fn test_same_status_is_noop() {
        let (workflow, order_id) = order_in(OrderStatus::Cancelled).await;

        assert_eq!(
            workflow.cancel(order_id).await.unwrap(),
            OrderStatus::Cancelled
        );
    }

    #[tokio::test]
    async fn test_unknown_order_not_found() {
        let (workflow, _) = order_in(OrderStatus::New).await;

        let result = workflow.ship(OrderId::new(999)).await;

        assert!(matches!(result, Err(OrderError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_failed_commit_is_persistence_error() {
        let (workflow, order_id) = order_in(OrderStatus::New).await;
        workflow.store().set_fail_on_commit(true);

        let result = workflow.cancel(order_id).await;

        assert!(matches!(result, Err(OrderError::Persistence(_))));
        workflow.store().set_fail_on_commit(false);
        assert_eq!(
            workflow.store().order_status(order_id).await.unwrap(),
            Some(OrderStatus::New)
        );
    }
}
