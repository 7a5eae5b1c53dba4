//! The intent/confirm handshake.

use common::{OrderId, OrderStatus, PaymentIntentStatus, UserId};
use store::{
    NewPaymentIntent, Order, OrderRepository, PaymentIntent, PaymentRepository, Transaction,
    UnitOfWork, rollback_quietly,
};

use crate::{PaymentError, Result, secret};

/// Creates and confirms payment intents.
#[derive(Clone)]
pub struct PaymentWorkflow<S> {
    store: S,
}

impl<S> PaymentWorkflow<S>
where
    S: OrderRepository + PaymentRepository,
{
    /// Creates a new payment workflow over the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Opens a payment intent for one of the user's `new` orders.
    ///
    /// The order moves to `awaiting_payment` in the same transaction that
    /// stores the intent. The returned intent carries the client secret.
    #[tracing::instrument(skip(self))]
    pub async fn create_intent(&self, user_id: UserId, order_id: OrderId) -> Result<PaymentIntent> {
        let order = self.owned_order(user_id, order_id).await?;
        if order.status != OrderStatus::New {
            return Err(PaymentError::NotPayable {
                order_id,
                status: order.status,
            });
        }

        let client_secret = secret::generate();

        let mut tx = self.store.begin().await?;
        match self.open_intent(&mut tx, &order, client_secret).await {
            Ok(Some(intent)) => {
                tx.commit().await?;
                metrics::counter!("payment_intents_created_total").increment(1);
                tracing::info!(%order_id, intent_id = %intent.id, "payment intent created");
                Ok(intent)
            }
            Ok(None) => {
                rollback_quietly(tx).await;
                let status = self
                    .store
                    .order_status(order_id)
                    .await?
                    .unwrap_or(order.status);
                tracing::warn!(%order_id, %status, "order left new status before intent creation");
                Err(PaymentError::NotPayable { order_id, status })
            }
            Err(e) => {
                rollback_quietly(tx).await;
                Err(e.into())
            }
        }
    }

    /// Confirms the order's pending intent with the client secret.
    ///
    /// On success the intent is `succeeded` and the order `paid`. Any
    /// mismatch leaves both untouched and returns
    /// [`PaymentError::ConfirmationFailed`].
    #[tracing::instrument(skip(self, client_secret))]
    pub async fn confirm(
        &self,
        user_id: UserId,
        order_id: OrderId,
        client_secret: &str,
    ) -> Result<PaymentIntent> {
        self.owned_order(user_id, order_id).await?;

        let mut tx = self.store.begin().await?;
        match self.settle(&mut tx, order_id, client_secret).await {
            Ok(Some(intent)) => {
                tx.commit().await?;
                metrics::counter!("payments_confirmed_total").increment(1);
                tracing::info!(%order_id, intent_id = %intent.id, "payment confirmed");
                Ok(intent)
            }
            Ok(None) => {
                rollback_quietly(tx).await;
                metrics::counter!("payment_confirmations_failed_total").increment(1);
                tracing::warn!(%order_id, "payment confirmation rejected");
                Err(PaymentError::ConfirmationFailed)
            }
            Err(e) => {
                rollback_quietly(tx).await;
                metrics::counter!("payment_confirmations_failed_total").increment(1);
                Err(e.into())
            }
        }
    }

    async fn owned_order(&self, user_id: UserId, order_id: OrderId) -> Result<Order> {
        self.store
            .get_order(user_id, order_id)
            .await?
            .ok_or(PaymentError::OrderNotFound(order_id))
    }

    /// Returns `None` if the order was no longer `new`.
    async fn open_intent(
        &self,
        tx: &mut <S as UnitOfWork>::Tx,
        order: &Order,
        client_secret: String,
    ) -> store::Result<Option<PaymentIntent>> {
        if !self
            .store
            .update_order_status(tx, order.id, OrderStatus::New, OrderStatus::AwaitingPayment)
            .await?
        {
            return Ok(None);
        }

        let intent = self
            .store
            .insert_payment_intent(
                tx,
                NewPaymentIntent {
                    order_id: order.id,
                    amount: order.total_amount,
                    client_secret,
                },
            )
            .await?;
        Ok(Some(intent))
    }

    /// Returns `None` if any step of the confirmation did not apply.
    async fn settle(
        &self,
        tx: &mut <S as UnitOfWork>::Tx,
        order_id: OrderId,
        client_secret: &str,
    ) -> store::Result<Option<PaymentIntent>> {
        let Some(mut intent) = self.store.pending_intent_for_update(tx, order_id).await? else {
            return Ok(None);
        };
        if !secret::matches(&intent.client_secret, client_secret) {
            return Ok(None);
        }
        if !self.store.mark_intent_succeeded(tx, intent.id).await? {
            return Ok(None);
        }
        if !self
            .store
            .update_order_status(tx, order_id, OrderStatus::AwaitingPayment, OrderStatus::Paid)
            .await?
        {
            return Ok(None);
        }

        intent.status = PaymentIntentStatus::Succeeded;
        Ok(Some(intent))
    }
}
