//! Integration tests for the payment handshake.
//!
//! Orders are created through the order workflow so every test starts from
//! a realistic `new` order.

use common::{Money, OrderId, OrderStatus, PaymentIntentStatus, ProductId, UserId};
use domain::OrderWorkflow;
use payment::{PaymentError, PaymentWorkflow};
use store::{CartRepository, InMemoryStore, OrderRepository, PaymentRepository, UnitOfWork};

const USER: UserId = UserId::new(1);

async fn setup() -> (InMemoryStore, PaymentWorkflow<InMemoryStore>, OrderId) {
    let store = InMemoryStore::new();
    store
        .upsert_product(ProductId::new(1), Money::from_cents(1000), 10)
        .await;
    store
        .upsert_product(ProductId::new(2), Money::from_cents(2000), 10)
        .await;
    store
        .add_to_cart(USER, ProductId::new(1), 2)
        .await
        .unwrap();
    store
        .add_to_cart(USER, ProductId::new(2), 1)
        .await
        .unwrap();

    let order_id = OrderWorkflow::new(store.clone())
        .create_from_cart(USER, None)
        .await
        .unwrap();

    (store.clone(), PaymentWorkflow::new(store), order_id)
}

async fn status_of(store: &InMemoryStore, order_id: OrderId) -> OrderStatus {
    store.order_status(order_id).await.unwrap().unwrap()
}

#[tokio::test]
async fn full_handshake_marks_order_paid() {
    let (store, payments, order_id) = setup().await;

    let intent = payments.create_intent(USER, order_id).await.unwrap();
    assert_eq!(intent.amount, Money::from_cents(4000));

    let confirmed = payments
        .confirm(USER, order_id, &intent.client_secret)
        .await
        .unwrap();

    assert_eq!(confirmed.id, intent.id);
    assert_eq!(confirmed.status, PaymentIntentStatus::Succeeded);
    assert_eq!(status_of(&store, order_id).await, OrderStatus::Paid);
}

#[tokio::test]
async fn paid_order_can_be_shipped() {
    let (store, payments, order_id) = setup().await;
    let intent = payments.create_intent(USER, order_id).await.unwrap();
    payments
        .confirm(USER, order_id, &intent.client_secret)
        .await
        .unwrap();

    let orders = OrderWorkflow::new(store.clone());
    orders.ship(order_id).await.unwrap();

    assert_eq!(status_of(&store, order_id).await, OrderStatus::Shipped);
}

#[tokio::test]
async fn create_intent_on_paid_order_fails() {
    let (store, payments, order_id) = setup().await;
    store.set_order_status(order_id, OrderStatus::Paid).await;

    let result = payments.create_intent(USER, order_id).await;

    assert!(matches!(
        result,
        Err(PaymentError::NotPayable {
            status: OrderStatus::Paid,
            ..
        })
    ));
    assert_eq!(store.payment_intent_count().await, 0);
    assert_eq!(status_of(&store, order_id).await, OrderStatus::Paid);
}

#[tokio::test]
async fn second_intent_for_same_order_fails() {
    let (store, payments, order_id) = setup().await;
    payments.create_intent(USER, order_id).await.unwrap();

    let result = payments.create_intent(USER, order_id).await;

    assert!(matches!(
        result,
        Err(PaymentError::NotPayable {
            status: OrderStatus::AwaitingPayment,
            ..
        })
    ));
    assert_eq!(store.payment_intent_count().await, 1);
}

#[tokio::test]
async fn create_intent_reports_status_changed_after_check() {
    let (store, payments, order_id) = setup().await;
    store.interleave_status_change(order_id, OrderStatus::Cancelled);

    let result = payments.create_intent(USER, order_id).await;

    assert!(matches!(
        result,
        Err(PaymentError::NotPayable {
            status: OrderStatus::Cancelled,
            ..
        })
    ));
    assert_eq!(store.payment_intent_count().await, 0);
    assert_eq!(status_of(&store, order_id).await, OrderStatus::Cancelled);
}

#[tokio::test]
async fn confirm_after_concurrent_cancel_changes_nothing() {
    let (store, payments, order_id) = setup().await;
    let intent = payments.create_intent(USER, order_id).await.unwrap();
    store.interleave_status_change(order_id, OrderStatus::Cancelled);

    let result = payments
        .confirm(USER, order_id, &intent.client_secret)
        .await;

    assert!(matches!(result, Err(PaymentError::ConfirmationFailed)));
    assert_eq!(status_of(&store, order_id).await, OrderStatus::Cancelled);

    let mut tx = store.begin().await.unwrap();
    let pending = store
        .pending_intent_for_update(&mut tx, order_id)
        .await
        .unwrap();
    assert_eq!(pending.map(|i| i.id), Some(intent.id));
}

#[tokio::test]
async fn confirm_without_intent_fails() {
    let (store, payments, order_id) = setup().await;

    let result = payments.confirm(USER, order_id, "anything").await;

    assert!(matches!(result, Err(PaymentError::ConfirmationFailed)));
    assert_eq!(status_of(&store, order_id).await, OrderStatus::New);
}

#[tokio::test]
async fn confirm_twice_fails_second_time() {
    let (store, payments, order_id) = setup().await;
    let intent = payments.create_intent(USER, order_id).await.unwrap();
    payments
        .confirm(USER, order_id, &intent.client_secret)
        .await
        .unwrap();

    let result = payments
        .confirm(USER, order_id, &intent.client_secret)
        .await;

    assert!(matches!(result, Err(PaymentError::ConfirmationFailed)));
    assert_eq!(status_of(&store, order_id).await, OrderStatus::Paid);
}

#[tokio::test]
async fn confirm_after_cancellation_leaves_intent_pending() {
    let (store, payments, order_id) = setup().await;
    let intent = payments.create_intent(USER, order_id).await.unwrap();
    OrderWorkflow::new(store.clone())
        .cancel(order_id)
        .await
        .unwrap();

    let result = payments
        .confirm(USER, order_id, &intent.client_secret)
        .await;

    // The intent update applied but the order was no longer awaiting
    // payment, so the whole confirmation rolled back.
    assert!(matches!(result, Err(PaymentError::ConfirmationFailed)));
    assert_eq!(status_of(&store, order_id).await, OrderStatus::Cancelled);
    store.set_order_status(order_id, OrderStatus::AwaitingPayment).await;
    let retried = payments
        .confirm(USER, order_id, &intent.client_secret)
        .await;
    assert!(retried.is_ok());
}

#[tokio::test]
async fn confirm_is_atomic_on_commit_failure() {
    let (store, payments, order_id) = setup().await;
    let intent = payments.create_intent(USER, order_id).await.unwrap();
    store.set_fail_on_commit(true);

    let result = payments
        .confirm(USER, order_id, &intent.client_secret)
        .await;

    assert!(matches!(result, Err(PaymentError::Persistence(_))));
    store.set_fail_on_commit(false);
    assert_eq!(
        status_of(&store, order_id).await,
        OrderStatus::AwaitingPayment
    );
    let retried = payments
        .confirm(USER, order_id, &intent.client_secret)
        .await
        .unwrap();
    assert_eq!(retried.status, PaymentIntentStatus::Succeeded);
}

#[tokio::test]
async fn confirm_requires_ownership() {
    let (store, payments, order_id) = setup().await;
    let intent = payments.create_intent(USER, order_id).await.unwrap();

    let result = payments
        .confirm(UserId::new(2), order_id, &intent.client_secret)
        .await;

    assert!(matches!(result, Err(PaymentError::OrderNotFound(_))));
    assert_eq!(
        status_of(&store, order_id).await,
        OrderStatus::AwaitingPayment
    );
}
