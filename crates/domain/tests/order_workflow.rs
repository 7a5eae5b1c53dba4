//! Integration tests for the order workflow.
//!
//! These tests drive the workflow against the in-memory store and verify
//! atomicity of order creation, idempotent retries and the status lifecycle.

use std::sync::Arc;

use common::{Money, OrderId, OrderStatus, ProductId, UserId};
use domain::{OrderError, OrderWorkflow, is_valid_transition};
use store::{CartRepository, InMemoryStore, OrderRepository};

const USER: UserId = UserId::new(1);
const PRODUCT_A: ProductId = ProductId::new(1);
const PRODUCT_B: ProductId = ProductId::new(2);
const PRODUCT_C: ProductId = ProductId::new(3);

/// Catalog with A at 10.00 and B at 20.00, both with the given stock.
async fn create_workflow(stock_a: i64, stock_b: i64) -> OrderWorkflow<InMemoryStore> {
    let store = InMemoryStore::new();
    store
        .upsert_product(PRODUCT_A, Money::from_cents(1000), stock_a)
        .await;
    store
        .upsert_product(PRODUCT_B, Money::from_cents(2000), stock_b)
        .await;
    OrderWorkflow::new(store)
}

/// Fills the cart with 2 x A and 1 x B.
async fn fill_cart(workflow: &OrderWorkflow<InMemoryStore>) {
    let store = workflow.store();
    store.add_to_cart(USER, PRODUCT_A, 2).await.unwrap();
    store.add_to_cart(USER, PRODUCT_B, 1).await.unwrap();
}

mod create_from_cart {
    use super::*;

    #[tokio::test]
    async fn reserves_stock_and_clears_cart() {
        let workflow = create_workflow(10, 10).await;
        fill_cart(&workflow).await;

        let order_id = workflow.create_from_cart(USER, None).await.unwrap();

        let store = workflow.store();
        let order = workflow.get_order(USER, order_id).await.unwrap();
        assert_eq!(order.order.total_amount, Money::from_cents(4000));
        assert_eq!(order.order.status, OrderStatus::New);
        assert_eq!(store.stock_of(PRODUCT_A).await, Some(8));
        assert_eq!(store.stock_of(PRODUCT_B).await, Some(9));
        assert!(store.cart_lines(USER).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn lines_capture_prices_at_creation() {
        let workflow = create_workflow(10, 10).await;
        fill_cart(&workflow).await;

        let order_id = workflow.create_from_cart(USER, None).await.unwrap();
        workflow
            .store()
            .upsert_product(PRODUCT_A, Money::from_cents(9999), 8)
            .await;

        let order = workflow.get_order(USER, order_id).await.unwrap();
        let line_a = order
            .lines
            .iter()
            .find(|line| line.product_id == PRODUCT_A)
            .unwrap();
        assert_eq!(line_a.unit_price, Money::from_cents(1000));
        assert_eq!(line_a.quantity, 2);
    }

    #[tokio::test]
    async fn insufficient_stock_changes_nothing() {
        let workflow = create_workflow(10, 0).await;
        fill_cart(&workflow).await;

        let result = workflow.create_from_cart(USER, None).await;

        assert!(matches!(
            result,
            Err(OrderError::InsufficientStock { product_id }) if product_id == PRODUCT_B
        ));
        let store = workflow.store();
        assert_eq!(store.stock_of(PRODUCT_A).await, Some(10));
        assert_eq!(store.order_count().await, 0);
        assert_eq!(store.cart_lines(USER).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn no_phantom_reservation_for_earlier_lines() {
        let workflow = create_workflow(10, 10).await;
        let store = workflow.store();
        store
            .upsert_product(PRODUCT_C, Money::from_cents(500), 1)
            .await;
        fill_cart(&workflow).await;
        store.add_to_cart(USER, PRODUCT_C, 2).await.unwrap();

        let result = workflow.create_from_cart(USER, None).await;

        assert!(matches!(
            result,
            Err(OrderError::InsufficientStock { product_id }) if product_id == PRODUCT_C
        ));
        assert_eq!(store.stock_of(PRODUCT_A).await, Some(10));
        assert_eq!(store.stock_of(PRODUCT_B).await, Some(10));
        assert_eq!(store.stock_of(PRODUCT_C).await, Some(1));
        assert_eq!(store.order_count().await, 0);
        assert_eq!(store.cart_lines(USER).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn missing_price_is_reported() {
        let workflow = create_workflow(10, 10).await;
        fill_cart(&workflow).await;
        workflow.store().remove_product(PRODUCT_B).await;

        let result = workflow.create_from_cart(USER, None).await;

        assert!(matches!(
            result,
            Err(OrderError::PriceNotFound { product_id }) if product_id == PRODUCT_B
        ));
        let store = workflow.store();
        assert_eq!(store.stock_of(PRODUCT_A).await, Some(10));
        assert_eq!(store.order_count().await, 0);
        assert_eq!(store.cart_lines(USER).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn total_overflow_is_rejected() {
        let store = InMemoryStore::new();
        store
            .upsert_product(PRODUCT_A, Money::from_cents(i64::MAX / 2), 10)
            .await;
        store.add_to_cart(USER, PRODUCT_A, 3).await.unwrap();
        let workflow = OrderWorkflow::new(store);

        let result = workflow.create_from_cart(USER, None).await;

        assert!(matches!(result, Err(OrderError::TotalOverflow)));
        assert_eq!(workflow.store().order_count().await, 0);
    }

    #[tokio::test]
    async fn failed_commit_leaves_no_trace() {
        let workflow = create_workflow(10, 10).await;
        fill_cart(&workflow).await;
        workflow.store().set_fail_on_commit(true);

        let result = workflow.create_from_cart(USER, None).await;

        assert!(matches!(result, Err(OrderError::Persistence(_))));
        let store = workflow.store();
        assert_eq!(store.stock_of(PRODUCT_A).await, Some(10));
        assert_eq!(store.stock_of(PRODUCT_B).await, Some(10));
        assert_eq!(store.order_count().await, 0);
        assert_eq!(store.cart_lines(USER).await.unwrap().len(), 2);
    }
}

mod idempotency {
    use super::*;

    #[tokio::test]
    async fn retry_with_same_key_returns_same_order() {
        let workflow = create_workflow(10, 10).await;
        fill_cart(&workflow).await;

        let first = workflow.create_from_cart(USER, Some("k1")).await.unwrap();
        let second = workflow.create_from_cart(USER, Some("k1")).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(workflow.store().order_count().await, 1);
        assert_eq!(workflow.store().stock_of(PRODUCT_A).await, Some(8));
    }

    #[tokio::test]
    async fn retry_ignores_cart_changes() {
        let workflow = create_workflow(10, 10).await;
        fill_cart(&workflow).await;

        let first = workflow.create_from_cart(USER, Some("k1")).await.unwrap();
        workflow
            .store()
            .add_to_cart(USER, PRODUCT_A, 5)
            .await
            .unwrap();
        let second = workflow.create_from_cart(USER, Some("k1")).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(workflow.store().order_count().await, 1);
        assert_eq!(workflow.store().cart_lines(USER).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn blank_key_does_not_deduplicate() {
        let workflow = create_workflow(10, 10).await;

        fill_cart(&workflow).await;
        let first = workflow.create_from_cart(USER, Some("  ")).await.unwrap();
        fill_cart(&workflow).await;
        let second = workflow.create_from_cart(USER, Some("")).await.unwrap();

        assert_ne!(first, second);
        assert_eq!(workflow.store().order_count().await, 2);
    }

    #[tokio::test]
    async fn key_of_another_user_conflicts() {
        let workflow = create_workflow(10, 10).await;
        fill_cart(&workflow).await;
        workflow.create_from_cart(USER, Some("shared")).await.unwrap();

        let other = UserId::new(2);
        workflow
            .store()
            .add_to_cart(other, PRODUCT_A, 1)
            .await
            .unwrap();
        let result = workflow.create_from_cart(other, Some("shared")).await;

        assert!(matches!(result, Err(OrderError::IdempotencyConflict)));
        assert_eq!(workflow.store().order_count().await, 1);
    }

    #[tokio::test]
    async fn failed_attempt_blocks_key() {
        let workflow = create_workflow(10, 0).await;
        fill_cart(&workflow).await;

        let first = workflow.create_from_cart(USER, Some("k1")).await;
        assert!(matches!(first, Err(OrderError::InsufficientStock { .. })));

        workflow
            .store()
            .upsert_product(PRODUCT_B, Money::from_cents(2000), 10)
            .await;
        let retry = workflow.create_from_cart(USER, Some("k1")).await;
        assert!(matches!(retry, Err(OrderError::IdempotencyConflict)));

        let fresh = workflow.create_from_cart(USER, Some("k2")).await;
        assert!(fresh.is_ok());
        assert_eq!(workflow.store().order_count().await, 1);
    }

    #[tokio::test]
    async fn result_is_written_atomically_with_order() {
        let workflow = create_workflow(10, 10).await;
        fill_cart(&workflow).await;
        workflow.store().set_fail_on_idempotency_save(true);

        let result = workflow.create_from_cart(USER, Some("k1")).await;

        assert!(matches!(result, Err(OrderError::Persistence(_))));
        let store = workflow.store();
        assert_eq!(store.order_count().await, 0);
        assert_eq!(store.stock_of(PRODUCT_A).await, Some(10));
        assert_eq!(store.stock_of(PRODUCT_B).await, Some(10));
        assert_eq!(store.cart_lines(USER).await.unwrap().len(), 2);

        let record = store.idempotency_record("k1").await.unwrap();
        assert_eq!(record.status_code, None);
        assert_eq!(record.order_id, None);
    }

    #[tokio::test]
    async fn successful_create_records_result() {
        let workflow = create_workflow(10, 10).await;
        fill_cart(&workflow).await;

        let order_id = workflow.create_from_cart(USER, Some("k1")).await.unwrap();

        let record = workflow.store().idempotency_record("k1").await.unwrap();
        assert_eq!(record.status_code, Some(201));
        assert_eq!(record.order_id, Some(order_id));
        assert_eq!(record.user_id, USER);
    }

    #[tokio::test]
    async fn oversized_key_rejected_before_any_write() {
        let workflow = create_workflow(10, 10).await;
        fill_cart(&workflow).await;
        let key = "k".repeat(256);

        let result = workflow.create_from_cart(USER, Some(&key)).await;

        assert!(matches!(
            result,
            Err(OrderError::InvalidIdempotencyKey { .. })
        ));
        assert!(workflow.store().idempotency_record(&key).await.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_same_key_creates_one_order() {
        let workflow = Arc::new(create_workflow(100, 100).await);
        fill_cart(&workflow).await;

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let workflow = Arc::clone(&workflow);
                tokio::spawn(async move { workflow.create_from_cart(USER, Some("same")).await })
            })
            .collect();

        let mut created: Vec<OrderId> = Vec::new();
        for handle in handles {
            match handle.await.unwrap() {
                Ok(order_id) => created.push(order_id),
                Err(OrderError::IdempotencyConflict) => {}
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert!(!created.is_empty());
        assert!(created.iter().all(|id| *id == created[0]));
        assert_eq!(workflow.store().order_count().await, 1);
        assert_eq!(workflow.store().stock_of(PRODUCT_A).await, Some(98));
    }
}

mod status_lifecycle {
    use super::*;

    async fn create_order_in(status: OrderStatus) -> (OrderWorkflow<InMemoryStore>, OrderId) {
        let workflow = create_workflow(10, 10).await;
        fill_cart(&workflow).await;
        let order_id = workflow.create_from_cart(USER, None).await.unwrap();
        workflow.store().set_order_status(order_id, status).await;
        (workflow, order_id)
    }

    #[tokio::test]
    async fn cannot_cancel_shipped_order() {
        let (workflow, order_id) = create_order_in(OrderStatus::Shipped).await;

        let result = workflow.cancel(order_id).await;

        assert!(matches!(
            result,
            Err(OrderError::InvalidStatusTransition {
                from: OrderStatus::Shipped,
                to: OrderStatus::Cancelled
            })
        ));
        assert_eq!(
            workflow.store().order_status(order_id).await.unwrap(),
            Some(OrderStatus::Shipped)
        );
    }

    #[tokio::test]
    async fn ship_reports_status_changed_after_validation() {
        let (workflow, order_id) = create_order_in(OrderStatus::Paid).await;
        workflow
            .store()
            .interleave_status_change(order_id, OrderStatus::Cancelled);

        let result = workflow.ship(order_id).await;

        assert!(matches!(
            result,
            Err(OrderError::StaleStatus {
                order_id: id,
                expected: OrderStatus::Paid
            }) if id == order_id
        ));
        assert_eq!(
            workflow.store().order_status(order_id).await.unwrap(),
            Some(OrderStatus::Cancelled)
        );
    }

    #[tokio::test]
    async fn cancel_reports_status_changed_after_validation() {
        let (workflow, order_id) = create_order_in(OrderStatus::New).await;
        workflow
            .store()
            .interleave_status_change(order_id, OrderStatus::AwaitingPayment);

        let result = workflow.cancel(order_id).await;

        assert!(matches!(
            result,
            Err(OrderError::StaleStatus {
                expected: OrderStatus::New,
                ..
            })
        ));
        assert_eq!(
            workflow.store().order_status(order_id).await.unwrap(),
            Some(OrderStatus::AwaitingPayment)
        );

        // The order is still cancellable from its new status.
        assert_eq!(
            workflow.cancel(order_id).await.unwrap(),
            OrderStatus::Cancelled
        );
    }

    #[tokio::test]
    async fn fulfillment_path() {
        let (workflow, order_id) = create_order_in(OrderStatus::Paid).await;

        workflow.ship(order_id).await.unwrap();
        workflow.deliver(order_id).await.unwrap();

        let order = workflow.get_order(USER, order_id).await.unwrap();
        assert_eq!(order.order.status, OrderStatus::Delivered);
    }

    #[tokio::test]
    async fn operations_respect_transition_table() {
        let targets = [
            OrderStatus::Shipped,
            OrderStatus::Delivered,
            OrderStatus::Cancelled,
        ];

        for from in OrderStatus::ALL {
            for to in targets {
                let (workflow, order_id) = create_order_in(from).await;

                let result = match to {
                    OrderStatus::Shipped => workflow.ship(order_id).await,
                    OrderStatus::Delivered => workflow.deliver(order_id).await,
                    _ => workflow.cancel(order_id).await,
                };
                let current = workflow
                    .store()
                    .order_status(order_id)
                    .await
                    .unwrap()
                    .unwrap();

                if is_valid_transition(from, to) {
                    assert_eq!(result.unwrap(), to, "{from} -> {to}");
                    assert_eq!(current, to, "{from} -> {to}");
                } else {
                    assert!(
                        matches!(result, Err(OrderError::InvalidStatusTransition { .. })),
                        "{from} -> {to}"
                    );
                    assert_eq!(current, from, "{from} -> {to}");
                }
            }
        }
    }
}
