use super::*;
use crate::test_support::{bun, events, failure, meat, order, FakeApi};
use shared::domain::OrderStatus;

fn store(api: &Arc<FakeApi>) -> Arc<OrderStore> {
    Arc::new(OrderStore::new(Arc::clone(api) as Arc<dyn BurgerApi>, events()))
}

fn burger() -> Vec<IngredientId> {
    vec![bun().id, meat().id, bun().id]
}

#[tokio::test]
async fn second_submit_while_pending_is_refused() {
    let api = FakeApi::new();
    let gate = api.gate("create_order").await;
    let store = store(&api);

    let first = tokio::spawn({
        let store = Arc::clone(&store);
        async move { store.submit(burger()).await }
    });
    while !store.is_submitting().await {
        tokio::task::yield_now().await;
    }

    let second = store.submit(burger()).await;
    assert!(matches!(second, Err(OrderError::SubmissionInFlight)));

    gate.notify_one();
    first.await.expect("join").expect("first submit");
    assert_eq!(api.calls("create_order").await, 1);
    assert!(!store.is_submitting().await);
}

#[tokio::test]
async fn successful_submit_opens_modal() {
    let api = FakeApi::new();
    *api.created.lock().await = Ok(order(4012, OrderStatus::Created));
    let store = store(&api);

    let created = store.submit(burger()).await.expect("submit");

    let snapshot = store.snapshot().await;
    assert_eq!(snapshot.last_order.as_ref(), Some(&created));
    assert_eq!(snapshot.modal.as_ref(), Some(&created));
    assert_eq!(snapshot.submit, RequestState::default());
}

#[tokio::test]
async fn failed_submit_records_error() {
    let api = FakeApi::new();
    *api.created.lock().await = Err(failure("kitchen closed"));
    let store = store(&api);

    let err = store.submit(burger()).await.expect_err("submit fails");

    assert!(matches!(err, OrderError::Request(_)));
    let snapshot = store.snapshot().await;
    assert!(!snapshot.submit.pending);
    assert_eq!(snapshot.submit.error.as_deref(), Some("kitchen closed"));
    assert!(snapshot.modal.is_none());
}

#[tokio::test]
async fn submit_after_failure_is_allowed() {
    let api = FakeApi::new();
    *api.created.lock().await = Err(failure("kitchen closed"));
    let store = store(&api);
    store.submit(burger()).await.expect_err("first fails");

    *api.created.lock().await = Ok(order(9, OrderStatus::Pending));
    store.submit(burger()).await.expect("retry");

    assert_eq!(api.calls("create_order").await, 2);
    assert!(store.snapshot().await.submit.error.is_none());
}

#[tokio::test]
async fn close_modal_keeps_last_order() {
    let api = FakeApi::new();
    let store = store(&api);
    store.submit(burger()).await.expect("submit");

    store.close_modal().await;

    let snapshot = store.snapshot().await;
    assert!(snapshot.modal.is_none());
    assert!(snapshot.last_order.is_some());
}

#[tokio::test]
async fn clear_order_does_not_release_pending_submission() {
    let api = FakeApi::new();
    let gate = api.gate("create_order").await;
    let store = store(&api);

    let first = tokio::spawn({
        let store = Arc::clone(&store);
        async move { store.submit(burger()).await }
    });
    while !store.is_submitting().await {
        tokio::task::yield_now().await;
    }

    store.clear_order().await;
    assert!(store.is_submitting().await);
    assert!(matches!(
        store.submit(burger()).await,
        Err(OrderError::SubmissionInFlight)
    ));

    gate.notify_one();
    first.await.expect("join").expect("submit");
}

#[tokio::test]
async fn fetch_by_number_fills_modal() {
    let api = FakeApi::new();
    *api.orders_by_number.lock().await = Ok(vec![order(55, OrderStatus::Done)]);
    let store = store(&api);

    let found = store.fetch_by_number(OrderNumber(55)).await;

    assert_eq!(found, Lookup::Found(order(55, OrderStatus::Done)));
    let snapshot = store.snapshot().await;
    assert_eq!(snapshot.modal.map(|order| order.number), Some(OrderNumber(55)));
    assert!(snapshot.last_order.is_none());
}

#[tokio::test]
async fn fetch_by_number_reports_unknown_and_failed() {
    let api = FakeApi::new();
    let store = store(&api);

    assert_eq!(store.fetch_by_number(OrderNumber(1)).await, Lookup::NotFound);

    *api.orders_by_number.lock().await = Err(failure("timeout"));
    assert_eq!(
        store.fetch_by_number(OrderNumber(1)).await,
        Lookup::Failed("timeout".into())
    );
    let snapshot = store.snapshot().await;
    assert_eq!(snapshot.fetch.error.as_deref(), Some("timeout"));
    assert!(snapshot.submit.error.is_none());
}
