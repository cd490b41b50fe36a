use super::*;
use crate::test_support::{events, failure, order, FakeApi};
use shared::protocol::FeedResponse;

fn store(api: &Arc<FakeApi>) -> Arc<FeedStore> {
    Arc::new(FeedStore::new(Arc::clone(api) as Arc<dyn BurgerApi>, events()))
}

fn feed(orders: Vec<Order>) -> FeedResponse {
    FeedResponse {
        total: 28_000,
        total_today: 138,
        orders,
    }
}

#[tokio::test]
async fn load_feed_replaces_snapshot() {
    let api = FakeApi::new();
    *api.feed.lock().await = Ok(feed(vec![
        order(3, OrderStatus::Done),
        order(2, OrderStatus::Pending),
    ]));
    let store = store(&api);
    store.load_feed().await.expect("load");

    *api.feed.lock().await = Ok(feed(vec![order(4, OrderStatus::Done)]));
    store.load_feed().await.expect("reload");

    let snapshot = store.feed().await;
    assert!(snapshot.loaded);
    assert_eq!(snapshot.orders.len(), 1);
    assert_eq!(snapshot.total, 28_000);
    assert_eq!(snapshot.total_today, 138);
}

#[tokio::test]
async fn failed_feed_load_keeps_previous_orders() {
    let api = FakeApi::new();
    *api.feed.lock().await = Ok(feed(vec![order(3, OrderStatus::Done)]));
    let store = store(&api);
    store.load_feed().await.expect("load");
    *api.feed.lock().await = Err(failure("gateway timeout"));

    store.load_feed().await.expect_err("reload fails");

    let snapshot = store.feed().await;
    assert_eq!(snapshot.orders.len(), 1);
    assert_eq!(snapshot.request.error.as_deref(), Some("gateway timeout"));
}

#[tokio::test]
async fn board_splits_ready_and_pending_numbers() {
    let mut orders: Vec<Order> = (1..=25).map(|n| order(n, OrderStatus::Done)).collect();
    orders.push(order(100, OrderStatus::Pending));
    orders.push(order(101, OrderStatus::Created));
    let api = FakeApi::new();
    *api.feed.lock().await = Ok(feed(orders));
    let store = store(&api);
    store.load_feed().await.expect("load");

    let snapshot = store.feed().await;
    let ready = snapshot.ready_numbers(BOARD_LIMIT);
    assert_eq!(ready.len(), BOARD_LIMIT);
    assert_eq!(ready[0], OrderNumber(1));
    assert_eq!(snapshot.pending_numbers(BOARD_LIMIT), vec![OrderNumber(100)]);
}

#[tokio::test]
async fn user_orders_load_independently() {
    let api = FakeApi::new();
    *api.user_orders.lock().await = Ok(vec![order(8, OrderStatus::Created)]);
    let store = store(&api);

    store.load_user_orders().await.expect("load");

    let snapshot = store.user_orders().await;
    assert!(snapshot.loaded);
    assert_eq!(snapshot.orders[0].number, OrderNumber(8));
    assert!(!store.feed().await.loaded);
}

#[tokio::test]
async fn lookup_uses_loaded_lists_first() {
    let api = FakeApi::new();
    *api.feed.lock().await = Ok(feed(vec![order(3, OrderStatus::Done)]));
    let store = store(&api);
    store.load_feed().await.expect("load");

    let found = store.lookup_by_number(OrderNumber(3)).await;

    assert_eq!(found, Lookup::Found(order(3, OrderStatus::Done)));
    assert_eq!(api.calls("fetch_order_by_number").await, 0);
    assert_eq!(store.lookup().await.number, Some(OrderNumber(3)));
}

#[tokio::test]
async fn lookup_fetches_unlisted_order() {
    let api = FakeApi::new();
    *api.orders_by_number.lock().await = Ok(vec![order(77, OrderStatus::Pending)]);
    let store = store(&api);

    let found = store.lookup_by_number(OrderNumber(77)).await;

    assert_eq!(found.found().map(|order| order.number), Some(OrderNumber(77)));
    assert_eq!(api.calls("fetch_order_by_number").await, 1);
    let lookup = store.lookup().await;
    assert_eq!(lookup.order.map(|order| order.number), Some(OrderNumber(77)));
    assert!(!lookup.request.pending);
}

#[tokio::test]
async fn lookup_reports_missing_and_failed() {
    let api = FakeApi::new();
    let store = store(&api);

    assert_eq!(store.lookup_by_number(OrderNumber(9)).await, Lookup::NotFound);

    *api.orders_by_number.lock().await = Err(failure("down"));
    assert_eq!(
        store.lookup_by_number(OrderNumber(9)).await,
        Lookup::Failed("down".into())
    );
    assert_eq!(store.lookup().await.request.error.as_deref(), Some("down"));
}

#[tokio::test]
async fn stale_lookup_does_not_overwrite_newer_one() {
    let api = FakeApi::new();
    *api.orders_by_number.lock().await = Ok(vec![order(1, OrderStatus::Done)]);
    let gate = api.gate("fetch_order_by_number").await;
    let store = store(&api);

    let slow = tokio::spawn({
        let store = Arc::clone(&store);
        async move { store.lookup_by_number(OrderNumber(1)).await }
    });
    while !store.lookup().await.request.pending {
        tokio::task::yield_now().await;
    }

    // Number 2 is served from the feed, taking over the lookup slot.
    *api.feed.lock().await = Ok(feed(vec![order(2, OrderStatus::Done)]));
    store.load_feed().await.expect("load feed");
    store.lookup_by_number(OrderNumber(2)).await;

    gate.notify_one();
    let stale = slow.await.expect("join");

    assert_eq!(stale.found().map(|order| order.number), Some(OrderNumber(1)));
    let lookup = store.lookup().await;
    assert_eq!(lookup.number, Some(OrderNumber(2)));
    assert_eq!(lookup.order.map(|order| order.number), Some(OrderNumber(2)));
}
