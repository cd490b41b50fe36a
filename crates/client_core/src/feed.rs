//! Global order feed and the signed-in user's order history.

use std::sync::Arc;

use shared::{
    domain::{OrderNumber, OrderStatus},
    error::ApiException,
    protocol::Order,
};
use tokio::sync::{broadcast, Mutex};
use tracing::info;

use crate::{emit_phase, BurgerApi, Lookup, Operation, Phase, RequestState, StoreEvent};

pub const BOARD_LIMIT: usize = 20;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedSnapshot {
    /// Most recent first.
    pub orders: Vec<Order>,
    pub total: u64,
    pub total_today: u64,
    pub loaded: bool,
    pub request: RequestState,
}

impl FeedSnapshot {
    pub fn ready_numbers(&self, limit: usize) -> Vec<OrderNumber> {
        self.numbers_with_status(&OrderStatus::Done, limit)
    }

    pub fn pending_numbers(&self, limit: usize) -> Vec<OrderNumber> {
        self.numbers_with_status(&OrderStatus::Pending, limit)
    }

    fn numbers_with_status(&self, status: &OrderStatus, limit: usize) -> Vec<OrderNumber> {
        self.orders
            .iter()
            .filter(|order| &order.status == status)
            .map(|order| order.number)
            .take(limit)
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserOrdersSnapshot {
    pub orders: Vec<Order>,
    pub loaded: bool,
    pub request: RequestState,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderLookup {
    pub number: Option<OrderNumber>,
    pub order: Option<Order>,
    pub request: RequestState,
}

#[derive(Default)]
struct FeedState {
    feed: FeedSnapshot,
    user_orders: UserOrdersSnapshot,
    lookup: OrderLookup,
}

pub struct FeedStore {
    api: Arc<dyn BurgerApi>,
    state: Mutex<FeedState>,
    events: broadcast::Sender<StoreEvent>,
}

impl FeedStore {
    pub fn new(api: Arc<dyn BurgerApi>, events: broadcast::Sender<StoreEvent>) -> Self {
        Self {
            api,
            state: Mutex::new(FeedState::default()),
            events,
        }
    }

    pub async fn feed(&self) -> FeedSnapshot {
        self.state.lock().await.feed.clone()
    }

    pub async fn user_orders(&self) -> UserOrdersSnapshot {
        self.state.lock().await.user_orders.clone()
    }

    pub async fn lookup(&self) -> OrderLookup {
        self.state.lock().await.lookup.clone()
    }

    /// Full resync of the global feed; the previous snapshot is replaced,
    /// never merged.
    pub async fn load_feed(&self) -> Result<(), ApiException> {
        self.state.lock().await.feed.request.begin();
        emit_phase(&self.events, Operation::LoadFeed, Phase::Requested);

        let result = self.api.fetch_feed().await;

        let mut state = self.state.lock().await;
        match result {
            Ok(response) => {
                info!(
                    orders = response.orders.len(),
                    total = response.total,
                    total_today = response.total_today,
                    "feed: loaded"
                );
                state.feed.orders = response.orders;
                state.feed.total = response.total;
                state.feed.total_today = response.total_today;
                state.feed.loaded = true;
                state.feed.request.succeed();
                drop(state);
                emit_phase(&self.events, Operation::LoadFeed, Phase::Succeeded);
                Ok(())
            }
            Err(err) => {
                state.feed.request.fail(err.message.clone());
                drop(state);
                emit_phase(
                    &self.events,
                    Operation::LoadFeed,
                    Phase::Failed(err.message.clone()),
                );
                Err(err)
            }
        }
    }

    /// Loads the signed-in user's orders. Callers gate this on an
    /// authenticated session.
    pub async fn load_user_orders(&self) -> Result<(), ApiException> {
        self.state.lock().await.user_orders.request.begin();
        emit_phase(&self.events, Operation::LoadUserOrders, Phase::Requested);

        let result = self.api.fetch_user_orders().await;

        let mut state = self.state.lock().await;
        match result {
            Ok(orders) => {
                info!(orders = orders.len(), "feed: user orders loaded");
                state.user_orders.orders = orders;
                state.user_orders.loaded = true;
                state.user_orders.request.succeed();
                drop(state);
                emit_phase(&self.events, Operation::LoadUserOrders, Phase::Succeeded);
                Ok(())
            }
            Err(err) => {
                state.user_orders.request.fail(err.message.clone());
                drop(state);
                emit_phase(
                    &self.events,
                    Operation::LoadUserOrders,
                    Phase::Failed(err.message.clone()),
                );
                Err(err)
            }
        }
    }

    /// Resolves an order by number. Orders already held in either list are
    /// returned without a request; anything else is fetched individually.
    pub async fn lookup_by_number(&self, number: OrderNumber) -> Lookup<Order> {
        {
            let mut state = self.state.lock().await;
            let cached = state
                .feed
                .orders
                .iter()
                .chain(state.user_orders.orders.iter())
                .find(|order| order.number == number)
                .cloned();
            if let Some(order) = cached {
                state.lookup = OrderLookup {
                    number: Some(number),
                    order: Some(order.clone()),
                    request: RequestState::default(),
                };
                return Lookup::Found(order);
            }
            state.lookup.number = Some(number);
            state.lookup.order = None;
            state.lookup.request.begin();
        }
        emit_phase(&self.events, Operation::LookupOrder, Phase::Requested);

        let result = self.api.fetch_order_by_number(number).await;

        let mut state = self.state.lock().await;
        if state.lookup.number != Some(number) {
            // A newer lookup owns the slot; report this result only to the caller.
            drop(state);
            return match result {
                Ok(orders) => orders
                    .into_iter()
                    .find(|order| order.number == number)
                    .map_or(Lookup::NotFound, Lookup::Found),
                Err(err) => Lookup::Failed(err.message),
            };
        }
        match result {
            Ok(orders) => {
                let found = orders.into_iter().find(|order| order.number == number);
                state.lookup.order = found.clone();
                state.lookup.request.succeed();
                drop(state);
                emit_phase(&self.events, Operation::LookupOrder, Phase::Succeeded);
                found.map_or(Lookup::NotFound, Lookup::Found)
            }
            Err(err) => {
                state.lookup.request.fail(err.message.clone());
                drop(state);
                emit_phase(
                    &self.events,
                    Operation::LookupOrder,
                    Phase::Failed(err.message.clone()),
                );
                Lookup::Failed(err.message)
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/feed_tests.rs"]
mod tests;
