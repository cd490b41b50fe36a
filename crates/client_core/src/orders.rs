//! Order submission and the currently displayed order detail.

use std::sync::Arc;

use shared::{
    domain::{IngredientId, OrderNumber},
    error::ApiException,
    protocol::Order,
};
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tracing::{info, warn};

use crate::{emit_phase, BurgerApi, Lookup, Operation, Phase, RequestState, StoreEvent};

#[derive(Debug, Error)]
pub enum OrderError {
    #[error("an order is already being submitted")]
    SubmissionInFlight,
    #[error("order request failed: {0}")]
    Request(#[from] ApiException),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderSnapshot {
    /// The most recently created order.
    pub last_order: Option<Order>,
    /// The order detail currently on display.
    pub modal: Option<Order>,
    pub submit: RequestState,
    pub fetch: RequestState,
}

pub struct OrderStore {
    api: Arc<dyn BurgerApi>,
    state: Mutex<OrderSnapshot>,
    events: broadcast::Sender<StoreEvent>,
}

impl OrderStore {
    pub fn new(api: Arc<dyn BurgerApi>, events: broadcast::Sender<StoreEvent>) -> Self {
        Self {
            api,
            state: Mutex::new(OrderSnapshot::default()),
            events,
        }
    }

    pub async fn snapshot(&self) -> OrderSnapshot {
        self.state.lock().await.clone()
    }

    pub async fn is_submitting(&self) -> bool {
        self.state.lock().await.submit.pending
    }

    /// Creates an order from `[bun, ...fillings, bun]`. At most one creation
    /// request is outstanding; a call made while one is pending is refused
    /// without contacting the server.
    pub async fn submit(&self, ingredient_ids: Vec<IngredientId>) -> Result<Order, OrderError> {
        {
            let mut state = self.state.lock().await;
            if state.submit.pending {
                warn!("orders: submission refused, another one is in flight");
                return Err(OrderError::SubmissionInFlight);
            }
            state.submit.begin();
        }
        emit_phase(&self.events, Operation::SubmitOrder, Phase::Requested);

        let result = self.api.create_order(&ingredient_ids).await;

        let mut state = self.state.lock().await;
        match result {
            Ok(order) => {
                info!(
                    number = order.number.0,
                    ingredients = ingredient_ids.len(),
                    "orders: order created"
                );
                state.submit.succeed();
                state.last_order = Some(order.clone());
                state.modal = Some(order.clone());
                drop(state);
                emit_phase(&self.events, Operation::SubmitOrder, Phase::Succeeded);
                let _ = self
                    .events
                    .send(StoreEvent::OrderModalChanged(Some(order.number)));
                Ok(order)
            }
            Err(err) => {
                state.submit.fail(err.message.clone());
                drop(state);
                emit_phase(
                    &self.events,
                    Operation::SubmitOrder,
                    Phase::Failed(err.message.clone()),
                );
                Err(err.into())
            }
        }
    }

    /// Loads one order for display in the modal slot. Independent of any
    /// submission in flight.
    pub async fn fetch_by_number(&self, number: OrderNumber) -> Lookup<Order> {
        self.state.lock().await.fetch.begin();
        emit_phase(&self.events, Operation::FetchOrder, Phase::Requested);

        let result = self.api.fetch_order_by_number(number).await;

        let mut state = self.state.lock().await;
        match result {
            Ok(orders) => {
                state.fetch.succeed();
                let found = orders.into_iter().find(|order| order.number == number);
                if let Some(order) = &found {
                    state.modal = Some(order.clone());
                }
                drop(state);
                emit_phase(&self.events, Operation::FetchOrder, Phase::Succeeded);
                match found {
                    Some(order) => {
                        let _ = self
                            .events
                            .send(StoreEvent::OrderModalChanged(Some(order.number)));
                        Lookup::Found(order)
                    }
                    None => Lookup::NotFound,
                }
            }
            Err(err) => {
                state.fetch.fail(err.message.clone());
                drop(state);
                emit_phase(
                    &self.events,
                    Operation::FetchOrder,
                    Phase::Failed(err.message.clone()),
                );
                Lookup::Failed(err.message)
            }
        }
    }

    pub async fn close_modal(&self) {
        let had_modal = self.state.lock().await.modal.take().is_some();
        if had_modal {
            let _ = self.events.send(StoreEvent::OrderModalChanged(None));
        }
    }

    /// Forgets the last created order and its error. A submission still in
    /// flight keeps its pending flag.
    pub async fn clear_order(&self) {
        let mut state = self.state.lock().await;
        state.last_order = None;
        state.submit.error = None;
    }
}

#[cfg(test)]
#[path = "tests/orders_tests.rs"]
mod tests;
