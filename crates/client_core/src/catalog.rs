use std::sync::Arc;

use shared::{
    domain::{IngredientCategory, IngredientId},
    error::ApiException,
    protocol::{Ingredient, Order},
};
use tokio::sync::{broadcast, Mutex};
use tracing::info;

use crate::{emit_phase, BurgerApi, Lookup, Operation, Phase, RequestState, StoreEvent};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatalogSnapshot {
    pub ingredients: Vec<Ingredient>,
    /// Set once a load has succeeded; an empty loaded catalog is not "loading".
    pub loaded: bool,
    pub request: RequestState,
}

impl CatalogSnapshot {
    pub fn lookup(&self, id: &IngredientId) -> Lookup<Ingredient> {
        match self.availability() {
            Some(pending) => pending,
            None => self
                .ingredients
                .iter()
                .find(|ingredient| &ingredient.id == id)
                .cloned()
                .map_or(Lookup::NotFound, Lookup::Found),
        }
    }

    pub fn by_category(&self, category: IngredientCategory) -> Vec<Ingredient> {
        self.ingredients
            .iter()
            .filter(|ingredient| ingredient.category == category)
            .cloned()
            .collect()
    }

    /// Resolves an order's ingredient ids into priced lines.
    pub fn price_order(&self, order: &Order) -> Lookup<OrderBreakdown> {
        if let Some(pending) = self.availability() {
            return pending;
        }

        let mut breakdown = OrderBreakdown::default();
        for id in &order.ingredients {
            if let Some(line) = breakdown
                .lines
                .iter_mut()
                .find(|line| &line.ingredient.id == id)
            {
                line.count += 1;
                breakdown.total_price += line.ingredient.price;
                continue;
            }
            match self.ingredients.iter().find(|ingredient| &ingredient.id == id) {
                Some(ingredient) => {
                    breakdown.total_price += ingredient.price;
                    breakdown.lines.push(OrderLine {
                        ingredient: ingredient.clone(),
                        count: 1,
                    });
                }
                None if !breakdown.missing.contains(id) => breakdown.missing.push(id.clone()),
                None => {}
            }
        }
        Lookup::Found(breakdown)
    }

    fn availability<T>(&self) -> Option<Lookup<T>> {
        if self.request.pending {
            return Some(Lookup::Loading);
        }
        if self.loaded {
            return None;
        }
        Some(match &self.request.error {
            Some(message) => Lookup::Failed(message.clone()),
            None => Lookup::Loading,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderLine {
    pub ingredient: Ingredient,
    pub count: usize,
}

impl OrderLine {
    pub fn subtotal(&self) -> u64 {
        self.ingredient.price * self.count as u64
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderBreakdown {
    /// In order of first appearance.
    pub lines: Vec<OrderLine>,
    pub total_price: u64,
    /// Ids the loaded catalog does not know.
    pub missing: Vec<IngredientId>,
}

pub struct CatalogStore {
    api: Arc<dyn BurgerApi>,
    state: Mutex<CatalogSnapshot>,
    events: broadcast::Sender<StoreEvent>,
}

impl CatalogStore {
    pub fn new(api: Arc<dyn BurgerApi>, events: broadcast::Sender<StoreEvent>) -> Self {
        Self {
            api,
            state: Mutex::new(CatalogSnapshot::default()),
            events,
        }
    }

    pub async fn snapshot(&self) -> CatalogSnapshot {
        self.state.lock().await.clone()
    }

    /// Fetches the whole catalog and replaces the current list. A failed load
    /// keeps whatever was loaded before.
    pub async fn load(&self) -> Result<(), ApiException> {
        self.state.lock().await.request.begin();
        emit_phase(&self.events, Operation::LoadCatalog, Phase::Requested);

        let result = self.api.fetch_ingredients().await;

        let mut state = self.state.lock().await;
        match result {
            Ok(ingredients) => {
                info!(count = ingredients.len(), "catalog: loaded");
                state.ingredients = ingredients;
                state.loaded = true;
                state.request.succeed();
                drop(state);
                emit_phase(&self.events, Operation::LoadCatalog, Phase::Succeeded);
                Ok(())
            }
            Err(err) => {
                state.request.fail(err.message.clone());
                drop(state);
                emit_phase(
                    &self.events,
                    Operation::LoadCatalog,
                    Phase::Failed(err.message.clone()),
                );
                Err(err)
            }
        }
    }

    pub async fn lookup(&self, id: &IngredientId) -> Lookup<Ingredient> {
        self.state.lock().await.lookup(id)
    }

    pub async fn by_category(&self, category: IngredientCategory) -> Vec<Ingredient> {
        self.state.lock().await.by_category(category)
    }

    pub async fn price_order(&self, order: &Order) -> Lookup<OrderBreakdown> {
        self.state.lock().await.price_order(order)
    }
}

#[cfg(test)]
#[path = "tests/catalog_tests.rs"]
mod tests;
