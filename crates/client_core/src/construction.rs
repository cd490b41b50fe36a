//! The burger being assembled: a single bun slot plus an ordered filling list.

use std::fmt;

use shared::{domain::IngredientId, protocol::Ingredient};
use tokio::sync::{broadcast, Mutex};
use tracing::debug;
use uuid::Uuid;

use crate::StoreEvent;

/// Identifies one placement of an ingredient inside a construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceId(pub Uuid);

impl InstanceId {
    fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConstructionIngredient {
    pub instance_id: InstanceId,
    pub ingredient: Ingredient,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Construction {
    bun: Option<ConstructionIngredient>,
    ingredients: Vec<ConstructionIngredient>,
}

impl Construction {
    pub fn bun(&self) -> Option<&ConstructionIngredient> {
        self.bun.as_ref()
    }

    pub fn ingredients(&self) -> &[ConstructionIngredient] {
        &self.ingredients
    }

    pub fn is_empty(&self) -> bool {
        self.bun.is_none() && self.ingredients.is_empty()
    }

    /// Buns replace the bun slot; everything else is appended.
    pub fn add(&mut self, ingredient: Ingredient) -> InstanceId {
        let instance_id = InstanceId::generate();
        let item = ConstructionIngredient {
            instance_id,
            ingredient,
        };
        if item.ingredient.category.is_bun() {
            self.bun = Some(item);
        } else {
            self.ingredients.push(item);
        }
        instance_id
    }

    /// Moves a filling from `from` to `to`. Returns false, leaving the list
    /// untouched, when either index is out of range.
    pub fn reorder(&mut self, from: usize, to: usize) -> bool {
        let len = self.ingredients.len();
        if from >= len || to >= len {
            return false;
        }
        let item = self.ingredients.remove(from);
        self.ingredients.insert(to, item);
        true
    }

    pub fn remove(&mut self, instance_id: InstanceId) -> bool {
        let before = self.ingredients.len();
        self.ingredients.retain(|item| item.instance_id != instance_id);
        self.ingredients.len() != before
    }

    pub fn clear(&mut self) {
        self.bun = None;
        self.ingredients.clear();
    }

    pub fn total_price(&self) -> u64 {
        let bun = self.bun.as_ref().map_or(0, |bun| bun.ingredient.price * 2);
        bun + self
            .ingredients
            .iter()
            .map(|item| item.ingredient.price)
            .sum::<u64>()
    }

    /// Ingredient ids as submitted for an order: the bun opens and closes the
    /// sequence. `None` when no bun has been chosen.
    pub fn order_ids(&self) -> Option<Vec<IngredientId>> {
        let bun = self.bun.as_ref()?;
        let mut ids = Vec::with_capacity(self.ingredients.len() + 2);
        ids.push(bun.ingredient.id.clone());
        ids.extend(self.ingredients.iter().map(|item| item.ingredient.id.clone()));
        ids.push(bun.ingredient.id.clone());
        Some(ids)
    }

    /// How many times a catalog item is used; a bun counts twice.
    pub fn ingredient_count(&self, id: &IngredientId) -> usize {
        let bun = match &self.bun {
            Some(bun) if &bun.ingredient.id == id => 2,
            _ => 0,
        };
        bun + self
            .ingredients
            .iter()
            .filter(|item| &item.ingredient.id == id)
            .count()
    }
}

pub struct ConstructionStore {
    state: Mutex<Construction>,
    events: broadcast::Sender<StoreEvent>,
}

impl ConstructionStore {
    pub fn new(events: broadcast::Sender<StoreEvent>) -> Self {
        Self {
            state: Mutex::new(Construction::default()),
            events,
        }
    }

    pub async fn snapshot(&self) -> Construction {
        self.state.lock().await.clone()
    }

    pub async fn total_price(&self) -> u64 {
        self.state.lock().await.total_price()
    }

    pub async fn add_ingredient(&self, ingredient: Ingredient) -> InstanceId {
        let instance_id = {
            let mut state = self.state.lock().await;
            debug!(ingredient = %ingredient.id, "construction: add");
            state.add(ingredient)
        };
        self.changed();
        instance_id
    }

    pub async fn reorder_ingredient(&self, from: usize, to: usize) -> bool {
        let moved = self.state.lock().await.reorder(from, to);
        if moved {
            self.changed();
        } else {
            debug!(from, to, "construction: reorder ignored, index out of range");
        }
        moved
    }

    pub async fn remove_ingredient(&self, instance_id: InstanceId) -> bool {
        let removed = self.state.lock().await.remove(instance_id);
        if removed {
            self.changed();
        }
        removed
    }

    pub async fn clear(&self) {
        self.state.lock().await.clear();
        self.changed();
    }

    fn changed(&self) {
        let _ = self.events.send(StoreEvent::ConstructionChanged);
    }
}

#[cfg(test)]
#[path = "tests/construction_tests.rs"]
mod tests;
