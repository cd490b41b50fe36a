use super::*;
use crate::test_support::{bun, events, meat, other_bun, sauce};

#[test]
fn bun_replaces_previous_bun() {
    let mut construction = Construction::default();
    construction.add(bun());
    construction.add(other_bun());

    assert_eq!(
        construction.bun().map(|item| item.ingredient.id.clone()),
        Some(other_bun().id)
    );
    assert!(construction.ingredients().is_empty());
}

#[test]
fn fillings_keep_insertion_order_and_unique_instances() {
    let mut construction = Construction::default();
    let first = construction.add(meat());
    let second = construction.add(meat());
    construction.add(sauce());

    assert_ne!(first, second);
    let names: Vec<_> = construction
        .ingredients()
        .iter()
        .map(|item| item.ingredient.id.as_str().to_string())
        .collect();
    assert_eq!(names, vec!["main-1", "main-1", "sauce-1"]);
}

#[test]
fn reorder_moves_filling() {
    let mut construction = Construction::default();
    construction.add(meat());
    construction.add(sauce());

    assert!(construction.reorder(1, 0));

    assert_eq!(construction.ingredients()[0].ingredient.id, sauce().id);
    assert_eq!(construction.ingredients()[1].ingredient.id, meat().id);
}

#[test]
fn reorder_out_of_range_is_ignored() {
    let mut construction = Construction::default();
    construction.add(meat());
    construction.add(sauce());
    let before = construction.clone();

    assert!(!construction.reorder(0, 2));
    assert!(!construction.reorder(5, 0));
    assert_eq!(construction, before);
}

#[test]
fn remove_only_touches_matching_instance() {
    let mut construction = Construction::default();
    let first = construction.add(meat());
    let second = construction.add(meat());

    assert!(construction.remove(first));
    assert!(!construction.remove(first));

    assert_eq!(construction.ingredients().len(), 1);
    assert_eq!(construction.ingredients()[0].instance_id, second);
}

#[test]
fn bun_is_not_removed_by_instance() {
    let mut construction = Construction::default();
    let bun_instance = construction.add(bun());

    assert!(!construction.remove(bun_instance));
    assert!(construction.bun().is_some());
}

#[test]
fn total_counts_bun_twice() {
    let mut construction = Construction::default();
    assert_eq!(construction.total_price(), 0);

    construction.add(bun());
    construction.add(meat());
    construction.add(sauce());

    assert_eq!(construction.total_price(), 988 * 2 + 3000 + 90);
}

#[test]
fn order_ids_wrap_fillings_in_bun() {
    let mut construction = Construction::default();
    construction.add(meat());
    assert_eq!(construction.order_ids(), None);

    construction.add(bun());
    construction.add(sauce());

    assert_eq!(
        construction.order_ids(),
        Some(vec![bun().id, meat().id, sauce().id, bun().id])
    );
}

#[test]
fn ingredient_count_counts_bun_as_two() {
    let mut construction = Construction::default();
    construction.add(bun());
    construction.add(meat());
    construction.add(meat());

    assert_eq!(construction.ingredient_count(&bun().id), 2);
    assert_eq!(construction.ingredient_count(&meat().id), 2);
    assert_eq!(construction.ingredient_count(&sauce().id), 0);
}

#[tokio::test]
async fn store_emits_change_events() {
    let events = events();
    let mut rx = events.subscribe();
    let store = ConstructionStore::new(events);

    let instance = store.add_ingredient(meat()).await;
    assert_eq!(rx.try_recv().ok(), Some(StoreEvent::ConstructionChanged));

    assert!(!store.reorder_ingredient(0, 3).await);
    assert!(rx.try_recv().is_err());

    assert!(store.remove_ingredient(instance).await);
    assert_eq!(rx.try_recv().ok(), Some(StoreEvent::ConstructionChanged));
}

#[tokio::test]
async fn store_clear_resets_price() {
    let store = ConstructionStore::new(events());
    store.add_ingredient(bun()).await;
    store.add_ingredient(sauce()).await;
    assert_eq!(store.total_price().await, 988 * 2 + 90);

    store.clear().await;

    assert!(store.snapshot().await.is_empty());
    assert_eq!(store.total_price().await, 0);
}
