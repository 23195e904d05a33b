//! Property tests for basket edits.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use food_ordering::{
    MockGateway, OrderAction, OrderEnvironment, OrderState, OrderWorkflow, OrderWorkflowState,
    ProductId,
};
use orderflow_core::reducer::Reducer;
use orderflow_core::workflow::UpdateId;
use proptest::prelude::*;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy)]
enum Edit {
    Add(u32, u32),
    Remove(u32, u32),
}

fn edit() -> impl Strategy<Value = Edit> {
    prop_oneof![
        (1u32..=5, 1u32..=20).prop_map(|(product, quantity)| Edit::Add(product, quantity)),
        (1u32..=5, 1u32..=20).prop_map(|(product, quantity)| Edit::Remove(product, quantity)),
    ]
}

fn to_action(index: usize, edit: Edit) -> OrderAction {
    let update_id = UpdateId::new(format!("edit-{index}"));
    match edit {
        Edit::Add(product, quantity) => OrderAction::AddItem {
            update_id,
            product_id: ProductId::new(product),
            quantity,
        },
        Edit::Remove(product, quantity) => OrderAction::RemoveItem {
            update_id,
            product_id: ProductId::new(product),
            quantity,
        },
    }
}

fn apply(edits: &[Edit]) -> OrderWorkflowState {
    let workflow = OrderWorkflow::default();
    let env = OrderEnvironment::new(MockGateway::shared());
    let mut state = OrderWorkflowState::default();
    for (index, edit) in edits.iter().enumerate() {
        workflow.reduce(&mut state, to_action(index, *edit), &env);
    }
    state
}

proptest! {
    #[test]
    fn no_item_ever_has_zero_quantity(edits in prop::collection::vec(edit(), 0..60)) {
        let state = apply(&edits);
        prop_assert!(state.order.items.values().all(|quantity| *quantity > 0));
    }

    #[test]
    fn quantities_follow_a_clamped_running_total(edits in prop::collection::vec(edit(), 0..60)) {
        let mut model: BTreeMap<u32, i64> = BTreeMap::new();
        for edit in &edits {
            match *edit {
                Edit::Add(product, quantity) => {
                    *model.entry(product).or_insert(0) += i64::from(quantity);
                }
                Edit::Remove(product, quantity) => {
                    if let Some(current) = model.get_mut(&product) {
                        *current -= i64::from(quantity);
                        if *current <= 0 {
                            model.remove(&product);
                        }
                    }
                }
            }
        }

        let state = apply(&edits);
        let actual: BTreeMap<u32, i64> = state
            .order
            .items
            .iter()
            .map(|(product, quantity)| (product.value(), i64::from(*quantity)))
            .collect();
        prop_assert_eq!(actual, model);
    }

    #[test]
    fn adding_the_same_product_commutes(product in 1u32..=5, first in 1u32..=50, second in 1u32..=50) {
        let forward = apply(&[Edit::Add(product, first), Edit::Add(product, second)]);
        let backward = apply(&[Edit::Add(product, second), Edit::Add(product, first)]);

        prop_assert_eq!(&forward.order.items, &backward.order.items);
        prop_assert_eq!(
            forward.order.quantity_of(ProductId::new(product)),
            first + second
        );
    }

    #[test]
    fn removing_an_absent_product_changes_nothing(
        edits in prop::collection::vec(edit(), 0..20),
        quantity in 1u32..=20,
    ) {
        let mut order = apply(&edits).order;
        let absent = ProductId::new(99);
        let before: OrderState = order.clone();

        order.remove_item(absent, quantity);
        prop_assert_eq!(order, before);
    }
}
