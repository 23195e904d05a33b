//! Read-only product catalog.
//!
//! The catalog is loaded once and shared by every order instance through an
//! `Arc`, so lookups never need a lock.

use crate::types::{Money, OrderState, ProductId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A product that can be ordered
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    /// Product id used in `ADD_ITEM` / `REMOVE_ITEM` payloads
    pub id: ProductId,
    /// Display name
    pub name: String,
    /// Unit price
    pub price: Money,
}

impl Product {
    /// Creates a product
    #[must_use]
    pub fn new(id: u32, name: impl Into<String>, price_minor: u64) -> Self {
        Self {
            id: ProductId::new(id),
            name: name.into(),
            price: Money::from_minor(price_minor),
        }
    }
}

/// Products keyed by id
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Catalog {
    products: BTreeMap<ProductId, Product>,
}

impl Catalog {
    /// Builds a catalog; a later product replaces an earlier one with the same id
    #[must_use]
    pub fn new(products: impl IntoIterator<Item = Product>) -> Self {
        Self {
            products: products
                .into_iter()
                .map(|product| (product.id, product))
                .collect(),
        }
    }

    /// The chip shop menu
    #[must_use]
    pub fn standard() -> Self {
        Self::new([
            Product::new(1, "Chips", 350),
            Product::new(2, "Battered cod", 875),
            Product::new(3, "Battered haddock", 975),
            Product::new(4, "Curry sauce", 145),
            Product::new(5, "Gravy", 145),
        ])
    }

    /// Looks up a product
    #[must_use]
    pub fn get(&self, id: ProductId) -> Option<&Product> {
        self.products.get(&id)
    }

    /// Whether the product exists
    #[must_use]
    pub fn contains(&self, id: ProductId) -> bool {
        self.products.contains_key(&id)
    }

    /// Products in id order
    pub fn products(&self) -> impl Iterator<Item = &Product> {
        self.products.values()
    }

    /// Order total: quantity times unit price over every item
    ///
    /// Items missing from the catalog contribute nothing.
    #[must_use]
    pub fn total(&self, order: &OrderState) -> Money {
        order
            .items
            .iter()
            .filter_map(|(id, quantity)| self.get(*id).map(|product| product.price.times(*quantity)))
            .fold(Money::ZERO, Money::saturating_add)
    }
}
