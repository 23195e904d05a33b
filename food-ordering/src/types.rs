//! Domain types for the food ordering workflow.

use crate::validation::ValidationError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Identifiers and money
// ============================================================================

/// Catalog product identifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(u32);

impl ProductId {
    /// Creates a product id
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw id
    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Money in minor units (pence) to avoid floating-point errors
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Money(u64);

impl Money {
    /// Zero amount
    pub const ZERO: Self = Self(0);

    /// Creates a `Money` value from minor units
    #[must_use]
    pub const fn from_minor(minor: u64) -> Self {
        Self(minor)
    }

    /// Returns the amount in minor units
    #[must_use]
    pub const fn minor_units(self) -> u64 {
        self.0
    }

    /// Price of `quantity` units at this unit price
    #[must_use]
    pub const fn times(self, quantity: u32) -> Self {
        Self(self.0.saturating_mul(quantity as u64))
    }

    /// Adds two amounts, saturating at the maximum
    #[must_use]
    pub const fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

// ============================================================================
// Order status
// ============================================================================

/// Lifecycle status of an order
///
/// `DEFAULT → PENDING → ACCEPTED → PREPARING → READY → COMPLETED`, with
/// `REJECTED` reachable from any in-progress status.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Basket open, before checkout
    #[default]
    Default,
    /// Payment captured, awaiting the restaurant
    Pending,
    /// Restaurant accepted the order
    Accepted,
    /// Being prepared
    Preparing,
    /// Ready for collection or delivery
    Ready,
    /// Delivered or collected
    Completed,
    /// Rejected by the restaurant; payment is refunded
    Rejected,
}

impl OrderStatus {
    /// Every status, in lifecycle order
    pub const ALL: [Self; 7] = [
        Self::Default,
        Self::Pending,
        Self::Accepted,
        Self::Preparing,
        Self::Ready,
        Self::Completed,
        Self::Rejected,
    ];

    /// Wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Default => "DEFAULT",
            Self::Pending => "PENDING",
            Self::Accepted => "ACCEPTED",
            Self::Preparing => "PREPARING",
            Self::Ready => "READY",
            Self::Completed => "COMPLETED",
            Self::Rejected => "REJECTED",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = ValidationError;

    /// Case-insensitive parse of a wire name
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let wanted = input.trim();
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| ValidationError::InvalidStatus(input.to_string()))
    }
}

// ============================================================================
// Order state
// ============================================================================

/// Delivery address
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    /// First address line
    pub line1: String,
    /// Second address line
    pub line2: String,
    /// Third address line
    pub line3: String,
    /// Town
    pub town: String,
    /// County
    pub county: String,
    /// Post code
    pub post_code: String,
}

/// Start input of an order instance
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderInput {
    /// Customer email for notifications
    pub email: String,
    /// Customer collects the order instead of delivery
    pub collection: bool,
    /// Delivery address, when not collecting
    pub delivery_address: Option<Address>,
}

/// The order record returned by `GET_STATUS`
///
/// Every quantity in `items` is positive: an item whose quantity would drop to
/// zero is removed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderState {
    /// Quantity per product
    pub items: BTreeMap<ProductId, u32>,
    /// Lifecycle status
    pub status: OrderStatus,
    /// Customer email
    pub email: String,
    /// Customer collects the order
    pub collection: bool,
    /// Delivery address
    pub delivery_address: Option<Address>,
    /// A status update's side effects are still in flight
    pub update_in_progress: bool,
}

impl OrderState {
    /// Creates an empty order in `DEFAULT` status
    #[must_use]
    pub fn new(input: OrderInput) -> Self {
        Self {
            email: input.email,
            collection: input.collection,
            delivery_address: input.delivery_address,
            ..Self::default()
        }
    }

    /// Adds `quantity` units, summing with any existing entry
    pub fn add_item(&mut self, product_id: ProductId, quantity: u32) {
        if quantity == 0 {
            return;
        }
        let entry = self.items.entry(product_id).or_insert(0);
        *entry = entry.saturating_add(quantity);
    }

    /// Removes up to `quantity` units; absent products are ignored
    pub fn remove_item(&mut self, product_id: ProductId, quantity: u32) {
        if let Some(current) = self.items.get_mut(&product_id) {
            if *current > quantity {
                *current -= quantity;
            } else {
                self.items.remove(&product_id);
            }
        }
    }

    /// Quantity of a product, zero if absent
    #[must_use]
    pub fn quantity_of(&self, product_id: ProductId) -> u32 {
        self.items.get(&product_id).copied().unwrap_or(0)
    }

    /// Whether the basket is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
