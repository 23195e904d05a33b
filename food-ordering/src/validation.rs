//! Command validation.
//!
//! Pure checks run before a command is admitted. A rejected command never
//! reaches the journal or the reducer, so the order is left untouched and the
//! instance keeps running.

use crate::catalog::Catalog;
use crate::reducer::{OrderAction, OrderWorkflowState};
use crate::types::{OrderStatus, ProductId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Admission-time rejection of a command
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Product id is not in the catalog
    #[error("unknown product id: {0}")]
    UnknownProduct(i64),

    /// Quantity is zero, negative, or too large
    #[error("quantity must be a minimum of 1, got {0}")]
    InvalidQuantity(i64),

    /// Status string is not one of the known statuses
    #[error("invalid order status: {0:?}")]
    InvalidStatus(String),

    /// Basket edits are only accepted before checkout
    #[error("order can no longer be changed")]
    OrderLocked,

    /// The order was rejected; no new side effects may start
    #[error("order has been cancelled")]
    Cancelled,

    /// No handler with this name
    #[error("unknown {kind}: {name}")]
    UnknownHandler {
        /// `update`, `signal` or `query`
        kind: &'static str,
        /// Name that was requested
        name: String,
    },

    /// Payload could not be decoded (or a result could not be encoded)
    #[error("invalid {name} payload: {reason}")]
    Payload {
        /// Handler name
        name: String,
        /// Decoder message
        reason: String,
    },
}

/// `ADD_ITEM` / `REMOVE_ITEM` payload as sent by callers
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemRequest {
    /// Catalog product id
    pub product_id: i64,
    /// Units to add or remove
    pub quantity: i64,
}

/// Converts raw payload integers into a product id and positive quantity
///
/// Only the id's range is checked here, before the quantity; catalog
/// membership is left to [`catalog_item`] and [`validate_item`].
///
/// # Errors
///
/// - [`ValidationError::UnknownProduct`]: id outside the representable range
/// - [`ValidationError::InvalidQuantity`]: quantity below 1
pub fn item_fields(request: &ItemRequest) -> Result<(ProductId, u32), ValidationError> {
    let product_id = u32::try_from(request.product_id)
        .map(ProductId::new)
        .map_err(|_| ValidationError::UnknownProduct(request.product_id))?;
    let quantity = positive_quantity(request.quantity)?;
    Ok((product_id, quantity))
}

/// Like [`item_fields`], but the product must also be in the catalog
///
/// # Errors
///
/// - [`ValidationError::UnknownProduct`]: id not in `catalog`
/// - [`ValidationError::InvalidQuantity`]: quantity below 1
pub fn catalog_item(
    catalog: &Catalog,
    request: &ItemRequest,
) -> Result<(ProductId, u32), ValidationError> {
    let product_id = u32::try_from(request.product_id)
        .map(ProductId::new)
        .ok()
        .filter(|product_id| catalog.contains(*product_id))
        .ok_or(ValidationError::UnknownProduct(request.product_id))?;
    let quantity = positive_quantity(request.quantity)?;
    Ok((product_id, quantity))
}

fn positive_quantity(quantity: i64) -> Result<u32, ValidationError> {
    u32::try_from(quantity)
        .ok()
        .filter(|quantity| *quantity > 0)
        .ok_or(ValidationError::InvalidQuantity(quantity))
}

/// Parses a status name, ignoring case and surrounding whitespace
///
/// # Errors
///
/// Returns [`ValidationError::InvalidStatus`] for unknown names.
pub fn parse_status(input: &str) -> Result<OrderStatus, ValidationError> {
    input.parse()
}

/// Checks that a product can be added to an order
///
/// # Errors
///
/// - [`ValidationError::UnknownProduct`]: not in the catalog
/// - [`ValidationError::InvalidQuantity`]: zero quantity
pub fn validate_item(
    catalog: &Catalog,
    product_id: ProductId,
    quantity: u32,
) -> Result<(), ValidationError> {
    if !catalog.contains(product_id) {
        return Err(ValidationError::UnknownProduct(i64::from(product_id.value())));
    }
    if quantity == 0 {
        return Err(ValidationError::InvalidQuantity(0));
    }
    Ok(())
}

/// Checks that the basket is still open
///
/// # Errors
///
/// Returns [`ValidationError::OrderLocked`] once checkout has started or the
/// status has moved past `DEFAULT`.
pub fn ensure_basket_open(state: &OrderWorkflowState) -> Result<(), ValidationError> {
    if state.checkout_started() || state.order.status != OrderStatus::Default {
        return Err(ValidationError::OrderLocked);
    }
    Ok(())
}

/// Checks a decoded command against the current state
///
/// Results of activities and timers are never validated; they describe
/// something that already happened.
///
/// # Errors
///
/// Returns the first [`ValidationError`] that applies.
pub fn validate_command(
    catalog: &Catalog,
    state: &OrderWorkflowState,
    action: &OrderAction,
) -> Result<(), ValidationError> {
    if action.is_command() && state.cancellation().is_requested() {
        return Err(ValidationError::Cancelled);
    }

    match action {
        OrderAction::AddItem {
            product_id,
            quantity,
            ..
        } => {
            validate_item(catalog, *product_id, *quantity)?;
            ensure_basket_open(state)
        }
        OrderAction::RemoveItem { quantity, .. } => {
            if *quantity == 0 {
                return Err(ValidationError::InvalidQuantity(0));
            }
            ensure_basket_open(state)
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use orderflow_core::workflow::UpdateId;

    fn request(product_id: i64, quantity: i64) -> ItemRequest {
        ItemRequest {
            product_id,
            quantity,
        }
    }

    #[test]
    fn item_fields_accepts_positive_values() {
        assert_eq!(item_fields(&request(1, 2)), Ok((ProductId::new(1), 2)));
    }

    #[test]
    fn item_fields_rejects_non_positive_quantity() {
        assert_eq!(item_fields(&request(1, 0)), Err(ValidationError::InvalidQuantity(0)));
        assert_eq!(item_fields(&request(1, -1)), Err(ValidationError::InvalidQuantity(-1)));
    }

    #[test]
    fn catalog_item_reports_unknown_product_before_quantity() {
        let catalog = Catalog::standard();
        assert_eq!(
            catalog_item(&catalog, &request(9999, 0)),
            Err(ValidationError::UnknownProduct(9999))
        );
        assert_eq!(
            catalog_item(&catalog, &request(9999, -3)),
            Err(ValidationError::UnknownProduct(9999))
        );
        assert_eq!(
            catalog_item(&catalog, &request(2, 0)),
            Err(ValidationError::InvalidQuantity(0))
        );
        assert_eq!(catalog_item(&catalog, &request(2, 3)), Ok((ProductId::new(2), 3)));
    }

    #[test]
    fn item_fields_reports_product_before_quantity() {
        assert_eq!(item_fields(&request(-5, -1)), Err(ValidationError::UnknownProduct(-5)));
    }

    #[test]
    fn unknown_product_is_rejected() {
        let catalog = Catalog::standard();
        assert_eq!(
            validate_item(&catalog, ProductId::new(9999), 1),
            Err(ValidationError::UnknownProduct(9999))
        );
        assert_eq!(
            validate_item(&catalog, ProductId::new(9999), 0),
            Err(ValidationError::UnknownProduct(9999))
        );
        assert_eq!(validate_item(&catalog, ProductId::new(3), 1), Ok(()));
    }

    #[test]
    fn status_names_parse_case_insensitively() {
        assert_eq!(parse_status("ready"), Ok(OrderStatus::Ready));
        assert_eq!(
            parse_status("BOGUS"),
            Err(ValidationError::InvalidStatus("BOGUS".to_string()))
        );
    }

    #[test]
    fn basket_locks_after_status_moves() {
        let mut state = OrderWorkflowState::default();
        assert_eq!(ensure_basket_open(&state), Ok(()));

        state.order.status = OrderStatus::Pending;
        assert_eq!(ensure_basket_open(&state), Err(ValidationError::OrderLocked));
    }

    #[test]
    fn feedback_actions_are_never_rejected() {
        let mut state = OrderWorkflowState::default();
        state.order.status = OrderStatus::Rejected;

        let action = OrderAction::RefundIssued {
            update_id: UpdateId::new("u-1"),
        };
        assert_eq!(validate_command(&Catalog::standard(), &state, &action), Ok(()));
    }
}
