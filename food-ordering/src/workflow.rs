//! Wire contract of the order workflow: handler names, payload decoding,
//! queries and run status.

use crate::reducer::{OrderAction, OrderFailure, OrderWorkflow, OrderWorkflowState};
use crate::types::{OrderInput, OrderState};
use crate::validation::{self, ItemRequest, ValidationError};
use orderflow_core::workflow::{RunStatus, UpdateId, Workflow};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Wire-level handler names
pub mod names {
    /// Query: current order record
    pub const GET_STATUS: &str = "GET_STATUS";
    /// Update: `{productId, quantity}`
    pub const ADD_ITEM: &str = "ADD_ITEM";
    /// Update: `{productId, quantity}`
    pub const REMOVE_ITEM: &str = "REMOVE_ITEM";
    /// Update: status name, either a bare string or `{status}`
    pub const UPDATE_STATUS: &str = "UPDATE_STATUS";
    /// Signal: start checkout
    pub const CHECKOUT: &str = "CHECKOUT";
}

use names::{ADD_ITEM, CHECKOUT, GET_STATUS, REMOVE_ITEM, UPDATE_STATUS};

impl Workflow for OrderWorkflow {
    type Input = OrderInput;
    type Rejection = ValidationError;
    type Failure = OrderFailure;

    const ID_PREFIX: &'static str = "order";

    fn initial_state(&self, input: OrderInput) -> OrderWorkflowState {
        OrderWorkflowState::new(OrderState::new(input))
    }

    fn decode_update(
        &self,
        name: &str,
        update_id: UpdateId,
        payload: Value,
    ) -> Result<OrderAction, ValidationError> {
        match name {
            ADD_ITEM => {
                let (product_id, quantity) =
                    validation::catalog_item(self.catalog(), &decode(name, payload)?)?;
                Ok(OrderAction::AddItem {
                    update_id,
                    product_id,
                    quantity,
                })
            }
            REMOVE_ITEM => {
                let (product_id, quantity) = validation::item_fields(&decode(name, payload)?)?;
                Ok(OrderAction::RemoveItem {
                    update_id,
                    product_id,
                    quantity,
                })
            }
            UPDATE_STATUS => {
                let status = validation::parse_status(&status_name(payload)?)?;
                Ok(OrderAction::UpdateStatus { update_id, status })
            }
            other => Err(ValidationError::UnknownHandler {
                kind: "update",
                name: other.to_string(),
            }),
        }
    }

    fn decode_signal(&self, name: &str, _payload: Value) -> Result<OrderAction, ValidationError> {
        match name {
            CHECKOUT => Ok(OrderAction::Checkout),
            other => Err(ValidationError::UnknownHandler {
                kind: "signal",
                name: other.to_string(),
            }),
        }
    }

    fn query(&self, name: &str, state: &OrderWorkflowState) -> Result<Value, ValidationError> {
        match name {
            GET_STATUS => serde_json::to_value(&state.order).map_err(|error| {
                ValidationError::Payload {
                    name: name.to_string(),
                    reason: error.to_string(),
                }
            }),
            other => Err(ValidationError::UnknownHandler {
                kind: "query",
                name: other.to_string(),
            }),
        }
    }

    fn validate(
        &self,
        state: &OrderWorkflowState,
        action: &OrderAction,
    ) -> Result<(), ValidationError> {
        validation::validate_command(self.catalog(), state, action)
    }

    fn update_outcome(
        &self,
        state: &OrderWorkflowState,
        update_id: &UpdateId,
    ) -> Option<Result<(), OrderFailure>> {
        state.update_outcome(update_id)
    }

    fn run_status(&self, state: &OrderWorkflowState) -> RunStatus<OrderFailure> {
        state.run_status()
    }
}

fn decode<T: DeserializeOwned>(name: &str, payload: Value) -> Result<T, ValidationError> {
    serde_json::from_value(payload).map_err(|error| ValidationError::Payload {
        name: name.to_string(),
        reason: error.to_string(),
    })
}

fn status_name(payload: Value) -> Result<String, ValidationError> {
    match payload {
        Value::String(status) => Ok(status),
        Value::Object(mut fields) => match fields.remove("status") {
            Some(Value::String(status)) => Ok(status),
            _ => Err(missing_status()),
        },
        _ => Err(missing_status()),
    }
}

fn missing_status() -> ValidationError {
    ValidationError::Payload {
        name: UPDATE_STATUS.to_string(),
        reason: "expected a status name".to_string(),
    }
}

/// Typed payload for [`names::ADD_ITEM`] and [`names::REMOVE_ITEM`]
///
/// # Errors
///
/// Returns [`ValidationError::Payload`] if the request cannot be encoded.
pub fn item_payload(product_id: i64, quantity: i64) -> Result<Value, ValidationError> {
    serde_json::to_value(ItemRequest {
        product_id,
        quantity,
    })
    .map_err(|error| ValidationError::Payload {
        name: ADD_ITEM.to_string(),
        reason: error.to_string(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::types::{OrderStatus, ProductId};
    use serde_json::json;

    fn decode_update(name: &str, payload: Value) -> Result<OrderAction, ValidationError> {
        OrderWorkflow::default().decode_update(name, UpdateId::new("u-1"), payload)
    }

    #[test]
    fn add_item_reports_unknown_product_before_zero_quantity() {
        assert_eq!(
            decode_update(ADD_ITEM, json!({"productId": 9999, "quantity": 0})),
            Err(ValidationError::UnknownProduct(9999))
        );
    }

    #[test]
    fn decodes_add_item() {
        assert_eq!(
            decode_update(ADD_ITEM, json!({"productId": 1, "quantity": 2})),
            Ok(OrderAction::AddItem {
                update_id: UpdateId::new("u-1"),
                product_id: ProductId::new(1),
                quantity: 2,
            })
        );
    }

    #[test]
    fn decodes_status_from_string_or_object() {
        let expected = Ok(OrderAction::UpdateStatus {
            update_id: UpdateId::new("u-1"),
            status: OrderStatus::Accepted,
        });
        assert_eq!(decode_update(UPDATE_STATUS, json!("accepted")), expected);
        assert_eq!(decode_update(UPDATE_STATUS, json!({"status": "ACCEPTED"})), expected);
    }

    #[test]
    fn rejects_bad_payloads() {
        assert_eq!(
            decode_update(UPDATE_STATUS, json!("BOGUS")),
            Err(ValidationError::InvalidStatus("BOGUS".to_string()))
        );
        assert_eq!(
            decode_update(ADD_ITEM, json!({"productId": 1, "quantity": -1})),
            Err(ValidationError::InvalidQuantity(-1))
        );
        assert!(matches!(
            decode_update(ADD_ITEM, json!({"productId": "chips"})),
            Err(ValidationError::Payload { .. })
        ));
        assert!(matches!(
            decode_update(UPDATE_STATUS, json!(42)),
            Err(ValidationError::Payload { .. })
        ));
    }

    #[test]
    fn unknown_handlers_are_rejected() {
        let workflow = OrderWorkflow::default();
        let state = OrderWorkflowState::default();

        assert!(matches!(
            decode_update("CANCEL", Value::Null),
            Err(ValidationError::UnknownHandler { kind: "update", .. })
        ));
        assert!(matches!(
            workflow.decode_signal("PAY", Value::Null),
            Err(ValidationError::UnknownHandler { kind: "signal", .. })
        ));
        assert!(matches!(
            workflow.query("GET_TOTAL", &state),
            Err(ValidationError::UnknownHandler { kind: "query", .. })
        ));
    }

    #[test]
    fn get_status_returns_order_record() {
        let workflow = OrderWorkflow::default();
        let state = workflow.initial_state(OrderInput {
            email: "sam@example.com".to_string(),
            ..OrderInput::default()
        });

        let status = workflow.query(GET_STATUS, &state).unwrap();
        assert_eq!(status["status"], "DEFAULT");
        assert_eq!(status["email"], "sam@example.com");
        assert_eq!(status["items"], json!({}));
    }

    #[test]
    fn item_payload_uses_wire_names() {
        assert_eq!(
            item_payload(3, 1).unwrap(),
            json!({"productId": 3, "quantity": 1})
        );
    }
}
