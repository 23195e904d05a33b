//! # Food Ordering
//!
//! Durable lifecycle of a single food order, built on Orderflow.
//!
//! An order starts with an open basket (`ADD_ITEM`, `REMOVE_ITEM`). The
//! `CHECKOUT` signal captures payment and moves it to `PENDING`; from there the
//! restaurant drives it through `UPDATE_STATUS` until it is `COMPLETED`, or
//! `REJECTED` with a refund. Every status change notifies the customer.
//!
//! ## Modules
//!
//! - [`types`]: order record, status, money
//! - [`catalog`]: read-only product catalog
//! - [`validation`]: admission-time command checks
//! - [`gateway`]: payment, refund and notification calls, plus a mock
//! - [`reducer`]: the order state machine
//! - [`workflow`]: wire names and payload decoding for the host
//! - [`config`]: environment configuration
//!
//! ## Example
//!
//! ```no_run
//! use food_ordering::{MockGateway, OrderEnvironment, OrderInput, OrderWorkflow};
//! use food_ordering::workflow::names;
//! use orderflow_runtime::Host;
//! use orderflow_testing::InMemoryJournal;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let host = Host::new(
//!     OrderWorkflow::default(),
//!     OrderEnvironment::new(MockGateway::shared()),
//!     Arc::new(InMemoryJournal::new()),
//! );
//!
//! let order = host.start_instance(OrderInput::default()).await?;
//! host.send_update(&order, names::ADD_ITEM, json!({"productId": 1, "quantity": 2})).await?;
//! host.send_signal(&order, names::CHECKOUT, json!(null)).await?;
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod config;
pub mod gateway;
pub mod reducer;
pub mod types;
pub mod validation;
pub mod workflow;

pub use catalog::{Catalog, Product};
pub use gateway::{GatewayError, MockGateway, OrderGateway};
pub use reducer::{OrderAction, OrderEnvironment, OrderFailure, OrderWorkflow, OrderWorkflowState};
pub use types::{Address, Money, OrderInput, OrderState, OrderStatus, ProductId};
pub use validation::ValidationError;
