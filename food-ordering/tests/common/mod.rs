//! Shared fixtures for host-level order tests.

#![allow(dead_code)] // Not every test file uses every helper
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use food_ordering::workflow::{item_payload, names};
use food_ordering::{MockGateway, OrderEnvironment, OrderInput, OrderStatus, OrderWorkflow};
use orderflow_runtime::{Host, HostConfig, InstanceHandle, RetryPolicy};
use orderflow_testing::{InMemoryJournal, test_clock};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// A host wired to a mock gateway and an in-memory journal
pub struct Harness {
    pub host: Arc<Host<OrderWorkflow>>,
    pub gateway: Arc<MockGateway>,
    pub journal: Arc<InMemoryJournal>,
}

/// Retries fast enough for tests
pub fn fast_retries() -> HostConfig {
    HostConfig {
        retry_policy: RetryPolicy::builder()
            .max_attempts(3)
            .initial_backoff(Duration::from_millis(1))
            .max_backoff(Duration::from_millis(5))
            .build(),
    }
}

pub fn harness() -> Harness {
    harness_with(
        MockGateway::shared(),
        Arc::new(InMemoryJournal::new()),
        Duration::from_secs(3600),
    )
}

pub fn harness_with(
    gateway: Arc<MockGateway>,
    journal: Arc<InMemoryJournal>,
    await_timeout: Duration,
) -> Harness {
    let environment =
        OrderEnvironment::new(gateway.clone()).with_await_timeout(await_timeout);
    let host = Host::with_config(
        OrderWorkflow::default(),
        environment,
        journal.clone(),
        fast_retries(),
    )
    .with_clock(Arc::new(test_clock()));

    Harness {
        host: Arc::new(host),
        gateway,
        journal,
    }
}

pub fn input() -> OrderInput {
    OrderInput {
        email: "test@example.com".to_string(),
        collection: true,
        delivery_address: None,
    }
}

pub fn item(product_id: i64, quantity: i64) -> Value {
    item_payload(product_id, quantity).unwrap()
}

pub async fn status_of(host: &Host<OrderWorkflow>, order: &InstanceHandle) -> Value {
    host.query(order, names::GET_STATUS).await.unwrap()
}

/// Poll until `condition` holds, failing the test after five seconds
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// Poll `GET_STATUS` until the order reaches `wanted`
pub async fn wait_for_status(
    host: &Host<OrderWorkflow>,
    order: &InstanceHandle,
    wanted: OrderStatus,
) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while status_of(host, order).await["status"] != wanted.as_str() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("order never reached {wanted}"));
}

/// Start an order with two portions of chips and check it out
pub async fn checked_out_order(harness: &Harness) -> InstanceHandle {
    let host = &harness.host;
    let order = host.start_instance(input()).await.unwrap();
    host.send_update(&order, names::ADD_ITEM, item(1, 2))
        .await
        .unwrap();
    host.send_signal(&order, names::CHECKOUT, Value::Null)
        .await
        .unwrap();
    wait_for_status(host, &order, OrderStatus::Pending).await;
    order
}
