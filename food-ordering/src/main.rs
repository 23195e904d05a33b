//! Order starter.
//!
//! Starts one order against an in-memory journal and the mock gateway, walks
//! it from basket to `COMPLETED`, and prints the final order record.

use anyhow::Context;
use food_ordering::config::Config;
use food_ordering::workflow::{item_payload, names};
use food_ordering::{Address, MockGateway, OrderEnvironment, OrderInput, OrderStatus, OrderWorkflow};
use orderflow_runtime::{Host, InstanceHandle};
use orderflow_testing::InMemoryJournal;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        await_timeout_secs = config.order.await_timeout_secs,
        max_attempts = config.activities.max_attempts,
        "Configuration loaded"
    );

    let environment = OrderEnvironment::new(MockGateway::shared())
        .with_await_timeout(config.await_timeout());
    let host = Host::with_config(
        OrderWorkflow::default(),
        environment,
        Arc::new(InMemoryJournal::new()),
        config.host_config(),
    );

    let order = host
        .start_instance(OrderInput {
            email: "customer@example.com".to_string(),
            collection: false,
            delivery_address: Some(Address {
                line1: "1 Harbour Street".to_string(),
                town: "Whitby".to_string(),
                county: "North Yorkshire".to_string(),
                post_code: "YO21 3PU".to_string(),
                ..Address::default()
            }),
        })
        .await?;
    info!(order_id = %order.id(), "Order started");

    host.send_update(&order, names::ADD_ITEM, item_payload(1, 2)?)
        .await
        .context("adding chips")?;
    host.send_update(&order, names::ADD_ITEM, item_payload(2, 1)?)
        .await
        .context("adding cod")?;
    host.send_signal(&order, names::CHECKOUT, json!(null))
        .await
        .context("checking out")?;
    wait_for_status(&host, &order, OrderStatus::Pending).await?;

    for status in [
        OrderStatus::Accepted,
        OrderStatus::Preparing,
        OrderStatus::Ready,
        OrderStatus::Completed,
    ] {
        host.send_update(&order, names::UPDATE_STATUS, json!(status.as_str()))
            .await
            .with_context(|| format!("moving order to {status}"))?;
        info!(%status, "Status updated");
    }

    let final_state = host.await_result(&order).await?;
    println!("{}", serde_json::to_string_pretty(&final_state.order)?);

    host.shutdown().await;
    Ok(())
}

/// Poll `GET_STATUS` until the order reaches `wanted`
async fn wait_for_status(
    host: &Host<OrderWorkflow>,
    order: &InstanceHandle,
    wanted: OrderStatus,
) -> anyhow::Result<()> {
    tokio::time::timeout(Duration::from_secs(30), async {
        loop {
            let snapshot = host.query(order, names::GET_STATUS).await?;
            if snapshot["status"] == wanted.as_str() {
                return anyhow::Ok(());
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .with_context(|| format!("waiting for order to reach {wanted}"))?
}
