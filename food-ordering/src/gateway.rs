//! Side-effect gateway: payment capture, refunds and customer notifications.
//!
//! The order machine never calls the gateway directly. It describes each call
//! as an activity; the host runs it, retries transient failures, and journals
//! the outcome.

use crate::types::{Money, OrderStatus};
use orderflow_core::effect::ActivityError;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;

/// Gateway result
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Future returned by every gateway call
pub type GatewayFuture = Pin<Box<dyn Future<Output = GatewayResult<()>> + Send>>;

/// Gateway call failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// The provider refused the request; retrying will not help
    #[error("declined: {reason}")]
    Declined {
        /// Provider's reason
        reason: String,
    },

    /// The provider could not be reached
    #[error("service unavailable: {message}")]
    Unavailable {
        /// Transport error
        message: String,
    },

    /// The provider did not answer in time
    #[error("gateway timeout")]
    Timeout,
}

impl GatewayError {
    /// Whether another attempt may succeed
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        !matches!(self, Self::Declined { .. })
    }
}

impl From<GatewayError> for ActivityError {
    fn from(error: GatewayError) -> Self {
        Self {
            message: error.to_string(),
            retryable: error.is_retryable(),
        }
    }
}

/// Remote calls made on behalf of an order
pub trait OrderGateway: Send + Sync {
    /// Capture payment for the order total
    fn take_payment(&self, amount: Money) -> GatewayFuture;

    /// Refund a captured payment
    fn refund_payment(&self, amount: Money) -> GatewayFuture;

    /// Tell the customer about a status change
    fn send_notification(&self, status: OrderStatus) -> GatewayFuture;
}

/// Gateway operation, used to script mock failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayOperation {
    /// [`OrderGateway::take_payment`]
    TakePayment,
    /// [`OrderGateway::refund_payment`]
    RefundPayment,
    /// [`OrderGateway::send_notification`]
    SendNotification,
}

/// One recorded call to the mock gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    /// Payment capture of this amount
    TakePayment(Money),
    /// Refund of this amount
    RefundPayment(Money),
    /// Notification with this status
    SendNotification(OrderStatus),
}

impl GatewayCall {
    /// Operation this call belongs to
    #[must_use]
    pub const fn operation(&self) -> GatewayOperation {
        match self {
            Self::TakePayment(_) => GatewayOperation::TakePayment,
            Self::RefundPayment(_) => GatewayOperation::RefundPayment,
            Self::SendNotification(_) => GatewayOperation::SendNotification,
        }
    }
}

/// In-process gateway for development and tests
///
/// Succeeds unless a failure was queued with [`MockGateway::fail_next`].
/// Every call is recorded when it starts, including ones that fail, and again
/// when it returns.
#[derive(Debug, Default)]
pub struct MockGateway {
    calls: Mutex<Vec<GatewayCall>>,
    returned: Arc<Mutex<Vec<GatewayCall>>>,
    failures: Mutex<HashMap<GatewayOperation, VecDeque<GatewayError>>>,
    latency: Duration,
}

impl MockGateway {
    /// Creates a mock gateway that answers immediately
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a mock gateway that waits `latency` before every answer
    #[must_use]
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    /// Creates an Arc-wrapped instance for sharing
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Make the next call of `operation` fail with `error`
    ///
    /// Queued failures are consumed in order, one per call.
    pub fn fail_next(&self, operation: GatewayOperation, error: GatewayError) {
        lock(&self.failures)
            .entry(operation)
            .or_default()
            .push_back(error);
    }

    /// All calls so far, in order
    #[must_use]
    pub fn calls(&self) -> Vec<GatewayCall> {
        lock(&self.calls).clone()
    }

    /// Number of calls of one operation
    #[must_use]
    pub fn count(&self, operation: GatewayOperation) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|call| call.operation() == operation)
            .count()
    }

    /// Number of calls of one operation that ran to the end
    #[must_use]
    pub fn returned_count(&self, operation: GatewayOperation) -> usize {
        lock(&self.returned)
            .iter()
            .filter(|call| call.operation() == operation)
            .count()
    }

    fn invoke(&self, call: GatewayCall) -> GatewayFuture {
        let failure = lock(&self.failures)
            .get_mut(&call.operation())
            .and_then(VecDeque::pop_front);
        lock(&self.calls).push(call.clone());
        let latency = self.latency;
        let returned = Arc::clone(&self.returned);

        Box::pin(async move {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            lock(&returned).push(call.clone());
            match failure {
                Some(error) => {
                    tracing::warn!(call = ?call, error = %error, "Mock gateway call failed");
                    Err(error)
                }
                None => {
                    tracing::info!(call = ?call, "Mock gateway call succeeded");
                    Ok(())
                }
            }
        })
    }
}

impl OrderGateway for MockGateway {
    fn take_payment(&self, amount: Money) -> GatewayFuture {
        self.invoke(GatewayCall::TakePayment(amount))
    }

    fn refund_payment(&self, amount: Money) -> GatewayFuture {
        self.invoke(GatewayCall::RefundPayment(amount))
    }

    fn send_notification(&self, status: OrderStatus) -> GatewayFuture {
        self.invoke(GatewayCall::SendNotification(status))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
