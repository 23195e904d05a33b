//! The order state machine.
//!
//! Every input the order accepts is an [`OrderAction`]: caller commands
//! (`ADD_ITEM`, `REMOVE_ITEM`, `UPDATE_STATUS`, `CHECKOUT`) and the results of
//! the gateway calls and timers the machine asked the host to run. The reducer
//! is the only place that mutates [`OrderWorkflowState`].
//!
//! # Checkout
//!
//! `CHECKOUT` runs at most once: capture payment for the order total, set the
//! status to `PENDING`, notify the customer, then arm the completion timeout.
//! A failed capture fails the instance with the status still `DEFAULT`.
//!
//! # Status updates
//!
//! An admitted `UPDATE_STATUS` marks the update in progress and applies the
//! status. `REJECTED` first refunds the payment and requests cancellation.
//! Every status update then notifies the customer. The update settles when its
//! last gateway call returns; gateway failures are fatal to the instance.
//!
//! A rejection that arrives while the payment capture is still running waits
//! for it: the refund is issued once the capture succeeded, and skipped if it
//! failed.
//!
//! # Completion
//!
//! The instance completes once checkout finished, the status is `COMPLETED`
//! and no update is in progress. It is cancelled once a rejection settled and
//! no checkout call is in flight, and fails with
//! [`OrderFailure::AwaitTimeout`] if neither happens in time.

use crate::catalog::Catalog;
use crate::gateway::OrderGateway;
use crate::types::{Money, OrderState, OrderStatus, ProductId};
use orderflow_core::effect::{Activity, ActivityError, Effect, EffectId};
use orderflow_core::reducer::Reducer;
use orderflow_core::workflow::{RunStatus, UpdateId};
use orderflow_core::{SmallVec, smallvec};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Activity names, as they appear in logs
pub mod activities {
    /// Payment capture during checkout
    pub const TAKE_PAYMENT: &str = "take_payment";
    /// Refund after a rejection
    pub const REFUND_PAYMENT: &str = "refund_payment";
    /// Customer notification of a status change
    pub const SEND_NOTIFICATION: &str = "send_notification";
}

/// How long an order may wait for completion after checkout
pub const DEFAULT_AWAIT_TIMEOUT: Duration = Duration::from_secs(60 * 60);

// ============================================================================
// Failures
// ============================================================================

/// Fatal failure of an order instance
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OrderFailure {
    /// Payment capture failed during checkout
    #[error("payment failed: {0}")]
    PaymentFailed(String),

    /// Refund after a rejection failed
    #[error("refund failed: {0}")]
    RefundFailed(String),

    /// Customer notification failed
    #[error("notification failed: {0}")]
    NotificationFailed(String),

    /// The order did not complete in time
    #[error("order did not complete before the timeout")]
    AwaitTimeout,
}

// ============================================================================
// Actions
// ============================================================================

/// Every input of the order machine
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderAction {
    // Commands
    /// Add units of a product to the basket
    AddItem {
        /// Update delivery id
        update_id: UpdateId,
        /// Catalog product
        product_id: ProductId,
        /// Units to add
        quantity: u32,
    },
    /// Remove units of a product from the basket
    RemoveItem {
        /// Update delivery id
        update_id: UpdateId,
        /// Catalog product
        product_id: ProductId,
        /// Units to remove
        quantity: u32,
    },
    /// Restaurant-driven status change
    UpdateStatus {
        /// Update delivery id
        update_id: UpdateId,
        /// New status
        status: OrderStatus,
    },
    /// Start checkout
    Checkout,

    // Gateway results
    /// Payment captured
    PaymentTaken,
    /// Payment capture gave up
    PaymentFailed {
        /// Final gateway error
        error: String,
    },
    /// Refund issued for a rejection
    RefundIssued {
        /// The rejecting update
        update_id: UpdateId,
    },
    /// Refund gave up
    RefundFailed {
        /// The rejecting update
        update_id: UpdateId,
        /// Final gateway error
        error: String,
    },
    /// Customer notified; `update_id` is `None` for the checkout notification
    NotificationSent {
        /// Update that triggered the notification
        update_id: Option<UpdateId>,
        /// Status the customer was told about
        status: OrderStatus,
    },
    /// Notification gave up
    NotificationFailed {
        /// Update that triggered the notification
        update_id: Option<UpdateId>,
        /// Status the customer should have been told about
        status: OrderStatus,
        /// Final gateway error
        error: String,
    },

    // Timers
    /// The completion timeout elapsed
    AwaitTimedOut,
}

impl OrderAction {
    /// Whether this action comes from a caller rather than from an effect
    #[must_use]
    pub const fn is_command(&self) -> bool {
        matches!(
            self,
            Self::AddItem { .. } | Self::RemoveItem { .. } | Self::UpdateStatus { .. } | Self::Checkout
        )
    }
}

// ============================================================================
// State
// ============================================================================

/// Progress of the checkout path
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CheckoutPhase {
    /// `CHECKOUT` not received yet
    #[default]
    NotStarted,
    /// Payment capture in flight
    TakingPayment,
    /// `PENDING` notification in flight
    NotifyingPending,
    /// Waiting for the order to complete
    AwaitingCompletion,
    /// Stopped by a rejection
    Halted,
}

impl CheckoutPhase {
    /// Whether a checkout gateway call is running
    #[must_use]
    pub const fn in_flight(self) -> bool {
        matches!(self, Self::TakingPayment | Self::NotifyingPending)
    }
}

/// Cooperative cancellation token
///
/// Requested by the rejecting update. Until then any side effect may start;
/// afterwards only the rejecting update's own refund and notification may.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Cancellation {
    requested_by: Option<UpdateId>,
    effective: bool,
}

impl Cancellation {
    /// Whether cancellation has been requested
    #[must_use]
    pub const fn is_requested(&self) -> bool {
        self.requested_by.is_some()
    }

    /// Whether cancellation has taken effect
    #[must_use]
    pub const fn is_effective(&self) -> bool {
        self.effective
    }

    /// Whether a new side effect may start on behalf of `update_id`
    ///
    /// `None` stands for the checkout path.
    #[must_use]
    pub fn permits(&self, update_id: Option<&UpdateId>) -> bool {
        self.requested_by
            .as_ref()
            .is_none_or(|requested_by| update_id == Some(requested_by))
    }

    fn request(&mut self, update_id: UpdateId) {
        if self.requested_by.is_none() {
            self.requested_by = Some(update_id);
        }
    }
}

/// Full machine state: the order record plus the bookkeeping the machine
/// needs to sequence side effects
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OrderWorkflowState {
    /// The order record answered by `GET_STATUS`
    pub order: OrderState,
    checkout: CheckoutPhase,
    cancellation: Cancellation,
    /// Rejection whose refund waits for the payment capture
    deferred_refund: Option<UpdateId>,
    pending_updates: BTreeSet<UpdateId>,
    settled_updates: BTreeMap<UpdateId, Result<(), OrderFailure>>,
    failure: Option<OrderFailure>,
    next_effect: u64,
}

impl OrderWorkflowState {
    /// State of a freshly started order
    #[must_use]
    pub fn new(order: OrderState) -> Self {
        Self {
            order,
            ..Self::default()
        }
    }

    /// Progress of the checkout path
    #[must_use]
    pub const fn checkout_phase(&self) -> CheckoutPhase {
        self.checkout
    }

    /// Whether `CHECKOUT` has been applied
    #[must_use]
    pub fn checkout_started(&self) -> bool {
        self.checkout != CheckoutPhase::NotStarted
    }

    /// The cancellation token
    #[must_use]
    pub const fn cancellation(&self) -> &Cancellation {
        &self.cancellation
    }

    /// First fatal failure, if any
    #[must_use]
    pub const fn failure(&self) -> Option<&OrderFailure> {
        self.failure.as_ref()
    }

    /// Outcome of a settled update
    #[must_use]
    pub fn update_outcome(&self, update_id: &UpdateId) -> Option<Result<(), OrderFailure>> {
        self.settled_updates.get(update_id).cloned()
    }

    /// Lifecycle position derived from the state
    #[must_use]
    pub fn run_status(&self) -> RunStatus<OrderFailure> {
        if let Some(failure) = &self.failure {
            RunStatus::Failed(failure.clone())
        } else if self.cancellation.effective {
            RunStatus::Cancelled
        } else if self.checkout == CheckoutPhase::AwaitingCompletion
            && self.order.status == OrderStatus::Completed
            && !self.order.update_in_progress
        {
            RunStatus::Completed
        } else {
            RunStatus::Running
        }
    }

    fn allocate_effect(&mut self) -> EffectId {
        let id = EffectId::new(self.next_effect);
        self.next_effect += 1;
        id
    }

    fn begin_update(&mut self, update_id: UpdateId) {
        self.pending_updates.insert(update_id);
        self.order.update_in_progress = true;
    }

    fn settle_update(&mut self, update_id: UpdateId, outcome: Result<(), OrderFailure>) {
        self.pending_updates.remove(&update_id);
        self.settled_updates.insert(update_id, outcome);
        self.order.update_in_progress = !self.pending_updates.is_empty();
        self.apply_cancellation();
    }

    /// In-flight updates and checkout calls finish before a rejection takes effect.
    fn apply_cancellation(&mut self) {
        if self.cancellation.is_requested()
            && self.pending_updates.is_empty()
            && !self.checkout.in_flight()
        {
            self.cancellation.effective = true;
        }
    }

    fn fail(&mut self, failure: OrderFailure) {
        if self.failure.is_none() {
            self.failure = Some(failure);
        }
    }
}

// ============================================================================
// Environment
// ============================================================================

/// Dependencies injected into the order machine
#[derive(Clone)]
pub struct OrderEnvironment {
    /// Payment and notification gateway
    pub gateway: Arc<dyn OrderGateway>,
    /// Completion timeout armed after checkout
    pub await_timeout: Duration,
}

impl OrderEnvironment {
    /// Environment with the default one-hour completion timeout
    #[must_use]
    pub fn new(gateway: Arc<dyn OrderGateway>) -> Self {
        Self {
            gateway,
            await_timeout: DEFAULT_AWAIT_TIMEOUT,
        }
    }

    /// Override the completion timeout
    #[must_use]
    pub const fn with_await_timeout(mut self, await_timeout: Duration) -> Self {
        self.await_timeout = await_timeout;
        self
    }
}

impl fmt::Debug for OrderEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderEnvironment")
            .field("await_timeout", &self.await_timeout)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Reducer
// ============================================================================

/// The food order workflow
#[derive(Clone, Debug)]
pub struct OrderWorkflow {
    catalog: Arc<Catalog>,
}

impl OrderWorkflow {
    /// Workflow pricing orders from `catalog`
    #[must_use]
    pub const fn new(catalog: Arc<Catalog>) -> Self {
        Self { catalog }
    }

    /// The shared catalog
    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    fn checkout(
        &self,
        state: &mut OrderWorkflowState,
        env: &OrderEnvironment,
    ) -> SmallVec<[Effect<OrderAction>; 4]> {
        if state.checkout_started() || !state.cancellation.permits(None) {
            tracing::debug!(phase = ?state.checkout, "Ignoring repeated checkout");
            return smallvec![Effect::None];
        }

        state.checkout = CheckoutPhase::TakingPayment;
        let amount = self.catalog.total(&state.order);
        smallvec![take_payment(state.allocate_effect(), env, amount)]
    }

    fn update_status(
        &self,
        state: &mut OrderWorkflowState,
        env: &OrderEnvironment,
        update_id: UpdateId,
        status: OrderStatus,
    ) -> SmallVec<[Effect<OrderAction>; 4]> {
        state.begin_update(update_id.clone());
        state.order.status = status;

        if status == OrderStatus::Rejected {
            state.cancellation.request(update_id.clone());
            if state.checkout == CheckoutPhase::TakingPayment {
                tracing::debug!(%update_id, "Refund waits for the payment capture");
                state.deferred_refund = Some(update_id);
                return smallvec![Effect::None];
            }
            let amount = self.catalog.total(&state.order);
            return smallvec![refund_payment(state.allocate_effect(), env, update_id, amount)];
        }

        smallvec![send_notification(
            state.allocate_effect(),
            env,
            Some(update_id),
            status
        )]
    }
}

impl Default for OrderWorkflow {
    fn default() -> Self {
        Self::new(Arc::new(Catalog::standard()))
    }
}

impl Reducer for OrderWorkflow {
    type State = OrderWorkflowState;
    type Action = OrderAction;
    type Environment = OrderEnvironment;

    #[allow(clippy::too_many_lines)] // One arm per action
    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            OrderAction::AddItem {
                update_id,
                product_id,
                quantity,
            } => {
                state.order.add_item(product_id, quantity);
                state.settle_update(update_id, Ok(()));
                smallvec![Effect::None]
            }

            OrderAction::RemoveItem {
                update_id,
                product_id,
                quantity,
            } => {
                state.order.remove_item(product_id, quantity);
                state.settle_update(update_id, Ok(()));
                smallvec![Effect::None]
            }

            OrderAction::Checkout => self.checkout(state, env),

            OrderAction::PaymentTaken => {
                if state.checkout != CheckoutPhase::TakingPayment {
                    return smallvec![Effect::None];
                }
                if let Some(rejected_by) = state.deferred_refund.take() {
                    state.checkout = CheckoutPhase::Halted;
                    let amount = self.catalog.total(&state.order);
                    return smallvec![refund_payment(
                        state.allocate_effect(),
                        env,
                        rejected_by,
                        amount
                    )];
                }

                // A status update may have overtaken the payment.
                if state.order.status == OrderStatus::Default {
                    state.order.status = OrderStatus::Pending;
                }
                state.checkout = CheckoutPhase::NotifyingPending;
                smallvec![send_notification(
                    state.allocate_effect(),
                    env,
                    None,
                    OrderStatus::Pending
                )]
            }

            OrderAction::PaymentFailed { error } => {
                if let Some(rejected_by) = state.deferred_refund.take() {
                    tracing::info!(%error, "Payment never captured, rejecting without refund");
                    state.checkout = CheckoutPhase::Halted;
                    return smallvec![send_notification(
                        state.allocate_effect(),
                        env,
                        Some(rejected_by),
                        OrderStatus::Rejected
                    )];
                }
                state.fail(OrderFailure::PaymentFailed(error));
                smallvec![Effect::None]
            }

            OrderAction::UpdateStatus { update_id, status } => {
                self.update_status(state, env, update_id, status)
            }

            OrderAction::RefundIssued { update_id } => {
                if !state.cancellation.permits(Some(&update_id)) {
                    return smallvec![Effect::None];
                }
                smallvec![send_notification(
                    state.allocate_effect(),
                    env,
                    Some(update_id),
                    OrderStatus::Rejected
                )]
            }

            OrderAction::RefundFailed { update_id, error } => {
                let failure = OrderFailure::RefundFailed(error);
                state.settle_update(update_id, Err(failure.clone()));
                state.fail(failure);
                smallvec![Effect::None]
            }

            OrderAction::NotificationSent {
                update_id: Some(update_id),
                ..
            } => {
                state.settle_update(update_id, Ok(()));
                smallvec![Effect::None]
            }

            OrderAction::NotificationSent { update_id: None, .. } => {
                if state.checkout != CheckoutPhase::NotifyingPending {
                    return smallvec![Effect::None];
                }
                if !state.cancellation.permits(None) {
                    state.checkout = CheckoutPhase::Halted;
                    state.apply_cancellation();
                    return smallvec![Effect::None];
                }
                state.checkout = CheckoutPhase::AwaitingCompletion;
                smallvec![Effect::Timer {
                    id: state.allocate_effect(),
                    duration: env.await_timeout,
                    action: Box::new(OrderAction::AwaitTimedOut),
                }]
            }

            OrderAction::NotificationFailed {
                update_id, error, ..
            } => {
                let failure = OrderFailure::NotificationFailed(error);
                if let Some(update_id) = update_id {
                    state.settle_update(update_id, Err(failure.clone()));
                }
                state.fail(failure);
                smallvec![Effect::None]
            }

            OrderAction::AwaitTimedOut => {
                if !state.run_status().is_terminal() {
                    state.fail(OrderFailure::AwaitTimeout);
                }
                smallvec![Effect::None]
            }
        }
    }
}

// ============================================================================
// Effect builders
// ============================================================================

fn take_payment(id: EffectId, env: &OrderEnvironment, amount: Money) -> Effect<OrderAction> {
    let gateway = Arc::clone(&env.gateway);
    Effect::Activity(Activity::new(
        id,
        activities::TAKE_PAYMENT,
        move || {
            let call = gateway.take_payment(amount);
            async move {
                call.await
                    .map(|()| OrderAction::PaymentTaken)
                    .map_err(ActivityError::from)
            }
        },
        |error| OrderAction::PaymentFailed {
            error: error.message,
        },
    ))
}

fn refund_payment(
    id: EffectId,
    env: &OrderEnvironment,
    update_id: UpdateId,
    amount: Money,
) -> Effect<OrderAction> {
    let gateway = Arc::clone(&env.gateway);
    let refunded_for = update_id.clone();
    Effect::Activity(Activity::new(
        id,
        activities::REFUND_PAYMENT,
        move || {
            let call = gateway.refund_payment(amount);
            let update_id = refunded_for.clone();
            async move {
                call.await
                    .map(|()| OrderAction::RefundIssued { update_id })
                    .map_err(ActivityError::from)
            }
        },
        move |error| OrderAction::RefundFailed {
            update_id,
            error: error.message,
        },
    ))
}

fn send_notification(
    id: EffectId,
    env: &OrderEnvironment,
    update_id: Option<UpdateId>,
    status: OrderStatus,
) -> Effect<OrderAction> {
    let gateway = Arc::clone(&env.gateway);
    let notified_for = update_id.clone();
    Effect::Activity(Activity::new(
        id,
        activities::SEND_NOTIFICATION,
        move || {
            let call = gateway.send_notification(status);
            let update_id = notified_for.clone();
            async move {
                call.await
                    .map(|()| OrderAction::NotificationSent { update_id, status })
                    .map_err(ActivityError::from)
            }
        },
        move |error| OrderAction::NotificationFailed {
            update_id,
            status,
            error: error.message,
        },
    ))
}
