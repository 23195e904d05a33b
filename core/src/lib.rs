//! # Orderflow Core
//!
//! Core traits and types for durable, reducer-driven workflows.
//!
//! A workflow is a pure state machine. Every input it accepts (an update from a
//! caller, a signal, the result of a side effect, a timer firing) is an `Action`
//! folded into `State` by a [`Reducer`](reducer::Reducer). Side effects are never
//! performed inline: the reducer returns [`Effect`](effect::Effect) descriptions
//! and the host executes them, journals their results, and feeds the resulting
//! actions back in.
//!
//! Because the reducer is the only mutation gate and is deterministic, an
//! instance can be rebuilt after a crash by replaying its journal.
//!
//! ## Core Concepts
//!
//! - **State**: The instance's durable record
//! - **Action**: Every input the instance accepts, including side-effect results
//! - **Reducer**: Pure function `(State, Action, Environment) → (State, Effects)`
//! - **Effect**: Activity and timer descriptions (not execution)
//! - **Journal**: Append-only log of admitted actions, the source of replay
//! - **Workflow**: The host-facing contract (decoding, validation, queries, status)
//!
//! ## Example
//!
//! ```ignore
//! impl Reducer for OrderWorkflow {
//!     type State = OrderWorkflowState;
//!     type Action = OrderAction;
//!     type Environment = OrderEnvironment;
//!
//!     fn reduce(
//!         &self,
//!         state: &mut OrderWorkflowState,
//!         action: OrderAction,
//!         env: &OrderEnvironment,
//!     ) -> SmallVec<[Effect<OrderAction>; 4]> {
//!         match action {
//!             OrderAction::Checkout => smallvec![self.take_payment(state, env)],
//!             _ => smallvec![Effect::None],
//!         }
//!     }
//! }
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};
pub use smallvec::{SmallVec, smallvec};

/// Append-only journal of admitted actions
pub mod journal;

/// Host-facing workflow contract
pub mod workflow;

/// Reducer module - the single mutation gate for workflow state
///
/// Reducers are pure functions: `(State, Action, Environment) → (State, Effects)`.
/// Given the same ordered actions they produce the same state and the same effect
/// descriptions, which is what makes journal replay sound.
pub mod reducer {
    use super::effect::Effect;
    use smallvec::SmallVec;

    /// The Reducer trait - core abstraction for workflow logic
    ///
    /// # Type Parameters
    ///
    /// - `State`: The durable state this reducer operates on
    /// - `Action`: Every input the reducer processes
    /// - `Environment`: Injected dependencies (gateways, timeouts)
    ///
    /// The environment may only be used to *build* effect descriptions. Reading
    /// it to decide state transitions would break replay determinism.
    pub trait Reducer {
        /// The state type this reducer operates on
        type State;

        /// The action type this reducer processes
        type Action;

        /// The environment type with injected dependencies
        type Environment;

        /// Reduce an action into state changes and effects
        ///
        /// # Arguments
        ///
        /// - `state`: Mutable reference to current state
        /// - `action`: The action to process
        /// - `env`: Reference to injected dependencies
        ///
        /// # Returns
        ///
        /// Effect descriptions to be executed by the host
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]>;
    }
}

/// Effect module - side effect descriptions
///
/// Effects are values. The reducer returns them, the host runs them. Each
/// effect that produces a result carries an [`EffectId`](effect::EffectId)
/// allocated from workflow state, so the journal can tell which effects already
/// completed when an instance is replayed.
pub mod effect {
    use futures::future::BoxFuture;
    use serde::{Deserialize, Serialize};
    use std::fmt;
    use std::future::Future;
    use std::time::Duration;
    use thiserror::Error;

    /// Deterministic identifier of an effect within one instance
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
    pub struct EffectId(u64);

    impl EffectId {
        /// Create an effect id from its sequence number
        #[must_use]
        pub const fn new(value: u64) -> Self {
            Self(value)
        }

        /// Get the raw sequence number
        #[must_use]
        pub const fn value(self) -> u64 {
            self.0
        }

        /// The id that follows this one
        #[must_use]
        pub const fn next(self) -> Self {
            Self(self.0 + 1)
        }
    }

    impl fmt::Display for EffectId {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "effect-{}", self.0)
        }
    }

    /// Failure of a single activity attempt
    ///
    /// Retryable failures are retried by the host according to its retry policy.
    /// Non-retryable failures end the activity immediately.
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    #[error("{message}")]
    pub struct ActivityError {
        /// Human-readable failure description
        pub message: String,
        /// Whether another attempt may succeed
        pub retryable: bool,
    }

    impl ActivityError {
        /// A transient failure (timeouts, unavailable services)
        #[must_use]
        pub fn retryable(message: impl Into<String>) -> Self {
            Self {
                message: message.into(),
                retryable: true,
            }
        }

        /// A permanent failure (declined card, invalid request)
        #[must_use]
        pub fn non_retryable(message: impl Into<String>) -> Self {
            Self {
                message: message.into(),
                retryable: false,
            }
        }
    }

    type ActivityCall<Action> =
        Box<dyn Fn() -> BoxFuture<'static, Result<Action, ActivityError>> + Send + Sync>;

    type FailureMapper<Action> = Box<dyn FnOnce(ActivityError) -> Action + Send + Sync>;

    /// A retryable remote call that feeds exactly one action back into the reducer
    ///
    /// `call` is invoked once per attempt. When the host gives up, the last error
    /// is turned into an action with the failure mapper, so the reducer always
    /// learns how the activity ended.
    pub struct Activity<Action> {
        id: EffectId,
        name: &'static str,
        call: ActivityCall<Action>,
        on_failure: FailureMapper<Action>,
    }

    impl<Action: 'static> Activity<Action> {
        /// Describe an activity
        ///
        /// # Arguments
        ///
        /// - `id`: Deterministic effect id allocated by the reducer
        /// - `name`: Activity name used in logs
        /// - `call`: Produces one attempt of the remote call
        /// - `on_failure`: Maps the final error into an action
        pub fn new<F, Fut, G>(id: EffectId, name: &'static str, call: F, on_failure: G) -> Self
        where
            F: Fn() -> Fut + Send + Sync + 'static,
            Fut: Future<Output = Result<Action, ActivityError>> + Send + 'static,
            G: FnOnce(ActivityError) -> Action + Send + Sync + 'static,
        {
            Self {
                id,
                name,
                call: Box::new(move || -> BoxFuture<'static, Result<Action, ActivityError>> {
                    Box::pin(call())
                }),
                on_failure: Box::new(on_failure),
            }
        }
    }

    impl<Action> Activity<Action> {
        /// Effect id of this activity
        #[must_use]
        pub const fn id(&self) -> EffectId {
            self.id
        }

        /// Activity name
        #[must_use]
        pub const fn name(&self) -> &'static str {
            self.name
        }

        /// Start one attempt
        pub fn attempt(&self) -> BoxFuture<'static, Result<Action, ActivityError>> {
            (self.call)()
        }

        /// Give up and convert the final error into an action
        pub fn fail(self, error: ActivityError) -> Action {
            (self.on_failure)(error)
        }
    }

    /// Effect type - describes a side effect to be executed
    ///
    /// # Type Parameters
    ///
    /// - `Action`: The action type that effects produce (feedback loop)
    pub enum Effect<Action> {
        /// No-op effect
        None,

        /// Retryable remote call whose outcome is journaled and fed back
        Activity(Activity<Action>),

        /// Durable timer that dispatches `action` after `duration`
        Timer {
            /// Effect id of the timer
            id: EffectId,
            /// How long to wait
            duration: Duration,
            /// Action to dispatch when the timer fires
            action: Box<Action>,
        },
    }

    impl<Action> Effect<Action> {
        /// Effect id, if this effect produces a result
        #[must_use]
        pub const fn id(&self) -> Option<EffectId> {
            match self {
                Effect::None => None,
                Effect::Activity(activity) => Some(activity.id),
                Effect::Timer { id, .. } => Some(*id),
            }
        }
    }

    // Manual Debug implementation since activity closures don't implement Debug
    impl<Action> fmt::Debug for Effect<Action>
    where
        Action: fmt::Debug,
    {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                Effect::None => write!(f, "Effect::None"),
                Effect::Activity(activity) => f
                    .debug_struct("Effect::Activity")
                    .field("id", &activity.id)
                    .field("name", &activity.name)
                    .finish_non_exhaustive(),
                Effect::Timer {
                    id,
                    duration,
                    action,
                } => f
                    .debug_struct("Effect::Timer")
                    .field("id", id)
                    .field("duration", duration)
                    .field("action", action)
                    .finish(),
            }
        }
    }
}

/// Environment module - dependency injection traits
///
/// Wall-clock time is only read by the host (to stamp journal records),
/// never by reducers.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::effect::{Activity, ActivityError, Effect, EffectId};

    #[derive(Debug, PartialEq)]
    enum Ping {
        Pong(u32),
        Lost(String),
    }

    #[tokio::test]
    async fn activity_attempt_runs_the_call_each_time() {
        let activity = Activity::new(
            EffectId::new(7),
            "ping",
            || async { Ok(Ping::Pong(1)) },
            |error| Ping::Lost(error.message),
        );

        assert_eq!(activity.attempt().await, Ok(Ping::Pong(1)));
        assert_eq!(activity.attempt().await, Ok(Ping::Pong(1)));
        assert_eq!(activity.id(), EffectId::new(7));
        assert_eq!(activity.name(), "ping");
    }

    #[test]
    fn activity_failure_maps_to_action() {
        let activity = Activity::new(
            EffectId::new(1),
            "ping",
            || async { Err::<Ping, _>(ActivityError::non_retryable("gone")) },
            |error| Ping::Lost(error.message),
        );

        assert_eq!(
            activity.fail(ActivityError::non_retryable("gone")),
            Ping::Lost("gone".to_string())
        );
    }

    #[test]
    fn effect_ids_are_exposed_for_result_bearing_effects() {
        let timer: Effect<Ping> = Effect::Timer {
            id: EffectId::new(3),
            duration: std::time::Duration::from_secs(1),
            action: Box::new(Ping::Pong(0)),
        };

        assert_eq!(timer.id(), Some(EffectId::new(3)));
        assert_eq!(Effect::<Ping>::None.id(), None);
        assert_eq!(EffectId::new(3).next(), EffectId::new(4));
        assert_eq!(EffectId::new(3).to_string(), "effect-3");
    }

    #[test]
    fn error_constructors_set_retryability() {
        assert!(ActivityError::retryable("timeout").retryable);
        assert!(!ActivityError::non_retryable("declined").retryable);
    }
}
