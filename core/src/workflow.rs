//! The contract between a workflow type and the durable execution host.
//!
//! A [`Workflow`] is a [`Reducer`] plus everything the host needs to drive it
//! from the outside: turning wire-level update and signal payloads into actions,
//! answering read-only queries, validating commands before admission, and
//! reporting how far the instance has progressed.

use crate::reducer::Reducer;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier of a workflow instance
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InstanceId(String);

impl InstanceId {
    /// Create an instance id from an existing value
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh id of the form `{prefix}-{uuid}`
    #[must_use]
    pub fn generate(prefix: &str) -> Self {
        Self(format!("{prefix}-{}", uuid::Uuid::new_v4().simple()))
    }

    /// Get the inner string
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of one update delivery
///
/// Callers that retry an update must reuse its id; the host then returns the
/// recorded outcome instead of applying the update twice.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UpdateId(String);

impl UpdateId {
    /// Create an update id from an existing value
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh random update id
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Get the inner string
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UpdateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle position of an instance as reported by its workflow
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus<F> {
    /// Still accepting commands
    Running,
    /// Completion predicate held
    Completed,
    /// Cooperative cancellation took effect
    Cancelled,
    /// First fatal failure
    Failed(F),
}

impl<F> RunStatus<F> {
    /// Whether the instance has stopped
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// Host-facing contract of a workflow type.
///
/// Implementations must keep every method a pure function of its arguments.
/// The host calls `validate` and `reduce` under the instance's write lock, and
/// `query`, `update_outcome` and `run_status` under its read lock.
pub trait Workflow:
    Reducer<
        State: Clone + Send + Sync + 'static,
        Action: Serialize + DeserializeOwned + fmt::Debug + Send + 'static,
        Environment: Send + Sync + 'static,
    > + Send
    + Sync
    + 'static
{
    /// Start input, journaled as the first record of every instance
    type Input: Serialize + DeserializeOwned + Send + 'static;

    /// Admission-time rejection (never mutates state)
    type Rejection: std::error::Error + Send + Sync + 'static;

    /// Fatal instance failure
    type Failure: std::error::Error + Clone + Send + Sync + 'static;

    /// Prefix for generated instance ids
    const ID_PREFIX: &'static str;

    /// Build the state of a freshly started instance
    fn initial_state(&self, input: Self::Input) -> Self::State;

    /// Decode a named update and its payload into an action
    ///
    /// # Errors
    ///
    /// Returns a rejection for unknown update names and malformed payloads.
    fn decode_update(
        &self,
        name: &str,
        update_id: UpdateId,
        payload: serde_json::Value,
    ) -> Result<Self::Action, Self::Rejection>;

    /// Decode a named signal and its payload into an action
    ///
    /// # Errors
    ///
    /// Returns a rejection for unknown signal names and malformed payloads.
    fn decode_signal(
        &self,
        name: &str,
        payload: serde_json::Value,
    ) -> Result<Self::Action, Self::Rejection>;

    /// Answer a named read-only query
    ///
    /// # Errors
    ///
    /// Returns a rejection for unknown query names.
    fn query(&self, name: &str, state: &Self::State) -> Result<serde_json::Value, Self::Rejection>;

    /// Check a decoded command against the current state before admission
    ///
    /// # Errors
    ///
    /// Returns a rejection when the command must not be applied.
    fn validate(&self, state: &Self::State, action: &Self::Action) -> Result<(), Self::Rejection>;

    /// Outcome of an admitted update, once it has settled
    fn update_outcome(
        &self,
        state: &Self::State,
        update_id: &UpdateId,
    ) -> Option<Result<(), Self::Failure>>;

    /// Current lifecycle position
    fn run_status(&self, state: &Self::State) -> RunStatus<Self::Failure>;
}
