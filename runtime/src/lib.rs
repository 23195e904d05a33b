//! # Orderflow Runtime
//!
//! Durable execution host for Orderflow workflows.
//!
//! The [`Host`] owns every running instance of one workflow type. For each
//! instance it:
//!
//! - serializes admission: validate, journal, reduce, then run effects
//! - answers queries from a fully-applied state
//! - retries activities with exponential backoff and journals their outcome
//! - arms timers and cancels them once the instance stops
//! - rebuilds instances from their journal after a restart
//!
//! ## Example
//!
//! ```ignore
//! use orderflow_runtime::Host;
//!
//! let host = Host::new(OrderWorkflow::default(), environment, journal);
//! let order = host.start_instance(OrderInput::default()).await?;
//!
//! host.send_update(&order, "ADD_ITEM", json!({"productId": 1, "quantity": 2})).await?;
//! host.send_signal(&order, "CHECKOUT", json!(null)).await?;
//!
//! let status = host.query(&order, "GET_STATUS").await?;
//! ```

/// Activity retries with exponential backoff
pub mod retry;

/// The host and its configuration
pub mod host;

mod instance;

/// Error types for the host
pub mod error {
    use orderflow_core::journal::JournalError;
    use orderflow_core::workflow::{InstanceId, Workflow};
    use thiserror::Error;

    /// Errors raised by the host itself, independent of the workflow type
    #[derive(Error, Debug)]
    pub enum HostError {
        /// No instance with this id is loaded or journaled
        #[error("Instance not found: {0}")]
        InstanceNotFound(InstanceId),

        /// An instance with this id was already started
        #[error("Instance already exists: {0}")]
        InstanceExists(InstanceId),

        /// The instance reached a terminal status and accepts no more commands
        #[error("Instance is closed: {0}")]
        InstanceClosed(InstanceId),

        /// The host is shutting down and not accepting new commands
        #[error("Host is shutting down")]
        ShutdownInProgress,

        /// Journal backend failure
        #[error("Journal error: {0}")]
        Journal(#[from] JournalError),

        /// Input or action could not be encoded or decoded
        #[error("Serialization error: {0}")]
        Serialization(String),

        /// The journal cannot be replayed
        #[error("Corrupt journal for {instance_id}: {reason}")]
        CorruptJournal {
            /// Instance whose journal is unusable
            instance_id: InstanceId,
            /// What was wrong with it
            reason: String,
        },
    }

    impl From<bincode::Error> for HostError {
        fn from(error: bincode::Error) -> Self {
            Self::Serialization(error.to_string())
        }
    }

    /// Outcome of delivering a command to an instance
    ///
    /// # Type Parameters
    ///
    /// - `R`: The workflow's admission-time rejection
    /// - `F`: The workflow's fatal failure
    #[derive(Error, Debug)]
    pub enum DeliveryError<R, F> {
        /// The command was not admitted; state is unchanged
        #[error("Command rejected: {0}")]
        Rejected(R),

        /// The command (or the instance) failed fatally
        #[error("Instance failed: {0}")]
        Failed(F),

        /// The instance was cancelled before the command settled
        #[error("Instance was cancelled")]
        Cancelled,

        /// Host-level failure
        #[error(transparent)]
        Host(#[from] HostError),
    }

    /// [`DeliveryError`] specialised to a workflow type
    pub type WorkflowError<W> =
        DeliveryError<<W as Workflow>::Rejection, <W as Workflow>::Failure>;
}

pub use error::{DeliveryError, HostError, WorkflowError};
pub use host::{Host, HostConfig, InstanceHandle};
pub use retry::RetryPolicy;
