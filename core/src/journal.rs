//! Journal abstraction for durable workflow instances.
//!
//! Every action admitted into an instance is written to the journal *before* it
//! is reduced. Replaying the journal in sequence order therefore rebuilds the
//! instance's state exactly, and the record origins tell the host which
//! activities and timers already completed.
//!
//! # Implementations
//!
//! - `InMemoryJournal` (in `orderflow-testing`): fast, deterministic tests and demos
//!
//! # Example
//!
//! ```ignore
//! let records = journal.load(&instance_id).await?;
//! let next = records.len() as u64;
//! journal.append(JournalRecord {
//!     instance_id,
//!     sequence: next,
//!     origin: Origin::Signal("CHECKOUT".to_string()),
//!     recorded_at: clock.now(),
//!     payload,
//! }).await?;
//! ```

use crate::effect::EffectId;
use crate::workflow::{InstanceId, UpdateId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Boxed future returned by [`JournalStore`] methods
pub type JournalFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, JournalError>> + Send + 'a>>;

/// Errors that can occur during journal operations.
#[derive(Error, Debug)]
pub enum JournalError {
    /// Optimistic concurrency conflict: another writer appended first.
    #[error("Sequence conflict on {instance_id}: expected {expected}, found {actual}")]
    SequenceConflict {
        /// The instance whose journal was written.
        instance_id: InstanceId,
        /// The sequence number the writer tried to append.
        expected: u64,
        /// The journal's actual next sequence number.
        actual: u64,
    },

    /// Backend storage failure.
    #[error("Storage error: {0}")]
    Storage(String),
}

/// Why a journal record was written
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Origin {
    /// Instance start; the payload is the workflow input
    Start,
    /// An admitted update, keyed for idempotent re-delivery
    Update(UpdateId),
    /// An admitted signal
    Signal(String),
    /// The final outcome of an activity
    Activity(EffectId),
    /// A fired timer
    Timer(EffectId),
}

impl Origin {
    /// Effect whose completion this record captures, if any
    #[must_use]
    pub const fn completed_effect(&self) -> Option<EffectId> {
        match self {
            Self::Activity(id) | Self::Timer(id) => Some(*id),
            Self::Start | Self::Update(_) | Self::Signal(_) => None,
        }
    }
}

/// One entry of an instance journal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalRecord {
    /// Instance this record belongs to
    pub instance_id: InstanceId,
    /// Position in the instance journal, starting at 0
    pub sequence: u64,
    /// Why the record was written
    pub origin: Origin,
    /// Host wall-clock time at append
    pub recorded_at: DateTime<Utc>,
    /// Serialized workflow input (for `Origin::Start`) or action
    pub payload: Vec<u8>,
}

/// Append-only store of instance journals.
///
/// # Dyn Compatibility
///
/// Methods return boxed futures so the host can hold an `Arc<dyn JournalStore>`.
pub trait JournalStore: Send + Sync {
    /// Append a record.
    ///
    /// `record.sequence` must equal the number of records already stored for the
    /// instance.
    ///
    /// # Errors
    ///
    /// - [`JournalError::SequenceConflict`]: the sequence number is not the next one
    /// - [`JournalError::Storage`]: the backend failed
    fn append(&self, record: JournalRecord) -> JournalFuture<'_, ()>;

    /// Load every record of an instance in sequence order.
    ///
    /// Returns an empty vector for unknown instances.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::Storage`] if the backend failed.
    fn load(&self, instance_id: &InstanceId) -> JournalFuture<'_, Vec<JournalRecord>>;

    /// List every instance with at least one record.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::Storage`] if the backend failed.
    fn instances(&self) -> JournalFuture<'_, Vec<InstanceId>>;
}
