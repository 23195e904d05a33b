//! In-memory journal for tests and demos.
//!
//! Sharing one `Arc<InMemoryJournal>` between two hosts simulates a process
//! restart: the second host recovers instances from what the first one wrote.

use orderflow_core::journal::{JournalError, JournalFuture, JournalRecord, JournalStore};
use orderflow_core::workflow::InstanceId;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Journal backed by a `BTreeMap`, enforcing the same sequence rules as a
/// durable backend
#[derive(Debug, Default)]
pub struct InMemoryJournal {
    records: Mutex<BTreeMap<InstanceId, Vec<JournalRecord>>>,
}

impl InMemoryJournal {
    /// Create an empty journal
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of an instance's records
    #[must_use]
    pub fn records(&self, instance_id: &InstanceId) -> Vec<JournalRecord> {
        self.lock().get(instance_id).cloned().unwrap_or_default()
    }

    /// Number of records stored for an instance
    #[must_use]
    pub fn len(&self, instance_id: &InstanceId) -> usize {
        self.lock().get(instance_id).map_or(0, Vec::len)
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<InstanceId, Vec<JournalRecord>>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl JournalStore for InMemoryJournal {
    fn append(&self, record: JournalRecord) -> JournalFuture<'_, ()> {
        let result = {
            let mut records = self.lock();
            let stream = records.entry(record.instance_id.clone()).or_default();
            let actual = stream.len() as u64;

            if record.sequence == actual {
                stream.push(record);
                Ok(())
            } else {
                Err(JournalError::SequenceConflict {
                    instance_id: record.instance_id,
                    expected: record.sequence,
                    actual,
                })
            }
        };
        Box::pin(async move { result })
    }

    fn load(&self, instance_id: &InstanceId) -> JournalFuture<'_, Vec<JournalRecord>> {
        let records = self.records(instance_id);
        Box::pin(async move { Ok(records) })
    }

    fn instances(&self) -> JournalFuture<'_, Vec<InstanceId>> {
        let ids = self.lock().keys().cloned().collect();
        Box::pin(async move { Ok(ids) })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::test_clock;
    use orderflow_core::environment::Clock;
    use orderflow_core::journal::Origin;

    fn record(id: &str, sequence: u64) -> JournalRecord {
        JournalRecord {
            instance_id: InstanceId::new(id),
            sequence,
            origin: Origin::Signal("CHECKOUT".to_string()),
            recorded_at: test_clock().now(),
            payload: vec![1, 2, 3],
        }
    }

    #[tokio::test]
    async fn appends_in_sequence() {
        let journal = InMemoryJournal::new();
        journal.append(record("order-1", 0)).await.unwrap();
        journal.append(record("order-1", 1)).await.unwrap();

        let loaded = journal.load(&InstanceId::new("order-1")).await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[1].sequence, 1);
    }

    #[tokio::test]
    async fn rejects_out_of_sequence_append() {
        let journal = InMemoryJournal::new();
        journal.append(record("order-1", 0)).await.unwrap();

        let error = journal.append(record("order-1", 0)).await.unwrap_err();
        assert!(matches!(
            error,
            JournalError::SequenceConflict {
                expected: 0,
                actual: 1,
                ..
            }
        ));
        assert_eq!(journal.len(&InstanceId::new("order-1")), 1);
    }

    #[tokio::test]
    async fn unknown_instance_loads_empty() {
        let journal = InMemoryJournal::new();
        assert!(journal.load(&InstanceId::new("nope")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn lists_instances() {
        let journal = InMemoryJournal::new();
        journal.append(record("order-b", 0)).await.unwrap();
        journal.append(record("order-a", 0)).await.unwrap();

        assert_eq!(
            journal.instances().await.unwrap(),
            vec![InstanceId::new("order-a"), InstanceId::new("order-b")]
        );
    }
}
