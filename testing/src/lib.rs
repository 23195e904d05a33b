//! # Orderflow Testing
//!
//! Testing utilities and helpers for Orderflow workflows.
//!
//! This crate provides:
//! - Mock implementations of environment traits (`FixedClock`)
//! - An in-memory journal for host-level and crash/recover tests
//! - A Given-When-Then builder for reducers
//! - Assertion helpers for effects
//!
//! ## Example
//!
//! ```ignore
//! use orderflow_testing::{InMemoryJournal, test_clock};
//! use orderflow_runtime::Host;
//!
//! #[tokio::test]
//! async fn test_order_flow() {
//!     let journal = Arc::new(InMemoryJournal::new());
//!     let host = Host::new(OrderWorkflow::default(), test_environment(), journal)
//!         .with_clock(Arc::new(test_clock()));
//!
//!     let order = host.start_instance(OrderInput::default()).await.unwrap();
//!     let status = host.query(&order, "GET_STATUS").await.unwrap();
//!     assert_eq!(status["status"], "DEFAULT");
//! }
//! ```

use chrono::{DateTime, Utc};
use orderflow_core::environment::Clock;

/// In-memory journal
pub mod journal;


/// Mock implementations of environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making journal timestamps reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use orderflow_testing::mocks::FixedClock;
    /// use orderflow_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(DateTime::<Utc>::UNIX_EPOCH + chrono::Duration::days(20_089))
    }
}

// Re-export commonly used items
pub use journal::InMemoryJournal;
pub use mocks::{FixedClock, test_clock};
pub use reducer_test::{ReducerTest, assertions};
