//! Configuration management for the food ordering service.
//!
//! Loads configuration from environment variables with sensible defaults.
//! Missing or unparsable values fall back to the default.

use orderflow_runtime::{HostConfig, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Order lifecycle configuration
    pub order: OrderConfig,
    /// Gateway call retry configuration
    pub activities: ActivityConfig,
    /// Tracing filter directive used when `RUST_LOG` is not set
    pub log_level: String,
}

/// Order lifecycle configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderConfig {
    /// Seconds an order may wait for completion after checkout
    pub await_timeout_secs: u64,
}

/// Gateway call retry configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityConfig {
    /// Total attempts per call, including the first
    pub max_attempts: u32,
    /// Delay after the first failed attempt, in milliseconds
    pub initial_backoff_ms: u64,
    /// Cap for the exponential delay, in milliseconds
    pub max_backoff_ms: u64,
    /// Growth factor between delays
    pub backoff_coefficient: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl Config {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            order: OrderConfig {
                await_timeout_secs: parse_or(lookup("ORDER_AWAIT_TIMEOUT_SECS"), 3600),
            },
            activities: ActivityConfig {
                max_attempts: parse_or(lookup("ACTIVITY_MAX_ATTEMPTS"), 3),
                initial_backoff_ms: parse_or(lookup("ACTIVITY_INITIAL_BACKOFF_MS"), 100),
                max_backoff_ms: parse_or(lookup("ACTIVITY_MAX_BACKOFF_MS"), 30_000),
                backoff_coefficient: parse_or(lookup("ACTIVITY_BACKOFF_COEFFICIENT"), 2.0),
            },
            log_level: lookup("LOG_LEVEL")
                .unwrap_or_else(|| "food_ordering=info,orderflow_runtime=info".to_string()),
        }
    }

    /// Completion timeout armed after checkout
    #[must_use]
    pub const fn await_timeout(&self) -> Duration {
        Duration::from_secs(self.order.await_timeout_secs)
    }

    /// Retry policy for gateway calls
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::builder()
            .max_attempts(self.activities.max_attempts)
            .initial_backoff(Duration::from_millis(self.activities.initial_backoff_ms))
            .max_backoff(Duration::from_millis(self.activities.max_backoff_ms))
            .backoff_coefficient(self.activities.backoff_coefficient)
            .build()
    }

    /// Host configuration
    #[must_use]
    pub fn host_config(&self) -> HostConfig {
        HostConfig {
            retry_policy: self.retry_policy(),
        }
    }
}

fn parse_or<T: FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|s| s.trim().parse().ok()).unwrap_or(default)
}
