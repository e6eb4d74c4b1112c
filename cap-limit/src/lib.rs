//! # cap-limit
//!
//! `cap-limit` provides rate limiting strategies whose state lives in a shared
//! store, so that many processes enforce one limit together.
//!
//! ## Core Philosophy
//!
//! A limiter that reads a counter, decides, then writes it back races with
//! every other process doing the same. Here each algorithm is a single atomic
//! procedure (a Lua script on Redis) that reads, decides and writes in one
//! round trip. The store serializes racing callers on the same key; callers on
//! different keys never wait on each other.
//!
//! ## Key Concepts
//!
//! * **One round trip**: every decision is exactly one procedure call.
//! * **Lazy Evaluation**: refills, leaks and window slides are derived from
//!   elapsed time at the moment of the request. No background timers.
//! * **Self-expiring state**: every key carries a TTL tied to its window or
//!   rate, so idle keys disappear on their own.
//! * **Strategy Trait**: a unified interface over the six algorithms.
//!
//! ## Example
//!
//! ```rust
//! use std::num::NonZeroU64;
//! use std::ops::ControlFlow;
//!
//! use cap_limit::{FixedWindow, MemoryStore, Span, Strategy};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> cap_limit::Result<()> {
//! let store = MemoryStore::new();
//! let limit = NonZeroU64::new(100).unwrap();
//! let window = FixedWindow::new(store, limit, Span::default().minutes(1))?;
//!
//! if window.process("203.0.113.7:/search").await?.is_continue() {
//!     // Request allowed
//! }
//! # Ok(())
//! # }
//! ```

use std::fmt::Debug;
use std::ops::ControlFlow;
use std::time::Duration;

use async_trait::async_trait;

mod clock;
pub mod config;
mod error;
mod fixed_window;
mod gcra;
mod keyspace;
mod leaky_bucket;
pub mod procedure;
mod rate;
mod script;
mod sliding_window;
mod sliding_window_log;
pub mod store;
mod token_bucket;

pub use clock::Clock;
pub use error::Error;
pub use error::Result;
pub use fixed_window::FixedWindow;
pub use gcra::Gcra;
pub use keyspace::DEFAULT_PREFIX;
pub use keyspace::KeySpace;
pub use leaky_bucket::LeakyBucket;
pub use procedure::Procedure;
pub use rate::Rate;
pub use rate::Span;
pub use script::Script;
pub use sliding_window::SlidingWindow;
pub use sliding_window_log::SlidingWindowLog;
pub use store::MemoryStore;
#[cfg(feature = "redis")]
pub use store::RedisStore;
pub use store::ScriptStore;
pub use token_bucket::TokenBucket;

/// Reasons why a request might be rejected by a strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    /// Over the limit; capacity is expected back after `retry_after`.
    Overloaded { retry_after: Duration },
    /// Over the limit for good: the key is never expected to admit again.
    Exhausted,
}

impl Reason {
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Reason::Overloaded { retry_after } => Some(*retry_after),
            Reason::Exhausted => None,
        }
    }

    pub fn retry_after_ms(&self) -> Option<u64> {
        self.retry_after().map(|d| d.as_millis() as u64)
    }

    /// A rejection from a procedure's retry-after, where a negative value
    /// means the key never recovers.
    pub(crate) fn from_retry_ms(retry_ms: i64) -> Self {
        match u64::try_from(retry_ms) {
            Ok(ms) => Reason::Overloaded {
                retry_after: Duration::from_millis(ms),
            },
            Err(_) => Reason::Exhausted,
        }
    }
}

/// The core trait for all rate-limiting algorithms.
///
/// Strategies must be `Send` and `Sync` to allow sharing across tasks
/// via `Arc`.
#[async_trait]
pub trait Strategy: Debug + Send + Sync {
    /// Short algorithm name, used to label logs and metrics.
    fn name(&self) -> &'static str;

    /// Attempts to admit a single request for `key`.
    ///
    /// Runs the strategy's procedure exactly once against the store.
    /// `Continue` admits; `Break` rejects with a retry hint.
    ///
    /// # Errors
    ///
    /// Returns [`Error`] if the store cannot be reached or misbehaves. A
    /// check that fails after the request reached the store may still have
    /// consumed capacity.
    async fn process(&self, key: &str) -> Result<ControlFlow<Reason>>;
}

/// Generates the namespace builders shared by every strategy.
macro_rules! keyspace_builders {
    ($strategy:ident) => {
        impl<S> $strategy<S> {
            /// Namespace all keys under `prefix` (default `"cap"`).
            pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
                self.keys = self.keys.with_prefix(prefix);
                self
            }

            /// Replace the generated instance id with a stable one, so that
            /// processes built from the same configuration share a budget.
            pub fn with_instance_id(mut self, instance_id: impl Into<String>) -> Self {
                self.keys = self.keys.with_instance_id(instance_id);
                self
            }

            pub fn keyspace(&self) -> &$crate::KeySpace {
                &self.keys
            }
        }
    };
}

/// Adds `with_clock` to strategies that pass the caller's time to the store.
macro_rules! clock_builder {
    ($strategy:ident) => {
        impl<S> $strategy<S> {
            /// Read the caller's time from `clock` instead of the system clock.
            pub fn with_clock(mut self, clock: $crate::Clock) -> Self {
                self.clock = clock;
                self
            }
        }
    };
}

pub(crate) use clock_builder;
pub(crate) use keyspace_builders;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_retry_means_exhausted() {
        assert_eq!(Reason::from_retry_ms(-1), Reason::Exhausted);
        assert_eq!(Reason::Exhausted.retry_after(), None);

        let reason = Reason::from_retry_ms(1500);
        assert_eq!(reason.retry_after(), Some(Duration::from_millis(1500)));
        assert_eq!(reason.retry_after_ms(), Some(1500));
    }
}
