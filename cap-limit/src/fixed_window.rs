use std::num::NonZeroU64;
use std::ops::ControlFlow;

use async_trait::async_trait;

use super::Reason;
use super::Strategy;
use crate::KeySpace;
use crate::Result;
use crate::Script;
use crate::Span;
use crate::keyspace_builders;
use crate::procedure;
use crate::store::ScriptStore;

/// A simple window-based limiter.
///
/// Counts requests per key in a window that starts with the key's first
/// request and ends when the counter expires. It is the cheapest strategy
/// but can be susceptible to "boundary bursts" where double the limit is
/// allowed in a short period spanning two windows.
///
/// The window lives entirely in the store's TTL, so the caller's clock is
/// never consulted.
#[derive(Debug)]
pub struct FixedWindow<S> {
    store: S,
    limit: NonZeroU64,
    window_ms: u64,
    keys: KeySpace,
    script: Script,
}

impl<S> FixedWindow<S> {
    /// Creates a new `FixedWindow` strategy.
    ///
    /// # Arguments
    ///
    /// * `store` - Where the counters live.
    /// * `limit` - The maximum number of requests allowed within a single window.
    /// * `window` - The length of the window. Must not be empty.
    pub fn new(store: S, limit: NonZeroU64, window: impl Into<Span>) -> Result<Self> {
        let window_ms = window.into().window_ms()?;
        Ok(Self {
            store,
            limit,
            window_ms,
            keys: KeySpace::generated(procedure::FIXED_WINDOW.name),
            script: Script::new(procedure::FIXED_WINDOW),
        })
    }
}

keyspace_builders!(FixedWindow);

#[async_trait]
impl<S: ScriptStore> Strategy for FixedWindow<S> {
    fn name(&self) -> &'static str {
        self.script.name()
    }

    async fn process(&self, key: &str) -> Result<ControlFlow<Reason>> {
        let keys = [self.keys.key(key)];
        let args = [self.limit.to_string(), self.window_ms.to_string()];
        let retry_ms = self
            .script
            .run(&self.store, &keys, &args)
            .await?
            .integer(self.script.name())?;

        if retry_ms == 0 {
            Ok(ControlFlow::Continue(()))
        } else {
            Ok(ControlFlow::Break(Reason::from_retry_ms(retry_ms)))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use more_asserts::assert_le;

    use super::*;
    use crate::Clock;
    use crate::MemoryStore;

    fn limit(n: u64) -> NonZeroU64 {
        NonZeroU64::new(n).unwrap()
    }

    #[tokio::test]
    async fn it_enforces_limits() {
        let (clock, mock) = Clock::mock();
        let store = MemoryStore::with_clock(clock);
        let rl = FixedWindow::new(store, limit(1), Duration::from_millis(10)).unwrap();

        assert_eq!(rl.process("k").await, Ok(ControlFlow::Continue(())));
        assert!(matches!(rl.process("k").await, Ok(ControlFlow::Break(..))));
        mock.increment(Duration::from_millis(10));
        assert_eq!(rl.process("k").await, Ok(ControlFlow::Continue(())));
    }

    #[tokio::test]
    async fn rejects_with_time_left_in_the_window() {
        let (clock, mock) = Clock::mock();
        let store = MemoryStore::with_clock(clock);
        let rl = FixedWindow::new(store, limit(3), Span::default().seconds(60)).unwrap();

        for _ in 0..3 {
            assert!(rl.process("client").await.unwrap().is_continue());
        }
        mock.increment(Duration::from_secs(20));

        let reason = match rl.process("client").await.unwrap() {
            ControlFlow::Break(reason) => reason,
            ControlFlow::Continue(()) => panic!("fourth request admitted"),
        };
        assert_eq!(reason.retry_after(), Some(Duration::from_secs(40)));
    }

    #[tokio::test]
    async fn test_exact_window_boundary() {
        let (clock, mock) = Clock::mock();
        let store = MemoryStore::with_clock(clock);
        let rl = FixedWindow::new(store, limit(1), Duration::from_millis(50)).unwrap();

        let _ = rl.process("k").await; // Consume the only slot

        mock.increment(Duration::from_millis(49));
        let reason = rl.process("k").await.unwrap().break_value().unwrap();
        assert_eq!(reason.retry_after_ms(), Some(1));

        mock.increment(Duration::from_millis(1));
        assert_eq!(rl.process("k").await, Ok(ControlFlow::Continue(())));
    }

    #[tokio::test]
    async fn keys_are_isolated() {
        let store = MemoryStore::new();
        let rl = FixedWindow::new(store, limit(1), Span::default().minutes(1)).unwrap();

        assert!(rl.process("a").await.unwrap().is_continue());
        assert!(rl.process("a").await.unwrap().is_break());
        assert!(rl.process("b").await.unwrap().is_continue());
    }

    #[tokio::test]
    async fn instances_do_not_share_budgets_unless_named() {
        let store = MemoryStore::new();
        let window = Span::default().minutes(1);
        let first = FixedWindow::new(store.clone(), limit(1), window).unwrap();
        let second = FixedWindow::new(store.clone(), limit(1), window).unwrap();

        assert!(first.process("k").await.unwrap().is_continue());
        assert!(second.process("k").await.unwrap().is_continue());

        let shared_a = FixedWindow::new(store.clone(), limit(1), window)
            .unwrap()
            .with_instance_id("login");
        let shared_b = FixedWindow::new(store.clone(), limit(1), window)
            .unwrap()
            .with_instance_id("login");
        assert!(shared_a.process("k").await.unwrap().is_continue());
        assert!(shared_b.process("k").await.unwrap().is_break());

        let other_prefix = FixedWindow::new(store, limit(1), window)
            .unwrap()
            .with_prefix("edge")
            .with_instance_id("login");
        assert!(other_prefix.process("k").await.unwrap().is_continue());
        assert_eq!(other_prefix.keyspace().key("k"), "edge:login:k");
    }

    #[tokio::test]
    async fn counters_expire_with_the_window() {
        let (clock, mock) = Clock::mock();
        let store = MemoryStore::with_clock(clock);
        let rl = FixedWindow::new(store.clone(), limit(5), Span::default().seconds(2)).unwrap();

        rl.process("a").await.unwrap();
        rl.process("b").await.unwrap();
        assert_eq!(store.len(), 2);
        assert_le!(store.pttl(&rl.keyspace().key("a")), 2_000);

        mock.increment(Duration::from_secs(2));
        assert!(store.is_empty());
    }

    #[test]
    fn empty_window_is_rejected() {
        let err = FixedWindow::new(MemoryStore::new(), limit(1), Span::default()).unwrap_err();
        assert!(matches!(
            err,
            crate::Error::InvalidConfig {
                field: "window",
                ..
            }
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_actual_concurrency() {
        let capacity = 100;
        let tasks = capacity as usize + 10;
        // Wrap in Arc to share across tasks
        let rl = Arc::new(
            FixedWindow::new(MemoryStore::new(), limit(capacity), Duration::from_secs(60))
                .unwrap(),
        );
        let barrier = Arc::new(tokio::sync::Barrier::new(tasks));

        let mut handles = vec![];

        for _ in 0..tasks {
            let rl_clone = Arc::clone(&rl);
            let barrier = Arc::clone(&barrier);
            handles.push(tokio::spawn(async move {
                barrier.wait().await;
                rl_clone.process("hot").await
            }));
        }

        let results = futures::future::join_all(handles).await;
        let success_count = results
            .into_iter()
            .filter(|r| matches!(r, Ok(Ok(ControlFlow::Continue(())))))
            .count();

        // Even with multiple tasks, exactly 'capacity' should pass
        assert_eq!(success_count, capacity as usize);
    }
}
