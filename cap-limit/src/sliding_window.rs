use std::num::NonZeroU64;
use std::ops::ControlFlow;

use async_trait::async_trait;

use super::Reason;
use super::Strategy;
use crate::Clock;
use crate::KeySpace;
use crate::Result;
use crate::Script;
use crate::Span;
use crate::clock_builder;
use crate::keyspace_builders;
use crate::procedure;
use crate::store::ScriptStore;

/// A Sliding Window Counter implementation.
///
/// It maintains a count for the current calendar-aligned window and the
/// previous one. The effective count is:
/// `previous_count * (fraction of the window left) + current_count`.
///
/// Window boundaries come from the caller's clock; the fraction is measured
/// on the store's clock so that racing callers weigh the same way. Requests
/// that are rejected still count towards the current window.
#[derive(Debug)]
pub struct SlidingWindow<S> {
    store: S,
    limit: NonZeroU64,
    window_ms: u64,
    keys: KeySpace,
    clock: Clock,
    script: Script,
}

impl<S> SlidingWindow<S> {
    pub fn new(store: S, limit: NonZeroU64, window: impl Into<Span>) -> Result<Self> {
        let window_ms = window.into().window_ms()?;
        Ok(Self {
            store,
            limit,
            window_ms,
            keys: KeySpace::generated(procedure::SLIDING_WINDOW.name),
            clock: Clock::new(),
            script: Script::new(procedure::SLIDING_WINDOW),
        })
    }

    fn window_start(&self, now: u64) -> u64 {
        now - now % self.window_ms
    }
}

keyspace_builders!(SlidingWindow);
clock_builder!(SlidingWindow);

#[async_trait]
impl<S: ScriptStore> Strategy for SlidingWindow<S> {
    fn name(&self) -> &'static str {
        self.script.name()
    }

    async fn process(&self, key: &str) -> Result<ControlFlow<Reason>> {
        let window_start = self.window_start(self.clock.now_ms());
        let keys = [
            self.keys.window_key(key, window_start),
            self.keys.window_key(key, window_start.wrapping_sub(self.window_ms)),
        ];
        let args = [
            window_start.to_string(),
            self.window_ms.to_string(),
            self.limit.to_string(),
        ];
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
