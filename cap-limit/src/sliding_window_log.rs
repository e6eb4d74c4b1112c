use std::num::NonZeroU64;
use std::ops::ControlFlow;

use async_trait::async_trait;
use uuid::Uuid;

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

/// An exact sliding window.
///
/// Keeps the timestamp of every admitted request in the trailing window, so
/// there are no boundary bursts at all. Memory grows with the limit: one
/// entry per admitted request per key.
///
/// Only admitted requests are recorded. Each entry carries a random member
/// so that requests landing on the same millisecond are counted separately.
#[derive(Debug)]
pub struct SlidingWindowLog<S> {
    store: S,
    limit: NonZeroU64,
    window_ms: u64,
    keys: KeySpace,
    clock: Clock,
    script: Script,
}

impl<S> SlidingWindowLog<S> {
    pub fn new(store: S, limit: NonZeroU64, window: impl Into<Span>) -> Result<Self> {
        let window_ms = window.into().window_ms()?;
        Ok(Self {
            store,
            limit,
            window_ms,
            keys: KeySpace::generated(procedure::SLIDING_WINDOW_LOG.name),
            clock: Clock::new(),
            script: Script::new(procedure::SLIDING_WINDOW_LOG),
        })
    }
}

keyspace_builders!(SlidingWindowLog);
clock_builder!(SlidingWindowLog);

#[async_trait]
impl<S: ScriptStore> Strategy for SlidingWindowLog<S> {
    fn name(&self) -> &'static str {
        self.script.name()
    }

    async fn process(&self, key: &str) -> Result<ControlFlow<Reason>> {
        let keys = [self.keys.key(key)];
        let args = [
            self.clock.now_ms().to_string(),
            self.window_ms.to_string(),
            self.limit.to_string(),
            Uuid::new_v4().simple().to_string(),
        ];
        let (admitted, retry_ms) = self
            .script
            .run(&self.store, &keys, &args)
            .await?
            .pair(self.script.name())?;

        if admitted == 1 {
            Ok(ControlFlow::Continue(()))
        } else {
            Ok(ControlFlow::Break(Reason::from_retry_ms(retry_ms)))
        }
    }
}
