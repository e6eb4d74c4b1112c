use std::num::NonZeroU64;
use std::ops::ControlFlow;

use async_trait::async_trait;

use super::Reason;
use super::Strategy;
use crate::Clock;
use crate::KeySpace;
use crate::Rate;
use crate::Result;
use crate::Script;
use crate::clock_builder;
use crate::keyspace_builders;
use crate::procedure;
use crate::store::ScriptStore;

/// A bucket that refills continuously and is spent one token per request.
///
/// New keys start full, so a quiet client may burst up to `capacity` at once.
/// Refill is computed lazily from the time since the last request; the bucket
/// never holds more than `capacity` tokens. State expires once the bucket
/// would be full again.
#[derive(Debug)]
pub struct TokenBucket<S> {
    store: S,
    capacity: NonZeroU64,
    rate_per_ms: f64,
    keys: KeySpace,
    clock: Clock,
    script: Script,
}

impl<S> TokenBucket<S> {
    /// Creates a new `TokenBucket` strategy.
    ///
    /// # Arguments
    ///
    /// * `capacity` - The size of the bucket, and so the largest burst.
    /// * `refill` - How fast tokens come back. The net rate must be positive.
    pub fn new(store: S, capacity: NonZeroU64, refill: Rate) -> Result<Self> {
        let rate_per_ms = refill.positive_per_ms("refill rate")?;
        Ok(Self {
            store,
            capacity,
            rate_per_ms,
            keys: KeySpace::generated(procedure::TOKEN_BUCKET.name),
            clock: Clock::new(),
            script: Script::new(procedure::TOKEN_BUCKET),
        })
    }
}

keyspace_builders!(TokenBucket);
clock_builder!(TokenBucket);

#[async_trait]
impl<S: ScriptStore> Strategy for TokenBucket<S> {
    fn name(&self) -> &'static str {
        self.script.name()
    }

    async fn process(&self, key: &str) -> Result<ControlFlow<Reason>> {
        let keys = [self.keys.key(key)];
        let args = [
            self.capacity.to_string(),
            self.rate_per_ms.to_string(),
            self.clock.now_ms().to_string(),
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
