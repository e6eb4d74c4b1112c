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

/// A bucket that fills one unit per admitted request and drains at a steady
/// rate.
///
/// Requests are admitted while the level is below `capacity`. A zero leak
/// rate is allowed: such a bucket admits `capacity` requests and then rejects
/// the key with [`Reason::Exhausted`] for as long as its state exists, which
/// is forever since a bucket that never drains never expires.
#[derive(Debug)]
pub struct LeakyBucket<S> {
    store: S,
    capacity: NonZeroU64,
    rate_per_ms: f64,
    keys: KeySpace,
    clock: Clock,
    script: Script,
}

impl<S> LeakyBucket<S> {
    pub fn new(store: S, capacity: NonZeroU64, leak: Rate) -> Result<Self> {
        let rate_per_ms = leak.non_negative_per_ms("leak rate")?;
        Ok(Self {
            store,
            capacity,
            rate_per_ms,
            keys: KeySpace::generated(procedure::LEAKY_BUCKET.name),
            clock: Clock::new(),
            script: Script::new(procedure::LEAKY_BUCKET),
        })
    }
}

keyspace_builders!(LeakyBucket);
clock_builder!(LeakyBucket);

#[async_trait]
impl<S: ScriptStore> Strategy for LeakyBucket<S> {
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
