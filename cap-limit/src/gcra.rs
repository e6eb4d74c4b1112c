use std::num::NonZeroU64;
use std::ops::ControlFlow;

use async_trait::async_trait;

use crate::Clock;
use crate::KeySpace;
use crate::Rate;
use crate::Reason;
use crate::Result;
use crate::Script;
use crate::Strategy;
use crate::clock_builder;
use crate::keyspace_builders;
use crate::procedure;
use crate::store::ScriptStore;

/// Generic Cell Rate Algorithm
///
/// Stores a single Theoretical Arrival Time (TAT) per key. Requests are
/// spaced one emission interval (`1 / rate`) apart, with up to `burst`
/// requests allowed back to back from an idle key. Rejections leave the TAT
/// untouched.
#[derive(Debug)]
pub struct Gcra<S> {
    store: S,
    burst: NonZeroU64,
    /// Emission interval in milliseconds.
    period_ms: f64,
    keys: KeySpace,
    clock: Clock,
    script: Script,
}

impl<S> Gcra<S> {
    pub fn new(store: S, burst: NonZeroU64, rate: Rate) -> Result<Self> {
        rate.positive_per_ms("rate")?;
        Ok(Self {
            store,
            burst,
            period_ms: 1_000.0 / rate.per_second_total(),
            keys: KeySpace::generated(procedure::GCRA.name),
            clock: Clock::new(),
            script: Script::new(procedure::GCRA),
        })
    }
}

keyspace_builders!(Gcra);
clock_builder!(Gcra);

#[async_trait]
impl<S: ScriptStore> Strategy for Gcra<S> {
    fn name(&self) -> &'static str {
        self.script.name()
    }

    async fn process(&self, key: &str) -> Result<ControlFlow<Reason>> {
        let keys = [self.keys.key(key)];
        let args = [
            self.burst.to_string(),
            self.period_ms.to_string(),
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
