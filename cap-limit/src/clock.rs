use std::sync::Arc;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use quanta::Mock;

/// Wall-clock source in milliseconds since the Unix epoch.
///
/// Time-based procedures receive the caller's `now` as an argument, so every
/// process sharing a store must read a comparable clock. The system clock is
/// the default; `mock` gives tests a clock that only moves when told to.
#[derive(Debug, Clone, Default)]
pub struct Clock {
    source: Source,
}

#[derive(Debug, Clone, Default)]
enum Source {
    #[default]
    System,
    Mock {
        clock: quanta::Clock,
        anchor: quanta::Instant,
        epoch_ms: u64,
    },
}

impl Clock {
    pub fn new() -> Self {
        Self::default()
    }

    /// A manually driven clock starting at an arbitrary, non-zero epoch.
    ///
    /// Clones share the returned [`Mock`], so a policy and a
    /// [`MemoryStore`](crate::MemoryStore) built from the same clock observe
    /// the same time.
    pub fn mock() -> (Self, Arc<Mock>) {
        Self::mock_at(1_700_000_000_000)
    }

    /// A manually driven clock starting at `epoch_ms`.
    pub fn mock_at(epoch_ms: u64) -> (Self, Arc<Mock>) {
        let (clock, mock) = quanta::Clock::mock();
        let anchor = clock.now();
        let source = Source::Mock {
            clock,
            anchor,
            epoch_ms,
        };
        (Self { source }, mock)
    }

    pub fn now_ms(&self) -> u64 {
        match &self.source {
            Source::System => SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or_default(),
            Source::Mock {
                clock,
                anchor,
                epoch_ms,
            } => epoch_ms + clock.now().duration_since(*anchor).as_millis() as u64,
        }
    }
}
