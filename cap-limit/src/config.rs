//! Declarative policy configuration.
//!
//! A [`PolicyConfig`] deserializes from any serde format and builds the
//! matching strategy over a store:
//!
//! ```rust
//! use cap_limit::MemoryStore;
//! use cap_limit::config::PolicyConfig;
//!
//! let config: PolicyConfig = serde_json::from_str(
//!     r#"{
//!         "algorithm": "token_bucket",
//!         "capacity": 20,
//!         "refill": { "per_second": 5.0 },
//!         "instance_id": "search"
//!     }"#,
//! )
//! .unwrap();
//!
//! let strategy = config.build(MemoryStore::new()).unwrap();
//! assert_eq!(strategy.name(), "token_bucket");
//! ```

use std::num::NonZeroU64;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;

use crate::FixedWindow;
use crate::Gcra;
use crate::LeakyBucket;
use crate::Rate;
use crate::Result;
use crate::SlidingWindow;
use crate::SlidingWindowLog;
use crate::Span;
use crate::Strategy;
use crate::TokenBucket;
use crate::store::ScriptStore;

/// One limiter: an algorithm with its parameters and optional namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    /// Set this to share one budget between processes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
    #[serde(flatten)]
    pub algorithm: Algorithm,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "algorithm", rename_all = "snake_case")]
pub enum Algorithm {
    FixedWindow { limit: NonZeroU64, window: Span },
    SlidingWindow { limit: NonZeroU64, window: Span },
    SlidingWindowLog { limit: NonZeroU64, window: Span },
    TokenBucket { capacity: NonZeroU64, refill: Rate },
    LeakyBucket { capacity: NonZeroU64, leak: Rate },
    Gcra { burst: NonZeroU64, rate: Rate },
}

impl PolicyConfig {
    pub fn new(algorithm: Algorithm) -> Self {
        Self {
            prefix: None,
            instance_id: None,
            algorithm,
        }
    }

    /// Validate the parameters and build the strategy over `store`.
    pub fn build<S>(&self, store: S) -> Result<Arc<dyn Strategy>>
    where
        S: ScriptStore + 'static,
    {
        let prefix = self.prefix.as_deref();
        let instance_id = self.instance_id.as_deref();

        macro_rules! namespaced {
            ($policy:expr) => {{
                let mut policy = $policy;
                if let Some(prefix) = prefix {
                    policy = policy.with_prefix(prefix);
                }
                if let Some(instance_id) = instance_id {
                    policy = policy.with_instance_id(instance_id);
                }
                Arc::new(policy) as Arc<dyn Strategy>
            }};
        }

        let strategy = match self.algorithm {
            Algorithm::FixedWindow { limit, window } => {
                namespaced!(FixedWindow::new(store, limit, window)?)
            }
            Algorithm::SlidingWindow { limit, window } => {
                namespaced!(SlidingWindow::new(store, limit, window)?)
            }
            Algorithm::SlidingWindowLog { limit, window } => {
                namespaced!(SlidingWindowLog::new(store, limit, window)?)
            }
            Algorithm::TokenBucket { capacity, refill } => {
                namespaced!(TokenBucket::new(store, capacity, refill)?)
            }
            Algorithm::LeakyBucket { capacity, leak } => {
                namespaced!(LeakyBucket::new(store, capacity, leak)?)
            }
            Algorithm::Gcra { burst, rate } => namespaced!(Gcra::new(store, burst, rate)?),
        };
        Ok(strategy)
    }
}

impl From<Algorithm> for PolicyConfig {
    fn from(algorithm: Algorithm) -> Self {
        Self::new(algorithm)
    }
}
