use uuid::Uuid;

/// The default namespace for every key this crate writes.
pub const DEFAULT_PREFIX: &str = "cap";

/// Composes store keys as `{prefix}:{instance_id}:{key}`.
///
/// The instance id keeps two policies with identical parameters from sharing
/// a budget. Generated ids are unique per policy object; processes that must
/// share one limiter through the store need an explicit, stable id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    prefix: String,
    instance_id: String,
}

impl KeySpace {
    /// A keyspace under the default prefix with a generated instance id.
    pub fn generated(algorithm: &str) -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            instance_id: format!("{algorithm}_{}", Uuid::new_v4().simple()),
        }
    }

    pub fn new(prefix: impl Into<String>, instance_id: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            instance_id: instance_id.into(),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_instance_id(mut self, instance_id: impl Into<String>) -> Self {
        self.instance_id = instance_id.into();
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn key(&self, key: &str) -> String {
        format!("{}:{}:{}", self.prefix, self.instance_id, key)
    }

    /// Key of one calendar-aligned window, for strategies that keep a
    /// counter per window.
    pub fn window_key(&self, key: &str, window_start: u64) -> String {
        format!("{}:{}:{}:{}", self.prefix, self.instance_id, key, window_start)
    }
}
