//! The atomic script store seam.
//!
//! A store runs a named procedure against a set of keys without interleaving
//! other callers, which is what makes every check-and-update in this crate
//! race free across processes.

use std::fmt;
use std::fmt::Debug;

use async_trait::async_trait;

use crate::Error;
use crate::Procedure;
use crate::Result;

mod memory;
#[cfg(feature = "redis")]
mod redis;

pub use memory::MemoryStore;
#[cfg(feature = "redis")]
pub use self::redis::RedisStore;

/// Opaque handle to a procedure registered with a store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScriptHandle(String);

impl ScriptHandle {
    pub fn new(digest: impl Into<String>) -> Self {
        Self(digest.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScriptHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The primitive result of one procedure run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Integer(i64),
    Array(Vec<i64>),
}

impl Reply {
    /// The reply of a procedure that answers with a single integer.
    pub fn integer(&self, procedure: &'static str) -> Result<i64> {
        match self {
            Reply::Integer(value) => Ok(*value),
            other => Err(other.unexpected(procedure)),
        }
    }

    /// The reply of a procedure that answers with `[admitted, retry_after]`.
    pub fn pair(&self, procedure: &'static str) -> Result<(i64, i64)> {
        match self {
            Reply::Array(values) if values.len() == 2 => Ok((values[0], values[1])),
            other => Err(other.unexpected(procedure)),
        }
    }

    fn unexpected(&self, procedure: &'static str) -> Error {
        Error::UnexpectedReply {
            procedure,
            reply: format!("{self:?}"),
        }
    }
}

/// A key/value store able to run atomic procedures.
#[async_trait]
pub trait ScriptStore: Debug + Send + Sync {
    /// Register `procedure` and return its handle.
    ///
    /// Loading the same source again returns the same handle.
    async fn load(&self, procedure: &Procedure) -> Result<ScriptHandle>;

    /// Run a registered procedure with positional keys and string arguments.
    async fn execute(&self, handle: &ScriptHandle, keys: &[String], args: &[String])
    -> Result<Reply>;
}

#[async_trait]
impl<S> ScriptStore for std::sync::Arc<S>
where
    S: ScriptStore + ?Sized,
{
    async fn load(&self, procedure: &Procedure) -> Result<ScriptHandle> {
        (**self).load(procedure).await
    }

    async fn execute(
        &self,
        handle: &ScriptHandle,
        keys: &[String],
        args: &[String],
    ) -> Result<Reply> {
        (**self).execute(handle, keys, args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_shapes_are_checked() {
        assert_eq!(Reply::Integer(7).integer("fixed_window"), Ok(7));
        assert_eq!(Reply::Array(vec![1, 0]).pair("gcra"), Ok((1, 0)));
        assert!(matches!(
            Reply::Array(vec![1]).pair("gcra"),
            Err(Error::UnexpectedReply {
                procedure: "gcra",
                ..
            })
        ));
        assert!(Reply::Array(vec![1, 0]).integer("fixed_window").is_err());
    }
}
