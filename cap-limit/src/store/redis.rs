use async_trait::async_trait;
use ::redis::FromRedisValue;
use ::redis::RedisResult;
use ::redis::Value;
use ::redis::aio::ConnectionManager;
use tracing::debug;

use super::Reply;
use super::ScriptHandle;
use super::ScriptStore;
use crate::Procedure;
use crate::Result;

/// A Redis (or Valkey) backed store.
///
/// Procedures are registered with `SCRIPT LOAD` and run with `EVALSHA`, so
/// Redis executes each check-and-update without interleaving other clients.
/// The connection manager is cheap to clone and reconnects on its own.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore").finish_non_exhaustive()
    }
}

impl RedisStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    /// Connect to the server at `url`, e.g. `redis://127.0.0.1/`.
    pub async fn open(url: &str) -> Result<Self> {
        let client = ::redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self::new(conn))
    }
}

#[async_trait]
impl ScriptStore for RedisStore {
    async fn load(&self, procedure: &Procedure) -> Result<ScriptHandle> {
        let mut conn = self.conn.clone();
        let sha: String = ::redis::cmd("SCRIPT")
            .arg("LOAD")
            .arg(procedure.source)
            .query_async(&mut conn)
            .await
            .inspect_err(|err| debug!(procedure = procedure.name, %err, "SCRIPT LOAD failed"))?;
        debug!(procedure = procedure.name, sha = %sha, "registered procedure");
        Ok(ScriptHandle::new(sha))
    }

    async fn execute(
        &self,
        handle: &ScriptHandle,
        keys: &[String],
        args: &[String],
    ) -> Result<Reply> {
        let mut conn = self.conn.clone();
        let reply: Reply = ::redis::cmd("EVALSHA")
            .arg(handle.as_str())
            .arg(keys.len())
            .arg(keys)
            .arg(args)
            .query_async(&mut conn)
            .await
            .inspect_err(|err| debug!(sha = %handle, %err, "EVALSHA failed"))?;
        Ok(reply)
    }
}

impl FromRedisValue for Reply {
    fn from_redis_value(v: &Value) -> RedisResult<Self> {
        match i64::from_redis_value(v) {
            Ok(value) => Ok(Reply::Integer(value)),
            Err(_) => Vec::<i64>::from_redis_value(v).map(Reply::Array),
        }
    }
}
