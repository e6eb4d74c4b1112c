use std::collections::BTreeSet;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::Reply;
use super::ScriptHandle;
use super::ScriptStore;
use crate::Clock;
use crate::Error;
use crate::Procedure;
use crate::Result;

mod procedures;

/// An in-process store that runs the procedure library natively.
///
/// Every procedure executes while holding a single lock, which gives the same
/// no-interleaving guarantee a Redis script has. Keys expire on the store's own
/// clock. Clones share the same keyspace.
///
/// Useful for tests, single-process deployments and benchmarks.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
    clock: Clock,
}

#[derive(Debug, Default)]
struct Inner {
    scripts: HashMap<ScriptHandle, Procedure>,
    keys: Keyspace,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose expiry and server-side time follow `clock`.
    pub fn with_clock(clock: Clock) -> Self {
        Self {
            inner: Arc::default(),
            clock,
        }
    }

    /// Number of live (unexpired) keys.
    pub fn len(&self) -> usize {
        let now = self.clock.now_ms();
        let mut inner = self.inner.lock();
        inner.keys.evict_expired(now);
        inner.keys.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remaining time to live of `key` in milliseconds, following `PTTL`:
    /// `-2` when the key does not exist, `-1` when it never expires.
    pub fn pttl(&self, key: &str) -> i64 {
        let now = self.clock.now_ms();
        self.inner.lock().keys.pttl(key, now)
    }

    /// Drop every key, keeping registered procedures.
    pub fn flush(&self) {
        self.inner.lock().keys.clear();
    }

    /// Forget every registered procedure, like `SCRIPT FLUSH`.
    ///
    /// Policies notice on their next call and register again.
    pub fn flush_scripts(&self) {
        self.inner.lock().scripts.clear();
    }
}

#[async_trait]
impl ScriptStore for MemoryStore {
    async fn load(&self, procedure: &Procedure) -> Result<ScriptHandle> {
        if !procedures::supports(procedure.name) {
            return Err(Error::StoreUnavailable(format!(
                "ERR unknown procedure `{}`",
                procedure.name
            )));
        }
        let handle = ScriptHandle::new(procedure.digest());
        self.inner
            .lock()
            .scripts
            .entry(handle.clone())
            .or_insert(*procedure);
        Ok(handle)
    }

    async fn execute(
        &self,
        handle: &ScriptHandle,
        keys: &[String],
        args: &[String],
    ) -> Result<Reply> {
        let now = self.clock.now_ms();
        let mut inner = self.inner.lock();
        let procedure = *inner.scripts.get(handle).ok_or_else(|| {
            Error::NoScript("NOSCRIPT No matching script. Please use LOAD.".to_string())
        })?;
        inner.keys.evict_expired(now);
        procedures::run(procedure.name, &mut inner.keys, keys, args, now)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Value {
    Counter(i64),
    Number(f64),
    Bucket { amount: f64, ts: f64 },
    Log(BTreeSet<(i64, String)>),
}

#[derive(Debug)]
struct Entry {
    value: Value,
    expires_at: Option<u64>,
}

#[derive(Debug, Default)]
struct Keyspace {
    entries: HashMap<String, Entry>,
    /// `(expires_at, key)` for every key with a TTL, soonest first.
    expiry: BTreeSet<(u64, String)>,
}

impl Keyspace {
    /// Drop every key whose TTL has run out.
    ///
    /// Runs before each procedure, so keys nobody reads again still leave.
    fn evict_expired(&mut self, now: u64) {
        while self.expiry.first().is_some_and(|(at, _)| *at <= now) {
            if let Some((_, key)) = self.expiry.pop_first() {
                self.entries.remove(&key);
            }
        }
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.expiry.clear();
    }

    /// The live value at `key`, dropping it first if it has expired.
    fn get_mut(&mut self, key: &str, now: u64) -> Option<&mut Value> {
        let expired = self
            .entries
            .get(key)
            .and_then(|entry| entry.expires_at)
            .is_some_and(|at| at <= now);
        if expired {
            self.remove(key);
        }
        self.entries.get_mut(key).map(|entry| &mut entry.value)
    }

    fn get(&mut self, key: &str, now: u64) -> Option<Value> {
        self.get_mut(key, now).cloned()
    }

    /// Store `value`, replacing any expiry.
    fn set(&mut self, key: &str, value: Value, ttl_ms: Option<u64>, now: u64) {
        self.remove(key);
        let entry = Entry {
            value,
            expires_at: None,
        };
        self.entries.insert(key.to_string(), entry);
        self.expire_at(key, ttl_ms.map(|ttl| now + ttl));
    }

    /// Store `value`, keeping the current expiry of a live key.
    fn replace(&mut self, key: &str, value: Value, now: u64) {
        match self.get_mut(key, now) {
            Some(slot) => *slot = value,
            None => self.set(key, value, None, now),
        }
    }

    fn remove(&mut self, key: &str) {
        if let Some(Entry {
            expires_at: Some(at),
            ..
        }) = self.entries.remove(key)
        {
            self.expiry.remove(&(at, key.to_string()));
        }
    }

    /// Move `key` to a new expiry, keeping the index in step.
    fn expire_at(&mut self, key: &str, expires_at: Option<u64>) {
        let Some(entry) = self.entries.get_mut(key) else {
            return;
        };
        if let Some(old) = entry.expires_at.take() {
            self.expiry.remove(&(old, key.to_string()));
        }
        entry.expires_at = expires_at;
        if let Some(at) = expires_at {
            self.expiry.insert((at, key.to_string()));
        }
    }

    fn incr(&mut self, key: &str, now: u64) -> Result<i64> {
        match self.get_mut(key, now) {
            Some(Value::Counter(count)) => {
                *count += 1;
                Ok(*count)
            }
            Some(_) => Err(wrong_type(key)),
            None => {
                self.set(key, Value::Counter(1), None, now);
                Ok(1)
            }
        }
    }

    fn pexpire(&mut self, key: &str, ttl_ms: u64, now: u64) {
        if self.get_mut(key, now).is_some() {
            self.expire_at(key, Some(now + ttl_ms));
        }
    }

    fn pttl(&mut self, key: &str, now: u64) -> i64 {
        if self.get_mut(key, now).is_none() {
            return -2;
        }
        match self.entries.get(key).and_then(|entry| entry.expires_at) {
            Some(at) => (at - now) as i64,
            None => -1,
        }
    }
}

fn wrong_type(key: &str) -> Error {
    Error::StoreUnavailable(format!(
        "WRONGTYPE Operation against key `{key}` holding the wrong kind of value"
    ))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use more_asserts::assert_le;

    use super::*;
    use crate::FixedWindow;
    use crate::SlidingWindow;
    use crate::Strategy;
    use crate::procedure;

    #[test]
    fn keys_expire_on_the_store_clock() {
        let (clock, mock) = Clock::mock();
        let mut keys = Keyspace::default();
        let now = clock.now_ms();

        assert_eq!(keys.incr("a", now).unwrap(), 1);
        keys.pexpire("a", 100, now);
        assert_eq!(keys.pttl("a", now), 100);
        assert_eq!(keys.pttl("missing", now), -2);

        mock.increment(Duration::from_millis(100));
        assert_eq!(keys.pttl("a", clock.now_ms()), -2);
        assert_eq!(keys.incr("a", clock.now_ms()).unwrap(), 1);
        assert_eq!(keys.pttl("a", clock.now_ms()), -1);
    }

    #[test]
    fn incr_rejects_other_types() {
        let mut keys = Keyspace::default();
        keys.set("n", Value::Number(1.5), None, 0);
        assert!(matches!(
            keys.incr("n", 0),
            Err(Error::StoreUnavailable(msg)) if msg.starts_with("WRONGTYPE")
        ));
    }

    #[tokio::test]
    async fn load_is_idempotent() {
        let store = MemoryStore::new();
        let first = store.load(&procedure::GCRA).await.unwrap();
        let second = store.load(&procedure::GCRA).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(store.inner.lock().scripts.len(), 1);
    }

    #[tokio::test]
    async fn unknown_handles_fail_like_noscript() {
        let store = MemoryStore::new();
        let err = store
            .execute(&ScriptHandle::new("deadbeef"), &[], &[])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoScript(msg) if msg.starts_with("NOSCRIPT")));
    }

    #[tokio::test]
    async fn flushed_scripts_must_be_loaded_again() {
        let store = MemoryStore::new();
        let handle = store.load(&procedure::FIXED_WINDOW).await.unwrap();
        let keys = vec!["k".to_string()];
        let args = vec!["10".to_string(), "1000".to_string()];
        assert!(store.execute(&handle, &keys, &args).await.is_ok());

        store.flush_scripts();
        assert!(matches!(
            store.execute(&handle, &keys, &args).await,
            Err(Error::NoScript(_))
        ));

        let reloaded = store.load(&procedure::FIXED_WINDOW).await.unwrap();
        assert_eq!(reloaded, handle);
        assert_eq!(
            store.execute(&handle, &keys, &args).await.unwrap(),
            Reply::Integer(0)
        );
    }

    #[tokio::test]
    async fn unknown_procedures_cannot_be_loaded() {
        let store = MemoryStore::new();
        let custom = Procedure {
            name: "custom",
            source: "return 1",
        };
        assert!(store.load(&custom).await.is_err());
    }

    #[test]
    fn len_ignores_expired_keys() {
        let (clock, mock) = Clock::mock();
        let store = MemoryStore::with_clock(clock.clone());
        {
            let mut inner = store.inner.lock();
            inner.keys.set("short", Value::Counter(1), Some(10), clock.now_ms());
            inner.keys.set("long", Value::Counter(1), Some(1_000), clock.now_ms());
        }
        assert_eq!(store.len(), 2);
        mock.increment(Duration::from_millis(10));
        assert_eq!(store.len(), 1);
        store.flush();
        assert!(store.is_empty());
    }

    #[test]
    fn rearming_a_key_moves_its_expiry() {
        let mut keys = Keyspace::default();
        keys.set("k", Value::Counter(1), Some(100), 0);
        keys.pexpire("k", 500, 50);
        assert_eq!(keys.expiry.len(), 1);

        keys.evict_expired(100);
        assert_eq!(keys.pttl("k", 100), 450);

        keys.set("k", Value::Counter(2), None, 200);
        assert!(keys.expiry.is_empty());
        keys.evict_expired(10_000);
        assert_eq!(keys.get("k", 10_000), Some(Value::Counter(2)));
    }

    #[tokio::test]
    async fn abandoned_keys_are_evicted() {
        let (clock, mock) = Clock::mock();
        let store = MemoryStore::with_clock(clock.clone());
        let window = Duration::from_millis(100);
        let limit = std::num::NonZeroU64::new(10).unwrap();
        let sliding = SlidingWindow::new(store.clone(), limit, window)
            .unwrap()
            .with_clock(clock.clone());
        let fixed = FixedWindow::new(store.clone(), limit, window).unwrap();

        for n in 0..1000 {
            // One steady client, plus a client never seen again
            sliding.process("steady").await.unwrap();
            fixed.process(&format!("once-{n}")).await.unwrap();

            let inner = store.inner.lock();
            // current and previous sliding windows, plus this window's counter
            assert_le!(inner.keys.entries.len(), 3);
            assert_eq!(inner.keys.expiry.len(), inner.keys.entries.len());
            drop(inner);

            mock.increment(window);
        }
    }
}
