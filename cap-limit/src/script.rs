use tokio::sync::RwLock;
use tracing::debug;

use crate::Error;
use crate::Procedure;
use crate::Result;
use crate::store::Reply;
use crate::store::ScriptHandle;
use crate::store::ScriptStore;

/// A procedure bound to one policy, registered with the store on first use.
///
/// The handle is reused until the store reports it no longer knows the
/// procedure; the next call then registers it again. Loads are serialized, so
/// racing first calls share one registration.
#[derive(Debug)]
pub struct Script {
    procedure: Procedure,
    handle: RwLock<Option<ScriptHandle>>,
}

impl Script {
    pub fn new(procedure: Procedure) -> Self {
        Self {
            procedure,
            handle: RwLock::new(None),
        }
    }

    pub fn procedure(&self) -> &Procedure {
        &self.procedure
    }

    pub fn name(&self) -> &'static str {
        self.procedure.name
    }

    /// The registered handle, loading the procedure if none is cached.
    pub async fn handle<S>(&self, store: &S) -> Result<ScriptHandle>
    where
        S: ScriptStore + ?Sized,
    {
        if let Some(handle) = self.handle.read().await.as_ref() {
            return Ok(handle.clone());
        }

        let mut slot = self.handle.write().await;
        if let Some(handle) = slot.as_ref() {
            return Ok(handle.clone());
        }
        let handle = store.load(&self.procedure).await?;
        debug!(procedure = self.procedure.name, %handle, "procedure loaded");
        *slot = Some(handle.clone());
        Ok(handle)
    }

    /// Run the procedure once against `store`.
    ///
    /// A `NoScript` failure is returned as is, but drops the cached handle.
    pub async fn run<S>(&self, store: &S, keys: &[String], args: &[String]) -> Result<Reply>
    where
        S: ScriptStore + ?Sized,
    {
        let handle = self.handle(store).await?;
        let reply = store.execute(&handle, keys, args).await;
        if let Err(Error::NoScript(_)) = &reply {
            self.forget(&handle).await;
        }
        reply
    }

    async fn forget(&self, stale: &ScriptHandle) {
        let mut slot = self.handle.write().await;
        // a racing call may already have registered a fresh handle
        if slot.as_ref() == Some(stale) {
            *slot = None;
            debug!(procedure = self.procedure.name, handle = %stale, "store lost procedure");
        }
    }
}
