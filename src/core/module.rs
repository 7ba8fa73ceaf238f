//! Module capability contract, factories, and the self-removal callback.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::core::error::ModuleError;
use crate::core::uid::Uid;

/// Capability contract every managed unit implements.
///
/// `play`, `suspend`, `remove`, and `tell` may suspend the caller;
/// `terminate` and `read_parameters` never do. A module is addressed by
/// exactly one container at a time and is not required to be thread-safe
/// beyond honoring this contract.
#[async_trait]
pub trait Module: Send + Sync + 'static {
    /// Kind tag this module was constructed from.
    fn kind(&self) -> &str;

    /// Whether the underlying process is still running.
    fn alive(&self) -> bool;

    /// Self-reported activation flag, true iff the module believes itself
    /// active.
    fn is_on_top(&self) -> bool;

    /// Transition to active; must eventually make [`Module::is_on_top`] true
    /// or fail.
    async fn play(&self) -> Result<(), ModuleError>;

    /// Transition to inactive; must eventually make [`Module::is_on_top`]
    /// false or fail.
    async fn suspend(&self) -> Result<(), ModuleError>;

    /// Graceful teardown request.
    async fn remove(&self) -> Result<(), ModuleError>;

    /// Best-effort hard kill. Never fails, never retried; used only as a
    /// failure-recovery hammer.
    fn terminate(&self);

    /// Forward an application-level command to the module.
    async fn tell(&self, cmd: &str, args: Value) -> Result<Value, ModuleError>;

    /// Best-effort read of named attributes; missing names are simply absent
    /// from the result.
    fn read_parameters(&self, names: &[String]) -> Map<String, Value>;
}

/// Constructs module instances for one kind.
#[async_trait]
pub trait ModuleFactory: Send + Sync + 'static {
    /// Kind tag this factory constructs.
    fn kind(&self) -> &'static str;

    /// Construct a module instance.
    ///
    /// Construction may suspend (process spawn, handshake). On failure the
    /// half-built module never joins a container. The `remover` lets the
    /// finished module evict itself when it dies or completes naturally.
    async fn construct(
        &self,
        args: Value,
        remover: Remover,
    ) -> Result<Arc<dyn Module>, ModuleError>;
}

/// Lookup table of registered module factories, keyed by kind tag.
pub struct ModuleRegistry {
    factories: HashMap<&'static str, Arc<dyn ModuleFactory>>,
}

impl ModuleRegistry {
    /// Build a registry from factories.
    #[must_use]
    pub fn new(factories: Vec<Arc<dyn ModuleFactory>>) -> Self {
        Self {
            factories: factories.into_iter().map(|f| (f.kind(), f)).collect(),
        }
    }

    /// Registry with no kinds registered.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Factory registered for `kind`, if any.
    #[must_use]
    pub fn get(&self, kind: &str) -> Option<&Arc<dyn ModuleFactory>> {
        self.factories.get(kind)
    }

    /// Registered kind tags.
    #[must_use]
    pub fn kinds(&self) -> Vec<String> {
        self.factories.keys().map(|k| (*k).to_owned()).collect()
    }
}

/// A module as tracked by its owning container.
#[derive(Clone)]
pub struct ModuleHandle {
    /// Identifier assigned when the module was added.
    pub uid: Uid,
    /// The live capability reference.
    pub instance: Arc<dyn Module>,
}

/// Parameter request: kind tag to the attribute names wanted for it.
pub type ParameterRequest = HashMap<String, Vec<String>>;

/// One entry of a container snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotEntry {
    /// Module identifier.
    pub uid: Uid,
    /// Kind tag.
    #[serde(rename = "type")]
    pub kind: String,
    /// Parameter values, present when the caller requested this kind.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Map<String, Value>>,
}

impl ModuleHandle {
    /// Kind tag of the underlying instance.
    #[must_use]
    pub fn kind(&self) -> &str {
        self.instance.kind()
    }

    /// Snapshot this handle, reading parameters when `params` requests the
    /// module's kind.
    #[must_use]
    pub fn snapshot(&self, params: &ParameterRequest) -> SnapshotEntry {
        let kind = self.kind().to_owned();
        let parameters = params
            .get(&kind)
            .map(|names| self.instance.read_parameters(names));
        SnapshotEntry {
            uid: self.uid.clone(),
            kind,
            parameters,
        }
    }
}

/// Container-side target of a [`Remover`].
#[async_trait]
pub trait Evict: Send + Sync {
    /// Remove exactly one uid from the container and re-converge.
    async fn evict(&self, uid: Uid);
}

/// Self-removal callback handed to a module at construction.
///
/// Invoking it atomically removes that exact module from its owning container
/// and re-converges, so a module that dies or finishes naturally can request
/// its own eviction without racing a concurrent client-driven removal. It
/// must be invoked from the module's own task, not from inside a lifecycle
/// action the container is currently awaiting.
#[derive(Clone)]
pub struct Remover {
    container: Weak<dyn Evict>,
    uid: Uid,
}

impl Remover {
    pub(crate) fn new(container: Weak<dyn Evict>, uid: Uid) -> Self {
        Self { container, uid }
    }

    /// Evict the captured uid from its owning container. A no-op once the
    /// container itself is gone.
    pub async fn invoke(&self) {
        if let Some(container) = self.container.upgrade() {
            container.evict(self.uid.clone()).await;
        }
    }

    /// The uid this remover will evict.
    #[must_use]
    pub fn uid(&self) -> &Uid {
        &self.uid
    }
}
