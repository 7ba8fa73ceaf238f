//! Pool container: unordered membership, every member active at once.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use crate::core::error::ContainerError;
use crate::core::module::{
    Evict, Module, ModuleHandle, ModuleRegistry, ParameterRequest, Remover, SnapshotEntry,
};
use crate::core::reconcile::{converge, ActivationPolicy, ContainerState, ReconcileLimits};
use crate::core::uid::{Uid, UidAllocator};

/// All-active worker container.
///
/// Membership is a set: order is never observable, and members run
/// concurrently from the moment they are added until they are explicitly
/// removed or die. There is no background slot; the shared engine state
/// carries one but it is never populated here.
pub struct PoolContainer {
    modules: ModuleRegistry,
    uids: UidAllocator,
    limits: ReconcileLimits,
    state: RwLock<ContainerState>,
    /// Serializes every mutation together with its convergence rounds.
    gate: Mutex<()>,
}

impl PoolContainer {
    /// Create a pool container from a module registry.
    #[must_use]
    pub fn new(modules: ModuleRegistry, uids: UidAllocator, limits: ReconcileLimits) -> Arc<Self> {
        Arc::new(Self {
            modules,
            uids,
            limits,
            state: RwLock::new(ContainerState::default()),
            gate: Mutex::new(()),
        })
    }

    fn remover(self: &Arc<Self>, uid: Uid) -> Remover {
        let target = Arc::clone(self) as Arc<dyn Evict>;
        Remover::new(Arc::downgrade(&target), uid)
    }

    async fn converge(&self) {
        converge(&self.state, ActivationPolicy::AllActive, self.limits).await;
    }

    /// Construct a module of `kind` and add it to the membership.
    ///
    /// Construction happens before the mutation gate is taken and may
    /// suspend; a construction failure propagates and the half-built module
    /// never joins the container.
    pub async fn add(self: &Arc<Self>, kind: &str, args: Value) -> Result<Uid, ContainerError> {
        let factory = self
            .modules
            .get(kind)
            .ok_or_else(|| ContainerError::UnrecognizedKind(kind.to_owned()))?;
        let uid = self.uids.allocate();
        let instance = factory
            .construct(args, self.remover(uid.clone()))
            .await
            .map_err(ContainerError::Construction)?;

        let _gate = self.gate.lock().await;
        self.state.write().foreground.push(ModuleHandle {
            uid: uid.clone(),
            instance,
        });
        tracing::info!(uid = %uid, kind, "module joined pool");
        self.converge().await;
        Ok(uid)
    }

    /// Remove every matching member. Unknown uids are ignored.
    pub async fn remove(&self, uids: &[Uid]) {
        let _gate = self.gate.lock().await;
        self.state
            .write()
            .foreground
            .retain(|h| !uids.contains(&h.uid));
        tracing::debug!(count = uids.len(), "removal requested");
        self.converge().await;
    }

    /// Clear the membership entirely. This is the graceful shutdown path.
    pub async fn clear(&self) {
        let _gate = self.gate.lock().await;
        self.state.write().foreground.clear();
        tracing::info!("clearing pool container");
        self.converge().await;
    }

    /// Snapshot of the current membership.
    ///
    /// Gate-free: may observe state an in-flight mutation has not yet
    /// reconciled externally. The iteration order carries no meaning.
    #[must_use]
    pub fn snapshot(&self, params: &ParameterRequest) -> Vec<SnapshotEntry> {
        self.state
            .read()
            .foreground
            .iter()
            .map(|h| h.snapshot(params))
            .collect()
    }

    fn find(&self, uid: &Uid) -> Result<Arc<dyn Module>, ContainerError> {
        self.state
            .read()
            .foreground
            .iter()
            .find(|h| &h.uid == uid)
            .map(|h| Arc::clone(&h.instance))
            .ok_or_else(|| ContainerError::NotFound(uid.clone()))
    }

    /// Forward an application-level command to the member with `uid`.
    pub async fn tell(
        &self,
        uid: &Uid,
        cmd: &str,
        args: Value,
    ) -> Result<Value, ContainerError> {
        let instance = self.find(uid)?;
        instance.tell(cmd, args).await.map_err(ContainerError::Module)
    }

    /// Read named parameters from the member with `uid`.
    pub fn ask(&self, uid: &Uid, names: &[String]) -> Result<Map<String, Value>, ContainerError> {
        Ok(self.find(uid)?.read_parameters(names))
    }

    /// Kinds that can be added to the pool.
    #[must_use]
    pub fn kinds(&self) -> Vec<String> {
        self.modules.kinds()
    }
}

#[async_trait]
impl Evict for PoolContainer {
    async fn evict(&self, uid: Uid) {
        let _gate = self.gate.lock().await;
        self.state.write().foreground.retain(|h| h.uid != uid);
        tracing::info!(uid = %uid, "module evicted itself");
        self.converge().await;
    }
}
