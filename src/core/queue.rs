//! Queue container: ordered foreground playback with a fallback background.

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

/// Ordered playback container.
///
/// At most one module is on top: the head of the client-controlled foreground
/// order, or the background module when the foreground is empty. The
/// background is demoted to suspended, never removed, purely by foreground
/// occupancy; it leaves only by explicit client action or by dying.
pub struct QueueContainer {
    modules: ModuleRegistry,
    backgrounds: ModuleRegistry,
    uids: UidAllocator,
    limits: ReconcileLimits,
    state: RwLock<ContainerState>,
    /// Serializes every mutation together with its convergence rounds.
    gate: Mutex<()>,
}

impl QueueContainer {
    /// Create a queue container from module and background registries.
    #[must_use]
    pub fn new(
        modules: ModuleRegistry,
        backgrounds: ModuleRegistry,
        uids: UidAllocator,
        limits: ReconcileLimits,
    ) -> Arc<Self> {
        Arc::new(Self {
            modules,
            backgrounds,
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
        converge(&self.state, ActivationPolicy::ExclusiveTop, self.limits).await;
    }

    /// Construct a module of `kind` and append it to the end of the
    /// foreground order.
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
        tracing::info!(uid = %uid, kind, "module queued");
        self.converge().await;
        Ok(uid)
    }

    /// Construct a background module of `kind` and install it in the
    /// background slot.
    ///
    /// A previously installed background handle is only displaced in the data
    /// structure here; the convergence diff of this same call removes it.
    pub async fn set_background(
        self: &Arc<Self>,
        kind: &str,
        args: Value,
    ) -> Result<Uid, ContainerError> {
        let factory = self
            .backgrounds
            .get(kind)
            .ok_or_else(|| ContainerError::UnrecognizedKind(kind.to_owned()))?;
        let uid = self.uids.allocate();
        let instance = factory
            .construct(args, self.remover(uid.clone()))
            .await
            .map_err(ContainerError::Construction)?;

        let _gate = self.gate.lock().await;
        self.state.write().background = Some(ModuleHandle {
            uid: uid.clone(),
            instance,
        });
        tracing::info!(uid = %uid, kind, "background installed");
        self.converge().await;
        Ok(uid)
    }

    /// Remove every matching handle from the foreground and, on match, clear
    /// the background. Unknown uids are ignored.
    pub async fn remove(&self, uids: &[Uid]) {
        let _gate = self.gate.lock().await;
        {
            let mut state = self.state.write();
            state.foreground.retain(|h| !uids.contains(&h.uid));
            if state
                .background
                .as_ref()
                .is_some_and(|bg| uids.contains(&bg.uid))
            {
                state.background = None;
            }
        }
        tracing::debug!(count = uids.len(), "removal requested");
        self.converge().await;
    }

    /// Reorder the foreground so the given uids come first, in the given
    /// order, followed by the remaining handles in their prior relative
    /// order. Unknown uids are ignored.
    pub async fn reorder(&self, uids: &[Uid]) {
        let _gate = self.gate.lock().await;
        {
            let mut state = self.state.write();
            let mut rest = std::mem::take(&mut state.foreground);
            let mut fronted = Vec::with_capacity(rest.len());
            for uid in uids {
                if let Some(pos) = rest.iter().position(|h| &h.uid == uid) {
                    fronted.push(rest.remove(pos));
                }
            }
            fronted.append(&mut rest);
            state.foreground = fronted;
        }
        self.converge().await;
    }

    /// Clear the foreground and background entirely. This is the graceful
    /// shutdown path.
    pub async fn clear(&self) {
        let _gate = self.gate.lock().await;
        {
            let mut state = self.state.write();
            state.foreground.clear();
            state.background = None;
        }
        tracing::info!("clearing queue container");
        self.converge().await;
    }

    /// Snapshot of the current foreground order.
    ///
    /// Gate-free: may observe state an in-flight mutation has not yet
    /// reconciled externally.
    #[must_use]
    pub fn snapshot(&self, params: &ParameterRequest) -> Vec<SnapshotEntry> {
        self.state
            .read()
            .foreground
            .iter()
            .map(|h| h.snapshot(params))
            .collect()
    }

    /// Snapshot of the current background, if any. Gate-free.
    #[must_use]
    pub fn background_snapshot(&self, params: &ParameterRequest) -> Option<SnapshotEntry> {
        self.state
            .read()
            .background
            .as_ref()
            .map(|h| h.snapshot(params))
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

    fn find_background(&self, uid: &Uid) -> Result<Arc<dyn Module>, ContainerError> {
        let state = self.state.read();
        let bg = state
            .background
            .as_ref()
            .ok_or(ContainerError::NoBackground)?;
        if &bg.uid != uid {
            return Err(ContainerError::BackgroundMismatch(uid.clone()));
        }
        Ok(Arc::clone(&bg.instance))
    }

    /// Forward an application-level command to the foreground module with
    /// `uid`. Involves a transaction with the module and may take a while, in
    /// contrast to [`QueueContainer::ask`].
    pub async fn tell(
        &self,
        uid: &Uid,
        cmd: &str,
        args: Value,
    ) -> Result<Value, ContainerError> {
        let instance = self.find(uid)?;
        instance.tell(cmd, args).await.map_err(ContainerError::Module)
    }

    /// Forward an application-level command to the current background.
    pub async fn tell_background(
        &self,
        uid: &Uid,
        cmd: &str,
        args: Value,
    ) -> Result<Value, ContainerError> {
        let instance = self.find_background(uid)?;
        instance.tell(cmd, args).await.map_err(ContainerError::Module)
    }

    /// Read named parameters from the foreground module with `uid`.
    pub fn ask(&self, uid: &Uid, names: &[String]) -> Result<Map<String, Value>, ContainerError> {
        Ok(self.find(uid)?.read_parameters(names))
    }

    /// Read named parameters from the current background.
    pub fn ask_background(
        &self,
        uid: &Uid,
        names: &[String],
    ) -> Result<Map<String, Value>, ContainerError> {
        Ok(self.find_background(uid)?.read_parameters(names))
    }

    /// Kinds that can be added to the foreground.
    #[must_use]
    pub fn kinds(&self) -> Vec<String> {
        self.modules.kinds()
    }

    /// Kinds that can be installed as the background.
    #[must_use]
    pub fn background_kinds(&self) -> Vec<String> {
        self.backgrounds.kinds()
    }
}

#[async_trait]
impl Evict for QueueContainer {
    async fn evict(&self, uid: Uid) {
        let _gate = self.gate.lock().await;
        {
            let mut state = self.state.write();
            state.foreground.retain(|h| h.uid != uid);
            if state.background.as_ref().is_some_and(|bg| bg.uid == uid) {
                state.background = None;
            }
        }
        tracing::info!(uid = %uid, "module evicted itself");
        self.converge().await;
    }
}
