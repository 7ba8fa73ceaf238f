//! Core container state, module contract, and the reconciliation engine.

pub mod audit;
pub mod error;
pub mod module;
pub mod pool;
pub mod queue;
pub mod reconcile;
pub mod uid;

pub use audit::{build_audit_event, AuditEvent, AuditSink, InMemoryAuditSink, JsonlAuditSink};
pub use error::{AppResult, ContainerError, ModuleError};
pub use module::{
    Evict, Module, ModuleFactory, ModuleHandle, ModuleRegistry, ParameterRequest, Remover,
    SnapshotEntry,
};
pub use pool::PoolContainer;
pub use queue::QueueContainer;
pub use reconcile::{ActivationPolicy, ReconcileLimits};
pub use uid::{Uid, UidAllocator};
