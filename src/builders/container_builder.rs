//! Construct containers, dispatchers, and audit sinks from configuration.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::{AuditBackendConfig, AuditConfig, ContainerConfig};
use crate::core::audit::{AuditSink, InMemoryAuditSink, JsonlAuditSink};
use crate::core::module::ModuleRegistry;
use crate::core::pool::PoolContainer;
use crate::core::queue::QueueContainer;
use crate::core::reconcile::ReconcileLimits;
use crate::core::uid::UidAllocator;
use crate::dispatch::{PoolDispatcher, QueueDispatcher, SharedAuditSink};

const IN_MEMORY_AUDIT_CAPACITY: usize = 1024;

fn allocator(cfg: &ContainerConfig) -> UidAllocator {
    if cfg.sequential_uids {
        UidAllocator::sequential()
    } else {
        UidAllocator::random()
    }
}

const fn limits(cfg: &ContainerConfig) -> ReconcileLimits {
    ReconcileLimits {
        max_rounds: cfg.max_reconcile_rounds,
    }
}

/// Build an audit sink from configuration.
///
/// # Errors
///
/// Fails when the JSON-lines backend is selected without a path or its file
/// cannot be opened.
pub fn build_audit_sink(cfg: &AuditConfig) -> Result<SharedAuditSink, String> {
    let sink: Box<dyn AuditSink> = match cfg.backend {
        AuditBackendConfig::InMemory => Box::new(InMemoryAuditSink::new(IN_MEMORY_AUDIT_CAPACITY)),
        AuditBackendConfig::Jsonl => {
            let path = cfg
                .path
                .as_ref()
                .ok_or_else(|| "jsonl audit backend requires a path".to_string())?;
            let sink = JsonlAuditSink::open(path)
                .map_err(|e| format!("cannot open audit log `{}`: {e}", path.display()))?;
            Box::new(sink)
        }
    };
    Ok(Arc::new(Mutex::new(sink)))
}

/// Build a queue container and its dispatcher.
#[must_use]
pub fn build_queue(
    cfg: &ContainerConfig,
    modules: ModuleRegistry,
    backgrounds: ModuleRegistry,
    audit: Option<SharedAuditSink>,
) -> (Arc<QueueContainer>, Arc<QueueDispatcher>) {
    let container = QueueContainer::new(modules, backgrounds, allocator(cfg), limits(cfg));
    let dispatcher = Arc::new(QueueDispatcher::new(Arc::clone(&container), audit));
    (container, dispatcher)
}

/// Build a pool container and its dispatcher.
#[must_use]
pub fn build_pool(
    cfg: &ContainerConfig,
    modules: ModuleRegistry,
    audit: Option<SharedAuditSink>,
) -> (Arc<PoolContainer>, Arc<PoolDispatcher>) {
    let container = PoolContainer::new(modules, allocator(cfg), limits(cfg));
    let dispatcher = Arc::new(PoolDispatcher::new(Arc::clone(&container), audit));
    (container, dispatcher)
}
