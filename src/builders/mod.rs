//! Builders to construct containers and dispatchers from configuration.

mod container_builder;

pub use container_builder::{build_audit_sink, build_pool, build_queue};
