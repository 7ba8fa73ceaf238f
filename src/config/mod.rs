//! Configuration models for containers and audit backends.

mod container;

pub use container::{AuditBackendConfig, AuditConfig, ContainerConfig, ServiceConfig};
