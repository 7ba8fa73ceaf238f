//! Error types for module and container operations.

use thiserror::Error;

use crate::core::uid::Uid;

/// Errors raised by a module implementation.
#[derive(Debug, Error)]
pub enum ModuleError {
    /// Asynchronous construction failed before the module joined a container.
    #[error("construction failed: {0}")]
    Construction(String),
    /// A lifecycle action (play, suspend, remove) failed.
    #[error("lifecycle action failed: {0}")]
    Lifecycle(String),
    /// An application-level command was rejected.
    #[error("command rejected: {0}")]
    Command(String),
}

/// Errors surfaced at the container boundary.
///
/// These are the boundary-detectable failures reported verbatim to the
/// caller. Module misbehavior during a reconciliation round is absorbed by
/// the engine and never appears here.
#[derive(Debug, Error)]
pub enum ContainerError {
    /// Referenced uid is absent from the addressed container.
    #[error("module identifier not found: {0}")]
    NotFound(Uid),
    /// No background module is installed.
    #[error("no background module installed")]
    NoBackground,
    /// Referenced uid does not match the current background.
    #[error("background identifier does not match: {0}")]
    BackgroundMismatch(Uid),
    /// The requested kind has no registered factory.
    #[error("unrecognized module kind: {0}")]
    UnrecognizedKind(String),
    /// Module construction failed; the half-built module never joined.
    #[error("module construction failed: {0}")]
    Construction(#[source] ModuleError),
    /// A forwarded module command failed.
    #[error("module command failed: {0}")]
    Module(#[source] ModuleError),
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
