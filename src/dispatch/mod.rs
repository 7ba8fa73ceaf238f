//! Command dispatch boundary.
//!
//! Maps named remote operations onto container methods and records the
//! designated mutating subset to the audit log. Command names resolve through
//! static tag enums at the boundary; unknown names, malformed arguments, and
//! container boundary errors all come back as failure reason strings for the
//! transport to relay.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::core::audit::{build_audit_event, AuditSink};
use crate::core::module::ParameterRequest;
use crate::core::pool::PoolContainer;
use crate::core::queue::QueueContainer;
use crate::core::uid::Uid;
use crate::util::clock::now_ms;

/// Shared handle to an audit sink.
pub type SharedAuditSink = Arc<Mutex<Box<dyn AuditSink>>>;

/// Handles one named command against a container.
///
/// The transport collaborator hands in `(command name, argument mapping)` and
/// receives a success value or a failure reason string.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Execute the named command.
    async fn handle(&self, name: &str, args: Value) -> Result<Value, String>;

    /// Graceful shutdown: tear down every managed module.
    async fn shutdown(&self);
}

/// Commands accepted by a queue container endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueCommand {
    /// Append a new module to the foreground.
    Add,
    /// Remove modules by uid.
    Rm,
    /// Reorder the foreground.
    Mv,
    /// Install a background module.
    SetBg,
    /// Snapshot the foreground.
    Queue,
    /// Snapshot the background.
    Bg,
    /// List registered foreground kinds.
    ModulesAvailable,
    /// List registered background kinds.
    BackgroundsAvailable,
    /// Forward a command to a foreground module.
    TellModule,
    /// Forward a command to the background.
    TellBackground,
    /// Read parameters from a foreground module.
    AskModule,
    /// Read parameters from the background.
    AskBackground,
}

impl QueueCommand {
    /// Resolve a wire command name.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "add" => Some(Self::Add),
            "rm" => Some(Self::Rm),
            "mv" => Some(Self::Mv),
            "set_bg" => Some(Self::SetBg),
            "queue" => Some(Self::Queue),
            "bg" => Some(Self::Bg),
            "modules_available" => Some(Self::ModulesAvailable),
            "backgrounds_available" => Some(Self::BackgroundsAvailable),
            "tell_module" => Some(Self::TellModule),
            "tell_background" => Some(Self::TellBackground),
            "ask_module" => Some(Self::AskModule),
            "ask_background" => Some(Self::AskBackground),
            _ => None,
        }
    }

    /// Whether this command is recorded to the audit log.
    #[must_use]
    pub const fn is_audited(self) -> bool {
        matches!(
            self,
            Self::Add
                | Self::Rm
                | Self::Mv
                | Self::SetBg
                | Self::TellModule
                | Self::TellBackground
        )
    }
}

/// Commands accepted by a pool container endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolCommand {
    /// Add a new member.
    Add,
    /// Remove members by uid.
    Rm,
    /// Snapshot the membership.
    Pool,
    /// List registered kinds.
    ModulesAvailable,
    /// Forward a command to a member.
    TellModule,
    /// Read parameters from a member.
    AskModule,
}

impl PoolCommand {
    /// Resolve a wire command name.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "add" => Some(Self::Add),
            "rm" => Some(Self::Rm),
            "pool" => Some(Self::Pool),
            "modules_available" => Some(Self::ModulesAvailable),
            "tell_module" => Some(Self::TellModule),
            "ask_module" => Some(Self::AskModule),
            _ => None,
        }
    }

    /// Whether this command is recorded to the audit log.
    #[must_use]
    pub const fn is_audited(self) -> bool {
        matches!(self, Self::Add | Self::Rm | Self::TellModule)
    }
}

fn default_args() -> Value {
    json!({})
}

#[derive(Deserialize)]
struct AddArgs {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default = "default_args")]
    args: Value,
}

#[derive(Deserialize)]
struct UidListArgs {
    uids: Vec<Uid>,
}

#[derive(Deserialize, Default)]
struct SnapshotArgs {
    #[serde(default)]
    parameters: ParameterRequest,
}

#[derive(Deserialize)]
struct TellArgs {
    uid: Uid,
    cmd: String,
    #[serde(default = "default_args")]
    args: Value,
}

#[derive(Deserialize)]
struct AskArgs {
    uid: Uid,
    parameters: Vec<String>,
}

fn parse_args<T: DeserializeOwned>(args: Value) -> Result<T, String> {
    let args = if args.is_null() { json!({}) } else { args };
    serde_json::from_value(args).map_err(|e| format!("invalid arguments: {e}"))
}

fn to_wire<T: Serialize>(value: &T) -> Result<Value, String> {
    serde_json::to_value(value).map_err(|e| format!("encoding failure: {e}"))
}

fn record_command(
    audit: Option<&SharedAuditSink>,
    namespace: &str,
    command: &str,
    args: &Value,
) {
    let Some(sink) = audit else { return };
    let uid = args.get("uid").and_then(Value::as_str).map(ToOwned::to_owned);
    let payload = serde_json::to_string(args).ok();
    let event = build_audit_event(
        format!("{namespace}-{command}-{}", now_ms()),
        namespace,
        uid,
        command,
        payload,
    );
    sink.lock().record(event);
}

/// Dispatch boundary for a queue container.
pub struct QueueDispatcher {
    container: Arc<QueueContainer>,
    audit: Option<SharedAuditSink>,
}

impl QueueDispatcher {
    /// Namespace tag queue commands are audited under.
    pub const NAMESPACE: &'static str = "client-queue";

    /// Create a dispatcher; passing no audit sink disables command logging.
    #[must_use]
    pub fn new(container: Arc<QueueContainer>, audit: Option<SharedAuditSink>) -> Self {
        Self { container, audit }
    }
}

#[async_trait]
impl CommandHandler for QueueDispatcher {
    async fn handle(&self, name: &str, args: Value) -> Result<Value, String> {
        let command =
            QueueCommand::parse(name).ok_or_else(|| format!("unknown command: {name}"))?;
        if command.is_audited() {
            record_command(self.audit.as_ref(), Self::NAMESPACE, name, &args);
        }
        match command {
            QueueCommand::Add => {
                let args: AddArgs = parse_args(args)?;
                let uid = self
                    .container
                    .add(&args.kind, args.args)
                    .await
                    .map_err(|e| e.to_string())?;
                Ok(json!({ "uid": uid }))
            }
            QueueCommand::SetBg => {
                let args: AddArgs = parse_args(args)?;
                let uid = self
                    .container
                    .set_background(&args.kind, args.args)
                    .await
                    .map_err(|e| e.to_string())?;
                Ok(json!({ "uid": uid }))
            }
            QueueCommand::Rm => {
                let args: UidListArgs = parse_args(args)?;
                self.container.remove(&args.uids).await;
                Ok(Value::Null)
            }
            QueueCommand::Mv => {
                let args: UidListArgs = parse_args(args)?;
                self.container.reorder(&args.uids).await;
                Ok(Value::Null)
            }
            QueueCommand::Queue => {
                let args: SnapshotArgs = parse_args(args)?;
                to_wire(&self.container.snapshot(&args.parameters))
            }
            QueueCommand::Bg => {
                let args: SnapshotArgs = parse_args(args)?;
                to_wire(&self.container.background_snapshot(&args.parameters))
            }
            QueueCommand::ModulesAvailable => to_wire(&self.container.kinds()),
            QueueCommand::BackgroundsAvailable => to_wire(&self.container.background_kinds()),
            QueueCommand::TellModule => {
                let args: TellArgs = parse_args(args)?;
                self.container
                    .tell(&args.uid, &args.cmd, args.args)
                    .await
                    .map_err(|e| e.to_string())
            }
            QueueCommand::TellBackground => {
                let args: TellArgs = parse_args(args)?;
                self.container
                    .tell_background(&args.uid, &args.cmd, args.args)
                    .await
                    .map_err(|e| e.to_string())
            }
            QueueCommand::AskModule => {
                let args: AskArgs = parse_args(args)?;
                let values = self
                    .container
                    .ask(&args.uid, &args.parameters)
                    .map_err(|e| e.to_string())?;
                Ok(Value::Object(values))
            }
            QueueCommand::AskBackground => {
                let args: AskArgs = parse_args(args)?;
                let values = self
                    .container
                    .ask_background(&args.uid, &args.parameters)
                    .map_err(|e| e.to_string())?;
                Ok(Value::Object(values))
            }
        }
    }

    async fn shutdown(&self) {
        self.container.clear().await;
    }
}

/// Dispatch boundary for a pool container.
pub struct PoolDispatcher {
    container: Arc<PoolContainer>,
    audit: Option<SharedAuditSink>,
}

impl PoolDispatcher {
    /// Namespace tag pool commands are audited under.
    pub const NAMESPACE: &'static str = "client-pool";

    /// Create a dispatcher; passing no audit sink disables command logging.
    #[must_use]
    pub fn new(container: Arc<PoolContainer>, audit: Option<SharedAuditSink>) -> Self {
        Self { container, audit }
    }
}

#[async_trait]
impl CommandHandler for PoolDispatcher {
    async fn handle(&self, name: &str, args: Value) -> Result<Value, String> {
        let command =
            PoolCommand::parse(name).ok_or_else(|| format!("unknown command: {name}"))?;
        if command.is_audited() {
            record_command(self.audit.as_ref(), Self::NAMESPACE, name, &args);
        }
        match command {
            PoolCommand::Add => {
                let args: AddArgs = parse_args(args)?;
                let uid = self
                    .container
                    .add(&args.kind, args.args)
                    .await
                    .map_err(|e| e.to_string())?;
                Ok(json!({ "uid": uid }))
            }
            PoolCommand::Rm => {
                let args: UidListArgs = parse_args(args)?;
                self.container.remove(&args.uids).await;
                Ok(Value::Null)
            }
            PoolCommand::Pool => {
                let args: SnapshotArgs = parse_args(args)?;
                to_wire(&self.container.snapshot(&args.parameters))
            }
            PoolCommand::ModulesAvailable => to_wire(&self.container.kinds()),
            PoolCommand::TellModule => {
                let args: TellArgs = parse_args(args)?;
                self.container
                    .tell(&args.uid, &args.cmd, args.args)
                    .await
                    .map_err(|e| e.to_string())
            }
            PoolCommand::AskModule => {
                let args: AskArgs = parse_args(args)?;
                let values = self
                    .container
                    .ask(&args.uid, &args.parameters)
                    .map_err(|e| e.to_string())?;
                Ok(Value::Object(values))
            }
        }
    }

    async fn shutdown(&self) {
        self.container.clear().await;
    }
}
