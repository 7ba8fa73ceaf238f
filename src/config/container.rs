//! Container and service configuration structures.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Audit backend selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditBackendConfig {
    /// In-memory ring buffer for development/testing.
    InMemory,
    /// Append-only JSON-lines file.
    Jsonl,
}

/// Audit log configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Backend selection.
    pub backend: AuditBackendConfig,
    /// Log file path, required for the JSON-lines backend.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Per-container configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerConfig {
    /// TCP port the container's command endpoint listens on.
    pub port: u16,
    /// Allocate sequential uids instead of random ones (deterministic tests).
    #[serde(default)]
    pub sequential_uids: bool,
    /// Cap on terminate-and-retry reconciliation rounds; absent retries until
    /// clean.
    #[serde(default)]
    pub max_reconcile_rounds: Option<u32>,
}

/// Root service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Map of container name to configuration.
    pub containers: HashMap<String, ContainerConfig>,
    /// Audit log configuration; absent disables auditing.
    #[serde(default)]
    pub audit: Option<AuditConfig>,
}

impl AuditConfig {
    /// Validate audit configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid value.
    pub fn validate(&self) -> Result<(), String> {
        if matches!(self.backend, AuditBackendConfig::Jsonl) && self.path.is_none() {
            return Err("jsonl audit backend requires a path".into());
        }
        Ok(())
    }
}

impl ContainerConfig {
    /// Validate container configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid value.
    pub fn validate(&self) -> Result<(), String> {
        if self.port == 0 {
            return Err("port must be greater than 0".into());
        }
        if self.max_reconcile_rounds == Some(0) {
            return Err("max_reconcile_rounds must be greater than 0 when set".into());
        }
        Ok(())
    }
}

impl ServiceConfig {
    /// Validate all containers and ensure at least one exists on a unique
    /// port.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid value.
    pub fn validate(&self) -> Result<(), String> {
        if self.containers.is_empty() {
            return Err("at least one container must be defined".into());
        }
        let mut ports = HashSet::new();
        for (name, container) in &self.containers {
            container
                .validate()
                .map_err(|e| format!("container `{name}` invalid: {e}"))?;
            if !ports.insert(container.port) {
                return Err(format!("container `{name}` reuses port {}", container.port));
            }
        }
        if let Some(audit) = &self.audit {
            audit.validate()?;
        }
        Ok(())
    }

    /// Parse service configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Returns the parse error or the first validation failure.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load configuration from the file named by the `MARQUEE_SETTINGS`
    /// environment variable, after a best-effort `.env` load.
    ///
    /// # Errors
    ///
    /// Returns an error when the variable is unset, the file cannot be read,
    /// or its contents fail to parse or validate.
    pub fn load() -> Result<Self, String> {
        let _ = dotenvy::dotenv();
        let path = std::env::var("MARQUEE_SETTINGS")
            .map_err(|_| "MARQUEE_SETTINGS is not set".to_string())?;
        let raw = std::fs::read_to_string(&path)
            .map_err(|e| format!("cannot read settings file `{path}`: {e}"))?;
        Self::from_json_str(&raw)
    }
}
