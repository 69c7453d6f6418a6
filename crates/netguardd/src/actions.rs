//! Corrective-action dispatch against the managed device.
//!
//! Route and link commands run on the device's execution surface, either
//! locally or through `docker exec` into the device container. Every
//! command is best-effort: a failure is logged and the controller's next
//! cycle recomputes the plan from live state, so there is no queue and no
//! rollback.

use crate::config::DeviceConfig;
use crate::quarantine::QuarantineCommand;
use crate::telemetry::{ManagementSession, OID_IF_ADMIN_STATUS};
use async_trait::async_trait;
use netguard_common::types::{AdminStatus, IfIndex};
use std::net::Ipv4Addr;
use std::sync::Arc;
use thiserror::Error;
use tokio::process::Command;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("failed to launch `{command}`: {source}")]
    Launch {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {status}: {stderr}")]
    Failed {
        command: String,
        status: i32,
        stderr: String,
    },
}

/// Shell-style command execution on the managed device.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, command: &str) -> Result<String, ActionError>;
}

/// Runs commands locally, or inside the device container when one is
/// configured.
pub struct DeviceRunner {
    container: Option<String>,
}

impl DeviceRunner {
    pub fn new(device: &DeviceConfig) -> Self {
        Self {
            container: device.container.clone(),
        }
    }
}

#[async_trait]
impl CommandRunner for DeviceRunner {
    async fn run(&self, command: &str) -> Result<String, ActionError> {
        let output = match &self.container {
            Some(container) => {
                Command::new("docker")
                    .args(["exec", container, "sh", "-c", command])
                    .output()
                    .await
            }
            None => Command::new("sh").args(["-c", command]).output().await,
        }
        .map_err(|source| ActionError::Launch {
            command: command.to_string(),
            source,
        })?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).to_string())
        } else {
            Err(ActionError::Failed {
                command: command.to_string(),
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

/// Why a route is being rewritten; used for logging only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeReason {
    Failover,
    Failback,
    Repair,
    Rebalance,
}

impl ChangeReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeReason::Failover => "failover",
            ChangeReason::Failback => "failback",
            ChangeReason::Repair => "repair",
            ChangeReason::Rebalance => "rebalance",
        }
    }
}

/// One planned replace-route command. Replace semantics are
/// create-or-overwrite, so reissuing the same change is safe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteChange {
    pub dest_cidr: String,
    pub gateway: Ipv4Addr,
    pub if_index: IfIndex,
    pub if_name: String,
    pub reason: ChangeReason,
}

/// Build the idempotent route replace command.
pub fn replace_route_command(change: &RouteChange) -> String {
    if change.if_name.is_empty() {
        format!("ip route replace {} via {} onlink", change.dest_cidr, change.gateway)
    } else {
        format!(
            "ip route replace {} via {} dev {} onlink",
            change.dest_cidr, change.gateway, change.if_name
        )
    }
}

/// Build the link-layer administration command.
pub fn link_command(name: &str, up: bool) -> String {
    format!("ip link set {} {}", name, if up { "up" } else { "down" })
}

/// Dispatches corrective commands through the device collaborators.
pub struct Dispatcher {
    runner: Arc<dyn CommandRunner>,
    session: Arc<dyn ManagementSession>,
}

impl Dispatcher {
    pub fn new(runner: Arc<dyn CommandRunner>, session: Arc<dyn ManagementSession>) -> Self {
        Self { runner, session }
    }

    /// Apply one route change. Returns true when the device accepted it.
    pub async fn replace_route(&self, change: &RouteChange) -> bool {
        let command = replace_route_command(change);
        match self.runner.run(&command).await {
            Ok(_) => {
                info!(
                    "[{}] route {} -> {} (if {})",
                    change.reason.as_str(),
                    change.dest_cidr,
                    change.gateway,
                    change.if_index
                );
                true
            }
            Err(e) => {
                warn!("[{}] route change failed: {}", change.reason.as_str(), e);
                false
            }
        }
    }

    /// Set the administrative status of an interface via the agent.
    pub async fn set_admin(&self, index: IfIndex, status: AdminStatus) -> bool {
        let oid = format!("{}.{}", OID_IF_ADMIN_STATUS, index);
        match self.session.set(&oid, 'i', status.snmp_value()).await {
            Ok(()) => {
                info!("Set ifAdminStatus.{} = {}", index, status.snmp_value());
                true
            }
            Err(e) => {
                warn!("Admin status set for idx {} failed: {}", index, e);
                false
            }
        }
    }

    /// Bring the link layer up or down on the device itself.
    pub async fn set_link(&self, name: &str, up: bool) -> bool {
        let command = link_command(name, up);
        match self.runner.run(&command).await {
            Ok(_) => {
                info!("Link {} set {}", name, if up { "up" } else { "down" });
                true
            }
            Err(e) => {
                warn!("Link command for {} failed: {}", name, e);
                false
            }
        }
    }

    /// Apply a quarantine state-machine command.
    pub async fn apply_quarantine(&self, command: &QuarantineCommand) -> bool {
        match command {
            QuarantineCommand::AdminDown(index) => self.set_admin(*index, AdminStatus::Down).await,
            QuarantineCommand::AdminUp(index) => self.set_admin(*index, AdminStatus::Up).await,
            QuarantineCommand::LinkUp { name, .. } => self.set_link(name, true).await,
        }
    }
}
