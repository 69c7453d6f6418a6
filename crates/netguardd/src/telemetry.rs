//! Telemetry client for the managed device.
//!
//! Talks to the agent through the net-snmp command line tools
//! (`snmpwalk`/`snmpget`/`snmpset`) with numeric output, a bounded timeout
//! and a bounded retry count. A metric that cannot be walked yields an
//! empty table for the cycle, never a fatal error.

use crate::config::DeviceConfig;
use async_trait::async_trait;
use netguard_common::snapshot::SystemInfo;
use netguard_common::types::{AdminStatus, IfIndex, Interface, OperStatus, Route};
use std::collections::BTreeMap;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

// IF-MIB interface table columns
pub const OID_IF_DESCR: &str = "1.3.6.1.2.1.2.2.1.2";
pub const OID_IF_ADMIN_STATUS: &str = "1.3.6.1.2.1.2.2.1.7";
pub const OID_IF_OPER_STATUS: &str = "1.3.6.1.2.1.2.2.1.8";
pub const OID_IF_IN_OCTETS: &str = "1.3.6.1.2.1.2.2.1.10";
pub const OID_IF_OUT_OCTETS: &str = "1.3.6.1.2.1.2.2.1.16";

// RFC1213 route table columns (instance index is the destination address)
pub const OID_ROUTE_IF_INDEX: &str = "1.3.6.1.2.1.4.21.1.2";
pub const OID_ROUTE_NEXT_HOP: &str = "1.3.6.1.2.1.4.21.1.7";

// SNMPv2-MIB scalars
pub const OID_SYS_DESCR: &str = "1.3.6.1.2.1.1.1.0";
pub const OID_SYS_UPTIME: &str = "1.3.6.1.2.1.1.3.0";
pub const OID_SYS_CONTACT: &str = "1.3.6.1.2.1.1.4.0";
pub const OID_SYS_NAME: &str = "1.3.6.1.2.1.1.5.0";
pub const OID_SYS_LOCATION: &str = "1.3.6.1.2.1.1.6.0";

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("failed to launch {tool}: {source}")]
    Launch {
        tool: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} {oid} failed: {stderr}")]
    Request {
        tool: &'static str,
        oid: String,
        stderr: String,
    },
}

/// The three operations the core depends on: bulk table walk, scalar get,
/// and set-by-index with a type tag.
#[async_trait]
pub trait ManagementSession: Send + Sync {
    /// Walk a table column. Returns instance index -> value.
    async fn walk(&self, oid: &str) -> Result<BTreeMap<String, String>, TelemetryError>;

    /// Read one scalar. `None` when the agent has no such object.
    async fn get(&self, oid: &str) -> Result<Option<String>, TelemetryError>;

    /// Write one value. `type_tag` follows snmpset conventions ('i', 's').
    async fn set(&self, oid: &str, type_tag: char, value: &str) -> Result<(), TelemetryError>;
}

/// Session backed by the net-snmp command line tools.
pub struct NetSnmpSession {
    host: String,
    community: String,
    write_community: String,
    timeout_secs: u64,
    retries: u8,
}

impl NetSnmpSession {
    pub fn new(device: &DeviceConfig) -> Self {
        Self {
            host: device.host.clone(),
            community: device.community.clone(),
            write_community: device.write_community.clone(),
            timeout_secs: device.timeout_secs,
            retries: device.retries.min(2),
        }
    }

    fn base_args(&self, community: &str) -> Vec<String> {
        vec![
            "-v2c".to_string(),
            "-c".to_string(),
            community.to_string(),
            "-On".to_string(),
            "-Oq".to_string(),
            "-t".to_string(),
            self.timeout_secs.to_string(),
            "-r".to_string(),
            self.retries.to_string(),
            self.host.clone(),
        ]
    }
}

#[async_trait]
impl ManagementSession for NetSnmpSession {
    async fn walk(&self, oid: &str) -> Result<BTreeMap<String, String>, TelemetryError> {
        let mut args = self.base_args(&self.community);
        args.push(oid.to_string());

        let output = Command::new("snmpwalk")
            .args(&args)
            .output()
            .await
            .map_err(|source| TelemetryError::Launch {
                tool: "snmpwalk",
                source,
            })?;

        if !output.status.success() {
            return Err(TelemetryError::Request {
                tool: "snmpwalk",
                oid: oid.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(parse_walk_output(oid, &stdout))
    }

    async fn get(&self, oid: &str) -> Result<Option<String>, TelemetryError> {
        let mut args = self.base_args(&self.community);
        args.push(oid.to_string());

        let output = Command::new("snmpget")
            .args(&args)
            .output()
            .await
            .map_err(|source| TelemetryError::Launch {
                tool: "snmpget",
                source,
            })?;

        if !output.status.success() {
            return Err(TelemetryError::Request {
                tool: "snmpget",
                oid: oid.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let value = stdout
            .lines()
            .next()
            .and_then(|line| line.splitn(2, ' ').nth(1))
            .map(|v| unquote(v.trim()).to_string())
            .filter(|v| !v.is_empty() && v != "No Such Object available on this agent at this OID");
        Ok(value)
    }

    async fn set(&self, oid: &str, type_tag: char, value: &str) -> Result<(), TelemetryError> {
        let mut args = self.base_args(&self.write_community);
        args.push(oid.to_string());
        args.push(type_tag.to_string());
        args.push(value.to_string());

        let output = Command::new("snmpset")
            .args(&args)
            .output()
            .await
            .map_err(|source| TelemetryError::Launch {
                tool: "snmpset",
                source,
            })?;

        if !output.status.success() {
            return Err(TelemetryError::Request {
                tool: "snmpset",
                oid: oid.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

/// Parse `snmpwalk -On -Oq` output into instance index -> value.
///
/// Indices are normalized by stripping the walked prefix, so the same index
/// denotes the same interface (or route destination) across every table
/// walked in one cycle.
pub fn parse_walk_output(base_oid: &str, stdout: &str) -> BTreeMap<String, String> {
    let base = base_oid.trim_start_matches('.');
    let mut table = BTreeMap::new();

    for line in stdout.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut parts = line.splitn(2, ' ');
        let oid = match parts.next() {
            Some(o) => o.trim_start_matches('.'),
            None => continue,
        };
        let value = parts.next().unwrap_or("").trim();

        let index = match oid.strip_prefix(base) {
            Some(rest) => rest.trim_start_matches('.'),
            None => continue,
        };
        if index.is_empty() {
            continue;
        }
        table.insert(index.to_string(), unquote(value).to_string());
    }

    table
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

/// Everything observed from the device in one cycle. Decision logic runs
/// against this frozen view only; no stage mixes data from two cycles.
#[derive(Debug, Clone, Default)]
pub struct CycleTelemetry {
    pub names: BTreeMap<String, String>,
    pub admin: BTreeMap<String, String>,
    pub oper: BTreeMap<String, String>,
    pub in_octets: BTreeMap<String, String>,
    pub out_octets: BTreeMap<String, String>,
    pub route_next_hop: BTreeMap<String, String>,
    pub route_if_index: BTreeMap<String, String>,
    pub system: SystemInfo,
}

impl CycleTelemetry {
    /// Interfaces present in this cycle's tables. Loopbacks are skipped;
    /// an interface absent from the name table is absent from the cycle.
    pub fn interfaces(&self) -> Vec<Interface> {
        let mut interfaces = Vec::new();
        for (idx, name) in &self.names {
            if name.contains("lo") && name.len() <= 3 {
                continue;
            }
            let index: IfIndex = match idx.parse() {
                Ok(i) => i,
                Err(_) => {
                    debug!("Skipping non-numeric interface index {:?}", idx);
                    continue;
                }
            };
            let admin = AdminStatus::from_snmp(self.admin.get(idx).map(String::as_str).unwrap_or("2"));
            let oper = OperStatus::from_snmp(self.oper.get(idx).map(String::as_str).unwrap_or("2"));
            let in_octets = parse_counter(self.in_octets.get(idx));
            let out_octets = parse_counter(self.out_octets.get(idx));
            interfaces.push(Interface {
                index,
                name: name.clone(),
                admin,
                oper,
                in_octets,
                out_octets,
            });
        }
        interfaces
    }

    /// Routes with a real next hop. The route table instance index is the
    /// destination address.
    pub fn routes(&self) -> Vec<Route> {
        let mut routes = Vec::new();
        for (dest_idx, next_hop) in &self.route_next_hop {
            let next_hop = next_hop.trim_matches('\'').trim();
            if next_hop == "0.0.0.0" {
                continue;
            }
            let next_hop = match next_hop.parse() {
                Ok(ip) => ip,
                Err(_) => continue,
            };
            let dest = match dest_idx.parse() {
                Ok(ip) => ip,
                Err(_) => continue,
            };
            let if_index = match self
                .route_if_index
                .get(dest_idx)
                .and_then(|v| v.trim().parse().ok())
            {
                Some(i) => i,
                None => continue,
            };
            routes.push(Route {
                dest,
                next_hop,
                if_index,
            });
        }
        routes
    }

    /// ifIndex -> name, for building device commands.
    pub fn name_map(&self) -> BTreeMap<IfIndex, String> {
        self.names
            .iter()
            .filter_map(|(idx, name)| idx.parse().ok().map(|i| (i, name.clone())))
            .collect()
    }
}

fn parse_counter(raw: Option<&String>) -> u64 {
    raw.and_then(|v| v.trim().parse().ok()).unwrap_or(0)
}

/// Walk every table and scalar for one cycle. Partial failure is tolerated:
/// a failed walk logs a warning and contributes an empty table.
pub async fn collect(session: &dyn ManagementSession) -> CycleTelemetry {
    let mut telemetry = CycleTelemetry::default();

    let tables: [(&str, &mut BTreeMap<String, String>); 7] = [
        (OID_IF_DESCR, &mut telemetry.names),
        (OID_IF_ADMIN_STATUS, &mut telemetry.admin),
        (OID_IF_OPER_STATUS, &mut telemetry.oper),
        (OID_IF_IN_OCTETS, &mut telemetry.in_octets),
        (OID_IF_OUT_OCTETS, &mut telemetry.out_octets),
        (OID_ROUTE_NEXT_HOP, &mut telemetry.route_next_hop),
        (OID_ROUTE_IF_INDEX, &mut telemetry.route_if_index),
    ];

    for (oid, slot) in tables {
        match session.walk(oid).await {
            Ok(table) => *slot = table,
            Err(e) => warn!("Telemetry walk {} unavailable this cycle: {}", oid, e),
        }
    }

    telemetry.system = SystemInfo {
        descr: scalar(session, OID_SYS_DESCR).await,
        uptime: scalar(session, OID_SYS_UPTIME).await,
        contact: scalar(session, OID_SYS_CONTACT).await,
        name: scalar(session, OID_SYS_NAME).await,
        location: scalar(session, OID_SYS_LOCATION).await,
    };

    telemetry
}

async fn scalar(session: &dyn ManagementSession, oid: &str) -> Option<String> {
    match session.get(oid).await {
        Ok(value) => value,
        Err(e) => {
            debug!("Scalar get {} unavailable: {}", oid, e);
            None
        }
    }
}
