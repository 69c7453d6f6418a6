//! Snapshot publication to the shared graph store.
//!
//! Every cycle the previous graph contents are deleted and the new snapshot
//! inserted, as two sequential SPARQL updates. If the delete fails the
//! insert is not attempted; a half-replaced graph is worse than a stale one.
//! Publication failures never stop the control loop.

use crate::config::StoreConfig;
use async_trait::async_trait;
use netguard_common::snapshot::Snapshot;
use thiserror::Error;
use tracing::debug;

/// Namespace of every resource the daemon publishes.
pub const NAMESPACE: &str = "http://netguard#";

/// Name of the per-cycle summary resource.
pub const SUMMARY_NODE: &str = "Interface_NETWORK_SUMMARY";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("update request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("update rejected with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },
}

#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn publish(&self, snapshot: &Snapshot) -> Result<(), StoreError>;
}

/// Clear the graph before each insert.
pub fn delete_statement() -> String {
    "DELETE WHERE { ?s ?p ?o }".to_string()
}

/// Render one snapshot as a single INSERT DATA update.
pub fn render_insert(snapshot: &Snapshot) -> String {
    let mut triples = Vec::new();

    for itf in &snapshot.interfaces {
        let subject = format!("net:Interface_{}", local_name(&itf.name));
        triples.push(format!(
            "{} net:ifIndex {} ; net:ifName \"{}\" ; net:status \"{}\" ; \
             net:inOctets {} ; net:outOctets {} ; \
             net:inRateMiBps \"{:.3}\" ; net:outRateMiBps \"{:.3}\" .",
            subject,
            itf.index,
            escape(&itf.name),
            itf.status.as_str(),
            itf.in_octets,
            itf.out_octets,
            itf.in_rate_mibps,
            itf.out_rate_mibps,
        ));
        if let Some(gateway) = itf.gateway {
            triples.push(format!(
                "{} net:dependsOn net:Gateway_{} .",
                subject,
                local_name(&gateway.to_string())
            ));
        }
    }

    for (gateway, load) in &snapshot.topology.gateway_load {
        triples.push(format!(
            "net:Gateway_{} net:address \"{}\" ; net:interfaceCount {} .",
            local_name(gateway),
            escape(gateway),
            load,
        ));
    }

    let mut summary = format!(
        "net:{} net:cycle {} ; net:takenAt \"{}\" ; \
         net:upCount {} ; net:downCount {} ; \
         net:topologySeverity \"{}\" ; net:topologyMessage \"{}\" ; \
         net:diagnostic \"{}\"",
        SUMMARY_NODE,
        snapshot.cycle,
        snapshot.taken_at.to_rfc3339(),
        snapshot.up_count(),
        snapshot.down_count(),
        snapshot.topology.severity.as_str(),
        escape(&snapshot.topology.message),
        escape(&snapshot.diagnostic),
    );
    if let Some(name) = &snapshot.system.name {
        summary.push_str(&format!(" ; net:sysName \"{}\"", escape(name)));
    }
    if let Some(descr) = &snapshot.system.descr {
        summary.push_str(&format!(" ; net:sysDescr \"{}\"", escape(descr)));
    }
    if let Some(uptime) = &snapshot.system.uptime {
        summary.push_str(&format!(" ; net:sysUptime \"{}\"", escape(uptime)));
    }
    if let Some(contact) = &snapshot.system.contact {
        summary.push_str(&format!(" ; net:sysContact \"{}\"", escape(contact)));
    }
    if let Some(location) = &snapshot.system.location {
        summary.push_str(&format!(" ; net:sysLocation \"{}\"", escape(location)));
    }
    summary.push_str(" .");
    triples.push(summary);

    for orphan in &snapshot.topology.orphan_interfaces {
        triples.push(format!(
            "net:{} net:orphanInterface \"{}\" .",
            SUMMARY_NODE,
            escape(orphan)
        ));
    }

    format!(
        "PREFIX net: <{}>\nINSERT DATA {{\n  {}\n}}",
        NAMESPACE,
        triples.join("\n  ")
    )
}

/// Collapse a value into a SPARQL-safe local name.
fn local_name(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn escape(raw: &str) -> String {
    raw.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Store client for a SPARQL 1.1 update endpoint (Jena Fuseki in the lab).
pub struct FusekiStore {
    client: reqwest::Client,
    update_url: String,
    username: String,
    password: String,
}

impl FusekiStore {
    pub fn new(config: &StoreConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            update_url: config.update_url.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
        }
    }

    async fn update(&self, statement: String) -> Result<(), StoreError> {
        let response = self
            .client
            .post(&self.update_url)
            .basic_auth(&self.username, Some(&self.password))
            .form(&[("update", statement)])
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(StoreError::Rejected {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            })
        }
    }
}

#[async_trait]
impl SnapshotStore for FusekiStore {
    async fn publish(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        self.update(delete_statement()).await?;
        self.update(render_insert(snapshot)).await?;
        debug!(
            "Published cycle {} snapshot ({} interfaces)",
            snapshot.cycle,
            snapshot.interfaces.len()
        );
        Ok(())
    }
}
