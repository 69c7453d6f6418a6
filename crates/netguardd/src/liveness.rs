//! Gateway liveness probing.
//!
//! One bounded-latency reachability probe per gateway per cycle. The probe
//! result is a boolean for the current cycle only; any debouncing is the
//! tracker's threshold, which defaults to reacting on the instantaneous
//! probe.

use async_trait::async_trait;
use netguard_common::types::GatewayPair;
use std::net::Ipv4Addr;
use tokio::process::Command;
use tracing::warn;

#[async_trait]
pub trait Prober: Send + Sync {
    /// Probe one gateway. False means unreachable this cycle.
    async fn probe(&self, target: Ipv4Addr) -> bool;
}

/// ICMP probe via the system `ping` binary, single packet, bounded wait.
pub struct PingProber {
    pub timeout_secs: u64,
}

#[async_trait]
impl Prober for PingProber {
    async fn probe(&self, target: Ipv4Addr) -> bool {
        let status = Command::new("ping")
            .args([
                "-c",
                "1",
                "-W",
                &self.timeout_secs.to_string(),
                &target.to_string(),
            ])
            .output()
            .await;

        match status {
            Ok(output) => output.status.success(),
            Err(e) => {
                warn!("Failed to launch ping for {}: {}", target, e);
                false
            }
        }
    }
}

/// Per-cycle liveness verdict for both gateways.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LivenessView {
    pub primary: bool,
    pub backup: bool,
}

impl LivenessView {
    /// Neither gateway reachable: the managed device is effectively offline
    /// and no route mutation has a safe target.
    pub fn blackout(&self) -> bool {
        !self.primary && !self.backup
    }

    pub fn is_live(&self, ip: Ipv4Addr, gateways: &GatewayPair) -> bool {
        if ip == gateways.primary {
            self.primary
        } else if ip == gateways.backup {
            self.backup
        } else {
            false
        }
    }

    /// The gateways considered alive this cycle.
    pub fn live_gateways(&self, gateways: &GatewayPair) -> Vec<Ipv4Addr> {
        let mut live = Vec::new();
        if self.primary {
            live.push(gateways.primary);
        }
        if self.backup {
            live.push(gateways.backup);
        }
        live
    }
}

/// Turns raw probe results into a liveness verdict, with an optional
/// consecutive-failure hysteresis. A threshold of 1 reacts on the current
/// cycle's probe (the default policy).
pub struct LivenessTracker {
    failure_threshold: u32,
    misses_primary: u32,
    misses_backup: u32,
}

impl LivenessTracker {
    pub fn new(failure_threshold: u32) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            misses_primary: 0,
            misses_backup: 0,
        }
    }

    pub fn assess(&mut self, probe_primary: bool, probe_backup: bool) -> LivenessView {
        if probe_primary {
            self.misses_primary = 0;
        } else {
            self.misses_primary = self.misses_primary.saturating_add(1);
        }
        if probe_backup {
            self.misses_backup = 0;
        } else {
            self.misses_backup = self.misses_backup.saturating_add(1);
        }

        LivenessView {
            primary: self.misses_primary < self.failure_threshold,
            backup: self.misses_backup < self.failure_threshold,
        }
    }
}
