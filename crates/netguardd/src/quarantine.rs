//! Anomaly / quarantine state machine.
//!
//! Per-interface state is process-local and persists across cycles: the
//! operational and administrative flags alone cannot distinguish
//! "intentionally quarantined" from "externally disabled". Each transition
//! produces at most one corrective command; the command for an entered
//! state is never reissued while the state holds.

use crate::rates::RateSample;
use netguard_common::types::{AdminStatus, IfIndex};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AnomalyState {
    Monitoring,
    Shutdown { since: Instant },
}

/// Corrective command requested by a state transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuarantineCommand {
    /// Administratively disable the interface (quarantine entry).
    AdminDown(IfIndex),
    /// Administratively re-enable the interface (timed release).
    AdminUp(IfIndex),
    /// Re-enable the underlying link layer (manual reset only; a link can
    /// be disabled outside the agent's administrative flag).
    LinkUp { index: IfIndex, name: String },
}

/// Tracks traffic threshold breaches and timed release per interface.
pub struct QuarantineGuard {
    threshold_bps: f64,
    duration: Duration,
    states: HashMap<IfIndex, AnomalyState>,
}

impl QuarantineGuard {
    pub fn new(threshold_bps: f64, duration: Duration) -> Self {
        Self {
            threshold_bps,
            duration,
            states: HashMap::new(),
        }
    }

    /// Feed one cycle's observation for an interface.
    ///
    /// Quarantine entry reacts on the instantaneous (pre-smoothing) rate so
    /// a genuine flood is cut off within one cycle, and only while the
    /// interface is administratively up.
    pub fn observe(
        &mut self,
        index: IfIndex,
        name: &str,
        rate: &RateSample,
        admin: AdminStatus,
        now: Instant,
    ) -> Option<QuarantineCommand> {
        let state = self.states.entry(index).or_insert(AnomalyState::Monitoring);

        match *state {
            AnomalyState::Monitoring => {
                let breached = rate.in_bps > self.threshold_bps || rate.out_bps > self.threshold_bps;
                if breached && admin == AdminStatus::Up {
                    info!(
                        "Traffic anomaly on {} (idx {}): {:.1} MiB/s in, {:.1} MiB/s out; quarantining",
                        name,
                        index,
                        rate.in_bps / (1024.0 * 1024.0),
                        rate.out_bps / (1024.0 * 1024.0),
                    );
                    *state = AnomalyState::Shutdown { since: now };
                    Some(QuarantineCommand::AdminDown(index))
                } else {
                    None
                }
            }
            AnomalyState::Shutdown { since } => {
                if now.duration_since(since) >= self.duration {
                    info!("Quarantine of {} (idx {}) expired, re-enabling", name, index);
                    *state = AnomalyState::Monitoring;
                    Some(QuarantineCommand::AdminUp(index))
                } else {
                    None
                }
            }
        }
    }

    pub fn is_quarantined(&self, index: IfIndex) -> bool {
        matches!(
            self.states.get(&index),
            Some(AnomalyState::Shutdown { .. })
        )
    }

    /// Manual reset: force every interface back to monitoring and re-enable
    /// both the administrative flag and the link layer.
    pub fn reset_all(&mut self, interfaces: &[(IfIndex, String)]) -> Vec<QuarantineCommand> {
        self.states.clear();
        let mut commands = Vec::with_capacity(interfaces.len() * 2);
        for (index, name) in interfaces {
            self.states.insert(*index, AnomalyState::Monitoring);
            commands.push(QuarantineCommand::AdminUp(*index));
            commands.push(QuarantineCommand::LinkUp {
                index: *index,
                name: name.clone(),
            });
        }
        commands
    }
}
