//! Operator trigger files.
//!
//! The CLI requests work by dropping marker files into the trigger
//! directory; the daemon checks once per cycle. A trigger is removed before
//! it is acted on, so each file fires at most once even if the action
//! itself fails.

use netguard_common::triggers::{rebalance_path, reset_path};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Operator request consumed from the trigger directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    /// Redistribute routes across both gateways.
    Rebalance,
    /// Clear all anomaly state and re-enable every interface.
    ResetAnomaly,
}

/// Polls the trigger directory once per cycle.
pub struct TriggerQueue {
    dir: PathBuf,
}

impl TriggerQueue {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Consume pending triggers. The file is deleted first; a trigger that
    /// cannot be deleted is left in place and not reported, so it retries
    /// next cycle rather than firing twice.
    pub fn poll(&self) -> Vec<ControlSignal> {
        let mut signals = Vec::new();
        if self.consume(&rebalance_path(&self.dir), "rebalance") {
            signals.push(ControlSignal::Rebalance);
        }
        if self.consume(&reset_path(&self.dir), "reset") {
            signals.push(ControlSignal::ResetAnomaly);
        }
        signals
    }

    fn consume(&self, path: &Path, label: &str) -> bool {
        if !path.exists() {
            return false;
        }
        match std::fs::remove_file(path) {
            Ok(()) => {
                info!("Consumed {} trigger", label);
                true
            }
            Err(e) => {
                warn!("Could not consume {} trigger at {}: {}", label, path.display(), e);
                false
            }
        }
    }
}
