//! Out-of-band trigger signals shared between netguardctl and netguardd.
//!
//! Triggers are plain files in a runtime directory. The daemon checks for
//! them once per control cycle and deletes them after acting, giving
//! at-most-once semantics with response latency bounded by one cycle.

use std::path::{Path, PathBuf};

/// Default directory the daemon watches for trigger files.
pub const DEFAULT_TRIGGER_DIR: &str = "/run/netguard";

/// File that requests an immediate round-robin rebalance of up interfaces.
pub const REBALANCE_TRIGGER: &str = "rebalance.trigger";

/// File that requests a full anomaly-state reset (all interfaces back to
/// monitoring, administrative and link layer re-enabled).
pub const RESET_TRIGGER: &str = "reset.trigger";

pub fn rebalance_path(dir: &Path) -> PathBuf {
    dir.join(REBALANCE_TRIGGER)
}

pub fn reset_path(dir: &Path) -> PathBuf {
    dir.join(RESET_TRIGGER)
}
