//! Netguard daemon library - exposes modules for testing.

pub mod actions;
pub mod balancer;
pub mod config;
pub mod controller;
pub mod failover;
pub mod liveness;
pub mod quarantine;
pub mod rates;
pub mod repair;
pub mod store;
pub mod telemetry;
pub mod topology;
pub mod triggers;
