//! Netguard Daemon - autonomic network control loop
//!
//! Observes a managed device, keeps traffic on live gateways, quarantines
//! anomalous interfaces, and publishes each cycle's state to the shared
//! graph store.

use clap::Parser;
use netguardd::actions::DeviceRunner;
use netguardd::config::Config;
use netguardd::controller::Controller;
use netguardd::liveness::PingProber;
use netguardd::store::FusekiStore;
use netguardd::telemetry::NetSnmpSession;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "netguardd", version, about = "Autonomic network control daemon")]
struct Args {
    /// Config file path (defaults to the standard locations)
    #[arg(short, long)]
    config: Option<String>,

    /// Run a single control cycle and exit
    #[arg(long)]
    oneshot: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    info!("Netguard Daemon v{} starting", env!("CARGO_PKG_VERSION"));

    let config = match &args.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load(),
    };

    let session = Arc::new(NetSnmpSession::new(&config.device));
    let prober = Arc::new(PingProber {
        timeout_secs: config.gateways.probe_timeout_secs,
    });
    let runner = Arc::new(DeviceRunner::new(&config.device));
    let store = Arc::new(FusekiStore::new(&config.store));

    let mut controller = Controller::new(config, session, prober, runner, store);

    if args.oneshot {
        let snapshot = controller.run_cycle().await;
        info!(
            "Cycle {} complete: {} up / {} down, topology {}",
            snapshot.cycle,
            snapshot.up_count(),
            snapshot.down_count(),
            snapshot.topology.severity.as_str()
        );
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }

    tokio::select! {
        _ = controller.run() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down gracefully");
        }
    }

    Ok(())
}
