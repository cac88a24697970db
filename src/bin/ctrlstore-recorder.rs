use std::path::PathBuf;

use clap::Parser;
use ctrlstore::config::ConfigArgs;
use ctrlstore::recorder::SessionRecorder;
use ctrlstore::{logging, PollingBridge, StoreClient};
use tokio::sync::watch;
use tracing::{info, warn};

/// Acquisition-side process: follows remote start/stop commands
#[derive(Debug, Parser)]
#[command(name = "ctrlstore-recorder", version)]
struct Args {
    #[command(flatten)]
    config: ConfigArgs,

    /// Where sessions go when no store path was requested
    #[arg(long, default_value = ".")]
    data_dir: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = args.config.load()?;
    logging::init(&config.log)?;

    // Recording works without the store; remote control just stays off
    // until the bridge manages to connect.
    let client = StoreClient::connect(&config.endpoint, &config.client).await;
    if !client.is_connected() {
        warn!("Store not reachable yet; remote control unavailable");
    }

    let mut bridge = PollingBridge::new(client, SessionRecorder::new(args.data_dir));
    bridge.announce().await;

    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, stopping");
            let _ = tx.send(true);
        }
    });

    info!(
        "Polling for remote commands every {:?}",
        config.bridge.poll_interval
    );
    bridge.run_until(config.bridge.poll_interval, rx).await;
    Ok(())
}
