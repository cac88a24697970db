use std::sync::Arc;

use clap::Parser;
use ctrlstore::config::ConfigArgs;
use ctrlstore::protocol::auth;
use ctrlstore::{logging, Server};
use tracing::{info, warn};

/// Shared control-data store server
#[derive(Debug, Parser)]
#[command(name = "ctrlstore", version)]
struct Args {
    #[command(flatten)]
    config: ConfigArgs,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = args.config.load()?;
    logging::init(&config.log)?;

    info!("Starting ctrlstore - shared control-data store");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let authkey = config.endpoint.authkey()?;
    info!("Authkey fingerprint: {}", auth::fingerprint(authkey));

    let server = Arc::new(Server::bind_endpoint(&config.endpoint).await?);
    info!("Server listening on: {}", server.local_addr());

    // Runs until the process is killed; ctrl-c only gets a log line
    tokio::select! {
        _ = server.run() => {}
        _ = tokio::signal::ctrl_c() => warn!("Interrupted, exiting"),
    }

    Ok(())
}
