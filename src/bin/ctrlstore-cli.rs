use std::time::Duration;

use clap::{Parser, Subcommand};
use ctrlstore::config::ConfigArgs;
use ctrlstore::controller::{self, ControlReport};
use ctrlstore::{logging, Data, StoreClient};

/// Controller for a ctrlstore-coordinated recorder
#[derive(Debug, Parser)]
#[command(name = "ctrlstore-cli", version)]
struct Args {
    #[command(flatten)]
    config: ConfigArgs,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Debug, Subcommand)]
enum Cmd {
    /// Set the store path and start recording
    Start {
        /// Directory the recorder should write into
        path: String,
        /// Wait between steps, in milliseconds
        #[arg(long, default_value_t = 1000)]
        settle_ms: u64,
    },
    /// Stop recording and clear the store path
    Stop {
        #[arg(long, default_value_t = 5000)]
        settle_ms: u64,
    },
    /// Show the control keys
    Status,
    /// Read one key
    Get { key: String },
    /// Write one key; the value is JSON (`true`, `1`, `"text"`, `null`, ...)
    Set { key: String, value: String },
    /// Delete one key
    Del { key: String },
}

fn print_report(report: &ControlReport) {
    let show = |v: &Option<Data>| v.as_ref().map_or("<absent>".to_string(), Data::to_string);
    println!("storePath:         {}", show(&report.store_path));
    println!("recording_command: {}", show(&report.command));
    println!("recording:         {}", show(&report.recording));
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = args.config.load()?;
    logging::init(&config.log)?;

    let mut client = StoreClient::connect(&config.endpoint, &config.client).await;
    if !client.is_connected() {
        anyhow::bail!("store at {} is not reachable", config.endpoint.addr());
    }

    match args.command {
        Cmd::Start { path, settle_ms } => {
            let report =
                controller::start_recording(&mut client, &path, Duration::from_millis(settle_ms))
                    .await;
            print_report(&report);
        }
        Cmd::Stop { settle_ms } => {
            let report =
                controller::stop_recording(&mut client, Duration::from_millis(settle_ms)).await;
            print_report(&report);
        }
        Cmd::Status => print_report(&controller::report(&mut client).await),
        Cmd::Get { key } => match client.try_read(&key).await? {
            Some(value) => println!("{}", value),
            None => println!("<absent>"),
        },
        Cmd::Set { key, value } => {
            let value = Data::decode(value.as_bytes())?;
            if !client.try_write(&key, value).await? {
                anyhow::bail!("store rejected '{}': quota exceeded", key);
            }
        }
        Cmd::Del { key } => {
            if !client.delete(&key).await {
                println!("<absent>");
            }
        }
    }

    client.close();
    Ok(())
}
