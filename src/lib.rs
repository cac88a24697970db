//! ctrlstore: an authenticated, in-memory key-value service used to pass
//! start/stop/path commands between an acquisition process and the
//! controller scripts driving it.

pub mod bridge;
pub mod client;
pub mod config;
pub mod controller;
pub mod encoding;
pub mod logging;
pub mod protocol;
pub mod recorder;
pub mod server;
pub mod store;

pub use bridge::{PollingBridge, PollOutcome, RecordingState};
pub use client::{ClientError, StoreClient};
pub use config::Config;
pub use encoding::Data;
pub use server::Server;
pub use store::SharedStore;
