//! Controller-side command sequences.
//!
//! These are what lab scripts call to drive a remote recorder. Each step is
//! best effort; the returned report says what the recorder last published.

use std::time::Duration;

use tracing::info;

use crate::bridge::{RECORDING, RECORDING_COMMAND, STORE_PATH};
use crate::client::StoreClient;
use crate::encoding::Data;

/// Snapshot of the control keys after a sequence
#[derive(Debug, Clone, PartialEq)]
pub struct ControlReport {
    pub store_path: Option<Data>,
    pub command: Option<Data>,
    pub recording: Option<Data>,
}

impl ControlReport {
    /// Whether the acquisition side reports an active recording
    pub fn is_recording(&self) -> bool {
        self.recording.as_ref().and_then(Data::as_int) == Some(1)
    }
}

pub async fn report(client: &mut StoreClient) -> ControlReport {
    ControlReport {
        store_path: client.read(STORE_PATH).await,
        command: client.read(RECORDING_COMMAND).await,
        recording: client.read(RECORDING).await,
    }
}

/// Point the recorder at `store_path` and ask it to start.
///
/// A stop command goes out first so a recorder still running an earlier
/// session closes it; `settle` should exceed the bridge's poll interval.
pub async fn start_recording(
    client: &mut StoreClient,
    store_path: &str,
    settle: Duration,
) -> ControlReport {
    client.write(STORE_PATH, store_path).await;
    info!("Requested store path {}", store_path);

    client.write(RECORDING_COMMAND, false).await;
    tokio::time::sleep(settle).await;
    client.write(RECORDING_COMMAND, true).await;
    tokio::time::sleep(settle).await;

    report(client).await
}

/// Ask the recorder to stop, then clear the store path
pub async fn stop_recording(client: &mut StoreClient, settle: Duration) -> ControlReport {
    client.write(RECORDING_COMMAND, false).await;
    tokio::time::sleep(settle).await;
    client.delete(STORE_PATH).await;

    report(client).await
}
