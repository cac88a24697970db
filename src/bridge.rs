//! Polling bridge between the store's command latch and a local recorder.
//!
//! A controller writes `recording_command = true|false`. Each poll reads it,
//! performs the matching start/stop transition if the local state differs,
//! publishes the new `recording` status and clears the command. The clear is
//! a compare-and-clear on the value that was read, so a different command
//! written in the meantime is left for the next poll instead of being lost.
//!
//! A command that already matches the local state is neither acted on nor
//! cleared.

use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::client::StoreClient;
use crate::encoding::Data;
use crate::recorder::Recorder;

/// Directory the acquisition side should record into (string or absent)
pub const STORE_PATH: &str = "storePath";
/// Command latch: `true` start, `false` stop, absent/null nothing pending
pub const RECORDING_COMMAND: &str = "recording_command";
/// Status published by the acquisition side: 1 recording, 0 idle
pub const RECORDING: &str = "recording";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingState {
    Off,
    On,
}

impl RecordingState {
    fn status(self) -> i64 {
        match self {
            RecordingState::Off => 0,
            RecordingState::On => 1,
        }
    }
}

/// What one poll did
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// Store unreachable; local state kept
    Unavailable,
    /// No pending command
    Idle,
    Started,
    Stopped,
    /// Command already matches the local state
    Unchanged,
    /// Command value was not a boolean
    Ignored(Data),
    /// The recorder refused the transition; the command stays pending
    Failed,
}

pub struct PollingBridge<R> {
    client: StoreClient,
    recorder: R,
    state: RecordingState,
}

impl<R: Recorder> PollingBridge<R> {
    pub fn new(client: StoreClient, recorder: R) -> Self {
        Self {
            client,
            recorder,
            state: RecordingState::Off,
        }
    }

    pub fn state(&self) -> RecordingState {
        self.state
    }

    pub fn recorder(&self) -> &R {
        &self.recorder
    }

    /// Publish the current status
    pub async fn announce(&mut self) {
        self.client.write(RECORDING, self.state.status()).await;
    }

    /// Run a single poll cycle
    pub async fn poll_once(&mut self) -> PollOutcome {
        if !self.client.is_connected() {
            if !self.client.reconnect().await {
                return PollOutcome::Unavailable;
            }
            // A restarted store has lost the status
            self.announce().await;
        }

        let command = match self.client.try_read(RECORDING_COMMAND).await {
            Ok(value) => value,
            Err(e) => {
                warn!("Could not read {}: {}", RECORDING_COMMAND, e);
                return PollOutcome::Unavailable;
            }
        };
        debug!("{} = {:?}, local state {:?}", RECORDING_COMMAND, command, self.state);

        let value = match command {
            None | Some(Data::Null) => return PollOutcome::Idle,
            Some(value) => value,
        };
        let Some(wanted) = value.as_bool() else {
            warn!("Ignoring non-boolean {}: {}", RECORDING_COMMAND, value);
            return PollOutcome::Ignored(value);
        };

        let outcome = match (wanted, self.state) {
            (true, RecordingState::Off) => {
                let store_path = self
                    .client
                    .read(STORE_PATH)
                    .await
                    .and_then(|p| p.as_str().map(str::to_string));
                if let Err(e) = self.recorder.start(store_path).await {
                    error!("Failed to start recording: {}", e);
                    return PollOutcome::Failed;
                }
                self.state = RecordingState::On;
                PollOutcome::Started
            }
            (false, RecordingState::On) => {
                if let Err(e) = self.recorder.stop().await {
                    error!("Failed to stop recording: {}", e);
                    return PollOutcome::Failed;
                }
                self.state = RecordingState::Off;
                PollOutcome::Stopped
            }
            _ => return PollOutcome::Unchanged,
        };

        info!("Recording {:?} by remote command", self.state);
        self.client.write(RECORDING, self.state.status()).await;
        if !self.client.consume(RECORDING_COMMAND, &value).await {
            debug!("{} changed before it could be cleared", RECORDING_COMMAND);
        }
        outcome
    }

    /// Poll forever at `interval`
    pub async fn run(&mut self, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.poll_once().await;
        }
    }

    /// Poll at `interval` until `shutdown` turns true, then stop any
    /// recording in progress and release the connection
    pub async fn run_until(&mut self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.poll_once().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        if self.state == RecordingState::On {
            if let Err(e) = self.recorder.stop().await {
                error!("Failed to stop recording on shutdown: {}", e);
            }
            self.state = RecordingState::Off;
            self.client.write(RECORDING, self.state.status()).await;
        }
        self.client.close();
        info!("Polling bridge stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ClientConfig, Endpoint};
    use crate::recorder::RecorderError;
    use crate::server::Server;
    use crate::store::SharedStore;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct FakeRecorder {
        calls: Arc<Mutex<Vec<String>>>,
        fail_start: bool,
    }

    #[async_trait]
    impl Recorder for FakeRecorder {
        async fn start(&mut self, store_path: Option<String>) -> Result<(), RecorderError> {
            if self.fail_start {
                return Err(RecorderError::Other("device busy".to_string()));
            }
            let path = store_path.unwrap_or_else(|| "-".to_string());
            self.calls.lock().unwrap().push(format!("start {}", path));
            Ok(())
        }

        async fn stop(&mut self) -> Result<(), RecorderError> {
            self.calls.lock().unwrap().push("stop".to_string());
            Ok(())
        }
    }

    async fn setup(recorder: FakeRecorder) -> (PollingBridge<FakeRecorder>, Arc<SharedStore>) {
        let server = Arc::new(Server::bind("127.0.0.1:0", b"bridge").await.unwrap());
        let store = server.store();
        let endpoint = Endpoint {
            host: "127.0.0.1".to_string(),
            port: server.local_addr().port(),
            authkey: Some("bridge".to_string()),
        };
        tokio::spawn(server.run());

        let client = StoreClient::connect(&endpoint, &ClientConfig::default()).await;
        (PollingBridge::new(client, recorder), store)
    }

    #[tokio::test]
    async fn test_start_then_stop_cycle() {
        let recorder = FakeRecorder::default();
        let calls = Arc::clone(&recorder.calls);
        let (mut bridge, store) = setup(recorder).await;

        bridge.announce().await;
        assert_eq!(store.get(RECORDING), Some(Data::Int(0)));

        store.update(STORE_PATH, Data::from("/data/mouse_00/"));
        store.update(RECORDING_COMMAND, Data::Bool(true));
        assert_eq!(bridge.poll_once().await, PollOutcome::Started);
        assert_eq!(bridge.state(), RecordingState::On);
        assert_eq!(store.get(RECORDING_COMMAND), None);
        assert_eq!(store.get(RECORDING), Some(Data::Int(1)));

        store.update(RECORDING_COMMAND, Data::Bool(false));
        assert_eq!(bridge.poll_once().await, PollOutcome::Stopped);
        assert_eq!(bridge.state(), RecordingState::Off);
        assert_eq!(store.get(RECORDING_COMMAND), None);
        assert_eq!(store.get(RECORDING), Some(Data::Int(0)));

        assert_eq!(
            *calls.lock().unwrap(),
            vec!["start /data/mouse_00/".to_string(), "stop".to_string()]
        );
    }

    #[tokio::test]
    async fn test_sentinel_is_idle() {
        let (mut bridge, store) = setup(FakeRecorder::default()).await;

        assert_eq!(bridge.poll_once().await, PollOutcome::Idle);
        store.update(RECORDING_COMMAND, Data::Null);
        assert_eq!(bridge.poll_once().await, PollOutcome::Idle);
        assert_eq!(bridge.state(), RecordingState::Off);
    }

    #[tokio::test]
    async fn test_matching_command_is_left_in_place() {
        let (mut bridge, store) = setup(FakeRecorder::default()).await;

        store.update(RECORDING_COMMAND, Data::Bool(false));
        assert_eq!(bridge.poll_once().await, PollOutcome::Unchanged);
        assert_eq!(store.get(RECORDING_COMMAND), Some(Data::Bool(false)));
    }

    #[tokio::test]
    async fn test_non_boolean_command_is_ignored() {
        let (mut bridge, store) = setup(FakeRecorder::default()).await;

        store.update(RECORDING_COMMAND, Data::from("yes"));
        assert_eq!(
            bridge.poll_once().await,
            PollOutcome::Ignored(Data::from("yes"))
        );
        assert_eq!(bridge.state(), RecordingState::Off);
    }

    #[tokio::test]
    async fn test_failed_start_keeps_command_pending() {
        let recorder = FakeRecorder {
            fail_start: true,
            ..FakeRecorder::default()
        };
        let (mut bridge, store) = setup(recorder).await;

        store.update(RECORDING_COMMAND, Data::Bool(true));
        assert_eq!(bridge.poll_once().await, PollOutcome::Failed);
        assert_eq!(bridge.state(), RecordingState::Off);
        assert_eq!(store.get(RECORDING_COMMAND), Some(Data::Bool(true)));
    }

    #[tokio::test]
    async fn test_unreachable_store_keeps_local_state() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let endpoint = Endpoint {
            host: "127.0.0.1".to_string(),
            port,
            authkey: Some("bridge".to_string()),
        };
        let client = StoreClient::connect(&endpoint, &ClientConfig::default()).await;
        let mut bridge = PollingBridge::new(client, FakeRecorder::default());

        for _ in 0..3 {
            assert_eq!(bridge.poll_once().await, PollOutcome::Unavailable);
        }
        assert_eq!(bridge.state(), RecordingState::Off);
    }

    #[tokio::test]
    async fn test_reconnect_republishes_status() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let endpoint = Endpoint {
            host: "127.0.0.1".to_string(),
            port,
            authkey: Some("bridge".to_string()),
        };
        let client = StoreClient::connect(&endpoint, &ClientConfig::default()).await;
        let mut bridge = PollingBridge::new(client, FakeRecorder::default());
        bridge.state = RecordingState::On;
        assert_eq!(bridge.poll_once().await, PollOutcome::Unavailable);

        let server = Arc::new(Server::bind(&endpoint.addr(), b"bridge").await.unwrap());
        let store = server.store();
        tokio::spawn(server.run());

        assert_eq!(bridge.poll_once().await, PollOutcome::Idle);
        assert_eq!(store.get(RECORDING), Some(Data::Int(1)));
    }

    #[tokio::test]
    async fn test_run_until_stops_active_recording() {
        let recorder = FakeRecorder::default();
        let calls = Arc::clone(&recorder.calls);
        let (mut bridge, store) = setup(recorder).await;
        let (tx, rx) = watch::channel(false);

        store.update(RECORDING_COMMAND, Data::Bool(true));
        let handle = tokio::spawn(async move {
            bridge.run_until(Duration::from_millis(20), rx).await;
            bridge
        });

        for _ in 0..100 {
            if store.get(RECORDING) == Some(Data::Int(1)) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(store.get(RECORDING), Some(Data::Int(1)));

        tx.send(true).unwrap();
        let bridge = handle.await.unwrap();
        assert_eq!(bridge.state(), RecordingState::Off);
        assert_eq!(store.get(RECORDING), Some(Data::Int(0)));
        assert_eq!(calls.lock().unwrap().last().map(String::as_str), Some("stop"));
    }
}
