//! Resilient store client.
//!
//! The store is a coordination side-channel: if it is down, misconfigured or
//! misbehaving, callers should carry on with their own work. Every public
//! operation therefore reports failure through its return value (`None` or
//! `false`) and a log line, never through an error or a panic.
//!
//! A transport failure releases the connection; [`StoreClient::reconnect`]
//! establishes a fresh session.

use std::future::Future;
use std::time::Duration;

use tokio::net::TcpStream;
use tracing::{debug, error, info, warn};

use crate::config::{ClientConfig, Endpoint};
use crate::encoding::{Data, EncodingError};
use crate::protocol::clearif::ClearIfCmd;
use crate::protocol::del::DelCmd;
use crate::protocol::get::GetCmd;
use crate::protocol::set::SetCmd;
use crate::protocol::{auth, AuthError, Connection, ConnectionError, Value};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("cannot reach store at {addr}: {reason}")]
    Connection { addr: String, reason: String },

    #[error("no connection to the store")]
    NotConnected,

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("serialization failure: {0}")]
    Serialization(#[from] EncodingError),

    #[error("transport failure: {0}")]
    Transport(#[from] ConnectionError),

    #[error("server replied with error: {0}")]
    Server(String),

    #[error("unexpected reply: {0:?}")]
    Protocol(Value),
}

/// Client handle on the shared store
pub struct StoreClient {
    endpoint: Endpoint,
    settings: ClientConfig,
    conn: Option<Connection>,
}

impl StoreClient {
    /// Connect and authenticate. Never fails: on any error the client is
    /// returned without a connection and every operation degrades.
    pub async fn connect(endpoint: &Endpoint, settings: &ClientConfig) -> Self {
        let mut client = Self {
            endpoint: endpoint.clone(),
            settings: settings.clone(),
            conn: None,
        };
        client.reconnect().await;
        client
    }

    /// Drop any current connection and run the full connect sequence again.
    /// Returns whether a session is now established.
    pub async fn reconnect(&mut self) -> bool {
        self.conn = None;
        match self.open().await {
            Ok(conn) => {
                info!("Connected to store at {}", self.endpoint.addr());
                self.conn = Some(conn);
                true
            }
            Err(e) => {
                error!("Could not connect to the store: {}", e);
                false
            }
        }
    }

    async fn open(&self) -> Result<Connection, ClientError> {
        let addr = self.endpoint.addr();
        let failed = |reason: String| ClientError::Connection {
            addr: addr.clone(),
            reason,
        };

        let authkey = self.endpoint.authkey().map_err(|e| failed(e.to_string()))?;

        let handshake = async {
            let stream = TcpStream::connect(addr.as_str())
                .await
                .map_err(ConnectionError::from)
                .map_err(AuthError::from)?;
            let mut conn = Connection::new(stream);
            auth::login(&mut conn, authkey).await?;
            Ok::<_, AuthError>(conn)
        };

        match tokio::time::timeout(self.settings.connect_timeout, handshake).await {
            Ok(Ok(conn)) => Ok(conn),
            Ok(Err(AuthError::Rejected)) => Err(failed("authentication rejected".to_string())),
            Ok(Err(e)) => Err(failed(e.to_string())),
            Err(_) => Err(failed(format!(
                "timed out after {:?}",
                self.settings.connect_timeout
            ))),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// Release the connection. Safe to call any number of times.
    pub fn close(&mut self) {
        if self.conn.take().is_some() {
            info!("Closed connection to store at {}", self.endpoint.addr());
        }
    }

    async fn call(&mut self, request: Value) -> Result<Value, ClientError> {
        let timeout = self.settings.request_timeout;
        let conn = self.conn.as_mut().ok_or(ClientError::NotConnected)?;

        let outcome = bounded(timeout, conn.request(&request)).await;
        match outcome {
            Ok(Value::Error(msg)) => Err(ClientError::Server(msg)),
            Ok(reply) => Ok(reply),
            Err(e) => {
                // The stream may hold half a frame now; it cannot be reused
                warn!("Dropping store connection: {}", e);
                self.conn = None;
                Err(e)
            }
        }
    }

    async fn call_flag(&mut self, request: Value) -> Result<bool, ClientError> {
        match self.call(request).await? {
            Value::Integer(n) => Ok(n != 0),
            other => Err(ClientError::Protocol(other)),
        }
    }

    /// Read `key`, distinguishing failures from absence
    pub async fn try_read(&mut self, key: &str) -> Result<Option<Data>, ClientError> {
        match self.call(GetCmd::new(key).to_resp()).await? {
            Value::BulkString(Some(bytes)) => Ok(Some(Data::decode(&bytes)?)),
            Value::BulkString(None) => Ok(None),
            other => Err(ClientError::Protocol(other)),
        }
    }

    /// Store `value` under `key`. `Ok(false)` means a quota refused it.
    pub async fn try_write(&mut self, key: &str, value: Data) -> Result<bool, ClientError> {
        let request = SetCmd::new(key, value).to_resp()?;
        self.call_flag(request).await
    }

    /// Value of `key`, or `None` if absent or unavailable
    pub async fn read(&mut self, key: &str) -> Option<Data> {
        if !self.is_connected() {
            debug!("Store unavailable, cannot read '{}'", key);
            return None;
        }
        match self.try_read(key).await {
            Ok(value) => value,
            Err(e) => {
                error!("Error reading '{}': {}", key, e);
                None
            }
        }
    }

    /// Store `value` under `key`; returns whether the store accepted it
    pub async fn write(&mut self, key: &str, value: impl Into<Data>) -> bool {
        if !self.is_connected() {
            debug!("Store unavailable, cannot write '{}'", key);
            return false;
        }
        match self.try_write(key, value.into()).await {
            Ok(true) => {
                debug!("Wrote '{}' to the store", key);
                true
            }
            Ok(false) => {
                warn!("Store rejected write of '{}' (quota exceeded)", key);
                false
            }
            Err(e) => {
                error!("Error writing '{}': {}", key, e);
                false
            }
        }
    }

    /// Remove `key`; returns whether it existed
    pub async fn delete(&mut self, key: &str) -> bool {
        if !self.is_connected() {
            debug!("Store unavailable, cannot delete '{}'", key);
            return false;
        }
        match self.call_flag(DelCmd::new(key).to_resp()).await {
            Ok(existed) => existed,
            Err(e) => {
                error!("Error deleting '{}': {}", key, e);
                false
            }
        }
    }

    /// Clear `key` only if it still holds `expected`. Returns whether it
    /// was cleared.
    pub async fn consume(&mut self, key: &str, expected: &Data) -> bool {
        if !self.is_connected() {
            debug!("Store unavailable, cannot consume '{}'", key);
            return false;
        }
        let request = match ClearIfCmd::new(key, expected.clone()).to_resp() {
            Ok(request) => request,
            Err(e) => {
                error!("Error consuming '{}': {}", key, e);
                return false;
            }
        };
        match self.call_flag(request).await {
            Ok(cleared) => cleared,
            Err(e) => {
                error!("Error consuming '{}': {}", key, e);
                false
            }
        }
    }
}

async fn bounded<T>(
    timeout: Duration,
    fut: impl Future<Output = Result<T, ConnectionError>>,
) -> Result<T, ClientError> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(ClientError::Timeout(timeout)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::Server;
    use std::sync::Arc;

    fn endpoint_for(port: u16, authkey: &str) -> Endpoint {
        Endpoint {
            host: "127.0.0.1".to_string(),
            port,
            authkey: Some(authkey.to_string()),
        }
    }

    async fn start_server(authkey: &str) -> u16 {
        let server = Arc::new(Server::bind("127.0.0.1:0", authkey.as_bytes()).await.unwrap());
        let port = server.local_addr().port();
        tokio::spawn(server.run());
        port
    }

    /// A port nothing is listening on
    async fn dead_port() -> u16 {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn test_read_write_delete() {
        let port = start_server("k").await;
        let mut client = StoreClient::connect(&endpoint_for(port, "k"), &ClientConfig::default()).await;
        assert!(client.is_connected());

        assert!(client.write("storePath", "/data/run1/").await);
        assert_eq!(client.read("storePath").await, Some(Data::from("/data/run1/")));
        assert_eq!(client.read("missing").await, None);

        assert!(client.delete("storePath").await);
        assert_eq!(client.read("storePath").await, None);
        assert!(!client.delete("storePath").await);
    }

    #[tokio::test]
    async fn test_write_reports_quota_rejection() {
        let port = start_server("k").await;
        let settings = ClientConfig {
            request_timeout: Duration::from_secs(60),
            ..ClientConfig::default()
        };
        let mut client = StoreClient::connect(&endpoint_for(port, "k"), &settings).await;

        let big = "x".repeat(25 * 1024 * 1024);
        assert!(!client.write("big", big).await);
        // The connection survives a rejected write
        assert!(client.is_connected());
        assert!(client.write("small", 1).await);
    }

    #[tokio::test]
    async fn test_consume_only_clears_expected_value() {
        let port = start_server("k").await;
        let mut client = StoreClient::connect(&endpoint_for(port, "k"), &ClientConfig::default()).await;

        client.write("recording_command", true).await;
        assert!(!client.consume("recording_command", &Data::Bool(false)).await);
        assert_eq!(client.read("recording_command").await, Some(Data::Bool(true)));
        assert!(client.consume("recording_command", &Data::Bool(true)).await);
        assert_eq!(client.read("recording_command").await, None);
    }

    #[tokio::test]
    async fn test_unreachable_server_degrades() {
        let port = dead_port().await;
        let mut client = StoreClient::connect(&endpoint_for(port, "k"), &ClientConfig::default()).await;
        assert!(!client.is_connected());

        for i in 0..100 {
            assert_eq!(client.read("recording_command").await, None);
            assert!(!client.write("recording", i).await);
            assert!(!client.delete("storePath").await);
            assert!(!client.consume("recording_command", &Data::Null).await);
        }
        client.close();
        client.close();
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_wrong_authkey_leaves_client_disconnected() {
        let port = start_server("right").await;
        let mut client = StoreClient::connect(&endpoint_for(port, "wrong"), &ClientConfig::default()).await;
        assert!(!client.is_connected());
        assert_eq!(client.read("anything").await, None);
    }

    #[tokio::test]
    async fn test_missing_authkey_leaves_client_disconnected() {
        let port = start_server("k").await;
        let endpoint = Endpoint {
            authkey: None,
            ..endpoint_for(port, "")
        };
        let client = StoreClient::connect(&endpoint, &ClientConfig::default()).await;
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_connect_times_out_on_silent_peer() {
        // Accepts TCP but never sends a challenge
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let _holder = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });

        let settings = ClientConfig {
            connect_timeout: Duration::from_millis(200),
            ..ClientConfig::default()
        };
        let started = std::time::Instant::now();
        let client = StoreClient::connect(&endpoint_for(port, "k"), &settings).await;
        assert!(!client.is_connected());
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_reconnect_recovers() {
        let port = start_server("k").await;
        let mut client = StoreClient::connect(&endpoint_for(port, "k"), &ClientConfig::default()).await;
        client.close();
        client.close();
        assert_eq!(client.read("k").await, None);

        assert!(client.reconnect().await);
        assert!(client.write("k", "v").await);
        assert_eq!(client.read("k").await, Some(Data::from("v")));
    }
}
