use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::config::{ConfigError, Endpoint};
use crate::protocol::{auth, Command, Connection, ConnectionError, Value};
use crate::store::SharedStore;

/// How long a new peer has to complete the handshake
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// An authenticated connection. Every session holds a handle on the same
/// store; dropping the session leaves nothing behind.
struct Session {
    peer_addr: SocketAddr,
    store: Arc<SharedStore>,
    commands: u64,
}

impl Session {
    fn handle(&mut self, frame: Value) -> Value {
        self.commands += 1;
        match Command::from_resp(frame) {
            Some(cmd) => {
                debug!("{} from {}", cmd.name(), self.peer_addr);
                cmd.apply(&self.store)
            }
            None => Value::error("ERR failed to parse command"),
        }
    }
}

/// TCP server exposing one shared store to every authenticated client
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    store: Arc<SharedStore>,
    authkey: Arc<[u8]>,
}

impl Server {
    /// Create and bind TCP server to specified address
    pub async fn bind(addr: &str, authkey: &[u8]) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        let local_addr = listener.local_addr().map_err(|source| ServerError::Bind {
            addr: addr.to_string(),
            source,
        })?;
        info!("TCP server bound to {}", local_addr);

        Ok(Self {
            listener,
            local_addr,
            store: Arc::new(SharedStore::new()),
            authkey: Arc::from(authkey),
        })
    }

    /// Bind using the configured endpoint; fails if no authkey is set
    pub async fn bind_endpoint(endpoint: &Endpoint) -> Result<Self, ServerError> {
        let authkey = endpoint.authkey()?;
        Self::bind(&endpoint.addr(), authkey).await
    }

    /// Get local listening address
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The single store instance every session operates on
    pub fn store(&self) -> Arc<SharedStore> {
        Arc::clone(&self.store)
    }

    /// Handle a single client connection
    async fn handle_connection(
        self: Arc<Self>,
        stream: TcpStream,
        peer_addr: SocketAddr,
    ) -> Result<(), ConnectionError> {
        let mut conn = Connection::new(stream);

        match tokio::time::timeout(HANDSHAKE_TIMEOUT, auth::accept(&mut conn, &self.authkey)).await
        {
            Ok(Ok(())) => info!("Session authenticated for {}", peer_addr),
            Ok(Err(e)) => {
                warn!("Rejected connection from {}: {}", peer_addr, e);
                conn.shutdown().await;
                return Ok(());
            }
            Err(_) => {
                warn!("Handshake with {} timed out", peer_addr);
                conn.shutdown().await;
                return Ok(());
            }
        }

        let mut session = Session {
            peer_addr,
            store: self.store(),
            commands: 0,
        };

        loop {
            let frame = match conn.read_frame().await {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    info!("Connection closed by client: {}", peer_addr);
                    break;
                }
                Err(ConnectionError::Frame(e)) => {
                    warn!("Malformed frame from {}: {}", peer_addr, e);
                    conn.write_frame(&Value::error(format!("ERR protocol error: {}", e)))
                        .await?;
                    break;
                }
                Err(e) => return Err(e),
            };

            let reply = session.handle(frame);
            conn.write_frame(&reply).await?;
        }

        info!(
            "Session for {} ended after {} commands",
            peer_addr, session.commands
        );
        Ok(())
    }

    /// Start server, accept and process connections.
    ///
    /// Runs for the life of the process; there is no shutdown handshake.
    pub async fn run(self: Arc<Self>) {
        info!("Server started, listening on {}", self.local_addr);

        loop {
            match self.listener.accept().await {
                Ok((stream, peer_addr)) => {
                    debug!("New connection accepted from {}", peer_addr);

                    let server = Arc::clone(&self);

                    // Spawn an independent task for each connection
                    tokio::spawn(async move {
                        if let Err(e) = server.handle_connection(stream, peer_addr).await {
                            error!("Error handling connection from {}: {}", peer_addr, e);
                        }
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    }
}
