//! One peer's network leg.
//!
//! A [`SyncClient`] connects to a host, sends single-record updates and
//! receives full-table snapshots. Snapshots arrive on a channel rather
//! than a callback so the receive loop never mutates UI state directly;
//! each message replaces the consumer's whole view, never merges into it.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex, mpsc, watch};
use tracing::{debug, info, warn};

use crate::core::{CombatantState, DEFAULT_PORT, SNAPSHOT_CHANNEL_CAPACITY};
use crate::wire;

/// Errors that can occur in the sync client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Failed to connect to the host. Not retried automatically.
    #[error("connection failed to {addr}: {source}")]
    Connect {
        /// The host address that could not be reached.
        addr: SocketAddr,
        /// The underlying socket error.
        source: std::io::Error,
    },

    /// I/O error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Host address to connect to.
    pub server_addr: SocketAddr,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT)),
        }
    }
}

/// Receiving half for host snapshots.
///
/// Each received list is the full combatant table; consumers replace
/// their local view wholesale.
pub struct SnapshotReceiver {
    rx: mpsc::Receiver<Vec<CombatantState>>,
}

impl SnapshotReceiver {
    /// Receive the next snapshot from the host.
    ///
    /// Returns `None` once the connection is gone.
    pub async fn recv(&mut self) -> Option<Vec<CombatantState>> {
        self.rx.recv().await
    }
}

/// A peer connection to a hosted combat session.
///
/// One value represents one connection: [`SyncClient::connect`] is the
/// only way to obtain a client, so connecting twice over the same
/// connection cannot be expressed. To reconnect after a drop, connect a
/// fresh client and take the fresh join snapshot it is sent.
///
/// # Example
///
/// ```ignore
/// use encounter_sync::client::{ClientConfig, SyncClient};
///
/// let (client, mut snapshots) = SyncClient::connect(ClientConfig::default()).await?;
/// client.send_update(&my_combatant).await;
/// while let Some(table) = snapshots.recv().await {
///     // replace the UI's combatant list with `table`
/// }
/// ```
pub struct SyncClient {
    /// Write half; `None` once the connection is gone.
    writer: Arc<Mutex<Option<OwnedWriteHalf>>>,
    connected: Arc<AtomicBool>,
    shutdown: watch::Sender<bool>,
    server_addr: SocketAddr,
}

impl SyncClient {
    /// Connect to a host.
    ///
    /// Returns the client handle and the snapshot channel; the first
    /// message on the channel is the join snapshot the host pushes on
    /// accept. Connection failure is reported here and never retried.
    pub async fn connect(config: ClientConfig) -> Result<(Self, SnapshotReceiver), ClientError> {
        let stream = TcpStream::connect(config.server_addr)
            .await
            .map_err(|source| ClientError::Connect {
                addr: config.server_addr,
                source,
            })?;
        let (read_half, write_half) = stream.into_split();

        let (snapshot_tx, snapshot_rx) = mpsc::channel(SNAPSHOT_CHANNEL_CAPACITY);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let writer = Arc::new(Mutex::new(Some(write_half)));
        let connected = Arc::new(AtomicBool::new(true));

        tokio::spawn(receive_loop(
            read_half,
            snapshot_tx,
            writer.clone(),
            connected.clone(),
            shutdown_rx,
        ));
        info!(addr = %config.server_addr, "connected to host");

        Ok((
            Self {
                writer,
                connected,
                shutdown,
                server_addr: config.server_addr,
            },
            SnapshotReceiver { rx: snapshot_rx },
        ))
    }

    /// Send one combatant update to the host.
    ///
    /// Fire-and-forget: with no live connection this is a silent no-op,
    /// and a failed write only marks the client disconnected. There is
    /// no queueing and no delivery guarantee; callers needing more can
    /// check [`SyncClient::is_connected`].
    pub async fn send_update(&self, record: &CombatantState) {
        let mut guard = self.writer.lock().await;
        let Some(writer) = guard.as_mut() else {
            debug!("send_update with no connection, ignoring");
            return;
        };
        let line = match wire::encode_update(record) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "update encode failed");
                return;
            }
        };
        if let Err(e) = writer.write_all(line.as_bytes()).await {
            warn!(error = %e, "send failed, marking disconnected");
            *guard = None;
            self.connected.store(false, Ordering::SeqCst);
        }
    }

    /// Whether the connection to the host is still up.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// The host address this client was connected to.
    pub fn server_addr(&self) -> SocketAddr {
        self.server_addr
    }

    /// Tear the connection down.
    pub async fn disconnect(self) {
        let _ = self.shutdown.send(true);
        *self.writer.lock().await = None;
        self.connected.store(false, Ordering::SeqCst);
    }
}

impl Drop for SyncClient {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

/// Receive loop: one snapshot per line, pushed into the channel.
///
/// Ends on disconnect, malformed input, teardown, or the consumer
/// dropping its [`SnapshotReceiver`]; in every case the client is left
/// marked disconnected and the write half is released.
async fn receive_loop(
    read_half: OwnedReadHalf,
    snapshot_tx: mpsc::Sender<Vec<CombatantState>>,
    writer: Arc<Mutex<Option<OwnedWriteHalf>>>,
    connected: Arc<AtomicBool>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut lines = BufReader::new(read_half).lines();
    loop {
        let line = tokio::select! {
            _ = shutdown.changed() => break,
            read = lines.next_line() => match read {
                Ok(Some(line)) => line,
                Ok(None) => {
                    debug!("host closed connection");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "read from host failed");
                    break;
                }
            },
        };

        match wire::decode_snapshot(&line) {
            Ok(snapshot) => {
                if snapshot_tx.send(snapshot).await.is_err() {
                    debug!("snapshot receiver dropped, stopping");
                    break;
                }
            }
            Err(e) => {
                warn!(error = %e, "malformed snapshot, disconnecting");
                break;
            }
        }
    }
    connected.store(false, Ordering::SeqCst);
    *writer.lock().await = None;
    debug!("client receive loop stopped");
}
