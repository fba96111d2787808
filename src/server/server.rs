//! The authoritative sync server.
//!
//! One host process owns the combatant table. Peers connect over TCP,
//! submit single-record updates, and receive the full table back after
//! every applied update. The server runs one accept loop plus, per
//! connection, one receive loop and one writer task; a misbehaving or
//! unresponsive peer only ever takes down its own connection.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, mpsc, watch};
use tracing::{debug, info, warn};

use super::registry::{ConnectionId, ConnectionRegistry};
use crate::core::{CombatantState, DEFAULT_PORT};
use crate::store::StateStore;
use crate::wire;

/// Errors that can occur in the sync server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind the listening socket (typically: port in use).
    /// Fatal to starting the host role; never retried.
    #[error("bind failed on {addr}: {source}")]
    Bind {
        /// The address that could not be bound.
        addr: SocketAddr,
        /// The underlying socket error.
        source: std::io::Error,
    },

    /// I/O error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
}

impl ServerConfig {
    /// Configuration binding all interfaces on the given port.
    pub fn with_port(port: u16) -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::with_port(DEFAULT_PORT)
    }
}

/// Store and registry guarded as one unit.
///
/// Every upsert-then-broadcast runs under a single lock on this pair, so
/// no broadcast can ever observe a partially applied update. Only
/// enqueues happen under the lock; the socket writes run on each
/// connection's own writer task, so a peer that stops reading backs up
/// its own queue and never holds the lock hostage.
#[derive(Debug)]
struct Shared {
    store: StateStore,
    registry: ConnectionRegistry,
}

/// The authoritative host for one combat session.
///
/// Owns the [`StateStore`] and [`ConnectionRegistry`] by composition;
/// construct one and pass the handle to whatever component starts it -
/// there is no ambient global.
///
/// # Example
///
/// ```ignore
/// use encounter_sync::server::{ServerConfig, SyncServer};
///
/// let server = SyncServer::start(ServerConfig::default()).await?;
/// println!("hosting on {}", server.local_addr());
/// // ... session runs ...
/// server.stop().await;
/// ```
pub struct SyncServer {
    shared: Arc<Mutex<Shared>>,
    shutdown: watch::Sender<bool>,
    local_addr: SocketAddr,
}

impl SyncServer {
    /// Bind the listening socket and start accepting peers.
    ///
    /// Returns as soon as the socket is bound; accepting and serving run
    /// on background tasks. A bind failure (port already in use) is
    /// fatal and reported, not retried.
    pub async fn start(config: ServerConfig) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(config.bind_addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: config.bind_addr,
                source,
            })?;
        let local_addr = listener.local_addr()?;

        let shared = Arc::new(Mutex::new(Shared {
            store: StateStore::new(),
            registry: ConnectionRegistry::new(),
        }));
        let (shutdown, shutdown_rx) = watch::channel(false);

        tokio::spawn(accept_loop(listener, shared.clone(), shutdown_rx));
        info!(addr = %local_addr, "sync server listening");

        Ok(Self {
            shared,
            shutdown,
            local_addr,
        })
    }

    /// The address the listening socket is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Number of currently connected peers.
    pub async fn peer_count(&self) -> usize {
        self.shared.lock().await.registry.len()
    }

    /// The current combatant table in stable order.
    pub async fn snapshot(&self) -> Vec<CombatantState> {
        self.shared.lock().await.store.snapshot()
    }

    /// Apply a host-local update.
    ///
    /// The host's own UI mutations take the same upsert-then-broadcast
    /// path as updates arriving over the wire.
    pub async fn apply_update(&self, record: CombatantState) {
        apply_and_broadcast(&self.shared, record).await;
    }

    /// Whether the server is still listening.
    pub fn is_running(&self) -> bool {
        !*self.shutdown.borrow()
    }

    /// Stop listening, close every peer connection and clear the
    /// registry. Idempotent: stopping a stopped server is a no-op.
    pub async fn stop(&self) {
        let _ = self.shutdown.send(true);
        self.shared.lock().await.registry.clear();
    }
}

impl Drop for SyncServer {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

/// Accept peers until shutdown. Dropping the listener on exit closes the
/// listening socket.
async fn accept_loop(
    listener: TcpListener,
    shared: Arc<Mutex<Shared>>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer_addr)) => {
                    register_peer(stream, peer_addr, &shared, &shutdown).await;
                }
                Err(e) => warn!(error = %e, "accept failed"),
            },
        }
    }
    debug!("accept loop stopped");
}

/// Register an accepted connection, push it the current snapshot as its
/// very first message, and spawn its receive loop.
async fn register_peer(
    stream: TcpStream,
    peer_addr: SocketAddr,
    shared: &Arc<Mutex<Shared>>,
    shutdown: &watch::Receiver<bool>,
) {
    let (read_half, write_half) = stream.into_split();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

    // Register and enqueue the join snapshot inside one critical
    // section, so no concurrently applied update can slip in between;
    // the queue keeps per-connection FIFO order, so the join snapshot
    // stays the peer's first message.
    let id = {
        let mut guard = shared.lock().await;
        let Shared { store, registry } = &mut *guard;
        let id = registry.add(outbound_tx);
        match wire::encode_snapshot(&store.snapshot()) {
            Ok(line) => {
                registry.send_to(id, &line);
            }
            Err(e) => warn!(error = %e, "snapshot encode failed"),
        }
        id
    };
    info!(%id, %peer_addr, "peer connected");

    tokio::spawn(connection_writer(id, write_half, outbound_rx));
    tokio::spawn(receive_loop(id, read_half, shared.clone(), shutdown.clone()));
}

/// Per-connection writer task: drains the outbound queue onto the
/// socket.
///
/// This is the only place that ever blocks on a peer's socket, so an
/// unresponsive peer stalls nothing but its own queue. Ends on a failed
/// write or when the queue's sender is dropped (removal from the
/// registry or server stop); dropping the write half then closes the
/// connection.
async fn connection_writer(
    id: ConnectionId,
    mut write_half: OwnedWriteHalf,
    mut outbound_rx: mpsc::UnboundedReceiver<String>,
) {
    while let Some(line) = outbound_rx.recv().await {
        if let Err(e) = write_half.write_all(line.as_bytes()).await {
            warn!(%id, error = %e, "write failed");
            break;
        }
    }
    debug!(%id, "writer stopped");
}

/// Per-connection receive loop: one update per line.
///
/// Any read or decode failure ends the loop and removes only this
/// connection; the server and every other peer keep running.
async fn receive_loop(
    id: ConnectionId,
    read_half: OwnedReadHalf,
    shared: Arc<Mutex<Shared>>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut lines = BufReader::new(read_half).lines();
    loop {
        let line = tokio::select! {
            _ = shutdown.changed() => break,
            read = lines.next_line() => match read {
                Ok(Some(line)) => line,
                Ok(None) => {
                    debug!(%id, "peer closed connection");
                    break;
                }
                Err(e) => {
                    warn!(%id, error = %e, "read failed");
                    break;
                }
            },
        };

        match wire::decode_update(&line) {
            Ok(record) => apply_and_broadcast(&shared, record).await,
            Err(e) => {
                warn!(%id, error = %e, "malformed update, dropping peer");
                break;
            }
        }
    }
    shared.lock().await.registry.remove(id);
    debug!(%id, "receive loop stopped");
}

/// Upsert one record and rebroadcast the full snapshot, as a single
/// logically atomic step under the shared lock.
///
/// Broadcast here means enqueue: every peer's queue receives the
/// snapshot in application order before the lock is released, while the
/// socket writes happen on the per-connection writer tasks.
async fn apply_and_broadcast(shared: &Mutex<Shared>, record: CombatantState) {
    let mut guard = shared.lock().await;
    let Shared { store, registry } = &mut *guard;
    store.upsert(record);
    match wire::encode_snapshot(&store.snapshot()) {
        Ok(line) => {
            registry.broadcast(&line);
        }
        Err(e) => warn!(error = %e, "snapshot encode failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::io::AsyncWriteExt;
    use tokio::io::Lines;
    use tokio::time::{Duration, sleep, timeout};

    fn record(id: &str, hp: i32) -> CombatantState {
        CombatantState {
            id: id.to_string(),
            name: "Orc".to_string(),
            hp,
            max_hp: 15,
            armor_class: 13,
            initiative: 2,
        }
    }

    fn loopback_config() -> ServerConfig {
        ServerConfig {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
        }
    }

    /// A raw line-speaking peer, no SyncClient involved.
    struct RawPeer {
        lines: Lines<BufReader<OwnedReadHalf>>,
        writer: OwnedWriteHalf,
    }

    impl RawPeer {
        async fn connect(addr: SocketAddr) -> Self {
            let stream = TcpStream::connect(addr).await.unwrap();
            let (read_half, writer) = stream.into_split();
            Self {
                lines: BufReader::new(read_half).lines(),
                writer,
            }
        }

        async fn recv_snapshot(&mut self) -> Vec<CombatantState> {
            let line = timeout(Duration::from_secs(5), self.lines.next_line())
                .await
                .expect("timed out waiting for snapshot")
                .unwrap()
                .expect("connection closed");
            wire::decode_snapshot(&line).unwrap()
        }

        async fn send_line(&mut self, line: &str) {
            self.writer.write_all(line.as_bytes()).await.unwrap();
            self.writer.write_all(b"\n").await.unwrap();
        }

        async fn send_update(&mut self, update: &CombatantState) {
            let line = wire::encode_update(update).unwrap();
            self.writer.write_all(line.as_bytes()).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_bind_failure_is_fatal() {
        let first = SyncServer::start(loopback_config()).await.unwrap();
        let second = SyncServer::start(ServerConfig {
            bind_addr: first.local_addr(),
        })
        .await;

        assert!(matches!(second, Err(ServerError::Bind { .. })));
    }

    #[tokio::test]
    async fn test_new_peer_receives_empty_snapshot_first() {
        let server = SyncServer::start(loopback_config()).await.unwrap();
        let mut peer = RawPeer::connect(server.local_addr()).await;

        assert!(peer.recv_snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_late_joiner_sees_current_state() {
        let server = SyncServer::start(loopback_config()).await.unwrap();
        server.apply_update(record("a", 10)).await;
        server.apply_update(record("b", 20)).await;

        let mut peer = RawPeer::connect(server.local_addr()).await;
        let snap = peer.recv_snapshot().await;
        assert_eq!(snap, vec![record("a", 10), record("b", 20)]);
    }

    #[tokio::test]
    async fn test_update_is_applied_and_rebroadcast() {
        let server = SyncServer::start(loopback_config()).await.unwrap();
        let mut peer = RawPeer::connect(server.local_addr()).await;
        peer.recv_snapshot().await;

        peer.send_update(&record("e1", 15)).await;

        let snap = peer.recv_snapshot().await;
        assert_eq!(snap, vec![record("e1", 15)]);
        assert_eq!(server.snapshot().await, vec![record("e1", 15)]);
    }

    #[tokio::test]
    async fn test_concurrent_updates_are_not_lost() {
        let server = SyncServer::start(loopback_config()).await.unwrap();
        let mut peer_a = RawPeer::connect(server.local_addr()).await;
        let mut peer_b = RawPeer::connect(server.local_addr()).await;
        peer_a.recv_snapshot().await;
        peer_b.recv_snapshot().await;

        let update_a = record("A", 10);
        let update_b = record("B", 20);
        tokio::join!(
            peer_a.send_update(&update_a),
            peer_b.send_update(&update_b),
        );

        // Both records must land, whatever the application order.
        let mut snap = server.snapshot().await;
        for _ in 0..50 {
            if snap.len() == 2 {
                break;
            }
            sleep(Duration::from_millis(20)).await;
            snap = server.snapshot().await;
        }
        snap.sort_by(|x, y| x.id.cmp(&y.id));
        assert_eq!(snap, vec![record("A", 10), record("B", 20)]);
    }

    #[tokio::test]
    async fn test_malformed_update_drops_only_that_peer() {
        let server = SyncServer::start(loopback_config()).await.unwrap();
        let mut bad_peer = RawPeer::connect(server.local_addr()).await;
        let mut good_peer = RawPeer::connect(server.local_addr()).await;
        bad_peer.recv_snapshot().await;
        good_peer.recv_snapshot().await;

        bad_peer.send_line("this is not json").await;

        // The bad peer gets disconnected.
        let closed = timeout(Duration::from_secs(5), async {
            loop {
                match bad_peer.lines.next_line().await {
                    Ok(Some(_)) => continue,
                    Ok(None) | Err(_) => break,
                }
            }
        })
        .await;
        assert!(closed.is_ok());

        // Everyone else keeps syncing.
        good_peer.send_update(&record("e1", 15)).await;
        assert_eq!(good_peer.recv_snapshot().await, vec![record("e1", 15)]);
    }

    #[tokio::test]
    async fn test_unresponsive_peer_does_not_stall_host() {
        let server = SyncServer::start(loopback_config()).await.unwrap();

        // This peer takes its join snapshot and then never reads again,
        // so its socket buffers fill while updates keep flowing.
        let mut stalled = RawPeer::connect(server.local_addr()).await;
        stalled.recv_snapshot().await;

        let mut active = RawPeer::connect(server.local_addr()).await;
        active.recv_snapshot().await;

        let mut update = record("e1", 15);
        update.name = "x".repeat(1024);
        for _ in 0..100 {
            active.send_update(&update).await;
        }

        // The host must stay responsive: store reads, host-local
        // updates and new joins all go through the shared lock.
        let mut snap = timeout(Duration::from_secs(2), server.snapshot())
            .await
            .expect("host stalled behind a non-reading peer");
        for _ in 0..50 {
            if !snap.is_empty() {
                break;
            }
            sleep(Duration::from_millis(20)).await;
            snap = timeout(Duration::from_secs(2), server.snapshot())
                .await
                .expect("host stalled behind a non-reading peer");
        }
        assert_eq!(snap.len(), 1);

        server.apply_update(record("e2", 20)).await;
        let mut late = RawPeer::connect(server.local_addr()).await;
        assert_eq!(late.recv_snapshot().await.len(), 2);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_and_closes_peers() {
        let server = SyncServer::start(loopback_config()).await.unwrap();
        let mut peer = RawPeer::connect(server.local_addr()).await;
        peer.recv_snapshot().await;
        assert!(server.is_running());

        server.stop().await;
        server.stop().await;
        assert!(!server.is_running());
        assert_eq!(server.peer_count().await, 0);

        // The peer's read unblocks with EOF once its connection closes.
        let eof = timeout(Duration::from_secs(5), peer.lines.next_line()).await;
        assert!(matches!(eof, Ok(Ok(None)) | Ok(Err(_))));
    }
}
