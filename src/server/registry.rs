//! Connection registry for broadcast.
//!
//! Tracks the outbound queue of every live peer connection. Socket
//! writes happen on each connection's own writer task; the registry only
//! enqueues, so a peer that stops reading backs up its own queue and
//! never stalls the host or the other peers. Membership is self-healing:
//! a closed queue (the writer task exited on a failed write) drops
//! exactly that connection and delivery to the rest proceeds - there is
//! no heartbeat.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::warn;

/// Identifier for one registered peer connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// The raw id value.
    pub fn to_u64(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Registry of connected peers, keyed by [`ConnectionId`].
///
/// Holds the sending half of each connection's outbound line queue; the
/// receiving half is drained by that connection's writer task. Enqueueing
/// never blocks, so `broadcast` can run inside the host's critical
/// section without ever waiting on a peer's socket.
#[derive(Debug)]
pub struct ConnectionRegistry {
    connections: HashMap<ConnectionId, mpsc::UnboundedSender<String>>,
    next_id: u64,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            connections: HashMap::new(),
            next_id: 0,
        }
    }

    /// Register a newly accepted connection's outbound queue and assign
    /// it an id.
    pub fn add(&mut self, outbound: mpsc::UnboundedSender<String>) -> ConnectionId {
        let id = ConnectionId(self.next_id);
        self.next_id += 1;
        self.connections.insert(id, outbound);
        id
    }

    /// Remove a connection. Removing an absent id is a no-op.
    pub fn remove(&mut self, id: ConnectionId) -> bool {
        self.connections.remove(&id).is_some()
    }

    /// Drop every registered connection's queue, ending its writer task.
    pub fn clear(&mut self) {
        self.connections.clear();
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether no connections are registered.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Enqueue `line` for one registered connection.
    ///
    /// On a closed queue the connection is removed and `false` is
    /// returned.
    pub fn send_to(&mut self, id: ConnectionId, line: &str) -> bool {
        let Some(outbound) = self.connections.get(&id) else {
            return false;
        };
        if outbound.send(line.to_string()).is_err() {
            warn!(%id, "outbound queue closed, dropping connection");
            self.connections.remove(&id);
            return false;
        }
        true
    }

    /// Enqueue `line` for every registered connection.
    ///
    /// A closed queue on one connection removes that connection and
    /// never prevents delivery to the others. Returns the number of
    /// peers the line was queued for.
    pub fn broadcast(&mut self, line: &str) -> usize {
        let mut failed = Vec::new();
        let mut delivered = 0;

        for (id, outbound) in &self.connections {
            if outbound.send(line.to_string()).is_ok() {
                delivered += 1;
            } else {
                warn!(id = %id, "outbound queue closed, dropping connection");
                failed.push(*id);
            }
        }
        for id in failed {
            self.connections.remove(&id);
        }
        delivered
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
