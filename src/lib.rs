//! # Encounter Sync
//!
//! Authoritative combat-state synchronization over TCP for tabletop
//! companion apps.
//!
//! One **host** process owns the canonical combatant table for a combat
//! session. Any number of **peers** connect to it, submit single-record
//! updates, and receive the full table back as a snapshot after every
//! applied update. Reconciliation is deliberately simple: upsert by
//! combatant id, whole-record replace, last write applied by the host
//! wins. There are no diffs, no sequence numbers, no authentication -
//! just one well-known shape of JSON per line over a plain TCP stream.
//!
//! ## Modules
//!
//! - [`core`]: the combatant record, constants, and the top-level error
//! - [`store`]: the host's in-memory combatant table
//! - [`wire`]: the line-delimited JSON codec
//! - [`server`]: the authoritative host ([`SyncServer`])
//! - [`client`]: one peer's network leg ([`SyncClient`])
//! - [`discovery`]: host address lookup for out-of-band sharing
//!
//! ## Example
//!
//! ```ignore
//! use encounter_sync::prelude::*;
//!
//! // Host side: start a session.
//! let server = SyncServer::start(ServerConfig::default()).await?;
//!
//! // Peer side: join it and push an update.
//! let (client, mut snapshots) = SyncClient::connect(ClientConfig {
//!     server_addr: server.local_addr(),
//! })
//! .await?;
//!
//! client
//!     .send_update(&CombatantState {
//!         id: "e1".into(),
//!         name: "Orc".into(),
//!         hp: 15,
//!         max_hp: 15,
//!         armor_class: 13,
//!         initiative: 2,
//!     })
//!     .await;
//!
//! // Every snapshot replaces the peer's whole view.
//! while let Some(table) = snapshots.recv().await {
//!     println!("{} combatants", table.len());
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod core;
pub mod discovery;
pub mod server;
pub mod store;
pub mod wire;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::client::{ClientConfig, ClientError, SnapshotReceiver, SyncClient};
    pub use crate::core::*;
    pub use crate::server::{
        ConnectionId, ConnectionRegistry, ServerConfig, ServerError, SyncServer,
    };
    pub use crate::store::StateStore;
    pub use crate::wire::WireError;
}

// Re-export commonly used items at crate root
pub use crate::client::{ClientConfig, ClientError, SnapshotReceiver, SyncClient};
pub use crate::core::{CombatantState, DEFAULT_PORT, SyncError};
pub use crate::server::{ServerConfig, ServerError, SyncServer};
pub use crate::store::StateStore;
