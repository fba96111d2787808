//! Encounter Sync - Peer Side
//!
//! High-level API for peers joining a hosted combat session.

#[allow(clippy::module_inception)]
mod client;

pub use client::*;
