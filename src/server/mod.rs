//! Encounter Sync - Host Side
//!
//! The authoritative sync server and its connection registry.

mod registry;
#[allow(clippy::module_inception)]
mod server;

pub use registry::*;
pub use server::*;
