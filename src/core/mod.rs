//! Encounter Sync - Core Types
//!
//! The combatant record, protocol constants, and the top-level error type.

mod combatant;
mod constants;
mod error;

pub use combatant::*;
pub use constants::*;
pub use error::*;
