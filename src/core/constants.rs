//! Protocol constants.

/// Default TCP port the host listens on.
pub const DEFAULT_PORT: u16 = 4444;

/// Capacity of the client's snapshot channel. Each snapshot replaces the
/// receiver's view wholesale, so a shallow queue is enough: a slow UI
/// consumer only delays itself.
pub const SNAPSHOT_CHANNEL_CAPACITY: usize = 32;
