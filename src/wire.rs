//! Wire codec: line-delimited JSON over a plain TCP stream.
//!
//! One complete JSON value per line, UTF-8. Two message shapes exist:
//!
//! - **Update** (client to host): a single [`CombatantState`] object.
//! - **Snapshot** (host to client): a JSON array of those objects,
//!   the full combatant table in stable store order.
//!
//! There is no framing header, no version field, no sequence number and
//! no authentication - any peer that can reach the port and produce
//! well-formed JSON can mutate shared state.

use thiserror::Error;

use crate::core::CombatantState;

/// Errors from encoding or decoding wire messages.
#[derive(Debug, Error)]
pub enum WireError {
    /// The line was not a well-formed message of the expected shape.
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Encode a single update message, newline-terminated.
pub fn encode_update(record: &CombatantState) -> Result<String, WireError> {
    let mut line = serde_json::to_string(record)?;
    line.push('\n');
    Ok(line)
}

/// Encode a snapshot message, newline-terminated.
pub fn encode_snapshot(records: &[CombatantState]) -> Result<String, WireError> {
    let mut line = serde_json::to_string(records)?;
    line.push('\n');
    Ok(line)
}

/// Decode one update line into a record.
pub fn decode_update(line: &str) -> Result<CombatantState, WireError> {
    Ok(serde_json::from_str(line)?)
}

/// Decode one snapshot line into the full combatant list.
pub fn decode_snapshot(line: &str) -> Result<Vec<CombatantState>, WireError> {
    Ok(serde_json::from_str(line)?)
}
