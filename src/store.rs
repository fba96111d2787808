//! The authoritative combatant table.
//!
//! A process-lifetime, in-memory structure owned exclusively by the host.
//! Peers never touch it directly; they submit proposed updates over the
//! wire and the host is the final arbiter.

use crate::core::CombatantState;

/// In-memory table of combatants, keyed by `id`.
///
/// Records are kept in first-seen insertion order and `snapshot` returns
/// them in that same order on every call until the next upsert, so peers
/// that do not re-sort see stable positions. A linear scan is fine here:
/// tabletop combat means tens of entries, not thousands.
#[derive(Debug, Default)]
pub struct StateStore {
    combatants: Vec<CombatantState>,
}

impl StateStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a record by `id`.
    ///
    /// A record with a matching `id` is replaced wholesale - no
    /// field-level merge. An unknown `id` is appended, which is also how
    /// combatants come into existence: there is no separate create
    /// message in the protocol.
    pub fn upsert(&mut self, record: CombatantState) {
        match self.combatants.iter_mut().find(|c| c.id == record.id) {
            Some(existing) => *existing = record,
            None => self.combatants.push(record),
        }
    }

    /// An owned copy of the full table in stable insertion order.
    pub fn snapshot(&self) -> Vec<CombatantState> {
        self.combatants.clone()
    }

    /// Number of combatants currently tracked.
    pub fn len(&self) -> usize {
        self.combatants.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.combatants.is_empty()
    }
}
