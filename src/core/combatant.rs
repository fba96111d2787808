//! The combatant record - the unit of synchronized state.

use serde::{Deserialize, Serialize};

/// One entry in the shared battle state (player or monster).
///
/// This is pure data: the host reconciles records by `id` alone, and an
/// incoming record replaces the stored one wholesale. The numeric fields
/// are deliberately unvalidated - the protocol does not clamp `hp` into
/// `[0, max_hp]` or reject negative values, so the types must carry
/// whatever a peer sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CombatantState {
    /// Opaque unique identifier, assigned at creation and immutable for
    /// the combatant's lifetime. The reconciliation key.
    pub id: String,

    /// Display name.
    pub name: String,

    /// Current hit points.
    pub hp: i32,

    /// Maximum hit points.
    pub max_hp: i32,

    /// Armor class, informational. Accepts `ac` as a wire alias.
    #[serde(alias = "ac")]
    pub armor_class: i32,

    /// Initiative score; turn ordering is a UI concern, not ours.
    pub initiative: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_field_names_are_camel_case() {
        let record = CombatantState {
            id: "c1".to_string(),
            name: "Orc".to_string(),
            hp: 15,
            max_hp: 15,
            armor_class: 13,
            initiative: 2,
        };

        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"maxHp\":15"));
        assert!(json.contains("\"armorClass\":13"));
        assert!(!json.contains("max_hp"));
    }

    #[test]
    fn test_ac_accepted_as_alias() {
        let json = r#"{"id":"c1","name":"Orc","hp":15,"maxHp":15,"ac":13,"initiative":2}"#;
        let record: CombatantState = serde_json::from_str(json).unwrap();
        assert_eq!(record.armor_class, 13);
    }

    #[test]
    fn test_negative_values_pass_through() {
        let json = r#"{"id":"c1","name":"Orc","hp":-4,"maxHp":15,"armorClass":13,"initiative":-1}"#;
        let record: CombatantState = serde_json::from_str(json).unwrap();
        assert_eq!(record.hp, -4);
        assert_eq!(record.initiative, -1);
    }
}
