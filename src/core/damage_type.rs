//! Damage type taxonomy.
//!
//! Damage types drive two decisions in the resolution pipeline:
//! - defense interaction (immunity / resistance / vulnerability lookups)
//! - routing into the target aggregate (damage, healing, or temporary pool)

use serde::{Deserialize, Serialize};

/// One damage (or restoration) type carried by a roll term.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DamageType {
    Acid,
    Bludgeoning,
    Cold,
    Fire,
    Force,
    Lightning,
    Necrotic,
    Piercing,
    Poison,
    Psychic,
    Radiant,
    Slashing,
    Thunder,
    /// Restores hit points instead of removing them.
    Healing,
    /// Grants temporary hit points.
    #[serde(rename = "temphp")]
    TempHp,
}

impl DamageType {
    /// All known types, in annotation order.
    pub const ALL: [DamageType; 15] = [
        DamageType::Acid,
        DamageType::Bludgeoning,
        DamageType::Cold,
        DamageType::Fire,
        DamageType::Force,
        DamageType::Lightning,
        DamageType::Necrotic,
        DamageType::Piercing,
        DamageType::Poison,
        DamageType::Psychic,
        DamageType::Radiant,
        DamageType::Slashing,
        DamageType::Thunder,
        DamageType::Healing,
        DamageType::TempHp,
    ];

    /// The annotation used inside roll formulas, e.g. `[fire]`.
    #[must_use]
    pub fn annotation(self) -> &'static str {
        match self {
            DamageType::Acid => "acid",
            DamageType::Bludgeoning => "bludgeoning",
            DamageType::Cold => "cold",
            DamageType::Fire => "fire",
            DamageType::Force => "force",
            DamageType::Lightning => "lightning",
            DamageType::Necrotic => "necrotic",
            DamageType::Piercing => "piercing",
            DamageType::Poison => "poison",
            DamageType::Psychic => "psychic",
            DamageType::Radiant => "radiant",
            DamageType::Slashing => "slashing",
            DamageType::Thunder => "thunder",
            DamageType::Healing => "healing",
            DamageType::TempHp => "temphp",
        }
    }

    /// Parse a formula annotation back into a type.
    #[must_use]
    pub fn from_annotation(annotation: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.annotation() == annotation)
    }

    /// Whether amounts of this type restore hit points.
    #[must_use]
    pub fn is_healing(self) -> bool {
        matches!(self, DamageType::Healing)
    }

    /// Whether amounts of this type feed the temporary hit point pool.
    #[must_use]
    pub fn is_temp_hp(self) -> bool {
        matches!(self, DamageType::TempHp)
    }
}

impl std::fmt::Display for DamageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.annotation())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_annotation_roundtrip() {
        for t in DamageType::ALL {
            assert_eq!(DamageType::from_annotation(t.annotation()), Some(t));
        }
        assert_eq!(DamageType::from_annotation("frostbite"), None);
    }

    #[test]
    fn test_categories() {
        assert!(DamageType::Healing.is_healing());
        assert!(!DamageType::Fire.is_healing());
        assert!(DamageType::TempHp.is_temp_hp());
        assert!(!DamageType::Healing.is_temp_hp());
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(serde_json::to_string(&DamageType::Fire).unwrap(), "\"fire\"");
        assert_eq!(serde_json::to_string(&DamageType::TempHp).unwrap(), "\"temphp\"");
    }
}
