//! Per-item target state.

use serde::{Deserialize, Serialize};

use crate::core::{DamageType, Uuid};
use crate::dice::{EvaluatedRoll, RollMode};
use crate::store::EntityRecord;

use super::phase::RollPhase;

/// Hit point pools captured when an entity became a target.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HpSnapshot {
    pub hp: i32,
    #[serde(default)]
    pub temp: i32,
    pub max: i32,
}

/// A target's individual saving throw state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TargetCheck {
    #[serde(default)]
    pub phase: RollPhase,

    #[serde(default)]
    pub mode: RollMode,

    /// Raw user-entered bonus, validated at commit.
    #[serde(default)]
    pub user_bonus: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluated: Option<EvaluatedRoll>,
}

impl TargetCheck {
    #[must_use]
    pub fn new() -> Self {
        Self {
            phase: RollPhase::default(),
            mode: RollMode::default(),
            user_bonus: String::new(),
            evaluated: None,
        }
    }

    #[must_use]
    pub fn is_evaluated(&self) -> bool {
        self.evaluated.is_some()
    }
}

impl Default for TargetCheck {
    fn default() -> Self {
        Self::new()
    }
}

/// The last damage pair resolved against this target.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TargetDamage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub damage_type: Option<DamageType>,

    /// Amount after save scaling, before defense modifiers.
    pub raw: i32,

    /// Amount after defense modifiers.
    pub calc: i32,
}

/// Fully derived per-target outcome. Never persisted by hand; the
/// resolution pipeline rebuilds it on every recompute, preserving only
/// `applied_active_effects`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hit: Option<bool>,

    /// `None` while the target's check is still pending.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_pass: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dmg: Option<TargetDamage>,

    /// Whether this target currently carries the item's derived effects.
    #[serde(default)]
    pub applied_active_effects: bool,
}

/// Derived target state.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetCalc {
    #[serde(default)]
    pub result: TargetResult,
}

/// One affected entity, scoped to one item.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Target {
    /// Avatar reference.
    pub uuid: Uuid,

    /// Owning entity reference.
    pub actor_uuid: Uuid,

    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub img: Option<String>,

    pub ac: i32,

    pub hp_snapshot: HpSnapshot,

    #[serde(default)]
    pub immunities: Vec<DamageType>,
    #[serde(default)]
    pub resistances: Vec<DamageType>,
    #[serde(default)]
    pub vulnerabilities: Vec<DamageType>,

    /// Present when the item demands an individual saving throw.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check: Option<TargetCheck>,

    /// Confirmation that damage/heal has been committed to the entity.
    /// May only be set once an aggregate exists for this uuid.
    #[serde(default)]
    pub apply_dmg: bool,

    #[serde(default)]
    pub calc: TargetCalc,
}

impl Target {
    /// Snapshot an entity as a target. The check state is only created
    /// when `with_check` is set; the roll itself is generated at the
    /// moment it is made.
    #[must_use]
    pub fn from_entity(entity: &EntityRecord, with_check: bool) -> Self {
        Self {
            uuid: entity.uuid.clone(),
            actor_uuid: entity.uuid.clone(),
            name: entity.name.clone(),
            img: entity.img.clone(),
            ac: entity.ac,
            hp_snapshot: HpSnapshot {
                hp: entity.hp,
                temp: entity.temp_hp,
                max: entity.max_hp,
            },
            immunities: entity.immunities.clone(),
            resistances: entity.resistances.clone(),
            vulnerabilities: entity.vulnerabilities.clone(),
            check: with_check.then(TargetCheck::new),
            apply_dmg: false,
            calc: TargetCalc::default(),
        }
    }

    #[must_use]
    pub fn check_evaluated(&self) -> bool {
        self.check.as_ref().is_some_and(TargetCheck::is_evaluated)
    }
}
