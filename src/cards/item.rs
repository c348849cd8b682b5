//! Sub-action (item) data: rolls, resource bindings, target definitions.

use serde::{Deserialize, Serialize};

use crate::core::Uuid;
use crate::dice::{DamageMode, DiceExpression, EvaluatedRoll, RollMode};
use crate::store::EffectChange;
use crate::targeting::{TemplateAnchor, TemplateShape};

use super::phase::RollPhase;
use super::target::Target;

/// How a passed save scales the damage of an entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SaveModifierRule {
    SaveFullDmg,
    SaveHalveDmg,
    SaveNoDmg,
}

impl Default for SaveModifierRule {
    fn default() -> Self {
        SaveModifierRule::SaveHalveDmg
    }
}

/// Broad origin category of an item; drives rules that only apply to one
/// category (zero-tier spells never halve on a save).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemCategory {
    Spell,
    Weapon,
    Feature,
    Other,
}

impl Default for ItemCategory {
    fn default() -> Self {
        ItemCategory::Other
    }
}

/// The attack roll of an item.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AttackRoll {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    #[serde(default)]
    pub phase: RollPhase,

    #[serde(default)]
    pub mode: RollMode,

    /// Item-provided bonus terms (modifier, proficiency, ammo bonus),
    /// captured once at card creation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bonus: Option<DiceExpression>,

    /// Raw user-entered bonus, validated at commit.
    #[serde(default)]
    pub user_bonus: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluated: Option<EvaluatedRoll>,
}

impl AttackRoll {
    #[must_use]
    pub fn new(bonus: Option<DiceExpression>) -> Self {
        Self {
            label: None,
            phase: RollPhase::default(),
            mode: RollMode::default(),
            bonus,
            user_bonus: String::new(),
            evaluated: None,
        }
    }

    #[must_use]
    pub fn is_evaluated(&self) -> bool {
        self.evaluated.is_some()
    }
}

/// Derived display caches of a damage entry.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DamageCalc {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_formula: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_damage_types: Option<String>,
}

/// One damage roll definition of an item.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DamageRoll {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    #[serde(default)]
    pub phase: RollPhase,

    #[serde(default)]
    pub mode: DamageMode,

    /// Save scaling; `None` means no save applies to this entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modifier_rule: Option<SaveModifierRule>,

    /// Base damage terms.
    pub base: DiceExpression,

    /// Extra terms added once per level above the item's base level.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upcast: Option<DiceExpression>,

    /// Raw user-entered bonus, validated at commit.
    #[serde(default)]
    pub user_bonus: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normal: Option<EvaluatedRoll>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub critical: Option<EvaluatedRoll>,

    #[serde(default)]
    pub calc: DamageCalc,
}

impl DamageRoll {
    #[must_use]
    pub fn new(base: DiceExpression) -> Self {
        Self {
            label: None,
            phase: RollPhase::default(),
            mode: DamageMode::default(),
            modifier_rule: None,
            base,
            upcast: None,
            user_bonus: String::new(),
            normal: None,
            critical: None,
            calc: DamageCalc::default(),
        }
    }

    /// The roll the current mode presents, if evaluated.
    #[must_use]
    pub fn active_roll(&self) -> Option<&EvaluatedRoll> {
        match self.mode {
            DamageMode::Normal => self.normal.as_ref(),
            DamageMode::Critical => self.critical.as_ref(),
        }
    }

    /// Whether the roll the current mode presents has been evaluated.
    #[must_use]
    pub fn is_evaluated(&self) -> bool {
        self.active_roll().is_some()
    }

    /// The unevaluated expression at the given upcast depth, damage types
    /// inherited onto unannotated parts.
    #[must_use]
    pub fn expression(&self, upcast_levels: u32) -> DiceExpression {
        let mut expression = self.base.clone();
        if let Some(upcast) = &self.upcast {
            for _ in 0..upcast_levels {
                expression = expression.merged(upcast);
            }
        }
        expression.inherit_damage_types();
        expression
    }
}

/// The saving throw / check an item demands from each target.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CheckDef {
    /// Ability key the save uses (e.g. `"dex"`).
    pub ability: String,

    pub dc: i32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skill: Option<String>,

    /// Whether the target's save bonus is added to its roll.
    #[serde(default)]
    pub add_save_bonus: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// When a resource deduction fires automatically.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AutoconsumeAfter {
    /// Immediately.
    Init,
    /// Once the attack roll is evaluated.
    Attack,
    /// Once any damage roll is evaluated.
    Damage,
    /// Once any target's check is evaluated.
    Check,
    /// Once the area template is placed.
    TemplatePlaced,
}

/// Manual override of the automatic trigger.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConsumeAction {
    ManualApply,
    Undo,
}

/// One bound external numeric deduction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConsumeResource {
    /// Record holding the field.
    pub uuid: Uuid,

    /// Dotted field path on that record.
    pub path: String,

    pub amount: i64,

    /// Field value captured at creation; restored on undo. Only recomputed
    /// when the bound pool changes (level selection) before any deduction.
    pub original: i64,

    pub autoconsume_after: AutoconsumeAfter,

    /// Manual override; takes precedence over the automatic trigger.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<ConsumeAction>,

    #[serde(default)]
    pub applied: bool,

    /// The path/original pair tracks the selected level's pool and must be
    /// re-captured when the level changes.
    #[serde(default)]
    pub slot_scaled: bool,
}

/// Which entities an item may target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TargetKind {
    None,
    SelfOnly,
    Creature,
    Ally,
    Enemy,
}

impl Default for TargetKind {
    fn default() -> Self {
        TargetKind::Creature
    }
}

/// How an item derives its target set.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetDefinition {
    #[serde(default)]
    pub kind: TargetKind,

    /// Expected number of manual targets, `None` for unbounded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,

    /// Present when the item targets an area instead of picked entities.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shape: Option<TemplateShape>,

    #[serde(default)]
    pub anchor: TemplateAnchor,

    /// The template record currently bound to this item.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_template: Option<Uuid>,
}

impl TargetDefinition {
    /// Whether this item targets an area.
    #[must_use]
    pub fn has_aoe(&self) -> bool {
        self.shape.is_some()
    }
}

/// A derived status effect an item applies to affected targets.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EffectTemplate {
    pub label: String,
    #[serde(default)]
    pub changes: Vec<EffectChange>,
}

/// Derived item state, recomputed on every card write.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemCalc {
    #[serde(default)]
    pub can_change_targets: bool,

    #[serde(default)]
    pub can_change_level: bool,

    #[serde(default)]
    pub all_consume_resources_applied: bool,

    /// Effect templates this item stamps onto affected targets.
    #[serde(default)]
    pub effect_templates: Vec<EffectTemplate>,
}

/// One sub-action of a card: a single roll-bearing effect.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Reference to the source item record.
    pub uuid: Uuid,

    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub img: Option<String>,

    #[serde(default)]
    pub category: ItemCategory,

    /// The item's native tier/level.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_level: Option<u8>,

    /// The tier the use was cast at. Mutable only while no bound resource
    /// has been applied and no roll is final.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_level: Option<u8>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attack: Option<AttackRoll>,

    #[serde(default)]
    pub damages: Vec<DamageRoll>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check: Option<CheckDef>,

    /// Resolved target list; absent until targeting completes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub targets: Option<Vec<Target>>,

    #[serde(default)]
    pub target_definition: TargetDefinition,

    #[serde(default)]
    pub consume_resources: Vec<ConsumeResource>,

    #[serde(default)]
    pub calc: ItemCalc,
}

impl Item {
    /// Levels above the item's base tier the use was cast at.
    #[must_use]
    pub fn upcast_levels(&self) -> u32 {
        match (self.selected_level, self.base_level) {
            (Some(selected), Some(base)) => u32::from(selected.saturating_sub(base)),
            _ => 0,
        }
    }

    /// Whether the attack roll, if any, has been evaluated.
    #[must_use]
    pub fn attack_evaluated(&self) -> bool {
        self.attack.as_ref().is_some_and(AttackRoll::is_evaluated)
    }

    /// Whether any damage roll has been evaluated.
    #[must_use]
    pub fn any_damage_evaluated(&self) -> bool {
        self.damages
            .iter()
            .any(|d| d.normal.is_some() || d.critical.is_some())
    }

    /// Whether any target's check has been evaluated.
    #[must_use]
    pub fn any_check_evaluated(&self) -> bool {
        self.targets
            .iter()
            .flatten()
            .any(|t| t.check.as_ref().is_some_and(|c| c.evaluated.is_some()))
    }

    /// Find a target by its reference.
    #[must_use]
    pub fn target(&self, uuid: &Uuid) -> Option<&Target> {
        self.targets.as_ref()?.iter().find(|t| &t.uuid == uuid)
    }

    /// Find a target mutably by its reference.
    pub fn target_mut(&mut self, uuid: &Uuid) -> Option<&mut Target> {
        self.targets.as_mut()?.iter_mut().find(|t| &t.uuid == uuid)
    }

    /// Whether any roll on this item is final.
    #[must_use]
    pub fn any_roll_final(&self) -> bool {
        self.attack_evaluated() || self.any_damage_evaluated() || self.any_check_evaluated()
    }
}
