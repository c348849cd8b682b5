//! The card record model.
//!
//! A card is one persisted action use: an ordered list of sub-action items,
//! each carrying roll definitions, resource bindings and per-target state,
//! plus derived (`calc`) blocks the resolution pipeline rebuilds on every
//! write.

mod card;
mod item;
mod phase;
mod target;

pub use card::{AggregateDamage, Card, CardCalc, TargetAggregate, FLAG_KEY, FLAG_SCOPE};
pub use item::{
    AttackRoll, AutoconsumeAfter, CheckDef, ConsumeAction, ConsumeResource, DamageCalc,
    DamageRoll, EffectTemplate, Item, ItemCalc, ItemCategory, SaveModifierRule, TargetDefinition,
    TargetKind,
};
pub use phase::{advance, bonus_key, KeyPress, PhaseOutcome, RollPhase};
pub use target::{HpSnapshot, Target, TargetCalc, TargetCheck, TargetDamage, TargetResult};
