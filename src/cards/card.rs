//! The persisted card record: one action use and its full resolution state.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::{ClientId, Uuid};
use crate::store::MessageRecord;

use super::item::Item;
use super::target::HpSnapshot;

/// Flag scope under which card payloads live on message records.
pub const FLAG_SCOPE: &str = "vtt-cards";
/// Flag key of the card payload.
pub const FLAG_KEY: &str = "card";

/// Cumulative damage/heal state of one aggregate.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateDamage {
    /// Whether the calculated amount matches the committed amount.
    #[serde(default)]
    pub applied: bool,

    /// Amount already committed to the entity's pools.
    #[serde(default)]
    pub applied_dmg: i32,

    /// Whether the entity escaped the card entirely: `Some(true)` when
    /// every associated attack missed or save succeeded, `None` while an
    /// outcome is still pending.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avoided: Option<bool>,

    /// Net calculated damage (negative values are healing).
    #[serde(default)]
    pub calc_dmg: i32,

    /// Hit points the entity would end at.
    #[serde(default)]
    pub calc_hp: i32,

    /// Temporary hit points the entity would end at.
    #[serde(default)]
    pub calc_temp: i32,
}

/// Cross-item, per-entity rollup of cumulative damage and healing.
///
/// Rebuilt from scratch on every recompute, but seeded with the previous
/// aggregate's `applied_dmg` so a committed amount survives re-derivation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TargetAggregate {
    pub uuid: Uuid,

    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub img: Option<String>,

    pub hp_snapshot: HpSnapshot,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dmg: Option<AggregateDamage>,
}

/// Derived card state, never hand-edited.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CardCalc {
    #[serde(default)]
    pub target_aggregates: Vec<TargetAggregate>,

    /// True when every aggregate's calculated amount has been committed.
    #[serde(default)]
    pub all_dmg_applied: bool,
}

/// One persisted record per action use.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Card {
    /// Acting entity, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<Uuid>,

    /// Acting entity's avatar, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<Uuid>,

    /// Client that created the card.
    #[serde(default)]
    pub origin_user: ClientId,

    /// Ordered sub-actions. The card exclusively owns its items.
    #[serde(default)]
    pub items: Vec<Item>,

    #[serde(default)]
    pub calc: CardCalc,
}

impl Card {
    #[must_use]
    pub fn new(origin_user: ClientId) -> Self {
        Self {
            actor: None,
            token: None,
            origin_user,
            items: Vec::new(),
            calc: CardCalc::default(),
        }
    }

    /// Read the card payload off a message record.
    ///
    /// Messages without the module flag are simply not cards; a flag that
    /// fails to deserialize is treated the same way (logged, not an error)
    /// so foreign or future payload versions never wedge the dispatcher.
    #[must_use]
    pub fn from_message(message: &MessageRecord) -> Option<Card> {
        let value = message.flag(FLAG_SCOPE, FLAG_KEY)?;
        match serde_json::from_value(value.clone()) {
            Ok(card) => Some(card),
            Err(err) => {
                warn!(message = %message.id, %err, "unreadable card payload");
                None
            }
        }
    }

    /// Write the card payload onto a message record.
    pub fn write_to(&self, message: &mut MessageRecord) {
        // Serialization of a plain data struct cannot fail.
        let value = serde_json::to_value(self).unwrap_or(serde_json::Value::Null);
        message.set_flag(FLAG_SCOPE, FLAG_KEY, value);
    }

    /// The aggregate for an entity, if one exists.
    #[must_use]
    pub fn aggregate(&self, uuid: &Uuid) -> Option<&TargetAggregate> {
        self.calc.target_aggregates.iter().find(|a| &a.uuid == uuid)
    }

    /// The aggregate for an entity, mutably.
    pub fn aggregate_mut(&mut self, uuid: &Uuid) -> Option<&mut TargetAggregate> {
        self.calc
            .target_aggregates
            .iter_mut()
            .find(|a| &a.uuid == uuid)
    }
}
