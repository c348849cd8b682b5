//! Document store seam.
//!
//! Entity lookup, permission checks and persistence batching live outside
//! this engine; the `DocumentStore` trait is the contract the engine
//! consumes. The in-memory implementation in [`memory`] backs the test
//! suite and serves as the reference adapter.
//!
//! ## Consistency
//!
//! Writes are last-write-wins: `bulk_update` carries no version token, so
//! two clients writing from a stale read can silently clobber each other.
//! This mirrors the replication model of the host platform and is a
//! documented limitation, not a guarantee to build on.

mod memory;
mod record;

pub use memory::{MemoryStore, SharedStore};
pub use record::{MessageRecord, TemplateRecord};

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::core::{ClientId, DamageType, StoreError, Uuid};
use crate::targeting::Point;

/// What a principal is allowed to do with a record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    /// Read the record.
    View,
    /// Full ownership of the underlying entity.
    Owner,
    /// Write access to the record.
    Update,
}

/// A connected client as the store knows it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: ClientId,
    /// Whether the client is currently connected.
    pub active: bool,
    /// Elevated clients hold every capability and arbitrate delegated
    /// actions for the others.
    pub elevated: bool,
}

/// Innate traits of an entity that alter its rolls.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityTraits {
    /// Reroll a single natural 1, once per roll.
    #[serde(default)]
    pub lucky: bool,

    /// Treat low faces as 10 on proficient checks.
    #[serde(default)]
    pub reliable: bool,

    /// Proficiency bonus; the reliability minimum only applies when this
    /// is positive.
    #[serde(default)]
    pub proficiency: i32,
}

/// How an entity is disposed toward the party that placed a template.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Disposition {
    Friendly,
    Neutral,
    Hostile,
}

impl Default for Disposition {
    fn default() -> Self {
        Disposition::Neutral
    }
}

/// One change entry inside an effect record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EffectChange {
    pub key: String,
    pub value: serde_json::Value,
}

/// Identifies which card/item/template produced a derived effect record.
///
/// Reapplying effects for the same origin updates the existing records
/// instead of duplicating them; retracting deletes exactly the records
/// bearing the key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OriginKey {
    pub message: Uuid,
    pub item_index: u32,
    pub effect_index: u32,
}

/// A status effect record embedded on an entity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AppliedEffect {
    /// Store-assigned id, unique within the owning entity.
    pub id: u64,
    pub label: String,
    pub changes: Vec<EffectChange>,
    /// Present when this record was derived by the effect applicator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<OriginKey>,
}

/// A freshly derived effect, not yet assigned a record id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewEffect {
    pub label: String,
    pub changes: Vec<EffectChange>,
    pub origin: OriginKey,
}

/// Snapshot of a live entity (actor/avatar) resolved from a reference.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub uuid: Uuid,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub img: Option<String>,

    pub ac: i32,
    pub hp: i32,
    #[serde(default)]
    pub temp_hp: i32,
    pub max_hp: i32,

    #[serde(default)]
    pub immunities: Vec<DamageType>,
    #[serde(default)]
    pub resistances: Vec<DamageType>,
    #[serde(default)]
    pub vulnerabilities: Vec<DamageType>,

    #[serde(default)]
    pub disposition: Disposition,
    #[serde(default)]
    pub traits: EntityTraits,

    /// Save bonus per ability key (e.g. `"dex"`).
    #[serde(default)]
    pub save_bonuses: FxHashMap<String, i32>,

    /// External numeric fields addressed by dotted path (spell slots,
    /// charges, quantities). The consumption ledger deducts from these.
    #[serde(default)]
    pub fields: FxHashMap<String, i64>,

    #[serde(default)]
    pub effects: Vec<AppliedEffect>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<ClientId>,

    /// Scene position of the entity's avatar, if placed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Point>,
}

impl EntityRecord {
    /// Read an external numeric field.
    #[must_use]
    pub fn field(&self, path: &str) -> Option<i64> {
        self.fields.get(path).copied()
    }

    /// The save bonus for an ability key, 0 when absent.
    #[must_use]
    pub fn save_bonus(&self, ability: &str) -> i32 {
        self.save_bonuses.get(ability).copied().unwrap_or(0)
    }
}

/// One batched write against a single record.
///
/// Callers group their writes so each touched record receives at most one
/// update per batch; stores may persist each entry as one call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntityUpdate {
    pub uuid: Uuid,
    pub patch: EntityPatch,
}

/// The typed payload of an [`EntityUpdate`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum EntityPatch {
    /// Set external numeric fields by path.
    Fields(Vec<(String, i64)>),
    /// Set the hit point pools.
    Hp { hp: i32, temp: i32 },
    /// Create derived effect records.
    CreateEffects(Vec<NewEffect>),
    /// Replace existing effect records in place.
    UpdateEffects(Vec<AppliedEffect>),
    /// Delete effect records by id.
    DeleteEffects(Vec<u64>),
}

/// The entity reference resolver and persistence boundary.
///
/// Everything here is synchronous from the engine's point of view; the
/// engine's scheduling model is cooperative and single-threaded per client.
pub trait DocumentStore {
    /// Resolve a single reference to an entity snapshot.
    fn entity(&self, uuid: &Uuid) -> Option<EntityRecord>;

    /// Batch-resolve references. Missing entries are absent from the map.
    fn entities(&self, uuids: &[Uuid]) -> FxHashMap<Uuid, EntityRecord> {
        let mut map = FxHashMap::default();
        for uuid in uuids {
            if let Some(entity) = self.entity(uuid) {
                map.insert(uuid.clone(), entity);
            }
        }
        map
    }

    /// Every placed entity in the active scene (template candidates).
    fn scene_entities(&self) -> Vec<EntityRecord>;

    /// Apply a batch of record writes. Last write wins; there is no
    /// version check.
    fn bulk_update(&mut self, updates: &[EntityUpdate]) -> Result<(), StoreError>;

    /// Delete records by reference.
    fn bulk_delete(&mut self, uuids: &[Uuid]) -> Result<(), StoreError>;

    /// Whether `principal` holds `capability` on the referenced entity.
    fn test_permission(&self, uuid: &Uuid, principal: &ClientId, capability: Capability) -> bool;

    /// All known clients.
    fn users(&self) -> Vec<UserInfo>;

    /// Look up one client.
    fn user(&self, id: &ClientId) -> Option<UserInfo> {
        self.users().into_iter().find(|u| &u.id == id)
    }

    // --- message records (card payload hosts) ---

    fn message(&self, id: &Uuid) -> Option<MessageRecord>;

    /// Raw commit of a message record. Lifecycle hooks are the engine's
    /// concern, not the store's.
    fn put_message(&mut self, record: MessageRecord);

    fn remove_message(&mut self, id: &Uuid) -> Option<MessageRecord>;

    /// Whether `principal` may update the message: its author, or any
    /// elevated client.
    fn can_modify_message(&self, id: &Uuid, principal: &ClientId) -> bool;

    // --- area template records ---

    fn template(&self, id: &Uuid) -> Option<TemplateRecord>;

    fn put_template(&mut self, record: TemplateRecord);

    fn remove_template(&mut self, id: &Uuid) -> Option<TemplateRecord>;
}
