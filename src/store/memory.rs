//! In-memory reference implementation of the document store.
//!
//! Backs the test suite and documents the behavior real adapters are
//! expected to provide, including last-write-wins semantics and
//! effect-record id assignment. [`SharedStore`] lets several client
//! engines observe one store, standing in for the replication channel.

use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use tracing::warn;

use crate::core::{ClientId, StoreError, Uuid};

use super::record::{MessageRecord, TemplateRecord};
use super::{
    AppliedEffect, Capability, DocumentStore, EntityPatch, EntityRecord, EntityUpdate, UserInfo,
};

/// An in-memory document store.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    entities: FxHashMap<Uuid, EntityRecord>,
    messages: FxHashMap<Uuid, MessageRecord>,
    templates: FxHashMap<Uuid, TemplateRecord>,
    users: Vec<UserInfo>,
    next_effect_id: u64,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_effect_id: 1,
            ..Self::default()
        }
    }

    /// Insert or replace an entity record.
    pub fn add_entity(&mut self, entity: EntityRecord) {
        self.entities.insert(entity.uuid.clone(), entity);
    }

    /// Register a client.
    pub fn add_user(&mut self, user: UserInfo) {
        self.users.retain(|u| u.id != user.id);
        self.users.push(user);
    }

    /// Direct read access for assertions.
    #[must_use]
    pub fn entity_ref(&self, uuid: &Uuid) -> Option<&EntityRecord> {
        self.entities.get(uuid)
    }

    fn apply_patch(entity: &mut EntityRecord, patch: &EntityPatch, next_effect_id: &mut u64) {
        match patch {
            EntityPatch::Fields(fields) => {
                for (path, value) in fields {
                    entity.fields.insert(path.clone(), *value);
                }
            }
            EntityPatch::Hp { hp, temp } => {
                entity.hp = *hp;
                entity.temp_hp = *temp;
            }
            EntityPatch::CreateEffects(new_effects) => {
                for new_effect in new_effects {
                    let id = *next_effect_id;
                    *next_effect_id += 1;
                    entity.effects.push(AppliedEffect {
                        id,
                        label: new_effect.label.clone(),
                        changes: new_effect.changes.clone(),
                        origin: Some(new_effect.origin.clone()),
                    });
                }
            }
            EntityPatch::UpdateEffects(updates) => {
                for update in updates {
                    if let Some(existing) =
                        entity.effects.iter_mut().find(|e| e.id == update.id)
                    {
                        *existing = update.clone();
                    }
                }
            }
            EntityPatch::DeleteEffects(ids) => {
                entity.effects.retain(|e| !ids.contains(&e.id));
            }
        }
    }
}

impl DocumentStore for MemoryStore {
    fn entity(&self, uuid: &Uuid) -> Option<EntityRecord> {
        self.entities.get(uuid).cloned()
    }

    fn scene_entities(&self) -> Vec<EntityRecord> {
        let mut all: Vec<EntityRecord> = self
            .entities
            .values()
            .filter(|e| e.position.is_some())
            .cloned()
            .collect();
        all.sort_by(|a, b| a.uuid.cmp(&b.uuid));
        all
    }

    fn bulk_update(&mut self, updates: &[EntityUpdate]) -> Result<(), StoreError> {
        // Validate the whole batch first so a bad reference doesn't leave
        // the batch half-applied.
        for update in updates {
            if !self.entities.contains_key(&update.uuid) {
                return Err(StoreError::NotFound(update.uuid.clone()));
            }
        }
        for update in updates {
            let entity = self
                .entities
                .get_mut(&update.uuid)
                .ok_or_else(|| StoreError::NotFound(update.uuid.clone()))?;
            Self::apply_patch(entity, &update.patch, &mut self.next_effect_id);
        }
        Ok(())
    }

    fn bulk_delete(&mut self, uuids: &[Uuid]) -> Result<(), StoreError> {
        for uuid in uuids {
            if self.entities.remove(uuid).is_none() {
                warn!(%uuid, "bulk_delete: unknown record");
            }
        }
        Ok(())
    }

    fn test_permission(&self, uuid: &Uuid, principal: &ClientId, capability: Capability) -> bool {
        if let Some(user) = self.user(principal) {
            if user.elevated {
                return true;
            }
        }
        match capability {
            Capability::View => true,
            Capability::Owner | Capability::Update => self
                .entities
                .get(uuid)
                .is_some_and(|e| e.owner.as_ref() == Some(principal)),
        }
    }

    fn users(&self) -> Vec<UserInfo> {
        self.users.clone()
    }

    fn message(&self, id: &Uuid) -> Option<MessageRecord> {
        self.messages.get(id).cloned()
    }

    fn put_message(&mut self, record: MessageRecord) {
        self.messages.insert(record.id.clone(), record);
    }

    fn remove_message(&mut self, id: &Uuid) -> Option<MessageRecord> {
        self.messages.remove(id)
    }

    fn can_modify_message(&self, id: &Uuid, principal: &ClientId) -> bool {
        if self.user(principal).is_some_and(|u| u.elevated) {
            return true;
        }
        self.messages
            .get(id)
            .is_some_and(|m| &m.author == principal)
    }

    fn template(&self, id: &Uuid) -> Option<TemplateRecord> {
        self.templates.get(id).cloned()
    }

    fn put_template(&mut self, record: TemplateRecord) {
        self.templates.insert(record.id.clone(), record);
    }

    fn remove_template(&mut self, id: &Uuid) -> Option<TemplateRecord> {
        self.templates.remove(id)
    }
}

/// A handle to a store shared by several client engines.
///
/// Cloning the handle shares the underlying store; every engine sees every
/// other engine's committed writes, mirroring the replicated document
/// store of the host platform. Last write still wins.
#[derive(Clone, Debug, Default)]
pub struct SharedStore(Rc<RefCell<MemoryStore>>);

impl SharedStore {
    #[must_use]
    pub fn new(store: MemoryStore) -> Self {
        Self(Rc::new(RefCell::new(store)))
    }

    /// Run a closure against the underlying store.
    pub fn with<T>(&self, f: impl FnOnce(&mut MemoryStore) -> T) -> T {
        f(&mut self.0.borrow_mut())
    }
}

impl DocumentStore for SharedStore {
    fn entity(&self, uuid: &Uuid) -> Option<EntityRecord> {
        self.0.borrow().entity(uuid)
    }

    fn scene_entities(&self) -> Vec<EntityRecord> {
        self.0.borrow().scene_entities()
    }

    fn bulk_update(&mut self, updates: &[EntityUpdate]) -> Result<(), StoreError> {
        self.0.borrow_mut().bulk_update(updates)
    }

    fn bulk_delete(&mut self, uuids: &[Uuid]) -> Result<(), StoreError> {
        self.0.borrow_mut().bulk_delete(uuids)
    }

    fn test_permission(&self, uuid: &Uuid, principal: &ClientId, capability: Capability) -> bool {
        self.0.borrow().test_permission(uuid, principal, capability)
    }

    fn users(&self) -> Vec<UserInfo> {
        self.0.borrow().users()
    }

    fn message(&self, id: &Uuid) -> Option<MessageRecord> {
        self.0.borrow().message(id)
    }

    fn put_message(&mut self, record: MessageRecord) {
        self.0.borrow_mut().put_message(record);
    }

    fn remove_message(&mut self, id: &Uuid) -> Option<MessageRecord> {
        self.0.borrow_mut().remove_message(id)
    }

    fn can_modify_message(&self, id: &Uuid, principal: &ClientId) -> bool {
        self.0.borrow().can_modify_message(id, principal)
    }

    fn template(&self, id: &Uuid) -> Option<TemplateRecord> {
        self.0.borrow().template(id)
    }

    fn put_template(&mut self, record: TemplateRecord) {
        self.0.borrow_mut().put_template(record);
    }

    fn remove_template(&mut self, id: &Uuid) -> Option<TemplateRecord> {
        self.0.borrow_mut().remove_template(id)
    }
}
