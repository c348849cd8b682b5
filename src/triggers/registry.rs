//! Trigger registry and dispatch.
//!
//! The registry stores lifecycle triggers per record kind and fires them
//! around every create/update/delete the engine performs. Hooks for the
//! same phase run in registration order; a failing before-hook aborts the
//! operation for all subsequent hooks.

use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::cards::Card;
use crate::core::{ClientId, Uuid};
use crate::store::{DocumentStore, EntityUpdate, MessageRecord, TemplateRecord};

/// The record kinds the dispatcher knows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Message,
    Template,
}

/// Lifecycle position of a dispatch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TriggerPhase {
    BeforeCreate,
    BeforeUpdate,
    BeforeDelete,
    AfterCreate,
    AfterUpdate,
    AfterDelete,
}

/// One changed row: the committed value and, for updates, the prior one.
#[derive(Clone, Debug)]
pub struct RowChange<R> {
    pub new: R,
    pub old: Option<R>,
}

/// Free-form options accompanying an operation.
pub type TriggerOptions = FxHashMap<String, serde_json::Value>;

/// Context handed to before-hooks.
///
/// Before-hooks run synchronously prior to commit. They may rewrite the
/// pending rows but must not perform further writes; the store is exposed
/// read-only.
pub struct BeforeContext<'a, R> {
    pub rows: &'a mut Vec<RowChange<R>>,
    pub options: &'a TriggerOptions,
    /// Client requesting the operation.
    pub actor: &'a ClientId,
    pub store: &'a dyn DocumentStore,
}

/// Writes a deferred callback may perform once in-flight hook processing
/// for the current operation has completed.
///
/// Implemented by the engine; failures are logged, never propagated back
/// into the operation that scheduled the callback.
pub trait EngineOps {
    /// Persist a card payload onto its message (recomputes derived state
    /// and fires update triggers).
    fn save_card(&mut self, message_id: &Uuid, card: Card);

    /// Delete a message record (fires delete triggers).
    fn delete_message(&mut self, message_id: &Uuid);

    /// Delete a template record (fires delete triggers).
    fn delete_template(&mut self, template_id: &Uuid);

    /// Commit batched entity writes.
    fn apply_updates(&mut self, updates: Vec<EntityUpdate>);

    /// Broadcast the interacting user's current target selection.
    fn broadcast_targets(&mut self, targets: Vec<Uuid>);
}

/// A deferred end-of-context callback.
pub type DeferredOp = Box<dyn FnOnce(&mut dyn EngineOps)>;

/// Context handed to after-hooks.
///
/// After-hooks run once the operation is committed. Direct writes would
/// re-enter the record currently being processed, so further writes go
/// through [`AfterContext::defer`].
pub struct AfterContext<'a, R> {
    pub rows: &'a [RowChange<R>],
    pub options: &'a TriggerOptions,
    /// Client whose operation committed (on every observing client).
    pub actor: &'a ClientId,
    /// The client this dispatcher runs in.
    pub local_client: &'a ClientId,
    pub store: &'a dyn DocumentStore,
    pub(crate) deferred: &'a mut Vec<DeferredOp>,
}

impl<R> AfterContext<'_, R> {
    /// Schedule a write for after all in-flight hook processing.
    pub fn defer(&mut self, op: impl FnOnce(&mut dyn EngineOps) + 'static) {
        self.deferred.push(Box::new(op));
    }

    /// Whether this client initiated the operation. Side effects that must
    /// happen exactly once across the fleet key off this.
    #[must_use]
    pub fn is_local_change(&self) -> bool {
        self.actor == self.local_client
    }
}

/// A lifecycle trigger for one record kind.
///
/// Implement only the phases you care about; the rest default to no-ops.
/// `*_upsert` hooks are the union of create and update for handlers that
/// don't care which; for each handler the specific hook runs first, then
/// the upsert hook.
#[allow(unused_variables)]
pub trait RecordTrigger<R> {
    /// Return `false` to veto the creation.
    fn before_create(&self, ctx: &mut BeforeContext<'_, R>) -> bool {
        true
    }

    /// Return `false` to veto the update.
    fn before_update(&self, ctx: &mut BeforeContext<'_, R>) -> bool {
        true
    }

    /// Return `false` to veto the creation or update.
    fn before_upsert(&self, ctx: &mut BeforeContext<'_, R>) -> bool {
        true
    }

    /// Return `false` to veto the deletion.
    fn before_delete(&self, ctx: &mut BeforeContext<'_, R>) -> bool {
        true
    }

    fn after_create(&self, ctx: &mut AfterContext<'_, R>) {}

    fn after_update(&self, ctx: &mut AfterContext<'_, R>) {}

    fn after_upsert(&self, ctx: &mut AfterContext<'_, R>) {}

    fn after_delete(&self, ctx: &mut AfterContext<'_, R>) {}
}

/// Detaches every hook a registration installed when passed back to
/// [`Dispatcher::unregister`].
#[derive(Debug)]
pub struct TriggerHandle {
    id: u64,
    kind: RecordKind,
}

/// Ordered trigger list for one record kind.
pub struct HookList<R> {
    entries: Vec<(u64, Rc<dyn RecordTrigger<R>>)>,
}

impl<R> Default for HookList<R> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<R> HookList<R> {
    fn register(&mut self, id: u64, trigger: Rc<dyn RecordTrigger<R>>) {
        self.entries.push((id, trigger));
    }

    fn unregister(&mut self, id: u64) {
        self.entries.retain(|(entry_id, _)| *entry_id != id);
    }

    /// Run before-hooks for `phase`. Returns `false` as soon as any hook
    /// vetoes; later hooks do not run.
    #[must_use]
    pub fn fire_before(&self, phase: TriggerPhase, ctx: &mut BeforeContext<'_, R>) -> bool {
        for (_, trigger) in &self.entries {
            let proceed = match phase {
                TriggerPhase::BeforeCreate => {
                    trigger.before_create(ctx) && trigger.before_upsert(ctx)
                }
                TriggerPhase::BeforeUpdate => {
                    trigger.before_update(ctx) && trigger.before_upsert(ctx)
                }
                TriggerPhase::BeforeDelete => trigger.before_delete(ctx),
                _ => true,
            };
            if !proceed {
                return false;
            }
        }
        true
    }

    /// Run after-hooks for `phase` in registration order.
    pub fn fire_after(&self, phase: TriggerPhase, ctx: &mut AfterContext<'_, R>) {
        for (_, trigger) in &self.entries {
            match phase {
                TriggerPhase::AfterCreate => {
                    trigger.after_create(ctx);
                    trigger.after_upsert(ctx);
                }
                TriggerPhase::AfterUpdate => {
                    trigger.after_update(ctx);
                    trigger.after_upsert(ctx);
                }
                TriggerPhase::AfterDelete => trigger.after_delete(ctx),
                _ => {}
            }
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The trigger dispatcher: one hook list per record kind.
#[derive(Default)]
pub struct Dispatcher {
    messages: HookList<MessageRecord>,
    templates: HookList<TemplateRecord>,
    next_id: u64,
}

impl Dispatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a message trigger; returns the detach handle.
    pub fn register_message(
        &mut self,
        trigger: Rc<dyn RecordTrigger<MessageRecord>>,
    ) -> TriggerHandle {
        let id = self.alloc_id();
        self.messages.register(id, trigger);
        TriggerHandle {
            id,
            kind: RecordKind::Message,
        }
    }

    /// Register a template trigger; returns the detach handle.
    pub fn register_template(
        &mut self,
        trigger: Rc<dyn RecordTrigger<TemplateRecord>>,
    ) -> TriggerHandle {
        let id = self.alloc_id();
        self.templates.register(id, trigger);
        TriggerHandle {
            id,
            kind: RecordKind::Template,
        }
    }

    /// Detach every hook the handle's registration installed.
    pub fn unregister(&mut self, handle: TriggerHandle) {
        match handle.kind {
            RecordKind::Message => self.messages.unregister(handle.id),
            RecordKind::Template => self.templates.unregister(handle.id),
        }
    }

    #[must_use]
    pub fn messages(&self) -> &HookList<MessageRecord> {
        &self.messages
    }

    #[must_use]
    pub fn templates(&self) -> &HookList<TemplateRecord> {
        &self.templates
    }

    fn alloc_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}
