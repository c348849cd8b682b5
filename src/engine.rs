//! One client's engine: store access, lifecycle triggers, action routing
//! and delegation, assembled per process.
//!
//! Every persisted write funnels through the engine so the trigger
//! dispatcher can veto it, derive state before commit, and run deferred
//! side effects afterwards. Interaction requests route through the action
//! router; requests the local client lacks capabilities for are relayed to
//! one deterministically chosen elevated peer.

use std::collections::VecDeque;
use std::rc::Rc;

use tracing::{debug, warn};

use crate::cards::{
    AttackRoll, AutoconsumeAfter, Card, CheckDef, ConsumeResource, DamageRoll, EffectTemplate,
    Item, ItemCalc, ItemCategory, KeyPress, SaveModifierRule, TargetDefinition, TargetKind,
};
use crate::core::{ClientId, DiceError, DiceRng, InteractionError, Uuid};
use crate::dice::{DamageMode, DiceExpression};
use crate::effects::sync_active_effects;
use crate::resolution::{group_updates, recompute};
use crate::resources;
use crate::router::{
    ActionRouter, AutoConfirm, ClickModifiers, Command, DispatchArgs, InputValue,
    InteractionRequest, InteractionResponse, PermissionCtx, TargetPrompt,
};
use crate::store::{DocumentStore, EntityUpdate, MessageRecord, TemplateRecord};
use crate::targeting;
use crate::triggers::{
    AfterContext, BeforeContext, DeferredOp, Dispatcher, EngineOps, RecordTrigger, RowChange,
    TriggerOptions, TriggerPhase,
};

/// Transport seam for delegated interactions.
///
/// `None` means the peer never received or never answered the request.
/// There is no timeout primitive: a request that never reaches a peer
/// simply never completes.
pub trait DelegateTransport {
    fn relay(
        &mut self,
        peer: &ClientId,
        request: &InteractionRequest,
    ) -> Option<InteractionResponse>;
}

/// A transport with nobody on the other end.
#[derive(Debug, Default)]
pub struct NoTransport;

impl DelegateTransport for NoTransport {
    fn relay(
        &mut self,
        _peer: &ClientId,
        _request: &InteractionRequest,
    ) -> Option<InteractionResponse> {
        None
    }
}

/// Source definition of one damage entry.
#[derive(Clone, Debug)]
pub struct DamageDefinition {
    pub formula: String,
    pub label: Option<String>,
    /// Extra formula applied once per level above the item's base level.
    pub upcast: Option<String>,
}

/// Source definition of one resource deduction.
#[derive(Clone, Debug)]
pub struct ConsumeDefinition {
    pub uuid: Uuid,
    pub path: String,
    pub amount: i64,
    /// `None` picks the default trigger for the item's shape.
    pub autoconsume_after: Option<AutoconsumeAfter>,
}

/// Everything needed to turn an authored item into a card sub-action.
#[derive(Clone, Debug)]
pub struct ItemDefinition {
    pub uuid: Uuid,
    pub name: String,
    pub img: Option<String>,
    pub category: ItemCategory,
    pub level: Option<u8>,
    /// Attack bonus formula (modifier, proficiency, item bonus).
    pub attack_bonus: Option<String>,
    pub damages: Vec<DamageDefinition>,
    pub check: Option<CheckDef>,
    pub target: TargetDefinition,
    pub consumes: Vec<ConsumeDefinition>,
    pub effects: Vec<EffectTemplate>,
    /// Spells cast at a tier consume a level-indexed slot.
    pub requires_slot: bool,
}

impl ItemDefinition {
    #[must_use]
    pub fn new(uuid: Uuid, name: impl Into<String>) -> Self {
        Self {
            uuid,
            name: name.into(),
            img: None,
            category: ItemCategory::Other,
            level: None,
            attack_bonus: None,
            damages: Vec::new(),
            check: None,
            target: TargetDefinition::default(),
            consumes: Vec::new(),
            effects: Vec::new(),
            requires_slot: false,
        }
    }
}

/// One client's engine instance.
pub struct CardEngine<S: DocumentStore> {
    client_id: ClientId,
    store: S,
    dispatcher: Dispatcher,
    router: ActionRouter,
    rng: DiceRng,
    prompt: Box<dyn TargetPrompt>,
    transport: Box<dyn DelegateTransport>,
    /// The user's currently selected entity references.
    selection: Vec<Uuid>,
    /// Deferred end-of-context callbacks, drained when the outermost
    /// operation finishes.
    deferred: VecDeque<DeferredOp>,
    depth: u32,
    /// Item index a dispatch asked the UI to start template placement for.
    pending_template_preview: Option<(Uuid, usize)>,
    /// Target set the engine wants broadcast to other clients.
    pending_target_broadcast: Option<Vec<Uuid>>,
}

impl<S: DocumentStore> CardEngine<S> {
    /// Build an engine with the built-in triggers and actions registered.
    #[must_use]
    pub fn new(client_id: ClientId, store: S, seed: u64) -> Self {
        let mut dispatcher = Dispatcher::new();
        dispatcher.register_message(Rc::new(CardResolutionTrigger));
        dispatcher.register_template(Rc::new(TemplateTrigger));

        Self {
            client_id,
            store,
            dispatcher,
            router: ActionRouter::with_builtin(),
            rng: DiceRng::new(seed),
            prompt: Box::new(AutoConfirm),
            transport: Box::new(NoTransport),
            selection: Vec::new(),
            deferred: VecDeque::new(),
            depth: 0,
            pending_template_preview: None,
            pending_target_broadcast: None,
        }
    }

    /// Replace the re-target confirmation seam.
    pub fn set_prompt(&mut self, prompt: Box<dyn TargetPrompt>) {
        self.prompt = prompt;
    }

    /// Replace the delegation transport.
    pub fn set_transport(&mut self, transport: Box<dyn DelegateTransport>) {
        self.transport = transport;
    }

    /// Update the user's current selection of entities.
    pub fn set_selection(&mut self, selection: Vec<Uuid>) {
        self.selection = selection;
    }

    #[must_use]
    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    /// The trigger dispatcher, for registering further lifecycle hooks.
    pub fn dispatcher_mut(&mut self) -> &mut Dispatcher {
        &mut self.dispatcher
    }

    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// The card currently persisted on a message.
    #[must_use]
    pub fn card(&self, message_id: &Uuid) -> Option<Card> {
        self.store
            .message(message_id)
            .as_ref()
            .and_then(Card::from_message)
    }

    /// Take the pending template-placement request, if a dispatch produced
    /// one for the UI layer.
    pub fn take_template_preview(&mut self) -> Option<(Uuid, usize)> {
        self.pending_template_preview.take()
    }

    /// Take the pending target-set broadcast, if template retargeting
    /// produced one.
    pub fn take_target_broadcast(&mut self) -> Option<Vec<Uuid>> {
        self.pending_target_broadcast.take()
    }

    // --- lifecycle operations -------------------------------------------

    /// Create a message record. Returns `false` when a before-hook vetoed.
    pub fn create_message(&mut self, record: MessageRecord) -> bool {
        self.message_op(TriggerPhase::BeforeCreate, TriggerPhase::AfterCreate, record, None)
    }

    /// Update a message record. Returns `false` when vetoed or missing.
    pub fn update_message(&mut self, record: MessageRecord) -> bool {
        let Some(old) = self.store.message(&record.id) else {
            warn!(message = %record.id, "update for unknown message");
            return false;
        };
        self.message_op(
            TriggerPhase::BeforeUpdate,
            TriggerPhase::AfterUpdate,
            record,
            Some(old),
        )
    }

    /// Delete a message record. Returns `false` when vetoed or missing.
    pub fn delete_message_record(&mut self, message_id: &Uuid) -> bool {
        let Some(record) = self.store.message(message_id) else {
            return false;
        };
        let actor = self.client_id.clone();
        let options = TriggerOptions::default();
        let mut rows = vec![RowChange {
            new: record,
            old: None,
        }];

        self.depth += 1;
        let proceed = self.dispatcher.messages().fire_before(
            TriggerPhase::BeforeDelete,
            &mut BeforeContext {
                rows: &mut rows,
                options: &options,
                actor: &actor,
                store: &self.store,
            },
        );
        if !proceed {
            self.depth -= 1;
            return false;
        }
        self.store.remove_message(message_id);
        let mut staged: Vec<DeferredOp> = Vec::new();
        self.dispatcher.messages().fire_after(
            TriggerPhase::AfterDelete,
            &mut AfterContext {
                rows: &rows,
                options: &options,
                actor: &actor,
                local_client: &self.client_id,
                store: &self.store,
                deferred: &mut staged,
            },
        );
        self.deferred.extend(staged);
        self.depth -= 1;
        self.drain_deferred();
        true
    }

    fn message_op(
        &mut self,
        before: TriggerPhase,
        after: TriggerPhase,
        record: MessageRecord,
        old: Option<MessageRecord>,
    ) -> bool {
        self.message_op_as(before, after, record, old, self.client_id.clone())
    }

    fn message_op_as(
        &mut self,
        before: TriggerPhase,
        after: TriggerPhase,
        record: MessageRecord,
        old: Option<MessageRecord>,
        actor: ClientId,
    ) -> bool {
        let options = TriggerOptions::default();
        let mut rows = vec![RowChange { new: record, old }];

        self.depth += 1;
        let proceed = self.dispatcher.messages().fire_before(
            before,
            &mut BeforeContext {
                rows: &mut rows,
                options: &options,
                actor: &actor,
                store: &self.store,
            },
        );
        if !proceed {
            self.depth -= 1;
            self.drain_deferred();
            return false;
        }

        self.store.put_message(rows[0].new.clone());
        let mut staged: Vec<DeferredOp> = Vec::new();
        self.dispatcher.messages().fire_after(
            after,
            &mut AfterContext {
                rows: &rows,
                options: &options,
                actor: &actor,
                local_client: &self.client_id,
                store: &self.store,
                deferred: &mut staged,
            },
        );
        self.deferred.extend(staged);
        self.depth -= 1;
        self.drain_deferred();
        true
    }

    /// Create a template record (placement finished on the canvas).
    pub fn create_template(&mut self, record: TemplateRecord) -> bool {
        self.template_op(TriggerPhase::BeforeCreate, TriggerPhase::AfterCreate, record, None)
    }

    /// Move or reshape a placed template.
    pub fn update_template(&mut self, record: TemplateRecord) -> bool {
        let Some(old) = self.store.template(&record.id) else {
            warn!(template = %record.id, "update for unknown template");
            return false;
        };
        self.template_op(
            TriggerPhase::BeforeUpdate,
            TriggerPhase::AfterUpdate,
            record,
            Some(old),
        )
    }

    /// Delete a template record.
    pub fn delete_template_record(&mut self, template_id: &Uuid) -> bool {
        let Some(record) = self.store.template(template_id) else {
            return false;
        };
        let actor = self.client_id.clone();
        let options = TriggerOptions::default();
        let mut rows = vec![RowChange {
            new: record,
            old: None,
        }];

        self.depth += 1;
        let proceed = self.dispatcher.templates().fire_before(
            TriggerPhase::BeforeDelete,
            &mut BeforeContext {
                rows: &mut rows,
                options: &options,
                actor: &actor,
                store: &self.store,
            },
        );
        if !proceed {
            self.depth -= 1;
            return false;
        }
        self.store.remove_template(template_id);
        let mut staged: Vec<DeferredOp> = Vec::new();
        self.dispatcher.templates().fire_after(
            TriggerPhase::AfterDelete,
            &mut AfterContext {
                rows: &rows,
                options: &options,
                actor: &actor,
                local_client: &self.client_id,
                store: &self.store,
                deferred: &mut staged,
            },
        );
        self.deferred.extend(staged);
        self.depth -= 1;
        self.drain_deferred();
        true
    }

    fn template_op(
        &mut self,
        before: TriggerPhase,
        after: TriggerPhase,
        record: TemplateRecord,
        old: Option<TemplateRecord>,
    ) -> bool {
        let actor = self.client_id.clone();
        let options = TriggerOptions::default();
        let mut rows = vec![RowChange { new: record, old }];

        self.depth += 1;
        let proceed = self.dispatcher.templates().fire_before(
            before,
            &mut BeforeContext {
                rows: &mut rows,
                options: &options,
                actor: &actor,
                store: &self.store,
            },
        );
        if !proceed {
            self.depth -= 1;
            return false;
        }
        self.store.put_template(rows[0].new.clone());
        let mut staged: Vec<DeferredOp> = Vec::new();
        self.dispatcher.templates().fire_after(
            after,
            &mut AfterContext {
                rows: &rows,
                options: &options,
                actor: &actor,
                local_client: &self.client_id,
                store: &self.store,
                deferred: &mut staged,
            },
        );
        self.deferred.extend(staged);
        self.depth -= 1;
        self.drain_deferred();
        true
    }

    fn drain_deferred(&mut self) {
        if self.depth > 0 {
            return;
        }
        while let Some(op) = self.deferred.pop_front() {
            op(self);
        }
    }

    // --- card creation ---------------------------------------------------

    /// Resolve an action use into a new card message.
    ///
    /// Returns the message id, or `None` when a before-hook vetoed the
    /// creation.
    pub fn use_items(
        &mut self,
        message_id: Uuid,
        actor: Option<Uuid>,
        token: Option<Uuid>,
        definitions: Vec<ItemDefinition>,
    ) -> Result<Option<Uuid>, DiceError> {
        let mut card = Card::new(self.client_id.clone());
        card.actor = actor.clone();
        card.token = token.clone();

        for definition in definitions {
            let item = self.build_item(&actor, &token, definition)?;
            card.items.push(item);
        }

        let mut record = MessageRecord::new(message_id.clone(), self.client_id.clone());
        card.write_to(&mut record);
        if self.create_message(record) {
            Ok(Some(message_id))
        } else {
            Ok(None)
        }
    }

    fn build_item(
        &mut self,
        actor: &Option<Uuid>,
        token: &Option<Uuid>,
        definition: ItemDefinition,
    ) -> Result<Item, DiceError> {
        let level = definition.level;
        let has_check = definition.check.is_some();
        let has_aoe = definition.target.has_aoe();

        let attack = definition
            .attack_bonus
            .as_deref()
            .map(DiceExpression::parse)
            .transpose()?
            .map(|bonus| AttackRoll::new(Some(bonus)));

        let mut damages = Vec::with_capacity(definition.damages.len());
        for source in &definition.damages {
            let mut damage = DamageRoll::new(DiceExpression::parse(&source.formula)?);
            damage.upcast = source
                .upcast
                .as_deref()
                .map(DiceExpression::parse)
                .transpose()?;
            damage.label = source.label.clone();
            if damage.label.is_none() {
                let all_restoration = damage
                    .base
                    .first_damage_type()
                    .is_some_and(|t| t.is_healing() || t.is_temp_hp());
                if all_restoration {
                    damage.label = Some("Healing".to_string());
                }
            }
            if has_check {
                damage.modifier_rule = Some(SaveModifierRule::SaveHalveDmg);
            }
            damages.push(damage);
        }

        // Default trigger: the furthest milestone along the item's flow.
        let default_trigger = if attack.is_some() {
            AutoconsumeAfter::Attack
        } else if !damages.is_empty() {
            AutoconsumeAfter::Damage
        } else if has_aoe {
            AutoconsumeAfter::TemplatePlaced
        } else if has_check {
            AutoconsumeAfter::Check
        } else {
            AutoconsumeAfter::Init
        };

        let mut consume_resources = Vec::new();
        if definition.requires_slot {
            if let (ItemCategory::Spell, Some(level @ 1..), Some(actor)) =
                (definition.category, level, actor)
            {
                let path = resources::slot_path(level);
                let original = self
                    .store
                    .entity(actor)
                    .and_then(|e| e.field(&path))
                    .unwrap_or(0);
                consume_resources.push(ConsumeResource {
                    uuid: actor.clone(),
                    path,
                    amount: 1,
                    original,
                    autoconsume_after: default_trigger,
                    action: None,
                    applied: false,
                    slot_scaled: true,
                });
            }
        }
        for consume in &definition.consumes {
            let original = self
                .store
                .entity(&consume.uuid)
                .and_then(|e| e.field(&consume.path))
                .unwrap_or(0);
            consume_resources.push(ConsumeResource {
                uuid: consume.uuid.clone(),
                path: consume.path.clone(),
                amount: consume.amount,
                original,
                autoconsume_after: consume.autoconsume_after.unwrap_or(default_trigger),
                action: None,
                applied: false,
                slot_scaled: false,
            });
        }

        let mut item = Item {
            uuid: definition.uuid,
            name: definition.name,
            img: definition.img,
            category: definition.category,
            base_level: level,
            selected_level: level,
            attack,
            damages,
            check: definition.check,
            targets: None,
            target_definition: definition.target,
            consume_resources,
            calc: ItemCalc {
                effect_templates: definition.effects,
                ..ItemCalc::default()
            },
        };

        // Initial targets per the item's kind.
        match item.target_definition.kind {
            TargetKind::None => {}
            TargetKind::SelfOnly => {
                if let Some(token) = token {
                    targeting::set_targets(&mut item, std::slice::from_ref(token), &self.store);
                }
            }
            _ => {
                if !self.selection.is_empty() {
                    let selection = self.selection.clone();
                    targeting::set_targets(&mut item, &selection, &self.store);
                }
            }
        }

        Ok(item)
    }

    // --- interaction routing --------------------------------------------

    /// Entry point for a user interaction: parse, check permissions,
    /// execute locally or delegate to an elevated peer.
    ///
    /// `None` means the interaction was dropped: missing permissions, no
    /// matching action, or an unreachable delegate. There is no signal
    /// beyond the logged warning when a delegated call never completes.
    pub fn interact(
        &mut self,
        message_id: &Uuid,
        action: &str,
        click: ClickModifiers,
        key: Option<KeyPress>,
        input: Option<InputValue>,
    ) -> Option<InteractionResponse> {
        let Some(message) = self.store.message(message_id) else {
            warn!(%message_id, "interaction on unknown message");
            return None;
        };
        let Some(card) = Card::from_message(&message) else {
            warn!(%message_id, "interaction on a message with no card data");
            return None;
        };
        let Some(command) = Command::parse(action) else {
            debug!(action, "no actions found");
            return None;
        };

        let scan = self.router.scan(&PermissionCtx {
            command: &command,
            card: &card,
            message_id,
            user: &self.client_id,
            store: &self.store,
        });
        if scan.missing_permissions {
            warn!(
                action,
                %message_id,
                "interaction blocked: permissions are missing"
            );
            return None;
        }
        if scan.candidates.is_empty() {
            debug!(action, "no actions found");
            return None;
        }

        let request = InteractionRequest {
            action: action.to_string(),
            user_id: self.client_id.clone(),
            click,
            key,
            message_id: message_id.clone(),
            input,
        };

        if scan.run_local_only || self.store.can_modify_message(message_id, &self.client_id) {
            return Some(self.process_interaction(&request));
        }

        // Delegate: lowest id among the currently active elevated peers,
        // so every client picks the same arbiter.
        let mut eligible: Vec<ClientId> = self
            .store
            .users()
            .into_iter()
            .filter(|u| u.active && u.elevated)
            .map(|u| u.id)
            .collect();
        eligible.sort();
        let Some(peer) = eligible.first().cloned() else {
            warn!(action, %message_id, "no elevated peer reachable; interaction dropped");
            return None;
        };
        match self.transport.relay(&peer, &request) {
            Some(response) => Some(response),
            None => {
                warn!(action, %peer, "delegated interaction never completed");
                None
            }
        }
    }

    /// Executing side of an interaction (local or relayed-in).
    pub fn process_interaction(&mut self, request: &InteractionRequest) -> InteractionResponse {
        let Some(message) = self.store.message(&request.message_id) else {
            return InteractionError::warn(format!(
                "no card data found for message `{}`",
                request.message_id
            ))
            .into();
        };
        let Some(card) = Card::from_message(&message) else {
            return InteractionError::warn(format!(
                "no card data found for message `{}`",
                request.message_id
            ))
            .into();
        };

        let output = self.router.dispatch(DispatchArgs {
            request,
            card,
            store: &self.store,
            rng: &mut self.rng,
            prompt: &mut *self.prompt,
            selection: &self.selection,
        });

        if let Some(item_index) = output.template_preview {
            self.pending_template_preview = Some((request.message_id.clone(), item_index));
        }
        if !output.updates.is_empty() {
            let grouped = group_updates(output.updates);
            if let Err(err) = self.store.bulk_update(&grouped) {
                warn!(error = %err, "entity updates failed");
            }
        }
        if let Some(card) = output.card {
            // The write is this client's, whoever requested it; lifecycle
            // hooks see the executing client as the change's author.
            CardEngine::save_card(self, &request.message_id, card);
        }
        output.response
    }

    /// Persist a card payload; the update runs through the trigger
    /// dispatcher like any other write.
    pub fn save_card(&mut self, message_id: &Uuid, card: Card) -> bool {
        let Some(old) = self.store.message(message_id) else {
            warn!(%message_id, "card save for unknown message");
            return false;
        };
        let mut record = old.clone();
        card.write_to(&mut record);
        self.message_op(
            TriggerPhase::BeforeUpdate,
            TriggerPhase::AfterUpdate,
            record,
            Some(old),
        )
    }

    /// Replay another client's committed write through the local hooks,
    /// as the replication channel would. After-hooks see a non-local
    /// change and skip the exactly-once side effects.
    pub fn observe_remote_update(&mut self, record: MessageRecord, actor: ClientId) -> bool {
        let old = self.store.message(&record.id);
        self.message_op_as(
            TriggerPhase::BeforeUpdate,
            TriggerPhase::AfterUpdate,
            record,
            old,
            actor,
        )
    }
}

impl<S: DocumentStore> EngineOps for CardEngine<S> {
    fn save_card(&mut self, message_id: &Uuid, card: Card) {
        if !CardEngine::save_card(self, message_id, card) {
            warn!(%message_id, "deferred card save was rejected");
        }
    }

    fn delete_message(&mut self, message_id: &Uuid) {
        if !self.delete_message_record(message_id) {
            debug!(%message_id, "deferred message delete: nothing to do");
        }
    }

    fn delete_template(&mut self, template_id: &Uuid) {
        if !self.delete_template_record(template_id) {
            debug!(%template_id, "deferred template delete: nothing to do");
        }
    }

    fn apply_updates(&mut self, updates: Vec<EntityUpdate>) {
        let grouped = group_updates(updates);
        if let Err(err) = self.store.bulk_update(&grouped) {
            warn!(error = %err, "deferred entity updates failed");
        }
    }

    fn broadcast_targets(&mut self, targets: Vec<Uuid>) {
        self.pending_target_broadcast = Some(targets);
    }
}

// --- built-in triggers ---------------------------------------------------

/// Recomputes derived card state before every commit and reconciles
/// external side effects (active effects, resource consumption) after.
struct CardResolutionTrigger;

impl RecordTrigger<MessageRecord> for CardResolutionTrigger {
    fn before_upsert(&self, ctx: &mut BeforeContext<'_, MessageRecord>) -> bool {
        for row in ctx.rows.iter_mut() {
            let Some(mut card) = Card::from_message(&row.new) else {
                continue;
            };
            for item in &mut card.items {
                item.calc.can_change_targets = targeting::can_change_targets(item);
                item.calc.can_change_level = resources::can_change_level(item);
                resources::derive_applied_flags(item);
                let upcast_levels = item.upcast_levels();
                for damage in &mut item.damages {
                    derive_damage_display(damage, upcast_levels);
                }
            }
            recompute(&mut card);
            card.write_to(&mut row.new);
        }
        true
    }

    fn after_upsert(&self, ctx: &mut AfterContext<'_, MessageRecord>) {
        // Only the initiating client reconciles; every other observer
        // would duplicate the work.
        if !ctx.is_local_change() {
            return;
        }
        for row in ctx.rows {
            let Some(mut card) = Card::from_message(&row.new) else {
                continue;
            };
            let before = card.clone();
            let message_id = row.new.id.clone();

            let mut updates = sync_active_effects(&message_id, &mut card, ctx.store);
            updates.extend(resources::sync(&mut card));

            if updates.is_empty() && card == before {
                continue;
            }
            ctx.defer(move |ops| {
                if !updates.is_empty() {
                    ops.apply_updates(updates);
                }
                ops.save_card(&message_id, card);
            });
        }
    }
}

/// Cache the display formula / type list of the roll the current mode
/// presents.
fn derive_damage_display(damage: &mut DamageRoll, upcast_levels: u32) {
    let expression = match (&damage.mode, &damage.normal, &damage.critical) {
        (DamageMode::Critical, _, Some(roll)) => roll.expression(),
        (DamageMode::Normal, Some(roll), _) => roll.expression(),
        _ => damage.expression(upcast_levels),
    };

    let mut types: Vec<&'static str> = expression
        .terms
        .iter()
        .filter_map(|t| t.damage_type())
        .map(|t| t.annotation())
        .collect();
    types.sort_unstable();
    types.dedup();

    let mut stripped = expression.clone();
    for term in &mut stripped.terms {
        match term {
            crate::dice::Term::Dice(dice) => dice.damage_type = None,
            crate::dice::Term::Constant { damage_type, .. } => *damage_type = None,
        }
    }

    damage.calc.display_formula = Some(stripped.to_string());
    damage.calc.display_damage_types = if types.is_empty() {
        None
    } else {
        Some(format!("({})", types.join(", ")))
    };
}

/// Tracks templates back to their card: binds freshly placed templates,
/// retargets on move, cascades deletion.
struct TemplateTrigger;

impl TemplateTrigger {
    /// Exactly one client applies a template change. The changing client
    /// wins when it can write the message; otherwise every client elects
    /// the same peer: the lowest active one with write access.
    fn elected_for(
        ctx: &AfterContext<'_, TemplateRecord>,
        message_id: &Uuid,
    ) -> bool {
        if ctx.store.can_modify_message(message_id, ctx.actor) {
            return ctx.is_local_change();
        }
        let mut eligible: Vec<ClientId> = ctx
            .store
            .users()
            .into_iter()
            .filter(|u| u.active && ctx.store.can_modify_message(message_id, &u.id))
            .map(|u| u.id)
            .collect();
        eligible.sort();
        eligible.first() == Some(ctx.local_client)
    }
}

impl RecordTrigger<TemplateRecord> for TemplateTrigger {
    fn after_upsert(&self, ctx: &mut AfterContext<'_, TemplateRecord>) {
        for row in ctx.rows {
            let template = &row.new;
            let (Some(message_id), Some(item_index)) =
                (template.bound_message.clone(), template.bound_item)
            else {
                continue;
            };
            if !Self::elected_for(ctx, &message_id) {
                continue;
            }
            let Some(message) = ctx.store.message(&message_id) else {
                continue;
            };
            let Some(mut card) = Card::from_message(&message) else {
                continue;
            };
            let Some(item) = card.items.get_mut(item_index) else {
                continue;
            };

            // A replacement template retires the one bound before it.
            let mut replaced: Option<Uuid> = None;
            if item.target_definition.created_template.as_ref() != Some(&template.id) {
                replaced = item.target_definition.created_template.take();
                item.target_definition.created_template = Some(template.id.clone());
            }

            let moved = row
                .old
                .as_ref()
                .is_none_or(|old| old.origin != template.origin
                    || old.direction_deg != template.direction_deg);
            let mut retargeted = false;
            if moved && targeting::can_change_targets(item) {
                let uuids = targeting::targets_from_template(
                    template,
                    item.target_definition.kind,
                    ctx.store,
                );
                targeting::set_targets(item, &uuids, ctx.store);
                retargeted = true;
            }

            if replaced.is_none() && !retargeted {
                continue;
            }
            let broadcast: Vec<Uuid> = card.items[item_index]
                .targets
                .iter()
                .flatten()
                .map(|t| t.uuid.clone())
                .collect();
            ctx.defer(move |ops| {
                // Save before retiring the replaced template: its delete
                // hook checks the persisted binding for cascade cleanup.
                ops.save_card(&message_id, card);
                if let Some(old_template) = &replaced {
                    ops.delete_template(old_template);
                }
                if retargeted {
                    ops.broadcast_targets(broadcast);
                }
            });
        }
    }

    fn after_delete(&self, ctx: &mut AfterContext<'_, TemplateRecord>) {
        for row in ctx.rows {
            let template = &row.new;
            let (Some(message_id), Some(item_index)) =
                (template.bound_message.clone(), template.bound_item)
            else {
                continue;
            };
            if !Self::elected_for(ctx, &message_id) {
                continue;
            }
            let Some(message) = ctx.store.message(&message_id) else {
                continue;
            };
            let still_bound = Card::from_message(&message)
                .and_then(|card| {
                    card.items
                        .get(item_index)
                        .map(|i| i.target_definition.created_template == Some(template.id.clone()))
                })
                .unwrap_or(false);
            if !still_bound {
                continue;
            }
            // The card's area anchor is gone: the card record goes with it.
            ctx.defer(move |ops| ops.delete_message(&message_id));
        }
    }
}
