//! # vtt-cards
//!
//! A replicated action-card resolution engine for virtual tabletops.
//!
//! One "action use" (an attack, save, damage roll, area effect, resource
//! expenditure) becomes a persisted, multi-phase **card** that many
//! independently running clients observe and mutate concurrently, with one
//! elevated client arbitrating when a requester lacks write authority.
//!
//! ## Architecture
//!
//! - **Triggers**: lifecycle hooks around every record write; before-hooks
//!   veto and derive, after-hooks reconcile side effects via deferred
//!   end-of-context callbacks.
//! - **Router**: wire action strings parsed once into typed commands,
//!   per-candidate permission arbitration, local-vs-delegated execution.
//! - **Resolution**: idempotent recomputation of per-target outcomes and
//!   per-entity damage aggregates from the card's items alone.
//! - **Last write wins**: there is no optimistic-concurrency guard and no
//!   signal when a delegated call never completes; both are inherited
//!   limitations of the replication model, documented where they bite.
//!
//! ## Modules
//!
//! - `core`: references, damage taxonomy, errors, deterministic dice RNG
//! - `dice`: formula model, parser, evaluation, advantage/critical
//!   re-derivation
//! - `cards`: the persisted card payload and the roll phase machine
//! - `store`: the entity-resolver/persistence seam and its in-memory
//!   reference implementation
//! - `triggers`: the lifecycle trigger dispatcher
//! - `resolution`: the damage & save pipeline
//! - `resources`: the consumption ledger
//! - `effects`: the origin-keyed active-effect applicator
//! - `targeting`: manual selection and area templates
//! - `router`: typed commands, permission checks, dispatch
//! - `engine`: per-client assembly of all of the above

pub mod cards;
pub mod core;
pub mod dice;
pub mod effects;
pub mod engine;
pub mod resolution;
pub mod resources;
pub mod router;
pub mod store;
pub mod targeting;
pub mod triggers;

// Re-export commonly used types
pub use crate::core::{
    ClientId, DamageType, DiceError, DiceRng, DiceRngState, ErrorKind, InteractionError,
    StoreError, Uuid,
};

pub use crate::dice::{
    critical_bonus, set_roll_mode, DamageMode, DiceExpression, DiceTerm, DieResult, EvaluatedRoll,
    EvaluatedTerm, Keep, RollMode, Term,
};

pub use crate::cards::{
    AggregateDamage, AttackRoll, AutoconsumeAfter, Card, CardCalc, CheckDef, ConsumeAction,
    ConsumeResource, DamageRoll, EffectTemplate, HpSnapshot, Item, ItemCalc, ItemCategory,
    KeyPress, RollPhase, SaveModifierRule, Target, TargetAggregate, TargetCheck,
    TargetDefinition, TargetKind,
};

pub use crate::store::{
    AppliedEffect, Capability, Disposition, DocumentStore, EffectChange, EntityPatch,
    EntityRecord, EntityTraits, EntityUpdate, MemoryStore, MessageRecord, NewEffect, OriginKey,
    SharedStore, TemplateRecord, UserInfo,
};

pub use crate::triggers::{
    AfterContext, BeforeContext, Dispatcher, EngineOps, RecordKind, RecordTrigger, RowChange,
    TriggerHandle, TriggerPhase,
};

pub use crate::resolution::{apply_damage, recompute, undo_damage, TargetSelector};

pub use crate::targeting::{Point, TemplateAnchor, TemplateShape};

pub use crate::router::{
    ActionRouter, ClickModifiers, Command, InputValue, InteractionRequest, InteractionResponse,
    Mutation, TargetPrompt,
};

pub use crate::engine::{
    CardEngine, ConsumeDefinition, DamageDefinition, DelegateTransport, ItemDefinition,
    NoTransport,
};
