//! Lifecycle trigger dispatcher.
//!
//! Generic before/after hooks around create/update/delete of persisted
//! records, keyed by an explicit `(RecordKind, TriggerPhase)` pair with
//! typed payloads per kind. Before-hooks can veto an operation; after-hooks
//! can schedule deferred end-of-context writes.

mod registry;

pub use registry::{
    AfterContext, BeforeContext, DeferredOp, Dispatcher, EngineOps, HookList, RecordKind,
    RecordTrigger, RowChange, TriggerHandle, TriggerOptions, TriggerPhase,
};
