//! Action router.
//!
//! Parses wire action strings into typed commands, scans a registry of
//! handlers for candidates, arbitrates permissions per candidate, and runs
//! the surviving candidates over deep copies of the card. The decision to
//! execute locally or delegate to an elevated peer is the caller's
//! ([`crate::engine::CardEngine::interact`]); this module performs the
//! executing side.

mod command;
pub mod handlers;

pub use command::{Command, ModeShift, Selector};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cards::{Card, KeyPress};
use crate::core::{ClientId, DiceRng, ErrorKind, InteractionError, Uuid};
use crate::store::{Capability, DocumentStore, EntityUpdate};

/// Modifier keys captured with a click.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClickModifiers {
    #[serde(default)]
    pub alt: bool,
    #[serde(default)]
    pub ctrl: bool,
    #[serde(default)]
    pub meta: bool,
    #[serde(default)]
    pub shift: bool,
}

impl ClickModifiers {
    /// Shift held, nothing else of interest.
    #[must_use]
    pub fn shift() -> Self {
        Self {
            shift: true,
            ..Self::default()
        }
    }
}

/// The value carried by the interacted input element, if any.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl InputValue {
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            InputValue::Text(text) => Some(text),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            InputValue::Number(number) => Some(*number),
            _ => None,
        }
    }
}

/// A serialized interaction: everything an elevated peer needs to replay
/// the request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InteractionRequest {
    /// Wire form of the command.
    #[serde(rename = "actionString")]
    pub action: String,
    #[serde(rename = "userId")]
    pub user_id: ClientId,
    #[serde(rename = "clickModifiers", default)]
    pub click: ClickModifiers,
    #[serde(rename = "keyModifiers", default, skip_serializing_if = "Option::is_none")]
    pub key: Option<KeyPress>,
    #[serde(rename = "recordId")]
    pub message_id: Uuid,
    #[serde(rename = "inputValue", default, skip_serializing_if = "Option::is_none")]
    pub input: Option<InputValue>,
}

/// Protocol result of a dispatch: exactly success or failure, no partial
/// shape.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "WireResponse", into = "WireResponse")]
pub enum InteractionResponse {
    Success,
    Failure {
        kind: ErrorKind,
        message: String,
    },
}

impl InteractionResponse {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, InteractionResponse::Success)
    }
}

impl From<InteractionError> for InteractionResponse {
    fn from(err: InteractionError) -> Self {
        InteractionResponse::Failure {
            kind: err.kind,
            message: err.message,
        }
    }
}

#[derive(Serialize, Deserialize, Clone)]
struct WireResponse {
    success: bool,
    #[serde(rename = "errorType", default, skip_serializing_if = "Option::is_none")]
    error_type: Option<ErrorKind>,
    #[serde(rename = "errorMessage", default, skip_serializing_if = "Option::is_none")]
    error_message: Option<String>,
}

impl From<WireResponse> for InteractionResponse {
    fn from(wire: WireResponse) -> Self {
        if wire.success {
            InteractionResponse::Success
        } else {
            InteractionResponse::Failure {
                kind: wire.error_type.unwrap_or(ErrorKind::Error),
                message: wire.error_message.unwrap_or_default(),
            }
        }
    }
}

impl From<InteractionResponse> for WireResponse {
    fn from(response: InteractionResponse) -> Self {
        match response {
            InteractionResponse::Success => WireResponse {
                success: true,
                error_type: None,
                error_message: None,
            },
            InteractionResponse::Failure { kind, message } => WireResponse {
                success: false,
                error_type: Some(kind),
                error_message: Some(message),
            },
        }
    }
}

/// Capabilities a candidate demands before it may execute.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PermissionRequest {
    /// Requester must own this entity.
    pub owner_of: Option<Uuid>,

    /// Requester must be the card's author, or elevated.
    pub requires_authorship: bool,

    /// Requester must be elevated.
    pub elevated: bool,

    /// Execute in the requester's own process regardless of capabilities.
    pub run_local_only: bool,
}

/// Read-only context for permission checks.
pub struct PermissionCtx<'a> {
    pub command: &'a Command,
    pub card: &'a Card,
    pub message_id: &'a Uuid,
    pub user: &'a ClientId,
    pub store: &'a dyn DocumentStore,
}

/// Confirmation seam for the re-target prompt.
///
/// When the user's selection changed since targeting, a terminal attack
/// roll must first confirm the new target set. `None` cancels the roll.
pub trait TargetPrompt {
    fn confirm_targets(&mut self, current: &[Uuid], proposed: &[Uuid]) -> Option<Vec<Uuid>>;
}

/// Accepts every proposed retarget unchanged.
#[derive(Debug, Default)]
pub struct AutoConfirm;

impl TargetPrompt for AutoConfirm {
    fn confirm_targets(&mut self, _current: &[Uuid], proposed: &[Uuid]) -> Option<Vec<Uuid>> {
        Some(proposed.to_vec())
    }
}

/// Explicit mutation sentinel returned by handlers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mutation {
    Changed,
    Unchanged,
}

/// Execution context handed to a candidate.
///
/// `card` is the candidate's own deep copy; adopting it is gated on the
/// candidate returning [`Mutation::Changed`]. Store writes queue into
/// `updates` and are committed in one batch.
pub struct ActionCtx<'a> {
    pub card: &'a mut Card,
    pub message_id: &'a Uuid,
    pub user: ClientId,
    pub click: ClickModifiers,
    pub key: Option<KeyPress>,
    pub input: Option<InputValue>,
    /// The interacting user's currently selected entity references.
    pub selection: &'a [Uuid],
    pub store: &'a dyn DocumentStore,
    pub rng: &'a mut DiceRng,
    pub prompt: &'a mut dyn TargetPrompt,
    pub updates: &'a mut Vec<EntityUpdate>,
    /// Set when the candidate asks the UI to start template placement.
    pub template_preview: &'a mut Option<usize>,
}

type MatchFn = fn(&Command) -> bool;
type PermissionFn = Box<dyn Fn(&PermissionCtx<'_>) -> PermissionRequest>;
type ExecuteFn = Box<dyn Fn(&mut ActionCtx<'_>, &Command) -> Result<Mutation, InteractionError>>;

/// One registry entry.
pub struct ActionEntry {
    matches: MatchFn,
    permission: PermissionFn,
    execute: ExecuteFn,
}

impl ActionEntry {
    pub fn new(
        matches: MatchFn,
        permission: impl Fn(&PermissionCtx<'_>) -> PermissionRequest + 'static,
        execute: impl Fn(&mut ActionCtx<'_>, &Command) -> Result<Mutation, InteractionError> + 'static,
    ) -> Self {
        Self {
            matches,
            permission: Box::new(permission),
            execute: Box::new(execute),
        }
    }
}

/// Result of a permission scan over the registry.
#[derive(Debug, Default)]
pub struct ScanResult {
    /// Indices of entries that matched and passed their checks.
    pub candidates: Vec<usize>,
    /// Some matching entry failed its check for this requester.
    pub missing_permissions: bool,
    /// Some candidate insists on running in the requester's process.
    pub run_local_only: bool,
}

/// Everything [`ActionRouter::dispatch`] needs from the caller.
pub struct DispatchArgs<'a> {
    pub request: &'a InteractionRequest,
    /// Current card state; the dispatch works on copies of this.
    pub card: Card,
    pub store: &'a dyn DocumentStore,
    pub rng: &'a mut DiceRng,
    pub prompt: &'a mut dyn TargetPrompt,
    pub selection: &'a [Uuid],
}

/// What a dispatch produced. The caller commits `updates`, saves `card`
/// when present, and relays `response`.
pub struct DispatchOutput {
    pub response: InteractionResponse,
    /// Replacement card to persist (only when some candidate changed it).
    pub card: Option<Card>,
    pub updates: Vec<EntityUpdate>,
    pub template_preview: Option<usize>,
}

/// The handler registry. Entries are scanned in registration order; every
/// matching entry is a candidate.
#[derive(Default)]
pub struct ActionRouter {
    entries: Vec<ActionEntry>,
}

impl ActionRouter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A router preloaded with the built-in card actions.
    #[must_use]
    pub fn with_builtin() -> Self {
        let mut router = Self::new();
        handlers::register_builtin(&mut router);
        router
    }

    pub fn register(&mut self, entry: ActionEntry) {
        self.entries.push(entry);
    }

    /// Evaluate permissions for every matching entry.
    #[must_use]
    pub fn scan(&self, ctx: &PermissionCtx<'_>) -> ScanResult {
        let mut result = ScanResult::default();
        let user_elevated = ctx
            .store
            .user(ctx.user)
            .is_some_and(|u| u.elevated);

        for (index, entry) in self.entries.iter().enumerate() {
            if !(entry.matches)(ctx.command) {
                continue;
            }
            let request = (entry.permission)(ctx);
            if request.run_local_only {
                result.run_local_only = true;
            }
            if request.requires_authorship
                && !ctx.store.can_modify_message(ctx.message_id, ctx.user)
            {
                result.missing_permissions = true;
                continue;
            }
            if let Some(owner_of) = &request.owner_of {
                if !ctx
                    .store
                    .test_permission(owner_of, ctx.user, Capability::Owner)
                {
                    result.missing_permissions = true;
                    continue;
                }
            }
            if request.elevated && !user_elevated {
                result.missing_permissions = true;
                continue;
            }
            result.candidates.push(index);
        }
        result
    }

    /// Execute a request in this process (the requester's own, or the
    /// elevated peer's when delegated).
    ///
    /// Candidates run in order over deep copies of the card; a candidate's
    /// replacement becomes the next candidate's input, and a single save
    /// happens afterwards (the caller's job). A failing candidate aborts
    /// the remainder; entity updates queued by earlier candidates stay
    /// committed, mirroring the source system's behavior.
    #[must_use]
    pub fn dispatch(&self, args: DispatchArgs<'_>) -> DispatchOutput {
        let DispatchArgs {
            request,
            card,
            store,
            rng,
            prompt,
            selection,
        } = args;

        let mut output = DispatchOutput {
            response: InteractionResponse::Success,
            card: None,
            updates: Vec::new(),
            template_preview: None,
        };

        let Some(command) = Command::parse(&request.action) else {
            debug!(action = %request.action, "no actions found");
            output.response = InteractionResponse::Failure {
                kind: ErrorKind::Error,
                message: format!("unknown action `{}`", request.action),
            };
            return output;
        };

        let scan = self.scan(&PermissionCtx {
            command: &command,
            card: &card,
            message_id: &request.message_id,
            user: &request.user_id,
            store,
        });
        if scan.candidates.is_empty() {
            output.response = InteractionResponse::Failure {
                kind: ErrorKind::Error,
                message: format!(
                    "action `{}` on message `{}` for user `{}`: permissions are missing",
                    request.action, request.message_id, request.user_id
                ),
            };
            return output;
        }

        let mut latest = card;
        let mut changed = false;

        for index in scan.candidates {
            let mut working = latest.clone();
            let result = (self.entries[index].execute)(
                &mut ActionCtx {
                    card: &mut working,
                    message_id: &request.message_id,
                    user: request.user_id.clone(),
                    click: request.click,
                    key: request.key,
                    input: request.input.clone(),
                    selection,
                    store,
                    rng: &mut *rng,
                    prompt: &mut *prompt,
                    updates: &mut output.updates,
                    template_preview: &mut output.template_preview,
                },
                &command,
            );
            match result {
                Ok(Mutation::Changed) => {
                    latest = working;
                    changed = true;
                }
                Ok(Mutation::Unchanged) => {}
                Err(err) => {
                    warn!(action = %request.action, error = %err, "action candidate failed");
                    output.response = err.into();
                    return output;
                }
            }
        }

        if changed {
            output.card = Some(latest);
        }
        output
    }
}
