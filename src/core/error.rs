//! Error taxonomy.
//!
//! Failures are split by boundary:
//! - `DiceError`: malformed dice expressions, reported to the immediate
//!   caller and never persisted.
//! - `StoreError`: document store failures (missing records, denied writes).
//! - `InteractionError`: structured router failures relayed back over the
//!   interaction protocol as `{success: false, errorType, errorMessage}`.

use thiserror::Error;

use super::uuid::Uuid;

/// Dice expression parse/validation failures.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum DiceError {
    #[error("invalid dice expression `{0}`")]
    InvalidExpression(String),

    #[error("unknown damage annotation `[{0}]`")]
    UnknownAnnotation(String),

    #[error("dice term `{0}` has no dice")]
    EmptyTerm(String),
}

/// Document store failures.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("record `{0}` not found")]
    NotFound(Uuid),

    #[error("record `{record}` has no field `{path}`")]
    UnknownField { record: Uuid, path: String },

    #[error("message `{0}` not found")]
    MessageNotFound(Uuid),

    #[error("template `{0}` not found")]
    TemplateNotFound(Uuid),
}

/// Severity of a router failure, mirrored on the wire as `errorType`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    /// Surfaced as a transient notice.
    Warn,
    /// Surfaced as a blocking notice.
    Error,
}

/// Structured failure raised by an action candidate.
///
/// Aborts the remaining candidates of the current dispatch; mutations the
/// failing candidate made to its working copy are discarded.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct InteractionError {
    pub kind: ErrorKind,
    pub message: String,
}

impl InteractionError {
    /// A warning-severity failure.
    #[must_use]
    pub fn warn(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Warn,
            message: message.into(),
        }
    }

    /// An error-severity failure.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Error,
            message: message.into(),
        }
    }
}

impl From<DiceError> for InteractionError {
    fn from(err: DiceError) -> Self {
        InteractionError::warn(err.to_string())
    }
}

impl From<StoreError> for InteractionError {
    fn from(err: StoreError) -> Self {
        InteractionError::error(err.to_string())
    }
}
