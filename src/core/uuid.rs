//! Stable record references.
//!
//! Every persisted record is addressed by a `Uuid`: an opaque, stable,
//! dot-separated reference string (e.g. `Scene.x7f.Token.a01`). The engine
//! never interprets the segments; it only passes them to the document store.

use serde::{Deserialize, Serialize};

/// Stable reference to a persisted record.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Uuid(String);

impl Uuid {
    /// Create a reference from its string form.
    #[must_use]
    pub fn new(uuid: impl Into<String>) -> Self {
        Self(uuid.into())
    }

    /// Get the raw reference string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Uuid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Uuid {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Identifier of a connected client process.
///
/// Clients observe the same document store; one of them may be elevated
/// (holding write capabilities the others lack) and act as arbiter for
/// delegated actions.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(String);

impl ClientId {
    /// Create a client id from its string form.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the raw id string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClientId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuid_roundtrip() {
        let uuid = Uuid::new("Scene.abc.Token.def");
        assert_eq!(uuid.as_str(), "Scene.abc.Token.def");
        assert_eq!(format!("{}", uuid), "Scene.abc.Token.def");

        let json = serde_json::to_string(&uuid).unwrap();
        assert_eq!(json, "\"Scene.abc.Token.def\"");
        let back: Uuid = serde_json::from_str(&json).unwrap();
        assert_eq!(back, uuid);
    }

    #[test]
    fn test_client_id_ordering() {
        let a = ClientId::new("user-a");
        let b = ClientId::new("user-b");
        assert!(a < b);
    }
}
