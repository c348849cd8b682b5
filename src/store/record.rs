//! Generic persisted records the engine reads and mutates.

use serde::{Deserialize, Serialize};

use crate::core::{ClientId, Uuid};
use crate::targeting::{Point, TemplateShape};

/// A generic message record: the host for one card payload.
///
/// The card itself lives as a JSON blob under a module-scoped flag key;
/// everything else about the message belongs to the host platform.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: Uuid,
    pub author: ClientId,
    #[serde(default)]
    pub flags: serde_json::Map<String, serde_json::Value>,
}

impl MessageRecord {
    #[must_use]
    pub fn new(id: Uuid, author: ClientId) -> Self {
        Self {
            id,
            author,
            flags: serde_json::Map::new(),
        }
    }

    /// Read a flag under `scope.key`. Unknown scopes and keys are absent,
    /// never errors.
    #[must_use]
    pub fn flag(&self, scope: &str, key: &str) -> Option<&serde_json::Value> {
        self.flags.get(scope)?.as_object()?.get(key)
    }

    /// Write a flag under `scope.key`.
    pub fn set_flag(&mut self, scope: &str, key: &str, value: serde_json::Value) {
        let scoped = self
            .flags
            .entry(scope.to_string())
            .or_insert_with(|| serde_json::Value::Object(serde_json::Map::new()));
        if let Some(map) = scoped.as_object_mut() {
            map.insert(key.to_string(), value);
        }
    }
}

/// A placed area template record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TemplateRecord {
    pub id: Uuid,
    pub origin: Point,
    /// Facing in degrees, counter-clockwise from +x.
    #[serde(default)]
    pub direction_deg: f64,
    pub shape: TemplateShape,

    /// The entity the template is anchored to, used for disposition
    /// filtering of ally/enemy target kinds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor_entity: Option<Uuid>,

    /// Message and item index this template reports back to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bound_message: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bound_item: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_roundtrip() {
        let mut message = MessageRecord::new(Uuid::new("Message.1"), ClientId::new("user-a"));
        assert!(message.flag("vtt-cards", "card").is_none());

        message.set_flag("vtt-cards", "card", serde_json::json!({"items": []}));
        let value = message.flag("vtt-cards", "card").unwrap();
        assert_eq!(value["items"], serde_json::json!([]));

        // Foreign scopes stay untouched
        message.set_flag("other-module", "x", serde_json::json!(1));
        assert!(message.flag("vtt-cards", "card").is_some());
    }
}
