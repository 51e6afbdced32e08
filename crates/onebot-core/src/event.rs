//! Event model.
//!
//! Producers build an [`EventPayload`] (the typed part of an event) and hand
//! it to the runtime. The runtime turns it into an [`Event`] envelope by
//! assigning the id, timestamp and bot identity.
//!
//! On the wire the payload fields sit next to the envelope fields:
//!
//! ```text
//! {
//!   "id": "3", "time": 1700000000, "self": {"platform": "repl", "user_id": "bot"},
//!   "type": "message", "detail_type": "private", "sub_type": "",
//!   "message_id": "2", "message": [...], "alt_message": "hi", "user_id": "user"
//! }
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::warn;

use crate::action::{ONEBOT_VERSION, extended_name};
use crate::message::Message;
use crate::request::BotSelf;

/// Envelope keys a payload may not override.
const RESERVED_KEYS: &[&str] = &["id", "time", "type", "detail_type", "sub_type", "self"];

/// Top-level event classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Meta,
    Message,
    Notice,
    Request,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Meta => "meta",
            Self::Message => "message",
            Self::Notice => "notice",
            Self::Request => "request",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// EventPayload
// ============================================================================

/// The producer-supplied part of an event.
#[derive(Debug, Clone, PartialEq)]
pub struct EventPayload {
    pub event_type: EventType,
    pub detail_type: String,
    pub sub_type: String,
    pub fields: Map<String, Value>,
}

impl EventPayload {
    /// Creates a payload with no fields and an empty sub type.
    pub fn new(event_type: EventType, detail_type: impl Into<String>) -> Self {
        Self {
            event_type,
            detail_type: detail_type.into(),
            sub_type: String::new(),
            fields: Map::new(),
        }
    }

    /// Sets the sub type (builder pattern).
    pub fn sub_type(mut self, sub_type: impl Into<String>) -> Self {
        self.sub_type = sub_type.into();
        self
    }

    /// Adds a field (builder pattern).
    pub fn field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// A private message from `user_id`.
    pub fn private_message(
        message_id: impl Into<String>,
        message: Message,
        user_id: impl Into<String>,
    ) -> Self {
        let alt_message = message.alt_message();
        Self::new(EventType::Message, "private")
            .field("message_id", message_id.into())
            .field("message", message.to_value())
            .field("alt_message", alt_message)
            .field("user_id", user_id.into())
    }

    /// A message from `user_id` in group `group_id`.
    pub fn group_message(
        message_id: impl Into<String>,
        message: Message,
        group_id: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        let alt_message = message.alt_message();
        Self::new(EventType::Message, "group")
            .field("message_id", message_id.into())
            .field("message", message.to_value())
            .field("alt_message", alt_message)
            .field("group_id", group_id.into())
            .field("user_id", user_id.into())
    }

    /// A liveness heartbeat; `interval_ms` is the time until the next one.
    pub fn heartbeat(interval_ms: u64) -> Self {
        Self::new(EventType::Meta, "heartbeat").field("interval", interval_ms)
    }

    /// Announces the implementation once a connection is established.
    pub fn connect(impl_name: &str, version: &str) -> Self {
        Self::new(EventType::Meta, "connect").field(
            "version",
            json!({
                "impl": impl_name,
                "version": version,
                "onebot_version": ONEBOT_VERSION,
            }),
        )
    }

    /// Reports a change of the `get_status` payload.
    pub fn status_update(status: Value) -> Self {
        Self::new(EventType::Meta, "status_update").field("status", status)
    }

    /// A notice of `detail_type` with arbitrary fields.
    pub fn notice(detail_type: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            fields,
            ..Self::new(EventType::Notice, detail_type)
        }
    }

    /// An extension event whose detail type is `{prefix}.{detail_type}`.
    pub fn extended(
        prefix: &str,
        event_type: EventType,
        detail_type: &str,
        fields: Map<String, Value>,
    ) -> Self {
        Self {
            fields,
            ..Self::new(event_type, extended_name(prefix, detail_type))
        }
    }
}

// ============================================================================
// Event
// ============================================================================

/// A fully formed event, ready for delivery.
///
/// `id`, `time` and `self` are fixed at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    id: String,
    time: i64,
    #[serde(rename = "type")]
    event_type: EventType,
    detail_type: String,
    #[serde(default)]
    sub_type: String,
    #[serde(rename = "self")]
    bot_self: BotSelf,
    #[serde(flatten)]
    fields: Map<String, Value>,
}

impl Event {
    /// Builds an event from its payload.
    ///
    /// Payload fields that would shadow an envelope key are dropped.
    pub fn new(id: String, time: i64, bot_self: BotSelf, payload: EventPayload) -> Self {
        let EventPayload {
            event_type,
            detail_type,
            sub_type,
            mut fields,
        } = payload;

        fields.retain(|key, _| {
            let reserved = RESERVED_KEYS.contains(&key.as_str());
            if reserved {
                warn!(key = %key, "Dropping event field that shadows an envelope key");
            }
            !reserved
        });

        Self {
            id,
            time,
            event_type,
            detail_type,
            sub_type,
            bot_self,
            fields,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Unix timestamp in seconds.
    pub fn time(&self) -> i64 {
        self.time
    }

    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    pub fn detail_type(&self) -> &str {
        &self.detail_type
    }

    pub fn sub_type(&self) -> &str {
        &self.sub_type
    }

    pub fn bot_self(&self) -> &BotSelf {
        &self.bot_self
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Returns `type.detail_type`, e.g. `message.private`.
    pub fn name(&self) -> String {
        format!("{}.{}", self.event_type, self.detail_type)
    }

    /// Serializes the event to JSON bytes.
    pub fn to_vec(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bot() -> BotSelf {
        BotSelf::new("repl", "bot")
    }

    #[test]
    fn test_private_message_wire_form() {
        let payload = EventPayload::private_message("2", Message::new().text("hi"), "user");
        let event = Event::new("3".into(), 1_700_000_000, bot(), payload);

        assert_eq!(event.name(), "message.private");
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({
                "id": "3",
                "time": 1_700_000_000,
                "type": "message",
                "detail_type": "private",
                "sub_type": "",
                "self": {"platform": "repl", "user_id": "bot"},
                "message_id": "2",
                "message": [{"type": "text", "data": {"text": "hi"}}],
                "alt_message": "hi",
                "user_id": "user",
            })
        );
    }

    #[test]
    fn test_reserved_fields_are_dropped() {
        let payload = EventPayload::new(EventType::Notice, "friend_increase")
            .field("id", "spoofed")
            .field("user_id", "u1");
        let event = Event::new("9".into(), 0, bot(), payload);

        assert_eq!(event.id(), "9");
        assert!(!event.fields().contains_key("id"));
        assert_eq!(event.fields()["user_id"], "u1");
    }

    #[test]
    fn test_extended_detail_type() {
        let payload = EventPayload::extended("repl", EventType::Notice, "poke", Map::new());
        assert_eq!(payload.detail_type, "repl.poke");
    }

    #[test]
    fn test_deserialize_round_trip() {
        let event = Event::new("1".into(), 5, bot(), EventPayload::heartbeat(10_000));
        let back: Event = serde_json::from_slice(&event.to_vec().unwrap()).unwrap();
        assert_eq!(back, event);
        assert_eq!(back.fields()["interval"], 10_000);
    }
}
