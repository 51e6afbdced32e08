//! Rich message model.
//!
//! A [`Message`] is an ordered sequence of [`Segment`]s. Every segment is a
//! `{"type": kind, "data": {...}}` pair on the wire; the segment keeps its data
//! mapping verbatim so that serialization round-trips without loss, and kinds
//! this crate does not know about are carried through as
//! [`SegmentKind::Other`] instead of being dropped.
//!
//! # Example
//!
//! ```rust
//! use onebot_core::{Message, Segment};
//!
//! let msg = Message::new().mention("10001").text(" hello");
//! assert_eq!(msg.len(), 2);
//! assert_eq!(msg.extract_text(), " hello");
//! assert_eq!(msg.to_string(), "@10001 hello");
//! ```

use std::fmt::{self, Display};
use std::ops::{Deref, DerefMut};

use serde::{Deserialize, Deserializer, Serialize, de};
use serde_json::{Map, Value, json};
use thiserror::Error;

// ============================================================================
// Segment Kind
// ============================================================================

/// The `type` of a message segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SegmentKind {
    Text,
    Mention,
    MentionAll,
    Image,
    Voice,
    Audio,
    Video,
    File,
    Location,
    Reply,
    /// A kind without a typed representation, usually an extension
    /// segment such as `qq.face`.
    ///
    /// Conversions from a name never produce `Other` for a known kind, and
    /// [`Segment::new`] normalizes one that was built by hand.
    Other(String),
}

impl SegmentKind {
    /// Returns the wire name of this kind.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Text => "text",
            Self::Mention => "mention",
            Self::MentionAll => "mention_all",
            Self::Image => "image",
            Self::Voice => "voice",
            Self::Audio => "audio",
            Self::Video => "video",
            Self::File => "file",
            Self::Location => "location",
            Self::Reply => "reply",
            Self::Other(name) => name,
        }
    }
}

impl From<&str> for SegmentKind {
    fn from(name: &str) -> Self {
        match name {
            "text" => Self::Text,
            "mention" => Self::Mention,
            "mention_all" => Self::MentionAll,
            "image" => Self::Image,
            "voice" => Self::Voice,
            "audio" => Self::Audio,
            "video" => Self::Video,
            "file" => Self::File,
            "location" => Self::Location,
            "reply" => Self::Reply,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for SegmentKind {
    fn from(name: String) -> Self {
        match Self::from(name.as_str()) {
            Self::Other(_) => Self::Other(name),
            known => known,
        }
    }
}

impl From<SegmentKind> for String {
    fn from(kind: SegmentKind) -> Self {
        match kind {
            SegmentKind::Other(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

impl Display for SegmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Errors
// ============================================================================

/// A segment or message that does not have the expected shape.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageError {
    /// The value is not a list of segments.
    #[error("message must be a list of segments, got {found}")]
    NotAList { found: &'static str },

    /// An element of the list is not a `{type, data}` object.
    #[error("segment #{index} is malformed: {reason}")]
    MalformedSegment { index: usize, reason: String },

    /// A segment of a known kind is missing a field or has a field of the
    /// wrong type.
    #[error("segment #{index} ({kind}): field `{field}` {reason}")]
    BadSegmentData {
        index: usize,
        kind: String,
        field: &'static str,
        reason: &'static str,
    },
}

/// Returns a short name of the JSON type of `value`, for error messages.
pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "mapping",
    }
}

// ============================================================================
// Segment
// ============================================================================

/// A single unit of rich content.
///
/// Deserializing a segment applies the same checks as
/// [`Message::from_value`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Segment {
    /// The segment kind (`type` on the wire).
    #[serde(rename = "type")]
    pub kind: SegmentKind,
    /// The segment fields (`data` on the wire), kept verbatim.
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl Segment {
    /// Creates a segment from a kind and its data.
    pub fn new(kind: impl Into<SegmentKind>, data: Map<String, Value>) -> Self {
        let kind = match kind.into() {
            SegmentKind::Other(name) => SegmentKind::from(name),
            known => known,
        };
        Self { kind, data }
    }

    fn with_data(kind: SegmentKind, data: Value) -> Self {
        let data = match data {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self { kind, data }
    }

    /// Creates a plain text segment.
    pub fn text(text: impl Into<String>) -> Self {
        Self::with_data(SegmentKind::Text, json!({ "text": text.into() }))
    }

    /// Creates a mention of a single user.
    pub fn mention(user_id: impl Into<String>) -> Self {
        Self::with_data(SegmentKind::Mention, json!({ "user_id": user_id.into() }))
    }

    /// Creates a mention of everyone.
    pub fn mention_all() -> Self {
        Self::new(SegmentKind::MentionAll, Map::new())
    }

    pub fn image(file_id: impl Into<String>) -> Self {
        Self::with_data(SegmentKind::Image, json!({ "file_id": file_id.into() }))
    }

    pub fn voice(file_id: impl Into<String>) -> Self {
        Self::with_data(SegmentKind::Voice, json!({ "file_id": file_id.into() }))
    }

    pub fn audio(file_id: impl Into<String>) -> Self {
        Self::with_data(SegmentKind::Audio, json!({ "file_id": file_id.into() }))
    }

    pub fn video(file_id: impl Into<String>) -> Self {
        Self::with_data(SegmentKind::Video, json!({ "file_id": file_id.into() }))
    }

    pub fn file(file_id: impl Into<String>) -> Self {
        Self::with_data(SegmentKind::File, json!({ "file_id": file_id.into() }))
    }

    /// Creates a location segment.
    pub fn location(
        latitude: f64,
        longitude: f64,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self::with_data(
            SegmentKind::Location,
            json!({
                "latitude": latitude,
                "longitude": longitude,
                "title": title.into(),
                "content": content.into(),
            }),
        )
    }

    /// Creates a reply to an earlier message.
    pub fn reply(message_id: impl Into<String>, user_id: Option<String>) -> Self {
        let mut data = Map::new();
        data.insert("message_id".into(), Value::String(message_id.into()));
        if let Some(user_id) = user_id {
            data.insert("user_id".into(), Value::String(user_id));
        }
        Self::new(SegmentKind::Reply, data)
    }

    /// Returns true if this is a text segment.
    pub fn is_text(&self) -> bool {
        self.kind == SegmentKind::Text
    }

    /// Returns the text payload if this is a text segment.
    pub fn as_text(&self) -> Option<&str> {
        if self.is_text() {
            self.data.get("text").and_then(Value::as_str)
        } else {
            None
        }
    }

    /// Returns a string field of the segment data.
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.data.get(field).and_then(Value::as_str)
    }

    /// Checks that a known kind carries its mandatory fields.
    ///
    /// `index` is only used to label the error.
    pub fn validate(&self, index: usize) -> Result<(), MessageError> {
        let required: &[(&'static str, FieldType)] = match self.kind {
            SegmentKind::Text => &[("text", FieldType::String)],
            SegmentKind::Mention => &[("user_id", FieldType::String)],
            SegmentKind::Image
            | SegmentKind::Voice
            | SegmentKind::Audio
            | SegmentKind::Video
            | SegmentKind::File => &[("file_id", FieldType::String)],
            SegmentKind::Location => &[
                ("latitude", FieldType::Number),
                ("longitude", FieldType::Number),
                ("title", FieldType::String),
                ("content", FieldType::String),
            ],
            SegmentKind::Reply => &[("message_id", FieldType::String)],
            SegmentKind::MentionAll | SegmentKind::Other(_) => &[],
        };

        for &(field, ty) in required {
            let reason = match self.data.get(field) {
                None => Some("is missing"),
                Some(value) if !ty.matches(value) => Some(ty.mismatch()),
                Some(_) => None,
            };
            if let Some(reason) = reason {
                return Err(MessageError::BadSegmentData {
                    index,
                    kind: self.kind.to_string(),
                    field,
                    reason,
                });
            }
        }

        if self.kind == SegmentKind::Reply
            && let Some(user_id) = self.data.get("user_id")
            && !user_id.is_null()
            && !user_id.is_string()
        {
            return Err(MessageError::BadSegmentData {
                index,
                kind: self.kind.to_string(),
                field: "user_id",
                reason: "must be a string",
            });
        }

        Ok(())
    }
}

#[derive(Clone, Copy)]
enum FieldType {
    String,
    Number,
}

impl FieldType {
    fn matches(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
        }
    }

    fn mismatch(self) -> &'static str {
        match self {
            Self::String => "must be a string",
            Self::Number => "must be a number",
        }
    }
}

impl<'de> Deserialize<'de> for Segment {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        let segment = parse_segment(0, &value).map_err(de::Error::custom)?;
        segment.validate(0).map_err(de::Error::custom)?;
        Ok(segment)
    }
}

impl Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            SegmentKind::Text => f.write_str(self.as_text().unwrap_or_default()),
            SegmentKind::Mention => write!(f, "@{}", self.get_str("user_id").unwrap_or("?")),
            SegmentKind::MentionAll => f.write_str("@all"),
            kind => write!(f, "[{kind}]"),
        }
    }
}

// ============================================================================
// Message
// ============================================================================

/// An ordered sequence of segments.
///
/// Deserialization goes through [`Message::from_value`], so a message read
/// with serde is validated like one read from action parameters.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct Message {
    segments: Vec<Segment>,
}

impl Message {
    /// Creates a new empty message.
    pub const fn new() -> Self {
        Self {
            segments: Vec::new(),
        }
    }

    /// Parses and validates a message from its wire value.
    ///
    /// The value must be a list of `{type, data}` objects. Segments of known
    /// kinds must carry their mandatory fields; unknown kinds are kept as-is.
    pub fn from_value(value: &Value) -> Result<Self, MessageError> {
        let items = value.as_array().ok_or(MessageError::NotAList {
            found: json_type_name(value),
        })?;

        let mut segments = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            let segment = parse_segment(index, item)?;
            segment.validate(index)?;
            segments.push(segment);
        }
        Ok(Self { segments })
    }

    /// Concatenates the text of all text segments, in order.
    ///
    /// Non-text segments contribute nothing.
    pub fn extract_text(&self) -> String {
        self.iter().filter_map(Segment::as_text).collect()
    }

    /// Returns the alternative plain-text rendering of the message.
    ///
    /// This is the form used for `alt_message` in message events.
    pub fn alt_message(&self) -> String {
        self.to_string()
    }

    /// Adds a segment to the end of the message.
    pub fn push(&mut self, segment: Segment) {
        self.segments.push(segment);
    }

    /// Consumes the message and adds a segment (builder pattern).
    pub fn with(mut self, segment: Segment) -> Self {
        self.segments.push(segment);
        self
    }

    /// Adds a text segment.
    pub fn text(self, text: impl Into<String>) -> Self {
        self.with(Segment::text(text))
    }

    /// Adds a mention segment.
    pub fn mention(self, user_id: impl Into<String>) -> Self {
        self.with(Segment::mention(user_id))
    }

    /// Adds an image segment.
    pub fn image(self, file_id: impl Into<String>) -> Self {
        self.with(Segment::image(file_id))
    }

    /// Consumes the message and returns the inner segments.
    pub fn into_segments(self) -> Vec<Segment> {
        self.segments
    }

    /// Returns the wire value of the message.
    pub fn to_value(&self) -> Value {
        Value::Array(
            self.segments
                .iter()
                .map(|seg| {
                    json!({
                        "type": seg.kind.as_str(),
                        "data": Value::Object(seg.data.clone()),
                    })
                })
                .collect(),
        )
    }
}

fn parse_segment(index: usize, item: &Value) -> Result<Segment, MessageError> {
    let malformed = |reason: String| MessageError::MalformedSegment { index, reason };

    let object = item
        .as_object()
        .ok_or_else(|| malformed(format!("expected a mapping, got {}", json_type_name(item))))?;

    let kind = match object.get("type") {
        Some(Value::String(kind)) => SegmentKind::from(kind.as_str()),
        Some(other) => {
            return Err(malformed(format!(
                "`type` must be a string, got {}",
                json_type_name(other)
            )));
        }
        None => return Err(malformed("missing `type`".to_string())),
    };

    let data = match object.get("data") {
        Some(Value::Object(data)) => data.clone(),
        None | Some(Value::Null) => Map::new(),
        Some(other) => {
            return Err(malformed(format!(
                "`data` must be a mapping, got {}",
                json_type_name(other)
            )));
        }
    };

    Ok(Segment { kind, data })
}

impl<'de> Deserialize<'de> for Message {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(&value).map_err(de::Error::custom)
    }
}

impl Deref for Message {
    type Target = [Segment];

    fn deref(&self) -> &Self::Target {
        &self.segments
    }
}

impl DerefMut for Message {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.segments
    }
}

impl Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

impl From<Vec<Segment>> for Message {
    fn from(segments: Vec<Segment>) -> Self {
        Self { segments }
    }
}

impl From<Segment> for Message {
    fn from(segment: Segment) -> Self {
        Self {
            segments: vec![segment],
        }
    }
}

impl FromIterator<Segment> for Message {
    fn from_iter<T: IntoIterator<Item = Segment>>(iter: T) -> Self {
        Self {
            segments: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Message {
    type Item = &'a Segment;
    type IntoIter = std::slice::Iter<'a, Segment>;

    fn into_iter(self) -> Self::IntoIter {
        self.segments.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_serialize() {
        let json = serde_json::to_string(&Segment::text("Hello")).unwrap();
        assert_eq!(json, r#"{"type":"text","data":{"text":"Hello"}}"#);

        let json = serde_json::to_string(&Segment::mention_all()).unwrap();
        assert_eq!(json, r#"{"type":"mention_all","data":{}}"#);
    }

    #[test]
    fn test_unknown_kind_is_preserved() {
        let raw = json!([{ "type": "qq.face", "data": { "id": 178, "big": true } }]);
        let msg = Message::from_value(&raw).unwrap();

        assert_eq!(msg[0].kind, SegmentKind::Other("qq.face".into()));
        assert_eq!(serde_json::to_value(&msg).unwrap(), raw);
        assert_eq!(msg.to_value(), raw);
    }

    #[test]
    fn test_serde_input_is_validated() {
        let err = serde_json::from_value::<Message>(json!([{ "type": "text", "data": {} }]))
            .unwrap_err();
        assert!(err.to_string().contains("field `text` is missing"));

        assert!(serde_json::from_value::<Segment>(json!({ "type": "mention" })).is_err());
        assert!(serde_json::from_value::<Message>(json!("hi")).is_err());

        let msg: Message = serde_json::from_value(json!([
            { "type": "text", "data": { "text": "hi" } },
            { "type": "qq.face", "data": { "id": 1 } },
        ]))
        .unwrap();
        assert_eq!(msg.extract_text(), "hi");
        assert_eq!(msg[1].kind, SegmentKind::Other("qq.face".into()));
    }

    #[test]
    fn test_other_with_known_name_is_normalized() {
        let segment = Segment::new(
            SegmentKind::Other("text".into()),
            json!({ "text": "x" }).as_object().cloned().unwrap_or_default(),
        );
        assert_eq!(segment.kind, SegmentKind::Text);

        let wire = serde_json::to_value(&segment).unwrap();
        let back: Segment = serde_json::from_value(wire).unwrap();
        assert_eq!(back, segment);
    }

    #[test]
    fn test_extra_fields_survive() {
        let raw = json!([{ "type": "image", "data": { "file_id": "f1", "qq.flash": true } }]);
        let msg = Message::from_value(&raw).unwrap();
        assert_eq!(msg[0].kind, SegmentKind::Image);
        assert_eq!(serde_json::to_value(&msg).unwrap(), raw);
    }

    #[test]
    fn test_extract_text_ignores_other_segments() {
        let msg = Message::new()
            .text("a")
            .mention("u1")
            .image("f")
            .text("b")
            .with(Segment::new("qq.face", Map::new()));
        assert_eq!(msg.extract_text(), "ab");
        assert_eq!(msg.alt_message(), "a@u1[image]b[qq.face]");
    }

    #[test]
    fn test_from_value_rejects_bad_shapes() {
        assert_eq!(
            Message::from_value(&json!("hi")),
            Err(MessageError::NotAList { found: "string" })
        );

        let err = Message::from_value(&json!([{ "data": {} }])).unwrap_err();
        assert!(matches!(err, MessageError::MalformedSegment { index: 0, .. }));

        let err = Message::from_value(&json!([
            { "type": "text", "data": { "text": "ok" } },
            { "type": "text", "data": { "text": 1 } }
        ]))
        .unwrap_err();
        assert_eq!(
            err,
            MessageError::BadSegmentData {
                index: 1,
                kind: "text".into(),
                field: "text",
                reason: "must be a string",
            }
        );
    }

    #[test]
    fn test_known_kind_without_data_is_not_coerced() {
        let err = Message::from_value(&json!([{ "type": "mention" }])).unwrap_err();
        assert!(matches!(
            err,
            MessageError::BadSegmentData { field: "user_id", reason: "is missing", .. }
        ));

        let msg = Message::from_value(&json!([{ "type": "mention_all" }])).unwrap();
        assert_eq!(msg[0].kind, SegmentKind::MentionAll);
    }

    #[test]
    fn test_location_and_reply_validation() {
        let seg = Segment::location(31.2, 121.5, "Home", "");
        assert!(seg.validate(0).is_ok());

        let seg = Segment::reply("42", Some("u1".into()));
        assert!(seg.validate(0).is_ok());

        let mut seg = Segment::reply("42", None);
        seg.data.insert("user_id".into(), json!(7));
        assert!(seg.validate(0).is_err());
    }

    #[test]
    fn test_kind_names_round_trip() {
        for name in ["text", "mention", "mention_all", "location", "reply", "x.y"] {
            let kind = SegmentKind::from(name);
            assert_eq!(String::from(kind), name);
        }
    }
}
