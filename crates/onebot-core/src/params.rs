//! Typed parameter extraction.
//!
//! [`Params`] wraps the raw parameter mapping of a request and offers typed
//! accessors that fail closed with a [`ParamError`]. [`ParamGetter`] layers the
//! standard failure response on top: when an accessor fails, it writes the
//! `BAD_PARAM` (or `UNSUPPORTED_PARAM`) response immediately and returns
//! `None`, so a handler can simply return.
//!
//! ```rust
//! use onebot_core::{ParamGetter, Request, ResponseWriter, RetCode};
//! use serde_json::json;
//!
//! fn handle(w: &ResponseWriter, r: &Request) {
//!     let p = ParamGetter::new(w, r);
//!     let Some(user_id) = p.get_string("user_id") else {
//!         return;
//!     };
//!     w.write_data(json!({ "user_id": user_id }));
//! }
//!
//! let request = Request::new("get_user_info");
//! let w = ResponseWriter::new(&request);
//! handle(&w, &request);
//! assert_eq!(w.finish().retcode(), RetCode::BAD_PARAM);
//! ```

use std::ops::Deref;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::message::{Message, MessageError, json_type_name};
use crate::request::Request;
use crate::response::ResponseWriter;
use crate::retcode::RetCode;

/// Why a parameter could not be obtained.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParamError {
    /// The key is absent.
    #[error("missing parameter `{key}`")]
    Missing { key: String },

    /// The key is present but holds a value of another type.
    #[error("parameter `{key}` must be {expected}, got {found}")]
    WrongType {
        key: String,
        expected: &'static str,
        found: &'static str,
    },

    /// The key holds something that is not a valid message.
    #[error("parameter `{key}` is not a valid message: {source}")]
    BadMessage {
        key: String,
        #[source]
        source: MessageError,
    },

    /// The key is not understood by the action.
    #[error("unsupported parameter `{key}`")]
    Unsupported { key: String },
}

impl ParamError {
    /// Returns the retcode this error is reported with.
    pub fn retcode(&self) -> RetCode {
        match self {
            Self::Unsupported { .. } => RetCode::UNSUPPORTED_PARAM,
            _ => RetCode::BAD_PARAM,
        }
    }

    /// Returns the offending key.
    pub fn key(&self) -> &str {
        match self {
            Self::Missing { key }
            | Self::WrongType { key, .. }
            | Self::BadMessage { key, .. }
            | Self::Unsupported { key } => key,
        }
    }
}

/// Result type for parameter access.
pub type ParamResult<T> = Result<T, ParamError>;

// =============================================================================
// Params
// =============================================================================

/// The parameter mapping of a request.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Params(Map<String, Value>);

impl Params {
    /// Creates an empty parameter mapping.
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Inserts a parameter (builder pattern).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Returns the raw value for `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Consumes the wrapper and returns the raw mapping.
    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }

    fn require(&self, key: &str) -> ParamResult<&Value> {
        self.0.get(key).ok_or_else(|| ParamError::Missing {
            key: key.to_string(),
        })
    }

    /// Returns `None` for an absent key or an explicit `null`.
    fn optional(&self, key: &str) -> Option<&Value> {
        self.0.get(key).filter(|value| !value.is_null())
    }

    pub fn get_str(&self, key: &str) -> ParamResult<&str> {
        as_str(key, self.require(key)?)
    }

    pub fn get_string(&self, key: &str) -> ParamResult<String> {
        self.get_str(key).map(str::to_string)
    }

    pub fn get_i64(&self, key: &str) -> ParamResult<i64> {
        as_i64(key, self.require(key)?)
    }

    pub fn get_u64(&self, key: &str) -> ParamResult<u64> {
        as_u64(key, self.require(key)?)
    }

    pub fn get_f64(&self, key: &str) -> ParamResult<f64> {
        as_f64(key, self.require(key)?)
    }

    pub fn get_bool(&self, key: &str) -> ParamResult<bool> {
        as_bool(key, self.require(key)?)
    }

    /// Parses and validates a message parameter.
    pub fn get_message(&self, key: &str) -> ParamResult<Message> {
        as_message(key, self.require(key)?)
    }

    pub fn get_map(&self, key: &str) -> ParamResult<&Map<String, Value>> {
        as_map(key, self.require(key)?)
    }

    pub fn get_list(&self, key: &str) -> ParamResult<&[Value]> {
        as_list(key, self.require(key)?)
    }

    pub fn get_opt_str(&self, key: &str) -> ParamResult<Option<&str>> {
        self.optional(key).map(|v| as_str(key, v)).transpose()
    }

    pub fn get_opt_i64(&self, key: &str) -> ParamResult<Option<i64>> {
        self.optional(key).map(|v| as_i64(key, v)).transpose()
    }

    pub fn get_opt_bool(&self, key: &str) -> ParamResult<Option<bool>> {
        self.optional(key).map(|v| as_bool(key, v)).transpose()
    }

    pub fn get_opt_message(&self, key: &str) -> ParamResult<Option<Message>> {
        self.optional(key).map(|v| as_message(key, v)).transpose()
    }

    /// Rejects any key outside `known`.
    ///
    /// Extension keys (those containing a `.`, e.g. `repl.flag`) are always
    /// accepted.
    pub fn ensure_known(&self, known: &[&str]) -> ParamResult<()> {
        match self
            .0
            .keys()
            .find(|key| !key.contains('.') && !known.contains(&key.as_str()))
        {
            Some(key) => Err(ParamError::Unsupported { key: key.clone() }),
            None => Ok(()),
        }
    }
}

impl Deref for Params {
    type Target = Map<String, Value>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Map<String, Value>> for Params {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

fn wrong_type(key: &str, expected: &'static str, found: &Value) -> ParamError {
    ParamError::WrongType {
        key: key.to_string(),
        expected,
        found: json_type_name(found),
    }
}

fn as_str<'a>(key: &str, value: &'a Value) -> ParamResult<&'a str> {
    value.as_str().ok_or_else(|| wrong_type(key, "a string", value))
}

fn as_i64(key: &str, value: &Value) -> ParamResult<i64> {
    value.as_i64().ok_or_else(|| wrong_type(key, "an integer", value))
}

fn as_u64(key: &str, value: &Value) -> ParamResult<u64> {
    value
        .as_u64()
        .ok_or_else(|| wrong_type(key, "a non-negative integer", value))
}

fn as_f64(key: &str, value: &Value) -> ParamResult<f64> {
    value.as_f64().ok_or_else(|| wrong_type(key, "a number", value))
}

fn as_bool(key: &str, value: &Value) -> ParamResult<bool> {
    value.as_bool().ok_or_else(|| wrong_type(key, "a boolean", value))
}

fn as_map<'a>(key: &str, value: &'a Value) -> ParamResult<&'a Map<String, Value>> {
    value.as_object().ok_or_else(|| wrong_type(key, "a mapping", value))
}

fn as_list<'a>(key: &str, value: &'a Value) -> ParamResult<&'a [Value]> {
    value
        .as_array()
        .map(Vec::as_slice)
        .ok_or_else(|| wrong_type(key, "a list", value))
}

fn as_message(key: &str, value: &Value) -> ParamResult<Message> {
    Message::from_value(value).map_err(|source| ParamError::BadMessage {
        key: key.to_string(),
        source,
    })
}

// =============================================================================
// ParamGetter
// =============================================================================

/// Reads parameters of one request and answers failures on the handler's
/// behalf.
///
/// Every accessor returns `Some` on success and leaves the writer untouched.
/// On failure it writes the matching failure response and returns `None`.
pub struct ParamGetter<'a> {
    writer: &'a ResponseWriter,
    params: &'a Params,
}

impl<'a> ParamGetter<'a> {
    pub fn new(writer: &'a ResponseWriter, request: &'a Request) -> Self {
        Self {
            writer,
            params: &request.params,
        }
    }

    fn obtain<T>(&self, result: ParamResult<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                self.writer.write_failed(e.retcode(), &e);
                None
            }
        }
    }

    pub fn get_str(&self, key: &str) -> Option<&'a str> {
        let params: &'a Params = self.params;
        self.obtain(params.get_str(key))
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.obtain(self.params.get_string(key))
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.obtain(self.params.get_i64(key))
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.obtain(self.params.get_u64(key))
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.obtain(self.params.get_f64(key))
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.obtain(self.params.get_bool(key))
    }

    pub fn get_message(&self, key: &str) -> Option<Message> {
        self.obtain(self.params.get_message(key))
    }

    pub fn get_map(&self, key: &str) -> Option<&'a Map<String, Value>> {
        let params: &'a Params = self.params;
        self.obtain(params.get_map(key))
    }

    pub fn get_list(&self, key: &str) -> Option<&'a [Value]> {
        let params: &'a Params = self.params;
        self.obtain(params.get_list(key))
    }

    /// Like [`Params::get_opt_str`]; the outer `None` means a failure was
    /// written.
    pub fn get_opt_str(&self, key: &str) -> Option<Option<&'a str>> {
        let params: &'a Params = self.params;
        self.obtain(params.get_opt_str(key))
    }

    /// Like [`Params::ensure_known`]; returns false once the failure is
    /// written.
    pub fn ensure_known(&self, known: &[&str]) -> bool {
        self.obtain(self.params.ensure_known(known)).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Segment, SegmentKind};
    use serde_json::json;

    fn params(value: Value) -> Params {
        match value {
            Value::Object(map) => Params::from(map),
            _ => panic!("test params must be a mapping"),
        }
    }

    #[test]
    fn test_typed_accessors() {
        let p = params(json!({
            "s": "x",
            "i": -3,
            "u": 7,
            "f": 1.5,
            "b": true,
            "m": {"k": "v"},
            "l": [1, 2],
        }));
        assert_eq!(p.get_str("s").unwrap(), "x");
        assert_eq!(p.get_i64("i").unwrap(), -3);
        assert_eq!(p.get_u64("u").unwrap(), 7);
        assert_eq!(p.get_f64("f").unwrap(), 1.5);
        assert_eq!(p.get_f64("u").unwrap(), 7.0);
        assert!(p.get_bool("b").unwrap());
        assert_eq!(p.get_map("m").unwrap()["k"], "v");
        assert_eq!(p.get_list("l").unwrap().len(), 2);
    }

    #[test]
    fn test_wrong_types_fail_closed() {
        let p = params(json!({"s": 1, "i": 1.5, "u": -1, "b": "true"}));
        assert_eq!(
            p.get_str("s"),
            Err(ParamError::WrongType {
                key: "s".into(),
                expected: "a string",
                found: "number",
            })
        );
        assert!(p.get_i64("i").is_err());
        assert!(p.get_u64("u").is_err());
        assert!(p.get_bool("b").is_err());
        assert_eq!(
            p.get_str("nope"),
            Err(ParamError::Missing { key: "nope".into() })
        );
    }

    #[test]
    fn test_optional_accessors() {
        let p = params(json!({"a": null, "b": "x", "c": 1}));
        assert_eq!(p.get_opt_str("a").unwrap(), None);
        assert_eq!(p.get_opt_str("missing").unwrap(), None);
        assert_eq!(p.get_opt_str("b").unwrap(), Some("x"));
        assert!(p.get_opt_str("c").is_err());
    }

    #[test]
    fn test_ensure_known_allows_extensions() {
        let p = params(json!({"user_id": "u", "repl.flag": true}));
        assert!(p.ensure_known(&["user_id"]).is_ok());

        let p = params(json!({"user_id": "u", "color": "red"}));
        let err = p.ensure_known(&["user_id"]).unwrap_err();
        assert_eq!(err.retcode(), RetCode::UNSUPPORTED_PARAM);
        assert_eq!(err.key(), "color");
    }

    #[test]
    fn test_getter_extracts_values() {
        let request = Request::new("send_message").with_params(params(json!({
            "user_id": "u1",
            "message": [{"type": "text", "data": {"text": "hi"}}],
        })));
        let w = ResponseWriter::new(&request);
        let p = ParamGetter::new(&w, &request);

        assert_eq!(p.get_str("user_id"), Some("u1"));
        let msg = p.get_message("message").unwrap();
        assert_eq!(msg.len(), 1);
        assert_eq!(msg[0].kind, SegmentKind::Text);
        assert_eq!(msg.extract_text(), "hi");
        assert!(!w.is_written());
    }

    #[test]
    fn test_getter_writes_bad_param() {
        let request = Request::new("send_message").with_echo("e");
        let w = ResponseWriter::new(&request);
        let p = ParamGetter::new(&w, &request);

        assert_eq!(p.get_string("foo"), None);
        assert!(w.is_written());

        let response = w.finish();
        assert_eq!(response.retcode(), RetCode::BAD_PARAM);
        assert_eq!(response.message(), "missing parameter `foo`");
        assert_eq!(response.echo(), Some("e"));
    }

    #[test]
    fn test_getter_rejects_bad_message() {
        let request = Request::new("send_message")
            .with_params(Params::new().with("message", json!([{"type": "image", "data": {}}])));
        let w = ResponseWriter::new(&request);
        assert!(ParamGetter::new(&w, &request).get_message("message").is_none());
        assert_eq!(w.finish().retcode(), RetCode::BAD_PARAM);
    }

    #[test]
    fn test_message_param_round_trip() {
        let msg = crate::Message::from(Segment::text("x"));
        let p = Params::new().with("message", msg.to_value());
        assert_eq!(p.get_message("message").unwrap(), msg);
    }
}
