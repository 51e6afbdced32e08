//! Action request envelope.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::message::json_type_name;
use crate::params::Params;

/// Identifies a bot instance: the platform it lives on and its user id there.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BotSelf {
    pub platform: String,
    pub user_id: String,
}

impl BotSelf {
    pub fn new(platform: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            user_id: user_id.into(),
        }
    }
}

impl fmt::Display for BotSelf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.platform, self.user_id)
    }
}

/// A malformed request envelope.
///
/// Every variant maps to [`RetCode::BAD_REQUEST`](crate::RetCode::BAD_REQUEST).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    /// The bytes are not valid JSON.
    #[error("request is not valid JSON: {0}")]
    InvalidJson(String),

    /// The top level is not an object.
    #[error("request must be a mapping, got {found}")]
    NotAMapping { found: &'static str },

    /// A field is missing or has the wrong type.
    #[error("request field `{field}` {reason}")]
    BadField {
        field: &'static str,
        reason: String,
    },
}

impl RequestError {
    fn bad_field(field: &'static str, reason: impl Into<String>) -> Self {
        Self::BadField {
            field,
            reason: reason.into(),
        }
    }
}

/// An action request, as handed over by a transport.
///
/// The action name is fixed once the request is built; handlers only get a
/// shared reference.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    action: String,
    /// The action parameters.
    pub params: Params,
    /// Opaque correlation token, mirrored into the response.
    pub echo: Option<String>,
    /// The bot this request addresses, if the transport serves several.
    pub bot_self: Option<BotSelf>,
}

impl Request {
    /// Creates a request without parameters.
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            params: Params::default(),
            echo: None,
            bot_self: None,
        }
    }

    /// Sets the parameters (builder pattern).
    pub fn with_params(mut self, params: impl Into<Params>) -> Self {
        self.params = params.into();
        self
    }

    /// Sets the echo token (builder pattern).
    pub fn with_echo(mut self, echo: impl Into<String>) -> Self {
        self.echo = Some(echo.into());
        self
    }

    /// Sets the addressed bot (builder pattern).
    pub fn with_self(mut self, bot_self: BotSelf) -> Self {
        self.bot_self = Some(bot_self);
        self
    }

    /// Returns the action name.
    pub fn action(&self) -> &str {
        &self.action
    }

    /// Parses a request from raw JSON bytes.
    ///
    /// On failure, the echo token is returned alongside the error when it
    /// could be read, so that the failure response can still be correlated.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, (RequestError, Option<String>)> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| (RequestError::InvalidJson(e.to_string()), None))?;
        Self::from_value(value)
    }

    /// Parses a request from a decoded envelope.
    ///
    /// `params` and `echo` may be absent or `null`; `self`, when present, must
    /// be a `{platform, user_id}` mapping.
    pub fn from_value(value: Value) -> Result<Self, (RequestError, Option<String>)> {
        let mut object = match value {
            Value::Object(object) => object,
            other => {
                return Err((
                    RequestError::NotAMapping {
                        found: json_type_name(&other),
                    },
                    None,
                ));
            }
        };

        let echo = match object.remove("echo") {
            None | Some(Value::Null) => None,
            Some(Value::String(echo)) => Some(echo),
            Some(other) => {
                return Err((
                    RequestError::bad_field(
                        "echo",
                        format!("must be a string, got {}", json_type_name(&other)),
                    ),
                    None,
                ));
            }
        };

        Self::parse_fields(&mut object, echo.clone()).map_err(|e| (e, echo))
    }

    fn parse_fields(
        object: &mut Map<String, Value>,
        echo: Option<String>,
    ) -> Result<Self, RequestError> {
        let action = match object.remove("action") {
            Some(Value::String(action)) => action,
            Some(other) => {
                return Err(RequestError::bad_field(
                    "action",
                    format!("must be a string, got {}", json_type_name(&other)),
                ));
            }
            None => return Err(RequestError::bad_field("action", "is missing")),
        };

        let params = match object.remove("params") {
            None | Some(Value::Null) => Params::default(),
            Some(Value::Object(params)) => Params::from(params),
            Some(other) => {
                return Err(RequestError::bad_field(
                    "params",
                    format!("must be a mapping, got {}", json_type_name(&other)),
                ));
            }
        };

        let bot_self = match object.remove("self") {
            None | Some(Value::Null) => None,
            Some(value) => Some(
                serde_json::from_value::<BotSelf>(value)
                    .map_err(|e| RequestError::bad_field("self", e.to_string()))?,
            ),
        };

        Ok(Self {
            action,
            params,
            echo,
            bot_self,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_full_request() {
        let raw = br#"{
            "action": "send_message",
            "params": {"user_id": "u1"},
            "echo": "abc",
            "self": {"platform": "repl", "user_id": "bot"}
        }"#;
        let request = Request::from_slice(raw).unwrap();
        assert_eq!(request.action(), "send_message");
        assert_eq!(request.params.get_str("user_id").unwrap(), "u1");
        assert_eq!(request.echo.as_deref(), Some("abc"));
        assert_eq!(request.bot_self, Some(BotSelf::new("repl", "bot")));
    }

    #[test]
    fn test_params_and_echo_are_optional() {
        let request = Request::from_value(json!({"action": "get_status", "params": null})).unwrap();
        assert!(request.params.is_empty());
        assert!(request.echo.is_none());
        assert!(request.bot_self.is_none());
    }

    #[test]
    fn test_bad_envelopes() {
        let (err, echo) = Request::from_slice(b"{not json").unwrap_err();
        assert!(matches!(err, RequestError::InvalidJson(_)));
        assert!(echo.is_none());

        let (err, _) = Request::from_value(json!([1, 2])).unwrap_err();
        assert_eq!(err, RequestError::NotAMapping { found: "list" });

        let (err, echo) = Request::from_value(json!({"action": 1, "echo": "e1"})).unwrap_err();
        assert!(matches!(err, RequestError::BadField { field: "action", .. }));
        assert_eq!(echo.as_deref(), Some("e1"));

        let (err, echo) =
            Request::from_value(json!({"action": "x", "params": [], "echo": "e2"})).unwrap_err();
        assert!(matches!(err, RequestError::BadField { field: "params", .. }));
        assert_eq!(echo.as_deref(), Some("e2"));

        let (err, _) = Request::from_value(json!({"action": "x", "self": "bot"})).unwrap_err();
        assert!(matches!(err, RequestError::BadField { field: "self", .. }));
    }
}
