//! Action response envelope and the exactly-once [`ResponseWriter`].

use std::fmt::Display;
use std::sync::OnceLock;

use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::request::Request;
use crate::retcode::RetCode;

/// Response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Ok,
    Failed,
}

/// A response to one action request.
///
/// The status is derived from the retcode, so `status == Ok` holds exactly
/// when `retcode == 0`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    status: Status,
    retcode: RetCode,
    data: Value,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    echo: Option<String>,
}

impl Response {
    /// A successful response carrying `data`.
    pub fn ok(data: Value) -> Self {
        Self {
            status: Status::Ok,
            retcode: RetCode::OK,
            data,
            message: String::new(),
            echo: None,
        }
    }

    /// A failed response.
    ///
    /// A failure cannot carry [`RetCode::OK`]; such a response is turned into
    /// [`RetCode::BAD_HANDLER`].
    pub fn failed(retcode: RetCode, message: impl Into<String>) -> Self {
        let message = message.into();
        let (retcode, message) = if retcode.is_ok() {
            (
                RetCode::BAD_HANDLER,
                format!("handler reported a failure with retcode 0: {message}"),
            )
        } else {
            (retcode, message)
        };
        Self {
            status: Status::Failed,
            retcode,
            data: Value::Null,
            message,
            echo: None,
        }
    }

    /// Attaches the echo token (builder pattern).
    pub fn with_echo(mut self, echo: Option<String>) -> Self {
        self.echo = echo;
        self
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn retcode(&self) -> RetCode {
        self.retcode
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn echo(&self) -> Option<&str> {
        self.echo.as_deref()
    }

    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }

    /// Serializes the response to JSON bytes.
    pub fn to_vec(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

// =============================================================================
// ResponseWriter
// =============================================================================

/// Collects the single response of one dispatch.
///
/// The first write fixes the response. Later writes are ignored and only
/// produce a warning, which covers the case of a handler that keeps going
/// after a [`ParamGetter`](crate::ParamGetter) already answered with
/// `BAD_PARAM`. The request echo is attached when the writer is finished, no
/// matter which write won.
#[derive(Debug)]
pub struct ResponseWriter {
    action: String,
    echo: Option<String>,
    response: OnceLock<Response>,
}

impl ResponseWriter {
    /// Creates a writer for `request`.
    pub fn new(request: &Request) -> Self {
        Self {
            action: request.action().to_string(),
            echo: request.echo.clone(),
            response: OnceLock::new(),
        }
    }

    /// Writes a successful response carrying `data`.
    pub fn write_data(&self, data: impl Serialize) {
        match serde_json::to_value(data) {
            Ok(data) => self.write(Response::ok(data)),
            Err(e) => self.write(Response::failed(
                RetCode::INTERNAL_HANDLER_ERROR,
                format!("failed to serialize response data: {e}"),
            )),
        }
    }

    /// Writes a successful response with `null` data.
    pub fn write_ok(&self) {
        self.write(Response::ok(Value::Null));
    }

    /// Writes a failed response.
    pub fn write_failed(&self, retcode: RetCode, error: impl Display) {
        if retcode.is_ok() {
            warn!(action = %self.action, "write_failed called with retcode 0");
        }
        self.write(Response::failed(retcode, error.to_string()));
    }

    /// Writes a prepared response.
    pub fn write(&self, response: Response) {
        if let Err(rejected) = self.response.set(response) {
            warn!(
                action = %self.action,
                retcode = %rejected.retcode,
                "Response already written, ignoring subsequent write"
            );
        }
    }

    /// Returns true once a response has been written.
    pub fn is_written(&self) -> bool {
        self.response.get().is_some()
    }

    /// Returns the written response, if any, without the echo attached.
    pub fn peek(&self) -> Option<&Response> {
        self.response.get()
    }

    /// Consumes the writer and returns the final response.
    ///
    /// A handler that never wrote yields [`RetCode::BAD_HANDLER`].
    pub fn finish(self) -> Response {
        let response = self.response.into_inner().unwrap_or_else(|| {
            warn!(action = %self.action, "Handler returned without writing a response");
            Response::failed(RetCode::BAD_HANDLER, "handler did not write a response")
        });
        response.with_echo(self.echo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn writer() -> ResponseWriter {
        ResponseWriter::new(&Request::new("test").with_echo("e-1"))
    }

    #[test]
    fn test_status_follows_retcode() {
        assert_eq!(Response::ok(json!(1)).status(), Status::Ok);
        let failed = Response::failed(RetCode::LOGIC_ERROR, "nope");
        assert_eq!(failed.status(), Status::Failed);
        assert_eq!(failed.retcode(), RetCode::LOGIC_ERROR);

        let bogus = Response::failed(RetCode::OK, "nope");
        assert_eq!(bogus.status(), Status::Failed);
        assert_eq!(bogus.retcode(), RetCode::BAD_HANDLER);
    }

    #[test]
    fn test_serialize() {
        let response = Response::ok(json!({"message_id": "1"})).with_echo(Some("e".into()));
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({
                "status": "ok",
                "retcode": 0,
                "data": {"message_id": "1"},
                "message": "",
                "echo": "e",
            })
        );

        let response = Response::failed(RetCode::BAD_PARAM, "missing");
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({"status": "failed", "retcode": 10003, "data": null, "message": "missing"})
        );
    }

    #[test]
    fn test_first_write_wins() {
        let w = writer();
        w.write_data("first");
        w.write_failed(RetCode::LOGIC_ERROR, "second");
        w.write_ok();

        let response = w.finish();
        assert!(response.is_ok());
        assert_eq!(response.data(), &json!("first"));
        assert_eq!(response.echo(), Some("e-1"));
    }

    #[test]
    fn test_failed_then_data_keeps_failure() {
        let w = writer();
        w.write_failed(RetCode::BAD_PARAM, "missing parameter `x`");
        w.write_data(json!({"late": true}));

        let response = w.finish();
        assert_eq!(response.retcode(), RetCode::BAD_PARAM);
        assert_eq!(response.message(), "missing parameter `x`");
        assert_eq!(response.echo(), Some("e-1"));
    }

    #[test]
    fn test_no_write_is_bad_handler() {
        let response = writer().finish();
        assert_eq!(response.retcode(), RetCode::BAD_HANDLER);
        assert_eq!(response.echo(), Some("e-1"));
    }
}
