//! Response return codes.
//!
//! The numeric values follow the OneBot 12 retcode table. Each failure class
//! owns a range, so an implementation may report a more specific sub-code
//! (e.g. `35001`) and clients can still classify it with [`RetCode::category`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// A numeric status code carried in every [`Response`](crate::Response).
///
/// `0` means success; every other value means failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RetCode(i64);

/// The failure class a [`RetCode`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetCodeCategory {
    /// `0`.
    Ok,
    /// `1xxxx`: the request itself was malformed or not understood.
    Request,
    /// `2xxxx`: the action handler misbehaved.
    Handler,
    /// `3xxxx`: the action was understood but could not be carried out.
    Execution,
    /// Anything outside the ranges above.
    Unknown,
}

impl RetCode {
    /// Success.
    pub const OK: Self = Self(0);

    /// The request envelope is malformed.
    pub const BAD_REQUEST: Self = Self(10001);
    /// No handler is registered for the requested action.
    pub const UNSUPPORTED_ACTION: Self = Self(10002);
    /// A parameter is missing or has the wrong shape.
    pub const BAD_PARAM: Self = Self(10003);
    /// A parameter is not supported by this implementation.
    pub const UNSUPPORTED_PARAM: Self = Self(10004);
    /// A message segment kind is not supported.
    pub const UNSUPPORTED_SEGMENT: Self = Self(10005);
    /// A message segment carries malformed data.
    pub const BAD_SEGMENT_DATA: Self = Self(10006);
    /// A message segment carries data this implementation does not support.
    pub const UNSUPPORTED_SEGMENT_DATA: Self = Self(10007);
    /// The request did not say which bot it addresses and one was required.
    pub const WHO_AM_I: Self = Self(10101);
    /// The request addresses a bot this instance does not own.
    pub const UNKNOWN_SELF: Self = Self(10102);

    /// The handler did not produce a well-formed response.
    pub const BAD_HANDLER: Self = Self(20001);
    /// The handler faulted while running.
    pub const INTERNAL_HANDLER_ERROR: Self = Self(20002);

    pub const DATABASE_ERROR: Self = Self(31000);
    pub const FILESYSTEM_ERROR: Self = Self(32000);
    pub const NETWORK_ERROR: Self = Self(33000);
    pub const PLATFORM_ERROR: Self = Self(34000);
    /// A semantic violation, e.g. addressing an unknown recipient.
    pub const LOGIC_ERROR: Self = Self(35000);
    /// The implementation refuses to work right now.
    pub const I_AM_TIRED: Self = Self(36000);

    /// Creates a retcode from its numeric value.
    pub const fn new(code: i64) -> Self {
        Self(code)
    }

    /// Returns the numeric value.
    pub const fn code(self) -> i64 {
        self.0
    }

    /// Returns true for [`RetCode::OK`].
    pub const fn is_ok(self) -> bool {
        self.0 == 0
    }

    /// Classifies the code by its range.
    pub const fn category(self) -> RetCodeCategory {
        match self.0 {
            0 => RetCodeCategory::Ok,
            10000..=19999 => RetCodeCategory::Request,
            20000..=29999 => RetCodeCategory::Handler,
            30000..=39999 => RetCodeCategory::Execution,
            _ => RetCodeCategory::Unknown,
        }
    }
}

impl fmt::Display for RetCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<RetCode> for i64 {
    fn from(code: RetCode) -> Self {
        code.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        assert_eq!(RetCode::OK.category(), RetCodeCategory::Ok);
        assert_eq!(RetCode::BAD_PARAM.category(), RetCodeCategory::Request);
        assert_eq!(RetCode::UNKNOWN_SELF.category(), RetCodeCategory::Request);
        assert_eq!(
            RetCode::INTERNAL_HANDLER_ERROR.category(),
            RetCodeCategory::Handler
        );
        assert_eq!(RetCode::new(35001).category(), RetCodeCategory::Execution);
        assert_eq!(RetCode::new(-1).category(), RetCodeCategory::Unknown);
    }

    #[test]
    fn test_serialize_as_integer() {
        let json = serde_json::to_string(&RetCode::UNSUPPORTED_ACTION).unwrap();
        assert_eq!(json, "10002");

        let code: RetCode = serde_json::from_str("35000").unwrap();
        assert_eq!(code, RetCode::LOGIC_ERROR);
    }
}
