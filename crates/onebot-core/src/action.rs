//! Action handlers and the standard action names.

use std::sync::Arc;

use async_trait::async_trait;

use crate::request::Request;
use crate::response::ResponseWriter;

/// The OneBot protocol version these names and codes follow.
pub const ONEBOT_VERSION: &str = "12";

// Standard action names.

pub const GET_LATEST_EVENTS: &str = "get_latest_events";
pub const GET_SUPPORTED_ACTIONS: &str = "get_supported_actions";
pub const GET_STATUS: &str = "get_status";
pub const GET_VERSION: &str = "get_version";

pub const GET_SELF_INFO: &str = "get_self_info";
pub const GET_USER_INFO: &str = "get_user_info";
pub const GET_FRIEND_LIST: &str = "get_friend_list";

pub const SEND_MESSAGE: &str = "send_message";
pub const DELETE_MESSAGE: &str = "delete_message";

pub const GET_GROUP_INFO: &str = "get_group_info";
pub const GET_GROUP_LIST: &str = "get_group_list";
pub const GET_GROUP_MEMBER_INFO: &str = "get_group_member_info";
pub const GET_GROUP_MEMBER_LIST: &str = "get_group_member_list";
pub const SET_GROUP_NAME: &str = "set_group_name";
pub const LEAVE_GROUP: &str = "leave_group";

pub const UPLOAD_FILE: &str = "upload_file";
pub const GET_FILE: &str = "get_file";

/// All standard action names.
pub const STANDARD_ACTIONS: &[&str] = &[
    GET_LATEST_EVENTS,
    GET_SUPPORTED_ACTIONS,
    GET_STATUS,
    GET_VERSION,
    GET_SELF_INFO,
    GET_USER_INFO,
    GET_FRIEND_LIST,
    SEND_MESSAGE,
    DELETE_MESSAGE,
    GET_GROUP_INFO,
    GET_GROUP_LIST,
    GET_GROUP_MEMBER_INFO,
    GET_GROUP_MEMBER_LIST,
    SET_GROUP_NAME,
    LEAVE_GROUP,
    UPLOAD_FILE,
    GET_FILE,
];

/// Builds the name of an extension action or event: `{prefix}.{name}`.
pub fn extended_name(prefix: &str, name: &str) -> String {
    format!("{prefix}.{name}")
}

/// Handles one action.
///
/// A handler performs its work and writes exactly one response to the
/// writer, either directly or through a [`ParamGetter`](crate::ParamGetter)
/// that answers failed extractions on its behalf.
///
/// # Example
///
/// ```rust,ignore
/// struct GetVersion;
///
/// #[async_trait]
/// impl ActionHandler for GetVersion {
///     async fn handle(&self, w: &ResponseWriter, _r: &Request) {
///         w.write_data(json!({ "impl": "repl", "version": "0.1.0" }));
///     }
/// }
/// ```
#[async_trait]
pub trait ActionHandler: Send + Sync + 'static {
    async fn handle(&self, writer: &ResponseWriter, request: &Request);
}

/// Shared handler reference stored in a router.
pub type BoxedActionHandler = Arc<dyn ActionHandler>;

/// Adapts a plain closure into an [`ActionHandler`].
pub struct FnHandler<F>(F);

impl<F> FnHandler<F>
where
    F: Fn(&ResponseWriter, &Request) + Send + Sync + 'static,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F> ActionHandler for FnHandler<F>
where
    F: Fn(&ResponseWriter, &Request) + Send + Sync + 'static,
{
    async fn handle(&self, writer: &ResponseWriter, request: &Request) {
        (self.0)(writer, request)
    }
}

/// Wraps a closure as a handler.
pub fn handler_fn<F>(f: F) -> FnHandler<F>
where
    F: Fn(&ResponseWriter, &Request) + Send + Sync + 'static,
{
    FnHandler::new(f)
}
