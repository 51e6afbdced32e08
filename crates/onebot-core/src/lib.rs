//! # OneBot Core
//!
//! The protocol substrate of a OneBot implementation, independent of any
//! transport:
//!
//! - **Message Model**: ordered segments with lossless pass-through of unknown
//!   kinds ([`Message`], [`Segment`])
//! - **Parameter Extraction**: typed accessors that fail closed ([`Params`],
//!   [`ParamGetter`])
//! - **Action Routing**: name to handler registry with panic isolation
//!   ([`ActionRouter`], [`ActionHandler`])
//! - **Responses**: retcode-consistent envelopes and an exactly-once writer
//!   ([`Response`], [`ResponseWriter`], [`RetCode`])
//! - **Events**: typed payloads and the delivered envelope ([`EventPayload`],
//!   [`Event`])
//!
//! ```text
//! transport ──Request──▶ ActionRouter ──▶ ActionHandler
//!     ▲                       │                │ ParamGetter
//!     └──────Response─────────┴── ResponseWriter ◀┘
//! ```
//!
//! The runtime instance that owns a router and delivers events lives in the
//! `onebot-runtime` crate.

pub mod action;
pub mod event;
pub mod message;
pub mod params;
pub mod request;
pub mod response;
pub mod retcode;
pub mod router;

pub use action::{
    ActionHandler, BoxedActionHandler, FnHandler, ONEBOT_VERSION, STANDARD_ACTIONS,
    extended_name, handler_fn,
};
pub use event::{Event, EventPayload, EventType};
pub use message::{Message, MessageError, Segment, SegmentKind};
pub use params::{ParamError, ParamGetter, ParamResult, Params};
pub use request::{BotSelf, Request, RequestError};
pub use response::{Response, ResponseWriter, Status};
pub use retcode::{RetCode, RetCodeCategory};
pub use router::ActionRouter;

// Re-exported so handler crates agree on the same versions.
pub use async_trait::async_trait;
pub use serde_json;

/// Prelude for handler code.
pub mod prelude {
    pub use super::action::{self as actions, ActionHandler, handler_fn};
    pub use super::{
        ActionRouter, BotSelf, Event, EventPayload, EventType, Message, ParamGetter, Params,
        Request, Response, ResponseWriter, RetCode, Segment, SegmentKind, async_trait,
    };
}
