//! OneBot Runtime - the instance layer of a OneBot implementation.
//!
//! This crate provides:
//! - The runtime instance and its lifecycle (`OneBotRuntime`, `RuntimeState`)
//! - Ordered event delivery to a transport-supplied sink (`EventSink`)
//! - Per-instance id generation (`IdGenerator`)
//! - Layered configuration (`config`) and logging setup (`logging`)
//!
//! Transports are not part of this crate. A transport registers a sink,
//! feeds inbound requests to [`OneBotRuntime::dispatch`] or
//! [`OneBotRuntime::dispatch_raw`], and writes the returned responses back.
//!
//! ```ignore
//! use onebot_runtime::{OneBotRuntime, sink_fn};
//! use onebot_core::{BotSelf, EventPayload};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut runtime = OneBotRuntime::new("mybot", BotSelf::new("mybot", "1"), Default::default());
//!     runtime.set_sink(sink_fn(|event| println!("{}", serde_json::to_string(&event).unwrap())))?;
//!
//!     runtime.start().await?;
//!     runtime.push(EventPayload::heartbeat(10_000))?;
//!     runtime.stop().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
mod emitter;
pub mod error;
pub mod id;
pub mod logging;
pub mod runtime;
pub mod sink;

// Re-exports
pub use config::{ConfigError, ConfigLoader, ConfigResult, RuntimeConfig};
pub use error::{PushError, RuntimeError, RuntimeResult};
pub use id::IdGenerator;
pub use logging::LoggingBuilder;
pub use runtime::{OneBotRuntime, RuntimeState, RuntimeStats};
pub use sink::{BoxedEventSink, EventSink, FnSink, sink_fn};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Prelude module for convenient imports.
///
/// Besides the runtime types this brings the logging macros into scope.
pub mod prelude {
    pub use super::{EventSink, OneBotRuntime, PushError, RuntimeConfig, RuntimeState, sink_fn};
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
