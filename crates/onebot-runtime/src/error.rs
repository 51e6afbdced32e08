//! Runtime error types.

use thiserror::Error;

use crate::config::ConfigError;
use crate::runtime::RuntimeState;

/// Errors that can occur during runtime operations.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// `start` was called before an event sink was registered.
    #[error("No event sink registered")]
    NoSink,

    /// A second event sink was registered.
    #[error("An event sink is already registered")]
    SinkAlreadyRegistered,

    /// The operation is not allowed in the current lifecycle state.
    #[error("Cannot {operation} while the runtime is {state}")]
    InvalidTransition {
        operation: &'static str,
        state: RuntimeState,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Errors returned synchronously by [`OneBotRuntime::push`](crate::OneBotRuntime::push).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PushError {
    /// The runtime is not accepting events.
    #[error("Runtime is not running (state: {state})")]
    Stopped { state: RuntimeState },

    /// The bounded event queue has no room left.
    #[error("Event queue is full (capacity: {capacity})")]
    QueueFull { capacity: usize },
}
