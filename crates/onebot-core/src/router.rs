//! Action routing.
//!
//! The [`ActionRouter`] maps action names to handlers. Standard actions and
//! extension actions (`{prefix}.{name}`) share one table; the router draws no
//! distinction between them beyond the name.
//!
//! # Dispatch
//!
//! 1. The action name is looked up by exact, case-sensitive match.
//! 2. An unknown name yields `UNSUPPORTED_ACTION` without invoking anything,
//!    except `get_supported_actions`, which the router answers itself unless a
//!    handler was registered for it.
//! 3. A known name runs its handler with a fresh [`ResponseWriter`].
//! 4. A handler that never writes yields `BAD_HANDLER`; extra writes are
//!    dropped with a warning.
//! 5. A handler that panics yields `INTERNAL_HANDLER_ERROR`. The panic does not
//!    leave the dispatch call.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tracing::{Instrument, debug, debug_span, error};

use crate::action::{
    ActionHandler, BoxedActionHandler, GET_SUPPORTED_ACTIONS, extended_name, handler_fn,
};
use crate::request::Request;
use crate::response::{Response, ResponseWriter};
use crate::retcode::RetCode;

/// A registry from action name to handler.
///
/// Handlers are reference counted, so a router can be cloned and shared by
/// several runtime instances.
#[derive(Clone, Default)]
pub struct ActionRouter {
    handlers: HashMap<String, BoxedActionHandler>,
}

impl ActionRouter {
    /// Creates an empty router.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Registers a handler for `action`.
    ///
    /// Registering a name that is already present replaces the previous
    /// handler: the last registration wins. This is intentional so that a
    /// hosting program can re-register while iterating on its handlers.
    pub fn register(&mut self, action: impl Into<String>, handler: impl ActionHandler) {
        self.register_boxed(action, Arc::new(handler));
    }

    /// Registers an already shared handler.
    pub fn register_boxed(&mut self, action: impl Into<String>, handler: BoxedActionHandler) {
        let action = action.into();
        if self.handlers.insert(action.clone(), handler).is_some() {
            debug!(action = %action, "Replaced previously registered handler");
        } else {
            debug!(action = %action, "Registered action handler");
        }
    }

    /// Registers a plain closure as the handler for `action`.
    pub fn register_fn<F>(&mut self, action: impl Into<String>, f: F)
    where
        F: Fn(&ResponseWriter, &Request) + Send + Sync + 'static,
    {
        self.register(action, handler_fn(f));
    }

    /// Registers an extension action named `{prefix}.{name}`.
    pub fn register_extended(&mut self, prefix: &str, name: &str, handler: impl ActionHandler) {
        self.register(extended_name(prefix, name), handler);
    }

    /// Registers a handler (builder pattern).
    pub fn with(mut self, action: impl Into<String>, handler: impl ActionHandler) -> Self {
        self.register(action, handler);
        self
    }

    /// Returns true if `action` has a handler.
    pub fn contains(&self, action: &str) -> bool {
        self.handlers.contains_key(action)
    }

    /// Returns the number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Returns the sorted names this router answers, including
    /// `get_supported_actions`.
    pub fn supported_actions(&self) -> Vec<String> {
        let mut actions: Vec<String> = self.handlers.keys().cloned().collect();
        if !self.contains(GET_SUPPORTED_ACTIONS) {
            actions.push(GET_SUPPORTED_ACTIONS.to_string());
        }
        actions.sort();
        actions
    }

    /// Dispatches a request to its handler and returns the response.
    ///
    /// This never panics and always returns a response carrying the request
    /// echo.
    pub async fn dispatch(&self, request: &Request) -> Response {
        let span = debug_span!("dispatch", action = %request.action());
        let writer = ResponseWriter::new(request);

        async move {
            let Some(handler) = self.handlers.get(request.action()) else {
                if request.action() == GET_SUPPORTED_ACTIONS {
                    writer.write_data(self.supported_actions());
                } else {
                    debug!("No handler registered for action");
                    writer.write_failed(
                        RetCode::UNSUPPORTED_ACTION,
                        format!("unsupported action `{}`", request.action()),
                    );
                }
                return writer.finish();
            };

            let outcome = AssertUnwindSafe(handler.handle(&writer, request))
                .catch_unwind()
                .await;

            match outcome {
                Ok(()) => {
                    let response = writer.finish();
                    debug!(retcode = %response.retcode(), "Action handled");
                    response
                }
                Err(panic) => {
                    let reason = panic_message(panic.as_ref());
                    error!(reason = %reason, "Action handler panicked");
                    Response::failed(
                        RetCode::INTERNAL_HANDLER_ERROR,
                        format!("handler panicked: {reason}"),
                    )
                    .with_echo(request.echo.clone())
                }
            }
        }
        .instrument(span)
        .await
    }
}

/// Extracts a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

impl std::fmt::Debug for ActionRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionRouter")
            .field("actions", &self.supported_actions())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{GET_VERSION, SEND_MESSAGE};
    use crate::params::{ParamGetter, Params};
    use crate::response::Status;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting(Arc<AtomicUsize>);

    #[async_trait]
    impl ActionHandler for Counting {
        async fn handle(&self, w: &ResponseWriter, _r: &Request) {
            tokio::task::yield_now().await;
            let n = self.0.fetch_add(1, Ordering::SeqCst) + 1;
            w.write_data(json!({ "count": n }));
        }
    }

    #[tokio::test]
    async fn test_unsupported_action() {
        let mut router = ActionRouter::new();
        router.register_fn(GET_VERSION, |w, _| w.write_data("1.0.0"));
        router.register_fn(SEND_MESSAGE, |w, _| w.write_ok());

        let response = router
            .dispatch(&Request::new("ns.unknown").with_echo("42"))
            .await;
        assert_eq!(response.status(), Status::Failed);
        assert_eq!(response.retcode(), RetCode::UNSUPPORTED_ACTION);
        assert_eq!(response.echo(), Some("42"));
    }

    #[tokio::test]
    async fn test_lookup_is_case_sensitive() {
        let mut router = ActionRouter::new();
        router.register_fn(GET_VERSION, |w, _| w.write_ok());

        let response = router.dispatch(&Request::new("Get_Version")).await;
        assert_eq!(response.retcode(), RetCode::UNSUPPORTED_ACTION);
    }

    #[tokio::test]
    async fn test_async_handler() {
        let counter = Arc::new(AtomicUsize::new(0));
        let router = ActionRouter::new().with("count", Counting(Arc::clone(&counter)));

        router.dispatch(&Request::new("count")).await;
        let response = router.dispatch(&Request::new("count")).await;

        assert!(response.is_ok());
        assert_eq!(response.data(), &json!({ "count": 2 }));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_last_registration_wins() {
        let mut router = ActionRouter::new();
        router.register_fn("repl.test", |w, _| w.write_data("old"));
        router.register_fn("repl.test", |w, _| w.write_data("new"));

        assert_eq!(router.len(), 1);
        let response = router.dispatch(&Request::new("repl.test")).await;
        assert_eq!(response.data(), &json!("new"));
    }

    #[tokio::test]
    async fn test_extended_registration() {
        let mut router = ActionRouter::new();
        router.register_extended("repl", "some_test_action", handler_fn(|w, _| {
            w.write_data("It works!")
        }));

        assert!(router.contains("repl.some_test_action"));
        let response = router.dispatch(&Request::new("repl.some_test_action")).await;
        assert_eq!(response.data(), &json!("It works!"));
    }

    #[tokio::test]
    async fn test_panic_is_isolated() {
        let mut router = ActionRouter::new();
        router.register_fn("boom", |_, _| panic!("kaboom"));
        router.register_fn("fine", |w, _| w.write_ok());

        let response = router.dispatch(&Request::new("boom").with_echo("x")).await;
        assert_eq!(response.retcode(), RetCode::INTERNAL_HANDLER_ERROR);
        assert!(response.message().contains("kaboom"));
        assert_eq!(response.echo(), Some("x"));

        let response = router.dispatch(&Request::new("fine")).await;
        assert!(response.is_ok());
    }

    #[tokio::test]
    async fn test_handler_without_write() {
        let mut router = ActionRouter::new();
        router.register_fn("silent", |_, _| {});

        let response = router.dispatch(&Request::new("silent")).await;
        assert_eq!(response.retcode(), RetCode::BAD_HANDLER);
    }

    #[tokio::test]
    async fn test_late_write_after_param_failure_is_ignored() {
        let mut router = ActionRouter::new();
        router.register_fn(SEND_MESSAGE, |w, r| {
            let p = ParamGetter::new(w, r);
            let _ = p.get_str("user_id");
            // Buggy handler: keeps going after the getter already answered.
            w.write_data(json!({ "message_id": "1" }));
        });

        let response = router.dispatch(&Request::new(SEND_MESSAGE)).await;
        assert_eq!(response.retcode(), RetCode::BAD_PARAM);
        assert_eq!(response.data(), &json!(null));
    }

    #[tokio::test]
    async fn test_builtin_supported_actions() {
        let mut router = ActionRouter::new();
        router.register_fn(SEND_MESSAGE, |w, _| w.write_ok());
        router.register_fn(GET_VERSION, |w, _| w.write_ok());

        let response = router
            .dispatch(&Request::new(GET_SUPPORTED_ACTIONS).with_params(Params::new()))
            .await;
        assert_eq!(
            response.data(),
            &json!(["get_supported_actions", "get_version", "send_message"])
        );
    }
}
