//! The runtime instance.
//!
//! A [`OneBotRuntime`] owns one bot identity, the action router, the push
//! channel and the id generator, and drives the lifecycle
//!
//! ```text
//! Created ──start──▶ Running ──stop──▶ ShuttingDown ──drain──▶ Stopped
//!    └──────────────────────stop──────────────────────────────────┘
//! ```
//!
//! Wiring (`register`, `set_router`, `set_sink`) takes `&mut self` and is only
//! accepted in `Created`; once the runtime is shared behind an `Arc` the
//! registry is read-only. `dispatch` and `push` are accepted only while
//! `Running`.
//!
//! # Example
//!
//! ```rust,ignore
//! let mut runtime = OneBotRuntime::new("repl", BotSelf::new("repl", "bot"), config);
//! runtime.register_fn(actions::GET_VERSION, |w, _| w.write_data(json!({"version": "1"})))?;
//! runtime.set_sink(sink_fn(|event| println!("{}", event.name())))?;
//!
//! let runtime = Arc::new(runtime);
//! runtime.start().await?;
//! runtime.push(EventPayload::heartbeat(10_000))?;
//! runtime.stop().await?;
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use onebot_core::action::{GET_STATUS, GET_SUPPORTED_ACTIONS};
use onebot_core::{
    ActionHandler, ActionRouter, BotSelf, Event, EventPayload, Request, Response, RetCode,
    handler_fn,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::config::RuntimeConfig;
use crate::emitter::{self, EmitterStats, EventSender};
use crate::error::{PushError, RuntimeError, RuntimeResult};
use crate::id::IdGenerator;
use crate::sink::{BoxedEventSink, EventSink};

/// Lifecycle state of a runtime instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeState {
    Created,
    Running,
    ShuttingDown,
    Stopped,
}

impl RuntimeState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::ShuttingDown => "shutting_down",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for RuntimeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counters describing the work a runtime has done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RuntimeStats {
    pub state: RuntimeState,
    /// Requests handed to the router.
    pub dispatched: u64,
    /// Events accepted by `push`.
    pub events_pushed: u64,
    /// Events that went through the sink.
    pub events_delivered: u64,
}

struct Lifecycle {
    state: RuntimeState,
    /// Present only while `Running`; dropping it lets the worker drain and exit.
    sender: Option<EventSender>,
    worker: Option<JoinHandle<()>>,
}

enum StopAction {
    Done,
    Wait(watch::Receiver<RuntimeState>),
    Drain(Option<JoinHandle<()>>),
}

/// One OneBot implementation instance.
pub struct OneBotRuntime {
    impl_name: String,
    bot_self: BotSelf,
    config: RuntimeConfig,
    router: ActionRouter,
    sink: Option<BoxedEventSink>,
    ids: Arc<IdGenerator>,
    lifecycle: Arc<Mutex<Lifecycle>>,
    state_tx: Arc<watch::Sender<RuntimeState>>,
    /// Tracks in-flight dispatches and the delivery worker.
    tracker: TaskTracker,
    stats: Arc<EmitterStats>,
    dispatched: AtomicU64,
}

impl OneBotRuntime {
    /// Creates a runtime in the `Created` state.
    pub fn new(impl_name: impl Into<String>, bot_self: BotSelf, config: RuntimeConfig) -> Self {
        let (state_tx, _) = watch::channel(RuntimeState::Created);
        Self {
            impl_name: impl_name.into(),
            bot_self,
            config,
            router: ActionRouter::new(),
            sink: None,
            ids: Arc::new(IdGenerator::new()),
            lifecycle: Arc::new(Mutex::new(Lifecycle {
                state: RuntimeState::Created,
                sender: None,
                worker: None,
            })),
            state_tx: Arc::new(state_tx),
            tracker: TaskTracker::new(),
            stats: Arc::new(EmitterStats::default()),
            dispatched: AtomicU64::new(0),
        }
    }

    pub fn impl_name(&self) -> &str {
        &self.impl_name
    }

    pub fn bot_self(&self) -> &BotSelf {
        &self.bot_self
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn router(&self) -> &ActionRouter {
        &self.router
    }

    // =========================================================================
    // Wiring
    // =========================================================================

    fn ensure_created(&self, operation: &'static str) -> RuntimeResult<()> {
        let state = self.lifecycle.lock().state;
        if state == RuntimeState::Created {
            Ok(())
        } else {
            Err(RuntimeError::InvalidTransition { operation, state })
        }
    }

    /// Registers a handler for a standard action name.
    ///
    /// The last registration for a name wins.
    pub fn register(
        &mut self,
        action: impl Into<String>,
        handler: impl ActionHandler,
    ) -> RuntimeResult<()> {
        self.ensure_created("register an action")?;
        self.router.register(action, handler);
        Ok(())
    }

    /// Registers a plain closure as a handler.
    pub fn register_fn<F>(&mut self, action: impl Into<String>, f: F) -> RuntimeResult<()>
    where
        F: Fn(&onebot_core::ResponseWriter, &Request) + Send + Sync + 'static,
    {
        self.register(action, handler_fn(f))
    }

    /// Registers an extension action named `{platform}.{name}`.
    pub fn register_extended(
        &mut self,
        name: &str,
        handler: impl ActionHandler,
    ) -> RuntimeResult<()> {
        self.ensure_created("register an action")?;
        let prefix = self.bot_self.platform.clone();
        self.router.register_extended(&prefix, name, handler);
        Ok(())
    }

    /// Replaces the whole router.
    pub fn set_router(&mut self, router: ActionRouter) -> RuntimeResult<()> {
        self.ensure_created("replace the router")?;
        self.router = router;
        Ok(())
    }

    /// Registers the one event sink of this instance.
    pub fn set_sink(&mut self, sink: impl EventSink) -> RuntimeResult<()> {
        self.ensure_created("register a sink")?;
        if self.sink.is_some() {
            return Err(RuntimeError::SinkAlreadyRegistered);
        }
        self.sink = Some(Arc::new(sink));
        Ok(())
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Returns the current lifecycle state.
    pub fn state(&self) -> RuntimeState {
        *self.state_tx.borrow()
    }

    /// Subscribes to lifecycle transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<RuntimeState> {
        self.state_tx.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.state() == RuntimeState::Running
    }

    /// Moves the runtime to `Running` and spawns the delivery worker.
    ///
    /// The configuration is validated first; an invalid one leaves the
    /// runtime in `Created`.
    pub async fn start(&self) -> RuntimeResult<()> {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.state != RuntimeState::Created {
            return Err(RuntimeError::InvalidTransition {
                operation: "start",
                state: lifecycle.state,
            });
        }
        self.config.validate()?;
        let sink = self.sink.clone().ok_or(RuntimeError::NoSink)?;

        let (tx, rx) = emitter::channel(self.config.event_queue.capacity);
        let worker = self
            .tracker
            .spawn(emitter::deliver_events(rx, sink, Arc::clone(&self.stats)));

        lifecycle.sender = Some(tx);
        lifecycle.worker = Some(worker);
        lifecycle.state = RuntimeState::Running;
        self.state_tx.send_replace(RuntimeState::Running);

        info!(
            bot = %self.bot_self,
            actions = self.router.len(),
            queue_capacity = ?self.config.event_queue.capacity,
            "OneBot runtime started"
        );
        Ok(())
    }

    /// Stops the runtime.
    ///
    /// New pushes and dispatches are refused right away. The call then waits
    /// up to the configured drain timeout for in-flight dispatches and queued
    /// events; events still queued after that are dropped and counted in a
    /// warning. Calling `stop` again, or concurrently, waits for the same
    /// shutdown to finish.
    ///
    /// The drain runs as a task of its own, so dropping a `stop` future does
    /// not leave the runtime stuck in `ShuttingDown`.
    pub async fn stop(&self) -> RuntimeResult<()> {
        let action = {
            let mut lifecycle = self.lifecycle.lock();
            match lifecycle.state {
                RuntimeState::Created => {
                    lifecycle.state = RuntimeState::Stopped;
                    self.tracker.close();
                    self.state_tx.send_replace(RuntimeState::Stopped);
                    info!(bot = %self.bot_self, "OneBot runtime stopped before start");
                    StopAction::Done
                }
                RuntimeState::Running => {
                    lifecycle.state = RuntimeState::ShuttingDown;
                    lifecycle.sender = None;
                    self.state_tx.send_replace(RuntimeState::ShuttingDown);
                    StopAction::Drain(lifecycle.worker.take())
                }
                RuntimeState::ShuttingDown => StopAction::Wait(self.state_tx.subscribe()),
                RuntimeState::Stopped => {
                    debug!("Runtime already stopped");
                    StopAction::Done
                }
            }
        };

        match action {
            StopAction::Done => {}
            StopAction::Wait(rx) => wait_stopped(rx).await,
            StopAction::Drain(worker) => {
                let rx = self.state_tx.subscribe();
                tokio::spawn(self.drain_task().run(worker));
                wait_stopped(rx).await;
            }
        }
        Ok(())
    }

    fn drain_task(&self) -> Drain {
        Drain {
            bot_self: self.bot_self.clone(),
            lifecycle: Arc::clone(&self.lifecycle),
            state_tx: Arc::clone(&self.state_tx),
            tracker: self.tracker.clone(),
            stats: Arc::clone(&self.stats),
            timeout: self.config.shutdown.drain_timeout(),
            timeout_ms: self.config.shutdown.drain_timeout_ms,
        }
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    /// Dispatches one action request.
    ///
    /// Always returns a response; the request echo is carried over.
    pub async fn dispatch(&self, request: &Request) -> Response {
        let _token = {
            let lifecycle = self.lifecycle.lock();
            if lifecycle.state != RuntimeState::Running {
                return Response::failed(
                    RetCode::I_AM_TIRED,
                    format!("runtime is not running (state: {})", lifecycle.state),
                )
                .with_echo(request.echo.clone());
            }
            self.tracker.token()
        };

        if let Some(target) = &request.bot_self
            && target != &self.bot_self
        {
            debug!(target = %target, "Request addressed to another bot");
            return Response::failed(RetCode::UNKNOWN_SELF, format!("unknown self `{target}`"))
                .with_echo(request.echo.clone());
        }

        self.dispatched.fetch_add(1, Ordering::Relaxed);

        match request.action() {
            GET_STATUS if !self.router.contains(GET_STATUS) => {
                return Response::ok(self.status()).with_echo(request.echo.clone());
            }
            GET_SUPPORTED_ACTIONS if !self.router.contains(GET_SUPPORTED_ACTIONS) => {
                return Response::ok(json!(self.supported_actions()))
                    .with_echo(request.echo.clone());
            }
            _ => {}
        }
        self.router.dispatch(request).await
    }

    /// Parses a raw JSON request envelope and dispatches it.
    ///
    /// A malformed envelope yields `BAD_REQUEST`, with the echo kept if one
    /// could be read.
    pub async fn dispatch_raw(&self, bytes: &[u8]) -> Response {
        match Request::from_slice(bytes) {
            Ok(request) => self.dispatch(&request).await,
            Err((e, echo)) => {
                debug!(error = %e, "Rejected malformed request");
                Response::failed(RetCode::BAD_REQUEST, e.to_string()).with_echo(echo)
            }
        }
    }

    // =========================================================================
    // Events and ids
    // =========================================================================

    /// Pushes an event and returns its id.
    ///
    /// Never blocks. Ids are assigned in the same critical section as the
    /// enqueue, so the sink sees events in id order.
    pub fn push(&self, payload: EventPayload) -> Result<String, PushError> {
        let lifecycle = self.lifecycle.lock();
        let sender = match (&lifecycle.sender, lifecycle.state) {
            (Some(sender), RuntimeState::Running) => sender,
            (_, state) => return Err(PushError::Stopped { state }),
        };

        let id = self.ids.next_id();
        let event = Event::new(id.clone(), unix_now(), self.bot_self.clone(), payload);
        let name = event.name();
        sender.try_send(event)?;
        self.stats.accepted.fetch_add(1, Ordering::SeqCst);
        drop(lifecycle);

        debug!(event_id = %id, event = %name, "Event queued");
        Ok(id)
    }

    /// Returns a fresh message id.
    ///
    /// Message ids and event ids come from the same counter.
    pub fn next_message_id(&self) -> String {
        self.ids.next_id()
    }

    /// Returns the instance's id generator, for handlers that mint ids.
    pub fn id_generator(&self) -> Arc<IdGenerator> {
        Arc::clone(&self.ids)
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// The sorted action names this instance answers, built-ins included.
    pub fn supported_actions(&self) -> Vec<String> {
        let mut actions = self.router.supported_actions();
        if !self.router.contains(GET_STATUS) {
            actions.push(GET_STATUS.to_string());
            actions.sort();
        }
        actions
    }

    /// The `get_status` payload of this instance.
    pub fn status(&self) -> Value {
        let online = self.is_running();
        json!({
            "good": online,
            "bots": [{ "self": self.bot_self, "online": online }],
        })
    }

    /// The `get_self_info` payload of this instance.
    pub fn self_info(&self) -> Value {
        json!({
            "user_id": self.bot_self.user_id,
            "user_name": self.bot_self.user_id,
            "user_displayname": "",
        })
    }

    pub fn stats(&self) -> RuntimeStats {
        RuntimeStats {
            state: self.state(),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            events_pushed: self.stats.accepted.load(Ordering::SeqCst),
            events_delivered: self.stats.delivered.load(Ordering::SeqCst),
        }
    }
}

impl fmt::Debug for OneBotRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OneBotRuntime")
            .field("impl_name", &self.impl_name)
            .field("bot_self", &self.bot_self)
            .field("state", &self.state())
            .field("router", &self.router)
            .finish_non_exhaustive()
    }
}

/// The shutdown half of `stop`, detached from the caller.
struct Drain {
    bot_self: BotSelf,
    lifecycle: Arc<Mutex<Lifecycle>>,
    state_tx: Arc<watch::Sender<RuntimeState>>,
    tracker: TaskTracker,
    stats: Arc<EmitterStats>,
    timeout: Duration,
    timeout_ms: u64,
}

impl Drain {
    async fn run(self, worker: Option<JoinHandle<()>>) {
        info!(
            bot = %self.bot_self,
            pending_events = self.stats.pending(),
            "OneBot runtime shutting down"
        );
        self.tracker.close();

        if tokio::time::timeout(self.timeout, self.tracker.wait())
            .await
            .is_err()
        {
            warn!(
                undelivered = self.stats.pending(),
                in_flight = self.tracker.len().saturating_sub(usize::from(worker.is_some())),
                timeout_ms = self.timeout_ms,
                "Shutdown drain timed out, dropping undelivered events"
            );
            if let Some(worker) = worker {
                worker.abort();
            }
        }

        self.lifecycle.lock().state = RuntimeState::Stopped;
        self.state_tx.send_replace(RuntimeState::Stopped);
        info!(bot = %self.bot_self, "OneBot runtime stopped");
    }
}

async fn wait_stopped(mut rx: watch::Receiver<RuntimeState>) {
    // The sender is shared with the drain task, so this only ends at `Stopped`
    let _ = rx.wait_for(|state| *state == RuntimeState::Stopped).await;
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}
