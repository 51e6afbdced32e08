//! Ordered push channel.
//!
//! Producers enqueue fully formed events; one delivery worker drains the
//! queue into the sink. Ids are assigned under the runtime's lifecycle lock
//! in the same critical section as the enqueue, so queue order is id order
//! and the single worker preserves it.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::FutureExt;
use onebot_core::Event;
use tokio::sync::mpsc;
use tracing::{error, trace};

use crate::error::PushError;
use crate::runtime::RuntimeState;
use crate::sink::BoxedEventSink;

/// Counters shared by producers and the delivery worker.
#[derive(Debug, Default)]
pub(crate) struct EmitterStats {
    pub(crate) accepted: AtomicU64,
    pub(crate) delivered: AtomicU64,
}

impl EmitterStats {
    pub(crate) fn pending(&self) -> u64 {
        let accepted = self.accepted.load(Ordering::SeqCst);
        let delivered = self.delivered.load(Ordering::SeqCst);
        accepted.saturating_sub(delivered)
    }
}

/// Producer half of the event queue.
pub(crate) enum EventSender {
    Bounded {
        tx: mpsc::Sender<Event>,
        capacity: usize,
    },
    Unbounded(mpsc::UnboundedSender<Event>),
}

/// Consumer half of the event queue.
pub(crate) enum EventReceiver {
    Bounded(mpsc::Receiver<Event>),
    Unbounded(mpsc::UnboundedReceiver<Event>),
}

/// Creates the event queue. `None` means unbounded.
pub(crate) fn channel(capacity: Option<usize>) -> (EventSender, EventReceiver) {
    match capacity {
        Some(capacity) => {
            let (tx, rx) = mpsc::channel(capacity);
            (
                EventSender::Bounded { tx, capacity },
                EventReceiver::Bounded(rx),
            )
        }
        None => {
            let (tx, rx) = mpsc::unbounded_channel();
            (EventSender::Unbounded(tx), EventReceiver::Unbounded(rx))
        }
    }
}

impl EventSender {
    /// Enqueues without waiting.
    pub(crate) fn try_send(&self, event: Event) -> Result<(), PushError> {
        let closed = PushError::Stopped {
            state: RuntimeState::ShuttingDown,
        };
        match self {
            Self::Bounded { tx, capacity } => tx.try_send(event).map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => PushError::QueueFull {
                    capacity: *capacity,
                },
                mpsc::error::TrySendError::Closed(_) => closed,
            }),
            Self::Unbounded(tx) => tx.send(event).map_err(|_| closed),
        }
    }
}

impl EventReceiver {
    async fn recv(&mut self) -> Option<Event> {
        match self {
            Self::Bounded(rx) => rx.recv().await,
            Self::Unbounded(rx) => rx.recv().await,
        }
    }
}

/// Delivers queued events until every sender is gone and the queue is empty.
///
/// A panicking sink loses only the event it panicked on.
pub(crate) async fn deliver_events(
    mut rx: EventReceiver,
    sink: BoxedEventSink,
    stats: std::sync::Arc<EmitterStats>,
) {
    while let Some(event) = rx.recv().await {
        let event_id = event.id().to_string();
        trace!(event_id = %event_id, "Delivering event");

        if let Err(panic) = AssertUnwindSafe(sink.deliver(event)).catch_unwind().await {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic payload".to_string());
            error!(event_id = %event_id, reason = %reason, "Event sink panicked");
        }
        stats.delivered.fetch_add(1, Ordering::SeqCst);
    }
    trace!("Event queue drained");
}
