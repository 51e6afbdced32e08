//! Event sinks.
//!
//! A sink is the single delivery callback a transport registers with a
//! runtime instance. The delivery worker calls it once per event, in id
//! order, and never concurrently with itself.

use std::sync::Arc;

use async_trait::async_trait;
use onebot_core::Event;
use tokio::sync::mpsc;
use tracing::warn;

/// Receives delivered events.
#[async_trait]
pub trait EventSink: Send + Sync + 'static {
    async fn deliver(&self, event: Event);
}

/// Shared sink reference.
pub type BoxedEventSink = Arc<dyn EventSink>;

/// Adapts a plain closure into an [`EventSink`].
pub struct FnSink<F>(F);

#[async_trait]
impl<F> EventSink for FnSink<F>
where
    F: Fn(Event) + Send + Sync + 'static,
{
    async fn deliver(&self, event: Event) {
        (self.0)(event)
    }
}

/// Wraps a closure as a sink.
pub fn sink_fn<F>(f: F) -> FnSink<F>
where
    F: Fn(Event) + Send + Sync + 'static,
{
    FnSink(f)
}

/// Forwards events into a channel, e.g. towards a transport's write loop.
#[async_trait]
impl EventSink for mpsc::UnboundedSender<Event> {
    async fn deliver(&self, event: Event) {
        if let Err(e) = self.send(event) {
            warn!(event_id = %e.0.id(), "Event sink channel is closed, event lost");
        }
    }
}

#[async_trait]
impl EventSink for mpsc::Sender<Event> {
    async fn deliver(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!(event_id = %e.0.id(), "Event sink channel is closed, event lost");
        }
    }
}
