//! EventBus - broadcast distribution of engine events
//!
//! Engine components emit into the bus without waiting on observers.
//!
//! - `tokio::sync::broadcast` underneath: every subscriber sees every event
//! - emitting never blocks; with no subscribers the event is dropped
//! - a lagging receiver loses its oldest events instead of applying
//!   backpressure to the engine

use super::EngineEvent;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Default capacity for the event bus channel
pub const DEFAULT_CAPACITY: usize = 1024;

/// Cloneable handle to a shared broadcast channel of `EngineEvent`s.
///
/// ```rust,ignore
/// use accuracy::events::{EngineEvent, EventBus};
///
/// let bus = EventBus::new(256);
/// let mut rx = bus.subscribe();
/// bus.emit(EngineEvent::batch_requested(1, 4, 0));
/// let event = rx.recv().await?;
/// ```
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<EngineEvent>>,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per lagging receiver.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }

    /// Fire-and-forget emit.
    pub fn emit(&self, event: EngineEvent) {
        // no receivers is not an error
        let _ = self.sender.send(event);
    }

    /// Receive every event emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn has_subscribers(&self) -> bool {
        self.subscriber_count() > 0
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}
