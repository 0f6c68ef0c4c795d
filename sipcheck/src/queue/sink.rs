use std::fmt;

use tokio::sync::mpsc::{UnboundedSender, WeakUnboundedSender};

use crate::Event;

/// Producer handle onto an [`EventQueue`](crate::EventQueue).
///
/// Cheap to clone; every producer (mock peer, signal bridge, async calls)
/// holds its own. Appending never blocks and never fails: once the queue is
/// gone the event is dropped.
#[derive(Clone)]
pub struct EventSink {
    sender: UnboundedSender<Event>,
}

impl EventSink {
    pub(crate) fn new(sender: UnboundedSender<Event>) -> Self {
        Self { sender }
    }

    pub(crate) fn downgrade(&self) -> WeakUnboundedSender<Event> {
        self.sender.downgrade()
    }

    pub(crate) fn upgrade(weak: &WeakUnboundedSender<Event>) -> Option<Self> {
        weak.upgrade().map(Self::new)
    }

    /// Append an event to the tail of the queue.
    pub fn append(&self, event: Event) {
        let id = event.id();
        if self.sender.send(event).is_err() {
            tracing::trace!(event_id = %id, "queue closed, event dropped");
        }
    }

    /// Whether the queue has been dropped.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSink")
            .field("closed", &self.sender.is_closed())
            .finish()
    }
}
