//! The event queue test scripts assert against.
//!
//! Producers append through cloned [`EventSink`]s; the sequential test body
//! owns the [`EventQueue`] and pulls events out of it with
//! [`expect`](EventQueue::expect), or hands control to a [`Dispatcher`] with
//! [`run_handlers_forever`](EventQueue::run_handlers_forever).
//!
//! Ordering: events are kept in the order producers appended them. An
//! expectation removes the *first* matching event and leaves everything it
//! skipped pending, in order, for later expectations.

mod dispatch;
mod expectation;
mod matcher;
mod outcome;
mod sink;

use std::{collections::VecDeque, fmt, time::Duration};

use tokio::{
    sync::mpsc::{self, UnboundedReceiver, WeakUnboundedSender},
    time::Instant,
};

pub use dispatch::{Dispatcher, HandlerContext};
pub use expectation::{ExpectMany, Expectation};
pub use matcher::EventMatcher;
pub use outcome::HandlerOutcome;
pub use sink::EventSink;

use crate::{Config, Error, Event, Result, diagnostics::Diagnostics};

/// Ordered buffer of observed events with "wait for P within T" semantics.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use sipcheck::{Config, Event, EventQueue};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> sipcheck::Result {
/// let (mut queue, sink) = EventQueue::new(&Config::default());
/// sink.append(Event::custom("sig-A"));
/// sink.append(Event::custom("sig-B"));
///
/// let b = queue.expect("sig-B").within(Duration::from_millis(100)).await?;
/// assert!(b.is("sig-B"));
/// // sig-A was skipped, not lost.
/// assert_eq!(queue.len(), 1);
/// # Ok(())
/// # }
/// ```
pub struct EventQueue {
    pending: VecDeque<Event>,
    intake: UnboundedReceiver<Event>,
    weak_sender: WeakUnboundedSender<Event>,
    forbidden: Vec<EventMatcher>,
    default_timeout: Duration,
    diagnostics: Diagnostics,
}

impl fmt::Debug for EventQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventQueue")
            .field("pending", &self.pending.len())
            .field("forbidden", &self.forbidden)
            .field("default_timeout", &self.default_timeout)
            .finish_non_exhaustive()
    }
}

impl EventQueue {
    /// Create a queue and the first producer handle onto it.
    ///
    /// The queue reports [`Error::QueueClosed`] once every sink is dropped
    /// and nothing matching is pending.
    pub fn new(config: &Config) -> (Self, EventSink) {
        let (tx, intake) = mpsc::unbounded_channel();
        let sink = EventSink::new(tx);
        let queue = Self {
            pending: VecDeque::new(),
            intake,
            weak_sender: sink.downgrade(),
            forbidden: Vec::new(),
            default_timeout: config.default_timeout(),
            diagnostics: Diagnostics::new(config.verbose()),
        };
        (queue, sink)
    }

    /// Another producer handle, or `None` if every producer is already gone.
    pub fn sink(&self) -> Option<EventSink> {
        EventSink::upgrade(&self.weak_sender)
    }

    /// Append an event directly to the pending tail.
    ///
    /// Events already sitting in the intake stay ahead of it only if they
    /// were pulled in before; use a sink to preserve producer order.
    pub fn append(&mut self, event: Event) {
        self.pending.push_back(event);
    }

    /// Wait for the first event matching `matcher`.
    ///
    /// Awaiting the returned [`Expectation`] scans pending events from the
    /// head, then waits for new ones until the timeout (the configured
    /// default unless overridden with [`within`](Expectation::within)).
    pub fn expect(&mut self, matcher: impl Into<EventMatcher>) -> Expectation<'_> {
        let timeout = self.default_timeout;
        Expectation::scan(self, matcher.into(), timeout)
    }

    /// Like [`expect`](Self::expect), but the very next event must match;
    /// anything else fails with [`Error::UnexpectedEvent`].
    pub fn demand(&mut self, matcher: impl Into<EventMatcher>) -> Expectation<'_> {
        let timeout = self.default_timeout;
        Expectation::next(self, matcher.into(), timeout)
    }

    /// Wait until every matcher has matched a distinct event, in any
    /// arrival order. Events come back in matcher order.
    pub fn expect_many<I, M>(&mut self, matchers: I) -> ExpectMany<'_>
    where
        I: IntoIterator<Item = M>,
        M: Into<EventMatcher>,
    {
        let timeout = self.default_timeout;
        ExpectMany::new(self, matchers.into_iter().map(Into::into).collect(), timeout)
    }

    /// Fail any subsequent wait on an arriving event that matches `matcher`.
    pub fn forbid(&mut self, matcher: impl Into<EventMatcher>) {
        self.forbidden.push(matcher.into());
    }

    /// Lift a [`forbid`](Self::forbid); matchers are compared by description.
    pub fn unforbid(&mut self, description: &str) {
        self.forbidden.retain(|m| m.description() != description);
    }

    /// Drop every forbidden matcher.
    pub fn unforbid_all(&mut self) {
        self.forbidden.clear();
    }

    /// Events received but not yet consumed, oldest first.
    ///
    /// Only events already pulled in from the intake are visible.
    pub fn pending(&self) -> impl Iterator<Item = &Event> {
        self.pending.iter()
    }

    /// Pull everything producers have appended so far into the pending list.
    pub fn drain_intake(&mut self) -> Result<usize> {
        let before = self.pending.len();
        let pulled = self.pull_ready();
        for event in self.pending.iter().skip(before) {
            self.diagnostics.not_handled(event);
        }
        pulled
    }

    /// Number of pending events.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Remove and return the first pending event matching `matcher`.
    fn take_pending(&mut self, matcher: &EventMatcher) -> Option<Event> {
        let index = self.pending.iter().position(|e| matcher.matches(e))?;
        self.pending.remove(index)
    }

    /// Move every event already sitting in the intake to the pending tail.
    fn pull_ready(&mut self) -> Result<usize> {
        let mut n = 0;
        while let Ok(event) = self.intake.try_recv() {
            let event = self.admit(event)?;
            self.pending.push_back(event);
            n += 1;
        }
        Ok(n)
    }

    /// Receive one event from producers before `deadline`.
    ///
    /// `Ok(None)` means the deadline passed.
    async fn recv_until(&mut self, deadline: Instant) -> Result<Option<Event>> {
        match tokio::time::timeout_at(deadline, self.intake.recv()).await {
            Ok(Some(event)) => self.admit(event).map(Some),
            Ok(None) => Err(Error::QueueClosed),
            Err(_) => Ok(None),
        }
    }

    /// Screen an arriving event against the forbidden list. A forbidden
    /// event is kept at the pending tail and fails the wait.
    fn admit(&mut self, event: Event) -> Result<Event> {
        let Some(matcher) = self.forbidden.iter().find(|m| m.matches(&event)) else {
            return Ok(event);
        };
        tracing::debug!(event_id = %event.id(), forbidden = %matcher, "forbidden event");
        let err = Error::Forbidden {
            description: matcher.description().to_string(),
            event: event.clone(),
        };
        self.pending.push_back(event);
        Err(err)
    }

    fn snapshot(&self) -> Vec<Event> {
        self.pending.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EventKind;

    fn queue() -> (EventQueue, EventSink) {
        EventQueue::new(&Config::default().with_default_timeout(Duration::from_millis(100)))
    }

    #[tokio::test]
    async fn sink_appends_arrive_in_order() {
        let (mut queue, sink) = queue();
        for label in ["a", "b", "c"] {
            sink.append(Event::custom(label));
        }
        assert_eq!(queue.drain_intake().unwrap(), 3);
        let labels: Vec<_> = queue.pending().map(|e| e.to_string()).collect();
        assert_eq!(labels, ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn sink_is_none_after_producers_drop() {
        let (queue, sink) = queue();
        assert!(queue.sink().is_some());
        drop(sink);
        assert!(queue.sink().is_none());
    }

    #[tokio::test]
    async fn forbidden_event_fails_drain() {
        let (mut queue, sink) = queue();
        queue.forbid("peer-bye");
        sink.append(Event::builder(EventKind::peer_request("BYE")).build());
        let err = queue.drain_intake().unwrap_err();
        assert!(matches!(err, Error::Forbidden { .. }), "{err:?}");
        // The offending event stays queued.
        assert_eq!(queue.len(), 1);
        assert!(queue.pending().all(|e| e.is("peer-bye")));

        queue.unforbid("\"peer-bye\"");
        sink.append(Event::builder(EventKind::peer_request("BYE")).build());
        assert_eq!(queue.drain_intake().unwrap(), 1);
        assert_eq!(queue.len(), 2);
    }

    #[tokio::test]
    async fn direct_append_goes_to_tail() {
        let (mut queue, _sink) = queue();
        queue.append(Event::custom("first"));
        queue.append(Event::custom("second"));
        assert_eq!(queue.len(), 2);
        assert!(queue.pending().next().is_some_and(|e| e.is("first")));
    }
}
