use std::{collections::VecDeque, fmt, future::IntoFuture, pin::Pin, time::Duration};

use tokio::time::Instant;

use crate::{Error, Event, EventQueue, Result};

use super::EventMatcher;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// First match anywhere; non-matches stay pending.
    Scan,
    /// The next event must match.
    Next,
}

/// A pending wait for one event.
///
/// Created by [`EventQueue::expect`] or [`EventQueue::demand`]; does nothing
/// until awaited. The deadline is measured from the moment it is awaited.
///
/// # Example
///
/// ```ignore
/// let reply = queue.expect("remote-return").await?;
///
/// // With a custom timeout
/// let invite = queue
///     .expect(EventMatcher::by_label("peer-invite").with_field("to", to))
///     .within(Duration::from_secs(10))
///     .await?;
/// ```
#[must_use = "an expectation does nothing unless awaited"]
pub struct Expectation<'a> {
    queue: &'a mut EventQueue,
    matcher: EventMatcher,
    timeout: Duration,
    mode: Mode,
}

impl<'a> Expectation<'a> {
    pub(crate) fn scan(queue: &'a mut EventQueue, matcher: EventMatcher, timeout: Duration) -> Self {
        Self {
            queue,
            matcher,
            timeout,
            mode: Mode::Scan,
        }
    }

    pub(crate) fn next(queue: &'a mut EventQueue, matcher: EventMatcher, timeout: Duration) -> Self {
        Self {
            queue,
            matcher,
            timeout,
            mode: Mode::Next,
        }
    }

    /// Override the queue's default timeout.
    pub fn within(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn run(self) -> Result<Event> {
        let deadline = Instant::now() + self.timeout;
        match self.mode {
            Mode::Scan => self.run_scan(deadline).await,
            Mode::Next => self.run_next(deadline).await,
        }
    }

    async fn run_scan(self, deadline: Instant) -> Result<Event> {
        let Self { queue, matcher, timeout, .. } = self;

        if let Some(event) = queue.take_pending(&matcher) {
            queue.diagnostics.handled(&event);
            return Ok(event);
        }

        loop {
            match queue.recv_until(deadline).await? {
                Some(event) if matcher.matches(&event) => {
                    queue.diagnostics.handled(&event);
                    return Ok(event);
                }
                Some(event) => {
                    queue.diagnostics.not_handled(&event);
                    queue.pending.push_back(event);
                }
                None => {
                    tracing::debug!(expected = %matcher, pending = queue.len(), "expectation timed out");
                    return Err(Error::Timeout {
                        description: matcher.description().to_string(),
                        timeout,
                        observed: queue.snapshot(),
                    });
                }
            }
        }
    }

    async fn run_next(self, deadline: Instant) -> Result<Event> {
        let Self { queue, matcher, timeout, .. } = self;

        let event = match queue.pending.pop_front() {
            Some(event) => event,
            None => match queue.recv_until(deadline).await? {
                Some(event) => event,
                None => {
                    return Err(Error::Timeout {
                        description: matcher.description().to_string(),
                        timeout,
                        observed: Vec::new(),
                    });
                }
            },
        };

        if matcher.matches(&event) {
            queue.diagnostics.handled(&event);
            Ok(event)
        } else {
            queue.diagnostics.not_handled(&event);
            Err(Error::UnexpectedEvent {
                description: matcher.description().to_string(),
                event,
            })
        }
    }
}

impl<'a> IntoFuture for Expectation<'a> {
    type Output = Result<Event>;
    type IntoFuture = Pin<Box<dyn Future<Output = Self::Output> + 'a>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.run())
    }
}

impl fmt::Debug for Expectation<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Expectation")
            .field("matcher", &self.matcher)
            .field("timeout", &self.timeout)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

/// A pending wait for several events in any order.
///
/// Created by [`EventQueue::expect_many`].
#[must_use = "an expectation does nothing unless awaited"]
pub struct ExpectMany<'a> {
    queue: &'a mut EventQueue,
    matchers: Vec<EventMatcher>,
    timeout: Duration,
}

impl<'a> ExpectMany<'a> {
    pub(crate) fn new(queue: &'a mut EventQueue, matchers: Vec<EventMatcher>, timeout: Duration) -> Self {
        Self {
            queue,
            matchers,
            timeout,
        }
    }

    /// Override the queue's default timeout.
    pub fn within(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn run(self) -> Result<Vec<Event>> {
        let deadline = Instant::now() + self.timeout;
        let Self { queue, matchers, timeout } = self;

        // Every event examined, oldest first; slots index into it.
        let mut window: Vec<Event> = queue.pending.drain(..).collect();
        let mut slots: Vec<Option<usize>> = vec![None; matchers.len()];
        for index in 0..window.len() {
            claim(&matchers, &mut slots, &window, index);
        }

        while slots.iter().any(Option::is_none) {
            let event = match queue.recv_until(deadline).await {
                Ok(Some(event)) => event,
                Ok(None) => {
                    let missing: Vec<_> = matchers
                        .iter()
                        .zip(&slots)
                        .filter(|(_, slot)| slot.is_none())
                        .map(|(m, _)| m.description())
                        .collect();
                    let description = format!("all of [{}]", missing.join(", "));
                    restore(queue, window);
                    return Err(Error::Timeout {
                        description,
                        timeout,
                        observed: queue.snapshot(),
                    });
                }
                Err(e) => {
                    restore(queue, window);
                    return Err(e);
                }
            };
            window.push(event);
            let index = window.len() - 1;
            if !claim(&matchers, &mut slots, &window, index) {
                queue.diagnostics.not_handled(&window[index]);
            }
        }

        let mut taken: Vec<Option<Event>> = window.into_iter().map(Some).collect();
        let events: Vec<Event> = slots
            .into_iter()
            .flatten()
            .filter_map(|index| taken[index].take())
            .collect();
        restore(queue, taken.into_iter().flatten().collect());
        for event in &events {
            queue.diagnostics.handled(event);
        }
        Ok(events)
    }
}

/// Give `window[index]` to the first unfilled matcher it satisfies.
fn claim(
    matchers: &[EventMatcher],
    slots: &mut [Option<usize>],
    window: &[Event],
    index: usize,
) -> bool {
    let event = &window[index];
    let slot = matchers
        .iter()
        .zip(slots.iter())
        .position(|(m, slot)| slot.is_none() && m.matches(event));
    match slot {
        Some(i) => {
            slots[i] = Some(index);
            true
        }
        None => false,
    }
}

/// Put unconsumed events back at the head of the queue, ahead of anything
/// queued while they were out.
fn restore(queue: &mut EventQueue, events: Vec<Event>) {
    let mut pending = VecDeque::from(events);
    pending.append(&mut queue.pending);
    queue.pending = pending;
}

impl<'a> IntoFuture for ExpectMany<'a> {
    type Output = Result<Vec<Event>>;
    type IntoFuture = Pin<Box<dyn Future<Output = Self::Output> + 'a>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.run())
    }
}

impl fmt::Debug for ExpectMany<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpectMany")
            .field("matchers", &self.matchers)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::{Config, Error, Event, EventKind, EventMatcher, EventQueue, EventSink};

    fn queue() -> (EventQueue, EventSink) {
        EventQueue::new(&Config::default().with_default_timeout(Duration::from_millis(100)))
    }

    #[tokio::test]
    async fn pending_match_is_returned_immediately() {
        let (mut queue, sink) = queue();
        sink.append(Event::custom("tick"));
        let event = queue.expect("tick").await.unwrap();
        assert!(event.is("tick"));
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn skipped_events_stay_pending_in_order() {
        let (mut queue, sink) = queue();
        for label in ["a", "b", "target", "c"] {
            sink.append(Event::custom(label));
        }
        queue.expect("target").await.unwrap();

        let rest: Vec<_> = queue.pending().map(|e| e.to_string()).collect();
        assert_eq!(rest, ["a", "b", "c"]);

        // A later expectation still sees a skipped event.
        queue.expect("b").await.unwrap();
        assert_eq!(queue.len(), 2);
    }

    #[tokio::test]
    async fn first_of_several_matches_wins() {
        let (mut queue, sink) = queue();
        let first = Event::custom("dup");
        let first_id = first.id();
        sink.append(first);
        sink.append(Event::custom("dup"));

        let got = queue.expect("dup").await.unwrap();
        assert_eq!(got.id(), first_id);
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn event_appended_during_wait_is_matched() {
        let (mut queue, sink) = queue();
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            sink.append(Event::custom("late"));
        });
        let got = queue
            .expect("late")
            .within(Duration::from_secs(1))
            .await
            .unwrap();
        assert!(got.is("late"));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_reports_every_observed_event() {
        let (mut queue, sink) = queue();
        sink.append(Event::custom("noise-1"));
        let producer = sink.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(40)).await;
            producer.append(Event::custom("noise-2"));
        });

        let start = tokio::time::Instant::now();
        let err = queue
            .expect("never")
            .within(Duration::from_millis(100))
            .await
            .unwrap_err();

        assert_eq!(start.elapsed(), Duration::from_millis(100));
        match err {
            Error::Timeout {
                description,
                timeout,
                observed,
            } => {
                assert_eq!(description, "\"never\"");
                assert_eq!(timeout, Duration::from_millis(100));
                let labels: Vec<_> = observed.iter().map(|e| e.to_string()).collect();
                assert_eq!(labels, ["noise-1", "noise-2"]);
            }
            other => panic!("expected Timeout, got {other:?}"),
        }
        // Timed-out events are still pending.
        assert_eq!(queue.len(), 2);
        drop(sink);
    }

    #[tokio::test(start_paused = true)]
    async fn within_overrides_default_timeout() {
        let (mut queue, _sink) = queue();
        let start = tokio::time::Instant::now();
        let _ = queue.expect("never").within(Duration::from_secs(3)).await;
        assert_eq!(start.elapsed(), Duration::from_secs(3));

        let start = tokio::time::Instant::now();
        let _ = queue.expect("never").await;
        assert_eq!(start.elapsed(), Duration::from_millis(100));
    }

    #[tokio::test]
    async fn closed_queue_fails_wait() {
        let (mut queue, sink) = queue();
        drop(sink);
        let err = queue.expect("anything").await.unwrap_err();
        assert_eq!(err, Error::QueueClosed);
    }

    #[tokio::test]
    async fn demand_rejects_other_next_event() {
        let (mut queue, sink) = queue();
        sink.append(Event::custom("a"));
        sink.append(Event::custom("b"));

        let err = queue.demand("b").await.unwrap_err();
        match err {
            Error::UnexpectedEvent { event, .. } => assert!(event.is("a")),
            other => panic!("expected UnexpectedEvent, got {other:?}"),
        }
        assert!(queue.demand("b").await.unwrap().is("b"));
    }

    #[tokio::test]
    async fn expect_many_accepts_any_order() {
        let (mut queue, sink) = queue();
        sink.append(Event::custom("noise"));
        sink.append(Event::custom("second"));
        sink.append(Event::custom("first"));

        let events = queue.expect_many(["first", "second"]).await.unwrap();
        assert!(events[0].is("first"));
        assert!(events[1].is("second"));
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn expect_many_needs_distinct_events() {
        let (mut queue, sink) = queue();
        sink.append(Event::custom("x"));

        let err = queue
            .expect_many(["x", "x"])
            .within(Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }), "{err:?}");
        assert_eq!(err.observed().len(), 1);
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expect_many_timeout_returns_claimed_events_in_order() {
        let (mut queue, sink) = queue();
        sink.append(Event::custom("a"));
        sink.append(Event::custom("first"));
        sink.append(Event::custom("b"));

        let err = queue
            .expect_many(["first", "second"])
            .within(Duration::from_millis(50))
            .await
            .unwrap_err();

        let observed: Vec<_> = err.observed().iter().map(|e| e.to_string()).collect();
        assert_eq!(observed, ["a", "first", "b"]);
        let rest: Vec<_> = queue.pending().map(|e| e.to_string()).collect();
        assert_eq!(rest, ["a", "first", "b"]);
    }

    #[tokio::test]
    async fn expect_many_failure_keeps_forbidden_event_last() {
        let (mut queue, sink) = queue();
        queue.forbid("peer-bye");
        sink.append(Event::custom("first"));
        sink.append(Event::builder(EventKind::peer_request("BYE")).build());

        let err = queue.expect_many(["first", "second"]).await.unwrap_err();
        assert!(matches!(err, Error::Forbidden { .. }), "{err:?}");
        let rest: Vec<_> = queue.pending().map(|e| e.to_string()).collect();
        assert_eq!(rest, ["first", "peer-bye"]);
    }

    #[tokio::test]
    async fn forbidden_arrival_fails_expectation() {
        let (mut queue, sink) = queue();
        queue.forbid(EventMatcher::by_label("peer-response").with_field("code", 401));
        sink.append(
            Event::builder(EventKind::PeerResponse)
                .with_field("code", 401)
                .build(),
        );

        let err = queue.expect("peer-invite").await.unwrap_err();
        assert!(matches!(err, Error::Forbidden { .. }), "{err:?}");
    }
}
