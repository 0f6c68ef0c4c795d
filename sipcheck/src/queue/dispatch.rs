use std::{collections::VecDeque, fmt};

use tokio::{select, sync::mpsc::WeakUnboundedSender};
use tokio_util::sync::CancellationToken;

use crate::{Error, Event, EventQueue, Label, Result};

use super::{EventMatcher, EventSink, HandlerOutcome};

type HandlerFn = Box<dyn FnMut(&Event, &mut HandlerContext<'_>) -> Result<HandlerOutcome> + Send>;

/// What a dispatch handler can do besides inspecting its event.
pub struct HandlerContext<'a> {
    pending: &'a mut VecDeque<Event>,
    weak_sender: &'a WeakUnboundedSender<Event>,
}

impl HandlerContext<'_> {
    /// Append an event; a later iteration of the dispatch loop sees it.
    pub fn append(&mut self, event: Event) {
        self.pending.push_back(event);
    }

    /// A producer handle for work that outlives the handler, such as an
    /// async remote call.
    pub fn sink(&self) -> Option<EventSink> {
        EventSink::upgrade(self.weak_sender)
    }
}

impl fmt::Debug for HandlerContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerContext")
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

/// An ordered table of event handlers.
///
/// For every event, handlers are tried in registration order and only the
/// first whose matcher accepts the event runs.
///
/// ```rust
/// use sipcheck::{Dispatcher, Event, HandlerOutcome};
///
/// let dispatcher = Dispatcher::new()
///     .on("remote-signal", |event, _ctx| {
///         println!("signal {:?}", event.str_field("signal"));
///         Ok(HandlerOutcome::Continue)
///     })
///     .on("peer-invite", |_event, ctx| {
///         ctx.append(Event::custom("invited"));
///         Ok(HandlerOutcome::Continue)
///     })
///     .on("invited", |_, _| Ok(HandlerOutcome::Complete));
/// assert_eq!(dispatcher.len(), 3);
/// ```
pub struct Dispatcher {
    handlers: Vec<(EventMatcher, HandlerFn)>,
    cancel_token: CancellationToken,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let matchers: Vec<_> = self.handlers.iter().map(|(m, _)| m).collect();
        f.debug_struct("Dispatcher")
            .field("handlers", &matchers)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
            cancel_token: CancellationToken::new(),
        }
    }

    /// Register a handler after all previously registered ones.
    pub fn on<F>(mut self, matcher: impl Into<EventMatcher>, handler: F) -> Self
    where
        F: FnMut(&Event, &mut HandlerContext<'_>) -> Result<HandlerOutcome> + Send + 'static,
    {
        self.handlers.push((matcher.into(), Box::new(handler)));
        self
    }

    /// Stop dispatching when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel_token = token;
        self
    }

    /// A token that stops this dispatcher when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Run the first handler that accepts `event`. `None` if none did.
    fn dispatch(&mut self, event: &Event, ctx: &mut HandlerContext<'_>) -> Option<Result<HandlerOutcome>> {
        self.handlers
            .iter_mut()
            .find(|(matcher, _)| matcher.matches(event))
            .map(|(_, handler)| handler(event, ctx))
    }
}

impl EventQueue {
    /// Feed every event, pending ones first, to `dispatcher` until a
    /// handler returns [`HandlerOutcome::Complete`].
    ///
    /// Returns `Ok(())` on completion or cancellation, the handler's error if
    /// one fails, and [`Error::QueueClosed`] if every producer goes away
    /// first. There is no timeout; wrap the call in
    /// [`tokio::time::timeout`] if one is needed.
    pub async fn run_handlers_forever(&mut self, mut dispatcher: Dispatcher) -> Result {
        let cancel_token = dispatcher.cancellation_token();
        loop {
            if cancel_token.is_cancelled() {
                tracing::debug!("dispatch cancelled");
                return Ok(());
            }

            // Producer events already waiting go ahead of anything a handler
            // appends from here on.
            self.pull_ready()?;
            let event = match self.pending.pop_front() {
                Some(event) => event,
                None => select! {
                    biased;
                    _ = cancel_token.cancelled() => {
                        tracing::debug!("dispatch cancelled");
                        return Ok(());
                    }
                    maybe_event = self.intake.recv() => {
                        let Some(event) = maybe_event else {
                            return Err(Error::QueueClosed);
                        };
                        self.admit(event)?
                    }
                },
            };

            let mut ctx = HandlerContext {
                pending: &mut self.pending,
                weak_sender: &self.weak_sender,
            };
            match dispatcher.dispatch(&event, &mut ctx) {
                Some(outcome) => {
                    self.diagnostics.handled(&event);
                    if outcome?.is_complete() {
                        tracing::debug!(event_id = %event.id(), label = %event.label(), "dispatch complete");
                        return Ok(());
                    }
                }
                None => self.diagnostics.not_handled(&event),
            }
        }
    }
}
