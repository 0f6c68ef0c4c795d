use std::{fmt, sync::Arc, time::Duration};

use crate::{Event, remote::RemoteFault, sip::ParseError};

/// The single error type for all sipcheck operations.
///
/// Every fallible API returns `sipcheck::Result<T>` (alias for
/// `Result<T, sipcheck::Error>`). Faults from the remote bus, socket IO and
/// SIP parsing are mapped into variants of this enum so a test body can
/// propagate everything with `?`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// No event satisfied the expectation before its deadline.
    #[error("timed out after {timeout:?} waiting for {description}; {}", Observed(.observed))]
    Timeout {
        description: String,
        timeout: Duration,
        /// Every unmatched event still pending when the deadline passed.
        observed: Vec<Event>,
    },

    #[error("remote fault: {0}")]
    Remote(#[source] RemoteFault),

    /// The second `Disconnect` of a teardown found the connection already gone.
    #[error("connection already gone during teardown: {0}")]
    TeardownRace(#[source] RemoteFault),

    #[error("forbidden event while waiting: {event} (matched {description})")]
    Forbidden { description: String, event: Event },

    #[error("expected {description}, next event was {event}")]
    UnexpectedEvent { description: String, event: Event },

    #[error("event queue closed")]
    QueueClosed,

    #[error("IO error: {0}")]
    Io(#[source] Arc<std::io::Error>),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl Error {
    /// The events observed by a timed-out expectation, empty for other variants.
    pub fn observed(&self) -> &[Event] {
        match self {
            Error::Timeout { observed, .. } => observed,
            _ => &[],
        }
    }

    /// The remote fault behind this error, if any.
    pub fn remote_fault(&self) -> Option<&RemoteFault> {
        match self {
            Error::Remote(fault) | Error::TeardownRace(fault) => Some(fault),
            _ => None,
        }
    }
}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Self::Timeout {
                    description: d1,
                    timeout: t1,
                    observed: o1,
                },
                Self::Timeout {
                    description: d2,
                    timeout: t2,
                    observed: o2,
                },
            ) => d1 == d2 && t1 == t2 && o1 == o2,
            (Self::Remote(a), Self::Remote(b)) => a == b,
            (Self::TeardownRace(a), Self::TeardownRace(b)) => a == b,
            (
                Self::Forbidden {
                    description: d1,
                    event: e1,
                },
                Self::Forbidden {
                    description: d2,
                    event: e2,
                },
            ) => d1 == d2 && e1 == e2,
            (
                Self::UnexpectedEvent {
                    description: d1,
                    event: e1,
                },
                Self::UnexpectedEvent {
                    description: d2,
                    event: e2,
                },
            ) => d1 == d2 && e1 == e2,
            (Self::QueueClosed, Self::QueueClosed) => true,
            (Self::Io(a), Self::Io(b)) => Arc::ptr_eq(a, b),
            (Self::Parse(a), Self::Parse(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Error {}

impl From<RemoteFault> for Error {
    fn from(fault: RemoteFault) -> Self {
        Error::Remote(fault)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(Arc::new(e))
    }
}

struct Observed<'a>(&'a [Event]);

impl fmt::Display for Observed<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("no events observed");
        }
        write!(f, "{} events observed:", self.0.len())?;
        for event in self.0 {
            write!(f, "\n  {event}")?;
        }
        Ok(())
    }
}
