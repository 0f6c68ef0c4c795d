use std::{fmt, hash, time::SystemTime};

use crate::EventId;

/// The producer that observed an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, hash::Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// The mock SIP peer (inbound requests and responses).
    Peer,
    /// The remote-procedure bus (signals, async call results).
    Bus,
    /// Injected directly by test code.
    Driver,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Peer => write!(f, "peer"),
            Source::Bus => write!(f, "bus"),
            Source::Driver => write!(f, "driver"),
        }
    }
}

/// Metadata attached to every [`Event`](crate::Event).
///
/// - `id`: unique event identifier (UUID v4, not monotonic).
/// - `timestamp`: creation time in nanoseconds since Unix epoch.
/// - `source`: which producer appended the event.
#[derive(Debug, Clone, PartialEq, Eq, hash::Hash, serde::Serialize)]
pub struct Meta {
    id: EventId,
    timestamp: u64,
    source: Source,
}

impl Meta {
    /// Construct metadata for an event observed by `source`.
    ///
    /// A clock set before the Unix epoch yields a zero timestamp.
    pub fn new(source: Source) -> Self {
        Self {
            id: EventId::new(),
            timestamp: SystemTime::now()
                .duration_since(SystemTime::UNIX_EPOCH)
                .map(|d| d.as_nanos() as u64)
                .unwrap_or_default(),
            source,
        }
    }

    /// Unique identifier for this event.
    pub fn id(&self) -> EventId {
        self.id
    }

    /// Timestamp in nanoseconds since Unix epoch (u64 truncation).
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Producer that observed the event.
    pub fn source(&self) -> Source {
        self.source
    }
}

impl fmt::Display for Meta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Event Meta {{ id: {}, timestamp: {}, source: {} }}",
            self.id, self.timestamp, self.source,
        )
    }
}
