use std::{fmt, hash};
use uuid::Uuid;

/// Unique identifier of an [`Event`](crate::Event).
///
/// Ids are random (UUID v4) and carry no ordering. Queue order is the
/// only notion of time the harness relies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, hash::Hash)]
pub struct EventId(u128);

impl EventId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4().as_u128())
    }

    pub fn value(&self) -> u128 {
        self.0
    }
}

impl From<u128> for EventId {
    fn from(value: u128) -> Self {
        EventId(value)
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Uuid::from_u128(self.0))
    }
}

/// Serialized in its hyphenated UUID form.
impl serde::Serialize for EventId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl Default for EventId {
    fn default() -> Self {
        EventId::new()
    }
}
