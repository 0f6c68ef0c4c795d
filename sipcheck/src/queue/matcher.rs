//! Event predicates with a human-readable description.

use std::{borrow::Cow, fmt, sync::Arc};

use serde_json::Value;

use crate::{Event, EventId, Label, canonical_label};

type MatchFn = Arc<dyn Fn(&Event) -> bool + Send + Sync>;

/// A predicate over [`Event`]s, used by expectations and dispatch handlers.
///
/// `EventMatcher` can match events by:
/// - Label (`"peer-invite"`, `"remote-signal"`, ...)
/// - Event ID (exact match)
/// - Custom predicate
///
/// and narrows further with field constraints. Every matcher carries a
/// description, which is what a timeout reports as the thing it waited for.
///
/// # Example
///
/// ```rust
/// use sipcheck::EventMatcher;
///
/// // Plain label; `&str` converts directly.
/// let any_invite: EventMatcher = "peer-invite".into();
///
/// // Label plus field values.
/// let ok = EventMatcher::by_label("peer-response").with_field("code", 200);
///
/// // Arbitrary predicate.
/// let status = EventMatcher::by_label("remote-signal")
///     .and(|e| e.str_field("signal") == Some("StatusChanged"))
///     .described("StatusChanged signal");
/// assert_eq!(status.description(), "StatusChanged signal");
/// ```
#[derive(Clone)]
pub struct EventMatcher {
    description: String,
    matcher: MatchFn,
}

impl fmt::Debug for EventMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventMatcher")
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for EventMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description)
    }
}

impl EventMatcher {
    /// Match events by their label. Old `dbus-*` names of the remote
    /// labels are accepted, see [`canonical_label`](crate::canonical_label).
    pub fn by_label(label: impl Into<Cow<'static, str>>) -> Self {
        let label: Cow<'static, str> = label.into();
        let wanted = canonical_label(&label).to_string();
        Self {
            description: format!("{label:?}"),
            matcher: Arc::new(move |event| event.label() == wanted),
        }
    }

    /// Match one specific event.
    pub fn by_id(id: EventId) -> Self {
        Self {
            description: format!("event {id}"),
            matcher: Arc::new(move |event| event.id() == id),
        }
    }

    /// Match events using a custom predicate.
    pub fn by_event<F>(predicate: F) -> Self
    where
        F: Fn(&Event) -> bool + Send + Sync + 'static,
    {
        Self {
            description: "custom predicate".to_string(),
            matcher: Arc::new(predicate),
        }
    }

    /// Match every event.
    pub fn any() -> Self {
        Self {
            description: "any event".to_string(),
            matcher: Arc::new(|_| true),
        }
    }

    /// Additionally require a field to equal `value`.
    pub fn with_field(self, name: &str, value: impl Into<Value>) -> Self {
        let value = value.into();
        let description = format!("{} where {name}={value}", self.description);
        let name = name.to_string();
        let inner = self.matcher;
        Self {
            description,
            matcher: Arc::new(move |event| inner(event) && event.field(&name) == Some(&value)),
        }
    }

    /// Additionally require a custom predicate.
    pub fn and<F>(self, predicate: F) -> Self
    where
        F: Fn(&Event) -> bool + Send + Sync + 'static,
    {
        let inner = self.matcher;
        Self {
            description: format!("{} and custom predicate", self.description),
            matcher: Arc::new(move |event| inner(event) && predicate(event)),
        }
    }

    /// Replace the description reported on timeout.
    pub fn described(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns true if the given event matches this matcher.
    pub fn matches(&self, event: &Event) -> bool {
        (self.matcher)(event)
    }
}

impl From<&'static str> for EventMatcher {
    fn from(label: &'static str) -> Self {
        EventMatcher::by_label(label)
    }
}

impl From<String> for EventMatcher {
    fn from(label: String) -> Self {
        EventMatcher::by_label(label)
    }
}

impl From<EventId> for EventMatcher {
    fn from(id: EventId) -> Self {
        EventMatcher::by_id(id)
    }
}
