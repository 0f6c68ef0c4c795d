use std::{borrow::Cow, collections::BTreeMap, fmt, hash, sync::Arc};

use serde_json::Value;

use crate::{EventBuilder, EventId, Label, Meta, Source, sip::SipMessage};

/// What an [`Event`] describes. The [`Label`] of a kind is the string test
/// scripts match on.
#[derive(Debug, Clone, PartialEq, Eq, hash::Hash)]
pub enum EventKind {
    /// A REGISTER reached the mock peer (before the registrar policy ran).
    PeerRegisterAttempt,
    /// Any other inbound request; holds the lower-cased method name.
    PeerRequest(String),
    /// A response to a request the harness sent.
    PeerResponse,
    /// A signal from the component under test.
    RemoteSignal,
    /// Result of an asynchronously issued remote call.
    RemoteReturn,
    /// Fault of an asynchronously issued remote call.
    RemoteError,
    /// Anything a test injects itself.
    Custom(Cow<'static, str>),
}

impl EventKind {
    pub fn peer_request(method: &str) -> Self {
        EventKind::PeerRequest(method.to_ascii_lowercase())
    }

    pub fn custom(label: impl Into<Cow<'static, str>>) -> Self {
        EventKind::Custom(label.into())
    }
}

/// Older names of the remote event labels, accepted wherever a label is
/// matched.
const LABEL_ALIASES: &[(&str, &str)] = &[
    ("dbus-signal", "remote-signal"),
    ("dbus-return", "remote-return"),
    ("dbus-error", "remote-error"),
];

/// The label `label` stands for: its current name if it is an alias,
/// otherwise itself.
///
/// ```rust
/// assert_eq!(sipcheck::canonical_label("dbus-error"), "remote-error");
/// assert_eq!(sipcheck::canonical_label("peer-invite"), "peer-invite");
/// ```
pub fn canonical_label(label: &str) -> &str {
    LABEL_ALIASES
        .iter()
        .find(|(alias, _)| *alias == label)
        .map_or(label, |&(_, name)| name)
}

impl Label for EventKind {
    fn label(&self) -> Cow<'static, str> {
        match self {
            EventKind::PeerRegisterAttempt => Cow::Borrowed("peer-register-attempt"),
            EventKind::PeerRequest(method) => Cow::Owned(format!("peer-{method}")),
            EventKind::PeerResponse => Cow::Borrowed("peer-response"),
            EventKind::RemoteSignal => Cow::Borrowed("remote-signal"),
            EventKind::RemoteReturn => Cow::Borrowed("remote-return"),
            EventKind::RemoteError => Cow::Borrowed("remote-error"),
            EventKind::Custom(label) => label.clone(),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// One observed occurrence: an inbound SIP message, a remote signal, the
/// outcome of an async remote call, or a test-injected marker.
///
/// Events are immutable once built. Named fields hold plain JSON values;
/// which names are present depends on the kind:
///
/// | Kind | Fields |
/// |------|--------|
/// | `peer-register-attempt` | `uri`, `headers`, `body`, `host`, `port` |
/// | `peer-<method>` | `uri`, `headers`, `body`, flattened headers (`call_id`, ...) |
/// | `peer-response` | `code`, `headers`, `body`, flattened headers |
/// | `remote-signal` | `path`, `signal`, `interface`, `args` |
/// | `remote-return` | `method`, `value` |
/// | `remote-error` | `method`, `name`, `message` |
///
/// Peer events also carry the parsed message, see [`message`](Self::message).
#[derive(Clone)]
pub struct Event {
    meta: Meta,
    kind: EventKind,
    fields: BTreeMap<String, Value>,
    message: Option<Arc<SipMessage>>,
}

impl Event {
    pub(crate) fn new(
        meta: Meta,
        kind: EventKind,
        fields: BTreeMap<String, Value>,
        message: Option<Arc<SipMessage>>,
    ) -> Self {
        Self {
            meta,
            kind,
            fields,
            message,
        }
    }

    /// Start building an event of the given kind.
    pub fn builder(kind: EventKind) -> EventBuilder {
        EventBuilder::new(kind)
    }

    /// Shorthand for a test-injected event with no fields.
    pub fn custom(label: impl Into<Cow<'static, str>>) -> Self {
        EventBuilder::new(EventKind::custom(label))
            .from_source(Source::Driver)
            .build()
    }

    #[inline]
    pub fn kind(&self) -> &EventKind {
        &self.kind
    }

    /// Returns `true` if this event's label equals `label`.
    #[inline]
    pub fn is(&self, label: &str) -> bool {
        self.kind.label() == canonical_label(label)
    }

    #[inline]
    pub fn meta(&self) -> &Meta {
        &self.meta
    }

    /// Shorthand for `self.meta().id()`.
    #[inline]
    pub fn id(&self) -> EventId {
        self.meta.id()
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// The field as a string, if present and a string.
    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.field(name).and_then(Value::as_str)
    }

    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    /// The parsed SIP message behind a peer event.
    pub fn message(&self) -> Option<&SipMessage> {
        self.message.as_deref()
    }

    /// The event as `{"meta", "label", "fields"}`; the raw SIP message is
    /// left out.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl serde::Serialize for Event {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;

        let mut event = serializer.serialize_struct("Event", 3)?;
        event.serialize_field("meta", &self.meta)?;
        event.serialize_field("label", &self.kind.label())?;
        event.serialize_field("fields", &self.fields)?;
        event.end()
    }
}

impl Label for Event {
    fn label(&self) -> Cow<'static, str> {
        self.kind.label()
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.meta.id() == other.meta.id()
    }
}

impl Eq for Event {}

impl hash::Hash for Event {
    fn hash<H: hash::Hasher>(&self, state: &mut H) {
        self.meta.id().hash(state);
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("id", &self.meta.id())
            .field("kind", &self.kind.label())
            .field("source", &self.meta.source())
            .field("fields", &self.fields)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        for (name, value) in &self.fields {
            write!(f, " {name}={value}")?;
        }
        Ok(())
    }
}
