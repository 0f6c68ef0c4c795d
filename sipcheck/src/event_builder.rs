use std::{collections::BTreeMap, sync::Arc};

use serde_json::Value;

use crate::{Event, EventKind, Meta, Source, sip::SipMessage};

/// Builder for [`Event`]s.
///
/// Producers fill in fields and the source; the built event is frozen.
///
/// ```rust
/// use sipcheck::{Event, EventKind, Source};
///
/// let event = Event::builder(EventKind::RemoteReturn)
///     .from_source(Source::Bus)
///     .with_field("method", "IdentifyAccount")
///     .with_field("value", "alice@example.com")
///     .build();
/// assert_eq!(event.str_field("value"), Some("alice@example.com"));
/// ```
#[derive(Debug, Clone)]
pub struct EventBuilder {
    kind: EventKind,
    source: Source,
    fields: BTreeMap<String, Value>,
    message: Option<Arc<SipMessage>>,
}

impl EventBuilder {
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            source: Source::Driver,
            fields: BTreeMap::new(),
            message: None,
        }
    }

    pub fn from_source(mut self, source: Source) -> Self {
        self.source = source;
        self
    }

    /// Set a field. Setting the same name twice keeps the last value.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Set fields only where the name is not taken yet.
    pub fn with_extra_fields<I>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        for (name, value) in fields {
            self.fields.entry(name).or_insert(value);
        }
        self
    }

    pub fn with_message(mut self, message: Arc<SipMessage>) -> Self {
        self.message = Some(message);
        self
    }

    pub fn build(self) -> Event {
        Event::new(Meta::new(self.source), self.kind, self.fields, self.message)
    }
}

impl From<EventKind> for EventBuilder {
    fn from(kind: EventKind) -> Self {
        EventBuilder::new(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extra_fields_do_not_override_named_ones() {
        let event = EventBuilder::new(EventKind::PeerResponse)
            .with_field("code", 200)
            .with_extra_fields([
                ("code".to_string(), json!("clobbered")),
                ("call_id".to_string(), json!("c-1")),
            ])
            .build();

        assert_eq!(event.field("code"), Some(&json!(200)));
        assert_eq!(event.str_field("call_id"), Some("c-1"));
    }

    #[test]
    fn source_defaults_to_driver() {
        let event = EventBuilder::new(EventKind::custom("x")).build();
        assert_eq!(event.meta().source(), Source::Driver);

        let event = EventBuilder::new(EventKind::RemoteSignal)
            .from_source(Source::Bus)
            .build();
        assert_eq!(event.meta().source(), Source::Bus);
    }
}
