use std::fmt;

/// Well-known fault names.
pub mod names {
    pub const INVALID_ARGUMENT: &str = "org.freedesktop.Telepathy.Error.InvalidArgument";
    pub const NOT_AVAILABLE: &str = "org.freedesktop.Telepathy.Error.NotAvailable";
    pub const NOT_IMPLEMENTED: &str = "org.freedesktop.Telepathy.Error.NotImplemented";
    pub const UNKNOWN_OBJECT: &str = "org.freedesktop.DBus.Error.UnknownObject";
    pub const UNKNOWN_METHOD: &str = "org.freedesktop.DBus.Error.UnknownMethod";
    pub const UNKNOWN_PROPERTY: &str = "org.freedesktop.DBus.Error.UnknownProperty";
    pub const NO_REPLY: &str = "org.freedesktop.DBus.Error.NoReply";
}

/// A named fault returned by a remote method instead of a result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFault {
    pub name: String,
    pub message: String,
}

impl RemoteFault {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(names::INVALID_ARGUMENT, message)
    }

    pub fn unknown_object(path: &str) -> Self {
        Self::new(names::UNKNOWN_OBJECT, format!("no object at {path}"))
    }

    pub fn unknown_method(interface: &str, member: &str) -> Self {
        Self::new(
            names::UNKNOWN_METHOD,
            format!("no method {interface}.{member}"),
        )
    }

    pub fn is_invalid_argument(&self) -> bool {
        self.name == names::INVALID_ARGUMENT
    }

    /// The target object has gone away (or never existed).
    ///
    /// Bus daemons report a call to a vanished object as either
    /// `UnknownObject` or `UnknownMethod`, depending on the binding.
    pub fn is_object_gone(&self) -> bool {
        self.name == names::UNKNOWN_OBJECT || self.name == names::UNKNOWN_METHOD
    }
}

impl fmt::Display for RemoteFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.message)
    }
}

impl std::error::Error for RemoteFault {}
