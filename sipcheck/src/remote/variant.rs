use std::collections::BTreeMap;

use serde_json::{Map, Number, Value};

/// A value as carried by the remote-procedure transport.
///
/// Mirrors the wire type system closely enough that test code can build
/// arguments with the right types, and can still see boxing
/// ([`Variant::Boxed`]) where the transport applies it. Use [`unwrap`] to
/// get a plain [`Value`] for assertions.
#[derive(Debug, Clone, PartialEq)]
pub enum Variant {
    Bool(bool),
    Byte(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Double(f64),
    Str(String),
    ObjectPath(String),
    Bytes(Vec<u8>),
    Array(Vec<Variant>),
    Dict(Vec<(Variant, Variant)>),
    Struct(Vec<Variant>),
    Boxed(Box<Variant>),
}

impl Variant {
    pub fn boxed(inner: impl Into<Variant>) -> Self {
        Variant::Boxed(Box::new(inner.into()))
    }

    /// A string-keyed dictionary, the usual shape of parameter maps.
    pub fn dict<K, V, I>(entries: I) -> Self
    where
        K: Into<String>,
        V: Into<Variant>,
        I: IntoIterator<Item = (K, V)>,
    {
        Variant::Dict(
            entries
                .into_iter()
                .map(|(k, v)| (Variant::Str(k.into()), v.into()))
                .collect(),
        )
    }

    /// Looks through any boxing layers.
    pub fn peel(&self) -> &Variant {
        let mut v = self;
        while let Variant::Boxed(inner) = v {
            v = inner;
        }
        v
    }

    pub fn as_str(&self) -> Option<&str> {
        match self.peel() {
            Variant::Str(s) | Variant::ObjectPath(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match *self.peel() {
            Variant::Byte(b) => Some(b.into()),
            Variant::UInt16(n) => Some(n.into()),
            Variant::UInt32(n) => Some(n),
            _ => None,
        }
    }

    /// Value stored under a string key, when this is a dictionary.
    pub fn get(&self, key: &str) -> Option<&Variant> {
        match self.peel() {
            Variant::Dict(entries) => entries
                .iter()
                .find(|(k, _)| k.as_str() == Some(key))
                .map(|(_, v)| v),
            _ => None,
        }
    }
}

impl From<bool> for Variant {
    fn from(v: bool) -> Self {
        Variant::Bool(v)
    }
}

impl From<u16> for Variant {
    fn from(v: u16) -> Self {
        Variant::UInt16(v)
    }
}

impl From<u32> for Variant {
    fn from(v: u32) -> Self {
        Variant::UInt32(v)
    }
}

impl From<i32> for Variant {
    fn from(v: i32) -> Self {
        Variant::Int32(v)
    }
}

impl From<&str> for Variant {
    fn from(v: &str) -> Self {
        Variant::Str(v.to_string())
    }
}

impl From<String> for Variant {
    fn from(v: String) -> Self {
        Variant::Str(v)
    }
}

impl From<Vec<Variant>> for Variant {
    fn from(v: Vec<Variant>) -> Self {
        Variant::Array(v)
    }
}

impl From<BTreeMap<String, Variant>> for Variant {
    fn from(map: BTreeMap<String, Variant>) -> Self {
        Variant::dict(map)
    }
}

fn key_string(key: &Variant) -> String {
    match unwrap(key) {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

/// Strip transport boxing and convert to a plain value.
///
/// Boxed values collapse to their contents at every depth, object paths
/// become strings, and byte arrays become (lossy UTF-8) strings.
pub fn unwrap(variant: &Variant) -> Value {
    match variant {
        Variant::Bool(b) => Value::Bool(*b),
        Variant::Byte(n) => Value::from(*n),
        Variant::Int16(n) => Value::from(*n),
        Variant::UInt16(n) => Value::from(*n),
        Variant::Int32(n) => Value::from(*n),
        Variant::UInt32(n) => Value::from(*n),
        Variant::Int64(n) => Value::from(*n),
        Variant::UInt64(n) => Value::from(*n),
        Variant::Double(d) => Number::from_f64(*d).map_or(Value::Null, Value::Number),
        Variant::Str(s) | Variant::ObjectPath(s) => Value::String(s.clone()),
        Variant::Bytes(b) => Value::String(String::from_utf8_lossy(b).into_owned()),
        Variant::Array(items) | Variant::Struct(items) => {
            Value::Array(items.iter().map(unwrap).collect())
        }
        Variant::Dict(entries) => Value::Object(
            entries
                .iter()
                .map(|(k, v)| (key_string(k), unwrap(v)))
                .collect::<Map<_, _>>(),
        ),
        Variant::Boxed(inner) => unwrap(inner),
    }
}
