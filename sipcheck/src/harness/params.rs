use std::collections::BTreeMap;

use crate::{Config, remote::Variant};

/// Parameters passed to `RequestConnection`.
///
/// Defaults point the connection manager at the mock peer:
///
/// | Key | Default |
/// |-----|---------|
/// | `account` | `testacc@127.0.0.1` |
/// | `password` | `testpwd` |
/// | `proxy-host` | the configured proxy host |
/// | `port` | the mock peer's port, filled in at prepare time |
/// | `local-ip-address` | `127.0.0.1` |
/// | `transport` | `udp` |
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionParams {
    values: BTreeMap<String, Variant>,
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self::for_config(&Config::default())
    }
}

impl ConnectionParams {
    pub fn for_config(config: &Config) -> Self {
        let values = [
            ("account", Variant::from("testacc@127.0.0.1")),
            ("password", "testpwd".into()),
            ("proxy-host", config.proxy_host().into()),
            ("local-ip-address", "127.0.0.1".into()),
            ("transport", "udp".into()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        Self { values }
    }

    /// Set or replace a parameter.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Variant>) -> Self {
        self.set(key, value);
        self
    }

    /// Remove a parameter, default or not.
    pub fn without(mut self, key: &str) -> Self {
        self.values.remove(key);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Variant>) {
        self.values.insert(key.into(), value.into());
    }

    /// Apply overrides in order; `None` removes the key.
    pub fn apply<I>(&mut self, overrides: I)
    where
        I: IntoIterator<Item = (String, Option<Variant>)>,
    {
        for (key, value) in overrides {
            match value {
                Some(value) => {
                    self.values.insert(key, value);
                }
                None => {
                    self.values.remove(&key);
                }
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&Variant> {
        self.values.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// The `port` parameter, if present and numeric.
    pub fn port(&self) -> Option<u16> {
        self.get("port")
            .and_then(Variant::as_u32)
            .and_then(|p| u16::try_from(p).ok())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Variant)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// The parameters as a string-keyed dictionary of boxed values.
    pub fn to_variant(&self) -> Variant {
        Variant::dict(
            self.values
                .iter()
                .map(|(k, v)| (k.clone(), Variant::boxed(v.clone()))),
        )
    }
}
