use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    sync::Arc,
};

use dashmap::DashMap;
use futures_util::{FutureExt, StreamExt, future::BoxFuture};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use super::{
    MethodCall, PROPERTIES_IFACE, RawSignal, RemoteBus, RemoteFault, SignalStream, Variant,
    fault::names,
};

type MethodFn = Arc<dyn Fn(&[Variant]) -> Result<Variant, RemoteFault> + Send + Sync>;

/// (path, interface, member)
type MethodKey = (String, String, String);

/// In-process [`RemoteBus`].
///
/// Objects are exported as plain closures keyed by path, interface and
/// member; properties live in a per-object table served through the
/// standard properties interface. Signals fan out to every subscriber over
/// a broadcast channel.
///
/// Destinations are ignored: there is one process on the bus.
pub struct LoopbackBus {
    methods: DashMap<MethodKey, MethodFn>,
    properties: DashMap<String, HashMap<String, BTreeMap<String, Variant>>>,
    signals: broadcast::Sender<RawSignal>,
}

impl fmt::Debug for LoopbackBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopbackBus")
            .field("methods", &self.methods.len())
            .field("subscribers", &self.signals.receiver_count())
            .finish_non_exhaustive()
    }
}

impl Default for LoopbackBus {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackBus {
    /// Signal buffer per subscriber; slower subscribers lose the oldest signals.
    pub const SIGNAL_CAPACITY: usize = 256;

    pub fn new() -> Self {
        let (signals, _) = broadcast::channel(Self::SIGNAL_CAPACITY);
        Self {
            methods: DashMap::new(),
            properties: DashMap::new(),
            signals,
        }
    }

    /// Export a method. A later export of the same key replaces it.
    pub fn export<F>(&self, path: &str, interface: &str, member: &str, handler: F)
    where
        F: Fn(&[Variant]) -> Result<Variant, RemoteFault> + Send + Sync + 'static,
    {
        self.methods.insert(
            (path.to_string(), interface.to_string(), member.to_string()),
            Arc::new(handler),
        );
    }

    /// Set (or replace) a property value.
    pub fn set_property(&self, path: &str, interface: &str, name: &str, value: Variant) {
        self.properties
            .entry(path.to_string())
            .or_default()
            .entry(interface.to_string())
            .or_default()
            .insert(name.to_string(), value);
    }

    /// Drop every method and property of the object at `path`.
    pub fn remove_object(&self, path: &str) {
        self.methods.retain(|(p, _, _), _| p != path);
        self.properties.remove(path);
    }

    pub fn has_object(&self, path: &str) -> bool {
        self.methods.iter().any(|entry| entry.key().0 == path)
            || self.properties.contains_key(path)
    }

    /// Broadcast a signal to all current subscribers.
    pub fn emit(&self, signal: RawSignal) {
        tracing::trace!(path = %signal.path, member = %signal.member, "loopback signal");
        // No subscribers is not an error.
        let _ = self.signals.send(signal);
    }

    fn dispatch(&self, call: &MethodCall) -> Result<Variant, RemoteFault> {
        if call.interface == PROPERTIES_IFACE {
            if let Some(result) = self.properties_call(call) {
                return result;
            }
        }

        let key = (
            call.path.clone(),
            call.interface.clone(),
            call.member.clone(),
        );
        // The lock is released before the handler runs so handlers can
        // export, remove or emit.
        let handler = self.methods.get(&key).map(|entry| entry.value().clone());
        match handler {
            Some(handler) => handler(call.args.as_slice()),
            None if self.has_object(&call.path) => Err(RemoteFault::unknown_method(
                &call.interface,
                &call.member,
            )),
            None => Err(RemoteFault::unknown_object(&call.path)),
        }
    }

    fn properties_call(&self, call: &MethodCall) -> Option<Result<Variant, RemoteFault>> {
        let mut object = self.properties.get_mut(&call.path)?;
        let iface = call.args.first().and_then(Variant::as_str).unwrap_or_default();
        let name = call.args.get(1).and_then(Variant::as_str);

        let result = match (call.member.as_str(), name) {
            ("GetAll", _) => Ok(Variant::dict(
                object
                    .get(iface)
                    .map(|m| {
                        m.iter()
                            .map(|(k, v)| (k.clone(), Variant::boxed(v.clone())))
                            .collect::<Vec<_>>()
                    })
                    .unwrap_or_default(),
            )),
            ("Get", Some(name)) => object
                .get(iface)
                .and_then(|m| m.get(name))
                .map(|v| Variant::boxed(v.clone()))
                .ok_or_else(|| {
                    RemoteFault::new(names::UNKNOWN_PROPERTY, format!("no property {iface}.{name}"))
                }),
            ("Set", Some(name)) => match call.args.get(2) {
                Some(value) => {
                    object
                        .entry(iface.to_string())
                        .or_default()
                        .insert(name.to_string(), value.peel().clone());
                    Ok(Variant::Struct(Vec::new()))
                }
                None => Err(RemoteFault::invalid_argument("Set needs a value")),
            },
            _ => Err(RemoteFault::invalid_argument(format!(
                "bad properties call {}",
                call.member
            ))),
        };
        Some(result)
    }
}

impl RemoteBus for LoopbackBus {
    fn call(&self, call: MethodCall) -> BoxFuture<'static, Result<Variant, RemoteFault>> {
        let result = self.dispatch(&call);
        async move { result }.boxed()
    }

    fn subscribe_all(&self) -> SignalStream {
        BroadcastStream::new(self.signals.subscribe())
            .filter_map(|item| async move {
                match item {
                    Ok(signal) => Some(signal),
                    Err(e) => {
                        tracing::warn!(error = %e, "signal subscriber lagged");
                        None
                    }
                }
            })
            .boxed()
    }
}
