use std::{fmt, sync::Arc};

use futures_util::{future::BoxFuture, stream::BoxStream};

use super::{RemoteFault, Variant};

pub const PROPERTIES_IFACE: &str = "org.freedesktop.DBus.Properties";

/// One remote method invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodCall {
    pub destination: String,
    pub path: String,
    pub interface: String,
    pub member: String,
    pub args: Vec<Variant>,
}

/// A signal as delivered by the transport, arguments still boxed.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSignal {
    pub path: String,
    pub interface: String,
    pub member: String,
    pub args: Vec<Variant>,
}

impl RawSignal {
    pub fn new(
        path: impl Into<String>,
        interface: impl Into<String>,
        member: impl Into<String>,
        args: Vec<Variant>,
    ) -> Self {
        Self {
            path: path.into(),
            interface: interface.into(),
            member: member.into(),
            args,
        }
    }
}

pub type SignalStream = BoxStream<'static, RawSignal>;

/// The remote-procedure transport the component under test lives on.
///
/// Implementations route [`MethodCall`]s to the addressed object and
/// deliver every signal on the bus to each subscriber. A subscription
/// made with [`subscribe_all`](Self::subscribe_all) applies no filter on
/// path, interface or member.
pub trait RemoteBus: Send + Sync + 'static {
    fn call(&self, call: MethodCall) -> BoxFuture<'static, Result<Variant, RemoteFault>>;

    fn subscribe_all(&self) -> SignalStream;
}

/// A handle on one remote object.
#[derive(Clone)]
pub struct Proxy {
    bus: Arc<dyn RemoteBus>,
    destination: Arc<str>,
    path: Arc<str>,
}

impl fmt::Debug for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proxy")
            .field("destination", &self.destination)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl Proxy {
    pub fn new(bus: Arc<dyn RemoteBus>, destination: &str, path: &str) -> Self {
        Self {
            bus,
            destination: Arc::from(destination),
            path: Arc::from(path),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn bus(&self) -> &Arc<dyn RemoteBus> {
        &self.bus
    }

    /// Builds the call without sending it.
    pub fn method_call(&self, interface: &str, member: &str, args: Vec<Variant>) -> MethodCall {
        MethodCall {
            destination: self.destination.to_string(),
            path: self.path.to_string(),
            interface: interface.to_string(),
            member: member.to_string(),
            args,
        }
    }

    pub async fn call(
        &self,
        interface: &str,
        member: &str,
        args: Vec<Variant>,
    ) -> Result<Variant, RemoteFault> {
        let call = self.method_call(interface, member, args);
        tracing::trace!(path = %call.path, interface, member, "remote call");
        self.bus.call(call).await
    }

    pub async fn get_property(&self, interface: &str, name: &str) -> Result<Variant, RemoteFault> {
        self.call(PROPERTIES_IFACE, "Get", vec![interface.into(), name.into()])
            .await
    }

    pub async fn get_all_properties(&self, interface: &str) -> Result<Variant, RemoteFault> {
        self.call(PROPERTIES_IFACE, "GetAll", vec![interface.into()])
            .await
    }

    pub async fn set_property(
        &self,
        interface: &str,
        name: &str,
        value: Variant,
    ) -> Result<(), RemoteFault> {
        self.call(
            PROPERTIES_IFACE,
            "Set",
            vec![interface.into(), name.into(), Variant::boxed(value)],
        )
        .await
        .map(|_| ())
    }
}
