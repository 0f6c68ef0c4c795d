//! Bootstrapping one test run against a connection manager.
//!
//! A run wires together an [`EventQueue`], a [`MockPeer`] on a random port,
//! a [`SignalBridge`] on the bus, and a connection requested from the
//! connection manager with parameters pointing at the peer. It then runs
//! either a sequential test body ([`HarnessBuilder::exec`]) or a handler
//! table ([`HarnessBuilder::go`]), and always tears the connection down.
//!
//! ```rust,ignore
//! Harness::builder(bus)
//!     .param("account", "alice@127.0.0.1")
//!     .exec(async |h| {
//!         h.connect().await?;
//!         h.expect("peer-register-attempt").await?;
//!         h.expect(EventMatcher::by_label("remote-signal").with_field("signal", "StatusChanged"))
//!             .await?;
//!         Ok(())
//!     })
//!     .await?;
//! ```

mod params;

use std::{
    fmt,
    net::{IpAddr, SocketAddr},
    sync::Arc,
};

use tokio::task::JoinHandle;

pub use params::ConnectionParams;

use crate::{
    AllowAll, Config, ConnectionManager, Dispatcher, Error, EventMatcher, EventQueue, EventSink,
    Expectation, MockPeer, RegistrarPolicy, Result, SignalBridge, call_async,
    remote::{Proxy, RemoteBus, RemoteFault, Variant, names},
    sip::SipRequest,
};

/// Remote interface of a connection object.
pub const CONNECTION_IFACE: &str = "org.freedesktop.Telepathy.Connection";

/// One prepared test run.
pub struct Harness {
    queue: EventQueue,
    sink: EventSink,
    bus: Arc<dyn RemoteBus>,
    conn: Proxy,
    peer: MockPeer,
    bridge: SignalBridge,
    params: ConnectionParams,
    config: Config,
}

impl fmt::Debug for Harness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Harness")
            .field("conn", &self.conn)
            .field("peer", &self.peer)
            .field("queue", &self.queue)
            .finish_non_exhaustive()
    }
}

impl Harness {
    /// Start configuring a run on `bus`.
    pub fn builder(bus: Arc<dyn RemoteBus>) -> HarnessBuilder {
        HarnessBuilder::new(bus)
    }

    /// Prepare a run with default parameters.
    pub async fn prepare(bus: Arc<dyn RemoteBus>, config: Config) -> Result<Self> {
        HarnessBuilder::new(bus).config(config).prepare().await
    }

    /// Prepare a run, execute `body`, then tear down.
    pub async fn exec<F>(bus: Arc<dyn RemoteBus>, config: Config, body: F) -> Result
    where
        F: AsyncFnOnce(&mut Harness) -> Result,
    {
        HarnessBuilder::new(bus).config(config).exec(body).await
    }

    /// Prepare a run, connect, dispatch until a handler completes, then tear down.
    pub async fn go(bus: Arc<dyn RemoteBus>, config: Config, dispatcher: Dispatcher) -> Result {
        HarnessBuilder::new(bus).config(config).go(dispatcher).await
    }

    pub fn queue(&mut self) -> &mut EventQueue {
        &mut self.queue
    }

    /// Shorthand for `self.queue().expect(matcher)`.
    pub fn expect(&mut self, matcher: impl Into<EventMatcher>) -> Expectation<'_> {
        self.queue.expect(matcher)
    }

    pub fn sink(&self) -> &EventSink {
        &self.sink
    }

    pub fn bus(&self) -> &Arc<dyn RemoteBus> {
        &self.bus
    }

    /// The connection under test.
    pub fn conn(&self) -> &Proxy {
        &self.conn
    }

    pub fn peer(&self) -> &MockPeer {
        &self.peer
    }

    pub fn params(&self) -> &ConnectionParams {
        &self.params
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// `Connect` on the connection.
    pub async fn connect(&self) -> Result {
        self.conn.call(CONNECTION_IFACE, "Connect", Vec::new()).await?;
        Ok(())
    }

    /// Call a connection method without waiting; the outcome arrives as a
    /// `remote-return` or `remote-error` event.
    pub fn call_async(&self, interface: &str, method: &str, args: Vec<Variant>) -> JoinHandle<()> {
        call_async(&self.sink, &self.conn, interface, method, args)
    }

    /// `Disconnect` twice, then stop the peer and the bridge.
    ///
    /// The second call normally finds the connection object gone; that fault
    /// (and the same fault on the first call, if the test already
    /// disconnected) is classified as [`Error::TeardownRace`] and swallowed.
    /// Any other fault is returned.
    pub async fn teardown(self) -> Result {
        let result = disconnect(&self.conn).await;
        self.bridge.detach().await;
        self.peer.shutdown().await;
        result
    }
}

async fn disconnect(conn: &Proxy) -> Result {
    for attempt in 1..=2 {
        match conn.call(CONNECTION_IFACE, "Disconnect", Vec::new()).await {
            Ok(_) => {}
            Err(fault) if fault.is_object_gone() => {
                let race = Error::TeardownRace(fault);
                tracing::debug!(attempt, error = %race, "disconnect raced connection teardown");
                return Ok(());
            }
            Err(fault) => {
                tracing::warn!(attempt, fault = %fault, "disconnect failed");
                return Err(fault.into());
            }
        }
    }
    Ok(())
}

/// Builder for a [`Harness`] run.
pub struct HarnessBuilder {
    bus: Arc<dyn RemoteBus>,
    config: Config,
    overrides: Vec<(String, Option<Variant>)>,
    policy: Arc<dyn RegistrarPolicy>,
}

impl fmt::Debug for HarnessBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HarnessBuilder")
            .field("config", &self.config)
            .field("overrides", &self.overrides)
            .finish_non_exhaustive()
    }
}

impl HarnessBuilder {
    /// Verbosity comes from the environment; see [`Config::from_env`].
    pub fn new(bus: Arc<dyn RemoteBus>) -> Self {
        Self {
            bus,
            config: Config::from_env(),
            overrides: Vec::new(),
            policy: Arc::new(AllowAll),
        }
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Override a connection parameter.
    pub fn param(mut self, key: impl Into<String>, value: impl Into<Variant>) -> Self {
        self.overrides.push((key.into(), Some(value.into())));
        self
    }

    /// Drop a connection parameter, including a default one.
    pub fn without_param(mut self, key: impl Into<String>) -> Self {
        self.overrides.push((key.into(), None));
        self
    }

    /// Decide which registrations the mock peer accepts. Default: all.
    pub fn policy(mut self, policy: impl RegistrarPolicy) -> Self {
        self.policy = Arc::new(policy);
        self
    }

    /// Bind the peer, attach the bridge and request the connection.
    pub async fn prepare(self) -> Result<Harness> {
        let Self {
            bus,
            config,
            overrides,
            policy,
        } = self;

        let (queue, sink) = EventQueue::new(&config);
        let mut params = ConnectionParams::for_config(&config);
        params.apply(overrides);

        let host: IpAddr = config.proxy_host().parse().map_err(|e| {
            Error::from(std::io::Error::new(std::io::ErrorKind::InvalidInput, e))
        })?;
        let policy = SharedPolicy(policy);
        let peer = match params.port() {
            Some(port) => MockPeer::bind((host, port).into(), policy, sink.clone()).await?,
            None => {
                let peer =
                    MockPeer::bind_random(host, config.port_range(), policy, sink.clone()).await?;
                params.set("port", peer.local_addr()?.port());
                peer
            }
        };

        let bridge = SignalBridge::attach(&bus, sink.clone());

        let conn = match request_connection(&bus, &config, &params).await {
            Ok(conn) => conn,
            Err(e) => {
                bridge.detach().await;
                peer.shutdown().await;
                return Err(e);
            }
        };
        tracing::debug!(bus_name = conn.destination(), path = conn.path(), "connection requested");

        Ok(Harness {
            queue,
            sink,
            bus,
            conn,
            peer,
            bridge,
            params,
            config,
        })
    }

    /// Prepare, run `body`, then tear down. The body's error wins over a
    /// teardown error.
    pub async fn exec<F>(self, body: F) -> Result
    where
        F: AsyncFnOnce(&mut Harness) -> Result,
    {
        let mut harness = self.prepare().await?;
        let outcome = body(&mut harness).await;
        let teardown = harness.teardown().await;
        outcome.and(teardown)
    }

    /// Prepare, call `Connect`, dispatch until a handler completes, then tear down.
    pub async fn go(self, dispatcher: Dispatcher) -> Result {
        self.go_with(async |h| h.connect().await, dispatcher).await
    }

    /// Like [`go`](Self::go), with a custom start step instead of `Connect`.
    pub async fn go_with<S>(self, start: S, dispatcher: Dispatcher) -> Result
    where
        S: AsyncFnOnce(&mut Harness) -> Result,
    {
        self.exec(async move |h| {
            start(&mut *h).await?;
            h.queue.run_handlers_forever(dispatcher).await
        })
        .await
    }
}

async fn request_connection(
    bus: &Arc<dyn RemoteBus>,
    config: &Config,
    params: &ConnectionParams,
) -> Result<Proxy> {
    let cm = config.connection_manager();
    let cm_proxy = Proxy::new(bus.clone(), &cm.bus_name, &cm.object_path);
    let reply = cm_proxy
        .call(
            ConnectionManager::INTERFACE,
            "RequestConnection",
            vec![config.protocol().into(), params.to_variant()],
        )
        .await?;

    let (bus_name, path) = match reply.peel() {
        Variant::Struct(fields) | Variant::Array(fields) => (
            fields.first().and_then(Variant::as_str),
            fields.get(1).and_then(Variant::as_str),
        ),
        _ => (None, None),
    };
    match (bus_name, path) {
        (Some(bus_name), Some(path)) => Ok(Proxy::new(bus.clone(), bus_name, path)),
        _ => Err(Error::Remote(RemoteFault::new(
            names::NOT_AVAILABLE,
            format!("RequestConnection returned {reply:?}"),
        ))),
    }
}

/// A policy already boxed by the builder.
struct SharedPolicy(Arc<dyn RegistrarPolicy>);

impl RegistrarPolicy for SharedPolicy {
    fn allow(&self, request: &SipRequest, source: SocketAddr) -> bool {
        self.0.allow(request, source)
    }
}
