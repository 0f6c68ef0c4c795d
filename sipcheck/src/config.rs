use std::{ops::RangeInclusive, time::Duration};

/// Environment variable that turns on verbose event tracing when non-empty.
pub const VERBOSE_ENV: &str = "SIPCHECK_VERBOSE";

/// Command-line switch with the same effect as [`VERBOSE_ENV`].
pub const VERBOSE_FLAG: &str = "-v";

/// Settings for one test run.
///
/// Use the builder methods to customize, or [`Default`] for the values a
/// local connection-manager test normally wants.
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
/// use sipcheck::Config;
///
/// let config = Config::default()
///     .with_default_timeout(Duration::from_secs(2))
///     .with_port_range(12000..=12099)
///     .with_verbose(true);
/// assert_eq!(config.port_range(), 12000..=12099);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    default_timeout: Duration,
    port_range: RangeInclusive<u16>,
    proxy_host: String,
    protocol: String,
    connection_manager: ConnectionManager,
    verbose: bool,
}

/// Where the connection manager lives on the remote bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionManager {
    pub bus_name: String,
    pub object_path: String,
}

impl ConnectionManager {
    pub const INTERFACE: &'static str = "org.freedesktop.Telepathy.ConnectionManager";

    pub fn new(bus_name: impl Into<String>, object_path: impl Into<String>) -> Self {
        Self {
            bus_name: bus_name.into(),
            object_path: object_path.into(),
        }
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        ConnectionManager::new(
            "org.freedesktop.Telepathy.ConnectionManager.sofiasip",
            "/org/freedesktop/Telepathy/ConnectionManager/sofiasip",
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            default_timeout: Duration::from_secs(5),
            port_range: 9090..=9999,
            proxy_host: "127.0.0.1".to_string(),
            protocol: "sip".to_string(),
            connection_manager: ConnectionManager::default(),
            verbose: false,
        }
    }
}

impl Config {
    /// Defaults, with verbosity taken from the process environment and
    /// command line.
    pub fn from_env() -> Self {
        let verbose = verbose_requested(
            std::env::var(VERBOSE_ENV).ok().as_deref(),
            std::env::args(),
        );
        Config::default().with_verbose(verbose)
    }

    /// Set how long an expectation waits when no explicit `within` is given.
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Set the range the mock peer picks its listening port from.
    pub fn with_port_range(mut self, range: RangeInclusive<u16>) -> Self {
        self.port_range = range;
        self
    }

    pub fn port_range(&self) -> RangeInclusive<u16> {
        self.port_range.clone()
    }

    /// Set the host the mock peer binds to and the connection is pointed at.
    pub fn with_proxy_host(mut self, host: impl Into<String>) -> Self {
        self.proxy_host = host.into();
        self
    }

    pub fn proxy_host(&self) -> &str {
        &self.proxy_host
    }

    /// Set the protocol name passed to `RequestConnection`.
    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = protocol.into();
        self
    }

    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    pub fn with_connection_manager(mut self, cm: ConnectionManager) -> Self {
        self.connection_manager = cm;
        self
    }

    pub fn connection_manager(&self) -> &ConnectionManager {
        &self.connection_manager
    }

    /// Print every event an expectation or handler examines.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }
}

fn verbose_requested<I, S>(env: Option<&str>, args: I) -> bool
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    env.is_some_and(|v| !v.is_empty()) || args.into_iter().any(|a| a.as_ref() == VERBOSE_FLAG)
}
