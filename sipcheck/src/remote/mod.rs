//! The remote-procedure boundary.
//!
//! The component under test is reached through [`RemoteBus`]: method calls
//! addressed by object path, and a wildcard signal subscription. Values
//! cross the boundary as [`Variant`]s; [`unwrap`] turns them into plain
//! [`serde_json::Value`]s for assertions.
//!
//! [`LoopbackBus`] is an in-process implementation for standing up fake
//! components in tests.

mod bus;
mod fault;
mod loopback;
mod variant;

pub use bus::{MethodCall, PROPERTIES_IFACE, Proxy, RawSignal, RemoteBus, SignalStream};
pub use fault::{RemoteFault, names};
pub use loopback::LoopbackBus;
pub use variant::{Variant, unwrap};
