//! # sipcheck
//!
//! An event-driven conformance harness for SIP connection managers.
//!
//! A test drives the connection manager through its remote-procedure
//! interface while sipcheck impersonates the SIP proxy/registrar on the
//! wire. Everything either side observes lands, in order, in one
//! [`EventQueue`] that the test body asserts against:
//!
//! - [`MockPeer`] turns inbound SIP datagrams into `peer-*` events and
//!   answers REGISTER according to a [`RegistrarPolicy`];
//! - [`SignalBridge`] turns every remote signal into a `remote-signal` event;
//! - [`call_async`] turns a remote call's outcome into a `remote-return` or
//!   `remote-error` event.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sipcheck::*;
//!
//! # async fn run(bus: Arc<dyn RemoteBus>) -> Result {
//! Harness::builder(bus)
//!     .policy(|_req: &sip::SipRequest, _from: std::net::SocketAddr| true)
//!     .exec(async |h| {
//!         h.connect().await?;
//!         let register = h.expect("peer-register-attempt").await?;
//!         assert_eq!(register.str_field("host"), Some("127.0.0.1"));
//!         h.expect(EventMatcher::by_label("remote-signal").with_field("signal", "StatusChanged"))
//!             .await?;
//!         Ok(())
//!     })
//!     .await
//! # }
//! ```
//!
//! ## Core Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Event`] | Immutable record of one observation, with a [`Label`] and named fields |
//! | [`EventQueue`] | Ordered buffer with `expect(..).within(..)` semantics |
//! | [`EventMatcher`] | Predicate plus description, used by expectations and handlers |
//! | [`Dispatcher`] | First-match-wins handler table for dispatch mode |
//! | [`MockPeer`] | UDP SIP proxy/registrar stand-in |
//! | [`SignalBridge`] | Remote signals into events |
//! | [`Harness`] | One prepared run: queue, peer, bridge and connection |
//! | [`RemoteBus`] | The remote-procedure transport the component lives on |
//!
//! ## Verbose mode
//!
//! Set `SIPCHECK_VERBOSE` to a non-empty value, or pass `-v`, to print every
//! event an expectation or handler examines as `handled, ...` or
//! `not handled, ...`. On a terminal the lines are green and red.

mod bridge;
mod config;
mod diagnostics;
mod error;
mod event;
mod event_builder;
mod event_id;
mod harness;
mod label;
mod meta;
mod peer;
mod queue;

pub mod remote;
pub mod sip;

pub use bridge::{SignalBridge, call_async, signal_event};
pub use config::{Config, ConnectionManager, VERBOSE_ENV, VERBOSE_FLAG};
pub use error::Error;
pub use event::{Event, EventKind, canonical_label};
pub use event_builder::EventBuilder;
pub use event_id::EventId;
pub use harness::{CONNECTION_IFACE, ConnectionParams, Harness, HarnessBuilder};
pub use label::Label;
pub use meta::{Meta, Source};
pub use peer::{
    AllowAll, DEFAULT_EXPIRES, DenyAll, MockPeer, REGISTRATION_PROBE, Registration,
    RegistrarPolicy, Registry, normalize_headers, normalize_name,
};
pub use queue::{
    Dispatcher, EventMatcher, EventQueue, EventSink, ExpectMany, Expectation, HandlerContext,
    HandlerOutcome,
};
pub use remote::{LoopbackBus, Proxy, RemoteBus, RemoteFault, Variant, unwrap};

/// Convenience alias for `Result<T, sipcheck::Error>`.
pub type Result<T = ()> = std::result::Result<T, Error>;
