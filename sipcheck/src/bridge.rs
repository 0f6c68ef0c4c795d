//! Remote signals and async call outcomes as queue events.

use std::{fmt, sync::Arc};

use futures_util::StreamExt;
use serde_json::Value;
use tokio::{select, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::{
    Event, EventKind, EventSink, Source,
    remote::{Proxy, RawSignal, RemoteBus, Variant, unwrap},
};

/// Turns every signal on a [`RemoteBus`] into a `remote-signal` event.
///
/// One wildcard subscription is made at attach time; it lives until
/// [`detach`](Self::detach) or drop.
pub struct SignalBridge {
    cancel_token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl fmt::Debug for SignalBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalBridge")
            .field("attached", &!self.cancel_token.is_cancelled())
            .finish()
    }
}

impl SignalBridge {
    pub fn attach(bus: &Arc<dyn RemoteBus>, sink: EventSink) -> Self {
        // Subscribe before spawning so no signal emitted after attach is missed.
        let mut signals = bus.subscribe_all();
        let cancel_token = CancellationToken::new();
        let token = cancel_token.clone();

        let task = tokio::spawn(async move {
            loop {
                select! {
                    biased;
                    _ = token.cancelled() => break,
                    maybe_signal = signals.next() => {
                        let Some(signal) = maybe_signal else {
                            tracing::debug!("signal stream ended");
                            break;
                        };
                        sink.append(signal_event(&signal));
                    }
                }
            }
        });

        Self {
            cancel_token,
            task: Some(task),
        }
    }

    /// Drop the subscription and wait for the forwarding task to end.
    pub async fn detach(mut self) {
        self.cancel_token.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for SignalBridge {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

/// A `remote-signal` event with every argument unwrapped.
pub fn signal_event(signal: &RawSignal) -> Event {
    tracing::trace!(path = %signal.path, member = %signal.member, "remote signal");
    Event::builder(EventKind::RemoteSignal)
        .from_source(Source::Bus)
        .with_field("path", signal.path.as_str())
        .with_field("signal", signal.member.as_str())
        .with_field("interface", signal.interface.as_str())
        .with_field("args", Value::Array(signal.args.iter().map(unwrap).collect()))
        .build()
}

/// Issue a remote call without waiting for it.
///
/// The outcome is appended to the queue: `remote-return` with `method` and
/// the unwrapped `value`, or `remote-error` with `method`, the fault `name`
/// and `message`.
pub fn call_async(
    sink: &EventSink,
    proxy: &Proxy,
    interface: &str,
    method: &str,
    args: Vec<Variant>,
) -> JoinHandle<()> {
    let call = proxy.method_call(interface, method, args);
    let reply = proxy.bus().call(call);
    let sink = sink.clone();
    let method = method.to_string();

    tokio::spawn(async move {
        let event = match reply.await {
            Ok(value) => Event::builder(EventKind::RemoteReturn)
                .with_field("value", unwrap(&value)),
            Err(fault) => {
                tracing::debug!(method = %method, fault = %fault, "async call failed");
                Event::builder(EventKind::RemoteError)
                    .with_field("name", fault.name)
                    .with_field("message", fault.message)
            }
        };
        sink.append(event.from_source(Source::Bus).with_field("method", method).build());
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        Config, EventQueue,
        remote::{LoopbackBus, RemoteFault},
    };
    use serde_json::json;

    fn setup() -> (Arc<LoopbackBus>, EventQueue, EventSink) {
        let bus = Arc::new(LoopbackBus::new());
        let (queue, sink) =
            EventQueue::new(&Config::default().with_default_timeout(Duration::from_secs(1)));
        (bus, queue, sink)
    }

    #[tokio::test]
    async fn signals_are_unwrapped_into_events() {
        let (bus, mut queue, sink) = setup();
        let remote: Arc<dyn RemoteBus> = bus.clone();
        let _bridge = SignalBridge::attach(&remote, sink);

        bus.emit(RawSignal::new(
            "/conn",
            "org.example.Connection",
            "StatusChanged",
            vec![Variant::boxed(0u32), Variant::Bytes(b"abc".to_vec())],
        ));

        let event = queue.expect("remote-signal").await.unwrap();
        assert_eq!(event.str_field("path"), Some("/conn"));
        assert_eq!(event.str_field("signal"), Some("StatusChanged"));
        assert_eq!(event.str_field("interface"), Some("org.example.Connection"));
        assert_eq!(event.field("args"), Some(&json!([0, "abc"])));
    }

    #[tokio::test]
    async fn signal_order_is_kept() {
        let (bus, mut queue, sink) = setup();
        let remote: Arc<dyn RemoteBus> = bus.clone();
        let _bridge = SignalBridge::attach(&remote, sink);

        bus.emit(RawSignal::new("/x", "org.example.I", "A", vec![]));
        bus.emit(RawSignal::new("/x", "org.example.I", "B", vec![]));

        let a = queue.expect("remote-signal").await.unwrap();
        let b = queue.expect("remote-signal").await.unwrap();
        assert_eq!(a.str_field("signal"), Some("A"));
        assert_eq!(b.str_field("signal"), Some("B"));
    }

    #[tokio::test]
    async fn detached_bridge_stops_forwarding() {
        let (bus, mut queue, sink) = setup();
        let remote: Arc<dyn RemoteBus> = bus.clone();
        SignalBridge::attach(&remote, sink).detach().await;

        bus.emit(RawSignal::new("/x", "org.example.I", "Late", vec![]));
        let err = queue
            .expect("remote-signal")
            .within(Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, crate::Error::QueueClosed | crate::Error::Timeout { .. }));
    }

    #[tokio::test]
    async fn async_call_appends_return_or_error() {
        let (bus, mut queue, sink) = setup();
        bus.export("/cm", "org.example.CM", "Echo", |args| {
            args.first()
                .cloned()
                .ok_or_else(|| RemoteFault::invalid_argument("nothing to echo"))
        });
        let proxy = Proxy::new(bus.clone(), "org.example.CM", "/cm");

        call_async(&sink, &proxy, "org.example.CM", "Echo", vec!["hi".into()]);
        let ret = queue.expect("remote-return").await.unwrap();
        assert_eq!(ret.str_field("method"), Some("Echo"));
        assert_eq!(ret.str_field("value"), Some("hi"));

        call_async(&sink, &proxy, "org.example.CM", "Echo", vec![]);
        let err = queue.expect("remote-error").await.unwrap();
        assert_eq!(
            err.str_field("name"),
            Some("org.freedesktop.Telepathy.Error.InvalidArgument")
        );
        assert_eq!(err.str_field("message"), Some("nothing to echo"));
    }
}
