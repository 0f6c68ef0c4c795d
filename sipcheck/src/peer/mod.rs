//! The mock SIP peer: a UDP proxy/registrar stand-in.
//!
//! Every inbound datagram is parsed and turned into an [`Event`] on the
//! queue, except registration probes, which are answered silently. REGISTER
//! requests go through the injected [`RegistrarPolicy`]; everything else is
//! only relayed. Test code replies to those itself with
//! [`MockPeer::send_response`].

mod normalize;
mod registrar;

use std::{
    fmt, io,
    net::{IpAddr, SocketAddr},
    ops::RangeInclusive,
    sync::Arc,
};

use rand::Rng;
use tokio::{net::UdpSocket, select, task::JoinHandle};
use tokio_util::sync::CancellationToken;

pub use normalize::{normalize_headers, normalize_name};
pub use registrar::{AllowAll, DEFAULT_EXPIRES, DenyAll, Registration, RegistrarPolicy, Registry};

use crate::{
    Event, EventKind, EventSink, Result, Source,
    sip::{Method, SipMessage, SipRequest, SipResponse, format_message, parse_message},
};
use normalize::{body_value, header_fields, headers_value};

/// Subject of the OPTIONS keepalive the connection manager sends; answered
/// with `200 OK` and never reported.
pub const REGISTRATION_PROBE: &str = "REGISTRATION PROBE";

/// Largest datagram the peer reads.
const MAX_DATAGRAM: usize = 65_535;

/// How many random ports [`MockPeer::bind_random`] tries before giving up.
const BIND_ATTEMPTS: usize = 32;

/// A UDP SIP responder feeding an [`EventQueue`](crate::EventQueue).
///
/// The receive loop runs on its own task until [`shutdown`](Self::shutdown)
/// or drop.
pub struct MockPeer {
    socket: Arc<UdpSocket>,
    registry: Arc<Registry>,
    cancel_token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl fmt::Debug for MockPeer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockPeer")
            .field("local_addr", &self.socket.local_addr().ok())
            .field("registrations", &self.registry.len())
            .finish_non_exhaustive()
    }
}

impl MockPeer {
    /// Listen on `addr` and start answering.
    pub async fn bind(
        addr: SocketAddr,
        policy: impl RegistrarPolicy,
        sink: EventSink,
    ) -> Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self::start(socket, Arc::new(policy), sink))
    }

    /// Listen on a random port from `range`, retrying on ports in use.
    pub async fn bind_random(
        host: IpAddr,
        range: RangeInclusive<u16>,
        policy: impl RegistrarPolicy,
        sink: EventSink,
    ) -> Result<Self> {
        let socket = bind_random_socket(host, range).await?;
        Ok(Self::start(socket, Arc::new(policy), sink))
    }

    fn start(socket: UdpSocket, policy: Arc<dyn RegistrarPolicy>, sink: EventSink) -> Self {
        let socket = Arc::new(socket);
        let registry = Arc::new(Registry::new());
        let cancel_token = CancellationToken::new();

        let responder = Responder {
            socket: socket.clone(),
            policy,
            registry: registry.clone(),
            sink,
        };
        let task = tokio::spawn(responder.run(cancel_token.clone()));
        if let Ok(addr) = socket.local_addr() {
            tracing::debug!(%addr, "mock peer listening");
        }

        Self {
            socket,
            registry,
            cancel_token,
            task: Some(task),
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Registrations accepted so far.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Originate a request from the peer's socket.
    pub async fn send_request(&self, request: SipRequest, to: SocketAddr) -> Result {
        self.send(&SipMessage::Request(request), to).await
    }

    /// Answer a request; responses go back to the datagram source.
    pub async fn send_response(&self, response: SipResponse, to: SocketAddr) -> Result {
        self.send(&SipMessage::Response(response), to).await
    }

    async fn send(&self, message: &SipMessage, to: SocketAddr) -> Result {
        self.socket.send_to(&format_message(message), to).await?;
        Ok(())
    }

    /// A response to `request` carrying its Via, From, To, Call-ID and CSeq.
    pub fn response_from_request(code: u16, request: &SipRequest) -> SipResponse {
        SipResponse::from_request(code, request)
    }

    /// Stop the receive loop and wait for it to finish.
    pub async fn shutdown(mut self) {
        self.cancel_token.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for MockPeer {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

async fn bind_random_socket(host: IpAddr, range: RangeInclusive<u16>) -> Result<UdpSocket> {
    let mut last_err = None;
    for _ in 0..BIND_ATTEMPTS {
        let port = rand::thread_rng().gen_range(range.clone());
        match UdpSocket::bind(SocketAddr::new(host, port)).await {
            Ok(socket) => return Ok(socket),
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
                tracing::debug!(port, "port in use, retrying");
                last_err = Some(e);
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(last_err
        .unwrap_or_else(|| io::Error::new(io::ErrorKind::AddrInUse, "no free port"))
        .into())
}

/// The receive loop's state.
struct Responder {
    socket: Arc<UdpSocket>,
    policy: Arc<dyn RegistrarPolicy>,
    registry: Arc<Registry>,
    sink: EventSink,
}

impl Responder {
    async fn run(self, cancel_token: CancellationToken) {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            select! {
                biased;
                _ = cancel_token.cancelled() => break,
                received = self.socket.recv_from(&mut buf) => match received {
                    Ok((len, from)) => self.handle_datagram(&buf[..len], from).await,
                    // ICMP errors from earlier sends surface here on some platforms.
                    Err(e) => tracing::warn!(error = %e, "mock peer receive failed"),
                },
            }
        }
        tracing::debug!("mock peer stopped");
    }

    async fn handle_datagram(&self, data: &[u8], from: SocketAddr) {
        let message = match parse_message(data) {
            Ok(message) => Arc::new(message),
            Err(e) => {
                tracing::warn!(%from, error = %e, "dropping unparsable datagram");
                return;
            }
        };

        let reply = match message.as_ref() {
            SipMessage::Request(request) => self.handle_request(request, &message, from),
            SipMessage::Response(response) => {
                self.handle_response(response, &message);
                None
            }
        };

        if let Some(reply) = reply {
            let bytes = format_message(&SipMessage::Response(reply));
            if let Err(e) = self.socket.send_to(&bytes, from).await {
                tracing::warn!(%from, error = %e, "mock peer reply failed");
            }
        }
    }

    /// Classify a request and append its event. Returns the reply to send, if any.
    fn handle_request(
        &self,
        request: &SipRequest,
        message: &Arc<SipMessage>,
        from: SocketAddr,
    ) -> Option<SipResponse> {
        tracing::debug!(method = %request.method, uri = %request.uri, %from, "peer request");
        match &request.method {
            Method::Register => Some(self.handle_register(request, message, from)),
            Method::Options if is_probe(request) => Some(SipResponse::from_request(200, request)),
            method => {
                let event = Event::builder(EventKind::peer_request(method.as_str()))
                    .from_source(Source::Peer)
                    .with_field("uri", request.uri.as_str())
                    .with_field("headers", headers_value(&request.headers))
                    .with_field("body", body_value(&request.body))
                    .with_extra_fields(header_fields(&request.headers))
                    .with_message(message.clone())
                    .build();
                self.sink.append(event);
                None
            }
        }
    }

    fn handle_register(
        &self,
        request: &SipRequest,
        message: &Arc<SipMessage>,
        from: SocketAddr,
    ) -> SipResponse {
        let event = Event::builder(EventKind::PeerRegisterAttempt)
            .from_source(Source::Peer)
            .with_field("uri", request.uri.as_str())
            .with_field("headers", headers_value(&request.headers))
            .with_field("body", body_value(&request.body))
            .with_field("host", from.ip().to_string())
            .with_field("port", from.port())
            .with_message(message.clone())
            .build();
        self.sink.append(event);

        if !self.policy.allow(request, from) {
            tracing::debug!(%from, "registration denied");
            return SipResponse::from_request(401, request);
        }

        let mut response = SipResponse::from_request(200, request);
        if let Some(registration) = self.registry.register(request, from) {
            response.headers.add(
                "Contact",
                format!("{};expires={}", registration.contact, registration.expires),
            );
            response.headers.add("Expires", registration.expires.to_string());
        } else {
            response.headers.add("Expires", "0");
        }
        response
    }

    fn handle_response(&self, response: &SipResponse, message: &Arc<SipMessage>) {
        tracing::debug!(code = response.code, "peer response");
        let event = Event::builder(EventKind::PeerResponse)
            .from_source(Source::Peer)
            .with_field("code", response.code)
            .with_field("headers", headers_value(&response.headers))
            .with_field("body", body_value(&response.body))
            .with_extra_fields(header_fields(&response.headers))
            .with_message(message.clone())
            .build();
        self.sink.append(event);
    }
}

fn is_probe(request: &SipRequest) -> bool {
    request.headers.get("Subject") == Some(REGISTRATION_PROBE)
}

#[cfg(test)]
mod tests {
    use std::{net::Ipv4Addr, time::Duration};

    use super::*;
    use crate::{Config, EventQueue};

    fn localhost() -> IpAddr {
        IpAddr::V4(Ipv4Addr::LOCALHOST)
    }

    #[tokio::test]
    async fn bind_random_stays_in_range() {
        let (_queue, sink) = EventQueue::new(&Config::default());
        let peer = MockPeer::bind_random(localhost(), 9090..=9999, AllowAll, sink)
            .await
            .unwrap();
        let port = peer.local_addr().unwrap().port();
        assert!((9090..=9999).contains(&port), "port {port}");
        peer.shutdown().await;
    }

    #[tokio::test]
    async fn garbage_datagram_produces_no_event() {
        let (mut queue, sink) = EventQueue::new(&Config::default());
        let peer = MockPeer::bind(SocketAddr::new(localhost(), 0), AllowAll, sink)
            .await
            .unwrap();
        let client = UdpSocket::bind((localhost(), 0)).await.unwrap();
        client
            .send_to(b"not sip at all", peer.local_addr().unwrap())
            .await
            .unwrap();

        let err = queue
            .expect(crate::EventMatcher::any())
            .within(Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(matches!(err, crate::Error::Timeout { .. }), "{err:?}");
        peer.shutdown().await;
    }

    #[test]
    fn probe_detection() {
        let probe = SipRequest::new(Method::Options, "sip:127.0.0.1")
            .with_header("Subject", REGISTRATION_PROBE);
        assert!(is_probe(&probe));
        let plain = SipRequest::new(Method::Options, "sip:127.0.0.1");
        assert!(!is_probe(&plain));
    }
}
