//! Registrar Example
//!
//! Runs the mock SIP peer on a random port and plays a user agent against
//! it: a registration probe, a REGISTER that the policy accepts, and a
//! MESSAGE that the test answers by hand.
//!
//! Run with `-v` (or `SIPCHECK_VERBOSE=1`) to see every event the queue
//! examines.

use std::{net::SocketAddr, time::Duration};

use sipcheck::{
    sip::{Method, SipMessage, SipRequest, format_message, parse_message},
    *,
};
use tokio::net::UdpSocket;

fn request(method: Method, call_id: &str, local: SocketAddr) -> SipRequest {
    SipRequest::new(method.clone(), "sip:127.0.0.1")
        .with_header("Via", format!("SIP/2.0/UDP {local};branch=z9hG4bK-{call_id}"))
        .with_header("From", "<sip:alice@127.0.0.1>;tag=demo")
        .with_header("To", "<sip:alice@127.0.0.1>")
        .with_header("Call-ID", call_id)
        .with_header("CSeq", format!("1 {method}"))
}

async fn send(ua: &UdpSocket, request: SipRequest, to: SocketAddr) -> Result {
    ua.send_to(&format_message(&SipMessage::Request(request)), to)
        .await?;
    Ok(())
}

async fn reply_code(ua: &UdpSocket) -> Result<u16> {
    let mut buf = vec![0u8; 4096];
    let (len, _) = ua.recv_from(&mut buf).await?;
    match parse_message(&buf[..len])? {
        SipMessage::Response(response) => Ok(response.code),
        SipMessage::Request(_) => Ok(0),
    }
}

#[tokio::main]
async fn main() -> Result {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let config = Config::from_env().with_default_timeout(Duration::from_secs(2));
    let (mut queue, sink) = EventQueue::new(&config);
    let peer = MockPeer::bind_random([127, 0, 0, 1].into(), config.port_range(), AllowAll, sink)
        .await?;
    let proxy = peer.local_addr()?;
    println!("mock peer listening on {proxy}");

    let ua = UdpSocket::bind("127.0.0.1:0").await?;
    let local = ua.local_addr()?;

    let probe = request(Method::Options, "probe", local).with_header("Subject", REGISTRATION_PROBE);
    send(&ua, probe, proxy).await?;
    println!("probe answered with {}", reply_code(&ua).await?);

    let register = request(Method::Register, "reg", local)
        .with_header("Contact", format!("<sip:alice@{local}>"))
        .with_header("Expires", "600");
    send(&ua, register, proxy).await?;
    let attempt = queue.expect("peer-register-attempt").await?;
    println!("{attempt}");
    println!("register answered with {}", reply_code(&ua).await?);

    let message = request(Method::Message, "msg", local).with_body("hello");
    send(&ua, message, proxy).await?;
    let event = queue.expect("peer-message").await?;
    println!("{event}");
    if let Some(request) = event.message().and_then(SipMessage::as_request) {
        peer.send_response(MockPeer::response_from_request(200, request), local)
            .await?;
    }
    println!("message answered with {}", reply_code(&ua).await?);

    peer.shutdown().await;
    Ok(())
}
