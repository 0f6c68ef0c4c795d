//! A scripted connection manager on a [`LoopbackBus`].
//!
//! `RequestConnection` exports a connection object whose `Connect` sends a
//! real REGISTER to the mock peer and reports the outcome through
//! `StatusChanged`, and whose `Disconnect` removes the object, so a second
//! `Disconnect` faults with `UnknownObject`.

#![allow(dead_code)]

use std::{
    net::SocketAddr,
    sync::{Arc, Weak},
    time::Duration,
};

use sipcheck::{
    CONNECTION_IFACE, Config, LoopbackBus, RemoteBus, RemoteFault, Variant,
    remote::{RawSignal, names},
    sip::{Method, SipMessage, SipRequest, format_message, parse_message},
};
use tokio::net::UdpSocket;

pub const CONN_BUS_NAME: &str = "org.freedesktop.Telepathy.Connection.sofiasip.sip.testacc";
pub const CONN_PATH: &str = "/org/freedesktop/Telepathy/Connection/sofiasip/sip/testacc";
pub const PROTOCOL_IFACE: &str = "org.freedesktop.Telepathy.Protocol";

pub const STATUS_CONNECTED: u32 = 0;
pub const STATUS_CONNECTING: u32 = 1;
pub const STATUS_DISCONNECTED: u32 = 2;

pub const REASON_NONE: u32 = 0;
pub const REASON_REQUESTED: u32 = 1;
pub const REASON_AUTHENTICATION_FAILED: u32 = 3;

/// Bus with a fake connection manager exported where `config` expects it.
pub fn fake_manager(config: &Config) -> (Arc<LoopbackBus>, Arc<dyn RemoteBus>) {
    let bus = Arc::new(LoopbackBus::new());
    let cm = config.connection_manager().clone();
    let weak = Arc::downgrade(&bus);

    bus.export(
        &cm.object_path,
        sipcheck::ConnectionManager::INTERFACE,
        "RequestConnection",
        move |args| {
            let params = args
                .get(1)
                .ok_or_else(|| RemoteFault::invalid_argument("missing parameters"))?;
            let account = params
                .get("account")
                .and_then(Variant::as_str)
                .ok_or_else(|| RemoteFault::invalid_argument("account is mandatory"))?
                .to_string();
            let port = params
                .get("port")
                .and_then(Variant::as_u32)
                .and_then(|p| u16::try_from(p).ok())
                .ok_or_else(|| RemoteFault::invalid_argument("port is mandatory"))?;
            let proxy: SocketAddr = ([127, 0, 0, 1], port).into();

            let bus = weak
                .upgrade()
                .ok_or_else(|| RemoteFault::new(names::NOT_AVAILABLE, "bus gone"))?;
            export_connection(&bus, account, proxy);
            Ok(Variant::Struct(vec![
                CONN_BUS_NAME.into(),
                Variant::ObjectPath(CONN_PATH.to_string()),
            ]))
        },
    );

    let protocol_path = format!("{}/sip", cm.object_path);
    bus.export(&protocol_path, PROTOCOL_IFACE, "IdentifyAccount", |args| {
        args.first()
            .and_then(|params| params.get("account"))
            .and_then(Variant::as_str)
            .map(Variant::from)
            .ok_or_else(|| RemoteFault::invalid_argument("'account' parameter not given"))
    });

    let remote: Arc<dyn RemoteBus> = bus.clone();
    (bus, remote)
}

fn export_connection(bus: &Arc<LoopbackBus>, account: String, proxy: SocketAddr) {
    let weak = Arc::downgrade(bus);
    bus.export(CONN_PATH, CONNECTION_IFACE, "Connect", move |_| {
        let Some(bus) = weak.upgrade() else {
            return Err(RemoteFault::new(names::NOT_AVAILABLE, "bus gone"));
        };
        status_changed(&bus, STATUS_CONNECTING, REASON_REQUESTED);
        tokio::spawn(register(Arc::downgrade(&bus), account.clone(), proxy));
        Ok(Variant::Struct(Vec::new()))
    });

    let weak = Arc::downgrade(bus);
    bus.export(CONN_PATH, CONNECTION_IFACE, "Disconnect", move |_| {
        if let Some(bus) = weak.upgrade() {
            status_changed(&bus, STATUS_DISCONNECTED, REASON_REQUESTED);
            bus.remove_object(CONN_PATH);
        }
        Ok(Variant::Struct(Vec::new()))
    });
}

pub fn status_changed(bus: &LoopbackBus, status: u32, reason: u32) {
    bus.emit(RawSignal::new(
        CONN_PATH,
        CONNECTION_IFACE,
        "StatusChanged",
        vec![status.into(), reason.into()],
    ));
}

async fn register(bus: Weak<LoopbackBus>, account: String, proxy: SocketAddr) {
    let (status, reason) = match try_register(&account, proxy).await {
        Some(200) => (STATUS_CONNECTED, REASON_NONE),
        _ => (STATUS_DISCONNECTED, REASON_AUTHENTICATION_FAILED),
    };
    if let Some(bus) = bus.upgrade() {
        status_changed(&bus, status, reason);
    }
}

async fn try_register(account: &str, proxy: SocketAddr) -> Option<u16> {
    let socket = UdpSocket::bind(("127.0.0.1", 0)).await.ok()?;
    let local = socket.local_addr().ok()?;
    let request = register_request(account, local);
    socket
        .send_to(&format_message(&SipMessage::Request(request)), proxy)
        .await
        .ok()?;

    let mut buf = vec![0u8; 4096];
    let (len, _) = tokio::time::timeout(Duration::from_secs(2), socket.recv_from(&mut buf))
        .await
        .ok()?
        .ok()?;
    match parse_message(&buf[..len]).ok()? {
        SipMessage::Response(response) => Some(response.code),
        SipMessage::Request(_) => None,
    }
}

pub fn register_request(account: &str, local: SocketAddr) -> SipRequest {
    let domain = account.split('@').nth(1).unwrap_or("127.0.0.1");
    SipRequest::new(Method::Register, format!("sip:{domain}"))
        .with_header("Via", format!("SIP/2.0/UDP {local};branch=z9hG4bK-reg-1"))
        .with_header("From", format!("<sip:{account}>;tag=fake-cm"))
        .with_header("To", format!("<sip:{account}>"))
        .with_header("Call-ID", "register-1@fake-cm")
        .with_header("CSeq", "1 REGISTER")
        .with_header("Contact", format!("<sip:{account}@{local}>"))
        .with_header("Expires", "3600")
}

/// Config aimed at the fake manager with a short default timeout.
pub fn config() -> Config {
    Config::default().with_default_timeout(Duration::from_secs(3))
}
