// Serialises SipMessage values into wire bytes

use super::message::{Headers, SipMessage};

fn write_headers_and_body(buf: &mut Vec<u8>, headers: &Headers, body: &[u8]) {
    for header in headers.entries() {
        buf.extend_from_slice(header.name.as_bytes());
        buf.extend_from_slice(b": ");
        buf.extend_from_slice(header.value.as_bytes());
        buf.extend_from_slice(b"\r\n");
    }
    if headers.get("Content-Length").is_none() {
        buf.extend_from_slice(format!("Content-Length: {}\r\n", body.len()).as_bytes());
    }
    buf.extend_from_slice(b"\r\n");
    buf.extend_from_slice(body);
}

/// Format a message as a single datagram.
///
/// A `Content-Length` header is added when the message does not carry one.
pub fn format_message(msg: &SipMessage) -> Vec<u8> {
    let mut buf = Vec::with_capacity(512);
    match msg {
        SipMessage::Request(req) => {
            buf.extend_from_slice(
                format!("{} {} {}\r\n", req.method, req.uri, req.version).as_bytes(),
            );
            write_headers_and_body(&mut buf, &req.headers, &req.body);
        }
        SipMessage::Response(resp) => {
            buf.extend_from_slice(
                format!("{} {} {}\r\n", resp.version, resp.code, resp.reason).as_bytes(),
            );
            write_headers_and_body(&mut buf, &resp.headers, &resp.body);
        }
    }
    buf
}
