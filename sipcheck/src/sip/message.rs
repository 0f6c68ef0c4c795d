use std::{collections::BTreeMap, fmt};

/// SIP request method.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    Register,
    Invite,
    Ack,
    Bye,
    Cancel,
    Options,
    Message,
    Other(String),
}

impl Method {
    pub fn parse(s: &str) -> Self {
        match s {
            "REGISTER" => Method::Register,
            "INVITE" => Method::Invite,
            "ACK" => Method::Ack,
            "BYE" => Method::Bye,
            "CANCEL" => Method::Cancel,
            "OPTIONS" => Method::Options,
            "MESSAGE" => Method::Message,
            other => Method::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Method::Register => "REGISTER",
            Method::Invite => "INVITE",
            Method::Ack => "ACK",
            Method::Bye => "BYE",
            Method::Cancel => "CANCEL",
            Method::Options => "OPTIONS",
            Method::Message => "MESSAGE",
            Method::Other(s) => s,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single header line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub value: String,
}

/// Ordered header multimap with case-insensitive lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<Header>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// First value for `name` (case-insensitive).
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    /// All values for `name` in wire order.
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
            .collect()
    }

    /// Append a value, keeping existing ones.
    pub fn add(&mut self, name: &str, value: impl Into<String>) {
        self.entries.push(Header {
            name: name.to_string(),
            value: value.into(),
        });
    }

    /// Replace every value of `name` with a single one.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.remove(name);
        self.add(name, value);
    }

    pub fn remove(&mut self, name: &str) {
        self.entries.retain(|h| !h.name.eq_ignore_ascii_case(name));
    }

    pub fn entries(&self) -> &[Header] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Headers grouped by lower-cased name, values in wire order.
    pub fn grouped(&self) -> BTreeMap<String, Vec<String>> {
        let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for h in &self.entries {
            map.entry(h.name.to_ascii_lowercase())
                .or_default()
                .push(h.value.clone());
        }
        map
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SipRequest {
    pub method: Method,
    pub uri: String,
    pub version: String,
    pub headers: Headers,
    pub body: Vec<u8>,
}

impl SipRequest {
    pub fn new(method: Method, uri: impl Into<String>) -> Self {
        Self {
            method,
            uri: uri.into(),
            version: super::SIP_VERSION.to_string(),
            headers: Headers::new(),
            body: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.add(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SipResponse {
    pub version: String,
    pub code: u16,
    pub reason: String,
    pub headers: Headers,
    pub body: Vec<u8>,
}

impl SipResponse {
    pub fn new(code: u16) -> Self {
        Self {
            version: super::SIP_VERSION.to_string(),
            code,
            reason: reason_phrase(code).to_string(),
            headers: Headers::new(),
            body: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.add(name, value);
        self
    }

    /// Build a response to `request`, copying the dialog-identifying headers.
    pub fn from_request(code: u16, request: &SipRequest) -> Self {
        let mut response = Self::new(code);
        for name in ["Via", "From", "To", "Call-ID", "CSeq"] {
            for value in request.headers.get_all(name) {
                response.headers.add(name, value);
            }
        }
        response
    }
}

/// A parsed SIP datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SipMessage {
    Request(SipRequest),
    Response(SipResponse),
}

impl SipMessage {
    pub fn headers(&self) -> &Headers {
        match self {
            SipMessage::Request(r) => &r.headers,
            SipMessage::Response(r) => &r.headers,
        }
    }

    pub fn body(&self) -> &[u8] {
        match self {
            SipMessage::Request(r) => &r.body,
            SipMessage::Response(r) => &r.body,
        }
    }

    pub fn as_request(&self) -> Option<&SipRequest> {
        match self {
            SipMessage::Request(r) => Some(r),
            SipMessage::Response(_) => None,
        }
    }

    pub fn as_response(&self) -> Option<&SipResponse> {
        match self {
            SipMessage::Response(r) => Some(r),
            SipMessage::Request(_) => None,
        }
    }
}

pub fn reason_phrase(code: u16) -> &'static str {
    match code {
        100 => "Trying",
        180 => "Ringing",
        200 => "OK",
        202 => "Accepted",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        407 => "Proxy Authentication Required",
        408 => "Request Timeout",
        480 => "Temporarily Unavailable",
        481 => "Call/Transaction Does Not Exist",
        486 => "Busy Here",
        487 => "Request Terminated",
        500 => "Server Internal Error",
        503 => "Service Unavailable",
        603 => "Decline",
        _ => "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_parse_known_and_other() {
        assert_eq!(Method::parse("INVITE"), Method::Invite);
        assert_eq!(
            Method::parse("SUBSCRIBE"),
            Method::Other("SUBSCRIBE".to_string())
        );
        assert_eq!(Method::Other("NOTIFY".into()).to_string(), "NOTIFY");
    }

    #[test]
    fn headers_lookup_is_case_insensitive() {
        let mut headers = Headers::new();
        headers.add("Call-ID", "abc");
        headers.add("via", "SIP/2.0/UDP a");
        headers.add("Via", "SIP/2.0/UDP b");

        assert_eq!(headers.get("call-id"), Some("abc"));
        assert_eq!(headers.get_all("VIA"), vec!["SIP/2.0/UDP a", "SIP/2.0/UDP b"]);
    }

    #[test]
    fn headers_set_replaces_all_values() {
        let mut headers = Headers::new();
        headers.add("Expires", "10");
        headers.add("expires", "20");
        headers.set("Expires", "30");
        assert_eq!(headers.get_all("expires"), vec!["30"]);
    }

    #[test]
    fn grouped_lowercases_names() {
        let mut headers = Headers::new();
        headers.add("Via", "a");
        headers.add("VIA", "b");
        headers.add("Call-ID", "c");
        let grouped = headers.grouped();
        assert_eq!(grouped["via"], vec!["a", "b"]);
        assert_eq!(grouped["call-id"], vec!["c"]);
    }

    #[test]
    fn response_from_request_copies_dialog_headers() {
        let request = SipRequest::new(Method::Register, "sip:127.0.0.1")
            .with_header("Via", "SIP/2.0/UDP 127.0.0.1:5060;branch=z9hG4bK1")
            .with_header("From", "<sip:alice@127.0.0.1>;tag=1")
            .with_header("To", "<sip:alice@127.0.0.1>")
            .with_header("Call-ID", "call-1")
            .with_header("CSeq", "1 REGISTER")
            .with_header("Contact", "<sip:alice@127.0.0.1:5070>");

        let response = SipResponse::from_request(401, &request);
        assert_eq!(response.code, 401);
        assert_eq!(response.reason, "Unauthorized");
        assert_eq!(response.headers.get("call-id"), Some("call-1"));
        assert_eq!(response.headers.get("cseq"), Some("1 REGISTER"));
        assert!(response.headers.get("contact").is_none());
    }
}
