use std::{
    net::SocketAddr,
    time::{Duration, Instant},
};

use dashmap::DashMap;

use crate::sip::SipRequest;

/// Registration lifetime when the request names none.
pub const DEFAULT_EXPIRES: u32 = 3600;

/// Decides whether the mock registrar accepts a REGISTER.
///
/// Implemented for any `Fn(&SipRequest, SocketAddr) -> bool`, so a closure
/// works directly:
///
/// ```rust
/// use std::net::SocketAddr;
/// use sipcheck::{RegistrarPolicy, sip::SipRequest};
///
/// fn takes(_: impl RegistrarPolicy) {}
/// takes(|req: &SipRequest, _from: SocketAddr| req.headers.get("Authorization").is_some());
/// ```
pub trait RegistrarPolicy: Send + Sync + 'static {
    fn allow(&self, request: &SipRequest, source: SocketAddr) -> bool;
}

impl<F> RegistrarPolicy for F
where
    F: Fn(&SipRequest, SocketAddr) -> bool + Send + Sync + 'static,
{
    fn allow(&self, request: &SipRequest, source: SocketAddr) -> bool {
        self(request, source)
    }
}

/// Accept every registration.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl RegistrarPolicy for AllowAll {
    fn allow(&self, _request: &SipRequest, _source: SocketAddr) -> bool {
        true
    }
}

/// Reject every registration.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenyAll;

impl RegistrarPolicy for DenyAll {
    fn allow(&self, _request: &SipRequest, _source: SocketAddr) -> bool {
        false
    }
}

/// One address-of-record binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub contact: String,
    pub source: SocketAddr,
    pub expires: u32,
    registered_at: Instant,
}

impl Registration {
    pub fn is_expired(&self) -> bool {
        self.registered_at.elapsed() >= Duration::from_secs(u64::from(self.expires))
    }
}

/// In-memory location service for accepted registrations.
#[derive(Debug, Default)]
pub struct Registry {
    bindings: DashMap<String, Registration>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply an accepted REGISTER.
    ///
    /// Binds the To address-of-record to the Contact. An expiry of zero (from
    /// the `Expires` header or the Contact `expires` parameter) removes the
    /// binding. Returns the stored binding, `None` if it was removed or the
    /// request had no usable To header.
    pub fn register(&self, request: &SipRequest, source: SocketAddr) -> Option<Registration> {
        let aor = address_of_record(request.headers.get("To")?)?;
        let contact = request.headers.get("Contact").unwrap_or_default();
        let expires = expires_of(request);

        if expires == 0 {
            tracing::debug!(aor = %aor, "registration removed");
            self.bindings.remove(&aor);
            return None;
        }

        let registration = Registration {
            contact: strip_params(contact).to_string(),
            source,
            expires,
            registered_at: Instant::now(),
        };
        tracing::debug!(aor = %aor, contact = %registration.contact, expires, "registration stored");
        self.bindings.insert(aor, registration.clone());
        Some(registration)
    }

    /// The live binding for `aor`; expired bindings are dropped on lookup.
    pub fn lookup(&self, aor: &str) -> Option<Registration> {
        if self.bindings.remove_if(aor, |_, r| r.is_expired()).is_some() {
            tracing::debug!(aor, "expired registration dropped");
            return None;
        }
        self.bindings.get(aor).map(|entry| entry.clone())
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn clear(&self) {
        self.bindings.clear();
    }
}

/// The expiry a REGISTER asks for: the Contact `expires` parameter, else the
/// `Expires` header, else [`DEFAULT_EXPIRES`].
pub(crate) fn expires_of(request: &SipRequest) -> u32 {
    let from_contact = request
        .headers
        .get("Contact")
        .and_then(|c| param(c, "expires"))
        .and_then(|v| v.parse().ok());
    let from_header = request
        .headers
        .get("Expires")
        .and_then(|v| v.trim().parse().ok());
    from_contact.or(from_header).unwrap_or(DEFAULT_EXPIRES)
}

/// `sip:alice@example.com` out of `"Alice" <sip:alice@example.com>;tag=1`.
pub(crate) fn address_of_record(header: &str) -> Option<String> {
    let uri = match (header.find('<'), header.find('>')) {
        (Some(start), Some(end)) if start < end => &header[start + 1..end],
        _ => strip_params(header),
    };
    let uri = uri.trim();
    (!uri.is_empty()).then(|| uri.to_string())
}

fn strip_params(value: &str) -> &str {
    if value.contains('<') {
        // Parameters after the closing bracket belong to the header.
        return value.find('>').map_or(value, |end| &value[..=end]).trim();
    }
    value.split(';').next().unwrap_or(value).trim()
}

fn param<'a>(value: &'a str, name: &str) -> Option<&'a str> {
    let params = match value.rfind('>') {
        Some(end) => &value[end + 1..],
        None => value,
    };
    params.split(';').skip(1).find_map(|p| {
        let (key, val) = p.split_once('=')?;
        key.trim().eq_ignore_ascii_case(name).then(|| val.trim())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sip::Method;

    fn source() -> SocketAddr {
        "127.0.0.1:5060".parse().unwrap()
    }

    fn register(to: &str, contact: &str) -> SipRequest {
        SipRequest::new(Method::Register, "sip:127.0.0.1")
            .with_header("To", to)
            .with_header("Contact", contact)
    }

    #[test]
    fn aor_from_name_addr_and_bare_uri() {
        assert_eq!(
            address_of_record("\"Alice\" <sip:alice@example.com>;tag=1").as_deref(),
            Some("sip:alice@example.com")
        );
        assert_eq!(
            address_of_record("sip:bob@example.com;tag=2").as_deref(),
            Some("sip:bob@example.com")
        );
        assert_eq!(address_of_record("  "), None);
    }

    #[test]
    fn expires_precedence() {
        let req = register("<sip:a@x>", "<sip:a@1.2.3.4>;expires=60").with_header("Expires", "120");
        assert_eq!(expires_of(&req), 60);

        let req = register("<sip:a@x>", "<sip:a@1.2.3.4>").with_header("Expires", "120");
        assert_eq!(expires_of(&req), 120);

        let req = register("<sip:a@x>", "<sip:a@1.2.3.4>");
        assert_eq!(expires_of(&req), DEFAULT_EXPIRES);
    }

    #[test]
    fn register_then_lookup() {
        let registry = Registry::new();
        let stored = registry
            .register(&register("<sip:testacc@127.0.0.1>", "<sip:testacc@127.0.0.1:5061>"), source())
            .unwrap();
        assert_eq!(stored.contact, "<sip:testacc@127.0.0.1:5061>");

        let found = registry.lookup("sip:testacc@127.0.0.1").unwrap();
        assert_eq!(found.source, source());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn zero_expiry_unregisters() {
        let registry = Registry::new();
        registry.register(&register("<sip:a@x>", "<sip:a@1.2.3.4>"), source());
        let removed = registry.register(
            &register("<sip:a@x>", "<sip:a@1.2.3.4>").with_header("Expires", "0"),
            source(),
        );
        assert!(removed.is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn expired_binding_is_dropped_on_lookup() {
        let registry = Registry::new();
        registry.bindings.insert(
            "sip:old@x".to_string(),
            Registration {
                contact: "<sip:old@1.2.3.4>".to_string(),
                source: source(),
                expires: 1,
                registered_at: Instant::now() - Duration::from_secs(5),
            },
        );
        assert!(registry.lookup("sip:old@x").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn registrations_from_many_threads_all_land() {
        let registry = Registry::new();
        std::thread::scope(|scope| {
            for n in 0..8 {
                let registry = &registry;
                scope.spawn(move || {
                    let to = format!("<sip:user{n}@x>");
                    let contact = format!("<sip:user{n}@1.2.3.4>");
                    registry.register(&register(&to, &contact), source());
                });
            }
        });
        assert_eq!(registry.len(), 8);
        assert!(registry.lookup("sip:user7@x").is_some());
        registry.clear();
        assert!(registry.is_empty());
    }

    #[test]
    fn closures_are_policies() {
        let policy = |req: &SipRequest, _: SocketAddr| req.headers.get("Authorization").is_some();
        let req = register("<sip:a@x>", "<sip:a@1.2.3.4>");
        assert!(!policy.allow(&req, source()));
        assert!(policy.allow(&req.with_header("Authorization", "Digest x"), source()));
        assert!(AllowAll.allow(&register("<sip:a@x>", ""), source()));
        assert!(!DenyAll.allow(&register("<sip:a@x>", ""), source()));
    }
}
