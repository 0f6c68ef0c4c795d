use std::borrow::Cow;

/// Human-readable label for an event kind.
///
/// The label is the string test scripts match on (`"peer-invite"`,
/// `"remote-signal"`, ...) and the prefix of every diagnostic line.
///
/// # Example
///
/// ```rust
/// use sipcheck::{EventKind, Label};
///
/// assert_eq!(EventKind::PeerResponse.label(), "peer-response");
/// assert_eq!(EventKind::peer_request("INVITE").label(), "peer-invite");
/// ```
pub trait Label {
    /// Returns a human-readable label for this item.
    fn label(&self) -> Cow<'static, str>;
}
