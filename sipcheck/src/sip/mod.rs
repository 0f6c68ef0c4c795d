//! Minimal SIP message model, parser and formatter.
//!
//! Only what the mock peer needs to classify inbound datagrams and answer
//! them: no transactions, no retransmission, no authentication.

mod formatter;
mod message;
mod parser;

pub use formatter::format_message;
pub use message::{Header, Headers, Method, SipMessage, SipRequest, SipResponse, reason_phrase};
pub use parser::{ParseError, parse_message};

pub const SIP_VERSION: &str = "SIP/2.0";
