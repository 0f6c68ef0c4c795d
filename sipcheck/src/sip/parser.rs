// SIP datagram parser built from nom combinators

use nom::{
    IResult,
    bytes::complete::{tag, take_until, take_while1},
    character::complete::{digit1, space0, space1},
};
use std::fmt;

use super::message::{Headers, Method, SipMessage, SipRequest, SipResponse};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    pub fn new(message: impl Into<String>) -> Self {
        ParseError {
            message: message.into(),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SIP parse error: {}", self.message)
    }
}

impl std::error::Error for ParseError {}

/// Parse one SIP message from a datagram.
///
/// Responses are recognised by a leading `SIP/`; anything else is parsed
/// as a request.
pub fn parse_message(input: &[u8]) -> Result<SipMessage, ParseError> {
    if input.is_empty() {
        return Err(ParseError::new("empty input"));
    }
    if input.starts_with(b"SIP/") {
        parse_response(input)
    } else {
        parse_request(input)
    }
}

fn crlf(input: &[u8]) -> IResult<&[u8], &[u8]> {
    tag(b"\r\n")(input)
}

fn request_line(input: &[u8]) -> IResult<&[u8], (&[u8], &[u8], &[u8])> {
    let (input, method) = take_while1(|b: u8| b.is_ascii_alphabetic())(input)?;
    let (input, _) = space1(input)?;
    let (input, uri) = take_while1(|b: u8| b != b' ' && b != b'\r' && b != b'\n')(input)?;
    let (input, _) = space1(input)?;
    let (input, version) = take_until("\r\n")(input)?;
    let (input, _) = crlf(input)?;
    Ok((input, (method, uri, version)))
}

fn status_line(input: &[u8]) -> IResult<&[u8], (&[u8], &[u8], &[u8])> {
    let (input, version) = take_while1(|b: u8| b != b' ' && b != b'\r' && b != b'\n')(input)?;
    let (input, _) = space1(input)?;
    let (input, code) = digit1(input)?;
    let (input, _) = space0(input)?;
    let (input, reason) = take_until("\r\n")(input)?;
    let (input, _) = crlf(input)?;
    Ok((input, (version, code, reason)))
}

fn header_line(input: &[u8]) -> IResult<&[u8], (&[u8], &[u8])> {
    let (input, name) = take_while1(|b: u8| b != b':' && b != b'\r' && b != b'\n')(input)?;
    let (input, _) = tag(b":")(input)?;
    let (input, _) = space0(input)?;
    let (input, value) = take_until("\r\n")(input)?;
    let (input, _) = crlf(input)?;
    Ok((input, (name, value)))
}

fn header_block(mut input: &[u8]) -> IResult<&[u8], Vec<(&[u8], &[u8])>> {
    let mut headers = Vec::new();
    loop {
        if input.starts_with(b"\r\n") {
            let (rest, _) = crlf(input)?;
            return Ok((rest, headers));
        }
        if input.is_empty() {
            return Ok((input, headers));
        }
        let (rest, header) = header_line(input)?;
        headers.push(header);
        input = rest;
    }
}

fn utf8<'a>(bytes: &'a [u8], what: &str) -> Result<&'a str, ParseError> {
    std::str::from_utf8(bytes).map_err(|_| ParseError::new(format!("invalid UTF-8 in {what}")))
}

/// Expand RFC 3261 compact header names.
fn long_name(name: &str) -> &str {
    match name {
        "i" | "I" => "Call-ID",
        "v" | "V" => "Via",
        "f" | "F" => "From",
        "t" | "T" => "To",
        "m" | "M" => "Contact",
        "l" | "L" => "Content-Length",
        "c" | "C" => "Content-Type",
        "e" | "E" => "Content-Encoding",
        "s" | "S" => "Subject",
        "k" | "K" => "Supported",
        other => other,
    }
}

fn collect_headers(raw: &[(&[u8], &[u8])]) -> Result<Headers, ParseError> {
    let mut headers = Headers::new();
    for (name, value) in raw {
        let name = utf8(name, "header name")?.trim();
        let value = utf8(value, "header value")?.trim();
        headers.add(long_name(name), value);
    }
    Ok(headers)
}

fn body(remaining: &[u8], headers: &Headers) -> Result<Vec<u8>, ParseError> {
    let declared = headers
        .get("Content-Length")
        .map(|v| {
            v.trim()
                .parse::<usize>()
                .map_err(|_| ParseError::new(format!("invalid Content-Length: {v}")))
        })
        .transpose()?;

    match declared {
        Some(len) if remaining.len() < len => Err(ParseError::new(format!(
            "body too short: expected {len} bytes, got {}",
            remaining.len()
        ))),
        Some(len) => Ok(remaining[..len].to_vec()),
        None => Ok(remaining.to_vec()),
    }
}

fn parse_request(input: &[u8]) -> Result<SipMessage, ParseError> {
    let (rest, (method, uri, version)) =
        request_line(input).map_err(|e| ParseError::new(format!("invalid request line: {e}")))?;
    let version = utf8(version, "SIP version")?;
    if !version.starts_with("SIP/") {
        return Err(ParseError::new(format!("invalid SIP version: {version}")));
    }

    let (rest, raw) =
        header_block(rest).map_err(|e| ParseError::new(format!("invalid headers: {e}")))?;
    let headers = collect_headers(&raw)?;
    let body = body(rest, &headers)?;

    Ok(SipMessage::Request(SipRequest {
        method: Method::parse(utf8(method, "method")?),
        uri: utf8(uri, "request URI")?.to_string(),
        version: version.to_string(),
        headers,
        body,
    }))
}

fn parse_response(input: &[u8]) -> Result<SipMessage, ParseError> {
    let (rest, (version, code, reason)) =
        status_line(input).map_err(|e| ParseError::new(format!("invalid status line: {e}")))?;
    let code_str = utf8(code, "status code")?;
    let code: u16 = code_str
        .parse()
        .map_err(|_| ParseError::new(format!("invalid status code: {code_str}")))?;

    let (rest, raw) =
        header_block(rest).map_err(|e| ParseError::new(format!("invalid headers: {e}")))?;
    let headers = collect_headers(&raw)?;
    let body = body(rest, &headers)?;

    Ok(SipMessage::Response(SipResponse {
        version: utf8(version, "SIP version")?.to_string(),
        code,
        reason: utf8(reason, "reason phrase")?.to_string(),
        headers,
        body,
    }))
}
