use std::collections::BTreeMap;

use serde_json::Value;

use crate::sip::Headers;

/// Header name as an event field name: lower-cased, `-` replaced by `_`.
///
/// Applying it twice gives the same result as applying it once.
pub fn normalize_name(name: &str) -> String {
    name.to_ascii_lowercase().replace('-', "_")
}

/// One field per header name, holding the first value seen for it.
pub fn normalize_headers(headers: &Headers) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for header in headers.entries() {
        out.entry(normalize_name(&header.name))
            .or_insert_with(|| header.value.clone());
    }
    out
}

/// Raw headers as a JSON object of name to array of values.
pub(crate) fn headers_value(headers: &Headers) -> Value {
    Value::Object(
        headers
            .grouped()
            .into_iter()
            .map(|(name, values)| (name, Value::from(values)))
            .collect(),
    )
}

/// Normalized headers as event fields.
pub(crate) fn header_fields(headers: &Headers) -> impl Iterator<Item = (String, Value)> {
    normalize_headers(headers)
        .into_iter()
        .map(|(name, value)| (name, Value::String(value)))
}

pub(crate) fn body_value(body: &[u8]) -> Value {
    Value::String(String::from_utf8_lossy(body).into_owned())
}
