//! Request metadata shared by every entry point (spec §3 Data Model).

use std::borrow::Cow;

/// Ordered multimap of header name to value, preserving insertion and duplicate order
/// the way wire headers do.
#[derive(Clone, Debug, Default)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Inbound vs. outbound, half of an edge identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    Inbound,
    Outbound,
}

impl Direction {
    pub const fn tag(self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

/// Unary, one-way, or streaming, the other half of an edge identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RpcType {
    Unary,
    Oneway,
    Streaming,
}

impl RpcType {
    pub const fn tag(self) -> &'static str {
        match self {
            RpcType::Unary => "unary",
            RpcType::Oneway => "oneway",
            RpcType::Streaming => "streaming",
        }
    }

    pub fn is_streaming(self) -> bool {
        matches!(self, RpcType::Streaming)
    }
}

/// The immutable per-call record handed to the middleware by a transport (spec §3,
/// §6 "Inputs from a transport").
#[derive(Clone, Debug)]
pub struct RequestMetadata {
    pub caller: String,
    pub callee: String,
    pub transport: String,
    pub procedure: String,
    pub encoding: String,
    pub routing_key: String,
    pub routing_delegate: String,
    pub shard_key: String,
    pub headers: Headers,
}

/// Caps an identity component's length and strips characters unsafe for a metric label,
/// matching the teacher's edge-identity sanitization convention: keep ASCII
/// alphanumerics, `.`, `_`, `-`, `/`; replace everything else with `_`; truncate to 255
/// bytes. An empty transport becomes `"unknown"`, per spec.md §4.3/§8.
pub fn sanitize_identity_component(raw: &str, is_transport: bool) -> Cow<'_, str> {
    const MAX_LEN: usize = 255;
    if is_transport && raw.is_empty() {
        return Cow::Borrowed(crate::error::UNKNOWN_TRANSPORT_TAG);
    }
    let needs_rewrite = raw.len() > MAX_LEN
        || raw
            .bytes()
            .any(|b| !(b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-' | b'/')));
    if !needs_rewrite {
        return Cow::Borrowed(raw);
    }
    let mut sanitized: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '/') { c } else { '_' })
        .collect();
    sanitized.truncate(MAX_LEN);
    Cow::Owned(sanitized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_transport_becomes_unknown() {
        assert_eq!(sanitize_identity_component("", true), "unknown");
    }

    #[test]
    fn unsafe_characters_are_replaced() {
        assert_eq!(sanitize_identity_component("orders Create!", false), "orders_Create_");
    }

    #[test]
    fn clean_component_is_returned_borrowed() {
        assert!(matches!(sanitize_identity_component("orders.Create", false), Cow::Borrowed(_)));
    }

    #[test]
    fn headers_preserve_duplicate_order() {
        let mut headers = Headers::new();
        headers.push("x-a", "1");
        headers.push("x-a", "2");
        let values: Vec<_> = headers.iter().map(|(_, v)| v).collect();
        assert_eq!(values, vec!["1", "2"]);
    }
}
