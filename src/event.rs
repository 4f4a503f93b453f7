use indexmap::IndexMap;
use serde::Serialize;

use std::net::{Ipv4Addr, Ipv6Addr};

/// A decoded flow record: an insertion-ordered mapping from field name to
/// scalar value, in the order fields appeared on the wire (after the
/// synthesized `@timestamp` and promoted header fields).
pub type FlowEvent = IndexMap<String, FieldValue>;

/// RFC 6759 application identifier: a one-byte classification engine id
/// followed by an engine-specific selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ApplicationId {
    pub classification_engine_id: u8,
    pub selector_id: u64,
}

/// Holds one decoded field with its relevant datatype.
///
/// Untagged so events serialize flat: `{"in_bytes": 40, "ipv4_src_addr": "1.2.3.4"}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Unsigned(u64),
    String(String),
    /// An ISO-8601 rendering produced by timestamp normalization
    Timestamp(String),
    Ip4Addr(Ipv4Addr),
    Ip6Addr(Ipv6Addr),
    /// Colon-separated lowercase hex, `"aa:bb:cc:dd:ee:ff"`
    MacAddr(String),
    Bytes(Vec<u8>),
    ApplicationId(ApplicationId),
}

impl FieldValue {
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            FieldValue::Unsigned(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<u64> for FieldValue {
    fn from(v: u64) -> Self {
        FieldValue::Unsigned(v)
    }
}
