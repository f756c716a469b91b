//! W3C trace-context propagation through call metadata.
//!
//! Only version `00` of the `traceparent` header is produced. Parsing
//! accepts any version but rejects all-zero ids and malformed fields.

use http::{HeaderMap, HeaderValue};

/// Metadata key carrying the trace context.
pub const TRACEPARENT: &str = "traceparent";

const VERSION: u8 = 0;
const FLAG_SAMPLED: u8 = 0x01;

/// The identity of one span within a distributed trace.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TraceContext {
    trace_id: u128,
    span_id: u64,
    flags: u8,
}

impl TraceContext {
    /// Start a new, sampled trace.
    pub fn new_root() -> Self {
        Self {
            trace_id: nonzero_u128(),
            span_id: nonzero_u64(),
            flags: FLAG_SAMPLED,
        }
    }

    /// A new span in the same trace, with this span as its parent.
    pub fn child(&self) -> Self {
        Self {
            trace_id: self.trace_id,
            span_id: nonzero_u64(),
            flags: self.flags,
        }
    }

    pub fn trace_id(&self) -> u128 {
        self.trace_id
    }

    pub fn span_id(&self) -> u64 {
        self.span_id
    }

    pub fn is_sampled(&self) -> bool {
        self.flags & FLAG_SAMPLED != 0
    }

    /// Hex form of the trace id, as it appears in the header.
    pub fn trace_id_hex(&self) -> String {
        format!("{:032x}", self.trace_id)
    }

    /// Hex form of the span id, as it appears in the header.
    pub fn span_id_hex(&self) -> String {
        format!("{:016x}", self.span_id)
    }

    /// Parse a `traceparent` header value.
    pub fn parse(value: &str) -> Option<Self> {
        let mut parts = value.trim().split('-');
        let version = parse_hex_field(parts.next()?, 2)?;
        let trace_id = parse_hex_field(parts.next()?, 32)?;
        let span_id = parse_hex_field(parts.next()?, 16)?;
        let flags = parse_hex_field(parts.next()?, 2)?;

        // Version ff is forbidden; version 00 has exactly four fields
        if version == 0xff || (version == 0 && parts.next().is_some()) {
            return None;
        }
        if trace_id == 0 || span_id == 0 {
            return None;
        }

        Some(Self {
            trace_id,
            span_id: span_id as u64,
            flags: flags as u8,
        })
    }

    /// Read the trace context from call metadata, if present and valid.
    pub fn from_metadata(metadata: &HeaderMap) -> Option<Self> {
        metadata
            .get(TRACEPARENT)
            .and_then(|v| v.to_str().ok())
            .and_then(Self::parse)
    }

    /// Write this trace context into call metadata, replacing any existing one.
    pub fn inject(&self, metadata: &mut HeaderMap) {
        if let Ok(value) = HeaderValue::from_str(&self.to_string()) {
            metadata.insert(TRACEPARENT, value);
        }
    }
}

impl std::fmt::Display for TraceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:02x}-{:032x}-{:016x}-{:02x}",
            VERSION, self.trace_id, self.span_id, self.flags
        )
    }
}

fn parse_hex_field(field: &str, len: usize) -> Option<u128> {
    if field.len() != len || !field.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
        return None;
    }
    u128::from_str_radix(field, 16).ok()
}

fn nonzero_u128() -> u128 {
    loop {
        let id = rand::random::<u128>();
        if id != 0 {
            return id;
        }
    }
}

fn nonzero_u64() -> u64 {
    loop {
        let id = rand::random::<u64>();
        if id != 0 {
            return id;
        }
    }
}
