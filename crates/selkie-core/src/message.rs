//! Messages exchanged between actors, workers, and connection events
//!
//! A message is immutable once queued; source and destination are stamped by
//! the sending context at send time. Payloads are either raw bytes or a
//! shared in-process value (the runtime never inspects them).

use crate::address::Address;
use bytes::Bytes;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

// =============================================================================
// MsgKind
// =============================================================================

/// Message kind
///
/// `Text` and `Timer` are produced by the runtime itself; `Custom` carries a
/// user-defined tag for distinguishing message families sent to one actor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MsgKind {
    /// Plain data message
    Text,
    /// Timer expiry, synthesized by the timer worker
    Timer,
    /// User-defined kind
    Custom(String),
}

impl fmt::Display for MsgKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MsgKind::Text => f.write_str("text"),
            MsgKind::Timer => f.write_str("timer"),
            MsgKind::Custom(name) => write!(f, "custom:{}", name),
        }
    }
}

// =============================================================================
// Payload
// =============================================================================

/// Opaque message payload
#[derive(Clone, Default)]
pub enum Payload {
    /// No payload
    #[default]
    Empty,
    /// Raw bytes
    Bytes(Bytes),
    /// Shared in-process value
    Value(Arc<dyn Any + Send + Sync>),
}

impl Payload {
    /// Borrow the payload as bytes, if it is one
    pub fn bytes(&self) -> Option<&Bytes> {
        match self {
            Payload::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Downcast a shared value payload to a concrete type
    pub fn value<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        match self {
            Payload::Value(v) => Arc::clone(v).downcast::<T>().ok(),
            _ => None,
        }
    }

    /// Whether there is no payload
    pub fn is_empty(&self) -> bool {
        matches!(self, Payload::Empty)
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Empty => f.write_str("Empty"),
            Payload::Bytes(b) => write!(f, "Bytes({} bytes)", b.len()),
            Payload::Value(_) => f.write_str("Value(..)"),
        }
    }
}

impl From<Bytes> for Payload {
    fn from(b: Bytes) -> Self {
        Payload::Bytes(b)
    }
}

impl From<&str> for Payload {
    fn from(s: &str) -> Self {
        Payload::Bytes(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl From<String> for Payload {
    fn from(s: String) -> Self {
        Payload::Bytes(Bytes::from(s))
    }
}

// =============================================================================
// Msg
// =============================================================================

/// A routed message
///
/// Created by the sender, owned by whichever queue it sits in, and consumed
/// when the receiving callback returns (or dropped with a logged error when
/// undeliverable).
#[derive(Debug, Clone)]
pub struct Msg {
    source: Address,
    destination: Address,
    kind: MsgKind,
    desc: String,
    payload: Payload,
}

impl Msg {
    /// Create a text message with the given payload
    pub fn text(payload: impl Into<Payload>) -> Self {
        Self {
            source: Address::system(),
            destination: Address::system(),
            kind: MsgKind::Text,
            desc: String::new(),
            payload: payload.into(),
        }
    }

    /// Create a message carrying a shared in-process value
    pub fn value<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            source: Address::system(),
            destination: Address::system(),
            kind: MsgKind::Text,
            desc: String::new(),
            payload: Payload::Value(Arc::new(value)),
        }
    }

    /// Create a message with a custom kind tag
    pub fn custom(kind: impl Into<String>, payload: impl Into<Payload>) -> Self {
        Self {
            source: Address::system(),
            destination: Address::system(),
            kind: MsgKind::Custom(kind.into()),
            desc: String::new(),
            payload: payload.into(),
        }
    }

    /// Create a timer-expiry message (used by the timer worker)
    pub fn timer(timer_name: impl Into<String>) -> Self {
        Self {
            source: Address::timer(),
            destination: Address::system(),
            kind: MsgKind::Timer,
            desc: timer_name.into(),
            payload: Payload::Empty,
        }
    }

    /// Set the message descriptor
    pub fn with_desc(mut self, desc: impl Into<String>) -> Self {
        self.desc = desc.into();
        self
    }

    /// Stamp the source address (done by the sending context)
    pub fn set_source(&mut self, source: Address) {
        self.source = source;
    }

    /// Stamp the destination address (done by the sending context)
    pub fn set_destination(&mut self, destination: Address) {
        self.destination = destination;
    }

    /// The source address
    pub fn source(&self) -> &Address {
        &self.source
    }

    /// The destination address
    pub fn destination(&self) -> &Address {
        &self.destination
    }

    /// The message kind
    pub fn kind(&self) -> &MsgKind {
        &self.kind
    }

    /// The message descriptor
    pub fn desc(&self) -> &str {
        &self.desc
    }

    /// The payload
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// The payload as a UTF-8 string, if it is bytes
    pub fn payload_str(&self) -> Option<&str> {
        self.payload.bytes().and_then(|b| std::str::from_utf8(b).ok())
    }
}

impl fmt::Display for Msg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} -> {} {}]", self.source, self.destination, self.kind)
    }
}
