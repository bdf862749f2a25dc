//! # Error Handling for the Wire VM
//!
//! This module defines the **wire-level error taxonomy** ([`VmError`]) raised
//! by the codec, stack, registry and VM loop, and the **ambient/transport
//! error taxonomy** ([`ServerError`]) raised while standing up the listener.
//!
//! ## Design
//! - [`VmError`] is the only error type ever serialized back to a client (as
//!   a wire `Error` value, see [`crate::value::Value::Error`]). Its `Display`
//!   impl produces exactly the message text the protocol's golden tests
//!   expect (e.g. `"stack exhausted"`, `"no such opcode: 3"`).
//! - [`ServerError`] never reaches the wire. It aborts server startup (bad
//!   TLS material, an unbindable address) or is logged and drops a single
//!   connection; sessions never see it directly.
//!
//! The two are kept deliberately separate, mirroring the protocol's own
//! split between "reportable to the client" and "programmer/ops error".

use std::fmt;

/// Errors that can occur while executing a session's bytecode stream.
///
/// Every variant corresponds to one of the abstract error kinds in the
/// protocol: codec, bounds, stack-exhaustion, host-command, and
/// unsupported-encode.
#[derive(Debug, PartialEq)]
pub enum VmError {
    /// Malformed or truncated value on the wire (bad tag, short read, bad
    /// UTF-8, truncated SLEB128).
    Codec(String),
    /// `Call i` with `i` outside `0..len(registry)`.
    Bounds(String),
    /// `Call i` with fewer than `len(registry[i].argument_types)` values on
    /// the stack.
    StackExhausted,
    /// A host command returned an error, or panicked and was caught by the
    /// invoker's `catch_unwind` boundary.
    Host(String),
    /// A `Value` was handed to the codec's `write` with no matching wire
    /// representation (only reachable for `Type::Object`, which has no
    /// constructible `Value` variant today).
    UnsupportedEncode(String),
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VmError::Codec(msg) => write!(f, "{}", msg),
            VmError::Bounds(msg) => write!(f, "{}", msg),
            VmError::StackExhausted => write!(f, "stack exhausted"),
            VmError::Host(msg) => write!(f, "{}", msg),
            VmError::UnsupportedEncode(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for VmError {}

impl VmError {
    /// Build the `Bounds` message the protocol's golden tests pin exactly:
    /// `"no such opcode: <i>"`.
    pub fn no_such_opcode(i: i64) -> Self {
        VmError::Bounds(format!("no such opcode: {}", i))
    }

    /// Build a `Codec` message for an unreadable leading type tag.
    pub fn cannot_read_type(tag: u8) -> Self {
        VmError::Codec(format!("cannot read type: {}", tag))
    }
}

/// Errors raised while standing up or running the QUIC listener. These are
/// ambient/transport concerns and are never serialized to a client.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("tls configuration error: {0}")]
    Tls(String),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}
