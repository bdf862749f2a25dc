//! # Value Representation for the Wire VM
//!
//! This module defines the wire [`Type`] tag space and the [`Value`] enum
//! that carries data across a session: on the VM operand stack, through the
//! command registry, and on the byte stream itself.
//!
//! ## Wire tags
//! Every value on the wire is preceded by a single [`Type`] byte. The
//! numeric order below is load-bearing: it is read and written as a raw
//! `u8`, and clients decode against these exact discriminants.
//!
//! | tag | name            |
//! |-----|-----------------|
//! | 0   | `I64`           |
//! | 1   | `F64`           |
//! | 2   | `String`        |
//! | 3   | `U8Array`       |
//! | 4   | `TypeArray`     |
//! | 5   | `Object`        |
//! | 6   | `Command`       |
//! | 7   | `CommandArray`  |
//! | 8   | `Nothing`       |
//! | 9   | `Error`         |
//!
//! `Object` has no constructible [`Value`] variant: it is reserved wire
//! space, not a type this implementation ever produces or accepts.

use crate::error::VmError;

/// A wire type tag, encoded as a single byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Type {
    I64 = 0,
    F64 = 1,
    String = 2,
    U8Array = 3,
    TypeArray = 4,
    Object = 5,
    Command = 6,
    CommandArray = 7,
    Nothing = 8,
    Error = 9,
}

impl Type {
    /// Decode a raw wire byte into a [`Type`], or `None` if it names no tag.
    pub fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Type::I64),
            1 => Some(Type::F64),
            2 => Some(Type::String),
            3 => Some(Type::U8Array),
            4 => Some(Type::TypeArray),
            5 => Some(Type::Object),
            6 => Some(Type::Command),
            7 => Some(Type::CommandArray),
            8 => Some(Type::Nothing),
            9 => Some(Type::Error),
            _ => None,
        }
    }
}

/// Describes one entry in a session's command registry: its name and the
/// argument types it declares. This is what `ListCommands` returns as a
/// `CommandArray` and what `Call` validates a `Command` value against.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandDescriptor {
    pub id: i64,
    pub name: String,
    pub argument_types: Vec<Type>,
}

/// Universal value type exchanged between client and server.
///
/// Every variant has exactly one wire [`Type`] tag (see [`Value::wire_type`]),
/// with the exception of `Object`, which has no `Value` counterpart.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    I64(i64),
    F64(f64),
    Str(String),
    U8Array(Vec<u8>),
    TypeArray(Vec<Type>),
    Command(CommandDescriptor),
    CommandArray(Vec<CommandDescriptor>),
    Nothing,
    Error(String),
}

impl Value {
    /// The wire tag this value is encoded with.
    pub fn wire_type(&self) -> Type {
        match self {
            Value::I64(_) => Type::I64,
            Value::F64(_) => Type::F64,
            Value::Str(_) => Type::String,
            Value::U8Array(_) => Type::U8Array,
            Value::TypeArray(_) => Type::TypeArray,
            Value::Command(_) => Type::Command,
            Value::CommandArray(_) => Type::CommandArray,
            Value::Nothing => Type::Nothing,
            Value::Error(_) => Type::Error,
        }
    }

    /// Coerce this value to an `i64`. Host commands that declare an `I64`
    /// argument type call this on their popped arguments; a mismatch here is
    /// how "type conformance is the command body's responsibility" (the
    /// invoker never re-checks it) actually gets surfaced as an error.
    pub fn as_i64(&self) -> Result<i64, VmError> {
        match self {
            Value::I64(i) => Ok(*i),
            other => Err(VmError::Host(format!(
                "type mismatch: expected I64, found {:?}",
                other.wire_type()
            ))),
        }
    }

    /// Coerce this value to a `&str`, used by host commands that declare a
    /// `String` argument type.
    pub fn as_str(&self) -> Result<&str, VmError> {
        match self {
            Value::Str(s) => Ok(s.as_str()),
            other => Err(VmError::Host(format!(
                "type mismatch: expected String, found {:?}",
                other.wire_type()
            ))),
        }
    }

    /// Wrap a [`VmError`] as the `Error` value a session sends back to the
    /// client when bytecode execution fails.
    pub fn from_error(err: &VmError) -> Self {
        Value::Error(err.to_string())
    }
}
