//! # Opcodes
//!
//! The eight opcodes a bytecode program is built from. Each is a single
//! byte on the wire (read the same way as any other SLEB128 operand in
//! this protocol, since opcodes and operands share the `LoadI64` decoder).

/// One instruction in a bytecode program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    /// Push the command registry onto the stack as a `CommandArray`.
    ListCommands,
    /// Pop `i`, pop that command's declared argument count off the stack,
    /// invoke it, push its result.
    Call,
    /// Read one SLEB128 integer from the stream and push it as `I64`.
    LoadI64,
    /// Read one fully-tagged value from the stream and push it.
    LoadAny,
    /// Pop and discard the top of stack.
    Pop,
    /// Duplicate the top of stack.
    Dup,
    /// Pop the top of stack and write it to the sink via the value codec.
    Return,
    /// Reserved for future cross-session routing. Writes
    /// `Error("not implemented")` to the sink and continues; does not
    /// touch the stack and does not terminate the session.
    Forward,
}

impl Opcode {
    /// Decode a raw opcode byte. `None` means "no such opcode" — the caller
    /// decides whether that's silent termination or an `Error` response.
    pub fn from_i64(op: i64) -> Option<Self> {
        match op {
            0 => Some(Opcode::ListCommands),
            1 => Some(Opcode::Call),
            2 => Some(Opcode::LoadI64),
            3 => Some(Opcode::LoadAny),
            4 => Some(Opcode::Pop),
            5 => Some(Opcode::Dup),
            6 => Some(Opcode::Return),
            7 => Some(Opcode::Forward),
            _ => None,
        }
    }
}
