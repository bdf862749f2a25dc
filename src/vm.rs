//! # Stream-Driven Stack Virtual Machine
//!
//! One [`run_session`] invocation owns exactly one transport stream, one
//! [`ValueStack`], and runs a strictly sequential fetch-decode-execute loop:
//! read an opcode byte, interpret it, repeat until the stream ends.
//!
//! ## Suspension points
//! The only places this loop awaits are: reading the next opcode byte,
//! reading an opcode's inline operand, writing a `Return` value (including
//! its flush), and the duration of a host command call. Everything else —
//! stack manipulation, opcode dispatch — is synchronous.
//!
//! ## Error/termination policy
//! A codec, bounds, stack-exhaustion, or host-command error writes a single
//! `Error` value to the sink and ends the session. `Forward` writes
//! `Error("not implemented")` but does not terminate. An unknown opcode byte
//! is treated as end-of-stream: a graceful halt with no error written. This
//! matches the reference implementation's opcode switch, which has no
//! default case and simply falls out of the loop; see `DESIGN.md` for why
//! this implementation keeps that behavior rather than the spec's
//! alternative of emitting `Error("unknown opcode")`.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::codec;
use crate::context::SessionContext;
use crate::error::VmError;
use crate::opcode::Opcode;
use crate::registry::Registry;
use crate::stack::ValueStack;
use crate::value::Value;

/// Run one session's VM loop to completion.
///
/// Returns `Ok(())` on clean end-of-stream (including a graceful halt on an
/// unknown opcode) or after an `Error` value has been written and the loop
/// terminates per policy. Returns `Err` only for failures in the transport
/// itself (a write failing after an error value was already partially
/// flushed) — those propagate to the session's caller to log and close the
/// stream.
pub async fn run_session<R, W>(
    reader: &mut R,
    writer: &mut W,
    registry: &Registry,
    ctx: &SessionContext,
) -> Result<(), VmError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut stack = ValueStack::new();

    loop {
        let op_byte = match read_opcode_byte(reader).await? {
            Some(b) => b,
            None => return Ok(()),
        };

        let opcode = match Opcode::from_i64(op_byte as i64) {
            Some(op) => op,
            None => return Ok(()),
        };

        match opcode {
            Opcode::ListCommands => {
                stack.push(registry.as_command_array());
            }
            Opcode::LoadI64 => match codec::read_sleb_operand(reader).await {
                Ok(i) => stack.push(Value::I64(i)),
                Err(e) => return terminate(writer, e).await,
            },
            Opcode::LoadAny => match codec::read_value(reader).await {
                Ok(v) => stack.push(v),
                Err(e) => return terminate(writer, e).await,
            },
            Opcode::Pop => match stack.pop() {
                Ok(_) => {}
                Err(e) => return terminate(writer, e).await,
            },
            Opcode::Dup => {
                let top = match stack.peek() {
                    Ok(v) => v.clone(),
                    Err(e) => return terminate(writer, e).await,
                };
                stack.push(top);
            }
            Opcode::Return => {
                let top = match stack.pop() {
                    Ok(v) => v,
                    Err(e) => return terminate(writer, e).await,
                };
                if let Err(e) = write_flush(writer, &top).await {
                    return Err(e);
                }
            }
            Opcode::Call => {
                let index = match codec::read_sleb_operand(reader).await {
                    Ok(i) => i,
                    Err(e) => return terminate(writer, e).await,
                };
                match execute_call(&mut stack, registry, ctx, index) {
                    Ok(()) => {}
                    Err(e) => return terminate(writer, e).await,
                }
            }
            Opcode::Forward => {
                let err = VmError::Host("not implemented".to_string());
                if let Err(io_err) = write_flush(writer, &Value::from_error(&err)).await {
                    return Err(io_err);
                }
            }
        }
    }
}

/// Validate bounds and arity, pop `arglen` arguments in pop order, invoke,
/// push the results. See `Registry::invoke` for the panic boundary.
fn execute_call(
    stack: &mut ValueStack,
    registry: &Registry,
    ctx: &SessionContext,
    index: i64,
) -> Result<(), VmError> {
    let cmd = registry.get(index).ok_or_else(|| VmError::no_such_opcode(index))?;
    let arglen = cmd.arity();
    let args = stack.pop_n(arglen)?;
    let results = registry.invoke(index, ctx, &args)?;
    for result in results {
        stack.push(result);
    }
    Ok(())
}

/// Write `value` as the session's `Error` payload, flush, and end the loop.
async fn terminate<W: AsyncWrite + Unpin>(writer: &mut W, err: VmError) -> Result<(), VmError> {
    write_flush(writer, &Value::from_error(&err)).await
}

async fn write_flush<W: AsyncWrite + Unpin>(writer: &mut W, value: &Value) -> Result<(), VmError> {
    let mut buf = Vec::new();
    codec::write_value(value, &mut buf)?;
    writer
        .write_all(&buf)
        .await
        .map_err(|e| VmError::Codec(format!("write failed: {}", e)))?;
    writer
        .flush()
        .await
        .map_err(|e| VmError::Codec(format!("flush failed: {}", e)))?;
    Ok(())
}

/// Read one opcode byte, treating a clean EOF (zero bytes read) as the end
/// of the session rather than an error.
async fn read_opcode_byte<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<u8>, VmError> {
    let mut buf = [0u8; 1];
    match reader.read(&mut buf).await {
        Ok(0) => Ok(None),
        Ok(_) => Ok(Some(buf[0])),
        Err(e) => Err(VmError::Codec(format!("read failed: {}", e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::demo_registry;

    async fn run_program(program: Vec<u8>) -> Vec<u8> {
        let registry = demo_registry();
        let ctx = SessionContext::new();
        let mut reader = std::io::Cursor::new(program);
        let mut out = Vec::new();
        run_session(&mut reader, &mut out, &registry, &ctx)
            .await
            .unwrap();
        out
    }

    fn loadi64(n: i64) -> Vec<u8> {
        let mut out = vec![2u8]; // LoadI64
        crate::leb128::encode_i64(n, &mut out);
        out
    }

    fn call(i: i64) -> Vec<u8> {
        let mut out = vec![1u8]; // Call
        crate::leb128::encode_i64(i, &mut out);
        out
    }

    fn load_any_string(s: &str) -> Vec<u8> {
        let mut out = vec![3u8]; // LoadAny
        codec::write_value(&Value::Str(s.to_string()), &mut out).unwrap();
        out
    }

    #[tokio::test]
    async fn sub_command_computes_top_minus_second() {
        // LoadI64 50; LoadI64 120; Call 1 (sub); Return -> 120 - 50 = 70
        let mut program = Vec::new();
        program.extend(loadi64(50));
        program.extend(loadi64(120));
        program.extend(call(1));
        program.push(6); // Return

        let out = run_program(program).await;
        let mut cursor = std::io::Cursor::new(out);
        let value = codec::read_value(&mut cursor).await.unwrap();
        assert_eq!(value, Value::I64(70));
    }

    #[tokio::test]
    async fn call_with_bad_index_reports_bounds_error() {
        let mut program = Vec::new();
        program.extend(call(5));

        let out = run_program(program).await;
        let mut cursor = std::io::Cursor::new(out);
        let value = codec::read_value(&mut cursor).await.unwrap();
        assert_eq!(value, Value::Error("no such opcode: 5".to_string()));
    }

    #[tokio::test]
    async fn call_at_exact_registry_length_reports_bounds_error() {
        // The demo registry has 3 commands (indices 0..3); `Call 3` is the
        // exact off-by-one boundary the reference Go implementation gets
        // wrong (see DESIGN.md's Open Question 3) and must still produce a
        // clean bounds error here, not a panic.
        let mut program = Vec::new();
        program.extend(call(3));

        let out = run_program(program).await;
        let mut cursor = std::io::Cursor::new(out);
        let value = codec::read_value(&mut cursor).await.unwrap();
        assert_eq!(value, Value::Error("no such opcode: 3".to_string()));
    }

    #[tokio::test]
    async fn call_with_insufficient_stack_reports_stack_exhausted() {
        let mut program = Vec::new();
        program.extend(loadi64(55));
        program.extend(call(0)); // add needs two args, only one pushed

        let out = run_program(program).await;
        let mut cursor = std::io::Cursor::new(out);
        let value = codec::read_value(&mut cursor).await.unwrap();
        assert_eq!(value, Value::Error("stack exhausted".to_string()));
    }

    #[tokio::test]
    async fn unknown_opcode_halts_gracefully_without_writing_anything() {
        let program = vec![9u8]; // no opcode 9
        let out = run_program(program).await;
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn loadi64_then_return_echoes_the_literal() {
        // LoadI64 222333; Return -> I64 222333
        let mut program = Vec::new();
        program.extend(loadi64(222333));
        program.push(6); // Return

        let out = run_program(program).await;
        let mut cursor = std::io::Cursor::new(out);
        let value = codec::read_value(&mut cursor).await.unwrap();
        assert_eq!(value, Value::I64(222333));
    }

    #[tokio::test]
    async fn dup_lets_one_sum_feed_a_second_call() {
        // LoadI64 -10; LoadI64 120; Call 0 (add); Dup; Call 0 (add); Return -> 220
        let mut program = Vec::new();
        program.extend(loadi64(-10));
        program.extend(loadi64(120));
        program.extend(call(0));
        program.push(5); // Dup
        program.extend(call(0));
        program.push(6); // Return

        let out = run_program(program).await;
        let mut cursor = std::io::Cursor::new(out);
        let value = codec::read_value(&mut cursor).await.unwrap();
        assert_eq!(value, Value::I64(220));
    }

    #[tokio::test]
    async fn concat_command_joins_loaded_strings() {
        // LoadAny String "456"; LoadAny String "123"; Call 2 (concat); Return -> "123456"
        let mut program = Vec::new();
        program.extend(load_any_string("456"));
        program.extend(load_any_string("123"));
        program.extend(call(2));
        program.push(6); // Return

        let out = run_program(program).await;
        let mut cursor = std::io::Cursor::new(out);
        let value = codec::read_value(&mut cursor).await.unwrap();
        assert_eq!(value, Value::Str("123456".to_string()));
    }

    #[tokio::test]
    async fn calling_add_with_strings_reports_a_type_mismatch() {
        // LoadAny String "456"; LoadAny String "123"; Call 0 (add expects I64) -> Error
        let mut program = Vec::new();
        program.extend(load_any_string("456"));
        program.extend(load_any_string("123"));
        program.extend(call(0));

        let out = run_program(program).await;
        let mut cursor = std::io::Cursor::new(out);
        let value = codec::read_value(&mut cursor).await.unwrap();
        match value {
            Value::Error(msg) => assert!(msg.contains("type mismatch"), "got: {msg}"),
            other => panic!("expected Error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn list_commands_pushes_registry_as_command_array() {
        let mut program = vec![0u8]; // ListCommands
        program.push(6); // Return

        let out = run_program(program).await;
        let mut cursor = std::io::Cursor::new(out);
        let value = codec::read_value(&mut cursor).await.unwrap();
        match value {
            Value::CommandArray(cmds) => assert_eq!(cmds.len(), 3),
            other => panic!("expected CommandArray, got {:?}", other),
        }
    }
}
