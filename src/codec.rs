//! # Tagged Binary Value Codec
//!
//! Every [`Value`] written to or read from a session stream is preceded by
//! its one-byte [`Type`] tag. Composite values re-emit the tag of each of
//! their parts, so a `Command` on the wire looks like:
//!
//! ```text
//! Command, I64, <id>, String, <len>, <name bytes>, TypeArray, <n>, <tags...>
//! ```
//!
//! `write` is synchronous and buffer-based (a session always has the whole
//! response value in hand before it starts writing). `read` is async: it
//! pulls bytes directly off the session's QUIC stream one piece at a time,
//! since a client may trickle a program across multiple packets.

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::VmError;
use crate::value::{CommandDescriptor, Type, Value};

/// Serialize `value` onto `out`, tag-prefixed.
pub fn write_value(value: &Value, out: &mut Vec<u8>) -> Result<(), VmError> {
    match value {
        Value::I64(i) => {
            out.push(Type::I64 as u8);
            crate::leb128::encode_i64(*i, out);
        }
        Value::F64(f) => {
            out.push(Type::F64 as u8);
            out.extend_from_slice(&f.to_be_bytes());
        }
        Value::Str(s) => write_string(s, out),
        Value::U8Array(bytes) => {
            out.push(Type::U8Array as u8);
            crate::leb128::encode_i64(bytes.len() as i64, out);
            out.extend_from_slice(bytes);
        }
        Value::TypeArray(types) => write_type_array(types, out)?,
        Value::Command(cmd) => write_command(cmd, out)?,
        Value::CommandArray(cmds) => {
            out.push(Type::CommandArray as u8);
            crate::leb128::encode_i64(cmds.len() as i64, out);
            for cmd in cmds {
                write_command(cmd, out)?;
            }
        }
        Value::Nothing => out.push(Type::Nothing as u8),
        Value::Error(msg) => {
            out.push(Type::Error as u8);
            write_string(msg, out);
        }
    }
    Ok(())
}

/// Write a bare `String` value: tag, SLEB128 byte length, then UTF-8 bytes.
fn write_string(s: &str, out: &mut Vec<u8>) {
    out.push(Type::String as u8);
    let bytes = s.as_bytes();
    crate::leb128::encode_i64(bytes.len() as i64, out);
    out.extend_from_slice(bytes);
}

fn write_type_array(types: &[Type], out: &mut Vec<u8>) -> Result<(), VmError> {
    if types.len() > 255 {
        return Err(VmError::UnsupportedEncode(
            "type array longer than 255 entries".to_string(),
        ));
    }
    out.push(Type::TypeArray as u8);
    out.push(types.len() as u8);
    for t in types {
        out.push(*t as u8);
    }
    Ok(())
}

/// Write a `Command`: its own tag, then `id` via `write(I64)`, `name` via
/// `write(String)`, `argument_types` via `write(TypeArray)` — each re-tagged.
fn write_command(cmd: &CommandDescriptor, out: &mut Vec<u8>) -> Result<(), VmError> {
    out.push(Type::Command as u8);
    out.push(Type::I64 as u8);
    crate::leb128::encode_i64(cmd.id, out);
    write_string(&cmd.name, out);
    write_type_array(&cmd.argument_types, out)?;
    Ok(())
}

/// Deserialize one fully-tagged value from `reader`.
///
/// Reads exactly the bytes the value occupies and no more, so the caller
/// can keep reading subsequent opcodes/values from the same stream.
pub async fn read_value<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Value, VmError> {
    let tag = read_u8(reader).await?;
    let ty = Type::from_u8(tag).ok_or_else(|| VmError::cannot_read_type(tag))?;
    match ty {
        Type::I64 => Ok(Value::I64(read_sleb(reader).await?)),
        Type::F64 => {
            let mut buf = [0u8; 8];
            reader
                .read_exact(&mut buf)
                .await
                .map_err(|e| VmError::Codec(format!("short read on F64: {}", e)))?;
            Ok(Value::F64(f64::from_be_bytes(buf)))
        }
        Type::String => Ok(Value::Str(read_string(reader).await?)),
        Type::U8Array => {
            let len = read_sleb(reader).await?;
            let len = usize::try_from(len)
                .map_err(|_| VmError::Codec("negative u8 array length".to_string()))?;
            let mut buf = vec![0u8; len];
            reader
                .read_exact(&mut buf)
                .await
                .map_err(|e| VmError::Codec(format!("short read on U8Array: {}", e)))?;
            Ok(Value::U8Array(buf))
        }
        Type::TypeArray => Ok(Value::TypeArray(read_type_array(reader).await?)),
        Type::Command => Ok(Value::Command(read_command(reader).await?)),
        Type::CommandArray => {
            let count = read_sleb(reader).await?;
            let count = usize::try_from(count)
                .map_err(|_| VmError::Codec("negative command array count".to_string()))?;
            let mut cmds = Vec::with_capacity(count);
            for _ in 0..count {
                let tag = read_u8(reader).await?;
                if Type::from_u8(tag) != Some(Type::Command) {
                    return Err(VmError::cannot_read_type(tag));
                }
                cmds.push(read_command_body(reader).await?);
            }
            Ok(Value::CommandArray(cmds))
        }
        Type::Nothing => Ok(Value::Nothing),
        Type::Error => Ok(Value::Error(read_string(reader).await?)),
        Type::Object => Err(VmError::Codec(
            "Object has no wire encoding".to_string(),
        )),
    }
}

async fn read_u8<R: AsyncRead + Unpin>(reader: &mut R) -> Result<u8, VmError> {
    let mut buf = [0u8; 1];
    reader
        .read_exact(&mut buf)
        .await
        .map_err(|e| VmError::Codec(format!("unexpected end of stream: {}", e)))?;
    Ok(buf[0])
}

/// Read one SLEB128 operand off the stream — used directly by the VM loop
/// for the `LoadI64` and `Call` opcodes' inline operands, and internally by
/// this module for length-prefixed bodies (`String`, `U8Array`, `Command`
/// id, `CommandArray` count).
pub async fn read_sleb_operand<R: AsyncRead + Unpin>(reader: &mut R) -> Result<i64, VmError> {
    read_sleb(reader).await
}

async fn read_sleb<R: AsyncRead + Unpin>(reader: &mut R) -> Result<i64, VmError> {
    let mut bytes = Vec::new();
    loop {
        let b = read_u8(reader).await?;
        let done = b & 0x80 == 0;
        bytes.push(b);
        if done {
            break;
        }
    }
    let mut iter = bytes.into_iter();
    crate::leb128::decode_i64(|| iter.next())
}

async fn read_string<R: AsyncRead + Unpin>(reader: &mut R) -> Result<String, VmError> {
    let len = read_sleb(reader).await?;
    let len =
        usize::try_from(len).map_err(|_| VmError::Codec("negative string length".to_string()))?;
    let mut buf = vec![0u8; len];
    reader
        .read_exact(&mut buf)
        .await
        .map_err(|e| VmError::Codec(format!("short read on String: {}", e)))?;
    String::from_utf8(buf).map_err(|e| VmError::Codec(format!("invalid utf-8: {}", e)))
}

async fn read_type_array<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<Type>, VmError> {
    let count = read_u8(reader).await?;
    let mut types = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let tag = read_u8(reader).await?;
        types.push(Type::from_u8(tag).ok_or_else(|| VmError::cannot_read_type(tag))?);
    }
    Ok(types)
}

/// Read the `id, name, argument_types` body of a `Command`, assuming the
/// leading `Command` tag has already been consumed.
async fn read_command<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<CommandDescriptor, VmError> {
    read_command_body(reader).await
}

async fn read_command_body<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<CommandDescriptor, VmError> {
    let id_tag = read_u8(reader).await?;
    if Type::from_u8(id_tag) != Some(Type::I64) {
        return Err(VmError::cannot_read_type(id_tag));
    }
    let id = read_sleb(reader).await?;

    let name_tag = read_u8(reader).await?;
    if Type::from_u8(name_tag) != Some(Type::String) {
        return Err(VmError::cannot_read_type(name_tag));
    }
    let name = read_string(reader).await?;

    let types_tag = read_u8(reader).await?;
    if Type::from_u8(types_tag) != Some(Type::TypeArray) {
        return Err(VmError::cannot_read_type(types_tag));
    }
    let argument_types = read_type_array(reader).await?;

    Ok(CommandDescriptor {
        id,
        name,
        argument_types,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn i64_roundtrips_as_a_single_leb128_byte() {
        let mut buf = Vec::new();
        write_value(&Value::I64(42), &mut buf).unwrap();
        assert_eq!(buf, vec![Type::I64 as u8, 42]);

        let mut cursor = std::io::Cursor::new(buf);
        let value = read_value(&mut cursor).await.unwrap();
        assert_eq!(value, Value::I64(42));
    }

    #[tokio::test]
    async fn f64_roundtrips_bit_for_bit() {
        for f in [0.0f64, -0.0, 1.5, -123456.789, f64::NAN, f64::INFINITY] {
            let mut buf = Vec::new();
            write_value(&Value::F64(f), &mut buf).unwrap();
            let mut cursor = std::io::Cursor::new(buf);
            let value = read_value(&mut cursor).await.unwrap();
            match value {
                Value::F64(got) => assert_eq!(got.to_bits(), f.to_bits()),
                other => panic!("expected F64, got {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn u8_array_roundtrips() {
        let mut buf = Vec::new();
        write_value(&Value::U8Array(vec![1, 2, 3, 255]), &mut buf).unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        let value = read_value(&mut cursor).await.unwrap();
        assert_eq!(value, Value::U8Array(vec![1, 2, 3, 255]));
    }

    #[tokio::test]
    async fn command_golden_bytes() {
        let cmd = CommandDescriptor {
            id: 0,
            name: "+".to_string(),
            argument_types: vec![Type::I64, Type::I64],
        };
        let mut buf = Vec::new();
        write_value(&Value::Command(cmd.clone()), &mut buf).unwrap();
        assert_eq!(
            buf,
            vec![
                Type::Command as u8,
                Type::I64 as u8,
                0,
                Type::String as u8,
                1,
                b'+',
                Type::TypeArray as u8,
                2,
                Type::I64 as u8,
                Type::I64 as u8,
            ]
        );

        let mut cursor = std::io::Cursor::new(buf);
        let value = read_value(&mut cursor).await.unwrap();
        assert_eq!(value, Value::Command(cmd));
    }

    #[tokio::test]
    async fn string_roundtrips() {
        let mut buf = Vec::new();
        write_value(&Value::Str("123456".to_string()), &mut buf).unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        let value = read_value(&mut cursor).await.unwrap();
        assert_eq!(value, Value::Str("123456".to_string()));
    }

    #[tokio::test]
    async fn unknown_tag_is_a_codec_error() {
        let mut cursor = std::io::Cursor::new(vec![50u8]);
        let err = read_value(&mut cursor).await.unwrap_err();
        assert_eq!(err, VmError::cannot_read_type(50));
    }

    #[tokio::test]
    async fn truncated_stream_is_a_codec_error() {
        let mut cursor = std::io::Cursor::new(vec![Type::String as u8, 5, b'h', b'i']);
        let err = read_value(&mut cursor).await.unwrap_err();
        match err {
            VmError::Codec(_) => {}
            other => panic!("expected Codec error, got {:?}", other),
        }
    }
}
