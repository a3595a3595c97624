//! Value codec: reads the self-describing, sharing-aware binary encoding of
//! a value graph into heap values, and renders values as readable trees.
//!
//! Every item is prefixed by a one-byte code. Small codes select fixed-width
//! integers, back-references, blocks, strings, doubles and custom values;
//! codes at 0x20 and above are compact single-byte encodings for tiny
//! strings, integers and blocks. Each materialized object is appended to an
//! object table in creation order so back-references can address it by
//! distance, which is what makes shared and cyclic graphs decode correctly.

use std::fmt::Write;

use crate::{
    Context, StreamReader, TAG_CLOSURE, TAG_CUSTOM, TAG_DOUBLE,
    TAG_DOUBLE_ARRAY, TAG_STRING, Value, VmError, VmResult,
};

/// Magic marker opening every serialized value graph.
const VALUE_MAGIC: u32 = 0x8495_A6BE;

/// Bytes of header following the magic: length, object count and the two
/// machine-size fields.
const HEADER_BYTES: usize = 20;

/// Deserialize one value graph from `stream`.
pub fn read_value(
    ctx: &mut Context,
    stream: &mut StreamReader,
) -> VmResult<Value> {
    let magic = stream.get_u32be()?;
    if magic != VALUE_MAGIC {
        return Err(VmError::decode(format!(
            "bad value magic {magic:#010x}"
        )));
    }
    let length = stream.get_u32be()? as usize;
    if length + HEADER_BYTES != stream.len() {
        return Err(VmError::decode(format!(
            "declared length {length} does not match stream length {}",
            stream.len()
        )));
    }
    let _obj_count = stream.get_u32be()?;
    let _size32 = stream.get_u32be()?;
    let _size64 = stream.get_u32be()?;

    let mut table = Vec::new();
    read_item(ctx, stream, &mut table)
}

fn read_item(
    ctx: &mut Context,
    stream: &mut StreamReader,
    table: &mut Vec<Value>,
) -> VmResult<Value> {
    match stream.get_u8()? {
        0x00 => Ok(Value::int(stream.get_i8()? as i64)),
        0x01 => Ok(Value::int(stream.get_i16be()? as i64)),
        0x02 => Ok(Value::int(stream.get_i32be()? as i64)),
        0x03 => Ok(Value::int(stream.get_i64be()?)),
        // Back-references, by distance into the object table.
        0x04 => {
            let d = stream.get_u8()? as usize;
            shared(table, d)
        }
        0x05 => {
            let d = stream.get_u16be()? as usize;
            shared(table, d)
        }
        0x06 => {
            let d = stream.get_u32be()? as usize;
            shared(table, d)
        }
        // Double arrays, 32-bit length.
        0x07 => {
            let length = stream.get_u32be()? as u64;
            read_double_array(ctx, stream, table, length, false)
        }
        // Blocks with a 32-bit header.
        0x08 => {
            let header = stream.get_u32be()? as u64;
            read_block(ctx, stream, table, header >> 10, (header & 0xFF) as u8)
        }
        0x09 => {
            let length = stream.get_u8()? as usize;
            read_string(ctx, stream, table, length)
        }
        0x0A => {
            let length = stream.get_u32be()? as usize;
            read_string(ctx, stream, table, length)
        }
        0x0B | 0x0C => {
            let v = ctx.alloc_double(stream.get_f64(true)?)?;
            table.push(v);
            Ok(v)
        }
        // Double arrays, 8-bit length.
        0x0D | 0x0E => {
            let length = stream.get_u8()? as u64;
            read_double_array(ctx, stream, table, length, true)
        }
        0x0F => {
            let length = stream.get_u32be()? as u64;
            read_double_array(ctx, stream, table, length, true)
        }
        0x10 | 0x11 => {
            Err(VmError::decode("code pointers are not supported"))
        }
        0x12 => {
            let name = stream.get_cstring()?;
            let id = ctx.customs.find(&name).ok_or_else(|| {
                VmError::decode(format!("unregistered custom type {name:?}"))
            })?;
            let deserialize =
                ctx.customs.get(id).deserialize.ok_or_else(|| {
                    VmError::decode(format!(
                        "custom type {name:?} has no deserializer"
                    ))
                })?;
            let v = deserialize(ctx, stream)?;
            table.push(v);
            Ok(v)
        }
        // Blocks with a 64-bit header.
        0x13 => {
            let header = stream.get_u64be()?;
            read_block(ctx, stream, table, header >> 10, (header & 0xFF) as u8)
        }
        // Tiny strings.
        code @ 0x20..=0x3F => {
            read_string(ctx, stream, table, (code & 0x1F) as usize)
        }
        // Tiny non-negative integers.
        code @ 0x40..=0x7F => Ok(Value::int((code & 0x3F) as i64)),
        // Tiny blocks.
        code @ 0x80..=0xFF => {
            let size = ((code >> 4) & 0x7) as u64;
            let tag = code & 0xF;
            read_block(ctx, stream, table, size, tag)
        }
        code => Err(VmError::decode(format!(
            "unknown value code {code:#04x}"
        ))),
    }
}

fn shared(table: &[Value], distance: usize) -> VmResult<Value> {
    if distance == 0 || distance > table.len() {
        return Err(VmError::decode(format!(
            "back-reference {distance} outside the object table"
        )));
    }
    Ok(table[table.len() - distance])
}

fn read_block(
    ctx: &mut Context,
    stream: &mut StreamReader,
    table: &mut Vec<Value>,
    size: u64,
    tag: u8,
) -> VmResult<Value> {
    if size == 0 {
        // Nullary constructors share the canonical atom and are not entered
        // into the object table.
        return Ok(ctx.atom(tag));
    }
    let v = ctx.alloc_block(size, tag)?;
    // Registered before the fields are read so cycles can refer back to it.
    table.push(v);
    for i in 0..size as usize {
        let field = read_item(ctx, stream, table)?;
        ctx.heap.set_field(v, i, field);
    }
    Ok(v)
}

fn read_string(
    ctx: &mut Context,
    stream: &mut StreamReader,
    table: &mut Vec<Value>,
    length: usize,
) -> VmResult<Value> {
    let data = stream.take(length)?;
    let v = ctx.alloc_string(data)?;
    table.push(v);
    Ok(v)
}

fn read_double_array(
    ctx: &mut Context,
    stream: &mut StreamReader,
    table: &mut Vec<Value>,
    length: u64,
    big_endian: bool,
) -> VmResult<Value> {
    let v = ctx.alloc_block(length, TAG_DOUBLE_ARRAY)?;
    table.push(v);
    for i in 0..length as usize {
        let d = stream.get_f64(big_endian)?;
        ctx.heap.set_raw_word(v, i, d.to_bits());
    }
    Ok(v)
}

/// Render a value as an indented tree.
pub fn render_value(ctx: &Context, value: Value) -> String {
    let mut out = String::new();
    render(ctx, value, &mut out, 0);
    out
}

fn render(ctx: &Context, value: Value, out: &mut String, indent: usize) {
    for _ in 0..indent {
        out.push_str("  ");
    }
    if value.is_int() {
        let _ = write!(out, "{}", value.as_int());
        return;
    }
    match ctx.heap.tag(value) {
        TAG_DOUBLE => {
            let _ = write!(out, "{}", ctx.heap.as_double(value));
        }
        TAG_STRING => {
            out.push('"');
            for &byte in ctx.heap.str_bytes(value) {
                if byte.is_ascii_graphic() || byte == b' ' {
                    out.push(byte as char);
                } else {
                    out.push('.');
                }
            }
            out.push('"');
        }
        TAG_CLOSURE => {
            let _ = write!(out, "<fun:{}>", ctx.heap.field(value, 0).as_int());
        }
        TAG_CUSTOM => {
            let ops = ctx.customs.get(ctx.heap.custom_id(value));
            match ops.print {
                Some(print) => print(ctx, value, out),
                None => {
                    let _ = write!(out, "<custom:{}>", ops.identifier);
                }
            }
        }
        TAG_DOUBLE_ARRAY => {
            let _ = write!(out, "({}) {{\n", TAG_DOUBLE_ARRAY);
            for i in 0..ctx.heap.size(value) as usize {
                for _ in 0..indent + 1 {
                    out.push_str("  ");
                }
                let d = f64::from_bits(ctx.heap.raw_word(value, i));
                let _ = writeln!(out, "{d}");
            }
            for _ in 0..indent {
                out.push_str("  ");
            }
            out.push('}');
        }
        tag => {
            let _ = write!(out, "({tag}) {{\n");
            for i in 0..ctx.heap.size(value) as usize {
                render(ctx, ctx.heap.field(value, i), out, indent + 1);
                out.push('\n');
            }
            for _ in 0..indent {
                out.push_str("  ");
            }
            out.push('}');
        }
    }
}
