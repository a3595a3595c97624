//! Boxed integer custom types and the integer primitives.

use crate::{
    Context, CustomOperations, StreamReader, Value, VmError, VmResult,
};

pub const INT32_OPS: CustomOperations = CustomOperations {
    deserialize: Some(int32_deserialize),
    ..CustomOperations::named("_i")
};

pub const INT64_OPS: CustomOperations = CustomOperations {
    deserialize: Some(int64_deserialize),
    print: Some(int64_print),
    ..CustomOperations::named("_j")
};

pub const NATIVEINT_OPS: CustomOperations = CustomOperations {
    deserialize: Some(nativeint_deserialize),
    ..CustomOperations::named("_n")
};

fn alloc_boxed(
    ctx: &mut Context,
    identifier: &str,
    payload: i64,
    bytes: usize,
) -> VmResult<Value> {
    let id = ctx.customs.find(identifier).ok_or_else(|| {
        VmError::decode(format!("custom type {identifier:?} not registered"))
    })?;
    let v = ctx.alloc_custom(id, bytes)?;
    ctx.heap.set_raw_word(v, 1, payload.cast_unsigned());
    Ok(v)
}

fn int32_deserialize(
    ctx: &mut Context,
    stream: &mut StreamReader,
) -> VmResult<Value> {
    let n = stream.get_i32be()?;
    alloc_boxed(ctx, "_i", n as i64, 4)
}

fn int64_deserialize(
    ctx: &mut Context,
    stream: &mut StreamReader,
) -> VmResult<Value> {
    let n = stream.get_i64be()?;
    alloc_boxed(ctx, "_j", n, 8)
}

fn int64_print(ctx: &Context, v: Value, out: &mut String) {
    use std::fmt::Write;
    let _ = write!(out, "{}", ctx.heap.raw_word(v, 1).cast_signed());
}

fn nativeint_deserialize(
    ctx: &mut Context,
    stream: &mut StreamReader,
) -> VmResult<Value> {
    match stream.get_u8()? {
        1 => {
            let n = stream.get_i32be()?;
            alloc_boxed(ctx, "_n", n as i64, 4)
        }
        2 => {
            let n = stream.get_i64be()?;
            alloc_boxed(ctx, "_n", n, 8)
        }
        width => Err(VmError::decode(format!(
            "bad native int width marker {width}"
        ))),
    }
}

pub fn int_compare(
    _ctx: &mut Context,
    v1: Value,
    v2: Value,
) -> VmResult<Value> {
    let (a, b) = (v1.as_int(), v2.as_int());
    Ok(Value::int((a > b) as i64 - (a < b) as i64))
}

pub fn int64_float_of_bits(ctx: &mut Context, v: Value) -> VmResult<Value> {
    let bits = ctx.heap.raw_word(v, 1);
    ctx.alloc_double(f64::from_bits(bits))
}

pub fn nativeint_sub(
    _ctx: &mut Context,
    v1: Value,
    v2: Value,
) -> VmResult<Value> {
    Ok(Value::int(v1.as_int().wrapping_sub(v2.as_int())))
}

pub fn nativeint_shift_left(
    _ctx: &mut Context,
    v1: Value,
    v2: Value,
) -> VmResult<Value> {
    Ok(Value::int(v1.as_int().wrapping_shl(v2.as_int() as u32)))
}

/// `printf`-style rendering of one integer, covering the conversions the
/// standard library emits.
pub fn format_int(ctx: &mut Context, fmt: Value, arg: Value) -> VmResult<Value> {
    let spec = String::from_utf8_lossy(ctx.heap.str_bytes(fmt)).into_owned();
    let n = arg.as_int();
    let text = match spec.bytes().last() {
        Some(b'x') => format!("{n:x}"),
        Some(b'X') => format!("{n:X}"),
        Some(b'o') => format!("{n:o}"),
        Some(b'u') => format!("{}", n.cast_unsigned()),
        _ => format!("{n}"),
    };
    ctx.alloc_string(text.as_bytes())
}
