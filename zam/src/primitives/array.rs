//! Array primitives. Arrays of non-float values are plain blocks; float
//! arrays are tag-254 blocks of raw f64 bit words.

use crate::{Context, TAG_DOUBLE_ARRAY, UNIT, Value, VmResult};

pub fn make_vect(ctx: &mut Context, len: Value, init: Value) -> VmResult<Value> {
    let size = len.as_int() as u64;
    if init.is_block() && ctx.heap.is_double(init) {
        let bits = ctx.heap.as_double(init).to_bits();
        let v = ctx.alloc_block(size, TAG_DOUBLE_ARRAY)?;
        for i in 0..size as usize {
            ctx.heap.set_raw_word(v, i, bits);
        }
        Ok(v)
    } else {
        let v = ctx.alloc_block(size, 0)?;
        for i in 0..size as usize {
            ctx.heap.set_field(v, i, init);
        }
        Ok(v)
    }
}

pub fn make_float_vect(ctx: &mut Context, len: Value) -> VmResult<Value> {
    match len.as_int() as u64 {
        0 => Ok(ctx.atom(0)),
        size => ctx.alloc_block(size, TAG_DOUBLE_ARRAY),
    }
}

pub fn get_addr(ctx: &mut Context, array: Value, index: Value) -> VmResult<Value> {
    Ok(ctx.heap.field(array, index.as_int() as usize))
}

pub fn set_addr(
    ctx: &mut Context,
    array: Value,
    index: Value,
    value: Value,
) -> VmResult<Value> {
    ctx.heap.set_field(array, index.as_int() as usize, value);
    Ok(UNIT)
}

pub fn get_float(ctx: &mut Context, array: Value, index: Value) -> VmResult<Value> {
    let bits = ctx.heap.raw_word(array, index.as_int() as usize);
    ctx.alloc_double(f64::from_bits(bits))
}

pub fn set_float(
    ctx: &mut Context,
    array: Value,
    index: Value,
    value: Value,
) -> VmResult<Value> {
    let bits = ctx.heap.as_double(value).to_bits();
    ctx.heap.set_raw_word(array, index.as_int() as usize, bits);
    Ok(UNIT)
}

/// Float-array-aware read, used by both the checked and unchecked forms.
pub fn get(ctx: &mut Context, array: Value, index: Value) -> VmResult<Value> {
    if ctx.heap.is_double_array(array) {
        get_float(ctx, array, index)
    } else {
        get_addr(ctx, array, index)
    }
}

pub fn unsafe_set(
    ctx: &mut Context,
    array: Value,
    index: Value,
    value: Value,
) -> VmResult<Value> {
    if ctx.heap.is_double_array(array) {
        set_float(ctx, array, index, value)
    } else {
        set_addr(ctx, array, index, value)
    }
}

pub fn blit(
    ctx: &mut Context,
    src: Value,
    src_ofs: Value,
    dst: Value,
    dst_ofs: Value,
    len: Value,
) -> VmResult<Value> {
    let (src_ofs, dst_ofs) =
        (src_ofs.as_int() as usize, dst_ofs.as_int() as usize);
    let n = len.as_int() as usize;
    // Staging through a buffer keeps overlapping same-block copies exact.
    let words: Vec<u64> =
        (0..n).map(|i| ctx.heap.raw_word(src, src_ofs + i)).collect();
    for (i, word) in words.into_iter().enumerate() {
        ctx.heap.set_raw_word(dst, dst_ofs + i, word);
    }
    Ok(UNIT)
}
