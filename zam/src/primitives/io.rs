//! Channels: custom-boxed file descriptors over the standard streams.

use std::io::Write;

use crate::{
    Context, CustomOperations, UNIT, Value, VmError, VmResult,
};

pub const CHANNEL_OPS: CustomOperations = CustomOperations {
    finalize: Some(channel_finalize),
    ..CustomOperations::named("_chan")
};

fn channel_finalize(_ctx: &mut Context, _chan: Value) {
    // The standard descriptors outlive the run; nothing to release.
}

fn alloc_channel(ctx: &mut Context, fd: i64) -> VmResult<Value> {
    let id = ctx.customs.find("_chan").ok_or_else(|| {
        VmError::interp("channel custom type not registered")
    })?;
    let chan = ctx.alloc_custom(id, 8)?;
    ctx.heap.set_raw_word(chan, 1, fd.cast_unsigned());
    Ok(chan)
}

fn channel_fd(ctx: &Context, chan: Value) -> i64 {
    ctx.heap.raw_word(chan, 1).cast_signed()
}

fn write_bytes(ctx: &Context, chan: Value, bytes: &[u8]) -> VmResult<()> {
    let fd = channel_fd(ctx, chan);
    let result = match fd {
        1 => std::io::stdout().write_all(bytes),
        2 => std::io::stderr().write_all(bytes),
        _ => {
            return Err(VmError::interp(format!(
                "cannot write to descriptor {fd}"
            )));
        }
    };
    result.map_err(|err| VmError::interp(format!("write failed: {err}")))
}

pub fn open_descriptor(ctx: &mut Context, fd: Value) -> VmResult<Value> {
    alloc_channel(ctx, fd.as_int())
}

pub fn output(
    ctx: &mut Context,
    chan: Value,
    buf: Value,
    start: Value,
    length: Value,
) -> VmResult<Value> {
    let (start, length) = (start.as_int() as usize, length.as_int() as usize);
    let bytes = ctx.heap.str_bytes(buf)[start..start + length].to_vec();
    write_bytes(ctx, chan, &bytes)?;
    Ok(UNIT)
}

pub fn output_char(ctx: &mut Context, chan: Value, ch: Value) -> VmResult<Value> {
    write_bytes(ctx, chan, &[ch.as_int() as u8])?;
    Ok(UNIT)
}

pub fn flush(ctx: &mut Context, chan: Value) -> VmResult<Value> {
    let result = match channel_fd(ctx, chan) {
        1 => std::io::stdout().flush(),
        2 => std::io::stderr().flush(),
        _ => Ok(()),
    };
    result.map_err(|err| VmError::interp(format!("flush failed: {err}")))?;
    Ok(UNIT)
}

/// The list of open output channels: one cons cell holding stdout.
pub fn out_channels_list(ctx: &mut Context, _unit: Value) -> VmResult<Value> {
    let chan = alloc_channel(ctx, 1)?;
    let cell = ctx.alloc_block(2, 0)?;
    ctx.heap.set_field(cell, 0, chan);
    ctx.heap.set_field(cell, 1, UNIT);
    Ok(cell)
}

pub fn register_named_value(
    _ctx: &mut Context,
    _name: Value,
    _value: Value,
) -> VmResult<Value> {
    Ok(UNIT)
}
