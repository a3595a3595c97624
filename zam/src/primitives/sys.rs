//! System configuration primitives.

use crate::{FALSE, MAX_BLOCK_WORDS, Value, VmResult};
use crate::Context;

pub fn get_argv(ctx: &mut Context, _unit: Value) -> VmResult<Value> {
    let name = ctx.alloc_string(b"zam")?;
    let args = ctx.atom(0);
    let ret = ctx.alloc_block(2, 0)?;
    ctx.heap.set_field(ret, 0, name);
    ctx.heap.set_field(ret, 1, args);
    Ok(ret)
}

pub fn get_config(ctx: &mut Context, _unit: Value) -> VmResult<Value> {
    let os = ctx.alloc_string(b"Unix")?;
    let ret = ctx.alloc_block(3, 0)?;
    ctx.heap.set_field(ret, 0, os);
    ctx.heap.set_field(ret, 1, Value::int(64));
    ctx.heap.set_field(ret, 2, FALSE);
    Ok(ret)
}

pub fn const_backend_type(_ctx: &mut Context, _unit: Value) -> VmResult<Value> {
    // Bytecode backend.
    Ok(Value::int(1))
}

pub fn const_big_endian(_ctx: &mut Context, _unit: Value) -> VmResult<Value> {
    Ok(Value::bool(cfg!(target_endian = "big")))
}

pub fn const_word_size(_ctx: &mut Context, _unit: Value) -> VmResult<Value> {
    Ok(Value::int(64))
}

pub fn const_int_size(_ctx: &mut Context, _unit: Value) -> VmResult<Value> {
    Ok(Value::int(63))
}

pub fn const_max_wosize(_ctx: &mut Context, _unit: Value) -> VmResult<Value> {
    Ok(Value::int((MAX_BLOCK_WORDS - 1).cast_signed()))
}

pub fn const_ostype_unix(_ctx: &mut Context, _unit: Value) -> VmResult<Value> {
    Ok(Value::bool(cfg!(unix)))
}

pub fn const_ostype_win32(_ctx: &mut Context, _unit: Value) -> VmResult<Value> {
    Ok(Value::bool(cfg!(windows)))
}

pub fn const_ostype_cygwin(
    _ctx: &mut Context,
    _unit: Value,
) -> VmResult<Value> {
    Ok(FALSE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::UNIT;

    #[test]
    fn config_reports_a_64_bit_machine() {
        let mut ctx = Context::new().unwrap();
        let cfg = get_config(&mut ctx, UNIT).unwrap();
        assert_eq!(ctx.heap.str_bytes(ctx.heap.field(cfg, 0)), b"Unix");
        assert_eq!(ctx.heap.field(cfg, 1), Value::int(64));
    }

    #[test]
    fn argv_names_the_runtime() {
        let mut ctx = Context::new().unwrap();
        let argv = get_argv(&mut ctx, UNIT).unwrap();
        assert_eq!(ctx.heap.str_bytes(ctx.heap.field(argv, 0)), b"zam");
        assert_eq!(ctx.heap.field(argv, 1), ctx.atom(0));
    }

    #[test]
    fn int_size_is_one_bit_short_of_the_word() {
        let mut ctx = Context::new().unwrap();
        let ws = const_word_size(&mut ctx, UNIT).unwrap().as_int();
        let is = const_int_size(&mut ctx, UNIT).unwrap().as_int();
        assert_eq!(ws - 1, is);
    }
}
