//! Object primitives: shallow copies, raw block construction, object ids.

use crate::{Context, Value, VmResult};

pub fn dup(ctx: &mut Context, arg: Value) -> VmResult<Value> {
    let size = ctx.heap.size(arg);
    if size == 0 {
        return Ok(arg);
    }
    // A raw word copy is exact for both field blocks and no-scan payloads.
    let copy = ctx.alloc_block(size, ctx.heap.tag(arg))?;
    for i in 0..size as usize {
        let word = ctx.heap.raw_word(arg, i);
        ctx.heap.set_raw_word(copy, i, word);
    }
    Ok(copy)
}

pub fn block(ctx: &mut Context, tag: Value, size: Value) -> VmResult<Value> {
    match size.as_int() as u64 {
        0 => Ok(ctx.atom(tag.as_int() as u8)),
        size => {
            let v = ctx.alloc_block(size, tag.as_int() as u8)?;
            for i in 0..size as usize {
                ctx.heap.set_field(v, i, Value::int(0));
            }
            Ok(v)
        }
    }
}

pub fn set_oo_id(ctx: &mut Context, obj: Value) -> VmResult<Value> {
    let id = ctx.fresh_oo_id();
    ctx.heap.set_field(obj, 1, Value::int(id));
    Ok(obj)
}

pub fn fresh_oo_id(ctx: &mut Context, _unit: Value) -> VmResult<Value> {
    Ok(Value::int(ctx.fresh_oo_id()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dup_copies_fields_into_a_fresh_block() {
        let mut ctx = Context::new().unwrap();
        let orig = ctx.alloc_block(2, 5).unwrap();
        ctx.heap.set_field(orig, 0, Value::int(10));
        ctx.heap.set_field(orig, 1, Value::int(20));
        let copy = dup(&mut ctx, orig).unwrap();
        assert_ne!(copy, orig, "a copy must be a distinct block");
        assert_eq!(ctx.heap.tag(copy), 5);
        assert_eq!(ctx.heap.field(copy, 0), Value::int(10));
        assert_eq!(ctx.heap.field(copy, 1), Value::int(20));
    }

    #[test]
    fn dup_of_an_empty_block_is_the_block_itself() {
        let mut ctx = Context::new().unwrap();
        let atom = ctx.atom(3);
        assert_eq!(dup(&mut ctx, atom).unwrap(), atom);
    }

    #[test]
    fn dup_preserves_string_payloads() {
        let mut ctx = Context::new().unwrap();
        let s = ctx.alloc_string(b"payload").unwrap();
        let copy = dup(&mut ctx, s).unwrap();
        assert_eq!(ctx.heap.str_bytes(copy), b"payload");
    }

    #[test]
    fn zero_size_blocks_canonicalize_to_atoms() {
        let mut ctx = Context::new().unwrap();
        let v = block(&mut ctx, Value::int(4), Value::int(0)).unwrap();
        assert_eq!(v, ctx.atom(4));
    }

    #[test]
    fn oo_ids_advance_per_object() {
        let mut ctx = Context::new().unwrap();
        let a = fresh_oo_id(&mut ctx, Value::int(0)).unwrap();
        let obj = ctx.alloc_block(2, 0).unwrap();
        set_oo_id(&mut ctx, obj).unwrap();
        assert_eq!(ctx.heap.field(obj, 1), Value::int(a.as_int() + 1));
    }
}
