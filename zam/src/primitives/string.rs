//! String primitives.

use crate::{Context, Value, VmResult};

pub fn length(ctx: &mut Context, s: Value) -> VmResult<Value> {
    Ok(Value::int(ctx.heap.str_len(s) as i64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_excludes_the_padding() {
        let mut ctx = Context::new().unwrap();
        for len in [0usize, 1, 7, 8, 9, 31] {
            let s = ctx.heap.alloc_bytes(len).unwrap();
            let n = length(&mut ctx, s).unwrap();
            assert_eq!(n, Value::int(len as i64));
        }
    }
}
