//! Float primitives.

use crate::{Context, Value, VmResult};

pub fn eq_float(ctx: &mut Context, lhs: Value, rhs: Value) -> VmResult<Value> {
    Ok(Value::bool(
        ctx.heap.as_double(lhs) == ctx.heap.as_double(rhs),
    ))
}

/// `printf`-style rendering of one double; honors an explicit precision,
/// everything else falls back to the shortest form.
pub fn format_float(
    ctx: &mut Context,
    fmt: Value,
    arg: Value,
) -> VmResult<Value> {
    let spec = String::from_utf8_lossy(ctx.heap.str_bytes(fmt)).into_owned();
    let x = ctx.heap.as_double(arg);
    let precision = spec
        .split_once('.')
        .and_then(|(_, rest)| {
            let digits: String =
                rest.chars().take_while(char::is_ascii_digit).collect();
            digits.parse::<usize>().ok()
        });
    let text = match precision {
        Some(p) => format!("{x:.p$}"),
        None => format!("{x}"),
    };
    ctx.alloc_string(text.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FALSE, TRUE};

    #[test]
    fn float_equality_compares_payloads() {
        let mut ctx = Context::new().unwrap();
        let a = ctx.alloc_double(1.5).unwrap();
        let b = ctx.alloc_double(1.5).unwrap();
        let c = ctx.alloc_double(2.0).unwrap();
        assert_eq!(eq_float(&mut ctx, a, b).unwrap(), TRUE);
        assert_eq!(eq_float(&mut ctx, a, c).unwrap(), FALSE);
    }

    #[test]
    fn format_float_honors_precision() {
        let mut ctx = Context::new().unwrap();
        let fmt = ctx.alloc_string(b"%.2f").unwrap();
        let arg = ctx.alloc_double(3.14159).unwrap();
        let s = format_float(&mut ctx, fmt, arg).unwrap();
        assert_eq!(ctx.heap.str_bytes(s), b"3.14");
    }
}
