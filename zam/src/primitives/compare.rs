//! Structural comparison.

use std::cmp::Ordering;

use crate::{
    Context, TAG_DOUBLE, TAG_DOUBLE_ARRAY, TAG_STRING, Value, VmResult,
};

/// Structural ordering: tags first, then size, then fields, with doubles,
/// strings and custom values special-cased. Word equality short-circuits.
// TODO: cycles are not detected; a cyclic pair of unequal graphs recurses
// until the stack gives out.
fn compare_values(ctx: &Context, v1: Value, v2: Value) -> Ordering {
    if v1 == v2 {
        return Ordering::Equal;
    }
    match (v1.is_int(), v2.is_int()) {
        (true, true) => return v1.as_int().cmp(&v2.as_int()),
        (true, false) => return Ordering::Less,
        (false, true) => return Ordering::Greater,
        (false, false) => {}
    }

    let (tag1, tag2) = (ctx.heap.tag(v1), ctx.heap.tag(v2));
    if tag1 != tag2 {
        return tag1.cmp(&tag2);
    }

    match tag1 {
        TAG_STRING => ctx.heap.str_bytes(v1).cmp(ctx.heap.str_bytes(v2)),
        TAG_DOUBLE => {
            let (d1, d2) = (ctx.heap.as_double(v1), ctx.heap.as_double(v2));
            d1.partial_cmp(&d2).unwrap_or(Ordering::Equal)
        }
        TAG_DOUBLE_ARRAY => {
            let (n1, n2) = (ctx.heap.size(v1), ctx.heap.size(v2));
            if n1 != n2 {
                return n1.cmp(&n2);
            }
            for i in 0..n1 as usize {
                let d1 = f64::from_bits(ctx.heap.raw_word(v1, i));
                let d2 = f64::from_bits(ctx.heap.raw_word(v2, i));
                match d1.partial_cmp(&d2).unwrap_or(Ordering::Equal) {
                    Ordering::Equal => {}
                    order => return order,
                }
            }
            Ordering::Equal
        }
        tag if tag == crate::TAG_CUSTOM => {
            let ops = ctx.customs.get(ctx.heap.custom_id(v1));
            match ops.compare {
                Some(compare) => compare(ctx, v1, v2),
                // Without a comparator only identity distinguishes them.
                None => v1.raw().cmp(&v2.raw()),
            }
        }
        _ => {
            let (n1, n2) = (ctx.heap.size(v1), ctx.heap.size(v2));
            if n1 != n2 {
                return n1.cmp(&n2);
            }
            for i in 0..n1 as usize {
                let order = compare_values(
                    ctx,
                    ctx.heap.field(v1, i),
                    ctx.heap.field(v2, i),
                );
                if order != Ordering::Equal {
                    return order;
                }
            }
            Ordering::Equal
        }
    }
}

fn ordering_value(order: Ordering) -> Value {
    Value::int(match order {
        Ordering::Less => -1,
        Ordering::Equal => 0,
        Ordering::Greater => 1,
    })
}

pub fn compare(ctx: &mut Context, v1: Value, v2: Value) -> VmResult<Value> {
    Ok(ordering_value(compare_values(ctx, v1, v2)))
}

pub fn equal(ctx: &mut Context, v1: Value, v2: Value) -> VmResult<Value> {
    Ok(Value::bool(compare_values(ctx, v1, v2) == Ordering::Equal))
}

pub fn greaterequal(
    ctx: &mut Context,
    v1: Value,
    v2: Value,
) -> VmResult<Value> {
    Ok(Value::bool(compare_values(ctx, v1, v2) != Ordering::Less))
}
