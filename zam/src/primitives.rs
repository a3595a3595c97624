//! Foreign bridge: natively implemented operations the bytecode reaches
//! through the `CCALL` family.
//!
//! A primitive is an arity-tagged function variant; the image's primitive
//! name table is resolved against [`PRIMITIVES`] once at link time, and a
//! call through an unresolved slot (or with the wrong arity) faults instead
//! of crashing.

use log::warn;

use crate::{Context, CustomRegistry, Value, VmError, VmResult};

mod array;
mod compare;
mod float;
mod gc;
mod ints;
mod io;
mod obj;
mod string;
mod sys;

pub type Prim1 = fn(&mut Context, Value) -> VmResult<Value>;
pub type Prim2 = fn(&mut Context, Value, Value) -> VmResult<Value>;
pub type Prim3 = fn(&mut Context, Value, Value, Value) -> VmResult<Value>;
pub type Prim4 =
    fn(&mut Context, Value, Value, Value, Value) -> VmResult<Value>;
pub type Prim5 =
    fn(&mut Context, Value, Value, Value, Value, Value) -> VmResult<Value>;

#[derive(Debug, Copy, Clone)]
pub enum Primitive {
    Unary(Prim1),
    Binary(Prim2),
    Ternary(Prim3),
    Quaternary(Prim4),
    Quinary(Prim5),
}

impl Primitive {
    pub fn arity(self) -> usize {
        match self {
            Primitive::Unary(_) => 1,
            Primitive::Binary(_) => 2,
            Primitive::Ternary(_) => 3,
            Primitive::Quaternary(_) => 4,
            Primitive::Quinary(_) => 5,
        }
    }
}

/// Every primitive this runtime implements, keyed by the external name
/// bytecode images link against.
pub const PRIMITIVES: &[(&str, Primitive)] = &[
    ("caml_array_blit", Primitive::Quinary(array::blit)),
    ("caml_array_get", Primitive::Binary(array::get)),
    ("caml_array_get_addr", Primitive::Binary(array::get_addr)),
    ("caml_array_get_float", Primitive::Binary(array::get_float)),
    ("caml_array_set_addr", Primitive::Ternary(array::set_addr)),
    ("caml_array_set_float", Primitive::Ternary(array::set_float)),
    ("caml_array_unsafe_get", Primitive::Binary(array::get)),
    ("caml_array_unsafe_set", Primitive::Ternary(array::unsafe_set)),
    ("caml_compare", Primitive::Binary(compare::compare)),
    ("caml_eq_float", Primitive::Binary(float::eq_float)),
    ("caml_equal", Primitive::Binary(compare::equal)),
    ("caml_format_float", Primitive::Binary(float::format_float)),
    ("caml_format_int", Primitive::Binary(ints::format_int)),
    ("caml_fresh_oo_id", Primitive::Unary(obj::fresh_oo_id)),
    ("caml_gc_full_major", Primitive::Unary(gc::full_major)),
    ("caml_get_minor_free", Primitive::Unary(gc::get_minor_free)),
    ("caml_greaterequal", Primitive::Binary(compare::greaterequal)),
    ("caml_int64_float_of_bits", Primitive::Unary(ints::int64_float_of_bits)),
    ("caml_int_compare", Primitive::Binary(ints::int_compare)),
    ("caml_make_float_vect", Primitive::Unary(array::make_float_vect)),
    ("caml_make_vect", Primitive::Binary(array::make_vect)),
    ("caml_ml_flush", Primitive::Unary(io::flush)),
    ("caml_ml_open_descriptor_in", Primitive::Unary(io::open_descriptor)),
    ("caml_ml_open_descriptor_out", Primitive::Unary(io::open_descriptor)),
    ("caml_ml_out_channels_list", Primitive::Unary(io::out_channels_list)),
    ("caml_ml_output", Primitive::Quaternary(io::output)),
    ("caml_ml_output_char", Primitive::Binary(io::output_char)),
    ("caml_ml_string_length", Primitive::Unary(string::length)),
    ("caml_nativeint_shift_left", Primitive::Binary(ints::nativeint_shift_left)),
    ("caml_nativeint_sub", Primitive::Binary(ints::nativeint_sub)),
    ("caml_obj_block", Primitive::Binary(obj::block)),
    ("caml_obj_dup", Primitive::Unary(obj::dup)),
    ("caml_register_named_value", Primitive::Binary(io::register_named_value)),
    ("caml_set_oo_id", Primitive::Unary(obj::set_oo_id)),
    ("caml_sys_const_backend_type", Primitive::Unary(sys::const_backend_type)),
    ("caml_sys_const_big_endian", Primitive::Unary(sys::const_big_endian)),
    ("caml_sys_const_int_size", Primitive::Unary(sys::const_int_size)),
    ("caml_sys_const_max_wosize", Primitive::Unary(sys::const_max_wosize)),
    ("caml_sys_const_ostype_cygwin", Primitive::Unary(sys::const_ostype_cygwin)),
    ("caml_sys_const_ostype_unix", Primitive::Unary(sys::const_ostype_unix)),
    ("caml_sys_const_ostype_win32", Primitive::Unary(sys::const_ostype_win32)),
    ("caml_sys_const_word_size", Primitive::Unary(sys::const_word_size)),
    ("caml_sys_get_argv", Primitive::Unary(sys::get_argv)),
    ("caml_sys_get_config", Primitive::Unary(sys::get_config)),
];

pub fn find_primitive(name: &str) -> Option<Primitive> {
    PRIMITIVES
        .iter()
        .find(|(key, _)| *key == name)
        .map(|(_, prim)| *prim)
}

/// Register the custom value types the primitive library relies on.
pub fn register_builtins(registry: &mut CustomRegistry) {
    registry.register(ints::INT32_OPS);
    registry.register(ints::INT64_OPS);
    registry.register(ints::NATIVEINT_OPS);
    registry.register(io::CHANNEL_OPS);
}

/// Per-image table of resolved primitives, indexed by the slots the `CCALL`
/// instructions name.
#[derive(Debug, Default)]
pub struct PrimitiveTable {
    slots: Vec<(String, Option<Primitive>)>,
}

impl PrimitiveTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Resolve the image's name table in order. Unresolved names stay in
    /// the table and only fault when called.
    pub fn resolve(names: &[String]) -> Self {
        let slots = names
            .iter()
            .map(|name| {
                let prim = find_primitive(name);
                if prim.is_none() {
                    warn!("unresolved primitive {name}");
                }
                (name.clone(), prim)
            })
            .collect();
        Self { slots }
    }

    pub fn get(&self, slot: usize) -> VmResult<(&str, Primitive)> {
        match self.slots.get(slot) {
            Some((name, Some(prim))) => Ok((name, *prim)),
            Some((name, None)) => Err(VmError::interp(format!(
                "call to unresolved primitive {name}"
            ))),
            None => Err(VmError::interp(format!(
                "primitive slot {slot} out of range"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_sorted_and_duplicate_free() {
        for pair in PRIMITIVES.windows(2) {
            assert!(
                pair[0].0 < pair[1].0,
                "{} must sort before {}",
                pair[0].0,
                pair[1].0
            );
        }
    }

    #[test]
    fn resolve_keeps_slot_order_and_tolerates_unknowns() {
        let names = vec![
            "caml_compare".to_owned(),
            "caml_no_such_thing".to_owned(),
            "caml_ml_flush".to_owned(),
        ];
        let table = PrimitiveTable::resolve(&names);
        assert_eq!(table.get(0).unwrap().0, "caml_compare");
        assert_eq!(table.get(2).unwrap().0, "caml_ml_flush");
        assert!(matches!(table.get(1), Err(VmError::Interp(_))));
        assert!(matches!(table.get(3), Err(VmError::Interp(_))));
    }

    #[test]
    fn arities_match_the_call_forms() {
        assert_eq!(find_primitive("caml_ml_flush").unwrap().arity(), 1);
        assert_eq!(find_primitive("caml_compare").unwrap().arity(), 2);
        assert_eq!(find_primitive("caml_array_set_addr").unwrap().arity(), 3);
        assert_eq!(find_primitive("caml_ml_output").unwrap().arity(), 4);
        assert_eq!(find_primitive("caml_array_blit").unwrap().arity(), 5);
    }
}
