pub mod codec;
mod context;
mod custom;
mod error;
mod heap;
mod image;
mod interpreter;
mod opcode;
mod primitives;
mod stream;
mod value;

pub use context::Context;
pub use custom::{
    CompareFn, CustomId, CustomOperations, CustomRegistry, DeserializeFn,
    FinalizeFn, HashFn, PrintFn, SerializeFn,
};
pub use error::{VmError, VmResult};
pub use heap::Heap;
pub use image::{Image, SectionKind};
pub use interpreter::{Interpreter, Machine, Stack};
pub use opcode::Op;
pub use primitives::{
    PRIMITIVES, Primitive, PrimitiveTable, find_primitive, register_builtins,
};
pub use stream::StreamReader;
pub use value::{
    FALSE, Header, MAX_BLOCK_WORDS, OFFSET_BITS, TAG_CLOSURE, TAG_CUSTOM,
    TAG_DOUBLE, TAG_DOUBLE_ARRAY, TAG_INFIX, TAG_NO_SCAN, TAG_OBJECT,
    TAG_STRING, TRUE, UNIT, Value,
};
