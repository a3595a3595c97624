//! Context: process-wide owner of the heap, the atom table and the custom
//! operations registry. One context drives one image at a time; nothing
//! here is shared across threads.

use log::debug;

use crate::{
    CustomId, CustomRegistry, Heap, Image, Interpreter, PrimitiveTable,
    SectionKind, StreamReader, Value, VmResult, codec,
};

pub struct Context {
    pub heap: Heap,
    pub customs: CustomRegistry,
    /// One canonical zero-size block per tag, shared by every nullary
    /// constructor of that tag.
    atoms: Vec<Value>,
    /// Monotonic object-id counter backing the object primitives.
    oo_id: i64,
}

impl Context {
    pub fn new() -> VmResult<Self> {
        let mut heap = Heap::new();
        let mut atoms = Vec::with_capacity(256);
        for tag in 0..=255u8 {
            atoms.push(heap.alloc_block(0, tag)?);
        }
        let mut customs = CustomRegistry::new();
        crate::primitives::register_builtins(&mut customs);
        Ok(Self {
            heap,
            customs,
            atoms,
            oo_id: 0,
        })
    }

    /// The canonical zero-size block for `tag`. Never mutated, never freed.
    pub fn atom(&self, tag: u8) -> Value {
        self.atoms[tag as usize]
    }

    pub fn alloc_block(&mut self, size: u64, tag: u8) -> VmResult<Value> {
        self.heap.alloc_block(size, tag)
    }

    pub fn alloc_double(&mut self, v: f64) -> VmResult<Value> {
        self.heap.alloc_double(v)
    }

    pub fn alloc_string(&mut self, data: &[u8]) -> VmResult<Value> {
        self.heap.alloc_string(data)
    }

    pub fn alloc_custom(
        &mut self,
        ops: CustomId,
        payload_bytes: usize,
    ) -> VmResult<Value> {
        self.heap.alloc_custom(ops, payload_bytes)
    }

    pub fn fresh_oo_id(&mut self) -> i64 {
        let id = self.oo_id;
        self.oo_id += 1;
        id
    }

    /// Run an image to completion: decode the global data, reslice the code,
    /// link the primitives and drive the interpreter.
    pub fn run(&mut self, image: &Image) -> VmResult<Value> {
        let data = image.section(SectionKind::Data)?;
        let mut stream = StreamReader::new(data);
        let global = codec::read_value(self, &mut stream)?;

        let code = image.code_words()?;
        let names = image.strings(SectionKind::Prim)?;
        debug!(
            "linked image: {} code words, {} primitives",
            code.len(),
            names.len()
        );
        let prims = PrimitiveTable::resolve(&names);

        let mut interp = Interpreter::new(self, &code, global, prims);
        interp.run()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atoms_are_canonical_per_tag() {
        let ctx = Context::new().unwrap();
        for tag in [0u8, 1, 42, 255] {
            assert_eq!(
                ctx.atom(tag),
                ctx.atom(tag),
                "two atom loads for tag {tag} must be pointer-equal"
            );
        }
        assert_ne!(ctx.atom(0), ctx.atom(1));
    }

    #[test]
    fn atoms_are_empty_blocks_with_their_tag() {
        let ctx = Context::new().unwrap();
        let v = ctx.atom(7);
        assert_eq!(ctx.heap.size(v), 0);
        assert_eq!(ctx.heap.tag(v), 7);
    }

    #[test]
    fn object_ids_are_fresh() {
        let mut ctx = Context::new().unwrap();
        let a = ctx.fresh_oo_id();
        let b = ctx.fresh_oo_id();
        assert_eq!(b, a + 1);
    }

    #[test]
    fn builtin_custom_types_are_registered() {
        let ctx = Context::new().unwrap();
        for name in ["_i", "_j", "_n", "_chan"] {
            assert!(
                ctx.customs.find(name).is_some(),
                "builtin custom type {name} missing"
            );
        }
    }
}
