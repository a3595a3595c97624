//! Heap: a grow-only arena of blocks.
//!
//! A block is a header (size in words, 8-bit tag) plus `size` raw 64-bit
//! words. Field words hold [`Value`] bits; string, double and custom blocks
//! reinterpret the same words as byte or f64 payloads. Blocks are never
//! moved or freed individually; the whole arena is dropped at the end of a
//! run, so block indices stay valid for the lifetime of the heap.

use crate::{
    CustomId, Header, MAX_BLOCK_WORDS, TAG_CLOSURE, TAG_CUSTOM, TAG_DOUBLE,
    TAG_DOUBLE_ARRAY, TAG_STRING, UNIT, Value, VmError, VmResult,
};

#[derive(Debug)]
struct Block {
    header: Header,
    words: Box<[u64]>,
}

#[derive(Debug, Default)]
pub struct Heap {
    blocks: Vec<Block>,
}

impl Heap {
    pub fn new() -> Self {
        Self { blocks: Vec::new() }
    }

    /// Allocate a block of `size` fields, every field set to the unit value.
    pub fn alloc_block(&mut self, size: u64, tag: u8) -> VmResult<Value> {
        if size >= MAX_BLOCK_WORDS {
            return Err(VmError::alloc(format!(
                "block of {size} words exceeds the maximum block size"
            )));
        }
        let words = vec![UNIT.raw(); size as usize].into_boxed_slice();
        let index = self.blocks.len();
        self.blocks.push(Block {
            header: Header::new(size, tag),
            words,
        });
        Ok(Value::block(index))
    }

    /// Allocate a boxed double.
    pub fn alloc_double(&mut self, v: f64) -> VmResult<Value> {
        let b = self.alloc_block(1, TAG_DOUBLE)?;
        self.set_raw_word(b, 0, v.to_bits());
        Ok(b)
    }

    /// Allocate a zero-filled byte block of `length` payload bytes.
    ///
    /// The payload is padded to a whole number of words and the last byte of
    /// the last word records the pad count, so that
    /// `length = size * 8 - last_byte - 1`:
    ///
    /// ```text
    /// length = 4, block bytes = 8, pad = 3
    /// 0   1   2   3   4   5   6   7
    /// 'a' 'b' 'c' 'd' \0  \0  \0  \3
    /// ```
    pub fn alloc_bytes(&mut self, length: usize) -> VmResult<Value> {
        let size = (length as u64 + 8) / 8;
        let b = self.alloc_block(size, TAG_STRING)?;
        let bytes = self.bytes_mut(b);
        bytes.fill(0);
        let blk = bytes.len();
        bytes[blk - 1] = (blk - length - 1) as u8;
        Ok(b)
    }

    /// Allocate a byte block holding a copy of `data`.
    pub fn alloc_string(&mut self, data: &[u8]) -> VmResult<Value> {
        let b = self.alloc_bytes(data.len())?;
        self.bytes_mut(b)[..data.len()].copy_from_slice(data);
        Ok(b)
    }

    /// Allocate a custom block: field 0 names the operations record, the
    /// remaining words hold an opaque payload of at least `payload_bytes`.
    pub fn alloc_custom(
        &mut self,
        ops: CustomId,
        payload_bytes: usize,
    ) -> VmResult<Value> {
        let words = 1 + (payload_bytes as u64).div_ceil(8);
        let b = self.alloc_block(words, TAG_CUSTOM)?;
        self.set_field(b, 0, Value::int(ops.raw() as i64));
        Ok(b)
    }

    fn block(&self, v: Value) -> &Block {
        debug_assert!(v.is_block(), "expected a block reference");
        &self.blocks[v.index()]
    }

    pub fn tag(&self, v: Value) -> u8 {
        self.block(v).header.tag()
    }

    /// Size in fields, seen from this reference. For an ordinary reference
    /// this is the block size; a displaced reference sees the tail.
    pub fn size(&self, v: Value) -> u64 {
        self.block(v).header.size() - v.offset() as u64
    }

    pub fn field(&self, v: Value, n: usize) -> Value {
        let block = self.block(v);
        debug_assert!(
            v.offset() + n < block.words.len(),
            "field {n} out of range"
        );
        Value::from_raw(block.words[v.offset() + n])
    }

    pub fn set_field(&mut self, v: Value, n: usize, value: Value) {
        debug_assert!(v.is_block(), "expected a block reference");
        let block = &mut self.blocks[v.index()];
        debug_assert!(
            v.offset() + n < block.words.len(),
            "field {n} out of range"
        );
        block.words[v.offset() + n] = value.raw();
    }

    /// Raw word access, for double-array elements and custom payloads.
    pub fn raw_word(&self, v: Value, n: usize) -> u64 {
        self.block(v).words[v.offset() + n]
    }

    pub fn set_raw_word(&mut self, v: Value, n: usize, word: u64) {
        debug_assert!(v.is_block(), "expected a block reference");
        self.blocks[v.index()].words[v.offset() + n] = word;
    }

    pub fn as_double(&self, v: Value) -> f64 {
        debug_assert_eq!(self.tag(v), TAG_DOUBLE, "expected a boxed double");
        f64::from_bits(self.raw_word(v, 0))
    }

    /// Byte view of a block's words.
    pub fn bytes(&self, v: Value) -> &[u8] {
        let block = self.block(v);
        let len = block.words.len() * 8;
        // SAFETY: words are plain owned memory; a byte view is always valid.
        unsafe {
            std::slice::from_raw_parts(block.words.as_ptr().cast::<u8>(), len)
        }
    }

    pub fn bytes_mut(&mut self, v: Value) -> &mut [u8] {
        debug_assert!(v.is_block(), "expected a block reference");
        let block = &mut self.blocks[v.index()];
        let len = block.words.len() * 8;
        // SAFETY: words are plain owned memory; a byte view is always valid.
        unsafe {
            std::slice::from_raw_parts_mut(
                block.words.as_mut_ptr().cast::<u8>(),
                len,
            )
        }
    }

    /// Length of a byte block's payload, excluding the padding.
    pub fn str_len(&self, v: Value) -> usize {
        let bytes = self.bytes(v);
        bytes.len() - bytes[bytes.len() - 1] as usize - 1
    }

    /// Payload of a byte block, excluding the padding.
    pub fn str_bytes(&self, v: Value) -> &[u8] {
        &self.bytes(v)[..self.str_len(v)]
    }

    pub fn is_double(&self, v: Value) -> bool {
        v.is_block() && self.tag(v) == TAG_DOUBLE
    }

    pub fn is_string(&self, v: Value) -> bool {
        v.is_block() && self.tag(v) == TAG_STRING
    }

    pub fn is_closure(&self, v: Value) -> bool {
        v.is_block() && self.tag(v) == TAG_CLOSURE
    }

    pub fn is_custom(&self, v: Value) -> bool {
        v.is_block() && self.tag(v) == TAG_CUSTOM
    }

    pub fn is_double_array(&self, v: Value) -> bool {
        v.is_block() && self.tag(v) == TAG_DOUBLE_ARRAY
    }

    /// Operations-record slot of a custom block.
    pub fn custom_id(&self, v: Value) -> CustomId {
        debug_assert_eq!(self.tag(v), TAG_CUSTOM, "expected a custom block");
        CustomId::from_raw(self.field(v, 0).as_int() as usize)
    }
}
