//! Registry of custom value behavior.
//!
//! A custom block carries an opaque payload; everything the machine can do
//! with it (finalize, compare, hash, serialize, deserialize, print) comes
//! from a named operations record registered before any bytecode runs.
//! Every callback is optional: a missing one means the operation is simply
//! unavailable for that type, never an error by itself.

use crate::{Context, StreamReader, Value, VmResult};
use std::cmp::Ordering;

pub type FinalizeFn = fn(&mut Context, Value);
pub type CompareFn = fn(&Context, Value, Value) -> Ordering;
pub type HashFn = fn(&Context, Value) -> u64;
pub type SerializeFn = fn(&Context, Value, &mut Vec<u8>) -> VmResult<()>;
pub type DeserializeFn = fn(&mut Context, &mut StreamReader) -> VmResult<Value>;
pub type PrintFn = fn(&Context, Value, &mut String);

/// Behavior of one custom value type, keyed by a short identifier such as
/// `"_j"`.
#[derive(Debug, Clone, Copy)]
pub struct CustomOperations {
    pub identifier: &'static str,
    pub finalize: Option<FinalizeFn>,
    pub compare: Option<CompareFn>,
    pub hash: Option<HashFn>,
    pub serialize: Option<SerializeFn>,
    pub deserialize: Option<DeserializeFn>,
    pub print: Option<PrintFn>,
}

impl CustomOperations {
    /// A record with no callbacks at all.
    pub const fn named(identifier: &'static str) -> Self {
        Self {
            identifier,
            finalize: None,
            compare: None,
            hash: None,
            serialize: None,
            deserialize: None,
            print: None,
        }
    }
}

/// Slot of an operations record inside the registry. Stored in field 0 of
/// every custom block.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CustomId(usize);

impl CustomId {
    pub const fn raw(self) -> usize {
        self.0
    }

    pub const fn from_raw(raw: usize) -> Self {
        Self(raw)
    }
}

#[derive(Debug, Default)]
pub struct CustomRegistry {
    records: Vec<CustomOperations>,
}

impl CustomRegistry {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    /// Register a record. Each identifier is registered exactly once, before
    /// any bytecode referencing it executes.
    pub fn register(&mut self, ops: CustomOperations) -> CustomId {
        debug_assert!(
            self.find(ops.identifier).is_none(),
            "custom type {:?} registered twice",
            ops.identifier
        );
        let id = CustomId(self.records.len());
        self.records.push(ops);
        id
    }

    pub fn find(&self, identifier: &str) -> Option<CustomId> {
        self.records
            .iter()
            .position(|r| r.identifier == identifier)
            .map(CustomId)
    }

    pub fn get(&self, id: CustomId) -> &CustomOperations {
        &self.records[id.0]
    }
}
