use thiserror::Error;

/// Every fatal condition in the machine. There is no retry policy: any of
/// these aborts the current run and is reported by the caller.
#[derive(Debug, Error)]
pub enum VmError {
    /// Malformed image container: bad magic, truncated headers, duplicate or
    /// unknown sections, bad offsets.
    #[error("invalid image: {0}")]
    Load(String),

    /// Oversized block request or exhausted heap.
    #[error("allocation failed: {0}")]
    Alloc(String),

    /// Malformed value stream: bad magic or length, unknown item code,
    /// unregistered custom type.
    #[error("cannot decode value: {0}")]
    Decode(String),

    /// Faulting instruction: unknown or unsupported opcode, unresolved
    /// primitive, division by zero, uncaught exception.
    #[error("interpreter fault: {0}")]
    Interp(String),

    /// A contract the bytecode compiler must uphold was broken. Most of
    /// these are debug-checked panics instead; this variant covers the few
    /// that are detected on untrusted input paths.
    #[error("contract violation: {0}")]
    Contract(String),
}

pub type VmResult<T> = Result<T, VmError>;

impl VmError {
    pub fn load(msg: impl Into<String>) -> Self {
        Self::Load(msg.into())
    }

    pub fn alloc(msg: impl Into<String>) -> Self {
        Self::Alloc(msg.into())
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    pub fn interp(msg: impl Into<String>) -> Self {
        Self::Interp(msg.into())
    }
}
