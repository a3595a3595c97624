//! Bytecode opcodes.
//!
//! One opcode per instruction word; operands, where present, follow as
//! whole words. Branch offsets are signed word counts relative to the word
//! holding the offset operand.

/// Opcodes, in instruction-word order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Op {
    /// Load stack slot 0..7 into the accumulator.
    Acc0 = 0,
    Acc1,
    Acc2,
    Acc3,
    Acc4,
    Acc5,
    Acc6,
    Acc7,
    /// Load a stack slot into the accumulator. Operands: `n:u32`
    Acc,
    /// Push the accumulator.
    Push,
    /// Push, then load stack slot 0..7 (slot seen after the push).
    PushAcc0,
    PushAcc1,
    PushAcc2,
    PushAcc3,
    PushAcc4,
    PushAcc5,
    PushAcc6,
    PushAcc7,
    /// Push, then load a stack slot. Operands: `n:u32`
    PushAcc,
    /// Discard stack slots. Operands: `n:u32`
    Pop,
    /// Store the accumulator into a stack slot, accumulator becomes unit.
    /// Operands: `n:u32`
    Assign,
    /// Load environment field 1..4 into the accumulator.
    EnvAcc1,
    EnvAcc2,
    EnvAcc3,
    EnvAcc4,
    /// Load an environment field. Operands: `n:u32`
    EnvAcc,
    /// Push, then load environment field 1..4.
    PushEnvAcc1,
    PushEnvAcc2,
    PushEnvAcc3,
    PushEnvAcc4,
    /// Push, then load an environment field. Operands: `n:u32`
    PushEnvAcc,
    /// Push a return frame (extra args, environment, return address).
    /// Operands: `ofs:i32`
    PushRetAddr,
    /// Call the closure in the accumulator. Operands: `nargs:u32`
    Apply,
    /// Call with 1/2/3 arguments already on the stack; pushes the return
    /// frame beneath them.
    Apply1,
    Apply2,
    Apply3,
    /// Tail call: slide the top `n` words over the current frame.
    /// Operands: `n:u32`, `framesize:u32`
    AppTerm,
    /// Tail call with 1/2/3 arguments. Operands: `framesize:u32`
    AppTerm1,
    AppTerm2,
    AppTerm3,
    /// Return, popping the frame. Operands: `n:u32`
    Return,
    /// Unpack a partial-application closure back onto the stack.
    Restart,
    /// Arity check: package a partial application if too few arguments.
    /// Operands: `required:u32`
    Grab,
    /// Build a closure. Operands: `nvars:u32`, `ofs:i32`
    Closure,
    /// Build a mutually recursive closure group.
    /// Operands: `nfuncs:u32`, `nvars:u32`, then `nfuncs` offsets.
    ClosureRec,
    /// Displace the environment pointer by -2/0/+2 words.
    OffsetClosureM2,
    OffsetClosure0,
    OffsetClosure2,
    /// Displace the environment pointer. Operands: `n:i32`
    OffsetClosure,
    /// Push, then displace the environment pointer.
    PushOffsetClosureM2,
    PushOffsetClosure0,
    PushOffsetClosure2,
    /// Operands: `n:i32`
    PushOffsetClosure,
    /// Load a global. Operands: `n:u32`
    GetGlobal,
    /// Operands: `n:u32`
    PushGetGlobal,
    /// Load a field of a global. Operands: `n:u32`, `field:u32`
    GetGlobalField,
    /// Operands: `n:u32`, `field:u32`
    PushGetGlobalField,
    /// Store the accumulator into a global, accumulator becomes unit.
    /// Operands: `n:u32`
    SetGlobal,
    /// Load the canonical empty block of tag 0.
    Atom0,
    /// Load the canonical empty block for a tag. Operands: `tag:u32`
    Atom,
    PushAtom0,
    /// Operands: `tag:u32`
    PushAtom,
    /// Allocate a block; field 0 is the accumulator, the rest are popped.
    /// Operands: `size:u32`, `tag:u32`
    MakeBlock,
    /// Operands: `tag:u32`
    MakeBlock1,
    MakeBlock2,
    MakeBlock3,
    /// Operands: `size:u32`
    MakeFloatBlock,
    /// Load field 0..3 of the block in the accumulator.
    GetField0,
    GetField1,
    GetField2,
    GetField3,
    /// Operands: `n:u32`
    GetField,
    /// Operands: `n:u32`
    GetFloatField,
    /// Store the popped value into field 0..3, accumulator becomes unit.
    SetField0,
    SetField1,
    SetField2,
    SetField3,
    /// Operands: `n:u32`
    SetField,
    /// Operands: `n:u32`
    SetFloatField,
    /// Size of the block in the accumulator.
    VectLength,
    GetVectItem,
    SetVectItem,
    GetStringChar,
    SetStringChar,
    /// Unconditional branch. Operands: `ofs:i32`
    Branch,
    /// Branch if the accumulator is not false. Operands: `ofs:i32`
    BranchIf,
    /// Branch if the accumulator is false. Operands: `ofs:i32`
    BranchIfNot,
    /// Jump table. Operands: `sizes:u32`, then the table.
    Switch,
    BoolNot,
    /// Install an exception handler. Operands: `ofs:i32`
    PushTrap,
    /// Remove the innermost handler on normal exit.
    PopTrap,
    /// Raise the exception in the accumulator.
    Raise,
    CheckSignals,
    /// Call primitive with 1..5 arguments. Operands: `prim:u32`
    CCall1,
    CCall2,
    CCall3,
    CCall4,
    CCall5,
    /// Operands: `nargs:u32`, `prim:u32`
    CCallN,
    /// Load the constant 0..3.
    Const0,
    Const1,
    Const2,
    Const3,
    /// Load a constant. Operands: `n:i32`
    ConstInt,
    PushConst0,
    PushConst1,
    PushConst2,
    PushConst3,
    /// Operands: `n:i32`
    PushConstInt,
    NegInt,
    AddInt,
    SubInt,
    MulInt,
    DivInt,
    ModInt,
    AndInt,
    OrInt,
    XorInt,
    LslInt,
    LsrInt,
    AsrInt,
    Eq,
    Neq,
    LtInt,
    LeInt,
    GtInt,
    GeInt,
    /// Add a constant to the accumulator. Operands: `ofs:i32`
    OffsetInt,
    /// Add a constant to field 0 of the accumulator. Operands: `ofs:i32`
    OffsetRef,
    IsInt,
    GetMethod,
    /// Fused compare-and-branch against a constant.
    /// Operands: `v:i32`, `ofs:i32`
    Beq,
    Bneq,
    BltInt,
    BleInt,
    BgtInt,
    BgeInt,
    UltInt,
    UgeInt,
    BultInt,
    BugeInt,
    GetPubMet,
    GetDynMet,
    /// Terminate, yielding the accumulator.
    Stop,
    Event,
    Break,
}

impl Op {
    pub const COUNT: usize = Op::Break as usize + 1;
}

impl TryFrom<u32> for Op {
    type Error = u32;

    fn try_from(word: u32) -> Result<Self, u32> {
        if word < Self::COUNT as u32 {
            // SAFETY: Op is repr(u8) with contiguous variants starting at 0.
            Ok(unsafe { core::mem::transmute::<u8, Op>(word as u8) })
        } else {
            Err(word)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discriminants_match_the_instruction_set() {
        assert_eq!(Op::Acc0 as u32, 0);
        assert_eq!(Op::Acc as u32, 8);
        assert_eq!(Op::Pop as u32, 19);
        assert_eq!(Op::Apply as u32, 32);
        assert_eq!(Op::Return as u32, 40);
        assert_eq!(Op::Closure as u32, 43);
        assert_eq!(Op::GetGlobal as u32, 53);
        assert_eq!(Op::MakeBlock as u32, 62);
        assert_eq!(Op::Branch as u32, 84);
        assert_eq!(Op::PushTrap as u32, 89);
        assert_eq!(Op::CCall1 as u32, 93);
        assert_eq!(Op::ConstInt as u32, 103);
        assert_eq!(Op::AddInt as u32, 110);
        assert_eq!(Op::Beq as u32, 131);
        assert_eq!(Op::Stop as u32, 143);
        assert_eq!(Op::Break as u32, 145);
    }

    #[test]
    fn words_outside_the_set_are_rejected() {
        assert_eq!(Op::try_from(42), Ok(Op::Grab));
        assert_eq!(Op::try_from(146), Err(146));
        assert_eq!(Op::try_from(u32::MAX), Err(u32::MAX));
    }
}
