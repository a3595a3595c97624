//! The dispatch loop.
//!
//! One interpreter executes one instruction stream against a borrowed
//! context, synchronously, until the terminal opcode yields the accumulator
//! or a fault aborts the run. All machine registers live in an explicit
//! [`Machine`] struct mutated in place by every handler.

use log::trace;

use crate::{
    Context, FALSE, Header, Op, Primitive, PrimitiveTable, TAG_CLOSURE,
    TAG_INFIX, UNIT, Value, VmError, VmResult, codec,
};

/// The operand stack: grow-only, addressed from the top.
#[derive(Debug, Default)]
pub struct Stack {
    values: Vec<Value>,
}

impl Stack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current stack depth.
    pub fn sp(&self) -> usize {
        self.values.len()
    }

    pub fn push(&mut self, value: Value) {
        self.values.push(value);
    }

    pub fn pop(&mut self) -> Value {
        self.values.pop().expect("operand stack underflow")
    }

    pub fn pop_n(&mut self, n: usize) {
        debug_assert!(n <= self.values.len(), "operand stack underflow");
        self.values.truncate(self.values.len() - n);
    }

    /// Slot `n` counted from the top; 0 is the top of the stack.
    pub fn nth(&self, n: usize) -> Value {
        self.values[self.values.len() - 1 - n]
    }

    pub fn set_nth(&mut self, n: usize, value: Value) {
        let idx = self.values.len() - 1 - n;
        self.values[idx] = value;
    }

    /// Cut the stack back to an absolute depth.
    pub fn truncate(&mut self, sp: usize) {
        debug_assert!(sp <= self.values.len(), "truncating upwards");
        self.values.truncate(sp);
    }
}

/// The machine registers, one set per run.
#[derive(Debug)]
pub struct Machine {
    /// The implicit working register.
    pub acc: Value,
    pub stack: Stack,
    /// Word index into the instruction stream.
    pub pc: usize,
    /// The currently executing closure, for free-variable access.
    pub env: Value,
    /// Pending curried arguments beyond the callee's known arity.
    pub extra_args: u64,
    /// Stack depth of the innermost exception handler; 0 means none.
    pub trap_sp: usize,
}

impl Machine {
    fn new() -> Self {
        Self {
            acc: UNIT,
            stack: Stack::new(),
            pc: 0,
            env: UNIT,
            extra_args: 0,
            trap_sp: 0,
        }
    }
}

pub struct Interpreter<'a> {
    ctx: &'a mut Context,
    code: &'a [u32],
    global: Value,
    prims: PrimitiveTable,
    m: Machine,
}

impl<'a> Interpreter<'a> {
    pub fn new(
        ctx: &'a mut Context,
        code: &'a [u32],
        global: Value,
        prims: PrimitiveTable,
    ) -> Self {
        Self {
            ctx,
            code,
            global,
            prims,
            m: Machine::new(),
        }
    }

    /// Execute until the terminal opcode, yielding the accumulator.
    pub fn run(&mut self) -> VmResult<Value> {
        loop {
            let at = self.m.pc;
            let word = self.fetch()?;
            let op = Op::try_from(word).map_err(|w| {
                VmError::interp(format!("unknown opcode {w} at {at}"))
            })?;
            trace!(
                "pc={at} op={op:?} sp={} extra={}",
                self.m.stack.sp(),
                self.m.extra_args
            );
            match op {
                Op::Acc0 => self.acc_n(0),
                Op::Acc1 => self.acc_n(1),
                Op::Acc2 => self.acc_n(2),
                Op::Acc3 => self.acc_n(3),
                Op::Acc4 => self.acc_n(4),
                Op::Acc5 => self.acc_n(5),
                Op::Acc6 => self.acc_n(6),
                Op::Acc7 => self.acc_n(7),
                Op::Acc => {
                    let n = self.fetch()? as usize;
                    self.acc_n(n);
                }
                Op::Push | Op::PushAcc0 => self.push_acc(),
                Op::PushAcc1 => self.push_acc_n(1),
                Op::PushAcc2 => self.push_acc_n(2),
                Op::PushAcc3 => self.push_acc_n(3),
                Op::PushAcc4 => self.push_acc_n(4),
                Op::PushAcc5 => self.push_acc_n(5),
                Op::PushAcc6 => self.push_acc_n(6),
                Op::PushAcc7 => self.push_acc_n(7),
                Op::PushAcc => {
                    let n = self.fetch()? as usize;
                    self.push_acc_n(n);
                }
                Op::Pop => {
                    let n = self.fetch()? as usize;
                    self.m.stack.pop_n(n);
                }
                Op::Assign => {
                    let n = self.fetch()? as usize;
                    self.m.stack.set_nth(n, self.m.acc);
                    self.m.acc = UNIT;
                }

                Op::EnvAcc1 => self.env_acc(1),
                Op::EnvAcc2 => self.env_acc(2),
                Op::EnvAcc3 => self.env_acc(3),
                Op::EnvAcc4 => self.env_acc(4),
                Op::EnvAcc => {
                    let n = self.fetch()? as usize;
                    self.env_acc(n);
                }
                Op::PushEnvAcc1 => {
                    self.push_acc();
                    self.env_acc(1);
                }
                Op::PushEnvAcc2 => {
                    self.push_acc();
                    self.env_acc(2);
                }
                Op::PushEnvAcc3 => {
                    self.push_acc();
                    self.env_acc(3);
                }
                Op::PushEnvAcc4 => {
                    self.push_acc();
                    self.env_acc(4);
                }
                Op::PushEnvAcc => {
                    let n = self.fetch()? as usize;
                    self.push_acc();
                    self.env_acc(n);
                }

                Op::PushRetAddr => {
                    let ofs = self.fetch_signed()?;
                    let ret = self.resolve(ofs);
                    self.m.stack.push(Value::int(self.m.extra_args as i64));
                    self.m.stack.push(self.m.env);
                    self.m.stack.push(Value::int(ret as i64));
                }
                Op::Apply => {
                    let nargs = self.fetch()? as u64;
                    self.enter();
                    self.m.extra_args = nargs - 1;
                }
                Op::Apply1 => self.apply_short(1)?,
                Op::Apply2 => self.apply_short(2)?,
                Op::Apply3 => self.apply_short(3)?,
                Op::AppTerm => self.app_term()?,
                Op::AppTerm1 => self.app_term_short(1)?,
                Op::AppTerm2 => self.app_term_short(2)?,
                Op::AppTerm3 => self.app_term_short(3)?,
                Op::Return => self.return_frame()?,
                Op::Restart => self.restart(),
                Op::Grab => self.grab()?,
                Op::Closure => self.closure()?,
                Op::ClosureRec => self.closure_rec()?,

                Op::OffsetClosureM2 => self.offset_closure(-2),
                Op::OffsetClosure0 => self.offset_closure(0),
                Op::OffsetClosure2 => self.offset_closure(2),
                Op::OffsetClosure => {
                    let n = self.fetch_signed()?;
                    self.offset_closure(n as i64);
                }
                Op::PushOffsetClosureM2 => {
                    self.push_acc();
                    self.offset_closure(-2);
                }
                Op::PushOffsetClosure0 => {
                    self.push_acc();
                    self.offset_closure(0);
                }
                Op::PushOffsetClosure2 => {
                    self.push_acc();
                    self.offset_closure(2);
                }
                Op::PushOffsetClosure => {
                    let n = self.fetch_signed()?;
                    self.push_acc();
                    self.offset_closure(n as i64);
                }

                Op::GetGlobal => {
                    let n = self.fetch()? as usize;
                    self.m.acc = self.ctx.heap.field(self.global, n);
                }
                Op::PushGetGlobal => {
                    let n = self.fetch()? as usize;
                    self.push_acc();
                    self.m.acc = self.ctx.heap.field(self.global, n);
                }
                Op::GetGlobalField => {
                    let n = self.fetch()? as usize;
                    let p = self.fetch()? as usize;
                    let outer = self.ctx.heap.field(self.global, n);
                    self.m.acc = self.ctx.heap.field(outer, p);
                }
                Op::PushGetGlobalField => {
                    let n = self.fetch()? as usize;
                    let p = self.fetch()? as usize;
                    self.push_acc();
                    let outer = self.ctx.heap.field(self.global, n);
                    self.m.acc = self.ctx.heap.field(outer, p);
                }
                Op::SetGlobal => {
                    let n = self.fetch()? as usize;
                    self.ctx.heap.set_field(self.global, n, self.m.acc);
                    self.m.acc = UNIT;
                }

                Op::Atom0 => self.m.acc = self.ctx.atom(0),
                Op::Atom => {
                    let tag = self.fetch()?;
                    debug_assert!(tag <= 255, "atom tag out of range");
                    self.m.acc = self.ctx.atom(tag as u8);
                }
                Op::PushAtom0 => {
                    self.push_acc();
                    self.m.acc = self.ctx.atom(0);
                }
                Op::PushAtom => {
                    let tag = self.fetch()?;
                    debug_assert!(tag <= 255, "atom tag out of range");
                    self.push_acc();
                    self.m.acc = self.ctx.atom(tag as u8);
                }

                Op::MakeBlock => {
                    let size = self.fetch()? as u64;
                    let tag = self.fetch()?;
                    self.make_block(size, tag as u8)?;
                }
                Op::MakeBlock1 => {
                    let tag = self.fetch()?;
                    self.make_block(1, tag as u8)?;
                }
                Op::MakeBlock2 => {
                    let tag = self.fetch()?;
                    self.make_block(2, tag as u8)?;
                }
                Op::MakeBlock3 => {
                    let tag = self.fetch()?;
                    self.make_block(3, tag as u8)?;
                }

                Op::GetField0 => self.get_field(0),
                Op::GetField1 => self.get_field(1),
                Op::GetField2 => self.get_field(2),
                Op::GetField3 => self.get_field(3),
                Op::GetField => {
                    let n = self.fetch()? as usize;
                    self.get_field(n);
                }
                Op::SetField0 => self.set_field(0),
                Op::SetField1 => self.set_field(1),
                Op::SetField2 => self.set_field(2),
                Op::SetField3 => self.set_field(3),
                Op::SetField => {
                    let n = self.fetch()? as usize;
                    self.set_field(n);
                }
                Op::VectLength => {
                    let size = self.ctx.heap.size(self.m.acc);
                    self.m.acc = Value::int(size as i64);
                }

                Op::Branch => {
                    let ofs = self.fetch_signed()?;
                    self.m.pc = self.resolve(ofs);
                }
                Op::BranchIf => {
                    let ofs = self.fetch_signed()?;
                    if self.m.acc != FALSE {
                        self.m.pc = self.resolve(ofs);
                    }
                }
                Op::BranchIfNot => {
                    let ofs = self.fetch_signed()?;
                    if self.m.acc == FALSE {
                        self.m.pc = self.resolve(ofs);
                    }
                }

                Op::BoolNot => self.m.acc = Value::bool(self.m.acc == FALSE),

                Op::PushTrap => {
                    let ofs = self.fetch_signed()?;
                    let handler = self.resolve(ofs);
                    self.m.stack.push(Value::int(self.m.extra_args as i64));
                    self.m.stack.push(self.m.env);
                    self.m.stack.push(Value::int(self.m.trap_sp as i64));
                    self.m.stack.push(Value::int(handler as i64));
                    self.m.trap_sp = self.m.stack.sp();
                }
                Op::PopTrap => {
                    self.m.trap_sp = self.m.stack.nth(1).as_int() as usize;
                    self.m.stack.pop_n(4);
                }
                Op::Raise => self.raise()?,

                Op::CheckSignals => {}

                Op::CCall1 => self.ccall(1)?,
                Op::CCall2 => self.ccall(2)?,
                Op::CCall3 => self.ccall(3)?,
                Op::CCall4 => self.ccall(4)?,
                Op::CCall5 => self.ccall(5)?,
                Op::CCallN => {
                    let nargs = self.fetch()? as usize;
                    self.ccall(nargs)?;
                }

                Op::Const0 => self.m.acc = Value::int(0),
                Op::Const1 => self.m.acc = Value::int(1),
                Op::Const2 => self.m.acc = Value::int(2),
                Op::Const3 => self.m.acc = Value::int(3),
                Op::ConstInt => {
                    let n = self.fetch_signed()?;
                    self.m.acc = Value::int(n as i64);
                }
                Op::PushConst0 => {
                    self.push_acc();
                    self.m.acc = Value::int(0);
                }
                Op::PushConst1 => {
                    self.push_acc();
                    self.m.acc = Value::int(1);
                }
                Op::PushConst2 => {
                    self.push_acc();
                    self.m.acc = Value::int(2);
                }
                Op::PushConst3 => {
                    self.push_acc();
                    self.m.acc = Value::int(3);
                }
                Op::PushConstInt => {
                    let n = self.fetch_signed()?;
                    self.push_acc();
                    self.m.acc = Value::int(n as i64);
                }

                Op::NegInt => {
                    self.m.acc = Value::int(self.m.acc.as_int().wrapping_neg());
                }
                Op::AddInt => self.int_binop(i64::wrapping_add),
                Op::SubInt => self.int_binop(i64::wrapping_sub),
                Op::MulInt => self.int_binop(i64::wrapping_mul),
                Op::DivInt => self.int_div(false)?,
                Op::ModInt => self.int_div(true)?,
                Op::AndInt => self.int_binop(|a, b| a & b),
                Op::OrInt => self.int_binop(|a, b| a | b),
                Op::XorInt => self.int_binop(|a, b| a ^ b),
                Op::LslInt => {
                    self.int_binop(|a, b| a.wrapping_shl(b as u32));
                }
                Op::LsrInt => self.int_binop(|a, b| {
                    // Logical shift of the 63-bit payload.
                    ((a.cast_unsigned() & (u64::MAX >> 1)) >> (b as u32))
                        .cast_signed()
                }),
                Op::AsrInt => {
                    self.int_binop(|a, b| a.wrapping_shr(b as u32));
                }

                Op::Eq => {
                    let b = self.m.stack.pop();
                    self.m.acc = Value::bool(self.m.acc == b);
                }
                Op::Neq => {
                    let b = self.m.stack.pop();
                    self.m.acc = Value::bool(self.m.acc != b);
                }
                Op::LtInt => self.cmp_binop(|a, b| a < b),
                Op::LeInt => self.cmp_binop(|a, b| a <= b),
                Op::GtInt => self.cmp_binop(|a, b| a > b),
                Op::GeInt => self.cmp_binop(|a, b| a >= b),
                Op::UltInt => self.cmp_binop(|a, b| {
                    a.cast_unsigned() < b.cast_unsigned()
                }),
                Op::UgeInt => self.cmp_binop(|a, b| {
                    a.cast_unsigned() >= b.cast_unsigned()
                }),

                Op::OffsetInt => {
                    let ofs = self.fetch_signed()?;
                    self.m.acc = Value::int(
                        self.m.acc.as_int().wrapping_add(ofs as i64),
                    );
                }
                Op::OffsetRef => {
                    let ofs = self.fetch_signed()?;
                    let old = self.ctx.heap.field(self.m.acc, 0).as_int();
                    self.ctx.heap.set_field(
                        self.m.acc,
                        0,
                        Value::int(old.wrapping_add(ofs as i64)),
                    );
                    self.m.acc = UNIT;
                }
                Op::IsInt => self.m.acc = Value::bool(self.m.acc.is_int()),

                Op::Beq => self.branch_cmp(|v, a| v == a)?,
                Op::Bneq => self.branch_cmp(|v, a| v != a)?,
                Op::BltInt => self.branch_cmp(|v, a| v < a)?,
                Op::BleInt => self.branch_cmp(|v, a| v <= a)?,
                Op::BgtInt => self.branch_cmp(|v, a| v > a)?,
                Op::BgeInt => self.branch_cmp(|v, a| v >= a)?,
                Op::BultInt => self.branch_cmp(|v, a| {
                    (v as u64) < a.cast_unsigned()
                })?,
                Op::BugeInt => self.branch_cmp(|v, a| {
                    (v as u64) >= a.cast_unsigned()
                })?,

                Op::Stop => return Ok(self.m.acc),

                Op::Switch
                | Op::MakeFloatBlock
                | Op::GetFloatField
                | Op::SetFloatField
                | Op::GetVectItem
                | Op::SetVectItem
                | Op::GetStringChar
                | Op::SetStringChar
                | Op::GetMethod
                | Op::GetPubMet
                | Op::GetDynMet
                | Op::Event
                | Op::Break => {
                    return Err(VmError::interp(format!(
                        "unsupported opcode {op:?} at {at}"
                    )));
                }
            }
        }
    }

    /// Read the instruction word at the program counter and advance.
    fn fetch(&mut self) -> VmResult<u32> {
        let word = self.code.get(self.m.pc).copied().ok_or_else(|| {
            VmError::interp(format!(
                "program counter {} outside the code",
                self.m.pc
            ))
        })?;
        self.m.pc += 1;
        Ok(word)
    }

    fn fetch_signed(&mut self) -> VmResult<i32> {
        Ok(self.fetch()? as i32)
    }

    /// Resolve a branch offset. Offsets are relative to the word holding
    /// them, which the program counter has just moved past.
    fn resolve(&self, ofs: i32) -> usize {
        (self.m.pc as i64 - 1 + ofs as i64) as usize
    }

    /// Entry program counter of the closure in `v`.
    fn code_pointer(&self, v: Value) -> usize {
        self.ctx.heap.field(v, 0).as_int() as usize
    }

    /// Transfer control to the closure in the accumulator.
    fn enter(&mut self) {
        self.m.pc = self.code_pointer(self.m.acc);
        self.m.env = self.m.acc;
    }

    fn push_acc(&mut self) {
        self.m.stack.push(self.m.acc);
    }

    fn acc_n(&mut self, n: usize) {
        self.m.acc = self.m.stack.nth(n);
    }

    fn push_acc_n(&mut self, n: usize) {
        self.push_acc();
        self.acc_n(n);
    }

    fn env_acc(&mut self, n: usize) {
        self.m.acc = self.ctx.heap.field(self.m.env, n);
    }

    fn get_field(&mut self, n: usize) {
        self.m.acc = self.ctx.heap.field(self.m.acc, n);
    }

    fn set_field(&mut self, n: usize) {
        let value = self.m.stack.pop();
        self.ctx.heap.set_field(self.m.acc, n, value);
        self.m.acc = UNIT;
    }

    fn int_binop(&mut self, f: impl FnOnce(i64, i64) -> i64) {
        let b = self.m.stack.pop().as_int();
        let a = self.m.acc.as_int();
        self.m.acc = Value::int(f(a, b));
    }

    fn cmp_binop(&mut self, f: impl FnOnce(i64, i64) -> bool) {
        let b = self.m.stack.pop().as_int();
        let a = self.m.acc.as_int();
        self.m.acc = Value::bool(f(a, b));
    }

    fn int_div(&mut self, modulo: bool) -> VmResult<()> {
        let b = self.m.stack.pop().as_int();
        if b == 0 {
            return Err(VmError::interp("division by zero"));
        }
        let a = self.m.acc.as_int();
        self.m.acc = Value::int(if modulo {
            a.wrapping_rem(b)
        } else {
            a.wrapping_div(b)
        });
        Ok(())
    }

    /// Fused compare-and-branch of an immediate operand against the
    /// accumulator.
    fn branch_cmp(&mut self, f: impl FnOnce(i64, i64) -> bool) -> VmResult<()> {
        let v = self.fetch_signed()? as i64;
        let ofs = self.fetch_signed()?;
        if f(v, self.m.acc.as_int()) {
            self.m.pc = self.resolve(ofs);
        }
        Ok(())
    }

    /// `APPLY1..3`: push the return frame beneath the arguments, then enter.
    fn apply_short(&mut self, nargs: usize) -> VmResult<()> {
        let mut args = [UNIT; 3];
        for slot in args[..nargs].iter_mut().rev() {
            *slot = self.m.stack.pop();
        }
        self.m.stack.push(Value::int(self.m.extra_args as i64));
        self.m.stack.push(self.m.env);
        self.m.stack.push(Value::int(self.m.pc as i64));
        for &arg in &args[..nargs] {
            self.m.stack.push(arg);
        }
        self.enter();
        self.m.extra_args = nargs as u64 - 1;
        Ok(())
    }

    /// `APPTERM n s`: slide the `n` argument words over the caller's frame
    /// of `s` words, then enter without growing the stack.
    fn app_term(&mut self) -> VmResult<()> {
        let n = self.fetch()? as usize;
        let s = self.fetch()? as usize;
        for i in (0..n).rev() {
            let arg = self.m.stack.nth(i);
            self.m.stack.set_nth(s - n + i, arg);
        }
        self.m.stack.pop_n(s - n);
        self.enter();
        self.m.extra_args += n as u64 - 1;
        Ok(())
    }

    fn app_term_short(&mut self, nargs: usize) -> VmResult<()> {
        let frame = self.fetch()? as usize;
        let mut args = [UNIT; 3];
        for slot in args[..nargs].iter_mut().rev() {
            *slot = self.m.stack.pop();
        }
        self.m.stack.pop_n(frame - nargs);
        for &arg in &args[..nargs] {
            self.m.stack.push(arg);
        }
        self.enter();
        self.m.extra_args += nargs as u64 - 1;
        Ok(())
    }

    /// `RETURN n`: pop the frame; either feed a pending curried argument to
    /// the closure just produced, or resume the caller.
    fn return_frame(&mut self) -> VmResult<()> {
        let n = self.fetch()? as usize;
        self.m.stack.pop_n(n);
        if self.m.extra_args > 0 {
            self.m.extra_args -= 1;
            self.enter();
        } else {
            self.m.pc = self.m.stack.pop().as_int() as usize;
            self.m.env = self.m.stack.pop();
            self.m.extra_args = self.m.stack.pop().as_int() as u64;
        }
        Ok(())
    }

    /// `RESTART`: unpack the arguments a partial application captured.
    fn restart(&mut self) {
        let n = (self.ctx.heap.size(self.m.env) - 2) as usize;
        for i in (0..n).rev() {
            let arg = self.ctx.heap.field(self.m.env, i + 2);
            self.m.stack.push(arg);
        }
        self.m.env = self.ctx.heap.field(self.m.env, 1);
        self.m.extra_args += n as u64;
    }

    /// `GRAB n`: arity check. With too few arguments, package the ones we
    /// have into a closure restarting just before this instruction and
    /// return it to the caller.
    fn grab(&mut self) -> VmResult<()> {
        let required = self.fetch()? as u64;
        if self.m.extra_args >= required {
            self.m.extra_args -= required;
            return Ok(());
        }
        let supplied = self.m.extra_args + 1;
        let blk = self.ctx.alloc_block(supplied + 2, TAG_CLOSURE)?;
        self.ctx
            .heap
            .set_field(blk, 0, Value::int(self.m.pc as i64 - 3));
        self.ctx.heap.set_field(blk, 1, self.m.env);
        for i in 0..supplied as usize {
            let arg = self.m.stack.pop();
            self.ctx.heap.set_field(blk, 2 + i, arg);
        }
        self.m.acc = blk;
        self.m.pc = self.m.stack.pop().as_int() as usize;
        self.m.env = self.m.stack.pop();
        self.m.extra_args = self.m.stack.pop().as_int() as u64;
        Ok(())
    }

    /// `CLOSURE n ofs`: capture `n` stack values (plus the accumulator when
    /// `n > 0`) under the resolved entry point.
    fn closure(&mut self) -> VmResult<()> {
        let n = self.fetch()? as usize;
        let ofs = self.fetch_signed()?;
        let entry = self.resolve(ofs);
        if n > 0 {
            self.push_acc();
        }
        let blk = self.ctx.alloc_block(n as u64 + 1, TAG_CLOSURE)?;
        self.ctx.heap.set_field(blk, 0, Value::int(entry as i64));
        for i in 0..n {
            let captured = self.m.stack.pop();
            self.ctx.heap.set_field(blk, i + 1, captured);
        }
        self.m.acc = blk;
        Ok(())
    }

    /// `CLOSUREREC f v`: one shared block holding `f` mutually recursive
    /// entries and `v` captured values. Entry 0 owns field 0; every further
    /// entry is an infix pair (offset-encoding header, entry point) exposed
    /// as a displaced reference into the same block.
    fn closure_rec(&mut self) -> VmResult<()> {
        let funcs = self.fetch()? as usize;
        let vars = self.fetch()? as usize;
        if vars > 0 {
            self.push_acc();
        }
        let blk = self
            .ctx
            .alloc_block((2 * funcs - 1 + vars) as u64, TAG_CLOSURE)?;
        for i in 0..vars {
            let captured = self.m.stack.nth(i);
            self.ctx.heap.set_field(blk, 2 * funcs - 1 + i, captured);
        }
        self.m.stack.pop_n(vars);

        let base = self.m.pc;
        let entry0 = self.entry_from_table(base, 0)?;
        self.ctx.heap.set_field(blk, 0, Value::int(entry0 as i64));
        self.m.acc = blk;
        self.m.stack.push(blk);
        for j in 1..funcs {
            let header = Header::new(2 * j as u64, TAG_INFIX);
            self.ctx.heap.set_field(
                blk,
                2 * j - 1,
                Value::int(header.raw().cast_signed()),
            );
            let entry = self.entry_from_table(base, j)?;
            self.ctx
                .heap
                .set_field(blk, 2 * j, Value::int(entry as i64));
            self.m.stack.push(Value::block_at(blk.index(), 2 * j));
        }
        self.m.pc += funcs;
        Ok(())
    }

    /// Resolve entry `j` of a recursive-closure offset table at `base`.
    fn entry_from_table(&self, base: usize, j: usize) -> VmResult<usize> {
        let ofs = self.code.get(base + j).copied().ok_or_else(|| {
            VmError::interp("closure offset table outside the code")
        })? as i32;
        Ok((base as i64 + ofs as i64) as usize)
    }

    fn offset_closure(&mut self, n: i64) {
        self.m.acc = self.m.env.displaced(n);
    }

    /// `MAKEBLOCK`: field 0 is the accumulator, the rest pop off the stack.
    fn make_block(&mut self, size: u64, tag: u8) -> VmResult<()> {
        let blk = self.ctx.alloc_block(size, tag)?;
        self.ctx.heap.set_field(blk, 0, self.m.acc);
        for i in 1..size as usize {
            let field = self.m.stack.pop();
            self.ctx.heap.set_field(blk, i, field);
        }
        self.m.acc = blk;
        Ok(())
    }

    /// `RAISE`: unwind to the innermost trap frame; with no handler the
    /// exception escapes and kills the run.
    fn raise(&mut self) -> VmResult<()> {
        if self.m.trap_sp == 0 {
            return Err(VmError::interp(format!(
                "uncaught exception: {}",
                codec::render_value(self.ctx, self.m.acc)
            )));
        }
        self.m.stack.truncate(self.m.trap_sp);
        self.m.pc = self.m.stack.pop().as_int() as usize;
        self.m.trap_sp = self.m.stack.pop().as_int() as usize;
        self.m.env = self.m.stack.pop();
        self.m.extra_args = self.m.stack.pop().as_int() as u64;
        Ok(())
    }

    /// `CCALL`: bridge into a primitive. The environment is saved across
    /// the call and the stack arguments are consumed afterwards.
    fn ccall(&mut self, nargs: usize) -> VmResult<()> {
        let slot = self.fetch()? as usize;
        let (name, prim) = self.prims.get(slot)?;
        if prim.arity() != nargs {
            return Err(VmError::interp(format!(
                "primitive {name} has arity {} but was called with {nargs}",
                prim.arity()
            )));
        }
        self.m.stack.push(self.m.env);
        let a = self.m.acc;
        let s = &self.m.stack;
        let result = match prim {
            Primitive::Unary(f) => f(self.ctx, a),
            Primitive::Binary(f) => f(self.ctx, a, s.nth(1)),
            Primitive::Ternary(f) => f(self.ctx, a, s.nth(1), s.nth(2)),
            Primitive::Quaternary(f) => {
                f(self.ctx, a, s.nth(1), s.nth(2), s.nth(3))
            }
            Primitive::Quinary(f) => {
                f(self.ctx, a, s.nth(1), s.nth(2), s.nth(3), s.nth(4))
            }
        }?;
        self.m.acc = result;
        self.m.env = self.m.stack.pop();
        self.m.stack.pop_n(nargs - 1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{TRUE, codec, image, Image, SectionKind};

    const fn w(op: Op) -> u32 {
        op as u32
    }

    const fn s(ofs: i32) -> u32 {
        ofs as u32
    }

    /// Run a program against a fresh context, returning the result and the
    /// final stack depth.
    fn exec(code: &[u32]) -> (VmResult<Value>, usize) {
        let mut ctx = Context::new().unwrap();
        let mut interp =
            Interpreter::new(&mut ctx, code, UNIT, PrimitiveTable::empty());
        let result = interp.run();
        (result, interp.m.stack.sp())
    }

    fn exec_value(code: &[u32]) -> Value {
        let (result, _) = exec(code);
        result.unwrap()
    }

    #[test]
    fn const_push_const_add_yields_42() {
        let code = [
            w(Op::ConstInt),
            21,
            w(Op::Push),
            w(Op::ConstInt),
            21,
            w(Op::AddInt),
            w(Op::Stop),
        ];
        let (result, sp) = exec(&code);
        assert_eq!(result.unwrap(), Value::int(42));
        assert_eq!(sp, 0, "arithmetic must leave the stack balanced");
    }

    #[test]
    fn arithmetic_covers_the_integer_group() {
        let binop = |op: Op, a: i32, b: i32| {
            exec_value(&[
                w(Op::ConstInt),
                s(b),
                w(Op::Push),
                w(Op::ConstInt),
                s(a),
                w(op),
                w(Op::Stop),
            ])
            .as_int()
        };
        assert_eq!(binop(Op::AddInt, 2, 3), 5);
        assert_eq!(binop(Op::SubInt, 2, 3), -1);
        assert_eq!(binop(Op::MulInt, -4, 6), -24);
        assert_eq!(binop(Op::DivInt, 17, 5), 3);
        assert_eq!(binop(Op::ModInt, 17, 5), 2);
        assert_eq!(binop(Op::AndInt, 0b1100, 0b1010), 0b1000);
        assert_eq!(binop(Op::OrInt, 0b1100, 0b1010), 0b1110);
        assert_eq!(binop(Op::XorInt, 0b1100, 0b1010), 0b0110);
        assert_eq!(binop(Op::LslInt, 3, 4), 48);
        assert_eq!(binop(Op::AsrInt, -16, 2), -4);
        assert_eq!(binop(Op::LsrInt, 16, 2), 4);
    }

    #[test]
    fn logical_shift_treats_the_payload_as_unsigned() {
        let v = exec_value(&[
            w(Op::ConstInt),
            2,
            w(Op::Push),
            w(Op::ConstInt),
            s(-1),
            w(Op::LsrInt),
            w(Op::Stop),
        ]);
        assert_eq!(v.as_int(), (1i64 << 61) - 1);
    }

    #[test]
    fn division_by_zero_is_fatal() {
        let code = [
            w(Op::ConstInt),
            0,
            w(Op::Push),
            w(Op::ConstInt),
            9,
            w(Op::DivInt),
            w(Op::Stop),
        ];
        let (result, _) = exec(&code);
        assert!(matches!(result, Err(VmError::Interp(_))));
    }

    #[test]
    fn negint_flips_the_sign() {
        let v = exec_value(&[w(Op::ConstInt), 7, w(Op::NegInt), w(Op::Stop)]);
        assert_eq!(v.as_int(), -7);
    }

    #[test]
    fn comparisons_produce_booleans() {
        let cmp = |op: Op, a: i32, b: i32| {
            exec_value(&[
                w(Op::ConstInt),
                s(b),
                w(Op::Push),
                w(Op::ConstInt),
                s(a),
                w(op),
                w(Op::Stop),
            ])
        };
        assert_eq!(cmp(Op::LtInt, 3, 4), TRUE);
        assert_eq!(cmp(Op::GeInt, 3, 4), FALSE);
        assert_eq!(cmp(Op::Eq, 5, 5), TRUE);
        assert_eq!(cmp(Op::Neq, 5, 5), FALSE);
        // Unsigned order puts negative payloads above every positive one.
        assert_eq!(cmp(Op::UltInt, 3, -1), TRUE);
        assert_eq!(cmp(Op::UgeInt, -1, 3), TRUE);
    }

    #[test]
    fn branches_follow_the_offset_rule() {
        // BRANCH skips the CONST 1.
        let v = exec_value(&[
            w(Op::Branch),
            s(3),
            w(Op::Const1),
            w(Op::Stop),
            w(Op::Const3),
            w(Op::Stop),
        ]);
        assert_eq!(v.as_int(), 3);
    }

    #[test]
    fn conditional_branches_test_against_false() {
        let run = |cond: u32, op: Op| {
            exec_value(&[
                w(Op::ConstInt),
                cond,
                w(op),
                s(3),
                w(Op::Const1),
                w(Op::Stop),
                w(Op::Const2),
                w(Op::Stop),
            ])
            .as_int()
        };
        assert_eq!(run(1, Op::BranchIf), 2, "truthy BRANCHIF must jump");
        assert_eq!(run(0, Op::BranchIf), 1, "false BRANCHIF must fall through");
        assert_eq!(run(0, Op::BranchIfNot), 2, "false BRANCHIFNOT must jump");
        assert_eq!(run(1, Op::BranchIfNot), 1);
    }

    #[test]
    fn fused_branches_compare_operand_against_accumulator() {
        let run = |op: Op, v: i32, acc: i32| {
            exec_value(&[
                w(Op::ConstInt),
                s(acc),
                w(op),
                s(v),
                s(3),
                w(Op::Const1),
                w(Op::Stop),
                w(Op::Const2),
                w(Op::Stop),
            ])
            .as_int()
        };
        assert_eq!(run(Op::Beq, 5, 5), 2);
        assert_eq!(run(Op::Beq, 5, 6), 1);
        assert_eq!(run(Op::Bneq, 5, 6), 2);
        assert_eq!(run(Op::BltInt, 2, 3), 2, "2 < acc 3 must branch");
        assert_eq!(run(Op::BgeInt, 3, 3), 2);
        assert_eq!(run(Op::BgtInt, 3, 3), 1);
        assert_eq!(run(Op::BultInt, 1, -1), 2, "unsigned 1 < payload of -1");
    }

    #[test]
    fn stack_slots_are_addressed_from_the_top() {
        let code = [
            w(Op::ConstInt),
            10,
            w(Op::Push),
            w(Op::ConstInt),
            20,
            w(Op::Push),
            w(Op::Acc1),
            w(Op::Push),
            w(Op::Pop),
            3,
            w(Op::Stop),
        ];
        let (result, sp) = exec(&code);
        assert_eq!(result.unwrap().as_int(), 10);
        assert_eq!(sp, 0);
    }

    #[test]
    fn assign_stores_and_resets_the_accumulator() {
        let code = [
            w(Op::ConstInt),
            5,
            w(Op::Push),
            w(Op::ConstInt),
            9,
            w(Op::Assign),
            0,
            w(Op::Acc0),
            w(Op::Push),
            w(Op::Pop),
            1,
            w(Op::Stop),
        ];
        assert_eq!(exec_value(&code).as_int(), 9);
    }

    #[test]
    fn makeblock_collects_accumulator_then_stack() {
        let mut ctx = Context::new().unwrap();
        let code = [
            w(Op::ConstInt),
            5,
            w(Op::Push),
            w(Op::ConstInt),
            9,
            w(Op::MakeBlock2),
            4,
            w(Op::Stop),
        ];
        let mut interp =
            Interpreter::new(&mut ctx, &code, UNIT, PrimitiveTable::empty());
        let v = interp.run().unwrap();
        assert_eq!(interp.m.stack.sp(), 0);
        assert_eq!(ctx.heap.tag(v), 4);
        assert_eq!(ctx.heap.field(v, 0), Value::int(9));
        assert_eq!(ctx.heap.field(v, 1), Value::int(5));
    }

    #[test]
    fn field_access_reads_and_writes_blocks() {
        // Build (0) { 1, 2 }, overwrite field 1 with 8, read it back.
        let code = [
            w(Op::ConstInt),
            2,
            w(Op::Push),
            w(Op::ConstInt),
            1,
            w(Op::MakeBlock2),
            0,
            w(Op::Push), // keep the block
            w(Op::ConstInt),
            8,
            w(Op::Push),
            w(Op::Acc1), // block
            w(Op::SetField1),
            w(Op::Acc0),
            w(Op::GetField1),
            w(Op::Push),
            w(Op::Acc0),
            w(Op::Push),
            w(Op::Pop),
            3,
            w(Op::Stop),
        ];
        assert_eq!(exec_value(&code).as_int(), 8);
    }

    #[test]
    fn vectlength_reports_the_block_size() {
        let code = [
            w(Op::ConstInt),
            1,
            w(Op::Push),
            w(Op::ConstInt),
            2,
            w(Op::Push),
            w(Op::ConstInt),
            3,
            w(Op::MakeBlock3),
            0,
            w(Op::VectLength),
            w(Op::Stop),
        ];
        assert_eq!(exec_value(&code).as_int(), 3);
    }

    #[test]
    fn atoms_are_shared_across_loads() {
        let code = [
            w(Op::Atom),
            7,
            w(Op::Push),
            w(Op::Atom),
            7,
            w(Op::Eq),
            w(Op::Stop),
        ];
        assert_eq!(exec_value(&code), TRUE);
    }

    #[test]
    fn globals_read_and_write_the_data_block() {
        let mut ctx = Context::new().unwrap();
        let global = ctx.alloc_block(2, 0).unwrap();
        let inner = ctx.alloc_block(2, 0).unwrap();
        ctx.heap.set_field(inner, 1, Value::int(6));
        ctx.heap.set_field(global, 0, inner);
        ctx.heap.set_field(global, 1, Value::int(8));

        let code = [
            w(Op::GetGlobalField),
            0,
            1,
            w(Op::Push),
            w(Op::GetGlobal),
            1,
            w(Op::AddInt),
            w(Op::SetGlobal),
            1,
            w(Op::GetGlobal),
            1,
            w(Op::Stop),
        ];
        let mut interp =
            Interpreter::new(&mut ctx, &code, global, PrimitiveTable::empty());
        assert_eq!(interp.run().unwrap().as_int(), 14);
    }

    #[test]
    fn offsetref_bumps_field_zero_in_place() {
        let code = [
            w(Op::ConstInt),
            40,
            w(Op::MakeBlock1),
            0,
            w(Op::Push),
            w(Op::Acc0),
            w(Op::OffsetRef),
            2,
            w(Op::Acc0),
            w(Op::GetField0),
            w(Op::Push),
            w(Op::Pop),
            2,
            w(Op::Stop),
        ];
        assert_eq!(exec_value(&code).as_int(), 42);
    }

    #[test]
    fn isint_and_boolnot_probe_the_accumulator() {
        let v = exec_value(&[w(Op::ConstInt), 5, w(Op::IsInt), w(Op::Stop)]);
        assert_eq!(v, TRUE);
        let v = exec_value(&[w(Op::Atom0), w(Op::IsInt), w(Op::Stop)]);
        assert_eq!(v, FALSE);
        let v = exec_value(&[w(Op::Const0), w(Op::BoolNot), w(Op::Stop)]);
        assert_eq!(v, TRUE);
    }

    /// fun x y -> x + y, preceded by its RESTART/GRAB prologue.
    ///
    /// Word layout, entry point at 3:
    /// ```text
    /// 2: RESTART
    /// 3: GRAB 1
    /// 5: ACC0; PUSH; ACC2; ADDINT
    /// 9: RETURN 2
    /// ```
    const ADD2_BODY: [u32; 9] = [
        w(Op::Restart),
        w(Op::Grab),
        1,
        w(Op::Acc0),
        w(Op::Push),
        w(Op::Acc2),
        w(Op::AddInt),
        w(Op::Return),
        2,
    ];

    fn add2_program(main: &[u32]) -> Vec<u32> {
        let mut code = vec![w(Op::Branch), s(10)];
        code.extend_from_slice(&ADD2_BODY);
        code.extend_from_slice(main);
        code
    }

    #[test]
    fn applying_both_arguments_at_once_yields_the_sum() {
        // main at 11: push 4 and 3, close over entry 3, APPLY2.
        let code = add2_program(&[
            w(Op::ConstInt),
            4,
            w(Op::Push),
            w(Op::ConstInt),
            3,
            w(Op::Push),
            w(Op::Closure),
            0,
            s(3 - 19),
            w(Op::Apply2),
            w(Op::Stop),
        ]);
        let (result, sp) = exec(&code);
        assert_eq!(result.unwrap().as_int(), 7);
        assert_eq!(
            sp, 0,
            "stack depth must return to its pre-call level after RETURN"
        );
    }

    #[test]
    fn partial_application_packages_and_resumes() {
        // Apply to 3 alone, then apply the result to 4.
        let code = add2_program(&[
            w(Op::ConstInt),
            3,
            w(Op::Push),
            w(Op::Closure),
            0,
            s(3 - 16),
            w(Op::Apply1),
            w(Op::Push), // the partial application closure
            w(Op::ConstInt),
            4,
            w(Op::Push),
            w(Op::Acc1),
            w(Op::Apply1),
            w(Op::Push),
            w(Op::Pop),
            2,
            w(Op::Stop),
        ]);
        let (result, sp) = exec(&code);
        assert_eq!(
            result.unwrap().as_int(),
            7,
            "split application must agree with the two-argument call"
        );
        assert_eq!(sp, 0);
    }

    #[test]
    fn undersupplied_grab_returns_a_closure_value() {
        let code = add2_program(&[
            w(Op::ConstInt),
            3,
            w(Op::Push),
            w(Op::Closure),
            0,
            s(3 - 16),
            w(Op::Apply1),
            w(Op::Stop),
        ]);
        let mut ctx = Context::new().unwrap();
        let mut interp =
            Interpreter::new(&mut ctx, &code, UNIT, PrimitiveTable::empty());
        let v = interp.run().unwrap();
        assert!(ctx.heap.is_closure(v), "partial application is a closure");
        // Restart point, saved environment, one captured argument.
        assert_eq!(ctx.heap.size(v), 3);
        assert_eq!(ctx.heap.field(v, 0), Value::int(2), "restart entry");
        assert_eq!(ctx.heap.field(v, 2), Value::int(3), "captured argument");
    }

    #[test]
    fn over_application_degrades_into_repeated_application() {
        // f = fun x -> fun y -> x + y, called with both arguments at once
        // through APPLY 2: RETURN sees one extra argument pending and
        // re-enters the inner closure.
        let code = [
            w(Op::PushRetAddr),
            s(12),
            w(Op::ConstInt),
            4,
            w(Op::Push),
            w(Op::ConstInt),
            3,
            w(Op::Push),
            w(Op::Closure),
            0,
            s(4),
            w(Op::Apply),
            2,
            w(Op::Stop),
            // f at 14:
            w(Op::Acc0),
            w(Op::Closure),
            1,
            s(3),
            w(Op::Return),
            1,
            // inner closure at 20:
            w(Op::Acc0),
            w(Op::Push),
            w(Op::EnvAcc1),
            w(Op::AddInt),
            w(Op::Return),
            1,
        ];
        let (result, sp) = exec(&code);
        assert_eq!(result.unwrap().as_int(), 7);
        assert_eq!(sp, 0);
    }

    /// Mutually recursive even/odd over a shared closure block.
    ///
    /// Entry 0 (even) at table+ofs0, entry 1 (odd) reached through its
    /// infix reference; each tail-calls the other via OFFSETCLOSURE.
    fn even_odd_program(n: u32) -> Vec<u32> {
        let mut code = vec![w(Op::Branch), s(29)];
        // even, entry at 2:
        code.extend_from_slice(&[
            w(Op::Acc0),
            w(Op::Bneq),
            0,
            s(4),
            w(Op::Const1),
            w(Op::Return),
            1,
            // 9:
            w(Op::Acc0),
            w(Op::OffsetInt),
            s(-1),
            w(Op::Push),
            w(Op::OffsetClosure2),
            w(Op::AppTerm1),
            2,
        ]);
        // odd, entry at 16:
        code.extend_from_slice(&[
            w(Op::Acc0),
            w(Op::Bneq),
            0,
            s(4),
            w(Op::Const0),
            w(Op::Return),
            1,
            // 23:
            w(Op::Acc0),
            w(Op::OffsetInt),
            s(-1),
            w(Op::Push),
            w(Op::OffsetClosureM2),
            w(Op::AppTerm1),
            2,
        ]);
        // main at 30: CLOSUREREC, offsets relative to the table at 33.
        code.extend_from_slice(&[
            w(Op::ClosureRec),
            2,
            0,
            s(2 - 33),
            s(16 - 33),
            // stack: [odd, even]
            w(Op::ConstInt),
            n,
            w(Op::Push),
            w(Op::Acc1), // the odd entry
            w(Op::Apply1),
            w(Op::Push),
            w(Op::Pop),
            3,
            w(Op::Stop),
        ]);
        code
    }

    #[test]
    fn recursive_closures_share_one_block_and_call_each_other() {
        let (result, sp) = exec(&even_odd_program(5));
        assert_eq!(result.unwrap(), TRUE, "5 is odd");
        assert_eq!(sp, 0);
        let (result, _) = exec(&even_odd_program(6));
        assert_eq!(result.unwrap(), FALSE, "6 is not odd");
    }

    #[test]
    fn closure_rec_lays_out_infix_entries() {
        let code = [
            w(Op::ClosureRec),
            2,
            0,
            s(4),
            s(5),
            w(Op::Stop),
        ];
        let mut ctx = Context::new().unwrap();
        let mut interp =
            Interpreter::new(&mut ctx, &code, UNIT, PrimitiveTable::empty());
        let blk = interp.run().unwrap();
        let sp = interp.m.stack.sp();
        assert_eq!(sp, 2, "every entry point is pushed");
        assert!(ctx.heap.is_closure(blk));
        assert_eq!(ctx.heap.size(blk), 3);
        // Entry 0 resolves against the table base at word 3.
        assert_eq!(ctx.heap.field(blk, 0), Value::int(7));
        let header =
            Header::new(2, crate::TAG_INFIX).raw().cast_signed();
        assert_eq!(ctx.heap.field(blk, 1), Value::int(header));
        assert_eq!(ctx.heap.field(blk, 2), Value::int(8));
    }

    #[test]
    fn tail_calls_do_not_grow_the_stack() {
        // PUSH_RETADDR/APPLY into f, which tail-calls g; g returns straight
        // to main's frame.
        let code = [
            w(Op::PushRetAddr),
            s(9),
            w(Op::ConstInt),
            5,
            w(Op::Push),
            w(Op::Closure),
            0,
            s(4),
            w(Op::Apply),
            1,
            w(Op::Stop),
            // f at 11:
            w(Op::Closure),
            0,
            s(3),
            w(Op::AppTerm1),
            1,
            // g at 16:
            w(Op::Acc0),
            w(Op::OffsetInt),
            1,
            w(Op::Return),
            1,
        ];
        let (result, sp) = exec(&code);
        assert_eq!(result.unwrap().as_int(), 6);
        assert_eq!(sp, 0);
    }

    #[test]
    fn raise_lands_in_the_innermost_handler() {
        let code = [
            w(Op::PushTrap),
            s(4),
            w(Op::ConstInt),
            7,
            w(Op::Raise),
            w(Op::Stop),
        ];
        let (result, sp) = exec(&code);
        assert_eq!(
            result.unwrap().as_int(),
            7,
            "the handler receives the raised value in the accumulator"
        );
        assert_eq!(sp, 0, "RAISE must truncate to the handler's depth");
    }

    #[test]
    fn poptrap_discards_the_frame_on_normal_exit() {
        let code = [
            w(Op::PushTrap),
            s(7),
            w(Op::ConstInt),
            1,
            w(Op::PopTrap),
            w(Op::ConstInt),
            3,
            w(Op::Stop),
            w(Op::ConstInt),
            99,
            w(Op::Stop),
        ];
        let (result, sp) = exec(&code);
        assert_eq!(result.unwrap().as_int(), 3);
        assert_eq!(sp, 0);
    }

    #[test]
    fn nested_traps_unwind_one_level_at_a_time() {
        let code = [
            w(Op::PushTrap),
            s(10), // outer handler at 11
            w(Op::PushTrap),
            s(4), // inner handler at 7
            w(Op::ConstInt),
            1,
            w(Op::Raise),
            // inner handler re-raises
            w(Op::Raise),
            w(Op::ConstInt),
            99,
            w(Op::Stop),
            // outer handler at 11:
            w(Op::OffsetInt),
            41,
            w(Op::Stop),
        ];
        let (result, sp) = exec(&code);
        assert_eq!(result.unwrap().as_int(), 42);
        assert_eq!(sp, 0);
    }

    #[test]
    fn raise_without_a_handler_is_fatal() {
        let code = [w(Op::ConstInt), 5, w(Op::Raise), w(Op::Stop)];
        let (result, _) = exec(&code);
        let err = result.unwrap_err();
        assert!(matches!(err, VmError::Interp(_)));
        assert!(err.to_string().contains("uncaught"));
    }

    #[test]
    fn ccall_bridges_into_the_primitive_table() {
        let mut ctx = Context::new().unwrap();
        let prims = PrimitiveTable::resolve(&["caml_int_compare".to_owned()]);
        let code = [
            w(Op::ConstInt),
            3,
            w(Op::Push),
            w(Op::ConstInt),
            7,
            w(Op::CCall2),
            0,
            w(Op::Stop),
        ];
        let mut interp = Interpreter::new(&mut ctx, &code, UNIT, prims);
        let result = interp.run().unwrap();
        assert_eq!(result.as_int(), 1, "compare 7 3 is positive");
        assert_eq!(
            interp.m.stack.sp(),
            0,
            "CCALL must consume its stack arguments"
        );
    }

    #[test]
    fn ccall_through_an_unresolved_slot_is_fatal() {
        let mut ctx = Context::new().unwrap();
        let prims = PrimitiveTable::resolve(&["caml_not_a_thing".to_owned()]);
        let code = [w(Op::Const0), w(Op::CCall1), 0, w(Op::Stop)];
        let mut interp = Interpreter::new(&mut ctx, &code, UNIT, prims);
        let err = interp.run().unwrap_err();
        assert!(err.to_string().contains("caml_not_a_thing"));
    }

    #[test]
    fn ccall_with_the_wrong_arity_is_fatal() {
        let mut ctx = Context::new().unwrap();
        let prims = PrimitiveTable::resolve(&["caml_int_compare".to_owned()]);
        let code = [w(Op::Const0), w(Op::CCall1), 0, w(Op::Stop)];
        let mut interp = Interpreter::new(&mut ctx, &code, UNIT, prims);
        assert!(matches!(interp.run(), Err(VmError::Interp(_))));
    }

    #[test]
    fn unknown_opcodes_are_fatal() {
        let (result, _) = exec(&[200, w(Op::Stop)]);
        assert!(matches!(result, Err(VmError::Interp(_))));
    }

    #[test]
    fn unsupported_opcodes_are_fatal_not_silent() {
        let (result, _) = exec(&[w(Op::Switch), w(Op::Stop)]);
        let err = result.unwrap_err();
        assert!(err.to_string().contains("Switch"));
    }

    #[test]
    fn running_off_the_code_is_fatal() {
        let (result, _) = exec(&[w(Op::ConstInt)]);
        assert!(matches!(result, Err(VmError::Interp(_))));
    }

    #[test]
    fn a_whole_image_runs_end_to_end() {
        // DATA: a one-field global; CODE: 21 + 21; PRIM: empty.
        let mut data = Vec::new();
        data.extend_from_slice(&0x8495_A6BEu32.to_be_bytes());
        data.extend_from_slice(&1u32.to_be_bytes());
        data.extend_from_slice(&[0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        data.push(0x40);
        let code = [
            w(Op::ConstInt),
            21,
            w(Op::Push),
            w(Op::ConstInt),
            21,
            w(Op::AddInt),
            w(Op::Stop),
        ];
        let code_bytes: Vec<u8> =
            code.iter().flat_map(|w| w.to_le_bytes()).collect();
        let bytes = image::tests::build_image(&[
            ("CODE", code_bytes.as_slice()),
            ("DATA", data.as_slice()),
            ("PRIM", &[]),
        ]);
        let image = Image::parse(bytes).unwrap();
        assert_eq!(
            image.sections().collect::<Vec<_>>(),
            vec![SectionKind::Code, SectionKind::Data, SectionKind::Prim]
        );
        let mut ctx = Context::new().unwrap();
        let result = ctx.run(&image).unwrap();
        assert_eq!(result, Value::int(42));
        assert_eq!(codec::render_value(&ctx, result), "42");
    }
}
