//! Instruction definitions for corvus IR.

use crate::value::NodeRef;

/// A register class id.
///
/// The allocator is configured with an arbitrary number of classes; the
/// constants below are the ids the frontend conventionally uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegClass(pub u32);

impl RegClass {
    pub const GPR: RegClass = RegClass(0);
    pub const FPR: RegClass = RegClass(1);
    pub const GPR_PAIR: RegClass = RegClass(2);

    /// Index into per-class tables.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// An instruction in the ordered IR.
///
/// `size` is the operation width in bytes; `elements` is the vector element
/// count (1 for scalars).
#[derive(Debug, Clone)]
pub struct Inst {
    pub op: Op,
    pub size: u8,
    pub elements: u8,
}

impl Inst {
    pub fn new(op: Op, size: u8) -> Self {
        Self {
            op,
            size,
            elements: 1,
        }
    }
}

/// Instruction opcodes.
///
/// Block references (jump targets, `PhiValue::block`) and phi chain links
/// are structural, not SSA arguments; `append_args` yields value operands
/// only.
#[derive(Debug, Clone)]
pub enum Op {
    /// First node of every IR; links to the first code block.
    IrHeader { blocks: Option<NodeRef> },
    /// A basic block: code nodes `begin..=last`, `next` sibling block.
    CodeBlock {
        begin: Option<NodeRef>,
        last: Option<NodeRef>,
        next: Option<NodeRef>,
    },

    /// Integer literal.
    Constant { value: u64 },

    // -- Guest context --
    LoadContext { offset: u32, class: RegClass },
    StoreContext { value: NodeRef, offset: u32, class: RegClass },
    LoadContextPair { offset: u32 },
    StoreContextPair { value: NodeRef, offset: u32 },
    LoadFlag { flag: u32 },
    StoreFlag { value: NodeRef, flag: u32 },

    // -- Memory --
    LoadMem { addr: NodeRef, class: RegClass },
    StoreMem { addr: NodeRef, value: NodeRef, class: RegClass },

    // -- Scalar ALU --
    Add { lhs: NodeRef, rhs: NodeRef },
    Sub { lhs: NodeRef, rhs: NodeRef },
    Mul { lhs: NodeRef, rhs: NodeRef },
    And { lhs: NodeRef, rhs: NodeRef },
    Or { lhs: NodeRef, rhs: NodeRef },
    Xor { lhs: NodeRef, rhs: NodeRef },
    /// Zero-extend `value` from `src_size` bits.
    Zext { value: NodeRef, src_size: u8 },
    GetHostFlag { value: NodeRef, flag: u32 },
    Cpuid { function: NodeRef },

    // -- Vector ALU --
    VAdd { lhs: NodeRef, rhs: NodeRef },
    VXor { lhs: NodeRef, rhs: NodeRef },

    // -- Register pairs --
    CreateElementPair { lo: NodeRef, hi: NodeRef },
    ExtractElementPair { pair: NodeRef, element: u8 },
    TruncElementPair { pair: NodeRef },
    CasPair { expected: NodeRef, desired: NodeRef, addr: NodeRef },

    // -- SSA structure --
    /// Head of a phi; `begin` starts the `PhiValue` chain.
    Phi { begin: Option<NodeRef> },
    /// One incoming value of a phi, from `block`; `next` continues the chain.
    PhiValue {
        value: NodeRef,
        block: NodeRef,
        next: Option<NodeRef>,
    },

    // -- Spill plumbing --
    /// Store `value` to spill slot `slot`.
    SpillRegister {
        value: NodeRef,
        slot: u32,
        class: RegClass,
    },
    /// Reload spill slot `slot`.
    FillRegister { slot: u32, class: RegClass },

    // -- Control flow --
    Jump { target: NodeRef },
    CondJump {
        cond: NodeRef,
        true_target: NodeRef,
        false_target: NodeRef,
    },
    ExitFunction,
}

impl Op {
    /// Whether this op produces an SSA value.
    pub fn has_dest(&self) -> bool {
        !matches!(
            self,
            Op::IrHeader { .. }
                | Op::CodeBlock { .. }
                | Op::StoreContext { .. }
                | Op::StoreContextPair { .. }
                | Op::StoreFlag { .. }
                | Op::StoreMem { .. }
                | Op::PhiValue { .. }
                | Op::SpillRegister { .. }
                | Op::Jump { .. }
                | Op::CondJump { .. }
                | Op::ExitFunction
        )
    }

    /// True for ops that produce a vector result.
    pub fn is_vector(&self) -> bool {
        matches!(self, Op::VAdd { .. } | Op::VXor { .. })
    }

    /// Append all SSA value arguments of this op to `args`.
    pub fn append_args(&self, args: &mut Vec<NodeRef>) {
        match *self {
            Op::IrHeader { .. }
            | Op::CodeBlock { .. }
            | Op::Constant { .. }
            | Op::LoadContext { .. }
            | Op::LoadContextPair { .. }
            | Op::LoadFlag { .. }
            | Op::Phi { .. }
            | Op::FillRegister { .. }
            | Op::Jump { .. }
            | Op::ExitFunction => {}
            Op::StoreContext { value, .. }
            | Op::StoreContextPair { value, .. }
            | Op::StoreFlag { value, .. }
            | Op::PhiValue { value, .. }
            | Op::SpillRegister { value, .. }
            | Op::Zext { value, .. }
            | Op::GetHostFlag { value, .. } => args.push(value),
            Op::LoadMem { addr, .. } => args.push(addr),
            Op::StoreMem { addr, value, .. } => {
                args.push(addr);
                args.push(value);
            }
            Op::Add { lhs, rhs }
            | Op::Sub { lhs, rhs }
            | Op::Mul { lhs, rhs }
            | Op::And { lhs, rhs }
            | Op::Or { lhs, rhs }
            | Op::Xor { lhs, rhs }
            | Op::VAdd { lhs, rhs }
            | Op::VXor { lhs, rhs } => {
                args.push(lhs);
                args.push(rhs);
            }
            Op::Cpuid { function } => args.push(function),
            Op::CreateElementPair { lo, hi } => {
                args.push(lo);
                args.push(hi);
            }
            Op::ExtractElementPair { pair, .. } | Op::TruncElementPair { pair } => args.push(pair),
            Op::CasPair {
                expected,
                desired,
                addr,
            } => {
                args.push(expected);
                args.push(desired);
                args.push(addr);
            }
            Op::CondJump { cond, .. } => args.push(cond),
        }
    }

    /// Replace every argument equal to `old` with `new`.
    /// Returns whether anything changed.
    pub fn replace_arg(&mut self, old: NodeRef, new: NodeRef) -> bool {
        let mut changed = false;
        self.for_each_arg_mut(|arg| {
            if *arg == old {
                *arg = new;
                changed = true;
            }
        });
        changed
    }

    fn for_each_arg_mut(&mut self, mut f: impl FnMut(&mut NodeRef)) {
        match self {
            Op::IrHeader { .. }
            | Op::CodeBlock { .. }
            | Op::Constant { .. }
            | Op::LoadContext { .. }
            | Op::LoadContextPair { .. }
            | Op::LoadFlag { .. }
            | Op::Phi { .. }
            | Op::FillRegister { .. }
            | Op::Jump { .. }
            | Op::ExitFunction => {}
            Op::StoreContext { value, .. }
            | Op::StoreContextPair { value, .. }
            | Op::StoreFlag { value, .. }
            | Op::PhiValue { value, .. }
            | Op::SpillRegister { value, .. }
            | Op::Zext { value, .. }
            | Op::GetHostFlag { value, .. } => f(value),
            Op::LoadMem { addr, .. } => f(addr),
            Op::StoreMem { addr, value, .. } => {
                f(addr);
                f(value);
            }
            Op::Add { lhs, rhs }
            | Op::Sub { lhs, rhs }
            | Op::Mul { lhs, rhs }
            | Op::And { lhs, rhs }
            | Op::Or { lhs, rhs }
            | Op::Xor { lhs, rhs }
            | Op::VAdd { lhs, rhs }
            | Op::VXor { lhs, rhs } => {
                f(lhs);
                f(rhs);
            }
            Op::Cpuid { function } => f(function),
            Op::CreateElementPair { lo, hi } => {
                f(lo);
                f(hi);
            }
            Op::ExtractElementPair { pair, .. } | Op::TruncElementPair { pair } => f(pair),
            Op::CasPair {
                expected,
                desired,
                addr,
            } => {
                f(expected);
                f(desired);
                f(addr);
            }
            Op::CondJump { cond, .. } => f(cond),
        }
    }

    /// Visit every node reference in this op, including block links and phi
    /// chain links. Compaction uses this to remap ids.
    pub fn for_each_ref_mut(&mut self, mut f: impl FnMut(&mut NodeRef)) {
        match self {
            Op::IrHeader { blocks } => {
                if let Some(b) = blocks {
                    f(b);
                }
            }
            Op::CodeBlock { begin, last, next } => {
                for link in [begin, last, next] {
                    if let Some(r) = link {
                        f(r);
                    }
                }
            }
            Op::Phi { begin } => {
                if let Some(b) = begin {
                    f(b);
                }
            }
            Op::PhiValue { value, block, next } => {
                f(value);
                f(block);
                if let Some(n) = next {
                    f(n);
                }
            }
            Op::Jump { target } => f(target),
            Op::CondJump {
                cond,
                true_target,
                false_target,
            } => {
                f(cond);
                f(true_target);
                f(false_target);
            }
            other => other.for_each_arg_mut(&mut f),
        }
    }
}
