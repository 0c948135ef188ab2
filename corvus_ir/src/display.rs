//! Text format for corvus IR.
//!
//! Output format:
//! ```text
//! block %ssa1:
//!   %ssa2 = constant 0x2a
//!   %ssa3 = add %ssa2, %ssa2
//!   exit
//! ```

use std::fmt;

use crate::instruction::{Inst, Op};
use crate::list::IrList;
use crate::value::NodeRef;

/// Wrapper implementing [`fmt::Display`] for an [`IrList`].
pub struct IrDisplay<'a> {
    list: &'a IrList,
}

impl IrList {
    pub fn display(&self) -> IrDisplay<'_> {
        IrDisplay { list: self }
    }
}

impl fmt::Display for IrDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for block in self.list.blocks() {
            writeln!(f, "block {block}:")?;
            for node in self.list.block_ops(block) {
                let inst = self.list.inst(node);
                write!(f, "  ")?;
                if inst.op.has_dest() {
                    write!(f, "{node} = ")?;
                }
                fmt_inst(f, inst)?;
                writeln!(f)?;
            }
        }
        Ok(())
    }
}

fn opt(link: Option<NodeRef>) -> String {
    match link {
        Some(n) => n.to_string(),
        None => "-".to_string(),
    }
}

fn fmt_inst(f: &mut fmt::Formatter<'_>, inst: &Inst) -> fmt::Result {
    match &inst.op {
        Op::IrHeader { blocks } => write!(f, "header blocks={}", opt(*blocks)),
        Op::CodeBlock { begin, last, next } => write!(
            f,
            "codeblock begin={} last={} next={}",
            opt(*begin),
            opt(*last),
            opt(*next)
        ),
        Op::Constant { value } => write!(f, "constant {value:#x}"),
        Op::LoadContext { offset, class } => {
            write!(f, "loadcontext ctx[{offset}], class{}", class.0)
        }
        Op::StoreContext { value, offset, class } => {
            write!(f, "storecontext {value}, ctx[{offset}], class{}", class.0)
        }
        Op::LoadContextPair { offset } => write!(f, "loadcontextpair ctx[{offset}]"),
        Op::StoreContextPair { value, offset } => {
            write!(f, "storecontextpair {value}, ctx[{offset}]")
        }
        Op::LoadFlag { flag } => write!(f, "loadflag {flag}"),
        Op::StoreFlag { value, flag } => write!(f, "storeflag {value}, {flag}"),
        Op::LoadMem { addr, class } => write!(f, "loadmem [{addr}], class{}", class.0),
        Op::StoreMem { addr, value, class } => {
            write!(f, "storemem [{addr}], {value}, class{}", class.0)
        }
        Op::Add { lhs, rhs } => write!(f, "add {lhs}, {rhs}"),
        Op::Sub { lhs, rhs } => write!(f, "sub {lhs}, {rhs}"),
        Op::Mul { lhs, rhs } => write!(f, "mul {lhs}, {rhs}"),
        Op::And { lhs, rhs } => write!(f, "and {lhs}, {rhs}"),
        Op::Or { lhs, rhs } => write!(f, "or {lhs}, {rhs}"),
        Op::Xor { lhs, rhs } => write!(f, "xor {lhs}, {rhs}"),
        Op::Zext { value, src_size } => write!(f, "zext {value}, {src_size}"),
        Op::GetHostFlag { value, flag } => write!(f, "gethostflag {value}, {flag}"),
        Op::Cpuid { function } => write!(f, "cpuid {function}"),
        Op::VAdd { lhs, rhs } => {
            write!(f, "vadd.{}x{} {lhs}, {rhs}", inst.elements, inst.size)
        }
        Op::VXor { lhs, rhs } => {
            write!(f, "vxor.{}x{} {lhs}, {rhs}", inst.elements, inst.size)
        }
        Op::CreateElementPair { lo, hi } => write!(f, "createelementpair {lo}, {hi}"),
        Op::ExtractElementPair { pair, element } => {
            write!(f, "extractelementpair {pair}, {element}")
        }
        Op::TruncElementPair { pair } => write!(f, "truncelementpair {pair}"),
        Op::CasPair {
            expected,
            desired,
            addr,
        } => write!(f, "caspair {expected}, {desired}, [{addr}]"),
        Op::Phi { begin } => write!(f, "phi begin={}", opt(*begin)),
        Op::PhiValue { value, block, next } => {
            write!(f, "phivalue {value}, {block}, next={}", opt(*next))
        }
        Op::SpillRegister { value, slot, class } => {
            write!(f, "spillregister {value}, slot{slot}, class{}", class.0)
        }
        Op::FillRegister { slot, class } => {
            write!(f, "fillregister slot{slot}, class{}", class.0)
        }
        Op::Jump { target } => write!(f, "jump {target}"),
        Op::CondJump {
            cond,
            true_target,
            false_target,
        } => write!(f, "condjump {cond}, {true_target}, {false_target}"),
        Op::ExitFunction => write!(f, "exit"),
    }
}
