//! Register class inference: which class each def's result lives in.

use corvus_ir::instruction::{Op, RegClass};
use corvus_ir::list::IrList;
use corvus_ir::value::NodeRef;

use crate::graph::RegisterGraph;

/// The class an op's result occupies.
///
/// Context and memory ops carry their class explicitly. ZEXT splits on
/// source width (a 64-bit source zero-extends into a vector register).
/// Pair ops pin the dedicated pair class. Everything else falls back to op
/// category: vector ops in FPR, scalar and flag ops in GPR.
pub(crate) fn class_of(list: &IrList, node: NodeRef) -> RegClass {
    match &list.inst(node).op {
        Op::LoadContext { class, .. }
        | Op::StoreContext { class, .. }
        | Op::LoadMem { class, .. }
        | Op::StoreMem { class, .. }
        | Op::FillRegister { class, .. } => *class,
        Op::Zext { src_size, .. } => {
            assert!(*src_size <= 64, "can't zero-extend from {src_size} bits");
            if *src_size == 64 {
                RegClass::FPR
            } else {
                RegClass::GPR
            }
        }
        Op::Cpuid { .. } => RegClass::FPR,
        Op::PhiValue { value, .. } => class_of(list, *value),
        // All incoming values of a phi must agree; validation is the
        // producer's responsibility, so the first one decides.
        Op::Phi { begin } => class_of(list, begin.expect("phi with no incoming values")),
        Op::LoadContextPair { .. }
        | Op::StoreContextPair { .. }
        | Op::CreateElementPair { .. }
        | Op::CasPair { .. }
        | Op::TruncElementPair { .. } => RegClass::GPR_PAIR,
        Op::ExtractElementPair { .. } => RegClass::GPR,
        op if op.is_vector() => RegClass::FPR,
        _ => RegClass::GPR,
    }
}

/// Walk the IR and record each def's class on its graph node.
pub(crate) fn find_node_classes(graph: &mut RegisterGraph, list: &IrList) {
    for block in list.blocks() {
        for node in list.block_ops(block) {
            if list.inst(node).op.has_dest() {
                graph.set_node_class(node.id(), class_of(list, node));
            }
        }
    }
}
